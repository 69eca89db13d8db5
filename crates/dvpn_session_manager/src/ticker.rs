use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SessionManagerError;

/// Fixed-period timer of a single job which stops once cancellation is requested.
///
/// Cancellation is only observed while waiting for the next tick, so a running tick
/// always completes.
pub(crate) struct JobTicker {
    name: &'static str,
    interval: Interval,
    cancel: CancellationToken,
}

impl JobTicker {
    pub(crate) fn new(
        name: &'static str,
        period: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, SessionManagerError> {
        if period.is_zero() {
            return Err(SessionManagerError::InvalidInterval(name));
        }

        // first tick completes immediately
        let mut interval = interval(period);
        // a tick which overran its period is followed by the next one instead of being dropped
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            name,
            interval,
            cancel,
        })
    }

    /// Wait for the next tick. Returns `false` if the job should stop.
    pub(crate) async fn next(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            debug!("Job {} cancelled", self.name);
            return false;
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!("Job {} cancelled while waiting for next tick", self.name);
                false
            }
            _ = self.interval.tick() => true,
        }
    }
}
