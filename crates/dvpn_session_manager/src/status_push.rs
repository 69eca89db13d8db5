//! `update_status` job: periodic node liveness report.

use std::time::Duration;

use humantime::format_duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::{
    SessionManager, UPDATE_STATUS_JOB, chain::ChainClient, error::SessionManagerError,
    ticker::JobTicker,
};

impl<P, L, C> SessionManager<P, L, C>
where
    C: ChainClient,
{
    #[instrument(skip_all)]
    pub async fn run_status_job(
        &self,
        period: Duration,
        cancel: CancellationToken,
    ) -> Result<(), SessionManagerError> {
        info!(
            "Starting job {UPDATE_STATUS_JOB} with interval {}",
            format_duration(period)
        );
        let mut ticker = JobTicker::new(UPDATE_STATUS_JOB, period, cancel)?;

        while ticker.next().await {
            debug!("Updating node status on chain");
            if let Err(err) = self.chain.update_node_status().await {
                error!("Job {UPDATE_STATUS_JOB} failed: {err}");
                return Err(err.into());
            }
        }

        info!("Job {UPDATE_STATUS_JOB} stopped");
        Ok(())
    }
}
