//! Session reconciliation engine of a dVPN node.
//!
//! Three periodic jobs keep the WireGuard peer table, the local session ledger and the
//! chain's session records consistent:
//! - `set_sessions` refreshes session counters from live peers, evicts unknown peers and
//!   peers over quota,
//! - `update_status` reports node liveness to the chain,
//! - `update_sessions` checks sessions against the chain, evicts peers and closes sessions
//!   which are stale or no longer valid, then pushes counters of the remaining sessions.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    chain::ChainClient, error::SessionManagerError, ledger::SessionLedger, peer::PeerControl,
};

pub mod chain;
pub mod error;
pub mod ledger;
pub mod peer;
pub mod peer_quota;
pub mod quota;
pub mod session_reconcile;
pub mod status_push;
mod ticker;

#[cfg(test)]
mod tests;

pub(crate) const SET_SESSIONS_JOB: &str = "set_sessions";
pub(crate) const UPDATE_STATUS_JOB: &str = "update_status";
pub(crate) const UPDATE_SESSIONS_JOB: &str = "update_sessions";

/// Tick periods of the three jobs.
#[derive(Clone, Copy, Debug)]
pub struct JobIntervals {
    pub set_sessions: Duration,
    pub update_status: Duration,
    pub update_sessions: Duration,
}

/// Shared collaborators of all jobs.
pub struct SessionManager<P, L, C> {
    peers: P,
    ledger: L,
    chain: C,
}

impl<P, L, C> SessionManager<P, L, C> {
    #[must_use]
    pub fn new(peers: P, ledger: L, chain: C) -> Self {
        Self {
            peers,
            ledger,
            chain,
        }
    }
}

impl<P, L, C> SessionManager<P, L, C>
where
    P: PeerControl,
    L: SessionLedger,
    C: ChainClient,
{
    /// Run all jobs concurrently.
    ///
    /// Returns the first fatal job error, remaining jobs are stopped at that point.
    /// Once `cancel` fires every job finishes its current tick and this returns `Ok(())`.
    pub async fn run(
        &self,
        intervals: JobIntervals,
        cancel: CancellationToken,
    ) -> Result<(), SessionManagerError> {
        tokio::try_join!(
            self.run_peer_quota_job(intervals.set_sessions, cancel.clone()),
            self.run_status_job(intervals.update_status, cancel.clone()),
            self.run_reconcile_job(intervals.update_sessions, cancel),
        )?;

        Ok(())
    }
}

pub async fn run_session_manager<P, L, C>(
    peers: P,
    ledger: L,
    chain: C,
    intervals: JobIntervals,
    cancel: CancellationToken,
) -> Result<(), SessionManagerError>
where
    P: PeerControl,
    L: SessionLedger,
    C: ChainClient,
{
    info!("Starting VPN session manager service");
    let session_manager = SessionManager::new(peers, ledger, chain);

    match session_manager.run(intervals, cancel).await {
        Ok(()) => {
            info!("VPN session manager stopped");
            Ok(())
        }
        Err(err) => {
            error!("VPN session manager stopped on a fatal error: {err}");
            Err(err)
        }
    }
}
