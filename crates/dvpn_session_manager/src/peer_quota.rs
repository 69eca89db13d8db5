//! `set_sessions` job: refresh session counters from live peers and enforce quotas.

use std::time::Duration;

use humantime::format_duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    SET_SESSIONS_JOB, SessionManager, error::SessionManagerError, ledger::SessionLedger,
    peer::PeerControl, quota::quota_exceeded, ticker::JobTicker,
};

/// Outcome of a single `set_sessions` tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeerQuotaSummary {
    pub peers: usize,
    pub counters_updated: usize,
    pub unknown_removed: usize,
    pub quota_removed: usize,
    // ledger lookups or writes which failed and were skipped
    pub failed_ledger_ops: usize,
}

impl<P, L, C> SessionManager<P, L, C>
where
    P: PeerControl,
    L: SessionLedger,
{
    #[instrument(skip_all)]
    pub async fn run_peer_quota_job(
        &self,
        period: Duration,
        cancel: CancellationToken,
    ) -> Result<(), SessionManagerError> {
        info!(
            "Starting job {SET_SESSIONS_JOB} with interval {}",
            format_duration(period)
        );
        let mut ticker = JobTicker::new(SET_SESSIONS_JOB, period, cancel)?;

        while ticker.next().await {
            match self.enforce_peer_quotas().await {
                Ok(summary) => debug!("Job {SET_SESSIONS_JOB} tick finished: {summary:?}"),
                Err(err) => {
                    error!("Job {SET_SESSIONS_JOB} failed: {err}");
                    return Err(err);
                }
            }
        }

        info!("Job {SET_SESSIONS_JOB} stopped");
        Ok(())
    }

    /// Reconcile all connected peers with the session ledger.
    ///
    /// Peers without an active session are removed. Counters of known peers overwrite
    /// session counters and peers which consumed more than their session quota are removed.
    /// Only peer control errors are fatal, ledger failures are logged and counted.
    pub async fn enforce_peer_quotas(&self) -> Result<PeerQuotaSummary, SessionManagerError> {
        let peers = self.peers.list_peers().await?;
        let mut summary = PeerQuotaSummary {
            peers: peers.len(),
            ..Default::default()
        };
        debug!("Processing {} connected peers", peers.len());

        for peer in peers {
            trace!("Processing peer {peer:?}");
            let session = match self.ledger.find_by_key(&peer.key).await {
                Ok(Some(session)) => session,
                Ok(None) => {
                    info!("Removing unknown connected peer {}", peer.key);
                    self.peers.remove_peer(&peer.key).await?;
                    summary.unknown_removed += 1;
                    continue;
                }
                Err(err) => {
                    warn!(
                        "Failed to look up session for peer {}, skipping: {err}",
                        peer.key
                    );
                    summary.failed_ledger_ops += 1;
                    continue;
                }
            };

            match self
                .ledger
                .update_counters(session.id, peer.upload, peer.download)
                .await
            {
                Ok(true) => summary.counters_updated += 1,
                Ok(false) => debug!("{session} was closed before its counters were updated"),
                Err(err) => {
                    warn!("Failed to update counters of {session}: {err}");
                    summary.failed_ledger_ops += 1;
                }
            }

            if quota_exceeded(peer.upload, peer.download, session.available) {
                info!(
                    "Peer {} exceeded quota of {session}: consumed {} + {} of {} bytes",
                    session.key, peer.upload, peer.download, session.available
                );
                self.peers.remove_peer(&session.key).await?;
                summary.quota_removed += 1;
            }
        }

        Ok(summary)
    }
}
