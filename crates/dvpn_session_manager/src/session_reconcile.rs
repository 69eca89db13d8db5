//! `update_sessions` job: reconcile local sessions with their records on chain.

use std::time::Duration;

use dvpn_common::db::{
    Id,
    models::{Session, session::CLOSED_ADDRESS},
};
use humantime::format_duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    SessionManager, UPDATE_SESSIONS_JOB,
    chain::{ChainClient, ChainSession, ChainStatus, ChainSubscription},
    error::SessionManagerError,
    ledger::SessionLedger,
    peer::PeerControl,
    ticker::JobTicker,
};

/// Why a session needs remediation. Checked in this order, first match wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionVerdict {
    Healthy,
    /// Chain has not observed any traffic since the last local snapshot.
    Stale,
    SubscriptionInvalid,
    SessionInvalid,
}

/// Actions resulting from a [`SessionVerdict`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub verdict: SessionVerdict,
    pub remove_peer: bool,
    pub close_session: bool,
    pub skip_update: bool,
}

impl Classification {
    fn healthy() -> Self {
        Self {
            verdict: SessionVerdict::Healthy,
            remove_peer: false,
            close_session: false,
            skip_update: false,
        }
    }

    // a session is only closed together with its subscription
    fn invalid(verdict: SessionVerdict, subscription: &ChainSubscription) -> Self {
        let subscription_inactive = subscription.status == ChainStatus::Inactive;
        Self {
            verdict,
            remove_peer: true,
            close_session: subscription_inactive,
            skip_update: subscription_inactive,
        }
    }
}

/// Classify a local session against its chain records.
#[must_use]
pub fn classify(
    session: &Session<Id>,
    chain_session: &ChainSession,
    subscription: &ChainSubscription,
) -> Classification {
    if session.download == chain_session.bandwidth.upload {
        return Classification {
            verdict: SessionVerdict::Stale,
            // idle since the session started
            remove_peer: session.created_at < chain_session.status_at,
            close_session: false,
            skip_update: true,
        };
    }

    if subscription.status != ChainStatus::Active {
        return Classification::invalid(SessionVerdict::SubscriptionInvalid, subscription);
    }

    if chain_session.status != ChainStatus::Active {
        return Classification::invalid(SessionVerdict::SessionInvalid, subscription);
    }

    Classification::healthy()
}

/// Outcome of a single `update_sessions` tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub sessions: usize,
    pub stale: usize,
    pub invalid_subscription: usize,
    pub invalid_session: usize,
    pub peers_removed: usize,
    pub closed: usize,
    pub pushed: usize,
    pub swept: u64,
    // ledger reads or writes which failed and were skipped
    pub failed_ledger_ops: usize,
}

impl<P, L, C> SessionManager<P, L, C>
where
    P: PeerControl,
    L: SessionLedger,
    C: ChainClient,
{
    #[instrument(skip_all)]
    pub async fn run_reconcile_job(
        &self,
        period: Duration,
        cancel: CancellationToken,
    ) -> Result<(), SessionManagerError> {
        info!(
            "Starting job {UPDATE_SESSIONS_JOB} with interval {}",
            format_duration(period)
        );
        let mut ticker = JobTicker::new(UPDATE_SESSIONS_JOB, period, cancel)?;

        while ticker.next().await {
            match self.reconcile_sessions().await {
                Ok(summary) => info!("Job {UPDATE_SESSIONS_JOB} tick finished: {summary:?}"),
                Err(err) => {
                    error!("Job {UPDATE_SESSIONS_JOB} failed: {err}");
                    return Err(err);
                }
            }
        }

        info!("Job {UPDATE_SESSIONS_JOB} stopped");
        Ok(())
    }

    /// Reconcile a snapshot of the session ledger with the chain.
    ///
    /// Chain and peer control errors are fatal. Ledger failures are logged and counted.
    pub async fn reconcile_sessions(&self) -> Result<ReconcileSummary, SessionManagerError> {
        let mut summary = ReconcileSummary::default();

        let sessions = match self.ledger.find_all().await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!("Failed to read session ledger, skipping reconciliation: {err}");
                summary.failed_ledger_ops += 1;
                return Ok(summary);
            }
        };
        summary.sessions = sessions.len();
        debug!("Reconciling {} sessions with chain", sessions.len());

        let mut eligible = Vec::with_capacity(sessions.len());
        for session in sessions.into_iter().rev() {
            if session.is_closed() {
                trace!("{session} is closed, leaving it for the sweep");
                continue;
            }

            if self.reconcile_session(&session, &mut summary).await? {
                eligible.push(session);
            }
        }
        // restore insertion order
        eligible.reverse();

        if eligible.is_empty() {
            debug!("No sessions to update on chain");
        } else {
            debug!("Updating {} sessions on chain", eligible.len());
            self.chain.update_sessions(&eligible).await?;
            summary.pushed = eligible.len();
        }

        match self.ledger.delete_closed().await {
            Ok(count) => {
                if count > 0 {
                    info!("Deleted {count} closed sessions");
                }
                summary.swept = count;
            }
            Err(err) => {
                warn!("Failed to delete closed sessions: {err}");
                summary.failed_ledger_ops += 1;
            }
        }

        Ok(summary)
    }

    /// Classify a single session and apply resulting actions.
    ///
    /// Returns `true` if the session should be included in the chain update.
    async fn reconcile_session(
        &self,
        session: &Session<Id>,
        summary: &mut ReconcileSummary,
    ) -> Result<bool, SessionManagerError> {
        let chain_session = self.chain.query_session(session.id).await?;
        let subscription = self
            .chain
            .query_subscription(chain_session.subscription_id)
            .await?;
        trace!("Chain records of {session}: {chain_session:?}, {subscription:?}");

        let classification = classify(session, &chain_session, &subscription);
        match classification.verdict {
            SessionVerdict::Healthy => {}
            SessionVerdict::Stale => {
                info!("Stale peer connection for {session}");
                summary.stale += 1;
            }
            SessionVerdict::SubscriptionInvalid => {
                info!(
                    "Invalid subscription status {} of subscription {} for {session}",
                    subscription.status, subscription.id
                );
                summary.invalid_subscription += 1;
            }
            SessionVerdict::SessionInvalid => {
                info!(
                    "Invalid session status {} for {session}",
                    chain_session.status
                );
                summary.invalid_session += 1;
            }
        }

        if classification.remove_peer {
            debug!("Removing peer {} of {session}", session.key);
            self.peers.remove_peer(&session.key).await?;
            summary.peers_removed += 1;
        }

        if classification.close_session {
            debug!("Closing {session}");
            match self.ledger.set_address(session.id, CLOSED_ADDRESS).await {
                Ok(()) => summary.closed += 1,
                Err(err) => {
                    warn!("Failed to close {session}: {err}");
                    summary.failed_ledger_ops += 1;
                }
            }
        }

        Ok(!classification.skip_update)
    }
}
