use chrono::{DateTime, Utc};
use dvpn_common::db::{Id, models::Session};
use strum::{Display, EnumString};

use crate::error::ChainError;

/// Status of a session or subscription record on chain.
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq)]
pub enum ChainStatus {
    #[strum(serialize = "STATUS_UNSPECIFIED")]
    Unspecified,
    #[strum(serialize = "STATUS_ACTIVE")]
    Active,
    #[strum(serialize = "STATUS_INACTIVE_PENDING")]
    InactivePending,
    #[strum(serialize = "STATUS_INACTIVE")]
    Inactive,
}

/// Traffic counters of a session as last recorded on chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bandwidth {
    pub upload: u64,
    pub download: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSession {
    pub id: Id,
    pub subscription_id: Id,
    pub status: ChainStatus,
    pub bandwidth: Bandwidth,
    // last status change recorded on chain
    pub status_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSubscription {
    pub id: Id,
    pub status: ChainStatus,
}

/// Authoritative session and subscription records kept on chain.
#[trait_variant::make(Send)]
pub trait ChainClient {
    async fn query_session(&self, id: Id) -> Result<ChainSession, ChainError>;

    async fn query_subscription(&self, id: Id) -> Result<ChainSubscription, ChainError>;

    /// Report node liveness.
    async fn update_node_status(&self) -> Result<(), ChainError>;

    /// Push traffic counters of a batch of sessions.
    ///
    /// Callers must never pass an empty batch.
    async fn update_sessions(&self, sessions: &[Session<Id>]) -> Result<(), ChainError>;
}
