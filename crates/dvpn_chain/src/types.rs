//! JSON representation of chain records and relay messages.
//!
//! Integers are encoded as strings, as is customary for Cosmos SDK REST endpoints.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use dvpn_common::db::{Id, models::Session};
use dvpn_session_manager::{
    chain::{Bandwidth, ChainSession, ChainStatus, ChainSubscription},
    error::ChainError,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn from_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(serde::de::Error::custom)
}

fn as_string<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Display,
{
    serializer.collect_str(value)
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub(crate) struct BandwidthJson {
    #[serde(deserialize_with = "from_string", serialize_with = "as_string")]
    pub upload: u64,
    #[serde(deserialize_with = "from_string", serialize_with = "as_string")]
    pub download: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionJson {
    #[serde(deserialize_with = "from_string")]
    pub id: Id,
    #[serde(deserialize_with = "from_string")]
    pub subscription: Id,
    pub status: String,
    pub bandwidth: BandwidthJson,
    pub status_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionResponse {
    pub session: SessionJson,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionJson {
    #[serde(deserialize_with = "from_string")]
    pub id: Id,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionResponse {
    pub subscription: SubscriptionJson,
}

fn parse_status(status: &str) -> Result<ChainStatus, ChainError> {
    status
        .parse()
        .map_err(|_| ChainError::InvalidResponse(format!("unknown status {status}")))
}

impl TryFrom<SessionJson> for ChainSession {
    type Error = ChainError;

    fn try_from(session: SessionJson) -> Result<Self, Self::Error> {
        Ok(Self {
            id: session.id,
            subscription_id: session.subscription,
            status: parse_status(&session.status)?,
            bandwidth: Bandwidth {
                upload: session.bandwidth.upload,
                download: session.bandwidth.download,
            },
            status_at: session.status_at,
        })
    }
}

impl TryFrom<SubscriptionJson> for ChainSubscription {
    type Error = ChainError;

    fn try_from(subscription: SubscriptionJson) -> Result<Self, Self::Error> {
        Ok(Self {
            id: subscription.id,
            status: parse_status(&subscription.status)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateStatusMessage<'a> {
    pub from: &'a str,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionUpdate<'a> {
    #[serde(serialize_with = "as_string")]
    pub id: Id,
    pub address: &'a str,
    pub bandwidth: BandwidthJson,
}

impl<'a> From<&'a Session<Id>> for SessionUpdate<'a> {
    fn from(session: &'a Session<Id>) -> Self {
        Self {
            id: session.id,
            address: &session.address,
            bandwidth: BandwidthJson {
                upload: session.upload,
                download: session.download,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateSessionsMessage<'a> {
    pub from: &'a str,
    pub sessions: Vec<SessionUpdate<'a>>,
}
