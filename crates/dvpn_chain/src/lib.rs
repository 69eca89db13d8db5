//! HTTP client of the chain.
//!
//! Records are queried from the chain REST (LCD) endpoint. Node transactions are handed to a
//! relay service which signs and broadcasts them on behalf of the node account.

use std::time::Duration;

use dvpn_common::db::{Id, models::Session};
use dvpn_session_manager::{
    chain::{ChainClient, ChainSession, ChainStatus, ChainSubscription},
    error::ChainError,
};
use reqwest::{Client, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, trace};

use crate::types::{
    SessionResponse, SessionUpdate, SubscriptionResponse, UpdateSessionsMessage,
    UpdateStatusMessage,
};

mod types;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn request_error(err: reqwest::Error) -> ChainError {
    if err.is_decode() {
        ChainError::InvalidResponse(format!(
            "There was an error while trying to decode chain response, it may be malformed: {err}"
        ))
    } else if err.is_timeout() {
        ChainError::RequestError(format!("The request to the chain timed out: {err}"))
    } else {
        ChainError::RequestError(err.to_string())
    }
}

fn join_url(base: &Url, path: &str) -> Result<Url, ChainError> {
    base.join(path)
        .map_err(|err| ChainError::RequestError(format!("Invalid URL {base}/{path}: {err}")))
}

pub struct HttpChainClient {
    client: Client,
    lcd_url: Url,
    relay_url: Url,
    node_address: String,
}

impl HttpChainClient {
    pub fn new<S: Into<String>>(
        lcd_url: Url,
        relay_url: Url,
        node_address: S,
    ) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(request_error)?;

        Ok(Self {
            client,
            lcd_url,
            relay_url,
            node_address: node_address.into(),
        })
    }

    async fn query<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T, ChainError> {
        let url = join_url(&self.lcd_url, path)?;
        trace!("Querying {what} from {url}");
        let response = self.client.get(url).send().await.map_err(request_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ChainError::NotFound(what.to_string()));
        }
        response
            .error_for_status()
            .map_err(request_error)?
            .json()
            .await
            .map_err(request_error)
    }

    async fn broadcast<T: Serialize>(&self, path: &str, message: &T) -> Result<(), ChainError> {
        let url = join_url(&self.relay_url, path)?;
        trace!("Sending transaction to relay at {url}");
        self.client
            .post(url)
            .json(message)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;

        Ok(())
    }
}

impl ChainClient for HttpChainClient {
    async fn query_session(&self, id: Id) -> Result<ChainSession, ChainError> {
        let response: SessionResponse = self
            .query(&format!("sentinel/sessions/{id}"), &format!("Session {id}"))
            .await?;
        response.session.try_into()
    }

    async fn query_subscription(&self, id: Id) -> Result<ChainSubscription, ChainError> {
        let response: SubscriptionResponse = self
            .query(
                &format!("sentinel/subscriptions/{id}"),
                &format!("Subscription {id}"),
            )
            .await?;
        response.subscription.try_into()
    }

    async fn update_node_status(&self) -> Result<(), ChainError> {
        debug!("Reporting status of node {}", self.node_address);
        let message = UpdateStatusMessage {
            from: &self.node_address,
            status: ChainStatus::Active.to_string(),
        };
        self.broadcast("node/status", &message).await
    }

    async fn update_sessions(&self, sessions: &[Session<Id>]) -> Result<(), ChainError> {
        debug!(
            "Updating {} sessions of node {}",
            sessions.len(),
            self.node_address
        );
        let message = UpdateSessionsMessage {
            from: &self.node_address,
            sessions: sessions.iter().map(SessionUpdate::from).collect(),
        };
        self.broadcast("node/sessions", &message).await
    }
}
