use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionManagerError {
    #[error("Peer control error: {0}")]
    PeerControlError(#[from] PeerControlError),
    #[error("Chain client error: {0}")]
    ChainError(#[from] ChainError),
    #[error("Interval of job {0} must be greater than zero")]
    InvalidInterval(&'static str),
}

#[derive(Debug, Error)]
pub enum PeerControlError {
    #[error("Failed to run peer control command: {0}")]
    CommandError(String),
    #[error("Received invalid peer list: {0}")]
    InvalidPeerList(String),
    #[error("Invalid peer key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Request to the chain failed: {0}")]
    RequestError(String),
    #[error("Chain returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0} does not exist on chain")]
    NotFound(String),
}
