use crate::error::PeerControlError;

/// Live tunnel endpoint with cumulative traffic counters as reported by the VPN transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub key: String,
    // bytes sent to peer
    pub upload: u64,
    // bytes received from peer
    pub download: u64,
}

/// Access to the peer table of the VPN transport.
#[trait_variant::make(Send)]
pub trait PeerControl {
    /// Enumerate all currently connected peers.
    async fn list_peers(&self) -> Result<Vec<Peer>, PeerControlError>;

    /// Remove a peer by its public key.
    ///
    /// Removing a peer which is not connected is a no-op, both jobs may target the same peer.
    async fn remove_peer(&self, key: &str) -> Result<(), PeerControlError>;
}
