//! Peer control of a kernel WireGuard interface through the `wg` command line tool.

use base64::{Engine, prelude::BASE64_STANDARD};
use dvpn_session_manager::{
    error::PeerControlError,
    peer::{Peer, PeerControl},
};
use tokio::process::Command;
use tracing::{debug, trace, warn};

const WG_BINARY: &str = "wg";
const KEY_LENGTH: usize = 32;

/// [`PeerControl`] for a single WireGuard interface.
#[derive(Clone, Debug)]
pub struct WireguardPeerControl {
    interface: String,
}

impl WireguardPeerControl {
    #[must_use]
    pub fn new<S: Into<String>>(interface: S) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, PeerControlError> {
        trace!("Running {WG_BINARY} {}", args.join(" "));
        let output = Command::new(WG_BINARY)
            .args(args)
            .output()
            .await
            .map_err(|err| PeerControlError::CommandError(format!("{WG_BINARY}: {err}")))?;

        if !output.status.success() {
            return Err(PeerControlError::CommandError(format!(
                "{WG_BINARY} {} exited with {}: {}",
                args.first().unwrap_or(&""),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|err| PeerControlError::InvalidPeerList(err.to_string()))
    }
}

impl PeerControl for WireguardPeerControl {
    async fn list_peers(&self) -> Result<Vec<Peer>, PeerControlError> {
        let output = self
            .run(&["show", self.interface.as_str(), "transfer"])
            .await?;
        let peers = parse_transfer(&output)?;
        debug!(
            "Found {} peers on interface {}",
            peers.len(),
            self.interface
        );
        Ok(peers)
    }

    // `wg set` succeeds for peers which are not configured on the interface
    async fn remove_peer(&self, key: &str) -> Result<(), PeerControlError> {
        // a malformed key can't belong to a connected peer
        if let Err(err) = validate_key(key) {
            warn!("Not removing peer from interface {}: {err}", self.interface);
            return Ok(());
        }
        debug!("Removing peer {key} from interface {}", self.interface);
        self.run(&["set", self.interface.as_str(), "peer", key, "remove"])
            .await?;
        Ok(())
    }
}

/// Parse output of `wg show <interface> transfer`.
///
/// Each line holds a peer key, bytes received from the peer and bytes sent to the peer,
/// separated by tabs. Lines with a different number of columns are ignored.
fn parse_transfer(output: &str) -> Result<Vec<Peer>, PeerControlError> {
    let mut peers = Vec::new();
    for line in output.lines() {
        let columns: Vec<&str> = line.split('\t').collect();
        let [key, received, sent] = columns.as_slice() else {
            continue;
        };

        let parse_counter = |value: &str| {
            value.trim().parse::<u64>().map_err(|err| {
                PeerControlError::InvalidPeerList(format!(
                    "invalid transfer counter {value:?} of peer {key}: {err}"
                ))
            })
        };
        peers.push(Peer {
            key: (*key).to_string(),
            upload: parse_counter(*sent)?,
            download: parse_counter(*received)?,
        });
    }

    Ok(peers)
}

// keys end up as command line arguments
fn validate_key(key: &str) -> Result<(), PeerControlError> {
    match BASE64_STANDARD.decode(key) {
        Ok(bytes) if bytes.len() == KEY_LENGTH => Ok(()),
        _ => Err(PeerControlError::InvalidKey(key.to_string())),
    }
}
