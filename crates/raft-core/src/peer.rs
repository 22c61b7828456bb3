//! # peer
//!
//! why: describe cluster membership as data the log can persist and replay
//! relations: decoded by store.rs when a configuration entry commits
//! what: Peer capability trait, PeerDescriptor, Peers map, peer-set codec

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CallbackError;
use crate::log::ResponseSender;
use crate::message::{AppendEntries, AppendEntriesResponse, RequestVote, RequestVoteResponse};

/// Cluster membership: peer id to descriptor, ordered by id
pub type Peers = BTreeMap<u64, PeerDescriptor>;

/// What the consensus layer can ask of another cluster member
///
/// Implementations live with the transport; the log only ever handles the
/// serializable `PeerDescriptor` form.
pub trait Peer: Send + Sync {
    fn id(&self) -> u64;

    fn append_entries(&self, req: AppendEntries) -> AppendEntriesResponse;

    fn request_vote(&self, req: RequestVote) -> RequestVoteResponse;

    /// Forward a client command; the result arrives on `response`
    fn command(&self, command: Vec<u8>, response: ResponseSender) -> Result<(), CallbackError>;

    fn set_configuration(&self, peers: Peers) -> Result<(), CallbackError>;
}

/// The persisted identity of a peer: enough to reconnect, nothing else
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub id: u64,
    pub address: String,
}

impl PeerDescriptor {
    pub fn new(id: u64, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }

    /// Build a peer set keyed by each descriptor's id
    pub fn peer_set(peers: impl IntoIterator<Item = PeerDescriptor>) -> Peers {
        peers.into_iter().map(|p| (p.id, p)).collect()
    }

    /// Describe a live peer, given the address it is reachable at
    pub fn of(peer: &dyn Peer, address: impl Into<String>) -> Self {
        Self::new(peer.id(), address)
    }
}

/// Serialize a peer set into a configuration entry's command payload
pub fn encode_peers(peers: &Peers) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(peers)
}

/// Parse a configuration entry's command payload
pub fn decode_peers(bytes: &[u8]) -> Result<Peers, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_set_roundtrips_in_id_order() {
        let peers = PeerDescriptor::peer_set([
            PeerDescriptor::new(2, "10.0.0.2:7000"),
            PeerDescriptor::new(1, "10.0.0.1:7000"),
        ]);
        let bytes = encode_peers(&peers).unwrap();
        let decoded = decode_peers(&bytes).unwrap();

        assert_eq!(decoded, peers);
        assert_eq!(decoded.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn empty_peer_set_is_valid() {
        let bytes = encode_peers(&Peers::new()).unwrap();
        assert!(decode_peers(&bytes).unwrap().is_empty());
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = PeerDescriptor::peer_set([PeerDescriptor::new(3, "c"), PeerDescriptor::new(1, "a")]);
        let b = PeerDescriptor::peer_set([PeerDescriptor::new(1, "a"), PeerDescriptor::new(3, "c")]);
        assert_eq!(encode_peers(&a).unwrap(), encode_peers(&b).unwrap());
    }

    #[test]
    fn garbage_is_not_a_peer_set() {
        assert!(decode_peers(b"\x00\x01garbage").is_err());
    }
}
