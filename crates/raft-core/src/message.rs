//! # message
//!
//! why: name the rpc payloads a peer must be able to carry
//! relations: spoken by the Peer trait in peer.rs, entries come from store.rs
//! what: AppendEntries, RequestVote and their responses

use serde::{Deserialize, Serialize};

use crate::LogEntry;

/// Replicate log entries (also serves as heartbeat when entries is empty)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendEntries {
    pub term: u64,
    pub leader_id: u64,
    /// Checked against the follower's log with `Log::contains`
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub commit_index: u64,
}

/// Response to AppendEntries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
}

/// Request a vote during leader election
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVote {
    pub term: u64,
    pub candidate_id: u64,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

/// Response to a vote request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}
