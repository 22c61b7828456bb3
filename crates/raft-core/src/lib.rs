//! # raft-core
//!
//! why: implement the replicated log at the heart of raft in pure, portable rust
//! relations: persisted through raft-storage sinks, driven by a replication/election layer
//! what: log entries, record codec, peer sets, rpc types, the log store itself

pub mod codec;
pub mod config;
pub mod error;
pub mod log;
pub mod message;
pub mod peer;
pub mod sink;
pub mod store;

pub use config::LogConfig;
pub use error::{CallbackError, CodecError, LogError, Result};
pub use log::{response_channel, LogEntry, ResponseReceiver, ResponseSender};
pub use message::{AppendEntries, AppendEntriesResponse, RequestVote, RequestVoteResponse};
pub use peer::{decode_peers, encode_peers, Peer, PeerDescriptor, Peers};
pub use sink::{LogSink, MemorySink};
pub use store::{Applier, Configurer, Log};
