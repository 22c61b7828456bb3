//! # log
//!
//! why: define the unit of replication and the channel its result travels on
//! relations: stored by store.rs, framed by codec.rs, carried by message.rs
//! what: LogEntry struct, response channel helpers

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// Sending half of an entry's response channel.
pub type ResponseSender = SyncSender<Vec<u8>>;

/// Receiving half of an entry's response channel.
pub type ResponseReceiver = Receiver<Vec<u8>>;

/// Create a single-use response channel with room for exactly one reply,
/// so delivering the reply never blocks the commit loop.
pub fn response_channel() -> (ResponseSender, ResponseReceiver) {
    mpsc::sync_channel(1)
}

/// A single entry in the replicated log
///
/// Only `index`, `term`, `command` and `is_configuration` are persisted.
/// The response sender exists in memory only, for whoever proposed the entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntry {
    /// The index of this entry in the log (1-indexed)
    pub index: u64,
    /// The term when this entry was created
    pub term: u64,
    /// The command to be applied to the state machine, or an encoded peer set
    pub command: Vec<u8>,
    /// Whether `command` is a cluster membership change
    #[serde(default)]
    pub is_configuration: bool,
    #[serde(skip)]
    response: Option<ResponseSender>,
}

impl LogEntry {
    /// Create a new command entry
    pub fn new(index: u64, term: u64, command: Vec<u8>) -> Self {
        Self {
            index,
            term,
            command,
            is_configuration: false,
            response: None,
        }
    }

    /// Create a new configuration entry carrying an encoded peer set
    pub fn configuration(index: u64, term: u64, peers: Vec<u8>) -> Self {
        Self {
            is_configuration: true,
            ..Self::new(index, term, peers)
        }
    }

    /// Attach a response sender; the applier's result is delivered to it on commit
    pub fn with_response(mut self, response: ResponseSender) -> Self {
        self.response = Some(response);
        self
    }

    /// Whether a response sender is attached
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Copy of this entry without the response sender
    pub fn detached(&self) -> Self {
        Self {
            index: self.index,
            term: self.term,
            command: self.command.clone(),
            is_configuration: self.is_configuration,
            response: None,
        }
    }

    /// Deliver `payload` to the attached sender, if any.
    ///
    /// Returns false when there is no sender, the receiver is gone, or a reply
    /// is already buffered. Never blocks.
    pub(crate) fn respond(&self, payload: Vec<u8>) -> bool {
        let Some(tx) = &self.response else {
            return false;
        };
        match tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl PartialEq for LogEntry {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.term == other.term
            && self.command == other.command
            && self.is_configuration == other.is_configuration
    }
}

impl Eq for LogEntry {}
