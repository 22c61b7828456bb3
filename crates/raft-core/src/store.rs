//! # store
//!
//! why: keep the replicated log ordered, durable and applied exactly once
//! relations: persists through sink.rs via codec.rs, decodes peer sets from peer.rs
//! what: Log store with append, commit, reconciliation, queries and crash recovery

use std::io::{self, BufReader, Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::codec;
use crate::config::LogConfig;
use crate::error::{CallbackError, CodecError, LogError, Result};
use crate::log::LogEntry;
use crate::peer::{decode_peers, Peers};
use crate::sink::LogSink;

/// Deterministic state machine: `(index, command) -> response`
pub type Applier = Box<dyn FnMut(u64, &[u8]) -> Vec<u8> + Send>;

/// Membership change handler, called with the decoded peer set
pub type Configurer = Box<dyn FnMut(Peers) -> std::result::Result<(), CallbackError> + Send>;

/// The replicated log
///
/// All state sits behind a single mutex: the entry sequence and the commit
/// index are checked and changed together. `commit_to` runs the callbacks
/// while holding it, so callbacks must not call back into the same log.
pub struct Log<S: LogSink> {
    config: LogConfig,
    inner: Mutex<LogInner<S>>,
}

struct LogInner<S> {
    entries: Vec<LogEntry>,
    commit_index: u64,
    sink: S,
    /// Length of the sink up to the end of the last whole record
    sink_len: u64,
    /// Set when a torn write could not be truncated away
    sink_broken: bool,
    apply: Applier,
    configure: Configurer,
}

/// What recovery found in the sink
struct Recovered {
    entries: Vec<LogEntry>,
    valid_len: u64,
    total_len: u64,
    corrupt: Option<CodecError>,
}

impl<S: LogSink> Log<S> {
    /// Open a log over `sink` with the default configuration
    ///
    /// Entries already in the sink are recovered as committed; the callbacks
    /// are not run for them.
    pub fn new<A, C>(sink: S, apply: A, configure: C) -> Result<Self>
    where
        A: FnMut(u64, &[u8]) -> Vec<u8> + Send + 'static,
        C: FnMut(Peers) -> std::result::Result<(), CallbackError> + Send + 'static,
    {
        Self::with_config(sink, apply, configure, LogConfig::default())
    }

    /// Open a log over `sink` with an explicit configuration
    pub fn with_config<A, C>(mut sink: S, apply: A, configure: C, config: LogConfig) -> Result<Self>
    where
        A: FnMut(u64, &[u8]) -> Vec<u8> + Send + 'static,
        C: FnMut(Peers) -> std::result::Result<(), CallbackError> + Send + 'static,
    {
        let recovered = recover(&mut sink, config.max_record_bytes)?;
        let discarded = recovered.total_len - recovered.valid_len;
        let mut sink_len = recovered.total_len;

        if let Some(reason) = &recovered.corrupt {
            tracing::warn!(
                "Corrupt log tail after {} entries ({} bytes): {}",
                recovered.entries.len(),
                discarded,
                reason
            );
            if config.discard_corrupt_tail {
                sink.truncate(recovered.valid_len)?;
                sink_len = recovered.valid_len;
            }
        }

        let dropped = recovered.total_len - sink_len;
        let commit_index = recovered.entries.last().map_or(0, |e| e.index);
        tracing::info!(
            "Recovered {} log entries, commit_index={}, kept {} bytes, discarded {} bytes",
            recovered.entries.len(),
            commit_index,
            recovered.valid_len,
            dropped
        );

        Ok(Self {
            config,
            inner: Mutex::new(LogInner {
                entries: recovered.entries,
                commit_index,
                sink,
                sink_len,
                sink_broken: false,
                apply: Box::new(apply),
                configure: Box::new(configure),
            }),
        })
    }

    /// Configuration this log was opened with
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Append an uncommitted entry
    ///
    /// The entry's term may not go backwards and its index must move forward.
    /// Gaps between indexes are not rejected here.
    pub fn append_entry(&self, entry: LogEntry) -> Result<()> {
        let mut inner = self.lock();
        if entry.term < inner.last_term() {
            return Err(LogError::TermTooSmall);
        }
        if entry.index <= inner.last_index() {
            return Err(LogError::IndexTooSmall);
        }

        tracing::trace!("Appended entry index={} term={}", entry.index, entry.term);
        inner.entries.push(entry);
        Ok(())
    }

    /// Persist and apply every entry up to and including `index`
    ///
    /// Entries at or below the current commit index are never touched again,
    /// so repeating a call is a no-op. An entry counts as committed as soon
    /// as its record is in the sink, before its callback runs. If a record
    /// fails to persist, its partial bytes are cut from the sink, the commit
    /// index stays at the entry before it and the error is returned.
    pub fn commit_to(&self, index: u64) -> Result<()> {
        let mut guard = self.lock();
        if guard.sink_broken {
            return Err(LogError::SinkUnavailable);
        }
        if index < guard.commit_index {
            return Err(LogError::IndexTooSmall);
        }
        if index > guard.last_index() {
            return Err(LogError::IndexTooBig);
        }
        if index == guard.commit_index {
            return Ok(());
        }

        let LogInner {
            entries,
            commit_index,
            sink,
            sink_len,
            sink_broken,
            apply,
            configure,
        } = &mut *guard;

        let start = entries.partition_point(|e| e.index <= *commit_index);
        let end = entries.partition_point(|e| e.index <= index);
        tracing::debug!(
            "Committing {} entries (index {} to {})",
            end - start,
            *commit_index + 1,
            index
        );

        for (n, entry) in entries[start..end].iter().enumerate() {
            let peers = match persist_entry(entry, sink) {
                Ok((written, peers)) => {
                    *sink_len += written as u64;
                    peers
                }
                Err(e) => {
                    tracing::error!("Commit stopped at index {}: {}", entry.index, e);
                    if let Err(cut) = sink.truncate(*sink_len) {
                        tracing::error!("Failed to remove torn record at offset {}: {}", sink_len, cut);
                        *sink_broken = true;
                    }
                    if n > 0 {
                        if let Err(flush) = self.flush_batch(sink) {
                            tracing::error!("Failed to sync committed entries: {}", flush);
                        }
                    }
                    return Err(e);
                }
            };
            *commit_index = entry.index;
            dispatch_entry(entry, peers, apply, configure);
        }
        *commit_index = index;

        self.flush_batch(sink)?;
        Ok(())
    }

    /// Make `(index, term)` the last entry by dropping everything after it
    ///
    /// Committed entries cannot be dropped, and a term mismatch at `index`
    /// is reported as `BadTerm` without changing anything. Index 0 clears
    /// the whole (necessarily uncommitted) log.
    pub fn ensure_last_is(&self, index: u64, term: u64) -> Result<()> {
        let mut inner = self.lock();
        if index > inner.last_index() {
            return Err(LogError::IndexTooBig);
        }
        if index < inner.commit_index {
            return Err(LogError::IndexTooSmall);
        }

        if index == 0 {
            tracing::debug!("Truncating all {} entries", inner.entries.len());
            inner.entries.clear();
            return Ok(());
        }

        let pos = inner
            .entries
            .binary_search_by_key(&index, |e| e.index)
            .map_err(|_| LogError::IndexTooBig)?;
        if inner.entries[pos].term != term {
            return Err(LogError::BadTerm);
        }

        let dropped = inner.entries.len() - (pos + 1);
        if dropped > 0 {
            tracing::debug!("Truncating {} entries after index {}", dropped, index);
            inner.entries.truncate(pos + 1);
        }
        Ok(())
    }

    /// Whether an entry with exactly this index and term is in the log
    pub fn contains(&self, index: u64, term: u64) -> bool {
        if index == 0 {
            return false;
        }
        let inner = self.lock();
        inner
            .position(index)
            .map_or(false, |pos| inner.entries[pos].term == term)
    }

    /// Entries after `index`, plus the term of the entry at `index`
    ///
    /// The term is 0 for index 0 and clamps to the last term when `index`
    /// is past the end. Returned entries carry no response sender.
    pub fn entries_after(&self, index: u64) -> (Vec<LogEntry>, u64) {
        let inner = self.lock();
        let pos = inner.entries.partition_point(|e| e.index <= index);
        let term = match pos {
            0 => 0,
            _ => inner.entries[pos - 1].term,
        };
        let tail = inner.entries[pos..].iter().map(LogEntry::detached).collect();
        (tail, term)
    }

    /// Copy of the entry at `index`, without its response sender
    pub fn entry(&self, index: u64) -> Option<LogEntry> {
        let inner = self.lock();
        inner.position(index).map(|pos| inner.entries[pos].detached())
    }

    /// Index of the last entry, or 0 if the log is empty
    pub fn last_index(&self) -> u64 {
        self.lock().last_index()
    }

    /// Term of the last entry, or 0 if the log is empty
    pub fn last_term(&self) -> u64 {
        self.lock().last_term()
    }

    /// Highest index that has been persisted and applied
    pub fn commit_index(&self) -> u64 {
        self.lock().commit_index
    }

    /// Number of entries held, committed or not
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the log holds no entries
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn flush_batch(&self, sink: &mut S) -> io::Result<()> {
        if self.config.sync_on_commit {
            sink.sync()
        } else {
            sink.flush()
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogInner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> LogInner<S> {
    fn last_index(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.index)
    }

    fn last_term(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.term)
    }

    fn position(&self, index: u64) -> Option<usize> {
        self.entries.binary_search_by_key(&index, |e| e.index).ok()
    }
}

/// Write one entry's record to the sink, returning its size and, for a
/// configuration entry, the decoded peer set
///
/// A configuration payload is decoded before anything is written, so an
/// undecodable one never reaches the sink.
fn persist_entry<S: LogSink>(entry: &LogEntry, sink: &mut S) -> Result<(usize, Option<Peers>)> {
    let peers = if entry.is_configuration {
        let peers = decode_peers(&entry.command).map_err(|source| LogError::BadConfiguration {
            index: entry.index,
            source,
        })?;
        Some(peers)
    } else {
        None
    };

    let written = codec::encode(entry, sink).map_err(|e| match e {
        CodecError::Io(io) => LogError::Sink(io),
        other => LogError::Codec(other),
    })?;
    Ok((written, peers))
}

/// Hand a persisted entry to the membership handler or the state machine
fn dispatch_entry(
    entry: &LogEntry,
    peers: Option<Peers>,
    apply: &mut Applier,
    configure: &mut Configurer,
) {
    match peers {
        Some(peers) => {
            if let Err(e) = configure(peers) {
                tracing::warn!("Configuration at index {} failed: {}", entry.index, e);
                entry.respond(e.to_string().into_bytes());
            }
        }
        None => {
            let response = apply(entry.index, &entry.command);
            entry.respond(response);
        }
    }
}

/// Read committed entries back from the start of `sink`
///
/// Stops at the first record that is torn, fails its checksum, does not
/// parse, or breaks index/term ordering. Read errors from the sink itself
/// are returned rather than treated as corruption.
fn recover<S: LogSink>(sink: &mut S, max_record_bytes: u32) -> Result<Recovered> {
    let mut reader = CountingReader::new(BufReader::new(sink));
    let mut entries: Vec<LogEntry> = Vec::new();
    let mut valid_len = 0;

    let corrupt = loop {
        match codec::decode_with_limit(&mut reader, max_record_bytes) {
            Ok(entry) => {
                if let Some(last) = entries.last() {
                    if entry.index <= last.index || entry.term < last.term {
                        break Some(CodecError::OutOfSequence {
                            prev: (last.index, last.term),
                            next: (entry.index, entry.term),
                        });
                    }
                }
                valid_len = reader.bytes_read();
                entries.push(entry);
            }
            Err(CodecError::EndOfStream) => break None,
            Err(CodecError::Io(e)) => return Err(LogError::Sink(e)),
            Err(e) => break Some(e),
        }
    };

    if corrupt.is_some() {
        io::copy(&mut reader, &mut io::sink())?;
    }

    Ok(Recovered {
        entries,
        valid_len,
        total_len: reader.bytes_read(),
        corrupt,
    })
}

/// Reader adapter that tracks how many bytes have been consumed
struct CountingReader<R> {
    inner: R,
    bytes: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_read(&self) -> u64 {
        self.bytes
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes += n as u64;
        Ok(n)
    }
}
