//! # sink
//!
//! why: abstract over where committed entries are made durable
//! relations: read once and then appended to by store.rs, file version in raft-storage
//! what: LogSink trait, MemorySink

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Append-only byte stream holding the committed log
///
/// The log reads it sequentially from the start once, at construction, and
/// only writes to it afterwards. Writes always land at the current end.
pub trait LogSink: Read + Write + Send {
    /// Cut the stream to its first `len` bytes; later writes continue from there
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Make everything written so far durable
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl<T: LogSink + ?Sized> LogSink for Box<T> {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        (**self).truncate(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// In-memory sink for testing and ephemeral logs
///
/// Clones share the same buffer, so a test can keep a handle to inspect what
/// the log wrote, or hand a copy to a new log to simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    data: Arc<Mutex<Vec<u8>>>,
    read_pos: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink pre-filled with `bytes`, as if left behind by an earlier run
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes.into())),
            read_pos: 0,
        }
    }

    /// Copy of every byte currently in the sink
    pub fn contents(&self) -> Vec<u8> {
        self.buffer().clone()
    }

    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fresh handle on the same buffer, reading from the start
    pub fn reopen(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            read_pos: 0,
        }
    }

    fn buffer(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Read for MemorySink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let available = data.len().saturating_sub(self.read_pos);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&data[self.read_pos..self.read_pos + n]);
        drop(data);
        self.read_pos += n;
        Ok(n)
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogSink for MemorySink {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.truncate(len);
        self.read_pos = self.read_pos.min(data.len());
        Ok(())
    }
}
