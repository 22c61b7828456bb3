//! # raft-storage
//!
//! why: give the raft log a durable home using standard rust fs apis
//! relations: implements raft_core::LogSink, read back by raft_core::Log on startup
//! what: FileSink, an append-only log file with fsync and tail truncation

use raft_core::LogSink;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// name of the log file inside a storage directory
pub const LOG_FILE_NAME: &str = "log.dat";

/// file-backed sink for committed log entries
///
/// the file is opened in append mode: reads start at offset 0 and every
/// write lands at the current end, whatever has been read so far.
#[derive(Debug)]
pub struct FileSink {
    /// path of the backing file
    path: PathBuf,
    /// open handle (read + append)
    file: File,
}

impl FileSink {
    /// open or create the log file at `path`
    /// creates missing parent directories
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        tracing::debug!("Opened log file {}", path.display());
        Ok(Self { path, file })
    }

    /// open or create `log.dat` inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> io::Result<Self> {
        Self::open(dir.as_ref().join(LOG_FILE_NAME))
    }

    /// path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// current size of the file in bytes
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Read for FileSink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl LogSink for FileSink {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let before = self.len()?;
        self.file.set_len(len)?;
        self.file.sync_all()?;
        tracing::info!(
            "Truncated {} from {} to {} bytes",
            self.path.display(),
            before,
            len
        );
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory_and_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raft_data").join("node1.log");

        let sink = FileSink::open(&path).unwrap();

        assert!(path.exists());
        assert!(sink.is_empty().unwrap());
    }

    #[test]
    fn in_dir_uses_log_file_name() {
        let dir = tempdir().unwrap();
        let sink = FileSink::in_dir(dir.path()).unwrap();
        assert_eq!(sink.path(), dir.path().join(LOG_FILE_NAME));
    }

    #[test]
    fn writes_append_after_reading() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(LOG_FILE_NAME), b"abc").unwrap();

        let mut sink = FileSink::in_dir(dir.path()).unwrap();
        let mut first = [0u8; 1];
        sink.read_exact(&mut first).unwrap();
        sink.write_all(b"def").unwrap();

        assert_eq!(fs::read(sink.path()).unwrap(), b"abcdef");
    }

    #[test]
    fn truncate_then_write_continues_at_new_end() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(LOG_FILE_NAME), b"good-garbage").unwrap();

        let mut sink = FileSink::in_dir(dir.path()).unwrap();
        sink.truncate(4).unwrap();
        sink.write_all(b"!").unwrap();
        sink.sync().unwrap();

        assert_eq!(fs::read(sink.path()).unwrap(), b"good!");
    }
}
