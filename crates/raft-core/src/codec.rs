//! # codec
//!
//! why: frame log entries so a stream of them can be read back one by one
//! relations: used by store.rs for commit writes and crash recovery
//! what: encode/decode of a single checksummed record
//!
//! Record format: `[len: u32 LE][crc32(body): u32 LE][body: len bytes]`,
//! where the body is the JSON form of the entry's persisted fields.

use std::io::{self, Read, Write};

use crate::error::CodecError;
use crate::log::LogEntry;

/// Size of the fixed record header
pub const HEADER_SIZE: usize = 8;

/// Default upper bound on a single record body
pub const DEFAULT_MAX_RECORD_BYTES: u32 = 64 * 1024 * 1024;

/// Write one framed entry to `w`, returning the number of bytes written
///
/// The whole record is assembled first and handed to the writer in a single
/// `write_all`, so a short write can only ever tear the final record.
pub fn encode<W: Write>(entry: &LogEntry, w: &mut W) -> Result<usize, CodecError> {
    let record = to_record(entry)?;
    w.write_all(&record)?;
    Ok(record.len())
}

/// Read one framed entry from `r`, refusing bodies above the default limit
pub fn decode<R: Read>(r: &mut R) -> Result<LogEntry, CodecError> {
    decode_with_limit(r, DEFAULT_MAX_RECORD_BYTES)
}

/// Read one framed entry from `r`, refusing bodies larger than `max_len`
///
/// Returns `CodecError::EndOfStream` if the stream ends exactly at a record
/// boundary. Nothing is produced unless the full record checks out.
pub fn decode_with_limit<R: Read>(r: &mut R, max_len: u32) -> Result<LogEntry, CodecError> {
    let mut header = [0u8; HEADER_SIZE];
    match read_full(r, &mut header)? {
        0 => return Err(CodecError::EndOfStream),
        n if n < HEADER_SIZE => return Err(CodecError::Truncated),
        _ => {}
    }

    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let expected = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if len > max_len {
        return Err(CodecError::RecordTooLarge { len, max: max_len });
    }

    let mut body = vec![0u8; len as usize];
    if read_full(r, &mut body)? < body.len() {
        return Err(CodecError::Truncated);
    }

    let actual = crc32fast::hash(&body);
    if actual != expected {
        return Err(CodecError::ChecksumMismatch { expected, actual });
    }

    Ok(serde_json::from_slice(&body)?)
}

/// Size in bytes of the framed form of `entry`
pub fn encoded_len(entry: &LogEntry) -> Result<usize, CodecError> {
    Ok(HEADER_SIZE + serde_json::to_vec(entry)?.len())
}

fn to_record(entry: &LogEntry) -> Result<Vec<u8>, CodecError> {
    let body = serde_json::to_vec(entry)?;
    let len = u32::try_from(body.len()).map_err(|_| CodecError::RecordTooLarge {
        len: u32::MAX,
        max: u32::MAX,
    })?;

    let mut record = Vec::with_capacity(HEADER_SIZE + body.len());
    record.extend_from_slice(&len.to_le_bytes());
    record.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    record.extend_from_slice(&body);
    Ok(record)
}

/// Like `read_exact`, but reports how many bytes arrived before EOF
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
