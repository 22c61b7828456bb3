//! # comprehensive storage tests
//!
//! why: verify the log survives restarts when backed by a real file
//! relations: tests raft-storage's FileSink driving raft-core's Log
//! what: persistence, crash recovery, torn writes, corrupt tails

use raft_core::{codec, encode_peers, CallbackError, Log, LogEntry, PeerDescriptor, Peers};
use raft_storage::{FileSink, LOG_FILE_NAME};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

fn noop(_: u64, _: &[u8]) -> Vec<u8> {
    Vec::new()
}

fn nocfg(_: Peers) -> Result<(), CallbackError> {
    Ok(())
}

fn open_log(dir: &Path) -> Log<FileSink> {
    Log::new(FileSink::in_dir(dir).unwrap(), noop, nocfg).unwrap()
}

fn append_raw(dir: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(dir.join(LOG_FILE_NAME))
        .unwrap();
    file.write_all(bytes).unwrap();
}

// =============================================================================
// SECTION 1: PERSISTENCE TESTS
// =============================================================================

mod persistence {
    use super::*;

    #[test]
    fn new_directory_starts_empty() {
        let dir = tempdir().unwrap();
        let log = open_log(dir.path());

        assert!(log.is_empty());
        assert_eq!(log.commit_index(), 0);
        assert!(dir.path().join(LOG_FILE_NAME).exists());
    }

    #[test]
    fn only_committed_entries_reach_the_file() {
        let dir = tempdir().unwrap();
        let log = open_log(dir.path());

        log.append_entry(LogEntry::new(1, 1, b"SET key1 value1".to_vec())).unwrap();
        log.append_entry(LogEntry::new(2, 1, b"SET key2 value2".to_vec())).unwrap();
        assert_eq!(fs::metadata(dir.path().join(LOG_FILE_NAME)).unwrap().len(), 0);

        log.commit_to(1).unwrap();

        let bytes = fs::read(dir.path().join(LOG_FILE_NAME)).unwrap();
        let entry = codec::decode(&mut bytes.as_slice()).unwrap();
        assert_eq!(entry.command, b"SET key1 value1".to_vec());
        assert_eq!(bytes.len(), codec::encoded_len(&entry).unwrap());
    }
}

// =============================================================================
// SECTION 2: CRASH RECOVERY TESTS
// =============================================================================

mod crash_recovery {
    use super::*;

    #[test]
    fn committed_entries_survive_restart() {
        let dir = tempdir().unwrap();

        // first "session"
        {
            let log = open_log(dir.path());
            for (index, term) in [(1, 1), (2, 1), (3, 2)] {
                log.append_entry(LogEntry::new(index, term, b"{}".to_vec())).unwrap();
            }
            log.commit_to(3).unwrap();
        }

        // "restart"
        {
            let log = open_log(dir.path());
            assert_eq!(log.len(), 3);
            assert_eq!(log.commit_index(), 3);
            assert_eq!(log.last_term(), 2);
            assert!(log.contains(1, 1));
            assert!(log.contains(2, 1));
            assert!(log.contains(3, 2));
        }
    }

    #[test]
    fn uncommitted_entries_are_lost_on_restart() {
        let dir = tempdir().unwrap();
        {
            let log = open_log(dir.path());
            log.append_entry(LogEntry::new(1, 1, vec![1])).unwrap();
            log.append_entry(LogEntry::new(2, 1, vec![2])).unwrap();
            log.commit_to(1).unwrap();
        }

        let log = open_log(dir.path());
        assert_eq!(log.len(), 1);
        assert!(!log.contains(2, 1));
    }

    #[test]
    fn recommitting_recovered_index_writes_nothing() {
        let dir = tempdir().unwrap();
        {
            let log = open_log(dir.path());
            log.append_entry(LogEntry::new(1, 1, vec![1])).unwrap();
            log.commit_to(1).unwrap();
        }
        let size = fs::metadata(dir.path().join(LOG_FILE_NAME)).unwrap().len();

        let log = open_log(dir.path());
        log.commit_to(1).unwrap();

        assert_eq!(fs::metadata(dir.path().join(LOG_FILE_NAME)).unwrap().len(), size);
    }

    #[test]
    fn recovery_skips_callbacks_and_new_commits_apply_once() {
        let dir = tempdir().unwrap();
        {
            let log = open_log(dir.path());
            log.append_entry(LogEntry::new(1, 1, vec![1])).unwrap();
            log.commit_to(1).unwrap();
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let log = Log::new(
            FileSink::in_dir(dir.path()).unwrap(),
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Vec::new()
            },
            nocfg,
        )
        .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        log.append_entry(LogEntry::new(2, 1, vec![2])).unwrap();
        log.commit_to(2).unwrap();
        log.commit_to(2).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn configuration_flag_survives_restart() {
        let dir = tempdir().unwrap();
        let peers = PeerDescriptor::peer_set([PeerDescriptor::new(1, "127.0.0.1:7001")]);
        {
            let log = open_log(dir.path());
            log.append_entry(LogEntry::configuration(1, 1, encode_peers(&peers).unwrap()))
                .unwrap();
            log.commit_to(1).unwrap();
        }

        let log = open_log(dir.path());
        let entry = log.entry(1).unwrap();
        assert!(entry.is_configuration);
        assert_eq!(raft_core::decode_peers(&entry.command).unwrap(), peers);
    }
}

// =============================================================================
// SECTION 3: TORN WRITE / CORRUPTION TESTS
// =============================================================================

mod corruption {
    use super::*;

    #[test]
    fn torn_write_is_cut_and_log_keeps_going() {
        let dir = tempdir().unwrap();
        {
            let log = open_log(dir.path());
            log.append_entry(LogEntry::new(1, 1, b"{}".to_vec())).unwrap();
            log.commit_to(1).unwrap();
        }
        let valid = fs::metadata(dir.path().join(LOG_FILE_NAME)).unwrap().len();

        // half of a second record, as if the process died mid-write
        let mut torn = Vec::new();
        codec::encode(&LogEntry::new(2, 1, b"lost".to_vec()), &mut torn).unwrap();
        append_raw(dir.path(), &torn[..torn.len() / 2]);

        {
            let log = open_log(dir.path());
            assert_eq!(log.len(), 1);
            assert_eq!(fs::metadata(dir.path().join(LOG_FILE_NAME)).unwrap().len(), valid);

            log.append_entry(LogEntry::new(2, 2, b"kept".to_vec())).unwrap();
            log.commit_to(2).unwrap();
        }

        let log = open_log(dir.path());
        assert_eq!(log.len(), 2);
        assert!(log.contains(2, 2));
        assert_eq!(log.entry(2).unwrap().command, b"kept".to_vec());
    }

    #[test]
    fn garbage_tail_is_discarded() {
        let dir = tempdir().unwrap();
        {
            let log = open_log(dir.path());
            log.append_entry(LogEntry::new(1, 1, b"{}".to_vec())).unwrap();
            log.commit_to(1).unwrap();
        }
        append_raw(dir.path(), b"garbage");

        let log = open_log(dir.path());
        assert_eq!(log.len(), 1);
        assert!(log.contains(1, 1));

        log.append_entry(LogEntry::new(4, 3, br#"{"foo": "bar"}"#.to_vec()))
            .unwrap();
        assert!(log.contains(4, 3));
    }

    #[test]
    fn flipped_byte_drops_that_record_and_everything_after() {
        let dir = tempdir().unwrap();
        {
            let log = open_log(dir.path());
            for index in 1..=3 {
                log.append_entry(LogEntry::new(index, 1, vec![index as u8])).unwrap();
            }
            log.commit_to(3).unwrap();
        }

        let path = dir.path().join(LOG_FILE_NAME);
        let mut bytes = fs::read(&path).unwrap();
        let first = codec::encoded_len(&LogEntry::new(1, 1, vec![1])).unwrap();
        bytes[first + codec::HEADER_SIZE + 1] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        let log = open_log(dir.path());
        assert_eq!(log.len(), 1);
        assert_eq!(log.commit_index(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), first as u64);
    }
}
