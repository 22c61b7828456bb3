//! # config
//!
//! why: let operators tune durability and recovery without code changes
//! relations: consumed by store.rs, limits passed through to codec.rs
//! what: LogConfig with defaults and json loading

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_MAX_RECORD_BYTES;

/// Configuration for a log store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Largest record body accepted during recovery
    pub max_record_bytes: u32,
    /// Sync the sink after every non-empty commit batch
    pub sync_on_commit: bool,
    /// Cut a corrupt tail off the sink after recovery
    pub discard_corrupt_tail: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            sync_on_commit: true,
            discard_corrupt_tail: true,
        }
    }
}

impl LogConfig {
    /// Parse from json; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = LogConfig::default();
        assert_eq!(config.max_record_bytes, 64 * 1024 * 1024);
        assert!(config.sync_on_commit);
        assert!(config.discard_corrupt_tail);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = LogConfig::from_json(r#"{"sync_on_commit": false}"#).unwrap();
        assert!(!config.sync_on_commit);
        assert!(config.discard_corrupt_tail);
        assert_eq!(config.max_record_bytes, DEFAULT_MAX_RECORD_BYTES);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(LogConfig::from_json(r#"{"max_record_bytes": "big"}"#).is_err());
    }
}
