use std::path::Path;

use serde::{Deserialize, Serialize};

/// Engine tuning knobs. Hosts usually construct this once, optionally from a
/// JSON file, and hand it to the engine constructor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between background conversation-list refreshes. Zero
    /// disables polling entirely.
    pub poll_interval_ms: u64,
    /// Page size for message fetches.
    pub message_page_size: u32,
    /// How long a typing indicator stays visible without a refreshing event.
    pub typing_ttl_ms: u64,
    /// Composer inactivity window before the stop-typing intent goes out.
    pub typing_idle_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            message_page_size: 50,
            typing_ttl_ms: 3_000,
            typing_idle_ms: 3_000,
        }
    }
}

impl EngineConfig {
    /// Reads config from a JSON file. A missing file or invalid JSON falls
    /// back to defaults rather than failing engine startup.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "invalid engine config, using defaults");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "no engine config file, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load("/definitely/not/here.json");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "poll_interval_ms": 100 }}"#).unwrap();
        let config = EngineConfig::load(file.path());
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(
            config.message_page_size,
            EngineConfig::default().message_page_size
        );
    }

    #[test]
    fn invalid_json_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert_eq!(EngineConfig::load(file.path()), EngineConfig::default());
    }
}
