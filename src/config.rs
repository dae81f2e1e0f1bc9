use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/bot.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file; without one, state lives in memory only.
    pub database_path: Option<String>,
    /// Number of chat messages kept in the history window.
    pub chat_history: usize,
    /// Endpoint polled for the latest block.
    pub block_source_url: Option<String>,
    pub block_poll_secs: u64,
    /// Upper bound for a single block request.
    pub block_timeout_secs: u64,
    pub queue_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            chat_history: 100,
            block_source_url: None,
            block_poll_secs: 30,
            block_timeout_secs: 10,
            queue_capacity: 100,
        }
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"chat_history": 500, "database_path": "data/bot.db"}}"#).unwrap();

        let config = load_config(file.path().to_str().unwrap());
        assert_eq!(config.chat_history, 500);
        assert_eq!(config.database_path.as_deref(), Some("data/bot.db"));
        assert_eq!(config.block_poll_secs, 30);
        assert_eq!(config.block_timeout_secs, 10);
        assert!(config.block_source_url.is_none());
    }

    #[test]
    fn missing_or_broken_file_yields_defaults() {
        assert_eq!(load_config("does/not/exist.json"), AppConfig::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert_eq!(
            load_config(file.path().to_str().unwrap()),
            AppConfig::default()
        );
    }
}
