//! libSQL store configuration.

use serde::{Deserialize, Serialize};

fn default_path() -> String {
    "tally.db".to_string()
}

fn default_schema() -> String {
    "main".to_string()
}

/// Default busy timeout in milliseconds.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the local libSQL database file.
    #[serde(default = "default_path")]
    pub path: String,

    /// Schema holding target tables (`main` or an attached database name).
    #[serde(default = "default_schema")]
    pub schema: String,

    /// How long a connection waits on SQLite's write lock before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            schema: default_schema(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Whether the database lives only in memory (one connection sees it).
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}
