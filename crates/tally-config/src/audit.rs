//! Change-capture audit configuration.

use serde::{Deserialize, Serialize};

fn default_table_suffix() -> String {
    "_audit".to_string()
}

/// Default result limit for audit queries.
const fn default_limit() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Suffix appended to a monitored table's name to form its audit relation.
    #[serde(default = "default_table_suffix")]
    pub table_suffix: String,

    #[serde(default = "default_limit")]
    pub default_limit: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            table_suffix: default_table_suffix(),
            default_limit: default_limit(),
        }
    }
}
