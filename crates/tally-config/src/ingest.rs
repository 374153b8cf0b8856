//! Ingestion defaults: delimiter, batching, staging names.

use serde::{Deserialize, Serialize};

const fn default_delimiter() -> char {
    ','
}

/// Rows per insert batch handed from the parser to the loader.
const fn default_batch_size() -> usize {
    500
}

fn default_staging_prefix() -> String {
    "_stg".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Field delimiter for input files.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Whether `infer` drops an existing table of the same name.
    #[serde(default)]
    pub drop_existing: bool,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Prefix of transient staging relations.
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            drop_existing: false,
            batch_size: default_batch_size(),
            staging_prefix: default_staging_prefix(),
        }
    }
}

impl IngestConfig {
    /// The delimiter as the single byte the CSV reader expects, if ASCII.
    pub fn delimiter_byte(&self) -> Option<u8> {
        u8::try_from(self.delimiter).ok().filter(u8::is_ascii)
    }
}
