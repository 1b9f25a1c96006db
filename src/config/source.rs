//! Ledger source configuration types.

use serde::Deserialize;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;

/// Source type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Archive,
    Live,
}

/// Where ledger close records come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub archive: ArchiveConfig,
    pub live: LiveConfig,
    /// Largest accepted frame, in bytes.
    pub max_frame_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_type: SourceType::Archive,
            archive: ArchiveConfig::default(),
            live: LiveConfig::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// File of framed ledger records.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub path: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: "data/ledgers.bin".to_string(),
        }
    }
}

/// Node process writing framed ledger records to stdout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub command: String,
    /// `{start_ledger}` is replaced with the first ledger to emit.
    pub args: Vec<String>,
}
