use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::MapAcquire;
use crate::services::debloat::DebloatOptions;

/// Selector value that requests the persistent-id instrument phase.
pub const INSTRUMENT_MARKER: u32 = u32::MAX;

/// Selector value that requests the debloat phase.
pub const DEBLOAT_MARKER: u32 = u32::MAX - 1;

/// Phase selected by the shared-memory size selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Only persist the module.
    Snapshot,
    /// Instrument with persistent ids, then persist.
    Instrument,
    /// Instrument with persistent ids, then neuter never-executed blocks.
    Debloat,
    /// Deprecated: random per-block ids in `[0, bound)`, no id store.
    Legacy { bound: u32 },
}

impl Mode {
    pub fn from_selector(selector: u32) -> Self {
        match selector {
            0 => Mode::Snapshot,
            INSTRUMENT_MARKER => Mode::Instrument,
            DEBLOAT_MARKER => Mode::Debloat,
            bound => Mode::Legacy { bound },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Snapshot => "snapshot",
            Mode::Instrument => "instrument",
            Mode::Debloat => "debloat",
            Mode::Legacy { .. } => "legacy",
        }
    }
}

/// Runtime coverage segment the emitted instrumentation attaches to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageMapConfig {
    /// Well-known shared-memory key.
    #[serde(default = "default_shm_key")]
    pub shm_key: i32,
    /// Segment size in bytes; every coverage id must be below it.
    #[serde(default = "default_map_size")]
    pub size: u32,
    /// Permission bits passed to the attach call.
    #[serde(default = "default_permissions")]
    pub permissions: u32,
    /// Name of the process-wide pointer slot caching the attached base.
    #[serde(default = "default_slot")]
    pub slot: String,
}

fn default_shm_key() -> i32 {
    285_738_243
}

fn default_map_size() -> u32 {
    458_168
}

fn default_permissions() -> u32 {
    0o220
}

fn default_slot() -> String {
    "__hundun_area_ptr".to_string()
}

impl Default for CoverageMapConfig {
    fn default() -> Self {
        Self {
            shm_key: default_shm_key(),
            size: default_map_size(),
            permissions: default_permissions(),
            slot: default_slot(),
        }
    }
}

impl CoverageMapConfig {
    /// The attach parameters as embedded in the IR.
    pub fn acquire_op(&self) -> MapAcquire {
        MapAcquire {
            slot: self.slot.clone(),
            shm_key: self.shm_key,
            size: self.size,
            permissions: self.permissions,
        }
    }
}

/// Serializable configuration for one pass invocation.
///
/// Only `out_dir` and `shm_size` are required; everything else defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassConfig {
    /// Shared output directory for id files, snapshots and the profile log.
    pub out_dir: PathBuf,
    /// Mode selector; see [`Mode::from_selector`].
    pub shm_size: u32,
    #[serde(default)]
    pub map: CoverageMapConfig,
    /// Modules whose logical path starts with one of these are never mutated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_prefixes: Vec<String>,
    #[serde(default)]
    pub debloat: DebloatOptions,
}

impl PassConfig {
    pub fn new(out_dir: impl Into<PathBuf>, shm_size: u32) -> Self {
        Self {
            out_dir: out_dir.into(),
            shm_size,
            map: CoverageMapConfig::default(),
            excluded_prefixes: Vec::new(),
            debloat: DebloatOptions::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_selector(self.shm_size)
    }

    pub fn is_excluded(&self, module_path: &str) -> bool {
        self.excluded_prefixes.iter().any(|prefix| module_path.starts_with(prefix.as_str()))
    }
}

/// Load a pass config JSON file from disk.
pub fn load_pass_config(path: &Path) -> Result<PassConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pass config at {}", path.display()))?;
    let config: PassConfig =
        serde_json::from_str(&json).context("Failed to parse pass config JSON")?;
    Ok(config)
}
