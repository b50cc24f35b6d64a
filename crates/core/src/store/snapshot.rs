use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::info;

use super::layout::OutputLayout;
use super::{StoreError, StoreResult};
use crate::model::Module;

/// Leading bytes of every snapshot file.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"HDBC";

/// Snapshot encoding version this crate reads and writes.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Persists modules as `{out_dir}/{key}.bc`.
///
/// Layout: `SNAPSHOT_MAGIC | SNAPSHOT_VERSION | bincode(Module)`. A save
/// overwrites any earlier snapshot for the same key.
#[derive(Debug, Clone)]
pub struct ModuleSnapshotter {
    layout: OutputLayout,
}

impl ModuleSnapshotter {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    /// Write the snapshot for `module` and return its path.
    pub fn save(&self, module: &Module) -> StoreResult<PathBuf> {
        fs::create_dir_all(&self.layout.out_dir)
            .map_err(|e| StoreError::io(&self.layout.out_dir, e))?;
        let path = self.layout.module_snapshot_path(&module.path);
        let bytes = encode(module).map_err(|reason| StoreError::Snapshot { path: path.clone(), reason })?;
        fs::write(&path, bytes).map_err(|e| StoreError::io(&path, e))?;
        info!(module = %module.path, path = %path.display(), "saved module snapshot");
        Ok(path)
    }

    /// Load the snapshot saved for the module at `module_path`, if any.
    pub fn load_for(&self, module_path: &str) -> StoreResult<Option<Module>> {
        let path = self.layout.module_snapshot_path(module_path);
        match Self::load(&path) {
            Ok(module) => Ok(Some(module)),
            Err(StoreError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Decode a snapshot file.
    pub fn load(path: &Path) -> StoreResult<Module> {
        let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        decode(&bytes).map_err(|reason| StoreError::Snapshot { path: path.to_path_buf(), reason })
    }
}

fn encode(module: &Module) -> Result<Vec<u8>, String> {
    let body = bincode::serialize(module).map_err(|e| e.to_string())?;
    let mut bytes = Vec::with_capacity(SNAPSHOT_MAGIC.len() + 1 + body.len());
    bytes.extend_from_slice(SNAPSHOT_MAGIC);
    bytes.push(SNAPSHOT_VERSION);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<Module, String> {
    let body = bytes.strip_prefix(SNAPSHOT_MAGIC.as_slice()).ok_or("not a module snapshot")?;
    match body.split_first() {
        Some((&SNAPSHOT_VERSION, rest)) => bincode::deserialize(rest).map_err(|e| e.to_string()),
        Some((other, _)) => Err(format!("unsupported snapshot version {other}")),
        None => Err("truncated snapshot header".to_string()),
    }
}
