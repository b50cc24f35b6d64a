use std::path::{Path, PathBuf};

use super::path_key::canonicalize;

/// File name of the profile log written by the runtime collector.
pub const PROFILE_LOG_NAME: &str = "profile.log";

/// Logical layout of the shared output directory.
///
/// This is derived from a chosen directory. It does *not* perform any IO itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Directory shared by every invocation of one build.
    pub out_dir: PathBuf,
    /// Path to the profile log (`profile.log`).
    pub profile_log_path: PathBuf,
}

impl OutputLayout {
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        let out_dir = out_dir.as_ref().to_path_buf();
        let profile_log_path = out_dir.join(PROFILE_LOG_NAME);
        Self { out_dir, profile_log_path }
    }

    /// `{out_dir}/{key}.bc`
    pub fn snapshot_path(&self, key: &str) -> PathBuf {
        self.out_dir.join(format!("{key}.bc"))
    }

    /// `{out_dir}/{key}.bc.id`
    pub fn id_file_path(&self, key: &str) -> PathBuf {
        self.out_dir.join(format!("{key}.bc.id"))
    }

    /// Snapshot path for a module given its logical path.
    pub fn module_snapshot_path(&self, module_path: &str) -> PathBuf {
        self.snapshot_path(&canonicalize(module_path))
    }

    /// Identifier file path for a module given its logical path.
    pub fn module_id_file_path(&self, module_path: &str) -> PathBuf {
        self.id_file_path(&canonicalize(module_path))
    }
}
