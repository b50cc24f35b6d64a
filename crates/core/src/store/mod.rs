//! Flat-file coordination between independent compiler invocations.
//!
//! Everything lives in one shared output directory:
//! - `{key}.bc.id`: function name -> base id for one module
//! - `profile.log`: coverage ids observed by the runtime collector
//! - `{key}.bc`: module snapshot handed from one phase to the next
//!
//! Every per-key file has a single writer and a single reader by construction
//! (one compiler invocation per module key, enforced by the build system). No
//! locking is done; a violated precondition surfaces as a `StoreError`.

pub mod ids;
pub mod layout;
pub mod path_key;
pub mod profile;
pub mod snapshot;

use std::path::PathBuf;

use thiserror::Error;

pub use ids::{assign_ids, FsIdStore, IdMapping, IdentifierStore, MemoryIdStore};
pub use layout::OutputLayout;
pub use path_key::canonicalize;
pub use profile::{load_profile, parse_profile, render_profile, ExecutedIdSet};
pub use snapshot::ModuleSnapshotter;

/// Error type for the file-based stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The module needs instrumentation but nobody assigned it ids.
    #[error("No identifier file for module `{module}` at {}", path.display())]
    MissingIdFile { module: String, path: PathBuf },

    /// Debloating has nothing to work from without a profile.
    #[error("Profile log not found at {}", .0.display())]
    MissingProfile(PathBuf),

    /// Identifier files are written exactly once per key.
    #[error("Identifier file already exists at {}; refusing to reassign ids", .0.display())]
    IdFileExists(PathBuf),

    #[error("Malformed record in {} line {line}: {reason}", path.display())]
    MalformedRecord { path: PathBuf, line: usize, reason: String },

    /// Allocation ran past the largest representable coverage id.
    #[error("Coverage id space exhausted at `{function}` in module `{module}`")]
    IdSpaceExhausted { module: String, function: String },

    #[error("Snapshot error for {}: {reason}", path.display())]
    Snapshot { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io { path: path.into(), source }
    }

    /// True for the configuration class of errors (missing or unusable inputs).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StoreError::MissingIdFile { .. }
                | StoreError::MissingProfile(_)
                | StoreError::IdFileExists(_)
                | StoreError::Io { .. }
        )
    }
}

/// Convenience result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
