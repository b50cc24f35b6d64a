pub mod commands;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hundun_core::model::Module;
use hundun_core::store::snapshot::SNAPSHOT_MAGIC;
use hundun_core::store::ModuleSnapshotter;
use tracing_subscriber::EnvFilter;

/// Canonicalize the output directory if possible, falling back to the given
/// string relative to the current working directory.
pub fn canonicalize_or_current(dir: &str) -> Result<PathBuf> {
    let path = Path::new(dir);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        // Try to canonicalize; if it fails (e.g., the directory does not yet
        // exist), join it with the current dir to get an absolute path.
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Load a module from either a binary snapshot or its JSON form.
///
/// Snapshots are recognized by their magic header, not by extension.
pub fn load_module(path: &Path) -> Result<Module> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read module at {}", path.display()))?;
    if bytes.starts_with(SNAPSHOT_MAGIC) {
        return ModuleSnapshotter::load(path)
            .with_context(|| format!("Failed to decode module snapshot {}", path.display()));
    }
    let module: Module = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse module JSON {}", path.display()))?;
    Ok(module)
}

/// Write a module as pretty JSON.
pub fn write_module_json(module: &Module, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(module)?;
    fs::write(path, json).with_context(|| format!("Failed to write module to {}", path.display()))
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .try_init();
}
