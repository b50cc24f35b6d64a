use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use hundun_core::model::{BaseId, Module};
use hundun_core::store::{assign_ids, canonicalize, FsIdStore, IdentifierStore, OutputLayout};
use serde::Serialize;
use tracing::debug;

use crate::{canonicalize_or_current, load_module};

#[derive(Debug, Serialize)]
pub struct IdEntry {
    pub function: String,
    pub base: BaseId,
}

/// Id-assignment phase: give every module a disjoint id range and write its
/// identifier file. Returns the first id left unused.
pub fn assign_ids_command(out_dir: &str, start: BaseId, modules: &[PathBuf]) -> Result<BaseId> {
    if modules.is_empty() {
        return Err(anyhow!("Provide at least one module to assign ids for"));
    }
    let out_dir = canonicalize_or_current(out_dir)?;
    let store = FsIdStore::new(OutputLayout::new(&out_dir));

    let loaded: Vec<Module> = modules.iter().map(|p| load_module(p)).collect::<Result<_>>()?;
    debug!(modules = loaded.len(), start, "assigning coverage ids");
    let next = assign_ids(&store, &loaded, start).context("Failed to assign coverage ids")?;

    println!("Assigned coverage ids {}..{} across {} module(s)", start, next, loaded.len());
    for module in &loaded {
        println!("  {} -> {}", module.path, store.layout().module_id_file_path(&module.path).display());
    }
    Ok(next)
}

/// Print the identifier record of the module at logical path `module_path`.
pub fn show_ids_command(out_dir: &str, module_path: &str, json: bool) -> Result<()> {
    let out_dir = canonicalize_or_current(out_dir)?;
    let store = FsIdStore::new(OutputLayout::new(&out_dir));
    let key = canonicalize(module_path);
    let mapping = store
        .load(&key)
        .with_context(|| format!("Failed to load identifier file for `{module_path}`"))?
        .ok_or_else(|| {
            anyhow!(
                "No identifier file for `{module_path}` at {}",
                store.layout().id_file_path(&key).display()
            )
        })?;

    let mut entries: Vec<IdEntry> = mapping
        .iter()
        .map(|(function, base)| IdEntry { function: function.to_string(), base })
        .collect();
    entries.sort_by_key(|e| e.base);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Identifiers for {module_path} (key {key}):");
    if entries.is_empty() {
        println!("  (none)");
    }
    for entry in entries {
        println!("  {:>10}  {}", entry.base, entry.function);
    }
    Ok(())
}
