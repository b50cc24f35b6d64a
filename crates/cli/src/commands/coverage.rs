use std::path::Path;

use anyhow::{anyhow, Context, Result};
use hundun_core::model::CoverageId;
use hundun_core::store::{canonicalize, load_profile, FsIdStore, IdentifierStore, OutputLayout};
use serde::Serialize;

use crate::{canonicalize_or_current, load_module};

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FunctionCoverage {
    pub name: String,
    pub base: CoverageId,
    pub blocks: usize,
    pub executed: usize,
    /// Ids of blocks the profile never saw.
    pub missed: Vec<CoverageId>,
}

/// Per-function executed/total block counts for one module against a profile.
///
/// Uses `profile` when given, otherwise `{out_dir}/profile.log`.
pub fn coverage_command(
    out_dir: &str,
    module_path: &Path,
    profile: Option<&Path>,
    json: bool,
) -> Result<Vec<FunctionCoverage>> {
    let out_dir = canonicalize_or_current(out_dir)?;
    let layout = OutputLayout::new(&out_dir);
    let module = load_module(module_path)?;

    let key = canonicalize(&module.path);
    let ids = FsIdStore::new(layout.clone())
        .load(&key)
        .context("Failed to load identifier file")?
        .ok_or_else(|| anyhow!("No identifier file for `{}`", module.path))?;
    let profile_path = profile.map(Path::to_path_buf).unwrap_or(layout.profile_log_path);
    let executed = load_profile(&profile_path).context("Failed to load profile log")?;

    let mut rows = Vec::new();
    for function in module.functions.iter().filter(|f| f.has_body()) {
        let Some(base) = ids.resolve(&function.name) else { continue };
        let all: Vec<CoverageId> = (0..function.blocks.len())
            .map(|p| CoverageId::try_from(p).ok().and_then(|p| base.checked_add(p)))
            .collect::<Option<_>>()
            .ok_or_else(|| {
                anyhow!(
                    "Function `{}` has {} blocks; ids from {base} overflow the coverage id space",
                    function.name,
                    function.blocks.len()
                )
            })?;
        let missed: Vec<CoverageId> = all.iter().copied().filter(|id| !executed.contains(*id)).collect();
        rows.push(FunctionCoverage {
            name: function.name.clone(),
            base,
            blocks: all.len(),
            executed: all.len() - missed.len(),
            missed,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(rows);
    }

    let total: usize = rows.iter().map(|r| r.blocks).sum();
    let hit: usize = rows.iter().map(|r| r.executed).sum();
    println!("Coverage for {} ({hit}/{total} blocks executed)", module.path);
    for row in &rows {
        println!("- {}: {}/{} (base {})", row.name, row.executed, row.blocks, row.base);
    }
    Ok(rows)
}
