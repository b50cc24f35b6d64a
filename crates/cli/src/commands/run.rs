use std::path::Path;

use anyhow::{anyhow, Context, Result};
use hundun_core::config::{load_pass_config, PassConfig};
use hundun_core::services::pipeline::{PassOutcome, PassRunner};
use hundun_core::store::{FsIdStore, ModuleSnapshotter, OutputLayout};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::{canonicalize_or_current, load_module, write_module_json};

/// Options for one pass invocation as collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions<'a> {
    pub config: Option<&'a Path>,
    pub out_dir: Option<&'a str>,
    pub shm_size: Option<u32>,
    pub output: Option<&'a Path>,
    pub seed: Option<u64>,
    pub json: bool,
}

/// Build the pass config: the config file (if any) with flags layered on top.
pub fn resolve_pass_config(opts: &RunOptions<'_>) -> Result<PassConfig> {
    let mut config = match (opts.config, opts.out_dir, opts.shm_size) {
        (Some(path), _, _) => load_pass_config(path)?,
        (None, Some(out_dir), Some(shm_size)) => PassConfig::new(out_dir, shm_size),
        _ => return Err(anyhow!("Specify --config or both --out-dir and --shm-size")),
    };
    if let Some(out_dir) = opts.out_dir {
        config.out_dir = out_dir.into();
    }
    if let Some(shm_size) = opts.shm_size {
        config.shm_size = shm_size;
    }
    config.out_dir = canonicalize_or_current(&config.out_dir.to_string_lossy())?;
    debug!(out_dir = %config.out_dir.display(), mode = config.mode().as_str(), "resolved pass config");
    Ok(config)
}

/// Run the pass over one module file, as a single compiler invocation would.
pub fn run_pass_command(module_path: &Path, opts: &RunOptions<'_>) -> Result<PassOutcome> {
    let config = resolve_pass_config(opts)?;
    let mut module = load_module(module_path)?;

    let layout = OutputLayout::new(&config.out_dir);
    let ids = FsIdStore::new(layout.clone());
    let snapshots = ModuleSnapshotter::new(layout);
    let runner = PassRunner { config: &config, ids: &ids, snapshots: &snapshots };

    let outcome = match opts.seed {
        Some(seed) => runner.run_with_rng(&mut module, &mut StdRng::seed_from_u64(seed)),
        None => runner.run(&mut module),
    }
    .with_context(|| format!("Pass failed for module `{}`", module.path))?;

    if let Some(output) = opts.output {
        write_module_json(&module, output)?;
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(outcome);
    }

    println!("Module: {}", module.path);
    println!("  Mode: {}", outcome.mode.as_str());
    println!("  Modified: {}", outcome.modified);
    if outcome.excluded {
        println!("  Excluded by prefix: yes");
    }
    if let Some(report) = &outcome.instrument {
        println!("  Instrumented blocks: {}", report.instrumented_blocks());
        for name in &report.unknown_functions {
            println!("  Skipped (no id): {name}");
        }
    }
    if let Some(report) = &outcome.debloat {
        println!("  Trapped blocks: {}", report.trapped_ids().len());
    }
    if let Some(path) = &outcome.snapshot {
        println!("  Snapshot: {}", path.display());
    }
    if let Some(output) = opts.output {
        println!("  Output: {}", output.display());
    }

    Ok(outcome)
}
