use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hundun::commands::{
    assign_ids_command, coverage_command, inspect_command, run_pass_command, show_ids_command,
    RunOptions,
};
use hundun::init_logging;

/// Persistent-id coverage instrumentation and debloating CLI.
///
/// This CLI is a thin wrapper around `hundun-core` (exposed in code as `hundun_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "hundun",
    version,
    about = "Persistent-id coverage instrumentation and profile-guided debloating",
    long_about = None
)]
struct Cli {
    /// Log debug diagnostics to stderr (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pass over one module, as one compiler invocation would.
    ///
    /// The mode follows the shared-memory size selector:
    /// - `0`: snapshot only.
    /// - `4294967295`: instrument with persistent ids, then snapshot.
    /// - `4294967294`: instrument, then debloat against `profile.log`.
    /// - anything else: legacy random ids below that bound (deprecated).
    Run {
        /// Module to process (JSON IR or binary snapshot).
        #[arg(long)]
        module: PathBuf,

        /// Pass config JSON. Flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Shared output directory for id files, snapshots and the profile log.
        #[arg(long)]
        out_dir: Option<String>,

        /// Shared-memory size selector driving the mode.
        #[arg(long)]
        shm_size: Option<u32>,

        /// Write the resulting module here as JSON.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Seed for legacy random ids.
        #[arg(long)]
        seed: Option<u64>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Assign disjoint coverage id ranges to modules and write their id files.
    ///
    /// Fails if any module already has an identifier file.
    AssignIds {
        /// Shared output directory.
        #[arg(long, default_value = ".")]
        out_dir: String,

        /// First coverage id to hand out.
        #[arg(long, default_value_t = 0)]
        start: u32,

        /// Modules to assign, in order (JSON IR or snapshots).
        #[arg(required = true)]
        modules: Vec<PathBuf>,
    },

    /// Show the identifier record for a module's logical path.
    ShowIds {
        /// Shared output directory.
        #[arg(long, default_value = ".")]
        out_dir: String,

        /// Logical module path (e.g. `a/b.cc`).
        #[arg(long)]
        module_path: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Summarize a module file: functions, coverage ids, traps, structure check.
    Inspect {
        /// Module file (JSON IR or binary snapshot).
        path: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Report executed/total blocks per function against a profile log.
    Coverage {
        /// Shared output directory.
        #[arg(long, default_value = ".")]
        out_dir: String,

        /// Module file (JSON IR or binary snapshot).
        #[arg(long)]
        module: PathBuf,

        /// Profile log; defaults to `<out-dir>/profile.log`.
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run { module, config, out_dir, shm_size, output, seed, json } => {
            let opts = RunOptions {
                config: config.as_deref(),
                out_dir: out_dir.as_deref(),
                shm_size,
                output: output.as_deref(),
                seed,
                json,
            };
            run_pass_command(&module, &opts)?;
        }
        Command::AssignIds { out_dir, start, modules } => {
            assign_ids_command(&out_dir, start, &modules)?;
        }
        Command::ShowIds { out_dir, module_path, json } => {
            show_ids_command(&out_dir, &module_path, json)?
        }
        Command::Inspect { path, json } => {
            inspect_command(&path, json)?;
        }
        Command::Coverage { out_dir, module, profile, json } => {
            coverage_command(&out_dir, &module, profile.as_deref(), json)?;
        }
    }

    Ok(())
}
