use std::path::PathBuf;

use rand::RngCore;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Mode, PassConfig};
use crate::model::{BaseId, Module, VerifyError};
use crate::services::debloat::{DebloatReport, Debloater};
use crate::services::instrument::{CoverageInstrumenter, InstrumentReport};
use crate::store::{
    canonicalize, load_profile, IdMapping, IdentifierStore, ModuleSnapshotter, OutputLayout,
    StoreError,
};

/// Fatal conditions for one pass invocation. There is no partial success:
/// any of these means the module must not be used.
#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Module `{module}` is ill-formed after {phase}: {source}")]
    IllFormed {
        module: String,
        phase: &'static str,
        #[source]
        source: VerifyError,
    },

    #[error(
        "Function `{function}` needs coverage ids {base}..{end} but the coverage map holds {map_size}"
    )]
    IdOutOfRange { function: String, base: BaseId, end: u64, map_size: u32 },

    #[error("Function `{function}` has {blocks} blocks; ids from {base} overflow the coverage id space")]
    IdOverflow { function: String, base: BaseId, blocks: usize },
}

/// What one invocation did to its module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassOutcome {
    pub mode: Mode,
    /// Whether the IR was mutated (what the host's pass manager is told).
    pub modified: bool,
    /// True when the module matched an excluded prefix and was left alone.
    pub excluded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<InstrumentReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debloat: Option<DebloatReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
}

impl PassOutcome {
    fn unmodified(mode: Mode) -> Self {
        Self {
            mode,
            modified: false,
            excluded: false,
            instrument: None,
            debloat: None,
            snapshot: None,
        }
    }
}

/// Coordinator that dispatches one module through the phase selected by
/// `config.shm_size`, using injected stores for all persistent state.
pub struct PassRunner<'a> {
    pub config: &'a PassConfig,
    pub ids: &'a dyn IdentifierStore,
    pub snapshots: &'a ModuleSnapshotter,
}

impl<'a> PassRunner<'a> {
    /// Run with the thread-local RNG (only the legacy mode draws from it).
    pub fn run(&self, module: &mut Module) -> Result<PassOutcome, PassError> {
        self.run_with_rng(module, &mut rand::thread_rng())
    }

    pub fn run_with_rng(
        &self,
        module: &mut Module,
        rng: &mut dyn RngCore,
    ) -> Result<PassOutcome, PassError> {
        let mode = self.config.mode();
        info!(module = %module.path, mode = mode.as_str(), "running pass");

        if mode != Mode::Snapshot && self.config.is_excluded(&module.path) {
            info!(module = %module.path, "module matches an excluded prefix; skipped");
            return Ok(PassOutcome { excluded: true, ..PassOutcome::unmodified(mode) });
        }

        match mode {
            Mode::Snapshot => {
                let path = self.snapshots.save(module)?;
                Ok(PassOutcome { snapshot: Some(path), ..PassOutcome::unmodified(mode) })
            }
            Mode::Instrument => {
                let mut outcome = PassOutcome::unmodified(mode);
                if let Some(ids) = self.load_ids(module)? {
                    let report = self.instrumenter().instrument(module, &ids)?;
                    outcome.modified = report.modified();
                    outcome.instrument = Some(report);
                }
                outcome.snapshot = Some(self.snapshots.save(module)?);
                Ok(outcome)
            }
            Mode::Debloat => {
                let Some(ids) = self.load_ids(module)? else {
                    return Ok(PassOutcome::unmodified(mode));
                };
                let layout = OutputLayout::new(&self.config.out_dir);
                let executed = load_profile(&layout.profile_log_path)?;
                info!(executed = executed.len(), "loaded profile log");

                let instrumented = self.instrumenter().instrument(module, &ids)?;
                let debloated = Debloater::new(self.config.debloat).debloat(module, &executed, &ids)?;
                Ok(PassOutcome {
                    modified: instrumented.modified() || debloated.modified(),
                    instrument: Some(instrumented),
                    debloat: Some(debloated),
                    ..PassOutcome::unmodified(mode)
                })
            }
            Mode::Legacy { bound } => {
                warn!(bound, "legacy random-id instrumentation is deprecated");
                let report = self.instrumenter().instrument_legacy(module, bound, rng);
                Ok(PassOutcome {
                    modified: report.modified(),
                    instrument: Some(report),
                    ..PassOutcome::unmodified(mode)
                })
            }
        }
    }

    fn instrumenter(&self) -> CoverageInstrumenter {
        CoverageInstrumenter::new(&self.config.map)
    }

    /// Mapping for `module`, `None` only when the module has nothing to
    /// instrument. A missing record for a module that needs one is fatal.
    fn load_ids(&self, module: &Module) -> Result<Option<IdMapping>, PassError> {
        let key = canonicalize(&module.path);
        match self.ids.load(&key)? {
            Some(ids) => {
                for (first, second) in ids.overlaps(module) {
                    warn!(module = %module.path, %first, %second, "coverage id ranges overlap");
                }
                Ok(Some(ids))
            }
            None if !module.has_instrumentable_functions() => Ok(None),
            None => Err(StoreError::MissingIdFile {
                module: module.path.clone(),
                path: OutputLayout::new(&self.config.out_dir).id_file_path(&key),
            }
            .into()),
        }
    }
}
