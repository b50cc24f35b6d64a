//! Per-block coverage instrumentation.
//!
//! Each block of a function with base id `b` is tagged `b + position` and gets
//! two ops at its first insertion point: a lazily guarded acquire of the
//! coverage map base and a single-byte store of 1 at `base + id`. Running this
//! twice stacks two layers of ops; phase sequencing prevents that.

use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CoverageMapConfig;
use crate::model::{BaseId, CfgMut, CoverageId, MapAcquire, Module, Op};
use crate::services::pipeline::PassError;
use crate::store::IdMapping;

/// Ids given to one function's blocks, in layout order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentedFunction {
    pub name: String,
    /// `None` for legacy random ids.
    pub base: Option<BaseId>,
    pub ids: Vec<CoverageId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstrumentReport {
    pub functions: Vec<InstrumentedFunction>,
    /// Functions with a body but no entry in the id mapping; left untouched.
    pub unknown_functions: Vec<String>,
    /// Declarations, intrinsics and empty definitions.
    pub skipped_without_body: usize,
}

impl InstrumentReport {
    pub fn ids_for(&self, function: &str) -> Option<&[CoverageId]> {
        self.functions.iter().find(|f| f.name == function).map(|f| f.ids.as_slice())
    }

    pub fn instrumented_blocks(&self) -> usize {
        self.functions.iter().map(|f| f.ids.len()).sum()
    }

    pub fn modified(&self) -> bool {
        self.instrumented_blocks() > 0
    }
}

pub struct CoverageInstrumenter {
    acquire: MapAcquire,
    map_size: u32,
}

impl CoverageInstrumenter {
    pub fn new(map: &CoverageMapConfig) -> Self {
        Self { acquire: map.acquire_op(), map_size: map.size }
    }

    /// Instrument every function that has a body and a base id in `ids`.
    ///
    /// Functions missing from `ids` are skipped with a warning. Fails before
    /// touching the module if any function's id range does not fit the
    /// coverage map.
    pub fn instrument(&self, module: &mut Module, ids: &IdMapping) -> Result<InstrumentReport, PassError> {
        for function in module.functions.iter().filter(|f| f.has_body()) {
            if let Some(base) = ids.resolve(&function.name) {
                let end = u64::from(base) + function.blocks.len() as u64;
                if end > u64::from(self.map_size) {
                    return Err(PassError::IdOutOfRange {
                        function: function.name.clone(),
                        base,
                        end,
                        map_size: self.map_size,
                    });
                }
            }
        }

        let mut report = InstrumentReport::default();
        for function in module.functions.iter_mut() {
            if !function.has_body() {
                report.skipped_without_body += 1;
                continue;
            }
            let Some(base) = ids.resolve(&function.name) else {
                warn!(module = %module.path, function = %function.name, "no base id assigned; function left uninstrumented");
                report.unknown_functions.push(function.name.clone());
                continue;
            };
            let assigned = self.instrument_blocks(function, |pos| base + pos as CoverageId);
            debug!(function = %function.name, base, blocks = assigned.len(), "instrumented");
            report.functions.push(InstrumentedFunction {
                name: function.name.clone(),
                base: Some(base),
                ids: assigned,
            });
        }
        Ok(report)
    }

    /// Deprecated non-persistent mode: every block gets an independent random
    /// id in `[0, bound)`. Ids are not reproducible across runs.
    pub fn instrument_legacy<R: Rng + ?Sized>(
        &self,
        module: &mut Module,
        bound: u32,
        rng: &mut R,
    ) -> InstrumentReport {
        let mut report = InstrumentReport::default();
        let acquire = MapAcquire { size: bound, ..self.acquire.clone() };
        for function in module.functions.iter_mut() {
            if !function.has_body() {
                report.skipped_without_body += 1;
                continue;
            }
            let draws: Vec<CoverageId> =
                (0..function.blocks.len()).map(|_| rng.gen_range(0..bound)).collect();
            let assigned = place_marks(function, &acquire, |pos| draws[pos]);
            report.functions.push(InstrumentedFunction {
                name: function.name.clone(),
                base: None,
                ids: assigned,
            });
        }
        report
    }

    /// Instrument each block of `graph`, tagging position `p` with `id_at(p)`.
    pub fn instrument_blocks<G, F>(&self, graph: &mut G, id_at: F) -> Vec<CoverageId>
    where
        G: CfgMut + ?Sized,
        F: Fn(usize) -> CoverageId,
    {
        place_marks(graph, &self.acquire, id_at)
    }
}

fn place_marks<G, F>(graph: &mut G, acquire: &MapAcquire, id_at: F) -> Vec<CoverageId>
where
    G: CfgMut + ?Sized,
    F: Fn(usize) -> CoverageId,
{
    let mut assigned = Vec::new();
    for (pos, block) in graph.block_ids().into_iter().enumerate() {
        let id = id_at(pos);
        let at = graph.first_insertion_point(block).unwrap_or(0);
        graph.insert_before(block, at, Op::AcquireCoverageMap(acquire.clone()));
        graph.insert_before(block, at + 1, Op::MarkCoverage { slot: acquire.slot.clone(), id });
        assigned.push(id);
    }
    assigned
}
