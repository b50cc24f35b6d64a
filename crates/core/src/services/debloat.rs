//! Profile-guided debloating.
//!
//! A block whose coverage id never showed up in the profile has its body
//! replaced by `Trap` + `Unreachable` in place. The block keeps its id, so
//! every predecessor edge still lands on a valid block.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{verify_function, BaseId, BlockId, CfgMut, CoverageId, Module, Op, Terminator};
use crate::services::pipeline::PassError;
use crate::store::{ExecutedIdSet, IdMapping};

/// How far debloating goes beyond trapping dead blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebloatOptions {
    /// Reduce functions with no executed block to a single trapping entry.
    #[serde(default)]
    pub collapse_dead_functions: bool,
    /// Funnel dead edges into one trap block and drop blocks that are no
    /// longer reachable from the entry or from any executed block.
    #[serde(default)]
    pub prune_unreachable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionDebloat {
    pub name: String,
    /// Coverage ids of the blocks that now trap.
    pub trapped: Vec<CoverageId>,
    pub live_blocks: usize,
    pub collapsed: bool,
    pub pruned_blocks: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DebloatReport {
    pub functions: Vec<FunctionDebloat>,
    pub unknown_functions: Vec<String>,
}

impl DebloatReport {
    pub fn trapped_ids(&self) -> Vec<CoverageId> {
        self.functions.iter().flat_map(|f| f.trapped.iter().copied()).collect()
    }

    pub fn modified(&self) -> bool {
        self.functions.iter().any(|f| !f.trapped.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Debloater {
    options: DebloatOptions,
}

impl Debloater {
    pub fn new(options: DebloatOptions) -> Self {
        Self { options }
    }

    /// Neuter every block of `module` whose id (`base + position`) is not in
    /// `executed`. The block layout must be the one the ids were computed for.
    ///
    /// Each rewritten function is re-verified; a structural violation aborts
    /// with `PassError::IllFormed`. A function whose id range does not fit in
    /// a coverage id aborts with `PassError::IdOverflow` before it is touched.
    pub fn debloat(
        &self,
        module: &mut Module,
        executed: &ExecutedIdSet,
        ids: &IdMapping,
    ) -> Result<DebloatReport, PassError> {
        let mut report = DebloatReport::default();
        for function in module.functions.iter_mut().filter(|f| f.has_body()) {
            let Some(base) = ids.resolve(&function.name) else {
                debug!(function = %function.name, "no base id; not debloated");
                report.unknown_functions.push(function.name.clone());
                continue;
            };
            let name = function.name.clone();
            let outcome = self.debloat_function(&name, function, base, executed)?;
            verify_function(function).map_err(|source| PassError::IllFormed {
                module: module.path.clone(),
                phase: "debloat",
                source,
            })?;
            if !outcome.trapped.is_empty() {
                info!(
                    function = %outcome.name,
                    trapped = outcome.trapped.len(),
                    live = outcome.live_blocks,
                    collapsed = outcome.collapsed,
                    "debloated"
                );
            }
            report.functions.push(outcome);
        }
        Ok(report)
    }

    /// Debloat one function graph whose block at position `p` has id `base + p`.
    pub fn debloat_function<G: CfgMut + ?Sized>(
        &self,
        name: &str,
        graph: &mut G,
        base: BaseId,
        executed: &ExecutedIdSet,
    ) -> Result<FunctionDebloat, PassError> {
        let layout = graph.block_ids();
        let mut live = HashSet::new();
        let mut dead = Vec::new();
        for (pos, block) in layout.iter().enumerate() {
            let id = CoverageId::try_from(pos)
                .ok()
                .and_then(|p| base.checked_add(p))
                .ok_or_else(|| PassError::IdOverflow {
                    function: name.to_string(),
                    base,
                    blocks: layout.len(),
                })?;
            if executed.contains(id) {
                live.insert(*block);
            } else {
                dead.push((*block, id));
            }
        }

        let mut outcome = FunctionDebloat {
            name: name.to_string(),
            trapped: dead.iter().map(|(_, id)| *id).collect(),
            live_blocks: live.len(),
            ..FunctionDebloat::default()
        };
        let Some(&entry) = layout.first() else { return Ok(outcome) };
        if dead.is_empty() {
            return Ok(outcome);
        }

        if live.is_empty() && self.options.collapse_dead_functions {
            for block in &layout[1..] {
                graph.remove_block(*block);
            }
            graph.set_body(entry, vec![Op::Trap], Terminator::Unreachable);
            outcome.trapped.truncate(1);
            outcome.collapsed = true;
            outcome.pruned_blocks = layout.len() - 1;
            return Ok(outcome);
        }

        for (block, _) in &dead {
            for succ in graph.successors(*block) {
                graph.remove_phi_incoming(succ, *block);
            }
            graph.set_body(*block, vec![Op::Trap], Terminator::Unreachable);
        }

        if self.options.prune_unreachable {
            let dead_blocks: Vec<BlockId> = dead.iter().map(|(b, _)| *b).collect();
            let removed = prune(graph, entry, &live, &dead_blocks);
            outcome.trapped.retain(|id| {
                let pos = (id - base) as usize;
                !removed.contains(&layout[pos])
            });
            outcome.pruned_blocks = removed.len();
        }
        Ok(outcome)
    }
}

/// Merge trap targets and drop blocks outside the closure of `entry` and the
/// live blocks. Every kept block's successors are kept too, so no edge dangles.
fn prune<G: CfgMut + ?Sized>(
    graph: &mut G,
    entry: BlockId,
    live: &HashSet<BlockId>,
    dead: &[BlockId],
) -> HashSet<BlockId> {
    let layout = graph.block_ids();

    // The entry cannot gain predecessors, so it never serves as the shared trap.
    if let Some((&canonical, rest)) = dead.split_first().filter(|_| !dead.contains(&entry)) {
        for block in &layout {
            for other in rest {
                graph.rewrite_terminator_target(*block, *other, canonical);
            }
        }
    }

    let mut keep: HashSet<BlockId> = HashSet::new();
    let mut queue: VecDeque<BlockId> =
        std::iter::once(entry).chain(live.iter().copied()).collect();
    while let Some(block) = queue.pop_front() {
        if keep.insert(block) {
            queue.extend(graph.successors(block));
        }
    }

    let mut removed = HashSet::new();
    for block in layout.into_iter().filter(|b| !keep.contains(b)) {
        for succ in graph.successors(block) {
            graph.remove_phi_incoming(succ, block);
        }
        graph.remove_block(block);
        removed.insert(block);
    }
    removed
}
