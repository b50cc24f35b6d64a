//! Structural validity check for modules and functions.

use std::collections::{BTreeSet, HashSet};

use thiserror::Error;

use super::{BlockId, Function, Module, Op};

/// A structural defect that makes a module unusable by later stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("{function}: block id {block} appears more than once")]
    DuplicateBlock { function: String, block: BlockId },

    #[error("{function}: {from} branches to missing block {to}")]
    DanglingEdge { function: String, from: BlockId, to: BlockId },

    #[error("{function}: entry block {entry} has predecessors {preds:?}")]
    EntryHasPredecessors { function: String, entry: BlockId, preds: Vec<BlockId> },

    #[error("{function}: phi in {block} does not lead its block")]
    MisplacedPhi { function: String, block: BlockId },

    #[error(
        "{function}: phi `{dest}` in {block} has incoming {incoming:?} but predecessors {preds:?}"
    )]
    PhiMismatch {
        function: String,
        block: BlockId,
        dest: String,
        incoming: Vec<BlockId>,
        preds: Vec<BlockId>,
    },

    #[error("{function}: {kind} has a body")]
    BodyOnDeclaration { function: String, kind: String },
}

pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    module.functions.iter().try_for_each(verify_function)
}

pub fn verify_function(function: &Function) -> Result<(), VerifyError> {
    let name = || function.name.clone();

    if function.kind != super::FunctionKind::Definition && !function.blocks.is_empty() {
        return Err(VerifyError::BodyOnDeclaration {
            function: name(),
            kind: format!("{:?}", function.kind).to_lowercase(),
        });
    }

    let mut seen = HashSet::new();
    for block in &function.blocks {
        if !seen.insert(block.id) {
            return Err(VerifyError::DuplicateBlock { function: name(), block: block.id });
        }
    }

    for block in &function.blocks {
        for target in block.terminator.successors() {
            if !seen.contains(&target) {
                return Err(VerifyError::DanglingEdge { function: name(), from: block.id, to: target });
            }
        }
    }

    if let Some(entry) = function.entry() {
        let preds = function.predecessors(entry.id);
        if !preds.is_empty() {
            return Err(VerifyError::EntryHasPredecessors { function: name(), entry: entry.id, preds });
        }
    }

    for block in &function.blocks {
        let leading = block.first_insertion_point();
        if block.ops[leading..].iter().any(|op| matches!(op, Op::Phi { .. })) {
            return Err(VerifyError::MisplacedPhi { function: name(), block: block.id });
        }

        let preds: BTreeSet<BlockId> = function.predecessors(block.id).into_iter().collect();
        for op in &block.ops[..leading] {
            if let Op::Phi { dest, incoming } = op {
                let from: BTreeSet<BlockId> = incoming.iter().map(|(b, _)| *b).collect();
                if from != preds || from.len() != incoming.len() {
                    return Err(VerifyError::PhiMismatch {
                        function: name(),
                        block: block.id,
                        dest: dest.clone(),
                        incoming: incoming.iter().map(|(b, _)| *b).collect(),
                        preds: preds.into_iter().collect(),
                    });
                }
            }
        }
    }

    Ok(())
}
