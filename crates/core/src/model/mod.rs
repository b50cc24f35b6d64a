//! Core data model (IR) for modules, functions, and basic blocks.
//!
//! This is the slice of a host compiler's IR that the instrumentation and
//! debloat phases need:
//! - Modules keyed by their logical (source-tree-relative) path
//! - Functions with an ordered block layout
//! - Basic blocks with leading constructs, operations, and a terminator
//!
//! Phases mutate functions only through [`mutate::CfgMut`], so the same logic
//! can be driven against any IR-like graph.

pub mod mutate;
pub mod verify;

use serde::{Deserialize, Serialize};

pub use mutate::{CfgMut, FunctionBuilder};
pub use verify::{verify_function, verify_module, VerifyError};

/// Index into the runtime coverage bitmap, one per basic block.
pub type CoverageId = u32;

/// First coverage id owned by a function; block `p` gets `base + p`.
pub type BaseId = u32;

/// Function-local block identity. Stable across mutation, unlike a block's
/// position in the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// One compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Logical path of the unit (e.g. `a/b.cc`); identity of the module.
    pub path: String,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), functions: Vec::new() }
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// True if at least one function has a body to instrument.
    pub fn has_instrumentable_functions(&self) -> bool {
        self.functions.iter().any(Function::has_body)
    }
}

/// How a function symbol exists in the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Definition,
    Declaration,
    Intrinsic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    /// Blocks in layout order; the first block is the entry.
    pub blocks: Vec<BasicBlock>,
    /// Next unused block id.
    #[serde(default)]
    pub next_block: u32,
}

impl Function {
    /// An empty definition; add blocks through [`FunctionBuilder`] or [`CfgMut`].
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: FunctionKind::Definition, blocks: Vec::new(), next_block: 0 }
    }

    pub fn declaration(name: impl Into<String>) -> Self {
        Self { kind: FunctionKind::Declaration, ..Self::new(name) }
    }

    pub fn intrinsic(name: impl Into<String>) -> Self {
        Self { kind: FunctionKind::Intrinsic, ..Self::new(name) }
    }

    /// Declarations, intrinsics and definitions without blocks have no body.
    pub fn has_body(&self) -> bool {
        self.kind == FunctionKind::Definition && !self.blocks.is_empty()
    }

    pub fn entry(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    /// 0-based layout position of a block.
    pub fn position_of(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    /// Predecessors of `id` in layout order (a block listed once per edge source).
    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| b.terminator.successors().contains(&id))
            .map(|b| b.id)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub name: String,
    pub ops: Vec<Op>,
    pub terminator: Terminator,
}

impl BasicBlock {
    /// Index of the first op that is not a block-leading construct.
    pub fn first_insertion_point(&self) -> usize {
        self.ops.iter().take_while(|op| op.is_block_leading()).count()
    }

    /// True if the block was neutered into a trap.
    pub fn is_trap(&self) -> bool {
        matches!(self.ops.as_slice(), [Op::Trap]) && self.terminator == Terminator::Unreachable
    }

    /// Coverage ids recorded by this block's instrumentation, in op order.
    pub fn coverage_marks(&self) -> Vec<CoverageId> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::MarkCoverage { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }
}

/// Shared-memory parameters the coverage map is attached with at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapAcquire {
    /// Process-wide pointer slot caching the attached base address.
    pub slot: String,
    /// Well-known shared-memory key.
    pub shm_key: i32,
    /// Segment size in bytes.
    pub size: u32,
    pub permissions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// SSA merge; must lead its block.
    Phi { dest: String, incoming: Vec<(BlockId, String)> },
    /// Exception landing pad; must lead its block.
    LandingPad { dest: String },
    /// Any other operation of the host IR.
    Inst { dest: Option<String>, opcode: String, operands: Vec<String> },
    /// Load the coverage map base from `slot`, attaching the segment first if
    /// the slot is still null. Racing attaches are tolerated.
    AcquireCoverageMap(MapAcquire),
    /// Single-byte store of 1 at `base(slot) + id`.
    MarkCoverage { slot: String, id: CoverageId },
    /// Guaranteed trap.
    Trap,
}

impl Op {
    pub fn inst(opcode: impl Into<String>, operands: &[&str]) -> Self {
        Op::Inst {
            dest: None,
            opcode: opcode.into(),
            operands: operands.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_block_leading(&self) -> bool {
        matches!(self, Op::Phi { .. } | Op::LandingPad { .. })
    }

    /// Instrumentation emitted by the coverage pass; sanitizers skip these.
    pub fn is_instrumentation(&self) -> bool {
        matches!(self, Op::AcquireCoverageMap(_) | Op::MarkCoverage { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminator {
    Return(Option<String>),
    Branch(BlockId),
    CondBranch { cond: String, then_dest: BlockId, else_dest: BlockId },
    Switch { value: String, default: BlockId, cases: Vec<(i64, BlockId)> },
    Unreachable,
}

impl Terminator {
    /// Successor blocks, deduplicated, in first-appearance order.
    pub fn successors(&self) -> Vec<BlockId> {
        let raw: Vec<BlockId> = match self {
            Terminator::Return(_) | Terminator::Unreachable => vec![],
            Terminator::Branch(target) => vec![*target],
            Terminator::CondBranch { then_dest, else_dest, .. } => vec![*then_dest, *else_dest],
            Terminator::Switch { default, cases, .. } => {
                std::iter::once(*default).chain(cases.iter().map(|(_, b)| *b)).collect()
            }
        };
        let mut out = Vec::with_capacity(raw.len());
        for b in raw {
            if !out.contains(&b) {
                out.push(b);
            }
        }
        out
    }

    /// Rewrite every edge to `from` so it targets `to`; returns the number of
    /// edges rewritten.
    pub fn retarget(&mut self, from: BlockId, to: BlockId) -> usize {
        let mut count = 0;
        let mut swap = |slot: &mut BlockId| {
            if *slot == from {
                *slot = to;
                count += 1;
            }
        };
        match self {
            Terminator::Return(_) | Terminator::Unreachable => {}
            Terminator::Branch(target) => swap(target),
            Terminator::CondBranch { then_dest, else_dest, .. } => {
                swap(then_dest);
                swap(else_dest);
            }
            Terminator::Switch { default, cases, .. } => {
                swap(default);
                for (_, target) in cases.iter_mut() {
                    swap(target);
                }
            }
        }
        count
    }
}
