use super::{BasicBlock, BlockId, Function, Op, Terminator};

/// Mutation interface the instrumentation and debloat phases are written against.
///
/// Block ids are stable handles; positions are recomputed from `block_ids()`
/// whenever a phase needs them.
pub trait CfgMut {
    /// Block ids in layout order.
    fn block_ids(&self) -> Vec<BlockId>;

    fn successors(&self, block: BlockId) -> Vec<BlockId>;

    /// Index of the first op after the block-leading constructs.
    fn first_insertion_point(&self, block: BlockId) -> Option<usize>;

    /// Insert `op` before the op currently at `index` (or at the end when
    /// `index` equals the op count). Returns false for an unknown block or an
    /// index past the end.
    fn insert_before(&mut self, block: BlockId, index: usize, op: Op) -> bool;

    /// Append a new block with no ops and an `Unreachable` terminator.
    fn create_block(&mut self, name: &str) -> BlockId;

    /// Replace a block's ops and terminator wholesale.
    fn set_body(&mut self, block: BlockId, ops: Vec<Op>, terminator: Terminator) -> bool;

    /// Rewrite edges `block -> from` into `block -> to`; returns edges changed.
    fn rewrite_terminator_target(&mut self, block: BlockId, from: BlockId, to: BlockId) -> usize;

    /// Drop phi entries in `block` that flow in from `pred`.
    fn remove_phi_incoming(&mut self, block: BlockId, pred: BlockId);

    fn remove_block(&mut self, block: BlockId) -> Option<BasicBlock>;
}

impl CfgMut for Function {
    fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.iter().map(|b| b.id).collect()
    }

    fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.block(block).map(|b| b.terminator.successors()).unwrap_or_default()
    }

    fn first_insertion_point(&self, block: BlockId) -> Option<usize> {
        self.block(block).map(BasicBlock::first_insertion_point)
    }

    fn insert_before(&mut self, block: BlockId, index: usize, op: Op) -> bool {
        match self.block_mut(block) {
            Some(b) if index <= b.ops.len() => {
                b.ops.insert(index, op);
                true
            }
            _ => false,
        }
    }

    fn create_block(&mut self, name: &str) -> BlockId {
        // Ids loaded from hand-written IR may skip `next_block`.
        let floor = self.blocks.iter().map(|b| b.id.0 + 1).max().unwrap_or(0);
        let id = BlockId(self.next_block.max(floor));
        self.next_block = id.0 + 1;
        self.blocks.push(BasicBlock {
            id,
            name: name.to_string(),
            ops: Vec::new(),
            terminator: Terminator::Unreachable,
        });
        id
    }

    fn set_body(&mut self, block: BlockId, ops: Vec<Op>, terminator: Terminator) -> bool {
        match self.block_mut(block) {
            Some(b) => {
                b.ops = ops;
                b.terminator = terminator;
                true
            }
            None => false,
        }
    }

    fn rewrite_terminator_target(&mut self, block: BlockId, from: BlockId, to: BlockId) -> usize {
        self.block_mut(block).map(|b| b.terminator.retarget(from, to)).unwrap_or(0)
    }

    fn remove_phi_incoming(&mut self, block: BlockId, pred: BlockId) {
        if let Some(b) = self.block_mut(block) {
            for op in b.ops.iter_mut() {
                if let Op::Phi { incoming, .. } = op {
                    incoming.retain(|(from, _)| *from != pred);
                }
            }
        }
    }

    fn remove_block(&mut self, block: BlockId) -> Option<BasicBlock> {
        let pos = self.position_of(block)?;
        Some(self.blocks.remove(pos))
    }
}

/// Small builder for assembling functions by hand (tests, tools, fixtures).
///
/// `FunctionBuilder::new("foo")` then `block`, `push`, `terminate`, `finish`.
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { function: Function::new(name) }
    }

    pub fn block(&mut self, name: &str) -> BlockId {
        self.function.create_block(name)
    }

    pub fn push(&mut self, block: BlockId, op: Op) -> &mut Self {
        if let Some(b) = self.function.block_mut(block) {
            b.ops.push(op);
        }
        self
    }

    pub fn terminate(&mut self, block: BlockId, terminator: Terminator) -> &mut Self {
        if let Some(b) = self.function.block_mut(block) {
            b.terminator = terminator;
        }
        self
    }

    pub fn finish(self) -> Function {
        self.function
    }
}

/// A straight-line chain of `count` blocks (`b0 -> b1 -> ... -> ret`), each
/// holding one generic op.
pub fn chain_function(name: impl Into<String>, count: usize) -> Function {
    let mut builder = FunctionBuilder::new(name);
    let ids: Vec<BlockId> = (0..count).map(|i| builder.block(&format!("b{i}"))).collect();
    for (i, id) in ids.iter().enumerate() {
        builder.push(*id, Op::inst("work", &[&format!("%{i}")]));
        let term = match ids.get(i + 1) {
            Some(next) => Terminator::Branch(*next),
            None => Terminator::Return(None),
        };
        builder.terminate(*id, term);
    }
    builder.finish()
}
