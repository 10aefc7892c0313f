use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::code_attribute::Instruction;

/// Block ID is the bytecode offset of the first instruction in the block.
pub type BlockId = u32;

/// How a basic block ends.
#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    FallThrough { target: BlockId },
    Goto { target: BlockId },
    /// `if_true` is the branch target, `if_false` the next instruction.
    ConditionalBranch { if_true: BlockId, if_false: BlockId },
    Switch {
        default: BlockId,
        cases: Vec<(i32, BlockId)>,
    },
    Return,
    Throw,
    Jsr { target: BlockId, return_addr: BlockId },
    Ret,
}

/// A basic block in the CFG.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    /// Offset just past the last instruction.
    pub fn end(&self) -> u32 {
        self.instructions
            .last()
            .map(|i| i.next_offset())
            .unwrap_or(self.id)
    }
}

/// An exception handler edge, in exception table order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionEdge {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_block: BlockId,
    /// Internal name of the caught class; `None` for catch-all entries.
    pub catch_type: Option<String>,
}

impl ExceptionEdge {
    pub fn covers(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}

/// The control flow graph for a single method.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    pub blocks: BTreeMap<BlockId, BasicBlock>,
    pub entry: BlockId,
    pub exception_edges: Vec<ExceptionEdge>,
}

impl ControlFlowGraph {
    /// Normal successors. A `jsr` continues at its return address; the
    /// subroutine is reached through [`Self::all_successors`] only.
    pub fn successors(&self, block_id: BlockId) -> Vec<BlockId> {
        let block = match self.blocks.get(&block_id) {
            Some(b) => b,
            None => return Vec::new(),
        };
        let mut succs = terminator_targets(&block.terminator);
        succs.retain(|t| self.blocks.contains_key(t));
        succs
    }

    /// Handler blocks whose protected range covers the block.
    pub fn handlers_of(&self, block_id: BlockId) -> Vec<BlockId> {
        let mut handlers: Vec<BlockId> = self
            .exception_edges
            .iter()
            .filter(|e| e.covers(block_id))
            .map(|e| e.handler_block)
            .collect();
        handlers.dedup();
        handlers
    }

    /// Normal, exceptional and subroutine-call successors.
    pub fn all_successors(&self, block_id: BlockId) -> Vec<BlockId> {
        let mut succs = self.successors(block_id);
        if let Some(BasicBlock {
            terminator: Terminator::Jsr { target, .. },
            ..
        }) = self.blocks.get(&block_id)
        {
            succs.push(*target);
        }
        succs.extend(self.handlers_of(block_id));
        succs.retain(|t| self.blocks.contains_key(t));
        succs
    }

    /// Get all predecessor block IDs for a given block.
    pub fn predecessors(&self, target: BlockId) -> Vec<BlockId> {
        self.blocks
            .keys()
            .filter(|&&b| self.successors(b).contains(&target))
            .copied()
            .collect()
    }

    /// Blocks entered by a `jsr`.
    pub fn subroutine_entries(&self) -> BTreeSet<BlockId> {
        self.blocks
            .values()
            .filter_map(|b| match b.terminator {
                Terminator::Jsr { target, .. } => Some(target),
                _ => None,
            })
            .collect()
    }

    /// The graph with exceptional and subroutine edges kept as extra edges.
    pub fn flow_graph(&self) -> FlowGraph {
        let mut graph = FlowGraph::new(self.entry);
        for &id in self.blocks.keys() {
            graph.add_node(id, self.successors(id));
            let extra: Vec<BlockId> = self
                .all_successors(id)
                .into_iter()
                .filter(|s| !self.successors(id).contains(s))
                .collect();
            graph.extra.insert(id, extra);
        }
        graph
    }

    /// Block IDs reachable from the entry, in reverse postorder.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        self.flow_graph().reverse_postorder()
    }
}

pub fn terminator_targets(terminator: &Terminator) -> Vec<BlockId> {
    match terminator {
        Terminator::FallThrough { target } | Terminator::Goto { target } => vec![*target],
        Terminator::ConditionalBranch { if_true, if_false } => {
            if if_true == if_false {
                vec![*if_true]
            } else {
                vec![*if_true, *if_false]
            }
        }
        Terminator::Switch { default, cases } => {
            let mut succs: Vec<BlockId> = cases.iter().map(|(_, t)| *t).collect();
            succs.push(*default);
            succs.sort();
            succs.dedup();
            succs
        }
        Terminator::Jsr { return_addr, .. } => vec![*return_addr],
        Terminator::Return | Terminator::Throw | Terminator::Ret => vec![],
    }
}

/// A natural loop: the header plus every block that reaches a latch
/// without passing through the header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopInfo {
    pub header: BlockId,
    pub body: BTreeSet<BlockId>,
    /// Sources of back edges into the header.
    pub latches: Vec<BlockId>,
}

/// Plain successor lists for dominator and loop analysis. `succs` holds
/// normal flow; `extra` holds exceptional and subroutine edges, which count
/// for reachability and dominance but never form loops.
#[derive(Clone, Debug, Default)]
pub struct FlowGraph {
    pub entry: BlockId,
    pub succs: BTreeMap<BlockId, Vec<BlockId>>,
    pub extra: BTreeMap<BlockId, Vec<BlockId>>,
}

impl FlowGraph {
    pub fn new(entry: BlockId) -> Self {
        Self {
            entry,
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, id: BlockId, succs: Vec<BlockId>) {
        self.succs.insert(id, succs);
    }

    pub fn successors(&self, id: BlockId) -> &[BlockId] {
        self.succs.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn all_successors(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.successors(id)
            .iter()
            .chain(self.extra.get(&id).into_iter().flatten())
            .copied()
            .filter(|s| self.succs.contains_key(s))
    }

    /// Normal-flow predecessors of every node.
    pub fn predecessor_map(&self) -> BTreeMap<BlockId, Vec<BlockId>> {
        let mut preds: BTreeMap<BlockId, Vec<BlockId>> =
            self.succs.keys().map(|&k| (k, Vec::new())).collect();
        for (&from, targets) in &self.succs {
            for t in targets {
                if let Some(p) = preds.get_mut(t) {
                    if !p.contains(&from) {
                        p.push(from);
                    }
                }
            }
        }
        preds
    }

    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();
        if !self.succs.contains_key(&self.entry) {
            return postorder;
        }
        // Iterative DFS; methods can be large enough to overflow recursion.
        let mut stack: Vec<(BlockId, Vec<BlockId>)> = Vec::new();
        visited.insert(self.entry);
        stack.push((self.entry, self.all_successors(self.entry).collect()));
        while let Some((node, pending)) = stack.last_mut() {
            if pending.is_empty() {
                postorder.push(*node);
                stack.pop();
                continue;
            }
            let next = pending.remove(0);
            if visited.insert(next) {
                let succs = self.all_successors(next).collect();
                stack.push((next, succs));
            }
        }
        postorder.reverse();
        postorder
    }

    /// Immediate dominators over normal and extra edges.
    pub fn dominators(&self, rpo: &[BlockId]) -> HashMap<BlockId, BlockId> {
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &b in rpo {
            for s in self.all_successors(b) {
                preds.entry(s).or_default().push(b);
            }
        }

        let mut doms: HashMap<BlockId, BlockId> = HashMap::new();
        let entry = self.entry;
        doms.insert(entry, entry);
        let rpo_index: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo {
                if b == entry {
                    continue;
                }
                let mut new_idom: Option<BlockId> = None;
                for p in preds.get(&b).into_iter().flatten() {
                    if !doms.contains_key(p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => *p,
                        Some(current) => intersect(&doms, &rpo_index, current, *p),
                    });
                }
                if let Some(idom) = new_idom {
                    if doms.get(&b) != Some(&idom) {
                        doms.insert(b, idom);
                        changed = true;
                    }
                }
            }
        }
        doms
    }

    /// Natural loops keyed by header, from normal back edges `b -> h` where
    /// `h` dominates `b`.
    pub fn natural_loops(&self) -> BTreeMap<BlockId, LoopInfo> {
        let rpo = self.reverse_postorder();
        let doms = self.dominators(&rpo);
        let preds = self.predecessor_map();
        let mut loops: BTreeMap<BlockId, LoopInfo> = BTreeMap::new();

        for &b in &rpo {
            for &h in self.successors(b) {
                if !dominates(&doms, h, b) {
                    continue;
                }
                let info = loops.entry(h).or_insert_with(|| LoopInfo {
                    header: h,
                    body: BTreeSet::from([h]),
                    latches: Vec::new(),
                });
                info.latches.push(b);
                let mut work = vec![b];
                while let Some(n) = work.pop() {
                    if info.body.insert(n) {
                        for &p in preds.get(&n).into_iter().flatten() {
                            work.push(p);
                        }
                    }
                }
            }
        }
        loops
    }
}

fn intersect(
    doms: &HashMap<BlockId, BlockId>,
    rpo_index: &HashMap<BlockId, usize>,
    mut b1: BlockId,
    mut b2: BlockId,
) -> BlockId {
    while b1 != b2 {
        let idx1 = rpo_index.get(&b1).copied().unwrap_or(usize::MAX);
        let idx2 = rpo_index.get(&b2).copied().unwrap_or(usize::MAX);
        let (next1, next2) = if idx1 > idx2 {
            (*doms.get(&b1).unwrap_or(&b1), b2)
        } else {
            (b1, *doms.get(&b2).unwrap_or(&b2))
        };
        if (next1, next2) == (b1, b2) {
            break;
        }
        b1 = next1;
        b2 = next2;
    }
    b1
}

/// Does `a` dominate `b`?
pub fn dominates(doms: &HashMap<BlockId, BlockId>, a: BlockId, mut b: BlockId) -> bool {
    loop {
        if a == b {
            return true;
        }
        match doms.get(&b) {
            Some(&idom) if idom != b => b = idom,
            _ => return false,
        }
    }
}
