//! Control flow structuring.
//!
//! Simulated blocks are walked from the method entry. Every construct is
//! emitted at its entry block and the walk resumes at the construct's follow:
//! loops at their natural-loop header, `try`/`synchronized` at the start of
//! their protected region, `if` and `switch` at the conditional block. Jumps
//! to the follow or continue target of an enclosing construct become `break`
//! and `continue`. Anything left over becomes a `Goto` to a `Label`, and the
//! body is flagged approximate.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};

use super::cfg_types::*;
use super::descriptor::JvmType;
use super::exceptions::{ExceptionAnalysis, TryPlan};
use super::expr::*;
use super::stack_sim::{BlockExit, SimulatedBlock};
use super::structured_types::*;

/// Structure one method. `fold` enables short-circuit condition folding.
pub fn structure_method(
    cfg: &ControlFlowGraph,
    mut blocks: BTreeMap<BlockId, SimulatedBlock>,
    analysis: &ExceptionAnalysis,
    fold: bool,
) -> MethodBody {
    if fold {
        let folded = fold_conditions(&mut blocks, &protected_blocks(cfg, analysis));
        if folded > 0 {
            debug!("folded {} short-circuit conditions", folded);
        }
    }
    let graph = flow_graph(cfg, &blocks);

    let no_labels = BTreeSet::new();
    let mut ctx = StructuringContext::new(&graph, &blocks, analysis, &no_labels);
    let body = ctx.run(cfg.entry);
    if ctx.goto_targets.is_empty() {
        return body;
    }

    // Second pass places a label in front of every goto target.
    let targets = std::mem::take(&mut ctx.goto_targets);
    let mut ctx = StructuringContext::new(&graph, &blocks, analysis, &targets);
    ctx.run(cfg.entry)
}

/// Merge chains of conditional blocks into `&&`/`||` conditions.
///
/// A block `B2` is absorbed into its predecessor `B1` when `B1` ends in a
/// branch to `B2`, `B2` has no statements and no other predecessor, and the
/// two branches share a target. Returns the number of blocks absorbed.
pub fn fold_conditions(
    blocks: &mut BTreeMap<BlockId, SimulatedBlock>,
    protected: &BTreeSet<BlockId>,
) -> usize {
    let mut folded = 0;
    loop {
        let candidate = {
            let view: &BTreeMap<BlockId, SimulatedBlock> = blocks;
            let preds = predecessor_counts(view);
            view.iter()
                .find_map(|(&id, b1)| fold_candidate(id, b1, view, &preds, protected))
        };
        let Some((b1, b2, exit)) = candidate else {
            break;
        };
        if let Some(block) = blocks.get_mut(&b1) {
            block.exit = exit;
        }
        blocks.remove(&b2);
        folded += 1;
    }
    folded
}

fn fold_candidate(
    id: BlockId,
    b1: &SimulatedBlock,
    blocks: &BTreeMap<BlockId, SimulatedBlock>,
    preds: &HashMap<BlockId, usize>,
    protected: &BTreeSet<BlockId>,
) -> Option<(BlockId, BlockId, BlockExit)> {
    let BlockExit::Cond {
        cond: c1,
        taken: t1,
        fall: f1,
    } = &b1.exit
    else {
        return None;
    };
    if !b1.exit_stack.is_empty() {
        return None;
    }
    for (b2_id, on_fall) in [(*f1, true), (*t1, false)] {
        if b2_id == id || protected.contains(&b2_id) || preds.get(&b2_id) != Some(&1) {
            continue;
        }
        let Some(b2) = blocks.get(&b2_id) else {
            continue;
        };
        if !b2.statements.is_empty() {
            continue;
        }
        let BlockExit::Cond {
            cond: c2,
            taken: t2,
            fall: f2,
        } = &b2.exit
        else {
            continue;
        };
        let (a, b) = (c1.clone(), c2.clone());
        let exit = if on_fall {
            if t2 == t1 {
                cond_exit(Expr::logical(LogicalOp::Or, a, b), *t1, *f2)
            } else if f2 == t1 {
                cond_exit(Expr::logical(LogicalOp::Or, a, negate_expr(b)), *t1, *t2)
            } else {
                continue;
            }
        } else if f2 == f1 {
            cond_exit(Expr::logical(LogicalOp::And, a, b), *t2, *f1)
        } else if t2 == f1 {
            cond_exit(Expr::logical(LogicalOp::And, a, negate_expr(b)), *f2, *f1)
        } else {
            continue;
        };
        return Some((id, b2_id, exit));
    }
    None
}

fn cond_exit(cond: Expr, taken: BlockId, fall: BlockId) -> BlockExit {
    BlockExit::Cond { cond, taken, fall }
}

fn predecessor_counts(blocks: &BTreeMap<BlockId, SimulatedBlock>) -> HashMap<BlockId, usize> {
    let mut counts = HashMap::new();
    for block in blocks.values() {
        for s in block.successors() {
            *counts.entry(s).or_insert(0) += 1;
        }
    }
    counts
}

/// Blocks that must keep their identity: region bounds, handlers, copies.
fn protected_blocks(cfg: &ControlFlowGraph, analysis: &ExceptionAnalysis) -> BTreeSet<BlockId> {
    let mut protected = BTreeSet::new();
    for edge in &cfg.exception_edges {
        protected.extend([edge.start_pc, edge.end_pc, edge.handler_block]);
    }
    for plan in &analysis.plans {
        protected.extend([plan.start, plan.end]);
        protected.extend(plan.catch_entries());
        if let Some(f) = &plan.finally {
            protected.extend([f.handler, f.body_start, f.body_end]);
        }
    }
    for &(s, e) in &analysis.skipped {
        protected.extend([s, e]);
    }
    protected.extend(cfg.subroutine_entries());
    protected
}

/// Normal edges from the simulated exits; handler and `jsr` edges as extras.
fn flow_graph(cfg: &ControlFlowGraph, blocks: &BTreeMap<BlockId, SimulatedBlock>) -> FlowGraph {
    let mut graph = FlowGraph::new(cfg.entry);
    for (&id, block) in blocks {
        let succs: Vec<BlockId> = block
            .successors()
            .into_iter()
            .filter(|s| blocks.contains_key(s))
            .collect();
        let extra: Vec<BlockId> = cfg
            .all_successors(id)
            .into_iter()
            .filter(|s| blocks.contains_key(s) && !succs.contains(s))
            .collect();
        graph.add_node(id, succs);
        graph.extra.insert(id, extra);
    }
    graph
}

fn block_label(id: BlockId) -> String {
    format!("L{}", id)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Loop { continue_target: BlockId },
    Switch,
}

/// An enclosing breakable construct.
#[derive(Clone, Debug)]
struct Frame {
    kind: FrameKind,
    follow: Option<BlockId>,
    label: String,
}

enum LoopForm {
    While {
        cond: Expr,
        inside: BlockId,
        follow: Option<BlockId>,
    },
    DoWhile {
        latch: BlockId,
        cond: Expr,
        follow: Option<BlockId>,
    },
    Infinite {
        follow: Option<BlockId>,
    },
}

struct StructuringContext<'a> {
    blocks: &'a BTreeMap<BlockId, SimulatedBlock>,
    analysis: &'a ExceptionAnalysis,
    preds: BTreeMap<BlockId, Vec<BlockId>>,
    rpo_index: HashMap<BlockId, usize>,
    loops: BTreeMap<BlockId, LoopInfo>,
    /// Targets found by the previous pass that need a `Label`.
    labels: &'a BTreeSet<BlockId>,
    visited: BTreeSet<BlockId>,
    emitted_loops: BTreeSet<BlockId>,
    emitted_tries: BTreeSet<usize>,
    frames: Vec<Frame>,
    used_labels: BTreeSet<String>,
    goto_targets: BTreeSet<BlockId>,
    label_counter: usize,
    approximate: bool,
    warnings: Vec<String>,
}

impl<'a> StructuringContext<'a> {
    fn new(
        graph: &FlowGraph,
        blocks: &'a BTreeMap<BlockId, SimulatedBlock>,
        analysis: &'a ExceptionAnalysis,
        labels: &'a BTreeSet<BlockId>,
    ) -> Self {
        let rpo = graph.reverse_postorder();
        Self {
            blocks,
            analysis,
            preds: graph.predecessor_map(),
            rpo_index: rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect(),
            loops: graph.natural_loops(),
            labels,
            visited: BTreeSet::new(),
            emitted_loops: BTreeSet::new(),
            emitted_tries: BTreeSet::new(),
            frames: Vec::new(),
            used_labels: BTreeSet::new(),
            goto_targets: BTreeSet::new(),
            label_counter: 0,
            approximate: false,
            warnings: Vec::new(),
        }
    }

    fn run(&mut self, entry: BlockId) -> MethodBody {
        let mut statements = Vec::new();
        if self.blocks.contains_key(&entry) {
            self.structure_region(entry, None, false, &mut statements);
        }
        debug!(
            "structured {} blocks into {} statements ({} loops, {} gotos)",
            self.visited.len(),
            statements.len(),
            self.emitted_loops.len(),
            self.goto_targets.len()
        );
        MethodBody {
            statements,
            approximate: self.approximate,
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn fresh_label(&mut self) -> String {
        self.label_counter += 1;
        format!("label{}", self.label_counter)
    }

    fn succs(&self, id: BlockId) -> Vec<BlockId> {
        self.blocks
            .get(&id)
            .map(|b| {
                b.successors()
                    .into_iter()
                    .filter(|s| self.blocks.contains_key(s))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn preds(&self, id: BlockId) -> &[BlockId] {
        self.preds.get(&id).map(|p| p.as_slice()).unwrap_or(&[])
    }

    /// Emit blocks starting at `start` until `stop` is reached or control
    /// leaves through a jump. `enter` skips the jump checks for `start`
    /// itself, which is already being emitted by the caller. Returns whether
    /// the walk ended at `stop`.
    fn structure_region(
        &mut self,
        start: BlockId,
        stop: Option<BlockId>,
        enter: bool,
        out: &mut Vec<StructuredStmt>,
    ) -> bool {
        let mut cur = Some(start);
        let mut first = true;
        while let Some(b) = cur {
            if Some(b) == stop {
                return true;
            }
            let entering = first && enter;
            first = false;
            if !entering {
                if let Some(jump) = self.jump_to(b) {
                    out.push(jump);
                    return false;
                }
                if self.visited.contains(&b) {
                    let goto = self.goto(b);
                    out.push(goto);
                    return false;
                }
            }
            if let Some(end) = self.analysis.skip_end(b) {
                if end > b {
                    cur = Some(end);
                    continue;
                }
            }
            if !self.blocks.contains_key(&b) {
                return false;
            }
            cur = self.structure_block(b, stop, out);
        }
        false
    }

    fn structure_block(
        &mut self,
        b: BlockId,
        stop: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
    ) -> Option<BlockId> {
        let pending_try = self.pending_try(b);
        let pending_loop = if self.emitted_loops.contains(&b) {
            None
        } else {
            self.loops.get(&b).cloned()
        };
        match (pending_try, pending_loop) {
            (Some(t), Some(l)) if !self.try_covers_loop(t, &l) => self.structure_loop(l, out),
            (Some(t), _) => self.structure_try(t, stop, out),
            (None, Some(l)) => self.structure_loop(l, out),
            (None, None) => self.structure_node(b, stop, out),
        }
    }

    /// Emit a single block and its exit.
    fn structure_node(
        &mut self,
        b: BlockId,
        stop: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
    ) -> Option<BlockId> {
        self.visited.insert(b);
        let blocks = self.blocks;
        let block = blocks.get(&b)?;
        if self.labels.contains(&b) {
            out.push(StructuredStmt::Label(block_label(b)));
        }
        out.extend(block.statements.iter().cloned().map(StructuredStmt::Simple));
        match &block.exit {
            BlockExit::Fall(t) | BlockExit::Goto(t) => Some(*t),
            BlockExit::Return | BlockExit::Throw | BlockExit::Ret => None,
            BlockExit::Cond { cond, taken, fall } => {
                self.structure_if(cond.clone(), *taken, *fall, stop, out)
            }
            BlockExit::Switch {
                key,
                default,
                cases,
            } => self.structure_switch(key.clone(), *default, cases, stop, out),
        }
    }

    fn structure_if(
        &mut self,
        cond: Expr,
        taken: BlockId,
        fall: BlockId,
        stop: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
    ) -> Option<BlockId> {
        if taken == fall {
            return Some(taken);
        }
        if self.is_break_target(taken) {
            if let Some(jump) = self.jump_to(taken) {
                out.push(if_then(cond, vec![jump]));
                return Some(fall);
            }
        }
        if self.is_break_target(fall) {
            if let Some(jump) = self.jump_to(fall) {
                out.push(if_then(negate_expr(cond), vec![jump]));
                return Some(taken);
            }
        }

        let bounds = self.boundaries(stop);
        match self.merge(&[taken, fall], &bounds) {
            Some(m) if m == taken => {
                let mut then_body = Vec::new();
                self.structure_region(fall, Some(m), false, &mut then_body);
                out.push(if_then(negate_expr(cond), then_body));
                Some(m)
            }
            Some(m) if m == fall => {
                let mut then_body = Vec::new();
                self.structure_region(taken, Some(m), false, &mut then_body);
                out.push(if_then(cond, then_body));
                Some(m)
            }
            Some(m) => {
                let mut then_body = Vec::new();
                let mut else_body = Vec::new();
                self.structure_region(fall, Some(m), false, &mut then_body);
                self.structure_region(taken, Some(m), false, &mut else_body);
                out.push(if_else(negate_expr(cond), then_body, else_body));
                Some(m)
            }
            None => {
                let fall_ends = self.terminates(fall, &bounds);
                let taken_ends = self.terminates(taken, &bounds);
                let inline_fall = match (fall_ends, taken_ends) {
                    (true, true) => {
                        self.reach(fall, &bounds).len() <= self.reach(taken, &bounds).len()
                    }
                    (fall_ends, taken_ends) => fall_ends || !taken_ends,
                };
                if fall_ends || taken_ends {
                    let (arm, rest, cond) = if inline_fall {
                        (fall, taken, negate_expr(cond))
                    } else {
                        (taken, fall, cond)
                    };
                    let mut then_body = Vec::new();
                    self.structure_region(arm, stop, false, &mut then_body);
                    out.push(if_then(cond, then_body));
                    Some(rest)
                } else {
                    let mut then_body = Vec::new();
                    let mut else_body = Vec::new();
                    let a = self.structure_region(fall, stop, false, &mut then_body);
                    let b = self.structure_region(taken, stop, false, &mut else_body);
                    out.push(if_else(negate_expr(cond), then_body, else_body));
                    if a || b {
                        stop
                    } else {
                        None
                    }
                }
            }
        }
    }

    fn structure_switch(
        &mut self,
        key: Expr,
        default: BlockId,
        cases: &[(i32, BlockId)],
        stop: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
    ) -> Option<BlockId> {
        let mut targets: Vec<BlockId> = cases.iter().map(|&(_, t)| t).collect();
        targets.push(default);
        targets.sort_unstable();
        targets.dedup();

        let bounds = self.boundaries(stop);
        let follow = self.merge(&targets, &bounds).or_else(|| {
            // No reconvergence: the default of a switch without a default
            // case is the code after it.
            (!cases.iter().any(|&(_, t)| t == default)).then_some(default)
        });
        let entries: Vec<BlockId> = targets.into_iter().filter(|&t| Some(t) != follow).collect();

        let label = self.fresh_label();
        self.frames.push(Frame {
            kind: FrameKind::Switch,
            follow,
            label: label.clone(),
        });
        let mut arms = Vec::with_capacity(entries.len());
        for (i, &entry) in entries.iter().enumerate() {
            let next = entries.get(i + 1).copied().or(follow);
            let mut body = Vec::new();
            let reached = self.structure_region(entry, next, false, &mut body);
            let mut values: Vec<i32> = cases
                .iter()
                .filter(|&&(_, t)| t == entry)
                .map(|&(k, _)| k)
                .collect();
            values.sort_unstable();
            arms.push(SwitchCase {
                values: values.into_iter().map(SwitchValue::Int).collect(),
                is_default: entry == default,
                body,
                falls_through: reached && i + 1 < entries.len(),
            });
        }
        self.frames.pop();

        let stmt = StructuredStmt::Switch {
            kind: SwitchKind::Int,
            expr: key,
            cases: arms,
        };
        out.push(self.wrap_label(label, stmt));
        follow
    }

    fn structure_loop(&mut self, info: LoopInfo, out: &mut Vec<StructuredStmt>) -> Option<BlockId> {
        let h = info.header;
        self.emitted_loops.insert(h);
        let label = self.fresh_label();
        let blocks = self.blocks;

        let (stmt, follow) = match self.loop_form(&info) {
            LoopForm::While {
                cond,
                inside,
                follow,
            } => {
                self.visited.insert(h);
                if self.labels.contains(&h) {
                    out.push(StructuredStmt::Label(block_label(h)));
                }
                self.push_loop(h, follow, &label);
                let mut body = Vec::new();
                if inside != h {
                    self.structure_region(inside, None, false, &mut body);
                }
                self.frames.pop();
                strip_trailing_continue(&mut body);
                (
                    StructuredStmt::While {
                        condition: cond,
                        body,
                    },
                    follow,
                )
            }
            LoopForm::DoWhile {
                latch,
                cond,
                follow,
            } => {
                self.push_loop(latch, follow, &label);
                let mut body = Vec::new();
                if latch != h {
                    self.structure_region(h, Some(latch), true, &mut body);
                }
                self.visited.insert(latch);
                if let Some(block) = blocks.get(&latch) {
                    body.extend(block.statements.iter().cloned().map(StructuredStmt::Simple));
                }
                self.frames.pop();
                strip_trailing_continue(&mut body);
                (
                    StructuredStmt::DoWhile {
                        body,
                        condition: cond,
                    },
                    follow,
                )
            }
            LoopForm::Infinite { follow } => {
                self.push_loop(h, follow, &label);
                let mut body = Vec::new();
                self.structure_region(h, None, true, &mut body);
                self.frames.pop();
                strip_trailing_continue(&mut body);
                (
                    StructuredStmt::While {
                        condition: Expr::BoolLiteral(true),
                        body,
                    },
                    follow,
                )
            }
        };
        out.push(self.wrap_label(label, stmt));
        follow
    }

    fn push_loop(&mut self, continue_target: BlockId, follow: Option<BlockId>, label: &str) {
        self.frames.push(Frame {
            kind: FrameKind::Loop { continue_target },
            follow,
            label: label.to_string(),
        });
    }

    fn loop_form(&self, info: &LoopInfo) -> LoopForm {
        let h = info.header;
        if let Some(SimulatedBlock {
            statements,
            exit: BlockExit::Cond { cond, taken, fall },
            ..
        }) = self.blocks.get(&h)
        {
            let taken_inside = info.body.contains(taken);
            if statements.is_empty() && taken_inside != info.body.contains(fall) {
                let (cond, inside, outside) = if taken_inside {
                    (cond.clone(), *taken, *fall)
                } else {
                    (negate_expr(cond.clone()), *fall, *taken)
                };
                return LoopForm::While {
                    cond,
                    inside,
                    follow: Some(outside),
                };
            }
        }

        if let [latch] = info.latches.as_slice() {
            if let Some(block) = self.blocks.get(latch) {
                let plain = block.statements.is_empty() || self.preds(*latch).len() == 1 || *latch == h;
                if let (BlockExit::Cond { cond, taken, fall }, true) = (&block.exit, plain) {
                    if *taken == h && !info.body.contains(fall) {
                        return LoopForm::DoWhile {
                            latch: *latch,
                            cond: cond.clone(),
                            follow: Some(*fall),
                        };
                    }
                    if *fall == h && !info.body.contains(taken) {
                        return LoopForm::DoWhile {
                            latch: *latch,
                            cond: negate_expr(cond.clone()),
                            follow: Some(*taken),
                        };
                    }
                }
            }
        }

        LoopForm::Infinite {
            follow: self.loop_exit(info),
        }
    }

    /// Lowest exit of a loop without a guard, preferring exits that continue
    /// somewhere over plain returns.
    fn loop_exit(&self, info: &LoopInfo) -> Option<BlockId> {
        let exits: BTreeSet<BlockId> = info
            .body
            .iter()
            .flat_map(|&b| self.succs(b))
            .filter(|s| !info.body.contains(s))
            .collect();
        exits
            .iter()
            .find(|&&e| !self.succs(e).is_empty())
            .or_else(|| exits.iter().next())
            .copied()
    }

    /// Outermost not yet emitted region starting at `b`.
    fn pending_try(&self, b: BlockId) -> Option<usize> {
        self.analysis
            .plans
            .iter()
            .enumerate()
            .filter(|(i, p)| p.start == b && !self.emitted_tries.contains(i))
            .max_by_key(|(_, p)| p.size())
            .map(|(i, _)| i)
    }

    fn try_covers_loop(&self, idx: usize, info: &LoopInfo) -> bool {
        let plan = &self.analysis.plans[idx];
        info.body.iter().all(|&b| plan.contains(b))
    }

    fn structure_try(
        &mut self,
        idx: usize,
        stop: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
    ) -> Option<BlockId> {
        self.emitted_tries.insert(idx);
        let analysis = self.analysis;
        let plan = &analysis.plans[idx];
        let follow = self.try_follow(plan, stop);
        let body_stop = follow.or(stop);

        let mut try_body = Vec::new();
        let reached = self.structure_region(plan.start, body_stop, true, &mut try_body);

        let mut catches = Vec::with_capacity(plan.catches.len());
        for catch in &plan.catches {
            let mut body = Vec::new();
            if !self.visited.contains(&catch.handler) {
                self.structure_region(catch.handler, body_stop, false, &mut body);
            }
            let var = take_catch_var(&mut body, &catch.types);
            catches.push(CatchClause {
                exception_types: catch.types.clone(),
                var,
                body,
            });
        }

        let finally_body = match &plan.finally {
            Some(f) => {
                self.visited.insert(f.handler);
                self.visited.insert(f.body_end);
                if let Some((entry, _)) = f.subroutine {
                    self.visited.insert(entry);
                }
                let mut body = Vec::new();
                if f.body_start != f.body_end && !plan.shape.is_synchronized() {
                    self.structure_region(f.body_start, Some(f.body_end), false, &mut body);
                }
                Some(body)
            }
            None => None,
        };

        if plan.approximate {
            self.approximate = true;
            let msg = format!("unrecognized handler shape for region at offset {}", plan.start);
            warn!("{}", msg);
            self.warnings.push(msg);
        }

        if plan.shape.is_synchronized() {
            let lock = take_lock(out, plan.lock_local);
            out.push(StructuredStmt::Synchronized {
                lock,
                body: try_body,
            });
        } else {
            out.push(StructuredStmt::Try {
                shape: plan.shape,
                try_body,
                catches,
                finally_body,
            });
        }

        match follow {
            Some(f) => Some(f),
            None if reached => stop,
            None => None,
        }
    }

    /// Where control continues after a protected region: the lowest normal
    /// exit of the region, with inlined finally copies skipped.
    fn try_follow(&self, plan: &TryPlan, stop: Option<BlockId>) -> Option<BlockId> {
        let bounds = self.boundaries(stop);
        let mut exits = BTreeSet::new();
        for &b in self.blocks.range(plan.start..plan.end).map(|(b, _)| b) {
            for s in self.succs(b) {
                if plan.contains(s) {
                    continue;
                }
                let s = self.chase_skips(s);
                if !plan.contains(s) && !plan.catch_entries().any(|h| h == s) {
                    exits.insert(s);
                }
            }
        }

        // A return reached only from the region belongs inside it.
        let open = exits
            .iter()
            .filter(|s| !bounds.contains(*s))
            .find(|&&s| !self.succs(s).is_empty() || self.preds(s).len() > 1);
        if let Some(&f) = open {
            return Some(self.chase_jumps(f, &bounds));
        }
        if let Some(&f) = exits.iter().find(|s| bounds.contains(*s)) {
            return Some(f);
        }
        let handlers: Vec<BlockId> = plan.catch_entries().collect();
        if handlers.len() >= 2 {
            return self.merge(&handlers, &bounds);
        }
        None
    }

    /// Follow blocks that only jump elsewhere, so handlers and the
    /// protected body stop at the same place.
    fn chase_jumps(&self, mut b: BlockId, bounds: &BTreeSet<BlockId>) -> BlockId {
        let mut seen = BTreeSet::new();
        while seen.insert(b)
            && !bounds.contains(&b)
            && !self.loops.contains_key(&b)
            && !self.labels.contains(&b)
            && self.pending_try(b).is_none()
        {
            match self.blocks.get(&b) {
                Some(SimulatedBlock {
                    statements,
                    exit: BlockExit::Goto(t) | BlockExit::Fall(t),
                    exit_stack,
                    ..
                }) if statements.is_empty() && exit_stack.is_empty() && self.blocks.contains_key(t) => {
                    b = *t
                }
                _ => break,
            }
        }
        b
    }

    fn chase_skips(&self, mut b: BlockId) -> BlockId {
        while let Some(end) = self.analysis.skip_end(b) {
            if end <= b {
                break;
            }
            b = end;
        }
        b
    }

    /// Follows and continue targets of every enclosing frame, plus `stop`.
    fn boundaries(&self, stop: Option<BlockId>) -> BTreeSet<BlockId> {
        let mut bounds: BTreeSet<BlockId> = stop.into_iter().collect();
        for frame in &self.frames {
            bounds.extend(frame.follow);
            if let FrameKind::Loop { continue_target } = frame.kind {
                bounds.insert(continue_target);
            }
        }
        bounds
    }

    /// Blocks reachable from `start` over normal edges, not expanding
    /// through boundary blocks.
    fn reach(&self, start: BlockId, bounds: &BTreeSet<BlockId>) -> BTreeSet<BlockId> {
        let mut seen = BTreeSet::new();
        let mut work = vec![start];
        while let Some(b) = work.pop() {
            if !seen.insert(b) || bounds.contains(&b) {
                continue;
            }
            work.extend(self.succs(b));
        }
        seen
    }

    /// Every block reachable from `start` is entered only from that set:
    /// the path ends in a return, a throw, or a jump to a boundary.
    fn terminates(&self, start: BlockId, bounds: &BTreeSet<BlockId>) -> bool {
        let reach = self.reach(start, bounds);
        reach
            .iter()
            .filter(|&&n| n != start && !bounds.contains(&n))
            .all(|n| self.preds(*n).iter().all(|p| reach.contains(p)))
    }

    /// First block in reverse postorder reached from all `sources`. Sources
    /// that terminate are dropped and the rest intersected again.
    fn merge(&self, sources: &[BlockId], bounds: &BTreeSet<BlockId>) -> Option<BlockId> {
        let sets: Vec<BTreeSet<BlockId>> = sources.iter().map(|&s| self.reach(s, bounds)).collect();
        if let Some(m) = self.first_common(&sets) {
            return Some(m);
        }
        let live: Vec<BTreeSet<BlockId>> = sources
            .iter()
            .zip(&sets)
            .filter(|(s, _)| !self.terminates(**s, bounds))
            .map(|(_, set)| set.clone())
            .collect();
        if live.len() >= 2 && live.len() < sets.len() {
            self.first_common(&live)
        } else {
            None
        }
    }

    fn first_common(&self, sets: &[BTreeSet<BlockId>]) -> Option<BlockId> {
        let (first, rest) = sets.split_first()?;
        first
            .iter()
            .filter(|b| rest.iter().all(|s| s.contains(*b)))
            .min_by_key(|&&b| (self.rpo_index.get(&b).copied().unwrap_or(usize::MAX), b))
            .copied()
    }

    fn is_break_target(&self, b: BlockId) -> bool {
        self.frames.iter().any(|f| f.follow == Some(b))
    }

    /// `break`/`continue` for a jump to `b`, labeled when the target frame
    /// is not the innermost one of its kind.
    fn jump_to(&mut self, b: BlockId) -> Option<StructuredStmt> {
        let mut innermost_loop = true;
        let mut innermost_breakable = true;
        let mut found = None;
        for frame in self.frames.iter().rev() {
            if let FrameKind::Loop { continue_target } = frame.kind {
                if continue_target == b {
                    let label = (!innermost_loop).then(|| frame.label.clone());
                    found = Some((label, false));
                    break;
                }
            }
            if frame.follow == Some(b) {
                let label = (!innermost_breakable).then(|| frame.label.clone());
                found = Some((label, true));
                break;
            }
            if matches!(frame.kind, FrameKind::Loop { .. }) {
                innermost_loop = false;
            }
            innermost_breakable = false;
        }
        let (label, is_break) = found?;
        if let Some(l) = &label {
            self.used_labels.insert(l.clone());
        }
        Some(if is_break {
            StructuredStmt::Break { label }
        } else {
            StructuredStmt::Continue { label }
        })
    }

    fn goto(&mut self, b: BlockId) -> StructuredStmt {
        self.goto_targets.insert(b);
        self.approximate = true;
        let msg = format!("unstructured jump to offset {}", b);
        warn!("{}", msg);
        self.warnings.push(msg);
        StructuredStmt::Goto(block_label(b))
    }

    fn wrap_label(&self, label: String, stmt: StructuredStmt) -> StructuredStmt {
        if self.used_labels.contains(&label) {
            StructuredStmt::Labeled {
                label,
                body: Box::new(stmt),
            }
        } else {
            stmt
        }
    }
}

fn if_then(condition: Expr, then_body: Vec<StructuredStmt>) -> StructuredStmt {
    StructuredStmt::If {
        condition,
        then_body,
        else_body: None,
    }
}

fn if_else(
    condition: Expr,
    then_body: Vec<StructuredStmt>,
    else_body: Vec<StructuredStmt>,
) -> StructuredStmt {
    if then_body.is_empty() && !else_body.is_empty() {
        return if_then(negate_expr(condition), else_body);
    }
    StructuredStmt::If {
        condition,
        then_body,
        else_body: (!else_body.is_empty()).then_some(else_body),
    }
}

/// A `continue` at the very end of a loop body is implicit.
fn strip_trailing_continue(body: &mut Vec<StructuredStmt>) {
    match body.last_mut() {
        Some(StructuredStmt::Continue { label: None }) => {
            body.pop();
        }
        Some(StructuredStmt::If {
            then_body,
            else_body,
            ..
        }) => {
            strip_trailing_continue(then_body);
            if let Some(e) = else_body {
                strip_trailing_continue(e);
            }
        }
        _ => {}
    }
}

/// Pull the exception variable out of the first statement of a handler.
/// When the handler discards the exception, a placeholder is made up and
/// any direct use of the caught value is rewritten to it.
fn take_catch_var(body: &mut Vec<StructuredStmt>, types: &[String]) -> LocalVar {
    if let Some(StructuredStmt::Simple(Statement {
        stmt:
            Stmt::LocalStore {
                var,
                value: Expr::CaughtException(_),
            },
        ..
    })) = body.first()
    {
        let mut var = var.clone();
        body.remove(0);
        if let [one] = types {
            var.ty = JvmType::Reference(one.clone());
        }
        return var;
    }

    let ty = match types {
        [one] => JvmType::Reference(one.clone()),
        _ => JvmType::Reference("java/lang/Throwable".into()),
    };
    let var = LocalVar {
        index: u16::MAX,
        name: Some("ignored".into()),
        ty,
        origin: VarOrigin::Temp,
    };
    for stmt in body.iter_mut() {
        if let StructuredStmt::Simple(s) = stmt {
            let inner = std::mem::replace(&mut s.stmt, Stmt::Return(None));
            s.stmt = inner.rewrite_exprs(&mut |e| match e {
                Expr::CaughtException(_) => Expr::Local(var.clone()),
                other => other,
            });
        }
    }
    var
}

/// Remove the `l = obj; monitorenter` prologue emitted just before a
/// synchronized region and return the locked expression.
fn take_lock(out: &mut Vec<StructuredStmt>, lock_local: Option<u16>) -> Expr {
    let mut lock = match out.last().and_then(|s| s.as_stmt()) {
        Some(Stmt::MonitorEnter(e)) => Some(e.clone()),
        _ => None,
    };
    if lock.is_some() {
        out.pop();
    }

    let store = match out.last().and_then(|s| s.as_stmt()) {
        Some(Stmt::LocalStore { var, value }) => Some((var.clone(), value.clone())),
        _ => None,
    };
    if let Some((var, value)) = store {
        let holds_lock = Some(var.index) == lock_local && var.origin == VarOrigin::Slot;
        let same_value = match &lock {
            Some(Expr::Local(v)) => v.same(&var),
            Some(e) => *e == value,
            None => true,
        };
        if holds_lock && same_value {
            out.pop();
            lock = Some(value);
        }
    }
    lock.unwrap_or_else(|| Expr::Unresolved("monitor".into()))
}
