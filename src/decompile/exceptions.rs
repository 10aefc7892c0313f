//! Exception-region grouping and handler shape classification.
//!
//! Every compiler lowers `try`/`finally`/`synchronized` differently: javac
//! inlines the finally body at each exit and protects catch bodies with the
//! same catch-all handler, ecj protects them separately, JDK 1.1-1.3 javac and
//! jikes call a shared `jsr` subroutine, and synchronized blocks come with one
//! or two unlock handlers. Each region is classified into a [`TryShape`] and
//! described by a [`TryPlan`] the structuring walker emits from.

use std::collections::{BTreeMap, BTreeSet};

use crate::code_attribute::{Instruction, Operation, ValueKind};

use super::cfg_types::ExceptionEdge;

/// Recognized bytecode shapes of a protected region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TryShape {
    CatchOnly,
    MultiCatch,
    /// Finally body copied at every normal exit of the try block.
    FinallyInlined,
    FinallyEmpty,
    /// The try block never completes normally, so no copy exists.
    FinallyNoNormalExit,
    /// A copy precedes a `return` of a value saved in a temporary.
    FinallyReturnInTry,
    /// Single shared subroutine body plus rethrow path.
    FinallyJsr,
    /// The finally handler also protects the catch bodies (modern javac).
    CatchFinallyNested,
    /// Catch bodies are protected by their own finally entries (ecj).
    CatchFinallySibling,
    CatchFinallyJsr,
    /// The unlock handler protects itself (javac).
    SynchronizedDoubleExit,
    SynchronizedSingleExit,
    SynchronizedJsr,
    /// Best effort: catch-all handlers kept as catch clauses.
    Unrecognized,
}

impl TryShape {
    pub fn is_synchronized(self) -> bool {
        matches!(
            self,
            TryShape::SynchronizedDoubleExit
                | TryShape::SynchronizedSingleExit
                | TryShape::SynchronizedJsr
        )
    }
}

/// One catch clause: the handler entry and the caught types. An empty type
/// list is a catch-all kept as-is for an unrecognized shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatchPlan {
    pub handler: u32,
    pub types: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinallyPlan {
    pub handler: u32,
    /// Local holding the in-flight exception.
    pub exception_local: u16,
    /// The finally body proper: `[body_start, body_end)`.
    pub body_start: u32,
    pub body_end: u32,
    /// Inlined copies at normal exits, removed from the output.
    pub copies: Vec<(u32, u32)>,
    /// The whole `jsr` subroutine, `[entry, past ret)`.
    pub subroutine: Option<(u32, u32)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryPlan {
    /// Protected extent `[start, end)`.
    pub start: u32,
    pub end: u32,
    pub shape: TryShape,
    pub catches: Vec<CatchPlan>,
    pub finally: Option<FinallyPlan>,
    /// Local holding the monitor of a synchronized block.
    pub lock_local: Option<u16>,
    pub approximate: bool,
}

impl TryPlan {
    pub fn size(&self) -> u32 {
        self.end - self.start
    }

    pub fn contains(&self, pc: u32) -> bool {
        self.start <= pc && pc < self.end
    }

    /// Entry points of the handlers emitted as catch clauses.
    pub fn catch_entries(&self) -> impl Iterator<Item = u32> + '_ {
        self.catches.iter().map(|c| c.handler)
    }
}

/// Result of classifying a method's exception table.
#[derive(Clone, Debug, Default)]
pub struct ExceptionAnalysis {
    /// Innermost (smallest extent) first.
    pub plans: Vec<TryPlan>,
    pub extra_leaders: BTreeSet<u32>,
    /// Code removed from normal flow: finally copies and subroutines.
    pub skipped: Vec<(u32, u32)>,
}

impl ExceptionAnalysis {
    pub fn is_skipped(&self, pc: u32) -> bool {
        self.skipped.iter().any(|&(s, e)| s <= pc && pc < e)
    }

    /// End of the skipped range starting exactly at `pc`.
    pub fn skip_end(&self, pc: u32) -> Option<u32> {
        self.skipped.iter().find(|&&(s, _)| s == pc).map(|&(_, e)| e)
    }
}

struct HandlerGroup {
    pc: u32,
    types: Vec<Option<String>>,
    ranges: Vec<(u32, u32)>,
}

impl HandlerGroup {
    fn is_catch_all(&self) -> bool {
        self.types.iter().any(Option::is_none)
    }
}

struct Code<'a> {
    instructions: &'a [Instruction],
    index: BTreeMap<u32, usize>,
}

impl<'a> Code<'a> {
    fn new(instructions: &'a [Instruction]) -> Self {
        let index = instructions
            .iter()
            .enumerate()
            .map(|(i, insn)| (insn.offset, i))
            .collect();
        Self {
            instructions,
            index,
        }
    }

    fn at(&self, pc: u32) -> Option<&'a Instruction> {
        self.index.get(&pc).map(|&i| &self.instructions[i])
    }

    fn after(&self, insn: &Instruction) -> Option<&'a Instruction> {
        self.at(insn.next_offset())
    }

    fn before(&self, pc: u32) -> Option<&'a Instruction> {
        let i = *self.index.get(&pc)?;
        i.checked_sub(1).map(|p| &self.instructions[p])
    }

    /// Instructions in `[start, end)`.
    fn range(&self, start: u32, end: u32) -> &'a [Instruction] {
        let from = self.index.range(start..).next().map(|(_, &i)| i).unwrap_or(self.instructions.len());
        let to = self.index.range(end..).next().map(|(_, &i)| i).unwrap_or(self.instructions.len());
        &self.instructions[from..to.max(from)]
    }
}

/// Operation with local slots erased and branch targets made relative, so
/// copies of the same code compare equal.
fn shape_key(insn: &Instruction) -> Operation {
    let rel = |t: u32| t.wrapping_sub(insn.offset);
    match &insn.op {
        Operation::Load(k, _) => Operation::Load(*k, 0),
        Operation::Store(k, _) => Operation::Store(*k, 0),
        Operation::Iinc { value, .. } => Operation::Iinc {
            index: 0,
            value: *value,
        },
        Operation::Ret(_) => Operation::Ret(0),
        Operation::IfZero(c, t) => Operation::IfZero(*c, rel(*t)),
        Operation::IfIcmp(c, t) => Operation::IfIcmp(*c, rel(*t)),
        Operation::IfAcmp(c, t) => Operation::IfAcmp(*c, rel(*t)),
        Operation::IfNull(t) => Operation::IfNull(rel(*t)),
        Operation::IfNonNull(t) => Operation::IfNonNull(rel(*t)),
        Operation::Goto(t) => Operation::Goto(rel(*t)),
        Operation::Jsr(t) => Operation::Jsr(rel(*t)),
        Operation::TableSwitch {
            default,
            low,
            high,
            targets,
        } => Operation::TableSwitch {
            default: rel(*default),
            low: *low,
            high: *high,
            targets: targets.iter().map(|t| rel(*t)).collect(),
        },
        Operation::LookupSwitch { default, pairs } => Operation::LookupSwitch {
            default: rel(*default),
            pairs: pairs.iter().map(|(k, t)| (*k, rel(*t))).collect(),
        },
        other => other.clone(),
    }
}

fn is_ref_store(insn: Option<&Instruction>) -> Option<u16> {
    match insn.map(|i| &i.op) {
        Some(Operation::Store(ValueKind::Reference, n)) => Some(*n),
        _ => None,
    }
}

fn is_ref_load(insn: Option<&Instruction>, local: u16) -> bool {
    matches!(insn.map(|i| &i.op), Some(Operation::Load(ValueKind::Reference, n)) if *n == local)
}

/// Handler tail `astore t ... aload t; athrow`: returns `(t, body_start, rethrow_pc)`.
fn rethrow_handler(code: &Code, handler: u32) -> Option<(u16, u32, u32)> {
    let store = code.at(handler)?;
    let t = is_ref_store(Some(store))?;
    let body_start = store.next_offset();
    let mut pc = body_start;
    while let Some(insn) = code.at(pc) {
        if is_ref_load(Some(insn), t) && matches!(code.after(insn).map(|i| &i.op), Some(Operation::AThrow)) {
            return Some((t, body_start, insn.offset));
        }
        if insn.op.ends_flow() {
            return None;
        }
        pc = insn.next_offset();
    }
    None
}

/// Subroutine `astore r; body; ret r`: returns `(body_start, ret_pc, end)`.
fn subroutine(code: &Code, entry: u32) -> Option<(u32, u32, u32)> {
    let store = code.at(entry)?;
    let r = is_ref_store(Some(store))?;
    let body_start = store.next_offset();
    let mut pc = body_start;
    while let Some(insn) = code.at(pc) {
        if insn.op == Operation::Ret(r) {
            return Some((body_start, insn.offset, insn.next_offset()));
        }
        pc = insn.next_offset();
    }
    None
}

/// Classify every protected region of a method.
pub fn analyze(instructions: &[Instruction], edges: &[ExceptionEdge]) -> ExceptionAnalysis {
    let code = Code::new(instructions);

    // Handlers in order of first appearance in the table.
    let mut handlers: Vec<HandlerGroup> = Vec::new();
    for edge in edges {
        if edge.start_pc >= edge.end_pc {
            log::warn!(
                "ignoring empty protected range [{}, {}) -> {}",
                edge.start_pc,
                edge.end_pc,
                edge.handler_block
            );
            continue;
        }
        let group = match handlers.iter_mut().position(|h| h.pc == edge.handler_block) {
            Some(i) => &mut handlers[i],
            None => {
                handlers.push(HandlerGroup {
                    pc: edge.handler_block,
                    types: Vec::new(),
                    ranges: Vec::new(),
                });
                let last = handlers.len() - 1;
                &mut handlers[last]
            }
        };
        if !group.types.contains(&edge.catch_type) {
            group.types.push(edge.catch_type.clone());
        }
        group.ranges.push((edge.start_pc, edge.end_pc));
    }

    // Ranges starting at a handler entry protect handler code; they do not
    // define the try extent.
    let handler_pcs: BTreeSet<u32> = handlers.iter().map(|h| h.pc).collect();
    let mut regions: BTreeMap<(u32, u32), Vec<&HandlerGroup>> = BTreeMap::new();
    for h in &handlers {
        let primary: Vec<&(u32, u32)> = h
            .ranges
            .iter()
            .filter(|(s, _)| !handler_pcs.contains(s))
            .collect();
        let ranges: Vec<&(u32, u32)> = if primary.is_empty() {
            h.ranges.iter().collect()
        } else {
            primary
        };
        let start = ranges.iter().map(|r| r.0).min().unwrap_or(0);
        let end = ranges.iter().map(|r| r.1).max().unwrap_or(0);
        regions.entry((start, end)).or_default().push(h);
    }

    let mut ordered: Vec<((u32, u32), Vec<&HandlerGroup>)> = regions.into_iter().collect();
    ordered.sort_by(|((s1, e1), _), ((s2, e2), _)| (e1 - s1).cmp(&(e2 - s2)).then(s2.cmp(s1)));

    let mut analysis = ExceptionAnalysis::default();
    for ((start, end), group) in ordered {
        let plan = classify(&code, start, end, &group, &handler_pcs, &mut analysis.skipped);
        log::debug!(
            "try region [{}, {}) classified as {:?}",
            plan.start,
            plan.end,
            plan.shape
        );
        if plan.approximate {
            log::warn!(
                "unrecognized handler shape for [{}, {}), emitting catch clauses",
                plan.start,
                plan.end
            );
        }
        add_leaders(&plan, &mut analysis.extra_leaders);
        analysis.plans.push(plan);
    }
    analysis
}

fn add_leaders(plan: &TryPlan, leaders: &mut BTreeSet<u32>) {
    if let Some(f) = &plan.finally {
        leaders.insert(f.body_start);
        leaders.insert(f.body_end);
        for &(s, e) in &f.copies {
            leaders.insert(s);
            leaders.insert(e);
        }
        if let Some((s, e)) = f.subroutine {
            leaders.insert(s);
            leaders.insert(e);
        }
    }
}

fn catch_plans(group: &[&HandlerGroup]) -> Vec<CatchPlan> {
    group
        .iter()
        .filter(|h| !h.is_catch_all())
        .map(|h| CatchPlan {
            handler: h.pc,
            types: h.types.iter().flatten().cloned().collect(),
        })
        .collect()
}

fn classify(
    code: &Code,
    start: u32,
    end: u32,
    group: &[&HandlerGroup],
    handler_pcs: &BTreeSet<u32>,
    claimed: &mut Vec<(u32, u32)>,
) -> TryPlan {
    let mut catches = catch_plans(group);
    let catch_alls: Vec<&&HandlerGroup> = group.iter().filter(|h| h.is_catch_all()).collect();
    let mut plan = TryPlan {
        start,
        end,
        shape: TryShape::CatchOnly,
        catches: Vec::new(),
        finally: None,
        lock_local: None,
        approximate: false,
    };

    let any = match catch_alls.as_slice() {
        [] => {
            if catches.iter().any(|c| c.types.len() > 1) {
                plan.shape = TryShape::MultiCatch;
            }
            plan.catches = catches;
            return plan;
        }
        [one] => *one,
        _ => return unrecognized(plan, group),
    };

    let after_monitor = matches!(code.before(start).map(|i| &i.op), Some(Operation::MonitorEnter));
    let protects_self = any.ranges.iter().any(|&(s, e)| s <= any.pc && any.pc < e);
    let protects_catches = any
        .ranges
        .iter()
        .any(|(s, _)| catches.iter().any(|c| c.handler == *s));

    // astore t; jsr S; aload t; athrow
    let jsr_target = code.at(any.pc).and_then(|store| {
        let t = is_ref_store(Some(store))?;
        let jsr = code.after(store)?;
        let target = match jsr.op {
            Operation::Jsr(target) => target,
            _ => return None,
        };
        let load = code.after(jsr)?;
        let throw = code.after(load)?;
        (is_ref_load(Some(load), t) && throw.op == Operation::AThrow).then_some((t, target))
    });

    if let Some((t, entry)) = jsr_target {
        let (body_start, ret_pc, sub_end) = match subroutine(code, entry) {
            Some(s) => s,
            None => return unrecognized(plan, group),
        };
        claimed.push((entry, sub_end));
        let lock = if after_monitor {
            monitor_exit_lock(code.range(body_start, ret_pc))
        } else {
            None
        };
        plan.shape = if lock.is_some() {
            TryShape::SynchronizedJsr
        } else if catches.is_empty() {
            TryShape::FinallyJsr
        } else {
            TryShape::CatchFinallyJsr
        };
        plan.lock_local = lock;
        plan.catches = catches;
        plan.finally = Some(FinallyPlan {
            handler: any.pc,
            exception_local: t,
            body_start,
            body_end: ret_pc,
            copies: Vec::new(),
            subroutine: Some((entry, sub_end)),
        });
        return plan;
    }

    let (t, body_start, rethrow) = match rethrow_handler(code, any.pc) {
        Some(h) => h,
        None => return unrecognized(plan, group),
    };
    let body = code.range(body_start, rethrow);
    let copies = find_copies(code, body, start, any.pc, handler_pcs, claimed);
    claimed.extend(copies.iter().copied());

    if after_monitor {
        if let Some(lock) = monitor_exit_lock(body) {
            plan.shape = if protects_self {
                TryShape::SynchronizedDoubleExit
            } else {
                TryShape::SynchronizedSingleExit
            };
            plan.lock_local = Some(lock);
            plan.catches = std::mem::take(&mut catches);
        }
    }

    if plan.lock_local.is_none() {
        let returns_after_copy = copies.iter().any(|&(_, e)| {
            let next = code.at(e);
            let next = match next.map(|i| &i.op) {
                Some(Operation::Load(..)) => next.and_then(|i| code.after(i)),
                _ => next,
            };
            matches!(next.map(|i| &i.op), Some(Operation::Return(_)))
        });
        plan.shape = if !catches.is_empty() {
            if protects_catches {
                TryShape::CatchFinallyNested
            } else {
                TryShape::CatchFinallySibling
            }
        } else if body.is_empty() {
            TryShape::FinallyEmpty
        } else if copies.is_empty() {
            TryShape::FinallyNoNormalExit
        } else if returns_after_copy {
            TryShape::FinallyReturnInTry
        } else {
            TryShape::FinallyInlined
        };
        plan.catches = catches;
    }

    plan.finally = Some(FinallyPlan {
        handler: any.pc,
        exception_local: t,
        body_start,
        body_end: rethrow,
        copies,
        subroutine: None,
    });
    plan
}

/// `aload l; monitorexit` as the whole finally body.
fn monitor_exit_lock(body: &[Instruction]) -> Option<u16> {
    match body {
        [load, exit] if exit.op == Operation::MonitorExit => match load.op {
            Operation::Load(ValueKind::Reference, l) => Some(l),
            _ => None,
        },
        _ => None,
    }
}

fn unrecognized(mut plan: TryPlan, group: &[&HandlerGroup]) -> TryPlan {
    plan.shape = TryShape::Unrecognized;
    plan.approximate = true;
    plan.catches = group
        .iter()
        .map(|h| CatchPlan {
            handler: h.pc,
            types: h.types.iter().flatten().cloned().collect(),
        })
        .collect();
    plan
}

/// Inlined copies of `body` between the start of the region and the
/// finally handler, skipping handler entries and code already claimed by an
/// inner region.
fn find_copies(
    code: &Code,
    body: &[Instruction],
    start: u32,
    handler: u32,
    handler_pcs: &BTreeSet<u32>,
    claimed: &[(u32, u32)],
) -> Vec<(u32, u32)> {
    if body.is_empty() {
        return Vec::new();
    }
    let key: Vec<Operation> = body.iter().map(shape_key).collect();
    let candidates = code.range(start, handler);
    let is_claimed = |pc: u32| claimed.iter().any(|&(s, e)| s <= pc && pc < e);

    let mut copies = Vec::new();
    let mut i = 0;
    while i + key.len() <= candidates.len() {
        let window = &candidates[i..i + key.len()];
        let last = &window[window.len() - 1];
        let matches = window
            .iter()
            .zip(&key)
            .all(|(insn, k)| shape_key(insn) == *k && !is_claimed(insn.offset))
            && !window[1..].iter().any(|insn| handler_pcs.contains(&insn.offset))
            && last.next_offset() <= handler;
        if matches {
            copies.push((window[0].offset, last.next_offset()));
            i += key.len();
        } else {
            i += 1;
        }
    }
    copies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::decode_all;

    fn edge(start: u32, end: u32, handler: u32, ty: Option<&str>) -> ExceptionEdge {
        ExceptionEdge {
            start_pc: start,
            end_pc: end,
            handler_block: handler,
            catch_type: ty.map(String::from),
        }
    }

    #[test]
    fn test_javac_synchronized_double_exit() {
        // aload_0 dup astore_1 monitorenter invokestatic#2 aload_1 monitorexit goto 17
        // 12: astore_2 aload_1 monitorexit aload_2 athrow 17: return
        let code = [
            0x2a, 0x59, 0x4c, 0xc2, 0xb8, 0x00, 0x02, 0x2b, 0xc3, 0xa7, 0x00, 0x08, 0x4d, 0x2b,
            0xc3, 0x2c, 0xbf, 0xb1,
        ];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(&insns, &[edge(4, 9, 12, None), edge(12, 15, 12, None)]);
        assert_eq!(analysis.plans.len(), 1);
        let plan = &analysis.plans[0];
        assert_eq!(plan.shape, TryShape::SynchronizedDoubleExit);
        assert_eq!(plan.lock_local, Some(1));
        let finally = plan.finally.as_ref().unwrap();
        assert_eq!(finally.copies, vec![(7, 9)]);
        assert!(analysis.is_skipped(8));
        assert!(analysis.extra_leaders.contains(&7));
    }

    #[test]
    fn test_finally_inlined_copy() {
        // 0: invokestatic#2 (try) 3: invokestatic#3 (copy) 6: goto 16
        // 9: astore_1 10: invokestatic#3 13: aload_1 14: athrow 15: nop 16: return
        let code = [
            0xb8, 0x00, 0x02, 0xb8, 0x00, 0x03, 0xa7, 0x00, 0x0a, 0x4c, 0xb8, 0x00, 0x03, 0x2b,
            0xbf, 0x00, 0xb1,
        ];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(&insns, &[edge(0, 3, 9, None)]);
        let plan = &analysis.plans[0];
        assert_eq!(plan.shape, TryShape::FinallyInlined);
        let finally = plan.finally.as_ref().unwrap();
        assert_eq!((finally.body_start, finally.body_end), (10, 13));
        assert_eq!(finally.copies, vec![(3, 6)]);
        assert_eq!(analysis.skip_end(3), Some(6));
    }

    #[test]
    fn test_nested_regions_innermost_first() {
        // Two typed handlers over [0,10) and [0,5), listed outer first.
        let code = [0x00u8; 16];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(
            &insns,
            &[edge(0, 10, 12, Some("java/lang/Exception")), edge(0, 5, 14, Some("java/io/IOException"))],
        );
        let extents: Vec<(u32, u32)> = analysis.plans.iter().map(|p| (p.start, p.end)).collect();
        assert_eq!(extents, vec![(0, 5), (0, 10)]);
        assert_eq!(analysis.plans[0].catches[0].handler, 14);
        assert_eq!(analysis.plans[0].shape, TryShape::CatchOnly);
    }

    #[test]
    fn test_multi_catch_and_unrecognized() {
        let code = [0x00u8; 8];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(
            &insns,
            &[edge(0, 4, 5, Some("a/A")), edge(0, 4, 5, Some("a/B"))],
        );
        assert_eq!(analysis.plans[0].shape, TryShape::MultiCatch);
        assert_eq!(analysis.plans[0].catches[0].types, vec!["a/A".to_string(), "a/B".to_string()]);

        // A catch-all whose handler does not rethrow.
        let analysis = analyze(&insns, &[edge(0, 4, 5, None)]);
        assert_eq!(analysis.plans[0].shape, TryShape::Unrecognized);
        assert!(analysis.plans[0].approximate);
        assert!(analysis.plans[0].catches[0].types.is_empty());
    }
    #[test]
    fn test_javac_catch_finally_nested() {
        // try { a(); } catch (Exception e) { b(); } finally { c(); }
        // 0: a 3: c 6: goto 25 9: astore_0 10: b 13: c 16: goto 25
        // 19: astore_1 20: c 23: aload_1 24: athrow 25: return
        let code = [
            0xb8, 0x00, 0x02, 0xb8, 0x00, 0x04, 0xa7, 0x00, 0x13, 0x4b, 0xb8, 0x00, 0x03, 0xb8,
            0x00, 0x04, 0xa7, 0x00, 0x09, 0x4c, 0xb8, 0x00, 0x04, 0x2b, 0xbf, 0xb1,
        ];
        let insns = decode_all(&code).unwrap();
        let edges = [
            edge(0, 3, 9, Some("java/lang/Exception")),
            edge(0, 3, 19, None),
            edge(9, 13, 19, None),
        ];
        let analysis = analyze(&insns, &edges);
        assert_eq!(analysis.plans.len(), 1);
        let plan = &analysis.plans[0];
        assert_eq!(plan.shape, TryShape::CatchFinallyNested);
        assert_eq!(plan.catches[0].handler, 9);
        let finally = plan.finally.as_ref().unwrap();
        assert_eq!((finally.body_start, finally.body_end), (20, 23));
        assert_eq!(finally.copies, vec![(3, 6), (13, 16)]);

        // The catch body left unprotected by the catch-all: separate entries.
        let analysis = analyze(&insns, &edges[..2]);
        assert_eq!(analysis.plans[0].shape, TryShape::CatchFinallySibling);
        assert_eq!(analysis.plans[0].finally.as_ref().unwrap().copies.len(), 2);
    }

    #[test]
    fn test_jsr_finally() {
        // 0: a 3: jsr 15 6: goto 21 9: astore_1 10: jsr 15 13: aload_1 14: athrow
        // 15: astore_2 16: c 19: ret 2 21: return
        let code = [
            0xb8, 0x00, 0x02, 0xa8, 0x00, 0x0c, 0xa7, 0x00, 0x0f, 0x4c, 0xa8, 0x00, 0x05, 0x2b,
            0xbf, 0x4d, 0xb8, 0x00, 0x04, 0xa9, 0x02, 0xb1,
        ];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(&insns, &[edge(0, 3, 9, None)]);
        let plan = &analysis.plans[0];
        assert_eq!(plan.shape, TryShape::FinallyJsr);
        let finally = plan.finally.as_ref().unwrap();
        assert_eq!((finally.body_start, finally.body_end), (16, 19));
        assert_eq!(finally.subroutine, Some((15, 21)));
        assert_eq!(finally.exception_local, 1);
        assert!(analysis.is_skipped(19));
        assert!(!analysis.is_skipped(21));
    }

    #[test]
    fn test_jsr_catch_finally() {
        // 0: a 3: jsr 25 6: goto 31 9: astore_0 10: b 13: jsr 25 16: goto 31
        // 19: astore_1 20: jsr 25 23: aload_1 24: athrow
        // 25: astore_2 26: c 29: ret 2 31: return
        let code = [
            0xb8, 0x00, 0x02, 0xa8, 0x00, 0x16, 0xa7, 0x00, 0x19, 0x4b, 0xb8, 0x00, 0x03, 0xa8,
            0x00, 0x0c, 0xa7, 0x00, 0x0f, 0x4c, 0xa8, 0x00, 0x05, 0x2b, 0xbf, 0x4d, 0xb8, 0x00,
            0x04, 0xa9, 0x02, 0xb1,
        ];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(
            &insns,
            &[edge(0, 3, 9, Some("java/lang/Exception")), edge(0, 3, 19, None)],
        );
        let plan = &analysis.plans[0];
        assert_eq!(plan.shape, TryShape::CatchFinallyJsr);
        assert_eq!(plan.catches[0].types, vec!["java/lang/Exception".to_string()]);
        assert_eq!(plan.finally.as_ref().unwrap().subroutine, Some((25, 31)));
    }

    #[test]
    fn test_synchronized_single_exit_and_jsr() {
        // Same layout as the javac form, but the unlock handler is unprotected.
        let code = [
            0x2a, 0x59, 0x4c, 0xc2, 0xb8, 0x00, 0x02, 0x2b, 0xc3, 0xa7, 0x00, 0x08, 0x4d, 0x2b,
            0xc3, 0x2c, 0xbf, 0xb1,
        ];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(&insns, &[edge(4, 9, 12, None)]);
        assert_eq!(analysis.plans[0].shape, TryShape::SynchronizedSingleExit);
        assert_eq!(analysis.plans[0].lock_local, Some(1));

        // 0: aload_0 dup astore_1 monitorenter 4: a 7: jsr 19 10: goto 24
        // 13: astore_2 14: jsr 19 17: aload_2 18: athrow
        // 19: astore_3 20: aload_1 21: monitorexit 22: ret 3 24: return
        let code = [
            0x2a, 0x59, 0x4c, 0xc2, 0xb8, 0x00, 0x02, 0xa8, 0x00, 0x0c, 0xa7, 0x00, 0x0e, 0x4d,
            0xa8, 0x00, 0x05, 0x2c, 0xbf, 0x4e, 0x2b, 0xc3, 0xa9, 0x03, 0xb1,
        ];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(&insns, &[edge(4, 7, 13, None)]);
        let plan = &analysis.plans[0];
        assert_eq!(plan.shape, TryShape::SynchronizedJsr);
        assert_eq!(plan.lock_local, Some(1));
        assert_eq!(plan.finally.as_ref().unwrap().subroutine, Some((19, 24)));
    }

    #[test]
    fn test_finally_after_return_value() {
        // int f() { try { return a(); } finally { c(); } }
        // 0: a 3: istore_0 4: c 7: iload_0 8: ireturn
        // 9: astore_1 10: c 13: aload_1 14: athrow
        let code = [
            0xb8, 0x00, 0x02, 0x3b, 0xb8, 0x00, 0x04, 0x1a, 0xac, 0x4c, 0xb8, 0x00, 0x04, 0x2b,
            0xbf,
        ];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(&insns, &[edge(0, 4, 9, None)]);
        let plan = &analysis.plans[0];
        assert_eq!(plan.shape, TryShape::FinallyReturnInTry);
        assert_eq!(plan.finally.as_ref().unwrap().copies, vec![(4, 7)]);
    }

    #[test]
    fn test_finally_empty_and_without_normal_exit() {
        // try { a(); } finally { }
        // 0: a 3: goto 9 6: astore_1 7: aload_1 8: athrow 9: return
        let code = [0xb8, 0x00, 0x02, 0xa7, 0x00, 0x06, 0x4c, 0x2b, 0xbf, 0xb1];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(&insns, &[edge(0, 3, 6, None)]);
        let plan = &analysis.plans[0];
        assert_eq!(plan.shape, TryShape::FinallyEmpty);
        let finally = plan.finally.as_ref().unwrap();
        assert_eq!(finally.body_start, finally.body_end);
        assert!(finally.copies.is_empty());

        // try { throw null; } finally { c(); }
        // 0: aconst_null 1: athrow 2: astore_1 3: c 6: aload_1 7: athrow
        let code = [0x01, 0xbf, 0x4c, 0xb8, 0x00, 0x04, 0x2b, 0xbf];
        let insns = decode_all(&code).unwrap();
        let analysis = analyze(&insns, &[edge(0, 2, 2, None)]);
        let plan = &analysis.plans[0];
        assert_eq!(plan.shape, TryShape::FinallyNoNormalExit);
        assert_eq!(plan.finally.as_ref().unwrap().body_start, 3);
    }
}
