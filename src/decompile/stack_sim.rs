use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::attribute_info::CodeAttribute;
use crate::code_attribute::{ArithOp, ArrayKind, CmpOp, Instruction, NarrowKind, Operation, ValueKind};
use crate::constant_info::{ConstantInfo, ConstantPool};
use crate::error::{DecompileError, DecompileResult};

use super::cfg_types::*;
use super::descriptor::*;
use super::dup::DupArena;
use super::expr::*;
use super::resolver::TypeResolver;

const THROWABLE: &str = "java/lang/Throwable";

/// How control leaves a simulated block.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockExit {
    Fall(BlockId),
    Goto(BlockId),
    /// Branch to `taken` when `cond` holds, otherwise continue at `fall`.
    Cond {
        cond: Expr,
        taken: BlockId,
        fall: BlockId,
    },
    Switch {
        key: Expr,
        default: BlockId,
        cases: Vec<(i32, BlockId)>,
    },
    Return,
    Throw,
    /// Return from a `jsr` subroutine.
    Ret,
}

/// A basic block after stack simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatedBlock {
    pub id: BlockId,
    pub statements: Vec<Statement>,
    pub exit: BlockExit,
    /// Operand stack left for the successors.
    pub exit_stack: Vec<Expr>,
}

impl SimulatedBlock {
    pub fn successors(&self) -> Vec<BlockId> {
        match &self.exit {
            BlockExit::Fall(t) | BlockExit::Goto(t) => vec![*t],
            BlockExit::Cond { taken, fall, .. } => {
                if taken == fall {
                    vec![*taken]
                } else {
                    vec![*taken, *fall]
                }
            }
            BlockExit::Switch { default, cases, .. } => {
                let mut succs: Vec<BlockId> = cases.iter().map(|(_, t)| *t).collect();
                succs.push(*default);
                succs.sort();
                succs.dedup();
                succs
            }
            BlockExit::Return | BlockExit::Throw | BlockExit::Ret => Vec::new(),
        }
    }

    pub fn visit_exprs(&self, f: &mut impl FnMut(&Expr)) {
        for s in &self.statements {
            s.stmt.visit_exprs(f);
        }
        match &self.exit {
            BlockExit::Cond { cond, .. } => cond.visit(f),
            BlockExit::Switch { key, .. } => key.visit(f),
            _ => {}
        }
        for e in &self.exit_stack {
            e.visit(f);
        }
    }

    pub fn rewrite_exprs(&mut self, f: &mut impl FnMut(Expr) -> Expr) {
        let statements = std::mem::take(&mut self.statements);
        self.statements = statements
            .into_iter()
            .map(|s| Statement {
                stmt: s.stmt.rewrite_exprs(f),
                ..s
            })
            .collect();
        match &mut self.exit {
            BlockExit::Cond { cond, .. } => {
                let c = std::mem::replace(cond, Expr::NullLiteral);
                *cond = c.rewrite(f);
            }
            BlockExit::Switch { key, .. } => {
                let k = std::mem::replace(key, Expr::NullLiteral);
                *key = k.rewrite(f);
            }
            _ => {}
        }
        let stack = std::mem::take(&mut self.exit_stack);
        self.exit_stack = stack.into_iter().map(|e| e.rewrite(f)).collect();
    }
}

#[derive(Clone, Debug)]
struct LocalEntry {
    index: u16,
    start: u32,
    end: u32,
    name: String,
    ty: JvmType,
}

/// Debug names and declared types of local slots, from LocalVariableTable
/// with parameter names as a fallback.
#[derive(Clone, Debug, Default)]
pub struct LocalNames {
    entries: Vec<LocalEntry>,
    params: HashMap<u16, (String, JvmType)>,
}

impl LocalNames {
    pub fn with_parameter(mut self, slot: u16, name: String, ty: JvmType) -> Self {
        self.params.insert(slot, (name, ty));
        self
    }

    /// Name and type of `index` at `pc`. A store initializes the variable
    /// whose scope starts just after it, so stores prefer that entry.
    pub fn lookup(&self, index: u16, pc: u32, store: bool) -> Option<(&str, &JvmType)> {
        let candidates = || self.entries.iter().filter(move |e| e.index == index);
        let starting = candidates().find(|e| store && e.start > pc && e.start <= pc + 4);
        let live = || candidates().find(|e| e.start <= pc && pc < e.end);
        let near = || {
            candidates().find(|e| pc + 4 >= e.start && pc < e.end)
        };
        if let Some(e) = starting.or_else(live).or_else(near) {
            return Some((e.name.as_str(), &e.ty));
        }
        if candidates().next().is_none() {
            return self.params.get(&index).map(|(n, t)| (n.as_str(), t));
        }
        None
    }

    /// A slot var at `pc`; `kind` supplies the type when the table has none.
    pub fn var(&self, index: u16, kind: ValueKind, pc: u32, store: bool) -> LocalVar {
        match self.lookup(index, pc, store) {
            Some((name, ty)) => LocalVar::slot(index, Some(name.to_string()), ty.clone()),
            None => LocalVar::slot(index, None, JvmType::from_value_kind(kind)),
        }
    }
}

/// Build a lookup table of local variable names from the LocalVariableTable.
pub fn build_local_name_table(code_attr: &CodeAttribute, const_pool: &ConstantPool) -> LocalNames {
    let mut names = LocalNames::default();
    if let Some(lvt) = code_attr.local_variable_table() {
        for item in &lvt.items {
            let name = match const_pool.utf8(item.name_index) {
                Ok(n) => n.to_string(),
                Err(e) => {
                    log::warn!("local variable table entry for slot {}: {}", item.index, e);
                    continue;
                }
            };
            let ty = const_pool
                .utf8(item.descriptor_index)
                .ok()
                .and_then(parse_type_descriptor)
                .unwrap_or(JvmType::Unknown);
            names.entries.push(LocalEntry {
                index: item.index,
                start: item.start_pc as u32,
                end: item.start_pc as u32 + item.length as u32,
                name,
                ty,
            });
        }
    }
    names
}

/// Everything the simulator needs to know about the method being simulated.
pub struct MethodContext<'a> {
    pub pool: &'a ConstantPool,
    pub code: &'a CodeAttribute,
    pub resolver: &'a TypeResolver<'a>,
    pub locals: LocalNames,
    pub is_static: bool,
    pub return_type: JvmType,
}

/// Simulate every reachable block of `cfg`, propagating operand stacks
/// across block boundaries, and resolve duplicated values.
pub fn simulate(
    cfg: &ControlFlowGraph,
    ctx: &MethodContext,
) -> DecompileResult<BTreeMap<BlockId, SimulatedBlock>> {
    let rpo = cfg.reverse_postorder();
    let reachable: BTreeSet<BlockId> = rpo.iter().copied().collect();

    let mut pred_count: HashMap<BlockId, usize> = HashMap::new();
    for &b in &rpo {
        for s in cfg.successors(b) {
            *pred_count.entry(s).or_default() += 1;
        }
    }

    let mut handler_types: BTreeMap<BlockId, Vec<Option<String>>> = BTreeMap::new();
    for edge in &cfg.exception_edges {
        let types = handler_types.entry(edge.handler_block).or_default();
        if !types.contains(&edge.catch_type) {
            types.push(edge.catch_type.clone());
        }
    }
    let subroutines = cfg.subroutine_entries();

    let mut arena = DupArena::new();
    let mut next_temp = 0u16;
    let mut next_stack = 0u16;
    let mut blocks: BTreeMap<BlockId, SimulatedBlock> = BTreeMap::new();
    let mut pending: HashMap<BlockId, Vec<(BlockId, Vec<Expr>)>> = HashMap::new();
    // Entry stacks of processed blocks; `Some` slots were spilled to a variable.
    let mut entry_vars: HashMap<BlockId, Vec<Option<LocalVar>>> = HashMap::new();

    for &id in &rpo {
        let block = match cfg.blocks.get(&id) {
            Some(b) => b,
            None => continue,
        };
        let entry_stack = if let Some(types) = handler_types.get(&id) {
            let name = match types.as_slice() {
                [Some(single)] => single.clone(),
                _ => THROWABLE.to_string(),
            };
            vec![Expr::CaughtException(name)]
        } else if subroutines.contains(&id) {
            vec![Expr::ReturnAddress]
        } else {
            let incoming = pending.remove(&id).unwrap_or_default();
            let preds = pred_count.get(&id).copied().unwrap_or(0);
            let (stack, vars) = merge_stacks(id, incoming.as_slice(), preds, &mut next_stack)?;
            for (pred, pred_stack) in &incoming {
                if let Some(p) = blocks.get_mut(pred) {
                    append_spills(p, &vars, pred_stack);
                }
            }
            entry_vars.insert(id, vars);
            stack
        };

        let simulated = BlockSim::new(ctx, &mut arena, &mut next_temp, entry_stack, id).run(block)?;

        for succ in simulated.successors() {
            if !reachable.contains(&succ) || handler_types.contains_key(&succ) {
                continue;
            }
            if let Some(vars) = entry_vars.get(&succ) {
                // Back edge into a block that has already been simulated.
                if vars.len() != simulated.exit_stack.len() {
                    return Err(DecompileError::StackHeight {
                        block: succ,
                        expected: vars.len(),
                        found: simulated.exit_stack.len(),
                    });
                }
                continue;
            }
            pending
                .entry(succ)
                .or_default()
                .push((id, simulated.exit_stack.clone()));
        }

        let mut simulated = simulated;
        for succ in simulated.successors() {
            if let Some(vars) = entry_vars.get(&succ) {
                let stack = simulated.exit_stack.clone();
                append_spills(&mut simulated, vars, &stack);
            }
        }
        blocks.insert(id, simulated);
    }

    log::debug!(
        "simulated {} blocks, {} duplicated values",
        blocks.len(),
        arena.len()
    );
    arena.resolve(&mut blocks, &mut next_temp);
    Ok(blocks)
}

/// Entry stack of a block from the exit stacks of its processed
/// predecessors. Slots that agree everywhere are kept; the rest are
/// spilled to `stackN` variables. If a predecessor has not been seen yet (a
/// back edge) every slot is spilled.
fn merge_stacks(
    id: BlockId,
    incoming: &[(BlockId, Vec<Expr>)],
    preds: usize,
    next_stack: &mut u16,
) -> DecompileResult<(Vec<Expr>, Vec<Option<LocalVar>>)> {
    let first = match incoming.first() {
        Some((_, s)) => s,
        None => return Ok((Vec::new(), Vec::new())),
    };
    for (_, s) in incoming {
        if s.len() != first.len() {
            return Err(DecompileError::StackHeight {
                block: id,
                expected: first.len(),
                found: s.len(),
            });
        }
    }
    let all_seen = incoming.len() >= preds;
    let mut stack = Vec::with_capacity(first.len());
    let mut vars = Vec::with_capacity(first.len());
    for (i, value) in first.iter().enumerate() {
        let agree = incoming.iter().all(|(_, s)| &s[i] == value);
        if all_seen && agree {
            stack.push(value.clone());
            vars.push(None);
        } else {
            let ty = incoming
                .iter()
                .map(|(_, s)| s[i].ty())
                .find(|t| !matches!(t, JvmType::Null | JvmType::Unknown))
                .unwrap_or(JvmType::Unknown);
            let var = LocalVar::stack(*next_stack, ty);
            *next_stack += 1;
            stack.push(Expr::Local(var.clone()));
            vars.push(Some(var));
        }
    }
    Ok((stack, vars))
}

/// Store a predecessor's outgoing stack into the spill variables of a successor.
fn append_spills(block: &mut SimulatedBlock, vars: &[Option<LocalVar>], stack: &[Expr]) {
    let end = block
        .statements
        .last()
        .map(|s| s.end_pc)
        .unwrap_or(block.id);
    for (var, value) in vars.iter().zip(stack) {
        if let Some(var) = var {
            block.statements.push(Statement {
                stmt: Stmt::LocalStore {
                    var: var.clone(),
                    value: value.clone(),
                },
                start_pc: end,
                end_pc: end,
                line: None,
            });
        }
    }
}

fn load_constant(pool: &ConstantPool, index: u16) -> DecompileResult<Expr> {
    Ok(match pool.get(index)? {
        ConstantInfo::Integer(c) => Expr::IntLiteral(c.value),
        ConstantInfo::Float(c) => Expr::FloatLiteral(c.value),
        ConstantInfo::Long(c) => Expr::LongLiteral(c.value),
        ConstantInfo::Double(c) => Expr::DoubleLiteral(c.value),
        ConstantInfo::String(c) => Expr::StringLiteral(pool.utf8(c.string_index)?.to_string()),
        ConstantInfo::Class(_) => Expr::ClassLiteral(parse_class_operand(pool.class_name(index)?)),
        other => Expr::Unresolved(format!("{} constant #{}", other.kind_name(), index)),
    })
}

struct BlockSim<'s, 'a> {
    ctx: &'s MethodContext<'a>,
    arena: &'s mut DupArena,
    next_temp: &'s mut u16,
    stack: Vec<Expr>,
    out: Vec<Statement>,
    stmt_start: u32,
    block: BlockId,
}

impl<'s, 'a> BlockSim<'s, 'a> {
    fn new(
        ctx: &'s MethodContext<'a>,
        arena: &'s mut DupArena,
        next_temp: &'s mut u16,
        stack: Vec<Expr>,
        block: BlockId,
    ) -> Self {
        Self {
            ctx,
            arena,
            next_temp,
            stack,
            out: Vec::new(),
            stmt_start: block,
            block,
        }
    }

    fn run(mut self, block: &BasicBlock) -> DecompileResult<SimulatedBlock> {
        let mut exit = None;
        for insn in &block.instructions {
            exit = self.step(insn)?;
        }
        let exit = match exit {
            Some(e) => e,
            None => match &block.terminator {
                Terminator::FallThrough { target } => BlockExit::Fall(*target),
                Terminator::Jsr { return_addr, .. } => BlockExit::Fall(*return_addr),
                Terminator::Goto { target } => BlockExit::Goto(*target),
                Terminator::Return => BlockExit::Return,
                Terminator::Throw => BlockExit::Throw,
                Terminator::Ret => BlockExit::Ret,
                Terminator::ConditionalBranch { .. } | Terminator::Switch { .. } => {
                    BlockExit::Fall(block.end())
                }
            },
        };
        Ok(SimulatedBlock {
            id: self.block,
            statements: self.out,
            exit,
            exit_stack: self.stack,
        })
    }

    fn push(&mut self, e: Expr) {
        self.stack.push(e);
    }

    fn pop(&mut self, insn: &Instruction) -> DecompileResult<Expr> {
        self.stack.pop().ok_or(DecompileError::StackUnderflow {
            offset: insn.offset,
        })
    }

    fn pop_n(&mut self, n: usize, insn: &Instruction) -> DecompileResult<Vec<Expr>> {
        if self.stack.len() < n {
            return Err(DecompileError::StackUnderflow {
                offset: insn.offset,
            });
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn is_wide(&self, e: &Expr) -> bool {
        match e {
            Expr::DupLoad(id) => self.arena.get(*id).map(|v| v.ty().is_wide()).unwrap_or(false),
            other => other.ty().is_wide(),
        }
    }

    /// Pop a category-1 value.
    fn pop1(&mut self, insn: &Instruction, op: &'static str) -> DecompileResult<Expr> {
        let v = self.pop(insn)?;
        if self.is_wide(&v) {
            return Err(DecompileError::CategoryMismatch {
                offset: insn.offset,
                op,
                found: "category 2",
            });
        }
        Ok(v)
    }

    fn emit(&mut self, stmt: Stmt, insn: &Instruction) {
        let start = self.stmt_start;
        self.out.push(Statement {
            stmt,
            start_pc: start,
            end_pc: insn.next_offset(),
            line: self.ctx.code.line_for(start),
        });
        self.stmt_start = insn.next_offset();
    }

    /// Two copies of `value`: the value itself when it can be evaluated
    /// twice, otherwise placeholders bound in the arena.
    fn duplicate(&mut self, value: Expr, insn: &Instruction) -> (Expr, Expr) {
        if value.is_pure() || matches!(value, Expr::DupLoad(_) | Expr::UninitNew { .. }) {
            return (value.clone(), value);
        }
        let id = self.arena.bind(value);
        self.out.push(Statement {
            stmt: Stmt::DupStore(id),
            start_pc: self.stmt_start,
            end_pc: insn.next_offset(),
            line: self.ctx.code.line_for(self.stmt_start),
        });
        (Expr::DupLoad(id), Expr::DupLoad(id))
    }

    /// Move stack values that read `var` into temporaries before `var` changes.
    fn spill_readers(&mut self, var: &LocalVar) {
        for i in 0..self.stack.len() {
            let reads = match &self.stack[i] {
                Expr::DupLoad(id) => self.arena.get(*id).map(|v| v.reads(var)).unwrap_or(false),
                e => e.reads(var),
            };
            if !reads {
                continue;
            }
            let value = self.stack[i].clone();
            let temp = LocalVar::temp(*self.next_temp, value.ty());
            *self.next_temp += 1;
            let start = self.stmt_start;
            self.out.push(Statement {
                stmt: Stmt::LocalStore {
                    var: temp.clone(),
                    value,
                },
                start_pc: start,
                end_pc: start,
                line: self.ctx.code.line_for(start),
            });
            self.stack[i] = Expr::Local(temp);
        }
    }

    fn local(&self, kind: ValueKind, index: u16, pc: u32, store: bool) -> LocalVar {
        self.ctx.locals.var(index, kind, pc, store)
    }

    fn step(&mut self, insn: &Instruction) -> DecompileResult<Option<BlockExit>> {
        let pool = self.ctx.pool;
        match &insn.op {
            Operation::Nop => {}
            Operation::AconstNull => self.push(Expr::NullLiteral),
            Operation::Iconst(v) => self.push(Expr::IntLiteral(*v)),
            Operation::Lconst(v) => self.push(Expr::LongLiteral(*v)),
            Operation::Fconst(v) => self.push(Expr::FloatLiteral(*v)),
            Operation::Dconst(v) => self.push(Expr::DoubleLiteral(*v)),
            Operation::Ldc(i) | Operation::Ldc2W(i) => {
                let c = load_constant(pool, *i)?;
                self.push(c);
            }

            Operation::Load(kind, index) => {
                if !self.ctx.is_static && *index == 0 && *kind == ValueKind::Reference {
                    self.push(Expr::This);
                } else {
                    let var = self.local(*kind, *index, insn.offset, false);
                    self.push(Expr::Local(var));
                }
            }
            Operation::Store(kind, index) => {
                let value = self.pop(insn)?;
                if value == Expr::ReturnAddress {
                    // `astore` of a jsr return address.
                    self.stmt_start = insn.next_offset();
                    return Ok(None);
                }
                let var = self.local(*kind, *index, insn.offset, true);
                self.spill_readers(&var);
                let value = retype_literal(value, &var.ty);
                self.emit(Stmt::LocalStore { var, value }, insn);
            }
            Operation::Iinc { index, value } => {
                let var = self.local(ValueKind::Int, *index, insn.offset, false);
                self.spill_readers(&var);
                self.emit(
                    Stmt::Iinc {
                        var,
                        amount: *value as i32,
                    },
                    insn,
                );
            }

            Operation::ArrayLoad(kind) => {
                let index = self.pop(insn)?;
                let array = self.pop(insn)?;
                let ty = element_type(&array, *kind);
                self.push(Expr::ArrayLoad {
                    array: Box::new(array),
                    index: Box::new(index),
                    ty,
                });
            }
            Operation::ArrayStore(kind) => {
                let value = self.pop(insn)?;
                let index = self.pop(insn)?;
                let array = self.pop(insn)?;
                let value = retype_literal(value, &element_type(&array, *kind));
                self.emit(
                    Stmt::ArrayStore {
                        array,
                        index,
                        value,
                    },
                    insn,
                );
            }

            Operation::Pop => {
                let v = self.pop1(insn, "pop")?;
                self.discard(v, insn);
            }
            Operation::Pop2 => {
                let v = self.pop(insn)?;
                let wide = self.is_wide(&v);
                self.discard(v, insn);
                if !wide {
                    let w = self.pop1(insn, "pop2")?;
                    self.discard(w, insn);
                }
            }
            Operation::Dup => {
                let v = self.pop1(insn, "dup")?;
                let (a, b) = self.duplicate(v, insn);
                self.push(a);
                self.push(b);
            }
            Operation::DupX1 => {
                let v1 = self.pop1(insn, "dup_x1")?;
                let v2 = self.pop1(insn, "dup_x1")?;
                let (a, b) = self.duplicate(v1, insn);
                self.stack.extend([a, v2, b]);
            }
            Operation::DupX2 => {
                let v1 = self.pop1(insn, "dup_x2")?;
                let v2 = self.pop(insn)?;
                let (a, b) = self.duplicate(v1, insn);
                if self.is_wide(&v2) {
                    self.stack.extend([a, v2, b]);
                } else {
                    let v3 = self.pop1(insn, "dup_x2")?;
                    self.stack.extend([a, v3, v2, b]);
                }
            }
            Operation::Dup2 => {
                let v1 = self.pop(insn)?;
                if self.is_wide(&v1) {
                    let (a, b) = self.duplicate(v1, insn);
                    self.stack.extend([a, b]);
                } else {
                    let v2 = self.pop1(insn, "dup2")?;
                    let (a2, b2) = self.duplicate(v2, insn);
                    let (a1, b1) = self.duplicate(v1, insn);
                    self.stack.extend([a2, a1, b2, b1]);
                }
            }
            Operation::Dup2X1 => {
                let v1 = self.pop(insn)?;
                if self.is_wide(&v1) {
                    let v2 = self.pop1(insn, "dup2_x1")?;
                    let (a, b) = self.duplicate(v1, insn);
                    self.stack.extend([a, v2, b]);
                } else {
                    let v2 = self.pop1(insn, "dup2_x1")?;
                    let v3 = self.pop1(insn, "dup2_x1")?;
                    let (a2, b2) = self.duplicate(v2, insn);
                    let (a1, b1) = self.duplicate(v1, insn);
                    self.stack.extend([a2, a1, v3, b2, b1]);
                }
            }
            Operation::Dup2X2 => {
                let v1 = self.pop(insn)?;
                let v2 = self.pop(insn)?;
                match (self.is_wide(&v1), self.is_wide(&v2)) {
                    (true, true) => {
                        let (a, b) = self.duplicate(v1, insn);
                        self.stack.extend([a, v2, b]);
                    }
                    (true, false) => {
                        let v3 = self.pop1(insn, "dup2_x2")?;
                        let (a, b) = self.duplicate(v1, insn);
                        self.stack.extend([a, v3, v2, b]);
                    }
                    (false, false) => {
                        let v3 = self.pop(insn)?;
                        let (a2, b2) = self.duplicate(v2, insn);
                        let (a1, b1) = self.duplicate(v1, insn);
                        if self.is_wide(&v3) {
                            self.stack.extend([a2, a1, v3, b2, b1]);
                        } else {
                            let v4 = self.pop1(insn, "dup2_x2")?;
                            self.stack.extend([a2, a1, v4, v3, b2, b1]);
                        }
                    }
                    (false, true) => {
                        return Err(DecompileError::CategoryMismatch {
                            offset: insn.offset,
                            op: "dup2_x2",
                            found: "category 2",
                        })
                    }
                }
            }
            Operation::Swap => {
                let v1 = self.pop1(insn, "swap")?;
                let v2 = self.pop1(insn, "swap")?;
                self.stack.extend([v1, v2]);
            }

            Operation::Arith(kind, op) => {
                let right = self.pop(insn)?;
                let left = self.pop(insn)?;
                let bitwise = matches!(op, ArithOp::And | ArithOp::Or | ArithOp::Xor);
                let ty = if bitwise && left.is_boolean() && right.is_boolean() {
                    JvmType::Boolean
                } else {
                    JvmType::from_value_kind(*kind)
                };
                self.push(Expr::BinaryOp {
                    op: *op,
                    ty,
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }
            Operation::Neg(_) => {
                let v = self.pop(insn)?;
                self.push(Expr::Neg(Box::new(v)));
            }
            Operation::Convert { to, .. } => {
                let v = self.pop(insn)?;
                self.push(Expr::Cast {
                    ty: JvmType::from_value_kind(*to),
                    expr: Box::new(v),
                });
            }
            Operation::Narrow(kind) => {
                let v = self.pop(insn)?;
                let ty = match kind {
                    NarrowKind::Byte => JvmType::Byte,
                    NarrowKind::Char => JvmType::Char,
                    NarrowKind::Short => JvmType::Short,
                };
                self.push(Expr::Cast {
                    ty,
                    expr: Box::new(v),
                });
            }
            Operation::Lcmp | Operation::Fcmp { .. } | Operation::Dcmp { .. } => {
                let right = self.pop(insn)?;
                let left = self.pop(insn)?;
                self.push(Expr::CmpResult {
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }

            Operation::IfZero(op, target) => {
                let v = self.pop(insn)?;
                let cond = zero_test(*op, v);
                return Ok(Some(self.cond(cond, *target, insn)));
            }
            Operation::IfIcmp(op, target) => {
                let right = self.pop(insn)?;
                let left = self.pop(insn)?;
                let right = retype_literal(right, &left.ty());
                let left = retype_literal(left, &right.ty());
                return Ok(Some(self.cond(Expr::compare(*op, left, right), *target, insn)));
            }
            Operation::IfAcmp(op, target) => {
                let right = self.pop(insn)?;
                let left = self.pop(insn)?;
                return Ok(Some(self.cond(Expr::compare(*op, left, right), *target, insn)));
            }
            Operation::IfNull(target) | Operation::IfNonNull(target) => {
                let v = self.pop(insn)?;
                let op = if matches!(insn.op, Operation::IfNull(_)) {
                    CmpOp::Eq
                } else {
                    CmpOp::Ne
                };
                let cond = Expr::compare(op, v, Expr::NullLiteral);
                return Ok(Some(self.cond(cond, *target, insn)));
            }
            Operation::Goto(target) => return Ok(Some(BlockExit::Goto(*target))),
            Operation::Jsr(_) => return Ok(Some(BlockExit::Fall(insn.next_offset()))),
            Operation::Ret(_) => return Ok(Some(BlockExit::Ret)),
            Operation::TableSwitch {
                default,
                low,
                targets,
                ..
            } => {
                let key = self.pop(insn)?;
                let cases = targets
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (low.wrapping_add(i as i32), *t))
                    .collect();
                return Ok(Some(BlockExit::Switch {
                    key,
                    default: *default,
                    cases,
                }));
            }
            Operation::LookupSwitch { default, pairs } => {
                let key = self.pop(insn)?;
                return Ok(Some(BlockExit::Switch {
                    key,
                    default: *default,
                    cases: pairs.clone(),
                }));
            }
            Operation::Return(kind) => {
                let value = match kind {
                    None => None,
                    Some(_) => {
                        let v = self.pop(insn)?;
                        Some(retype_literal(v, &self.ctx.return_type))
                    }
                };
                self.emit(Stmt::Return(value), insn);
                return Ok(Some(BlockExit::Return));
            }

            Operation::GetStatic(i) | Operation::GetField(i) => {
                let m = pool.member_ref(*i)?;
                let ty = self.field_type(m.descriptor, insn)?;
                let (owner, name) = (m.class_name.to_string(), m.name.to_string());
                let object = if matches!(insn.op, Operation::GetField(_)) {
                    Some(Box::new(self.pop(insn)?))
                } else {
                    None
                };
                self.push(Expr::FieldGet {
                    owner,
                    name,
                    ty,
                    object,
                });
            }
            Operation::PutStatic(i) | Operation::PutField(i) => {
                let m = pool.member_ref(*i)?;
                let ty = self.field_type(m.descriptor, insn)?;
                let (owner, name) = (m.class_name.to_string(), m.name.to_string());
                let value = retype_literal(self.pop(insn)?, &ty);
                let object = if matches!(insn.op, Operation::PutField(_)) {
                    Some(self.pop(insn)?)
                } else {
                    None
                };
                self.emit(
                    Stmt::FieldStore {
                        owner,
                        name,
                        ty,
                        object,
                        value,
                    },
                    insn,
                );
            }

            Operation::InvokeVirtual(i) => self.invoke(InvokeKind::Virtual, *i, insn)?,
            Operation::InvokeSpecial(i) => self.invoke(InvokeKind::Special, *i, insn)?,
            Operation::InvokeStatic(i) => self.invoke(InvokeKind::Static, *i, insn)?,
            Operation::InvokeInterface { index, .. } => {
                self.invoke(InvokeKind::Interface, *index, insn)?
            }
            Operation::InvokeDynamic(i) => {
                let (bootstrap, name, descriptor) = pool.invoke_dynamic(*i)?;
                let (params, ret) = self.method_type(descriptor, insn)?;
                let args = self.pop_args(&params, insn)?;
                let call = Expr::InvokeDynamic {
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    bootstrap,
                    args,
                };
                if ret == JvmType::Void {
                    self.emit(Stmt::ExprStmt(call), insn);
                } else {
                    self.push(call);
                }
            }

            Operation::New(i) => {
                let class = pool.class_name(*i)?.to_string();
                self.push(Expr::UninitNew {
                    class,
                    alloc: insn.offset,
                });
            }
            Operation::NewArray(atype) => {
                let count = self.pop(insn)?;
                self.push(Expr::NewArray {
                    ty: JvmType::Array(Box::new(newarray_type(*atype))),
                    dims: vec![count],
                });
            }
            Operation::ANewArray(i) => {
                let count = self.pop(insn)?;
                let element = parse_class_operand(pool.class_name(*i)?);
                self.push(Expr::NewArray {
                    ty: JvmType::Array(Box::new(element)),
                    dims: vec![count],
                });
            }
            Operation::MultiANewArray { index, dimensions } => {
                let dims = self.pop_n(*dimensions as usize, insn)?;
                let ty = parse_class_operand(pool.class_name(*index)?);
                self.push(Expr::NewArray { ty, dims });
            }
            Operation::ArrayLength => {
                let v = self.pop(insn)?;
                self.push(Expr::ArrayLength(Box::new(v)));
            }
            Operation::AThrow => {
                let v = self.pop(insn)?;
                self.emit(Stmt::Throw(v), insn);
                return Ok(Some(BlockExit::Throw));
            }
            Operation::CheckCast(i) => {
                let v = self.pop(insn)?;
                let ty = parse_class_operand(pool.class_name(*i)?);
                self.push(Expr::Cast {
                    ty,
                    expr: Box::new(v),
                });
            }
            Operation::InstanceOf(i) => {
                let v = self.pop(insn)?;
                let ty = parse_class_operand(pool.class_name(*i)?);
                self.push(Expr::InstanceOf {
                    expr: Box::new(v),
                    ty,
                });
            }
            Operation::MonitorEnter => {
                let v = self.pop(insn)?;
                self.emit(Stmt::MonitorEnter(v), insn);
            }
            Operation::MonitorExit => {
                let v = self.pop(insn)?;
                self.emit(Stmt::MonitorExit(v), insn);
            }
        }
        Ok(None)
    }

    fn cond(&mut self, cond: Expr, target: u32, insn: &Instruction) -> BlockExit {
        BlockExit::Cond {
            cond,
            taken: target,
            fall: insn.next_offset(),
        }
    }

    /// Drop a popped value, keeping it as a statement if evaluating it matters.
    fn discard(&mut self, v: Expr, insn: &Instruction) {
        if v.has_side_effects() {
            self.emit(Stmt::ExprStmt(v), insn);
        }
    }

    fn field_type(&self, descriptor: &str, insn: &Instruction) -> DecompileResult<JvmType> {
        parse_type_descriptor(descriptor).ok_or_else(|| DecompileError::BadDescriptor {
            offset: insn.offset,
            descriptor: descriptor.to_string(),
        })
    }

    fn method_type(
        &self,
        descriptor: &str,
        insn: &Instruction,
    ) -> DecompileResult<(Vec<JvmType>, JvmType)> {
        parse_method_descriptor(descriptor).ok_or_else(|| DecompileError::BadDescriptor {
            offset: insn.offset,
            descriptor: descriptor.to_string(),
        })
    }

    fn pop_args(&mut self, params: &[JvmType], insn: &Instruction) -> DecompileResult<Vec<Expr>> {
        let args = self.pop_n(params.len(), insn)?;
        Ok(args
            .into_iter()
            .zip(params)
            .map(|(a, ty)| retype_literal(a, ty))
            .collect())
    }

    /// On an overloaded call, `null` and reference arguments whose static
    /// type is not assignable to the parameter are cast to the parameter type.
    fn cast_overload_args(&self, args: &mut [Expr], params: &[JvmType]) {
        for (arg, ty) in args.iter_mut().zip(params) {
            let needs_cast = match (arg.ty(), ty) {
                (JvmType::Null, _) => true,
                (JvmType::Reference(from), JvmType::Reference(to)) => {
                    !self.ctx.resolver.is_assignable(&from, to)
                }
                _ => false,
            };
            if needs_cast {
                let inner = std::mem::replace(arg, Expr::NullLiteral);
                *arg = Expr::Cast {
                    ty: ty.clone(),
                    expr: Box::new(inner),
                };
            }
        }
    }

    fn invoke(&mut self, kind: InvokeKind, index: u16, insn: &Instruction) -> DecompileResult<()> {
        let m = self.ctx.pool.member_ref(index)?;
        let (owner, name, descriptor) = (
            m.class_name.to_string(),
            m.name.to_string(),
            m.descriptor.to_string(),
        );
        let (params, ret) = self.method_type(&descriptor, insn)?;
        let mut args = self.pop_args(&params, insn)?;

        if args.iter().any(|a| matches!(a.ty(), JvmType::Reference(_) | JvmType::Null))
            && self.ctx.resolver.overloads(&owner, &name, params.len()) > 1
        {
            self.cast_overload_args(&mut args, &params);
        }

        let receiver = if kind == InvokeKind::Static {
            None
        } else {
            Some(self.pop(insn)?)
        };

        if name == "<init>" {
            if let Some(Expr::UninitNew { class, alloc }) = &receiver {
                let created = Expr::New {
                    class: class.clone(),
                    descriptor,
                    args,
                };
                let alloc = *alloc;
                let mut replaced = false;
                for slot in self.stack.iter_mut() {
                    if matches!(slot, Expr::UninitNew { alloc: a, .. } if *a == alloc) {
                        *slot = created.clone();
                        replaced = true;
                    }
                }
                if !replaced {
                    self.emit(Stmt::ExprStmt(created), insn);
                }
                return Ok(());
            }
        }

        let call = Expr::MethodCall {
            kind,
            owner,
            name,
            descriptor,
            receiver: receiver.map(Box::new),
            args,
        };
        if ret == JvmType::Void {
            self.emit(Stmt::ExprStmt(call), insn);
        } else {
            self.push(call);
        }
        Ok(())
    }
}

/// Condition for `if<op>` against zero.
fn zero_test(op: CmpOp, v: Expr) -> Expr {
    match v {
        Expr::CmpResult { left, right } => Expr::Compare { op, left, right },
        v if v.is_boolean() && matches!(op, CmpOp::Eq | CmpOp::Ne) => {
            if op == CmpOp::Ne {
                v
            } else {
                negate_expr(v)
            }
        }
        v => {
            let zero = retype_literal(Expr::IntLiteral(0), &v.ty());
            Expr::compare(op, v, zero)
        }
    }
}

/// Element type of an array access, refined by the array's static type.
fn element_type(array: &Expr, kind: ArrayKind) -> JvmType {
    match (array.ty(), kind) {
        (JvmType::Array(inner), _) => *inner,
        (_, kind) => JvmType::from_array_kind(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_info::CodeAttribute;
    use crate::code_attribute::decode_all;
    use crate::constant_info::*;
    use crate::decompile::cfg::build_cfg;
    use crate::source::EmptySource;

    fn pool() -> ConstantPool {
        ConstantPool::from_entries([
            ConstantInfo::Utf8(Utf8Constant::new("a/Foo")),
            ConstantInfo::Class(ClassConstant { name_index: 1 }),
            ConstantInfo::Utf8(Utf8Constant::new("<init>")),
            ConstantInfo::Utf8(Utf8Constant::new("()V")),
            ConstantInfo::NameAndType(NameAndTypeConstant {
                name_index: 3,
                descriptor_index: 4,
            }),
            ConstantInfo::MethodRef(MethodRefConstant {
                class_index: 2,
                name_and_type_index: 5,
            }),
            ConstantInfo::Utf8(Utf8Constant::new("next")),
            ConstantInfo::Utf8(Utf8Constant::new("()I")),
            ConstantInfo::NameAndType(NameAndTypeConstant {
                name_index: 7,
                descriptor_index: 8,
            }),
            ConstantInfo::MethodRef(MethodRefConstant {
                class_index: 2,
                name_and_type_index: 9,
            }),
        ])
    }

    fn code_attr(code: &[u8]) -> CodeAttribute {
        CodeAttribute {
            max_stack: 4,
            max_locals: 4,
            code_length: code.len() as u32,
            code: code.to_vec(),
            exception_table_length: 0,
            exception_table: Vec::new(),
            attributes_count: 0,
            attributes: Vec::new(),
        }
    }

    fn run(code: &[u8], is_static: bool, ret: JvmType) -> DecompileResult<BTreeMap<BlockId, SimulatedBlock>> {
        let pool = pool();
        let attr = code_attr(code);
        let source = EmptySource;
        let resolver = TypeResolver::new(&source);
        let ctx = MethodContext {
            pool: &pool,
            code: &attr,
            resolver: &resolver,
            locals: LocalNames::default(),
            is_static,
            return_type: ret,
        };
        let insns = decode_all(code).unwrap();
        let cfg = build_cfg(&insns, Vec::new(), &BTreeSet::new());
        simulate(&cfg, &ctx)
    }

    fn stmts(block: &SimulatedBlock) -> Vec<Stmt> {
        block.statements.iter().map(|s| s.stmt.clone()).collect()
    }

    #[test]
    fn test_arithmetic_return() {
        // iload_0 iload_1 iadd ireturn
        let blocks = run(&[0x1a, 0x1b, 0x60, 0xac], true, JvmType::Int).unwrap();
        let b = &blocks[&0];
        match &stmts(b)[..] {
            [Stmt::Return(Some(Expr::BinaryOp { left, right, .. }))] => {
                assert!(matches!(**left, Expr::Local(ref v) if v.index == 0));
                assert!(matches!(**right, Expr::Local(ref v) if v.index == 1));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(b.statements[0].start_pc, 0);
        assert_eq!(b.statements[0].end_pc, 4);
    }

    #[test]
    fn test_new_dup_init_collapses() {
        // new #2; dup; invokespecial #6; areturn
        let code = [0xbb, 0x00, 0x02, 0x59, 0xb7, 0x00, 0x06, 0xb0];
        let blocks = run(&code, true, JvmType::Reference("a/Foo".into())).unwrap();
        assert_eq!(
            stmts(&blocks[&0]),
            vec![Stmt::Return(Some(Expr::New {
                class: "a/Foo".into(),
                descriptor: "()V".into(),
                args: vec![],
            }))]
        );
    }

    #[test]
    fn test_duplicated_call_gets_temporary() {
        // invokestatic next; dup; istore_0; istore_1; return
        let code = [0xb8, 0x00, 0x0a, 0x59, 0x3b, 0x3c, 0xb1];
        let blocks = run(&code, true, JvmType::Void).unwrap();
        let s = stmts(&blocks[&0]);
        // The store right after the dup takes the value; the second store reads it.
        assert!(matches!(&s[0], Stmt::LocalStore { var, value: Expr::MethodCall { .. } } if var.index == 0));
        assert!(matches!(&s[1], Stmt::LocalStore { var, value: Expr::Local(v) } if var.index == 1 && v.index == 0));
    }

    #[test]
    fn test_boolean_and_compare_conditions() {
        // iload_0 ifeq +4 ... with a boolean-typed local
        let code = [0x1a, 0x99, 0x00, 0x04, 0xb1, 0xb1];
        let pool = pool();
        let attr = code_attr(&code);
        let source = EmptySource;
        let resolver = TypeResolver::new(&source);
        let ctx = MethodContext {
            pool: &pool,
            code: &attr,
            resolver: &resolver,
            locals: LocalNames::default().with_parameter(0, "flag".into(), JvmType::Boolean),
            is_static: true,
            return_type: JvmType::Void,
        };
        let insns = decode_all(&code).unwrap();
        let cfg = build_cfg(&insns, Vec::new(), &BTreeSet::new());
        let blocks = simulate(&cfg, &ctx).unwrap();
        match &blocks[&0].exit {
            BlockExit::Cond { cond: Expr::Not(inner), taken: 5, fall: 4 } => {
                assert!(matches!(**inner, Expr::Local(ref v) if v.name.as_deref() == Some("flag")));
            }
            other => panic!("unexpected {:?}", other),
        }

        // iload_0 iload_1 if_icmpge
        let blocks = run(&[0x1a, 0x1b, 0xa2, 0x00, 0x04, 0xb1, 0xb1], true, JvmType::Void).unwrap();
        assert!(matches!(
            &blocks[&0].exit,
            BlockExit::Cond { cond: Expr::Compare { op: CmpOp::Ge, .. }, .. }
        ));
    }

    #[test]
    fn test_merge_spills_differing_values() {
        // iload_0 ifeq 9; iconst_1; goto 10; 9: iconst_2; 10: ireturn
        let code = [0x1a, 0x99, 0x00, 0x08, 0x04, 0xa7, 0x00, 0x05, 0x00, 0x05, 0xac];
        let blocks = run(&code, true, JvmType::Int).unwrap();
        let ret = &blocks[&10];
        assert!(matches!(
            &stmts(ret)[..],
            [Stmt::Return(Some(Expr::Local(v)))] if v.origin == VarOrigin::Stack
        ));
        assert!(matches!(
            stmts(&blocks[&4]).last(),
            Some(Stmt::LocalStore { var, value: Expr::IntLiteral(1) }) if var.origin == VarOrigin::Stack
        ));
    }

    #[test]
    fn test_underflow_is_an_error() {
        // iadd with an empty stack
        let err = run(&[0x60, 0xb1], true, JvmType::Void).unwrap_err();
        assert!(matches!(err, DecompileError::StackUnderflow { offset: 0 }));
    }

    #[test]
    fn test_increment_spills_pending_read() {
        // iload_0 iinc 0 1 ireturn  (return i++)
        let blocks = run(&[0x1a, 0x84, 0x00, 0x01, 0xac], true, JvmType::Int).unwrap();
        let s = stmts(&blocks[&0]);
        assert!(matches!(&s[0], Stmt::LocalStore { var, .. } if var.origin == VarOrigin::Temp));
        assert!(matches!(&s[1], Stmt::Iinc { amount: 1, .. }));
        assert!(matches!(&s[2], Stmt::Return(Some(Expr::Local(v))) if v.origin == VarOrigin::Temp));
    }
}
