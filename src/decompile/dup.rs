//! Arena for values duplicated by `dup` and its variants.
//!
//! The simulator binds a duplicated value once, emits a
//! [`Stmt::DupStore`] at the binding point and pushes [`Expr::DupLoad`]
//! placeholders. Once every block of the method has been simulated,
//! [`DupArena::resolve`] rewrites each binding in place: a value read once in
//! the same block is inlined, a value immediately stored to a local is bound
//! to that local, and anything else becomes a shared temporary.

use std::collections::BTreeMap;

use super::cfg_types::BlockId;
use super::expr::{DupId, Expr, LocalVar, Statement, Stmt, VarOrigin};
use super::stack_sim::SimulatedBlock;

#[derive(Clone, Debug, Default)]
pub struct DupArena {
    values: Vec<Expr>,
}

/// How a binding was resolved.
#[derive(Clone, Debug, PartialEq)]
enum Resolution {
    Inline(Expr),
    Var(LocalVar),
}

impl DupArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, value: Expr) -> DupId {
        self.values.push(value);
        (self.values.len() - 1) as DupId
    }

    pub fn get(&self, id: DupId) -> Option<&Expr> {
        self.values.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rewrite every DupStore/DupLoad in `blocks`. `next_temp` numbers the
    /// temporaries created for values used more than once.
    pub fn resolve(&self, blocks: &mut BTreeMap<BlockId, SimulatedBlock>, next_temp: &mut u16) {
        if self.values.is_empty() {
            return;
        }
        let uses = self.count_uses(blocks);
        let mut resolved: BTreeMap<DupId, Resolution> = BTreeMap::new();

        for (&block_id, block) in blocks.iter_mut() {
            let mut out: Vec<Statement> = Vec::with_capacity(block.statements.len());
            let mut pending = std::mem::take(&mut block.statements).into_iter().peekable();
            while let Some(stmt) = pending.next() {
                let id = match stmt.stmt {
                    Stmt::DupStore(id) => id,
                    _ => {
                        out.push(stmt);
                        continue;
                    }
                };
                let value = match self.get(id) {
                    Some(v) => v.clone(),
                    None => continue,
                };
                let (total, in_block) = uses
                    .get(&id)
                    .map(|per_block| {
                        (
                            per_block.values().sum::<usize>(),
                            per_block.get(&block_id).copied().unwrap_or(0),
                        )
                    })
                    .unwrap_or((0, 0));

                // `dup; istore n`: the value belongs to the local.
                let stored_to = match pending.peek().map(|s| &s.stmt) {
                    Some(Stmt::LocalStore {
                        var,
                        value: Expr::DupLoad(next),
                    }) if *next == id && var.origin == VarOrigin::Slot => Some(var.clone()),
                    _ => None,
                };
                if let Some(var) = stored_to {
                    if let Some(store) = pending.next() {
                        out.push(store.with_stmt(Stmt::LocalStore {
                            var: var.clone(),
                            value,
                        }));
                    }
                    resolved.insert(id, Resolution::Var(var));
                    continue;
                }

                if total == 0 {
                    if value.has_side_effects() {
                        out.push(stmt.with_stmt(Stmt::ExprStmt(value)));
                    }
                } else if total == 1 && in_block == 1 {
                    resolved.insert(id, Resolution::Inline(value));
                } else {
                    let var = LocalVar::temp(*next_temp, value.ty());
                    *next_temp += 1;
                    out.push(stmt.with_stmt(Stmt::LocalStore {
                        var: var.clone(),
                        value,
                    }));
                    resolved.insert(id, Resolution::Var(var));
                }
            }
            block.statements = out;
        }

        for block in blocks.values_mut() {
            block.rewrite_exprs(&mut |e| substitute(e, &resolved));
        }
    }

    /// Reads of every binding, per block.
    fn count_uses(
        &self,
        blocks: &BTreeMap<BlockId, SimulatedBlock>,
    ) -> BTreeMap<DupId, BTreeMap<BlockId, usize>> {
        let mut uses: BTreeMap<DupId, BTreeMap<BlockId, usize>> = BTreeMap::new();
        for (&block_id, block) in blocks {
            let mut count = |e: &Expr| {
                if let Expr::DupLoad(id) = e {
                    *uses.entry(*id).or_default().entry(block_id).or_default() += 1;
                }
            };
            block.visit_exprs(&mut count);
        }
        // A binding's own value may read other bindings.
        for value in &self.values {
            value.visit(&mut |e| {
                if let Expr::DupLoad(id) = e {
                    *uses.entry(*id).or_default().entry(BlockId::MAX).or_default() += 1;
                }
            });
        }
        uses
    }
}

fn substitute(expr: Expr, resolved: &BTreeMap<DupId, Resolution>) -> Expr {
    match expr {
        Expr::DupLoad(id) => match resolved.get(&id) {
            // Inlined values may themselves hold placeholders.
            Some(Resolution::Inline(value)) => value.clone().rewrite(&mut |e| substitute(e, resolved)),
            Some(Resolution::Var(var)) => Expr::Local(var.clone()),
            None => Expr::DupLoad(id),
        },
        other => other,
    }
}
