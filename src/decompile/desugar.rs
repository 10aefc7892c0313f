use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};

use crate::code_attribute::CmpOp;

use super::descriptor::{parse_method_descriptor, JvmType};
use super::expr::*;
use super::resolver::TypeResolver;
use super::structured_types::*;

/// Options controlling which desugaring passes to apply.
#[derive(Clone, Debug)]
pub struct DesugarOptions {
    pub ternary: bool,
    pub for_loops: bool,
    pub foreach: bool,
    pub enum_switch: bool,
    pub string_switch: bool,
}

impl Default for DesugarOptions {
    fn default() -> Self {
        Self {
            ternary: true,
            for_loops: true,
            foreach: true,
            enum_switch: true,
            string_switch: true,
        }
    }
}

/// What the passes need to know about the method being rewritten.
pub struct DesugarContext<'a> {
    pub resolver: &'a TypeResolver<'a>,
    pub return_type: JvmType,
    /// Slots taken by `this` and the parameters; never redeclared.
    pub param_slots: u16,
}

type VarKey = (VarOrigin, u16, Option<String>);

fn key(var: &LocalVar) -> VarKey {
    (var.origin, var.index, var.name.clone())
}

/// Run all enabled desugaring passes on a structured body.
pub fn desugar(body: &mut MethodBody, ctx: &DesugarContext<'_>, options: &DesugarOptions) {
    let stmts = &mut body.statements;

    if options.ternary {
        each_list(stmts, &mut collapse_ternaries);
        let counts = VarCounts::of(stmts);
        each_list(stmts, &mut |list| inline_stack_vars(list, &counts));
    }
    retype_booleans(stmts, &ctx.return_type);

    let counts = VarCounts::of(stmts);
    each_list(stmts, &mut |list| collapse_return_temps(list, &counts));

    if options.foreach {
        let counts = VarCounts::of(stmts);
        each_list(stmts, &mut |list| recover_foreach(list, &counts));
    }
    if options.for_loops {
        each_list(stmts, &mut recover_for);
    }
    if options.enum_switch {
        let warnings = &mut body.warnings;
        each_list(stmts, &mut |list| recover_enum_switch(list, ctx.resolver, warnings));
    }
    if options.string_switch {
        let counts = VarCounts::of(stmts);
        each_list(stmts, &mut |list| recover_string_switch(list, &counts));
    }

    insert_declarations(stmts, &BTreeSet::new(), ctx.param_slots);

    if ctx.return_type == JvmType::Void
        && matches!(stmts.last().and_then(|s| s.as_stmt()), Some(Stmt::Return(None)))
    {
        stmts.pop();
    }
}

/// Apply `f` to every statement list, innermost lists first.
fn each_list(stmts: &mut Vec<StructuredStmt>, f: &mut impl FnMut(&mut Vec<StructuredStmt>)) {
    for stmt in stmts.iter_mut() {
        for child in stmt.child_blocks_mut() {
            each_list(child, f);
        }
    }
    f(stmts);
}

/// Expressions evaluated by the node itself. A `For` contributes only its
/// condition; its init and update are nodes of their own, as is the body
/// of a `Labeled`.
fn own_exprs(stmt: &StructuredStmt, f: &mut impl FnMut(&Expr)) {
    match stmt {
        StructuredStmt::For { condition, .. } => condition.visit(f),
        StructuredStmt::Labeled { .. } => {}
        other => other.visit_own_exprs(f),
    }
}

fn take_rewrite(e: &mut Expr, f: &mut impl FnMut(Expr) -> Expr) {
    let old = std::mem::replace(e, Expr::NullLiteral);
    *e = old.rewrite(f);
}

fn rewrite_stmt(s: &mut Statement, f: &mut impl FnMut(Expr) -> Expr) {
    let old = std::mem::replace(&mut s.stmt, Stmt::Return(None));
    s.stmt = old.rewrite_exprs(f);
}

/// Rewrite the expressions owned by the node itself.
fn rewrite_own_exprs(stmt: &mut StructuredStmt, f: &mut impl FnMut(Expr) -> Expr) {
    match stmt {
        StructuredStmt::Simple(s) => rewrite_stmt(s, f),
        StructuredStmt::Declare { init: Some(e), .. } => take_rewrite(e, f),
        StructuredStmt::If { condition, .. }
        | StructuredStmt::While { condition, .. }
        | StructuredStmt::DoWhile { condition, .. } => take_rewrite(condition, f),
        StructuredStmt::For {
            init,
            condition,
            update,
            ..
        } => {
            if let Some(i) = init {
                rewrite_own_exprs(i, f);
            }
            take_rewrite(condition, f);
            if let Some(u) = update {
                rewrite_own_exprs(u, f);
            }
        }
        StructuredStmt::ForEach { iterable, .. } => take_rewrite(iterable, f),
        StructuredStmt::Switch { expr, .. } => take_rewrite(expr, f),
        StructuredStmt::Synchronized { lock, .. } => take_rewrite(lock, f),
        StructuredStmt::Labeled { body, .. } => rewrite_own_exprs(body, f),
        _ => {}
    }
}

/// Method-wide read and write counts per variable.
#[derive(Debug, Default)]
struct VarCounts {
    reads: HashMap<VarKey, usize>,
    writes: HashMap<VarKey, usize>,
}

impl VarCounts {
    fn of(stmts: &[StructuredStmt]) -> Self {
        let mut counts = Self::default();
        for stmt in stmts {
            stmt.walk(&mut |node| counts.record(node));
        }
        counts
    }

    fn record(&mut self, node: &StructuredStmt) {
        let reads = &mut self.reads;
        own_exprs(node, &mut |e| {
            if let Expr::Local(v) = e {
                *reads.entry(key(v)).or_default() += 1;
            }
        });
        let mut written: Vec<&LocalVar> = Vec::new();
        match node {
            StructuredStmt::Simple(s) => written.extend(s.stmt.written_var()),
            StructuredStmt::Declare { var, init: Some(_), .. }
            | StructuredStmt::ForEach { var, .. } => written.push(var),
            StructuredStmt::Try { catches, .. } => written.extend(catches.iter().map(|c| &c.var)),
            _ => {}
        }
        for v in written {
            *self.writes.entry(key(v)).or_default() += 1;
        }
    }

    fn reads(&self, var: &LocalVar) -> usize {
        self.reads.get(&key(var)).copied().unwrap_or(0)
    }

    fn writes(&self, var: &LocalVar) -> usize {
        self.writes.get(&key(var)).copied().unwrap_or(0)
    }
}

fn own_reads(stmt: &StructuredStmt, var: &LocalVar) -> usize {
    let mut count = 0;
    own_exprs(stmt, &mut |e| {
        if let Expr::Local(v) = e {
            if v.same(var) {
                count += 1;
            }
        }
    });
    count
}

fn as_store(stmt: &StructuredStmt) -> Option<(&LocalVar, &Expr)> {
    match stmt.as_stmt() {
        Some(Stmt::LocalStore { var, value }) => Some((var, value)),
        _ => None,
    }
}

fn simple_like(template: &StructuredStmt, stmt: Stmt) -> StructuredStmt {
    match template {
        StructuredStmt::Simple(s) => StructuredStmt::Simple(s.with_stmt(stmt)),
        _ => StructuredStmt::simple(stmt),
    }
}

// ---------------------------------------------------------------------------
// Ternaries and stack variables
// ---------------------------------------------------------------------------

/// `if (c) { stackN = a; } else { stackN = b; }` becomes
/// `stackN = c ? a : b`.
fn collapse_ternaries(stmts: &mut Vec<StructuredStmt>) {
    for stmt in stmts.iter_mut() {
        if let Some(collapsed) = ternary_store(stmt) {
            *stmt = collapsed;
        }
    }
}

fn ternary_store(stmt: &StructuredStmt) -> Option<StructuredStmt> {
    let StructuredStmt::If {
        condition,
        then_body,
        else_body: Some(else_body),
    } = stmt
    else {
        return None;
    };
    let ([then_stmt], [else_stmt]) = (then_body.as_slice(), else_body.as_slice()) else {
        return None;
    };
    let (var, then_value) = as_store(then_stmt)?;
    let (other, else_value) = as_store(else_stmt)?;
    if var.origin != VarOrigin::Stack || !var.same(other) {
        return None;
    }
    let value = Expr::Ternary {
        cond: Box::new(condition.clone()),
        then: Box::new(then_value.clone()),
        otherwise: Box::new(else_value.clone()),
    };
    Some(simple_like(
        then_stmt,
        Stmt::LocalStore {
            var: var.clone(),
            value,
        },
    ))
}

/// A stack variable written once and read once by the very next statement
/// is folded into that statement.
fn inline_stack_vars(stmts: &mut Vec<StructuredStmt>, counts: &VarCounts) {
    let mut i = 0;
    while i + 1 < stmts.len() {
        let candidate = match as_store(&stmts[i]) {
            Some((var, value))
                if var.origin == VarOrigin::Stack
                    && counts.reads(var) == 1
                    && counts.writes(var) == 1
                    && own_reads(&stmts[i + 1], var) == 1
                    && evaluated_once(&stmts[i + 1]) =>
            {
                Some((var.clone(), value.clone()))
            }
            _ => None,
        };
        match candidate {
            Some((var, value)) => {
                rewrite_own_exprs(&mut stmts[i + 1], &mut |e| match e {
                    Expr::Local(ref v) if v.same(&var) => value.clone(),
                    other => other,
                });
                stmts.remove(i);
            }
            None => i += 1,
        }
    }
}

/// Nodes whose own expressions run exactly once when reached.
fn evaluated_once(stmt: &StructuredStmt) -> bool {
    matches!(
        stmt,
        StructuredStmt::Simple(_)
            | StructuredStmt::Declare { .. }
            | StructuredStmt::If { .. }
            | StructuredStmt::Switch { .. }
            | StructuredStmt::Synchronized { .. }
            | StructuredStmt::ForEach { .. }
    )
}

fn is_boolean_valued(e: &Expr) -> bool {
    match e {
        Expr::IntLiteral(0 | 1) | Expr::BoolLiteral(_) => true,
        Expr::Ternary {
            then, otherwise, ..
        } => is_boolean_valued(then) && is_boolean_valued(otherwise),
        _ => false,
    }
}

/// Rewrite an int-valued expression used as a boolean: `c ? 1 : 0` is `c`.
fn to_boolean(e: Expr) -> Expr {
    match e {
        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => match (*then, *otherwise) {
            (Expr::IntLiteral(1) | Expr::BoolLiteral(true), Expr::IntLiteral(0) | Expr::BoolLiteral(false)) => *cond,
            (Expr::IntLiteral(0) | Expr::BoolLiteral(false), Expr::IntLiteral(1) | Expr::BoolLiteral(true)) => {
                negate_expr(*cond)
            }
            (then, otherwise) => Expr::Ternary {
                cond,
                then: Box::new(to_boolean(then)),
                otherwise: Box::new(to_boolean(otherwise)),
            },
        },
        other => retype_literal(other, &JvmType::Boolean),
    }
}

/// Boolean contexts: stores to boolean locals and fields, boolean returns,
/// boolean parameters, and zero tests of boolean-valued ternaries.
fn retype_booleans(stmts: &mut Vec<StructuredStmt>, return_type: &JvmType) {
    each_list(stmts, &mut |list| {
        for stmt in list.iter_mut() {
            if let StructuredStmt::Simple(s) = stmt {
                let old = std::mem::replace(&mut s.stmt, Stmt::Return(None));
                s.stmt = match old {
                    Stmt::LocalStore { var, value } if var.ty == JvmType::Boolean => Stmt::LocalStore {
                        var,
                        value: to_boolean(value),
                    },
                    Stmt::FieldStore {
                        owner,
                        name,
                        ty: JvmType::Boolean,
                        object,
                        value,
                    } => Stmt::FieldStore {
                        owner,
                        name,
                        ty: JvmType::Boolean,
                        object,
                        value: to_boolean(value),
                    },
                    Stmt::Return(Some(value)) if *return_type == JvmType::Boolean => {
                        Stmt::Return(Some(to_boolean(value)))
                    }
                    other => other,
                };
            }
            rewrite_own_exprs(stmt, &mut boolean_operands);
        }
    });
}

fn boolean_operands(e: Expr) -> Expr {
    match e {
        Expr::Compare {
            op: op @ (CmpOp::Eq | CmpOp::Ne),
            left,
            right,
        } if is_boolean_valued(&left)
            && matches!(*left, Expr::Ternary { .. })
            && *right == Expr::IntLiteral(0) =>
        {
            let b = to_boolean(*left);
            if op == CmpOp::Ne {
                b
            } else {
                negate_expr(b)
            }
        }
        Expr::MethodCall {
            kind,
            owner,
            name,
            descriptor,
            receiver,
            args,
        } => {
            let args = boolean_args(&descriptor, args);
            Expr::MethodCall {
                kind,
                owner,
                name,
                descriptor,
                receiver,
                args,
            }
        }
        Expr::New {
            class,
            descriptor,
            args,
        } => {
            let args = boolean_args(&descriptor, args);
            Expr::New {
                class,
                descriptor,
                args,
            }
        }
        other => other,
    }
}

fn boolean_args(descriptor: &str, args: Vec<Expr>) -> Vec<Expr> {
    let params = match parse_method_descriptor(descriptor) {
        Some((params, _)) if params.len() == args.len() => params,
        _ => return args,
    };
    args.into_iter()
        .zip(&params)
        .map(|(a, p)| if *p == JvmType::Boolean { to_boolean(a) } else { a })
        .collect()
}

/// `t = e; return t;` becomes `return e;` for a compiler temporary, also
/// when the store closes a `try` block guarded only by a finally.
fn collapse_return_temps(stmts: &mut Vec<StructuredStmt>, counts: &VarCounts) {
    let mut i = 0;
    while i + 1 < stmts.len() {
        let returned = match stmts[i + 1].as_stmt() {
            Some(Stmt::Return(Some(Expr::Local(t)))) if is_temporary(t) && counts.reads(t) == 1 => {
                Some(t.clone())
            }
            _ => None,
        };
        let Some(t) = returned else {
            i += 1;
            continue;
        };

        let direct = match as_store(&stmts[i]) {
            Some((var, value)) if var.same(&t) => Some(value.clone()),
            _ => None,
        };
        if let Some(value) = direct {
            stmts[i] = simple_like(&stmts[i], Stmt::Return(Some(value)));
            stmts.remove(i + 1);
            continue;
        }

        if let StructuredStmt::Try {
            try_body, catches, ..
        } = &mut stmts[i]
        {
            let tail = match try_body.last().and_then(as_store) {
                Some((var, value)) if catches.is_empty() && var.same(&t) => Some(value.clone()),
                _ => None,
            };
            if let (Some(value), Some(last)) = (tail, try_body.last_mut()) {
                *last = simple_like(last, Stmt::Return(Some(value)));
                stmts.remove(i + 1);
                continue;
            }
        }
        i += 1;
    }
}

fn is_temporary(var: &LocalVar) -> bool {
    var.origin != VarOrigin::Slot || var.name.is_none()
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

fn unwrap_labeled(stmt: &StructuredStmt) -> (Option<&String>, &StructuredStmt) {
    match stmt {
        StructuredStmt::Labeled { label, body } => (Some(label), body),
        other => (None, other),
    }
}

fn rewrap(label: Option<String>, stmt: StructuredStmt) -> StructuredStmt {
    match label {
        Some(label) => StructuredStmt::Labeled {
            label,
            body: Box::new(stmt),
        },
        None => stmt,
    }
}

fn is_call_on(e: &Expr, method: &str, var: &LocalVar) -> bool {
    matches!(
        e,
        Expr::MethodCall { name, receiver: Some(r), args, .. }
            if name == method && args.is_empty() && matches!(&**r, Expr::Local(v) if v.same(var))
    )
}

fn recover_foreach(stmts: &mut Vec<StructuredStmt>, counts: &VarCounts) {
    let mut i = 0;
    while i < stmts.len() {
        if let Some(stmt) = iterator_foreach(stmts, i, counts) {
            stmts.splice(i..i + 2, [stmt]);
        } else if let Some(stmt) = array_foreach(stmts, i, counts) {
            stmts.splice(i..i + 4, [stmt]);
        }
        i += 1;
    }
}

/// `it = c.iterator(); while (it.hasNext()) { x = (T) it.next(); ... }`
fn iterator_foreach(stmts: &[StructuredStmt], i: usize, counts: &VarCounts) -> Option<StructuredStmt> {
    let (it, init) = as_store(stmts.get(i)?)?;
    let iterable = match init {
        Expr::MethodCall {
            name,
            receiver: Some(r),
            args,
            ..
        } if name == "iterator" && args.is_empty() => (**r).clone(),
        _ => return None,
    };
    let (label, looped) = unwrap_labeled(stmts.get(i + 1)?);
    let StructuredStmt::While { condition, body } = looped else {
        return None;
    };
    if !is_call_on(condition, "hasNext", it) || counts.reads(it) != 2 || counts.writes(it) != 1 {
        return None;
    }
    let (var, fetched) = as_store(body.first()?)?;
    let (next, ty) = match fetched {
        Expr::Cast { ty, expr } => (&**expr, ty.clone()),
        other => (other, var.ty.clone()),
    };
    if !is_call_on(next, "next", it) {
        return None;
    }
    let var = LocalVar {
        ty,
        ..var.clone()
    };
    Some(rewrap(
        label.cloned(),
        StructuredStmt::ForEach {
            var,
            iterable,
            body: body[1..].to_vec(),
        },
    ))
}

/// `a = e; n = a.length; k = 0; while (k < n) { x = a[k]; ...; k++; }`
fn array_foreach(stmts: &[StructuredStmt], i: usize, counts: &VarCounts) -> Option<StructuredStmt> {
    let (array, iterable) = as_store(stmts.get(i)?)?;
    let mut length = None;
    let mut index = None;
    for stmt in stmts.get(i + 1..i + 3)? {
        match as_store(stmt)? {
            (n, Expr::ArrayLength(a)) if matches!(&**a, Expr::Local(v) if v.same(array)) => {
                length = Some(n)
            }
            (k, Expr::IntLiteral(0)) => index = Some(k),
            _ => return None,
        }
    }
    let (length, index) = (length?, index?);

    let (label, looped) = unwrap_labeled(stmts.get(i + 3)?);
    let StructuredStmt::While { condition, body } = looped else {
        return None;
    };
    let bound_ok = matches!(
        condition,
        Expr::Compare { op: CmpOp::Lt, left, right }
            if matches!(&**left, Expr::Local(v) if v.same(index))
                && matches!(&**right, Expr::Local(v) if v.same(length))
    );
    if !bound_ok || body.len() < 2 {
        return None;
    }
    let (var, element) = as_store(body.first()?)?;
    let loads_element = matches!(
        element,
        Expr::ArrayLoad { array: a, index: k, .. }
            if matches!(&**a, Expr::Local(v) if v.same(array))
                && matches!(&**k, Expr::Local(v) if v.same(index))
    );
    let steps = matches!(
        body.last().and_then(|s| s.as_stmt()),
        Some(Stmt::Iinc { var, amount: 1 }) if var.same(index)
    );
    if !loads_element
        || !steps
        || counts.reads(array) != 2
        || counts.reads(length) != 1
        || counts.reads(index) != 2
        || counts.writes(index) != 2
    {
        return None;
    }
    Some(rewrap(
        label.cloned(),
        StructuredStmt::ForEach {
            var: var.clone(),
            iterable: iterable.clone(),
            body: body[1..body.len() - 1].to_vec(),
        },
    ))
}

/// `i = init; while (cond(i)) { ...; i++; }` becomes a `for` loop when the
/// update is the last statement of the body and nothing continues to it.
fn recover_for(stmts: &mut Vec<StructuredStmt>) {
    let mut i = 1;
    while i < stmts.len() {
        if let Some(stmt) = for_loop(&stmts[i - 1], &stmts[i]) {
            stmts.splice(i - 1..=i, [stmt]);
        } else {
            i += 1;
        }
    }
}

fn for_loop(init: &StructuredStmt, looped: &StructuredStmt) -> Option<StructuredStmt> {
    let (label, inner) = unwrap_labeled(looped);
    let StructuredStmt::While { condition, body } = inner else {
        return None;
    };
    if matches!(condition, Expr::BoolLiteral(true)) || continues_to_loop(body, label.map(|s| s.as_str()), false) {
        return None;
    }
    let update = body.last()?;
    let counter = match update.as_stmt()? {
        Stmt::Iinc { var, .. } => var,
        Stmt::LocalStore { var, value } if value.reads(var) => var,
        _ => return None,
    };
    let (init_var, _) = as_store(init)?;
    if !init_var.same(counter) || !condition.reads(counter) {
        return None;
    }
    Some(rewrap(
        label.cloned(),
        StructuredStmt::For {
            init: Some(Box::new(init.clone())),
            condition: condition.clone(),
            update: Some(Box::new(update.clone())),
            body: body[..body.len() - 1].to_vec(),
        },
    ))
}

/// Does anything in `stmts` continue the loop that owns it? Inside nested
/// loops only a labeled continue can.
fn continues_to_loop(stmts: &[StructuredStmt], label: Option<&str>, nested: bool) -> bool {
    stmts.iter().any(|stmt| match stmt {
        StructuredStmt::Continue { label: None } => !nested,
        StructuredStmt::Continue { label: Some(l) } => Some(l.as_str()) == label,
        StructuredStmt::While { .. }
        | StructuredStmt::DoWhile { .. }
        | StructuredStmt::For { .. }
        | StructuredStmt::ForEach { .. } => stmt
            .child_blocks()
            .iter()
            .any(|b| continues_to_loop(b, label, true)),
        StructuredStmt::Labeled { body, .. } => {
            continues_to_loop(std::slice::from_ref(&**body), label, nested)
        }
        other => other
            .child_blocks()
            .iter()
            .any(|b| continues_to_loop(b, label, nested)),
    })
}

// ---------------------------------------------------------------------------
// Switches
// ---------------------------------------------------------------------------

/// `switch (Holder.$SwitchMap$E[e.ordinal()])` over the compiler's ordinal
/// map becomes a switch over the enum constants.
fn recover_enum_switch(
    stmts: &mut [StructuredStmt],
    resolver: &TypeResolver<'_>,
    warnings: &mut Vec<String>,
) {
    for stmt in stmts.iter_mut() {
        let target = match stmt {
            StructuredStmt::Labeled { body, .. } => &mut **body,
            other => other,
        };
        let StructuredStmt::Switch {
            kind: kind @ SwitchKind::Int,
            expr,
            cases,
        } = target
        else {
            continue;
        };
        let Some((holder, member, enum_class, value)) = ordinal_lookup(expr) else {
            continue;
        };
        let Some(map) = resolver.switch_map(&holder, &member) else {
            let msg = format!("no ordinal map {}.{} for enum switch", holder, member);
            warn!("{}", msg);
            warnings.push(msg);
            continue;
        };
        for case in cases.iter_mut() {
            for v in case.values.iter_mut() {
                if let SwitchValue::Int(k) = v {
                    if let Some(name) = map.get(k) {
                        *v = SwitchValue::Enum(name.clone());
                    }
                }
            }
        }
        *kind = SwitchKind::Enum(enum_class);
        *expr = value;
        debug!("recovered enum switch over {}", holder);
    }
}

/// `(holder, member, enum class, switched value)` for an ordinal-map index.
fn ordinal_lookup(expr: &Expr) -> Option<(String, String, String, Expr)> {
    let Expr::ArrayLoad { array, index, .. } = expr else {
        return None;
    };
    let (enum_class, value) = match &**index {
        Expr::MethodCall {
            owner,
            name,
            receiver: Some(r),
            args,
            ..
        } if name == "ordinal" && args.is_empty() => (owner.clone(), (**r).clone()),
        _ => return None,
    };
    let (holder, member) = match &**array {
        Expr::FieldGet {
            owner,
            name,
            object: None,
            ..
        } if name.starts_with("$SwitchMap$") => (owner.clone(), name.clone()),
        Expr::MethodCall {
            kind: InvokeKind::Static,
            owner,
            name,
            args,
            ..
        } if name.starts_with("$SWITCH_TABLE$") && args.is_empty() => (owner.clone(), name.clone()),
        _ => return None,
    };
    Some((holder, member, enum_class, value))
}

/// javac lowers `switch (s)` into a `hashCode()` switch that sets an index
/// after an `equals` check, then a second switch over that index.
fn recover_string_switch(stmts: &mut Vec<StructuredStmt>, counts: &VarCounts) {
    let mut i = 2;
    while i + 1 < stmts.len() {
        match string_switch(stmts, i, counts) {
            Some(stmt) => {
                stmts.splice(i - 2..i + 2, [stmt]);
                i -= 1;
            }
            None => i += 1,
        }
    }
}

fn string_switch(stmts: &[StructuredStmt], i: usize, counts: &VarCounts) -> Option<StructuredStmt> {
    let StructuredStmt::Switch {
        kind: SwitchKind::Int,
        expr: hashed,
        cases: hash_cases,
    } = &stmts[i]
    else {
        return None;
    };
    let tmp = match hashed {
        Expr::MethodCall {
            name,
            receiver: Some(r),
            args,
            ..
        } if name == "hashCode" && args.is_empty() => match &**r {
            Expr::Local(v) => v,
            _ => return None,
        },
        _ => return None,
    };

    let mut subject = None;
    let mut index = None;
    for stmt in &stmts[i - 2..i] {
        match as_store(stmt)? {
            (v, e) if v.same(tmp) => subject = Some(e),
            (v, Expr::IntLiteral(-1)) => index = Some(v),
            _ => return None,
        }
    }
    let (subject, index) = (subject?, index?);

    let mut labels = BTreeMap::new();
    for case in hash_cases {
        if !string_cases(&case.body, tmp, index, &mut labels) {
            return None;
        }
    }
    if counts.reads(tmp) != labels.len() + 1 || counts.reads(index) != 1 {
        return None;
    }

    let (label, second) = unwrap_labeled(&stmts[i + 1]);
    let StructuredStmt::Switch {
        kind: SwitchKind::Int,
        expr: Expr::Local(switched),
        cases,
    } = second
    else {
        return None;
    };
    if !switched.same(index) {
        return None;
    }
    let cases = cases
        .iter()
        .map(|c| SwitchCase {
            values: c
                .values
                .iter()
                .map(|v| match v {
                    SwitchValue::Int(k) => labels
                        .get(k)
                        .map(|s: &String| SwitchValue::String(s.clone()))
                        .unwrap_or_else(|| v.clone()),
                    other => other.clone(),
                })
                .collect(),
            ..c.clone()
        })
        .collect();
    Some(rewrap(
        label.cloned(),
        StructuredStmt::Switch {
            kind: SwitchKind::String,
            expr: subject.clone(),
            cases,
        },
    ))
}

/// Collect `if (tmp.equals("s")) index = k;` chains from one hash case.
fn string_cases(
    stmts: &[StructuredStmt],
    tmp: &LocalVar,
    index: &LocalVar,
    labels: &mut BTreeMap<i32, String>,
) -> bool {
    stmts.iter().all(|stmt| match stmt {
        StructuredStmt::Break { label: None } => true,
        StructuredStmt::If {
            condition,
            then_body,
            else_body,
        } => {
            let literal = match condition {
                Expr::MethodCall {
                    name,
                    receiver: Some(r),
                    args,
                    ..
                } if name == "equals" && matches!(&**r, Expr::Local(v) if v.same(tmp)) => {
                    match args.as_slice() {
                        [Expr::StringLiteral(s)] => s,
                        _ => return false,
                    }
                }
                _ => return false,
            };
            let value = match then_body.iter().find_map(as_store) {
                Some((v, Expr::IntLiteral(k))) if v.same(index) => *k,
                _ => return false,
            };
            labels.insert(value, literal.clone());
            else_body
                .as_ref()
                .map(|e| string_cases(e, tmp, index, labels))
                .unwrap_or(true)
        }
        _ => false,
    })
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

fn is_param(var: &LocalVar, param_slots: u16) -> bool {
    var.origin == VarOrigin::Slot && var.index < param_slots
}

fn add_var(out: &mut BTreeMap<VarKey, LocalVar>, bound: &BTreeSet<VarKey>, var: &LocalVar) {
    let k = key(var);
    if !bound.contains(&k) {
        out.entry(k).or_insert_with(|| var.clone());
    }
}

/// Variables named by the node itself: reads in its own expressions, the
/// variable it writes, and the init/update of a `for`.
fn own_vars(stmt: &StructuredStmt, bound: &BTreeSet<VarKey>, out: &mut BTreeMap<VarKey, LocalVar>) {
    own_exprs(stmt, &mut |e| {
        if let Expr::Local(v) = e {
            add_var(out, bound, v);
        }
    });
    match stmt {
        StructuredStmt::Simple(s) => {
            if let Some(v) = s.stmt.written_var() {
                add_var(out, bound, v);
            }
        }
        StructuredStmt::Declare { var, .. } => add_var(out, bound, var),
        StructuredStmt::For { init, update, .. } => {
            for node in init.iter().chain(update.iter()) {
                own_vars(node, bound, out);
            }
        }
        StructuredStmt::Labeled { body, .. } => own_vars(body, bound, out),
        _ => {}
    }
}

/// Child statement lists paired with the variables they bind.
fn scopes(stmt: &StructuredStmt) -> Vec<(&Vec<StructuredStmt>, Option<&LocalVar>)> {
    match stmt {
        StructuredStmt::Try {
            try_body,
            catches,
            finally_body,
            ..
        } => {
            let mut v = vec![(try_body, None)];
            v.extend(catches.iter().map(|c| (&c.body, Some(&c.var))));
            v.extend(finally_body.iter().map(|f| (f, None)));
            v
        }
        StructuredStmt::ForEach { var, body, .. } => vec![(body, Some(var))],
        StructuredStmt::For { init, body, .. } => {
            let bound = match init.as_deref() {
                Some(StructuredStmt::Declare { var, .. }) => Some(var),
                _ => None,
            };
            vec![(body, bound)]
        }
        StructuredStmt::Labeled { body, .. } => scopes(body),
        other => other.child_blocks().into_iter().map(|b| (b, None)).collect(),
    }
}

fn all_vars(stmt: &StructuredStmt, bound: &BTreeSet<VarKey>, out: &mut BTreeMap<VarKey, LocalVar>) {
    own_vars(stmt, bound, out);
    for (list, binds) in scopes(stmt) {
        let mut inner = bound.clone();
        inner.extend(binds.map(key));
        for s in list {
            all_vars(s, &inner, out);
        }
    }
}

/// The variable is only used inside exactly one nested list of `stmt`, so
/// it is declared there instead.
fn defers_to_child(stmt: &StructuredStmt, k: &VarKey) -> bool {
    let none = BTreeSet::new();
    let mut own = BTreeMap::new();
    own_vars(stmt, &none, &mut own);
    if own.contains_key(k) {
        return false;
    }
    let using = scopes(stmt)
        .into_iter()
        .filter(|(list, binds)| {
            let mut bound = BTreeSet::new();
            bound.extend(binds.map(key));
            let mut vars = BTreeMap::new();
            for s in list.iter() {
                all_vars(s, &bound, &mut vars);
            }
            vars.contains_key(k)
        })
        .count();
    using == 1
}

fn can_declare_in_place(stmt: &StructuredStmt, k: &VarKey) -> bool {
    match stmt {
        StructuredStmt::For { init: Some(init), .. } => can_declare_in_place(init, k),
        StructuredStmt::Labeled { body, .. } => can_declare_in_place(body, k),
        other => matches!(as_store(other), Some((var, _)) if key(var) == *k),
    }
}

fn declare_in_place(stmt: &mut StructuredStmt) {
    match stmt {
        StructuredStmt::For { init: Some(init), .. } => declare_in_place(init),
        StructuredStmt::Labeled { body, .. } => declare_in_place(body),
        StructuredStmt::Simple(Statement {
            stmt: Stmt::LocalStore { var, value },
            line,
            ..
        }) => {
            *stmt = StructuredStmt::Declare {
                var: var.clone(),
                init: Some(value.clone()),
                line: *line,
            };
        }
        _ => {}
    }
}

/// Insert a `Declare` for every local in the innermost list that encloses
/// all of its uses, at its first assignment when that is a plain store.
fn insert_declarations(stmts: &mut Vec<StructuredStmt>, declared: &BTreeSet<VarKey>, param_slots: u16) {
    let mut uses: BTreeMap<VarKey, (LocalVar, Vec<usize>)> = BTreeMap::new();
    for (i, stmt) in stmts.iter().enumerate() {
        let mut vars = BTreeMap::new();
        all_vars(stmt, declared, &mut vars);
        for (k, v) in vars {
            if is_param(&v, param_slots) {
                continue;
            }
            uses.entry(k).or_insert_with(|| (v, Vec::new())).1.push(i);
        }
    }

    let mut here: Vec<(usize, bool, VarKey, LocalVar)> = Vec::new();
    for (k, (v, idxs)) in uses {
        let first = idxs[0];
        if idxs.len() == 1 && defers_to_child(&stmts[first], &k) {
            continue;
        }
        let in_place = can_declare_in_place(&stmts[first], &k);
        here.push((first, in_place, k, v));
    }

    let mut inner = declared.clone();
    inner.extend(here.iter().map(|(_, _, k, _)| k.clone()));

    // In-place declarations first at each index so insertions do not shift
    // the store they would replace.
    here.sort_by_key(|(i, in_place, _, _)| (Reverse(*i), !*in_place));
    for (i, in_place, _, var) in here {
        if in_place {
            declare_in_place(&mut stmts[i]);
        } else {
            stmts.insert(
                i,
                StructuredStmt::Declare {
                    var,
                    init: None,
                    line: None,
                },
            );
        }
    }

    for stmt in stmts.iter_mut() {
        declare_children(stmt, &inner, param_slots);
    }
}

fn declare_children(stmt: &mut StructuredStmt, declared: &BTreeSet<VarKey>, param_slots: u16) {
    match stmt {
        StructuredStmt::Try {
            try_body,
            catches,
            finally_body,
            ..
        } => {
            insert_declarations(try_body, declared, param_slots);
            for c in catches.iter_mut() {
                let mut inner = declared.clone();
                inner.insert(key(&c.var));
                insert_declarations(&mut c.body, &inner, param_slots);
            }
            if let Some(f) = finally_body {
                insert_declarations(f, declared, param_slots);
            }
        }
        StructuredStmt::ForEach { var, body, .. } => {
            let mut inner = declared.clone();
            inner.insert(key(var));
            insert_declarations(body, &inner, param_slots);
        }
        StructuredStmt::For { init, body, .. } => {
            let mut inner = declared.clone();
            if let Some(StructuredStmt::Declare { var, .. }) = init.as_deref() {
                inner.insert(key(var));
            }
            insert_declarations(body, &inner, param_slots);
        }
        StructuredStmt::Labeled { body, .. } => declare_children(body, declared, param_slots),
        other => {
            for child in other.child_blocks_mut() {
                insert_declarations(child, declared, param_slots);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::EmptySource;

    fn int_var(i: u16, name: &str) -> LocalVar {
        LocalVar::slot(i, Some(name.into()), JvmType::Int)
    }

    fn store(var: &LocalVar, value: Expr) -> StructuredStmt {
        StructuredStmt::simple(Stmt::LocalStore {
            var: var.clone(),
            value,
        })
    }

    fn call(receiver: Expr, name: &str, descriptor: &str) -> Expr {
        Expr::MethodCall {
            kind: InvokeKind::Interface,
            owner: "java/util/Iterator".into(),
            name: name.into(),
            descriptor: descriptor.into(),
            receiver: Some(Box::new(receiver)),
            args: Vec::new(),
        }
    }

    fn run(stmts: Vec<StructuredStmt>, return_type: JvmType, param_slots: u16) -> MethodBody {
        let source = EmptySource;
        let resolver = TypeResolver::new(&source);
        let ctx = DesugarContext {
            resolver: &resolver,
            return_type,
            param_slots,
        };
        let mut body = MethodBody {
            statements: stmts,
            ..MethodBody::default()
        };
        desugar(&mut body, &ctx, &DesugarOptions::default());
        body
    }

    #[test]
    fn test_boolean_ternary_collapses_to_condition() {
        let flag = LocalVar::slot(2, Some("flag".into()), JvmType::Boolean);
        let stack = LocalVar::stack(0, JvmType::Int);
        let cond = Expr::compare(CmpOp::Gt, Expr::Local(int_var(1, "n")), Expr::IntLiteral(0));
        let body = run(
            vec![
                StructuredStmt::If {
                    condition: cond.clone(),
                    then_body: vec![store(&stack, Expr::IntLiteral(1))],
                    else_body: Some(vec![store(&stack, Expr::IntLiteral(0))]),
                },
                store(&flag, Expr::Local(stack.clone())),
                StructuredStmt::simple(Stmt::Return(None)),
            ],
            JvmType::Void,
            2,
        );
        assert_eq!(
            body.statements,
            vec![StructuredStmt::Declare {
                var: flag,
                init: Some(cond),
                line: None,
            }]
        );
    }

    #[test]
    fn test_counting_loop_becomes_for() {
        let i = int_var(1, "i");
        let body = run(
            vec![
                store(&i, Expr::IntLiteral(0)),
                StructuredStmt::While {
                    condition: Expr::compare(CmpOp::Lt, Expr::Local(i.clone()), Expr::IntLiteral(10)),
                    body: vec![
                        StructuredStmt::simple(Stmt::ExprStmt(call(Expr::This, "tick", "()V"))),
                        StructuredStmt::simple(Stmt::Iinc {
                            var: i.clone(),
                            amount: 1,
                        }),
                    ],
                },
            ],
            JvmType::Void,
            1,
        );
        assert_eq!(shape_of(&body.statements), "For[Simple]");
        match &body.statements[0] {
            StructuredStmt::For { init: Some(init), .. } => {
                assert!(matches!(&**init, StructuredStmt::Declare { .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_loop_with_continue_stays_while() {
        let i = int_var(1, "i");
        let body = run(
            vec![
                store(&i, Expr::IntLiteral(0)),
                StructuredStmt::While {
                    condition: Expr::compare(CmpOp::Lt, Expr::Local(i.clone()), Expr::IntLiteral(10)),
                    body: vec![
                        StructuredStmt::If {
                            condition: Expr::BoolLiteral(false),
                            then_body: vec![StructuredStmt::Continue { label: None }],
                            else_body: None,
                        },
                        StructuredStmt::simple(Stmt::Iinc {
                            var: i.clone(),
                            amount: 1,
                        }),
                    ],
                },
            ],
            JvmType::Void,
            1,
        );
        assert_eq!(shape_of(&body.statements), "Declare,While[If[Continue],Simple]");
    }

    #[test]
    fn test_iterator_loop_becomes_foreach() {
        let list = LocalVar::slot(1, Some("list".into()), JvmType::Reference("java/util/List".into()));
        let it = LocalVar::slot(2, None, JvmType::Reference("java/util/Iterator".into()));
        let s = LocalVar::slot(3, Some("s".into()), JvmType::object());
        let string = JvmType::Reference("java/lang/String".into());
        let body = run(
            vec![
                store(&it, call(Expr::Local(list.clone()), "iterator", "()Ljava/util/Iterator;")),
                StructuredStmt::While {
                    condition: call(Expr::Local(it.clone()), "hasNext", "()Z"),
                    body: vec![
                        store(
                            &s,
                            Expr::Cast {
                                ty: string.clone(),
                                expr: Box::new(call(Expr::Local(it.clone()), "next", "()Ljava/lang/Object;")),
                            },
                        ),
                        StructuredStmt::simple(Stmt::ExprStmt(call(Expr::Local(s.clone()), "trim", "()V"))),
                    ],
                },
            ],
            JvmType::Void,
            2,
        );
        match &body.statements[..] {
            [StructuredStmt::ForEach { var, iterable, body }] => {
                assert_eq!(var.ty, string);
                assert_eq!(iterable, &Expr::Local(list));
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_declaration_hoisted_above_branches() {
        let x = int_var(1, "x");
        let body = run(
            vec![
                StructuredStmt::If {
                    condition: Expr::BoolLiteral(true),
                    then_body: vec![store(&x, Expr::IntLiteral(1))],
                    else_body: Some(vec![store(&x, Expr::IntLiteral(2))]),
                },
                StructuredStmt::simple(Stmt::Return(Some(Expr::Local(x.clone())))),
            ],
            JvmType::Int,
            0,
        );
        assert_eq!(shape_of(&body.statements), "Declare,If[Simple|Simple],Simple");
        assert!(matches!(&body.statements[0], StructuredStmt::Declare { init: None, .. }));
    }

    #[test]
    fn test_return_temporary_collapses() {
        let t = LocalVar::slot(2, None, JvmType::Int);
        let body = run(
            vec![
                store(&t, Expr::IntLiteral(7)),
                StructuredStmt::simple(Stmt::Return(Some(Expr::Local(t)))),
            ],
            JvmType::Int,
            1,
        );
        assert_eq!(
            body.statements,
            vec![StructuredStmt::simple(Stmt::Return(Some(Expr::IntLiteral(7))))]
        );
    }

    #[test]
    fn test_string_switch_is_recovered() {
        let subject = LocalVar::slot(1, Some("s".into()), JvmType::Reference("java/lang/String".into()));
        let tmp = LocalVar::slot(2, None, JvmType::Reference("java/lang/String".into()));
        let idx = LocalVar::slot(3, None, JvmType::Int);
        let equals = |lit: &str| Expr::MethodCall {
            kind: InvokeKind::Virtual,
            owner: "java/lang/String".into(),
            name: "equals".into(),
            descriptor: "(Ljava/lang/Object;)Z".into(),
            receiver: Some(Box::new(Expr::Local(tmp.clone()))),
            args: vec![Expr::StringLiteral(lit.into())],
        };
        let hash_case = |hash: i32, lit: &str, k: i32| SwitchCase {
            values: vec![SwitchValue::Int(hash)],
            is_default: false,
            body: vec![
                StructuredStmt::If {
                    condition: equals(lit),
                    then_body: vec![store(&idx, Expr::IntLiteral(k))],
                    else_body: None,
                },
                StructuredStmt::Break { label: None },
            ],
            falls_through: false,
        };
        let arm = |k: i32| SwitchCase {
            values: vec![SwitchValue::Int(k)],
            is_default: false,
            body: vec![StructuredStmt::simple(Stmt::Return(Some(Expr::IntLiteral(k + 10))))],
            falls_through: false,
        };
        let body = run(
            vec![
                store(&tmp, Expr::Local(subject.clone())),
                store(&idx, Expr::IntLiteral(-1)),
                StructuredStmt::Switch {
                    kind: SwitchKind::Int,
                    expr: Expr::MethodCall {
                        kind: InvokeKind::Virtual,
                        owner: "java/lang/String".into(),
                        name: "hashCode".into(),
                        descriptor: "()I".into(),
                        receiver: Some(Box::new(Expr::Local(tmp.clone()))),
                        args: Vec::new(),
                    },
                    cases: vec![hash_case(97, "a", 0), hash_case(98, "b", 1)],
                },
                StructuredStmt::Switch {
                    kind: SwitchKind::Int,
                    expr: Expr::Local(idx.clone()),
                    cases: vec![arm(0), arm(1)],
                },
                StructuredStmt::simple(Stmt::Return(Some(Expr::IntLiteral(0)))),
            ],
            JvmType::Int,
            2,
        );
        match &body.statements[0] {
            StructuredStmt::Switch { kind, expr, cases } => {
                assert_eq!(kind, &SwitchKind::String);
                assert_eq!(expr, &Expr::Local(subject));
                assert_eq!(cases[1].values, vec![SwitchValue::String("b".into())]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(body.statements.len(), 2);
    }
}
