use super::exceptions::TryShape;
use super::expr::{Expr, LocalVar, Statement, Stmt};

/// A structured statement produced by control flow structuring.
/// Represents Java-level control flow constructs.
#[derive(Clone, Debug, PartialEq)]
pub enum StructuredStmt {
    /// A simple statement (from stack simulation).
    Simple(Statement),
    /// Local declaration at the variable's first assignment.
    Declare {
        var: LocalVar,
        init: Option<Expr>,
        line: Option<u16>,
    },
    /// if / if-else
    If {
        condition: Expr,
        then_body: Vec<StructuredStmt>,
        else_body: Option<Vec<StructuredStmt>>,
    },
    /// while loop; `while (true)` for loops without a guard
    While {
        condition: Expr,
        body: Vec<StructuredStmt>,
    },
    /// do-while loop
    DoWhile {
        body: Vec<StructuredStmt>,
        condition: Expr,
    },
    /// for loop
    For {
        init: Option<Box<StructuredStmt>>,
        condition: Expr,
        update: Option<Box<StructuredStmt>>,
        body: Vec<StructuredStmt>,
    },
    /// for-each loop (desugared from iterator or array index pattern)
    ForEach {
        var: LocalVar,
        iterable: Expr,
        body: Vec<StructuredStmt>,
    },
    /// switch statement
    Switch {
        kind: SwitchKind,
        expr: Expr,
        cases: Vec<SwitchCase>,
    },
    /// try-catch-finally; `shape` records which bytecode pattern it came from
    Try {
        shape: TryShape,
        try_body: Vec<StructuredStmt>,
        catches: Vec<CatchClause>,
        finally_body: Option<Vec<StructuredStmt>>,
    },
    /// synchronized block
    Synchronized {
        lock: Expr,
        body: Vec<StructuredStmt>,
    },
    /// Labeled statement (for break/continue targets)
    Labeled {
        label: String,
        body: Box<StructuredStmt>,
    },
    /// break statement
    Break { label: Option<String> },
    /// continue statement
    Continue { label: Option<String> },
    /// Target of a residual goto.
    Label(String),
    /// Fallback for irreducible control flow
    Goto(String),
    /// Comment (used for error recovery, bytecode fallback, etc.)
    Comment(String),
}

/// Which source construct a switch was lowered from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwitchKind {
    Int,
    /// Internal name of the enum type.
    Enum(String),
    String,
}

/// A switch case arm.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<SwitchValue>,
    pub is_default: bool,
    pub body: Vec<StructuredStmt>,
    pub falls_through: bool,
}

/// Value for a switch case label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwitchValue {
    Int(i32),
    String(String),
    Enum(String),
}

/// A catch clause in a try-catch.
#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    /// Internal names; several for a multi-catch, empty for a catch-all.
    pub exception_types: Vec<String>,
    pub var: LocalVar,
    pub body: Vec<StructuredStmt>,
}

/// A structured method body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MethodBody {
    pub statements: Vec<StructuredStmt>,
    /// Set when some control flow could only be expressed with gotos or an
    /// unrecognized handler shape.
    pub approximate: bool,
    pub warnings: Vec<String>,
}

impl StructuredStmt {
    pub fn simple(stmt: Stmt) -> Self {
        StructuredStmt::Simple(Statement::synthetic(stmt))
    }

    pub fn as_stmt(&self) -> Option<&Stmt> {
        match self {
            StructuredStmt::Simple(s) => Some(&s.stmt),
            _ => None,
        }
    }

    /// Nested statement lists, in source order.
    pub fn child_blocks(&self) -> Vec<&Vec<StructuredStmt>> {
        match self {
            StructuredStmt::If {
                then_body,
                else_body,
                ..
            } => {
                let mut v = vec![then_body];
                if let Some(e) = else_body {
                    v.push(e);
                }
                v
            }
            StructuredStmt::While { body, .. }
            | StructuredStmt::DoWhile { body, .. }
            | StructuredStmt::For { body, .. }
            | StructuredStmt::ForEach { body, .. }
            | StructuredStmt::Synchronized { body, .. } => vec![body],
            StructuredStmt::Switch { cases, .. } => cases.iter().map(|c| &c.body).collect(),
            StructuredStmt::Try {
                try_body,
                catches,
                finally_body,
                ..
            } => {
                let mut v = vec![try_body];
                v.extend(catches.iter().map(|c| &c.body));
                if let Some(f) = finally_body {
                    v.push(f);
                }
                v
            }
            StructuredStmt::Labeled { body, .. } => body.child_blocks(),
            _ => Vec::new(),
        }
    }

    pub fn child_blocks_mut(&mut self) -> Vec<&mut Vec<StructuredStmt>> {
        match self {
            StructuredStmt::If {
                then_body,
                else_body,
                ..
            } => {
                let mut v = vec![then_body];
                if let Some(e) = else_body {
                    v.push(e);
                }
                v
            }
            StructuredStmt::While { body, .. }
            | StructuredStmt::DoWhile { body, .. }
            | StructuredStmt::For { body, .. }
            | StructuredStmt::ForEach { body, .. }
            | StructuredStmt::Synchronized { body, .. } => vec![body],
            StructuredStmt::Switch { cases, .. } => cases.iter_mut().map(|c| &mut c.body).collect(),
            StructuredStmt::Try {
                try_body,
                catches,
                finally_body,
                ..
            } => {
                let mut v = vec![try_body];
                v.extend(catches.iter_mut().map(|c| &mut c.body));
                if let Some(f) = finally_body {
                    v.push(f);
                }
                v
            }
            StructuredStmt::Labeled { body, .. } => body.child_blocks_mut(),
            _ => Vec::new(),
        }
    }

    /// Expressions owned by this node itself (not by nested blocks).
    pub fn visit_own_exprs(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            StructuredStmt::Simple(s) => s.stmt.visit_exprs(f),
            StructuredStmt::Declare { init: Some(e), .. } => e.visit(f),
            StructuredStmt::If { condition, .. }
            | StructuredStmt::While { condition, .. }
            | StructuredStmt::DoWhile { condition, .. } => condition.visit(f),
            StructuredStmt::For {
                init,
                condition,
                update,
                ..
            } => {
                if let Some(i) = init {
                    i.visit_own_exprs(f);
                }
                condition.visit(f);
                if let Some(u) = update {
                    u.visit_own_exprs(f);
                }
            }
            StructuredStmt::ForEach { iterable, .. } => iterable.visit(f),
            StructuredStmt::Switch { expr, .. } => expr.visit(f),
            StructuredStmt::Synchronized { lock, .. } => lock.visit(f),
            StructuredStmt::Labeled { body, .. } => body.visit_own_exprs(f),
            _ => {}
        }
    }

    /// Pre-order walk over this node and every nested node.
    pub fn walk(&self, f: &mut impl FnMut(&StructuredStmt)) {
        f(self);
        if let StructuredStmt::Labeled { body, .. } = self {
            body.walk(f);
            return;
        }
        if let StructuredStmt::For { init, update, .. } = self {
            if let Some(i) = init {
                i.walk(f);
            }
            if let Some(u) = update {
                u.walk(f);
            }
        }
        for block in self.child_blocks() {
            for stmt in block {
                stmt.walk(f);
            }
        }
    }

    /// Short name of the construct, for diagnostics and tests.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StructuredStmt::Simple(_) => "Simple",
            StructuredStmt::Declare { .. } => "Declare",
            StructuredStmt::If { .. } => "If",
            StructuredStmt::While { .. } => "While",
            StructuredStmt::DoWhile { .. } => "DoWhile",
            StructuredStmt::For { .. } => "For",
            StructuredStmt::ForEach { .. } => "ForEach",
            StructuredStmt::Switch { .. } => "Switch",
            StructuredStmt::Try { .. } => "Try",
            StructuredStmt::Synchronized { .. } => "Synchronized",
            StructuredStmt::Labeled { .. } => "Labeled",
            StructuredStmt::Break { .. } => "Break",
            StructuredStmt::Continue { .. } => "Continue",
            StructuredStmt::Label(_) => "Label",
            StructuredStmt::Goto(_) => "Goto",
            StructuredStmt::Comment(_) => "Comment",
        }
    }
}

/// Render the nesting of a statement list as `Kind[child, ...]` text, e.g.
/// `While[Simple]`. Used to compare tree shapes.
pub fn shape_of(stmts: &[StructuredStmt]) -> String {
    stmts.iter().map(shape_of_stmt).collect::<Vec<_>>().join(",")
}

fn shape_of_stmt(stmt: &StructuredStmt) -> String {
    if let StructuredStmt::Labeled { body, .. } = stmt {
        return format!("Labeled[{}]", shape_of_stmt(body));
    }
    let blocks = stmt.child_blocks();
    if blocks.is_empty() {
        return stmt.kind_name().to_string();
    }
    let inner: Vec<String> = blocks.iter().map(|b| shape_of(b)).collect();
    format!("{}[{}]", stmt.kind_name(), inner.join("|"))
}
