use crate::code_attribute::{ArithOp, CmpOp};

use super::descriptor::{self, JvmType};

/// Index of a duplicated value in the method's [`super::dup::DupArena`].
pub type DupId = u32;

impl ArithOp {
    /// Java source token for this operator.
    pub fn as_str(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
            ArithOp::Shl => "<<",
            ArithOp::Shr => ">>",
            ArithOp::Ushr => ">>>",
            ArithOp::And => "&",
            ArithOp::Or => "|",
            ArithOp::Xor => "^",
        }
    }
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Ge => ">=",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
        }
    }
}

/// Short-circuit operators produced by condition folding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Method invocation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Where a variable came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarOrigin {
    /// A JVM local variable slot.
    Slot,
    /// A stack value spilled at a control-flow merge.
    Stack,
    /// A duplicated value used more than once.
    Temp,
}

/// Local variable reference.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVar {
    pub index: u16,
    pub name: Option<String>,
    pub ty: JvmType,
    pub origin: VarOrigin,
}

impl LocalVar {
    pub fn slot(index: u16, name: Option<String>, ty: JvmType) -> Self {
        Self {
            index,
            name,
            ty,
            origin: VarOrigin::Slot,
        }
    }

    pub fn stack(n: u16, ty: JvmType) -> Self {
        Self {
            index: n,
            name: Some(format!("stack{}", n)),
            ty,
            origin: VarOrigin::Stack,
        }
    }

    pub fn temp(n: u16, ty: JvmType) -> Self {
        Self {
            index: n,
            name: Some(format!("tmp{}", n)),
            ty,
            origin: VarOrigin::Temp,
        }
    }

    /// Same storage and, when both are named, the same name. Slot reuse
    /// under different debug names is a different variable.
    pub fn same(&self, other: &LocalVar) -> bool {
        self.origin == other.origin
            && self.index == other.index
            && match (&self.name, &other.name) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => format!("var{}", self.index),
        }
    }
}

/// Expression tree node -- represents a value-producing computation.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    // --- Literals ---
    IntLiteral(i32),
    LongLiteral(i64),
    FloatLiteral(f32),
    DoubleLiteral(f64),
    BoolLiteral(bool),
    CharLiteral(u16),
    StringLiteral(String),
    ClassLiteral(JvmType),
    NullLiteral,

    // --- Variables ---
    This,
    Local(LocalVar),
    /// The exception value a handler block starts with.
    CaughtException(String),
    /// Pushed by `jsr`; only ever stored and discarded.
    ReturnAddress,
    DupLoad(DupId),

    // --- Operators ---
    BinaryOp {
        op: ArithOp,
        ty: JvmType,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Result of `lcmp`/`fcmpl`/`dcmpg`: -1, 0 or 1. Folded into `Compare`
    /// by the branch that consumes it.
    CmpResult {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cast {
        ty: JvmType,
        expr: Box<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: JvmType,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    // --- Member access ---
    /// `object` is `None` for static fields.
    FieldGet {
        owner: String,
        name: String,
        ty: JvmType,
        object: Option<Box<Expr>>,
    },
    MethodCall {
        kind: InvokeKind,
        owner: String,
        name: String,
        descriptor: String,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    InvokeDynamic {
        name: String,
        descriptor: String,
        bootstrap: u16,
        args: Vec<Expr>,
    },

    // --- Allocation ---
    New {
        class: String,
        descriptor: String,
        args: Vec<Expr>,
    },
    /// `new` before its constructor has run; `alloc` is the offset of the `new`.
    UninitNew {
        class: String,
        alloc: u32,
    },
    NewArray {
        ty: JvmType,
        dims: Vec<Expr>,
    },
    ArrayLength(Box<Expr>),
    ArrayLoad {
        array: Box<Expr>,
        index: Box<Expr>,
        ty: JvmType,
    },

    /// Something the simulator could not express; carries a description.
    Unresolved(String),
}

impl Expr {
    pub fn local(var: &LocalVar) -> Self {
        Expr::Local(var.clone())
    }

    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Self {
        Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Static type of the expression, as far as it is known.
    pub fn ty(&self) -> JvmType {
        match self {
            Expr::IntLiteral(_) => JvmType::Int,
            Expr::LongLiteral(_) => JvmType::Long,
            Expr::FloatLiteral(_) => JvmType::Float,
            Expr::DoubleLiteral(_) => JvmType::Double,
            Expr::BoolLiteral(_) => JvmType::Boolean,
            Expr::CharLiteral(_) => JvmType::Char,
            Expr::StringLiteral(_) => JvmType::Reference("java/lang/String".into()),
            Expr::ClassLiteral(_) => JvmType::Reference("java/lang/Class".into()),
            Expr::NullLiteral => JvmType::Null,
            Expr::This | Expr::ReturnAddress | Expr::DupLoad(_) | Expr::Unresolved(_) => {
                JvmType::Unknown
            }
            Expr::Local(v) => v.ty.clone(),
            Expr::CaughtException(name) => JvmType::Reference(name.clone()),
            Expr::BinaryOp { ty, .. } => ty.clone(),
            Expr::Neg(inner) => inner.ty(),
            Expr::Not(_) | Expr::Logical { .. } | Expr::Compare { .. } | Expr::InstanceOf { .. } => {
                JvmType::Boolean
            }
            Expr::CmpResult { .. } | Expr::ArrayLength(_) => JvmType::Int,
            Expr::Cast { ty, .. } => ty.clone(),
            Expr::Ternary { then, otherwise, .. } => match then.ty() {
                JvmType::Null | JvmType::Unknown => otherwise.ty(),
                t => t,
            },
            Expr::FieldGet { ty, .. } | Expr::ArrayLoad { ty, .. } | Expr::NewArray { ty, .. } => {
                ty.clone()
            }
            Expr::MethodCall { descriptor, .. } | Expr::InvokeDynamic { descriptor, .. } => {
                descriptor::parse_method_descriptor(descriptor)
                    .map(|(_, ret)| ret)
                    .unwrap_or(JvmType::Unknown)
            }
            Expr::New { class, .. } | Expr::UninitNew { class, .. } => {
                JvmType::Reference(class.clone())
            }
        }
    }

    pub fn is_boolean(&self) -> bool {
        self.ty() == JvmType::Boolean
    }

    /// Values that can be evaluated any number of times, in any order.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Expr::IntLiteral(_)
                | Expr::LongLiteral(_)
                | Expr::FloatLiteral(_)
                | Expr::DoubleLiteral(_)
                | Expr::BoolLiteral(_)
                | Expr::CharLiteral(_)
                | Expr::StringLiteral(_)
                | Expr::ClassLiteral(_)
                | Expr::NullLiteral
                | Expr::This
                | Expr::Local(_)
                | Expr::CaughtException(_)
                | Expr::ReturnAddress
        )
    }

    /// Conservative: anything that calls or allocates.
    pub fn has_side_effects(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(
                e,
                Expr::MethodCall { .. }
                    | Expr::InvokeDynamic { .. }
                    | Expr::New { .. }
                    | Expr::NewArray { .. }
                    | Expr::Unresolved(_)
            ) {
                found = true;
            }
        });
        found
    }

    /// Pre-order visit of this expression and all sub-expressions.
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::BinaryOp { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::CmpResult { left, right } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::Neg(inner) | Expr::Not(inner) | Expr::ArrayLength(inner) => inner.visit(f),
            Expr::Cast { expr, .. } | Expr::InstanceOf { expr, .. } => expr.visit(f),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.visit(f);
                then.visit(f);
                otherwise.visit(f);
            }
            Expr::FieldGet { object, .. } => {
                if let Some(o) = object {
                    o.visit(f);
                }
            }
            Expr::MethodCall { receiver, args, .. } => {
                if let Some(r) = receiver {
                    r.visit(f);
                }
                args.iter().for_each(|a| a.visit(f));
            }
            Expr::InvokeDynamic { args, .. } | Expr::New { args, .. } => {
                args.iter().for_each(|a| a.visit(f))
            }
            Expr::NewArray { dims, .. } => dims.iter().for_each(|d| d.visit(f)),
            Expr::ArrayLoad { array, index, .. } => {
                array.visit(f);
                index.visit(f);
            }
            _ => {}
        }
    }

    /// Bottom-up rewrite: children first, then `f` on the rebuilt node.
    pub fn rewrite(self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        let rebuilt = match self {
            Expr::BinaryOp {
                op,
                ty,
                left,
                right,
            } => Expr::BinaryOp {
                op,
                ty,
                left: Box::new(left.rewrite(f)),
                right: Box::new(right.rewrite(f)),
            },
            Expr::Logical { op, left, right } => Expr::Logical {
                op,
                left: Box::new(left.rewrite(f)),
                right: Box::new(right.rewrite(f)),
            },
            Expr::Compare { op, left, right } => Expr::Compare {
                op,
                left: Box::new(left.rewrite(f)),
                right: Box::new(right.rewrite(f)),
            },
            Expr::CmpResult { left, right } => Expr::CmpResult {
                left: Box::new(left.rewrite(f)),
                right: Box::new(right.rewrite(f)),
            },
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.rewrite(f))),
            Expr::Not(inner) => Expr::Not(Box::new(inner.rewrite(f))),
            Expr::ArrayLength(inner) => Expr::ArrayLength(Box::new(inner.rewrite(f))),
            Expr::Cast { ty, expr } => Expr::Cast {
                ty,
                expr: Box::new(expr.rewrite(f)),
            },
            Expr::InstanceOf { expr, ty } => Expr::InstanceOf {
                expr: Box::new(expr.rewrite(f)),
                ty,
            },
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => Expr::Ternary {
                cond: Box::new(cond.rewrite(f)),
                then: Box::new(then.rewrite(f)),
                otherwise: Box::new(otherwise.rewrite(f)),
            },
            Expr::FieldGet {
                owner,
                name,
                ty,
                object,
            } => Expr::FieldGet {
                owner,
                name,
                ty,
                object: object.map(|o| Box::new(o.rewrite(f))),
            },
            Expr::MethodCall {
                kind,
                owner,
                name,
                descriptor,
                receiver,
                args,
            } => Expr::MethodCall {
                kind,
                owner,
                name,
                descriptor,
                receiver: receiver.map(|r| Box::new(r.rewrite(f))),
                args: args.into_iter().map(|a| a.rewrite(f)).collect(),
            },
            Expr::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
                args,
            } => Expr::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
                args: args.into_iter().map(|a| a.rewrite(f)).collect(),
            },
            Expr::New {
                class,
                descriptor,
                args,
            } => Expr::New {
                class,
                descriptor,
                args: args.into_iter().map(|a| a.rewrite(f)).collect(),
            },
            Expr::NewArray { ty, dims } => Expr::NewArray {
                ty,
                dims: dims.into_iter().map(|d| d.rewrite(f)).collect(),
            },
            Expr::ArrayLoad { array, index, ty } => Expr::ArrayLoad {
                array: Box::new(array.rewrite(f)),
                index: Box::new(index.rewrite(f)),
                ty,
            },
            leaf => leaf,
        };
        f(rebuilt)
    }

    /// Number of reads of `var` inside this expression.
    pub fn count_reads(&self, var: &LocalVar) -> usize {
        let mut count = 0;
        self.visit(&mut |e| {
            if let Expr::Local(v) = e {
                if v.same(var) {
                    count += 1;
                }
            }
        });
        count
    }

    pub fn reads(&self, var: &LocalVar) -> bool {
        self.count_reads(var) > 0
    }

    /// Replace every read of `var` with `value`.
    pub fn substitute(self, var: &LocalVar, value: &Expr) -> Expr {
        self.rewrite(&mut |e| match e {
            Expr::Local(ref v) if v.same(var) => value.clone(),
            other => other,
        })
    }
}

/// Negate a boolean expression, pushing the negation into comparisons.
pub fn negate_expr(expr: Expr) -> Expr {
    match expr {
        Expr::Compare { op, left, right } => Expr::Compare {
            op: op.negate(),
            left,
            right,
        },
        Expr::Not(inner) => *inner,
        Expr::BoolLiteral(b) => Expr::BoolLiteral(!b),
        Expr::Logical { op, left, right } => Expr::Logical {
            op: match op {
                LogicalOp::And => LogicalOp::Or,
                LogicalOp::Or => LogicalOp::And,
            },
            left: Box::new(negate_expr(*left)),
            right: Box::new(negate_expr(*right)),
        },
        other => Expr::Not(Box::new(other)),
    }
}

/// Give an int literal the source type its context expects: `1` stored into
/// a boolean becomes `true`, `97` passed as a char becomes `'a'`.
pub fn retype_literal(expr: Expr, ty: &JvmType) -> Expr {
    match (expr, ty) {
        (Expr::IntLiteral(0), JvmType::Boolean) => Expr::BoolLiteral(false),
        (Expr::IntLiteral(1), JvmType::Boolean) => Expr::BoolLiteral(true),
        (Expr::IntLiteral(v), JvmType::Char) if (0..=0xFFFF).contains(&v) => {
            Expr::CharLiteral(v as u16)
        }
        (
            Expr::Ternary {
                cond,
                then,
                otherwise,
            },
            ty,
        ) if ty.is_int_like() => Expr::Ternary {
            cond,
            then: Box::new(retype_literal(*then, ty)),
            otherwise: Box::new(retype_literal(*otherwise, ty)),
        },
        (other, _) => other,
    }
}

/// Statement node -- a side-effecting operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    LocalStore {
        var: LocalVar,
        value: Expr,
    },
    FieldStore {
        owner: String,
        name: String,
        ty: JvmType,
        object: Option<Expr>,
        value: Expr,
    },
    ArrayStore {
        array: Expr,
        index: Expr,
        value: Expr,
    },
    ExprStmt(Expr),
    Iinc {
        var: LocalVar,
        amount: i32,
    },
    Return(Option<Expr>),
    Throw(Expr),
    MonitorEnter(Expr),
    MonitorExit(Expr),
    /// Binding point of a duplicated value; rewritten before structuring.
    DupStore(DupId),
}

impl Stmt {
    /// Pre-order visit of every expression in the statement.
    pub fn visit_exprs(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            Stmt::LocalStore { value, .. } => value.visit(f),
            Stmt::FieldStore { object, value, .. } => {
                if let Some(o) = object {
                    o.visit(f);
                }
                value.visit(f);
            }
            Stmt::ArrayStore {
                array,
                index,
                value,
            } => {
                array.visit(f);
                index.visit(f);
                value.visit(f);
            }
            Stmt::ExprStmt(e) | Stmt::Throw(e) | Stmt::MonitorEnter(e) | Stmt::MonitorExit(e) => {
                e.visit(f)
            }
            Stmt::Return(Some(e)) => e.visit(f),
            Stmt::Return(None) | Stmt::Iinc { .. } | Stmt::DupStore(_) => {}
        }
    }

    pub fn rewrite_exprs(self, f: &mut impl FnMut(Expr) -> Expr) -> Stmt {
        match self {
            Stmt::LocalStore { var, value } => Stmt::LocalStore {
                var,
                value: value.rewrite(f),
            },
            Stmt::FieldStore {
                owner,
                name,
                ty,
                object,
                value,
            } => Stmt::FieldStore {
                owner,
                name,
                ty,
                object: object.map(|o| o.rewrite(f)),
                value: value.rewrite(f),
            },
            Stmt::ArrayStore {
                array,
                index,
                value,
            } => Stmt::ArrayStore {
                array: array.rewrite(f),
                index: index.rewrite(f),
                value: value.rewrite(f),
            },
            Stmt::ExprStmt(e) => Stmt::ExprStmt(e.rewrite(f)),
            Stmt::Throw(e) => Stmt::Throw(e.rewrite(f)),
            Stmt::MonitorEnter(e) => Stmt::MonitorEnter(e.rewrite(f)),
            Stmt::MonitorExit(e) => Stmt::MonitorExit(e.rewrite(f)),
            Stmt::Return(e) => Stmt::Return(e.map(|e| e.rewrite(f))),
            other => other,
        }
    }

    /// The variable this statement writes, if any.
    pub fn written_var(&self) -> Option<&LocalVar> {
        match self {
            Stmt::LocalStore { var, .. } | Stmt::Iinc { var, .. } => Some(var),
            _ => None,
        }
    }

    pub fn reads(&self, var: &LocalVar) -> bool {
        let mut found = matches!(self, Stmt::Iinc { var: v, .. } if v.same(var));
        self.visit_exprs(&mut |e| {
            if let Expr::Local(v) = e {
                if v.same(var) {
                    found = true;
                }
            }
        });
        found
    }

    /// Statements after which control never falls through.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stmt::Return(_) | Stmt::Throw(_))
    }
}

/// A statement with the byte range it was built from and its best-known line.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub stmt: Stmt,
    pub start_pc: u32,
    pub end_pc: u32,
    pub line: Option<u16>,
}

impl Statement {
    /// A statement with no bytecode origin, created by a rewrite.
    pub fn synthetic(stmt: Stmt) -> Self {
        Self {
            stmt,
            start_pc: 0,
            end_pc: 0,
            line: None,
        }
    }

    pub fn with_stmt(&self, stmt: Stmt) -> Self {
        Self {
            stmt,
            start_pc: self.start_pc,
            end_pc: self.end_pc,
            line: self.line,
        }
    }
}
