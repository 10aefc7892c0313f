/// Computational kind of a local, stack slot or typed opcode family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// Long and Double occupy two stack slots (category 2).
    pub fn is_wide(self) -> bool {
        matches!(self, ValueKind::Long | ValueKind::Double)
    }
}

/// Element kind of an array load/store opcode. `Byte` also covers boolean arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

/// Comparison selected by a conditional branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl CmpOp {
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Ge => CmpOp::Lt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Le => CmpOp::Gt,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NarrowKind {
    Byte,
    Char,
    Short,
}

/// One decoded operation. Branch targets are absolute code offsets;
/// constant pool operands are left as indices.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Nop,
    AconstNull,
    /// iconst_*, bipush and sipush.
    Iconst(i32),
    Lconst(i64),
    Fconst(f32),
    Dconst(f64),
    /// ldc and ldc_w.
    Ldc(u16),
    Ldc2W(u16),
    Load(ValueKind, u16),
    Store(ValueKind, u16),
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    Arith(ValueKind, ArithOp),
    Neg(ValueKind),
    Iinc { index: u16, value: i16 },
    Convert { from: ValueKind, to: ValueKind },
    Narrow(NarrowKind),
    Lcmp,
    /// fcmpl/fcmpg; `nan_greater` is set for the `g` form.
    Fcmp { nan_greater: bool },
    Dcmp { nan_greater: bool },
    /// ifeq..ifle: compare an int against zero.
    IfZero(CmpOp, u32),
    IfIcmp(CmpOp, u32),
    /// if_acmpeq / if_acmpne; only `Eq` and `Ne` occur.
    IfAcmp(CmpOp, u32),
    IfNull(u32),
    IfNonNull(u32),
    Goto(u32),
    Jsr(u32),
    Ret(u16),
    TableSwitch {
        default: u32,
        low: i32,
        high: i32,
        targets: Vec<u32>,
    },
    LookupSwitch {
        default: u32,
        pairs: Vec<(i32, u32)>,
    },
    Return(Option<ValueKind>),
    GetStatic(u16),
    PutStatic(u16),
    GetField(u16),
    PutField(u16),
    InvokeVirtual(u16),
    InvokeSpecial(u16),
    InvokeStatic(u16),
    InvokeInterface { index: u16, count: u8 },
    InvokeDynamic(u16),
    New(u16),
    /// Primitive array creation; operand is the `atype` code (4 = boolean .. 11 = long).
    NewArray(u8),
    ANewArray(u16),
    ArrayLength,
    AThrow,
    CheckCast(u16),
    InstanceOf(u16),
    MonitorEnter,
    MonitorExit,
    MultiANewArray { index: u16, dimensions: u8 },
}

impl Operation {
    /// Every code offset control may transfer to, excluding fallthrough.
    pub fn branch_targets(&self) -> Vec<u32> {
        match self {
            Operation::IfZero(_, t)
            | Operation::IfIcmp(_, t)
            | Operation::IfAcmp(_, t)
            | Operation::IfNull(t)
            | Operation::IfNonNull(t)
            | Operation::Goto(t)
            | Operation::Jsr(t) => vec![*t],
            Operation::TableSwitch {
                default, targets, ..
            } => {
                let mut all = vec![*default];
                all.extend(targets.iter().copied());
                all
            }
            Operation::LookupSwitch { default, pairs } => {
                let mut all = vec![*default];
                all.extend(pairs.iter().map(|(_, t)| *t));
                all
            }
            _ => Vec::new(),
        }
    }

    pub fn is_conditional_branch(&self) -> bool {
        matches!(
            self,
            Operation::IfZero(..)
                | Operation::IfIcmp(..)
                | Operation::IfAcmp(..)
                | Operation::IfNull(_)
                | Operation::IfNonNull(_)
        )
    }

    /// Control never falls through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            Operation::Goto(_)
                | Operation::Ret(_)
                | Operation::Return(_)
                | Operation::AThrow
                | Operation::TableSwitch { .. }
                | Operation::LookupSwitch { .. }
        )
    }
}

/// A decoded instruction at a byte offset of its method's code array.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: u8,
    /// Encoded size in bytes, including switch padding and the `wide` prefix.
    pub length: u32,
    pub op: Operation,
}

impl Instruction {
    pub fn next_offset(&self) -> u32 {
        self.offset + self.length
    }
}
