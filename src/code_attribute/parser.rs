use nom::{
    bytes::complete::take,
    error::{ErrorKind, ParseError},
    multi::count,
    number::complete::{be_i16, be_i32, be_i8, be_u16, be_u8},
    Err, IResult,
};

use super::types::*;

/// Failure detail produced by [`instruction_parser`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsnParseError {
    Truncated,
    UnknownOpcode(u8),
    InvalidSwitch { low: i32, high: i32 },
    InvalidWide(u8),
    NegativeTarget(i64),
}

impl<I> ParseError<I> for InsnParseError {
    fn from_error_kind(_input: I, _kind: ErrorKind) -> Self {
        InsnParseError::Truncated
    }

    fn append(_input: I, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type InsnResult<'a, T> = IResult<&'a [u8], T, InsnParseError>;

fn fail<T>(e: InsnParseError) -> InsnResult<'static, T> {
    Err(Err::Failure(e))
}

fn target(address: u32, rel: i64) -> Result<u32, Err<InsnParseError>> {
    let abs = address as i64 + rel;
    if abs < 0 || abs > u32::MAX as i64 {
        return Err(Err::Failure(InsnParseError::NegativeTarget(abs)));
    }
    Ok(abs as u32)
}

fn branch16(input: &[u8], address: u32) -> InsnResult<'_, u32> {
    let (input, rel) = be_i16(input)?;
    Ok((input, target(address, rel as i64)?))
}

fn branch32(input: &[u8], address: u32) -> InsnResult<'_, u32> {
    let (input, rel) = be_i32(input)?;
    Ok((input, target(address, rel as i64)?))
}

/// Switch operands start on the next four-byte boundary of the code array.
fn switch_padding(input: &[u8], address: u32) -> InsnResult<'_, &[u8]> {
    let pad = (4 - (address + 1) % 4) % 4;
    take(pad)(input)
}

fn table_switch(input: &[u8], address: u32) -> InsnResult<'_, Operation> {
    let (input, _) = switch_padding(input, address)?;
    let (input, default) = branch32(input, address)?;
    let (input, low) = be_i32(input)?;
    let (input, high) = be_i32(input)?;
    if high < low {
        return fail(InsnParseError::InvalidSwitch { low, high });
    }
    let n = (high as i64 - low as i64 + 1) as usize;
    if n.saturating_mul(4) > input.len() {
        return Err(Err::Error(InsnParseError::Truncated));
    }
    let (input, rels) = count(be_i32, n)(input)?;
    let targets = rels
        .into_iter()
        .map(|rel| target(address, rel as i64))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((
        input,
        Operation::TableSwitch {
            default,
            low,
            high,
            targets,
        },
    ))
}

fn lookup_switch(input: &[u8], address: u32) -> InsnResult<'_, Operation> {
    let (input, _) = switch_padding(input, address)?;
    let (input, default) = branch32(input, address)?;
    let (input, npairs) = be_i32(input)?;
    if npairs < 0 {
        return fail(InsnParseError::InvalidSwitch {
            low: 0,
            high: npairs,
        });
    }
    if (npairs as usize).saturating_mul(8) > input.len() {
        return Err(Err::Error(InsnParseError::Truncated));
    }
    let mut input = input;
    let mut pairs = Vec::with_capacity(npairs as usize);
    for _ in 0..npairs {
        let (rest, key) = be_i32(input)?;
        let (rest, rel) = be_i32(rest)?;
        pairs.push((key, target(address, rel as i64)?));
        input = rest;
    }
    Ok((input, Operation::LookupSwitch { default, pairs }))
}

fn wide(input: &[u8]) -> InsnResult<'_, (u8, Operation)> {
    let (input, opcode) = be_u8(input)?;
    let (input, index) = be_u16(input)?;
    let op = match opcode {
        0x15 => Operation::Load(ValueKind::Int, index),
        0x16 => Operation::Load(ValueKind::Long, index),
        0x17 => Operation::Load(ValueKind::Float, index),
        0x18 => Operation::Load(ValueKind::Double, index),
        0x19 => Operation::Load(ValueKind::Reference, index),
        0x36 => Operation::Store(ValueKind::Int, index),
        0x37 => Operation::Store(ValueKind::Long, index),
        0x38 => Operation::Store(ValueKind::Float, index),
        0x39 => Operation::Store(ValueKind::Double, index),
        0x3a => Operation::Store(ValueKind::Reference, index),
        0xa9 => Operation::Ret(index),
        0x84 => {
            let (input, value) = be_i16(input)?;
            return Ok((input, (opcode, Operation::Iinc { index, value })));
        }
        _ => return fail(InsnParseError::InvalidWide(opcode)),
    };
    Ok((input, (opcode, op)))
}

fn local(input: &[u8], kind: ValueKind, store: bool) -> InsnResult<'_, Operation> {
    let (input, index) = be_u8(input)?;
    let index = index as u16;
    Ok((
        input,
        if store {
            Operation::Store(kind, index)
        } else {
            Operation::Load(kind, index)
        },
    ))
}

fn with_opcode(opcode: u8, r: InsnResult<'_, Operation>) -> InsnResult<'_, (u8, Operation)> {
    r.map(|(input, op)| (input, (opcode, op)))
}

/// Parse the instruction at the head of `input`, which starts at byte
/// `address` of the code array. Returns the opcode (the wrapped opcode for
/// `wide`) and the decoded operation.
pub fn instruction_parser(input: &[u8], address: u32) -> InsnResult<'_, (u8, Operation)> {
    use self::ValueKind::*;
    let (input, opcode) = be_u8(input)?;

    const LOAD_KINDS: [ValueKind; 5] = [Int, Long, Float, Double, Reference];
    const ARRAY_KINDS: [ArrayKind; 8] = [
        ArrayKind::Int,
        ArrayKind::Long,
        ArrayKind::Float,
        ArrayKind::Double,
        ArrayKind::Reference,
        ArrayKind::Byte,
        ArrayKind::Char,
        ArrayKind::Short,
    ];
    const ARITH: [ArithOp; 5] = [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div, ArithOp::Rem];
    const CMP: [CmpOp; 6] = [CmpOp::Eq, CmpOp::Ne, CmpOp::Lt, CmpOp::Ge, CmpOp::Gt, CmpOp::Le];

    match opcode {
        0x00 => Ok((input, (opcode, Operation::Nop))),
        0x01 => Ok((input, (opcode, Operation::AconstNull))),
        0x02..=0x08 => Ok((input, (opcode, Operation::Iconst(opcode as i32 - 3)))),
        0x09 | 0x0a => Ok((input, (opcode, Operation::Lconst((opcode - 0x09) as i64)))),
        0x0b..=0x0d => Ok((input, (opcode, Operation::Fconst((opcode - 0x0b) as f32)))),
        0x0e | 0x0f => Ok((input, (opcode, Operation::Dconst((opcode - 0x0e) as f64)))),
        0x10 => {
            let (input, v) = be_i8(input)?;
            Ok((input, (opcode, Operation::Iconst(v as i32))))
        }
        0x11 => {
            let (input, v) = be_i16(input)?;
            Ok((input, (opcode, Operation::Iconst(v as i32))))
        }
        0x12 => {
            let (input, index) = be_u8(input)?;
            Ok((input, (opcode, Operation::Ldc(index as u16))))
        }
        0x13 => {
            let (input, index) = be_u16(input)?;
            Ok((input, (opcode, Operation::Ldc(index))))
        }
        0x14 => {
            let (input, index) = be_u16(input)?;
            Ok((input, (opcode, Operation::Ldc2W(index))))
        }
        0x15..=0x19 => with_opcode(opcode, local(input, LOAD_KINDS[(opcode - 0x15) as usize], false)),
        0x1a..=0x2d => {
            let n = opcode - 0x1a;
            Ok((input, (opcode, Operation::Load(LOAD_KINDS[(n / 4) as usize], (n % 4) as u16))))
        }
        0x2e..=0x35 => Ok((input, (opcode, Operation::ArrayLoad(ARRAY_KINDS[(opcode - 0x2e) as usize])))),
        0x36..=0x3a => with_opcode(opcode, local(input, LOAD_KINDS[(opcode - 0x36) as usize], true)),
        0x3b..=0x4e => {
            let n = opcode - 0x3b;
            Ok((input, (opcode, Operation::Store(LOAD_KINDS[(n / 4) as usize], (n % 4) as u16))))
        }
        0x4f..=0x56 => Ok((input, (opcode, Operation::ArrayStore(ARRAY_KINDS[(opcode - 0x4f) as usize])))),
        0x57 => Ok((input, (opcode, Operation::Pop))),
        0x58 => Ok((input, (opcode, Operation::Pop2))),
        0x59 => Ok((input, (opcode, Operation::Dup))),
        0x5a => Ok((input, (opcode, Operation::DupX1))),
        0x5b => Ok((input, (opcode, Operation::DupX2))),
        0x5c => Ok((input, (opcode, Operation::Dup2))),
        0x5d => Ok((input, (opcode, Operation::Dup2X1))),
        0x5e => Ok((input, (opcode, Operation::Dup2X2))),
        0x5f => Ok((input, (opcode, Operation::Swap))),
        0x60..=0x73 => {
            let n = opcode - 0x60;
            Ok((input, (opcode, Operation::Arith(LOAD_KINDS[(n % 4) as usize], ARITH[(n / 4) as usize]))))
        }
        0x74..=0x77 => Ok((input, (opcode, Operation::Neg(LOAD_KINDS[(opcode - 0x74) as usize])))),
        0x78..=0x83 => {
            let n = opcode - 0x78;
            let ops = [
                ArithOp::Shl,
                ArithOp::Shr,
                ArithOp::Ushr,
                ArithOp::And,
                ArithOp::Or,
                ArithOp::Xor,
            ];
            let kind = if n % 2 == 0 { Int } else { Long };
            Ok((input, (opcode, Operation::Arith(kind, ops[(n / 2) as usize]))))
        }
        0x84 => {
            let (input, index) = be_u8(input)?;
            let (input, value) = be_i8(input)?;
            Ok((
                input,
                (
                    opcode,
                    Operation::Iinc {
                        index: index as u16,
                        value: value as i16,
                    },
                ),
            ))
        }
        0x85..=0x90 => {
            let (from, to) = match opcode {
                0x85 => (Int, Long),
                0x86 => (Int, Float),
                0x87 => (Int, Double),
                0x88 => (Long, Int),
                0x89 => (Long, Float),
                0x8a => (Long, Double),
                0x8b => (Float, Int),
                0x8c => (Float, Long),
                0x8d => (Float, Double),
                0x8e => (Double, Int),
                0x8f => (Double, Long),
                _ => (Double, Float),
            };
            Ok((input, (opcode, Operation::Convert { from, to })))
        }
        0x91 => Ok((input, (opcode, Operation::Narrow(NarrowKind::Byte)))),
        0x92 => Ok((input, (opcode, Operation::Narrow(NarrowKind::Char)))),
        0x93 => Ok((input, (opcode, Operation::Narrow(NarrowKind::Short)))),
        0x94 => Ok((input, (opcode, Operation::Lcmp))),
        0x95 => Ok((input, (opcode, Operation::Fcmp { nan_greater: false }))),
        0x96 => Ok((input, (opcode, Operation::Fcmp { nan_greater: true }))),
        0x97 => Ok((input, (opcode, Operation::Dcmp { nan_greater: false }))),
        0x98 => Ok((input, (opcode, Operation::Dcmp { nan_greater: true }))),
        0x99..=0x9e => {
            let (input, t) = branch16(input, address)?;
            Ok((input, (opcode, Operation::IfZero(CMP[(opcode - 0x99) as usize], t))))
        }
        0x9f..=0xa4 => {
            let (input, t) = branch16(input, address)?;
            Ok((input, (opcode, Operation::IfIcmp(CMP[(opcode - 0x9f) as usize], t))))
        }
        0xa5 | 0xa6 => {
            let (input, t) = branch16(input, address)?;
            Ok((input, (opcode, Operation::IfAcmp(CMP[(opcode - 0xa5) as usize], t))))
        }
        0xa7 => {
            let (input, t) = branch16(input, address)?;
            Ok((input, (opcode, Operation::Goto(t))))
        }
        0xa8 => {
            let (input, t) = branch16(input, address)?;
            Ok((input, (opcode, Operation::Jsr(t))))
        }
        0xa9 => {
            let (input, index) = be_u8(input)?;
            Ok((input, (opcode, Operation::Ret(index as u16))))
        }
        0xaa => with_opcode(opcode, table_switch(input, address)),
        0xab => with_opcode(opcode, lookup_switch(input, address)),
        0xac..=0xb0 => Ok((input, (opcode, Operation::Return(Some(LOAD_KINDS[(opcode - 0xac) as usize]))))),
        0xb1 => Ok((input, (opcode, Operation::Return(None)))),
        0xb2..=0xb8 => {
            let (input, index) = be_u16(input)?;
            let op = match opcode {
                0xb2 => Operation::GetStatic(index),
                0xb3 => Operation::PutStatic(index),
                0xb4 => Operation::GetField(index),
                0xb5 => Operation::PutField(index),
                0xb6 => Operation::InvokeVirtual(index),
                0xb7 => Operation::InvokeSpecial(index),
                _ => Operation::InvokeStatic(index),
            };
            Ok((input, (opcode, op)))
        }
        0xb9 => {
            let (input, index) = be_u16(input)?;
            let (input, count) = be_u8(input)?;
            let (input, _) = be_u8(input)?;
            Ok((input, (opcode, Operation::InvokeInterface { index, count })))
        }
        0xba => {
            let (input, index) = be_u16(input)?;
            let (input, _) = be_u16(input)?;
            Ok((input, (opcode, Operation::InvokeDynamic(index))))
        }
        0xbb => {
            let (input, index) = be_u16(input)?;
            Ok((input, (opcode, Operation::New(index))))
        }
        0xbc => {
            let (input, atype) = be_u8(input)?;
            Ok((input, (opcode, Operation::NewArray(atype))))
        }
        0xbd => {
            let (input, index) = be_u16(input)?;
            Ok((input, (opcode, Operation::ANewArray(index))))
        }
        0xbe => Ok((input, (opcode, Operation::ArrayLength))),
        0xbf => Ok((input, (opcode, Operation::AThrow))),
        0xc0 => {
            let (input, index) = be_u16(input)?;
            Ok((input, (opcode, Operation::CheckCast(index))))
        }
        0xc1 => {
            let (input, index) = be_u16(input)?;
            Ok((input, (opcode, Operation::InstanceOf(index))))
        }
        0xc2 => Ok((input, (opcode, Operation::MonitorEnter))),
        0xc3 => Ok((input, (opcode, Operation::MonitorExit))),
        0xc4 => wide(input),
        0xc5 => {
            let (input, index) = be_u16(input)?;
            let (input, dimensions) = be_u8(input)?;
            Ok((input, (opcode, Operation::MultiANewArray { index, dimensions })))
        }
        0xc6 => {
            let (input, t) = branch16(input, address)?;
            Ok((input, (opcode, Operation::IfNull(t))))
        }
        0xc7 => {
            let (input, t) = branch16(input, address)?;
            Ok((input, (opcode, Operation::IfNonNull(t))))
        }
        0xc8 => {
            let (input, t) = branch32(input, address)?;
            Ok((input, (opcode, Operation::Goto(t))))
        }
        0xc9 => {
            let (input, t) = branch32(input, address)?;
            Ok((input, (opcode, Operation::Jsr(t))))
        }
        _ => Err(Err::Failure(InsnParseError::UnknownOpcode(opcode))),
    }
}
