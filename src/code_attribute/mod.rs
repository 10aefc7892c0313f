//! Bytecode instruction decoding.

mod parser;
mod types;

pub use self::parser::*;
pub use self::types::*;

use crate::error::{DecodeError, DecodeResult};

/// Decode the instruction starting at `offset`, returning it with the offset
/// of the instruction that follows.
///
/// Never reads past `code.len()`; branch targets outside the code array are
/// rejected so later passes can index by target without checking.
pub fn decode(code: &[u8], offset: u32) -> DecodeResult<(Instruction, u32)> {
    let code_length = code.len() as u32;
    if offset >= code_length {
        return Err(DecodeError::OffsetOutOfRange {
            offset,
            code_length,
        });
    }
    let input = &code[offset as usize..];
    let (rest, (opcode, op)) = instruction_parser(input, offset).map_err(|e| {
        let detail = match e {
            nom::Err::Error(d) | nom::Err::Failure(d) => d,
            nom::Err::Incomplete(_) => InsnParseError::Truncated,
        };
        match detail {
            InsnParseError::Truncated => DecodeError::Truncated { offset },
            InsnParseError::UnknownOpcode(opcode) => DecodeError::UnknownOpcode { offset, opcode },
            InsnParseError::InvalidSwitch { low, high } => DecodeError::InvalidSwitch { offset, low, high },
            InsnParseError::InvalidWide(opcode) => DecodeError::InvalidWide { offset, opcode },
            InsnParseError::NegativeTarget(target) => DecodeError::BadBranchTarget { offset, target },
        }
    })?;
    let length = (input.len() - rest.len()) as u32;
    if let Some(&target) = op.branch_targets().iter().find(|&&t| t >= code_length) {
        return Err(DecodeError::BadBranchTarget {
            offset,
            target: target as i64,
        });
    }
    let next = offset + length;
    Ok((
        Instruction {
            offset,
            opcode,
            length,
            op,
        },
        next,
    ))
}

/// Decode a whole code array front to back.
pub fn decode_all(code: &[u8]) -> DecodeResult<Vec<Instruction>> {
    let mut out = Vec::new();
    let mut offset = 0u32;
    while (offset as usize) < code.len() {
        let (insn, next) = decode(code, offset)?;
        out.push(insn);
        offset = next;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `nops` no-ops, then a tableswitch over `cases` entries, then `return`.
    fn table_switch_code(nops: usize, cases: i32) -> Vec<u8> {
        let mut code = vec![0x00; nops];
        let at = code.len();
        code.push(0xaa);
        while code.len() % 4 != 0 {
            code.push(0);
        }
        let end = at as i32 + (code.len() - at) as i32 + 12 + 4 * cases;
        let rel = end - at as i32;
        code.extend_from_slice(&rel.to_be_bytes());
        code.extend_from_slice(&10i32.to_be_bytes());
        code.extend_from_slice(&(10 + cases - 1).to_be_bytes());
        for _ in 0..cases {
            code.extend_from_slice(&rel.to_be_bytes());
        }
        code.push(0xb1);
        code
    }

    fn lookup_switch_code(nops: usize, pairs: i32) -> Vec<u8> {
        let mut code = vec![0x00; nops];
        let at = code.len();
        code.push(0xab);
        while code.len() % 4 != 0 {
            code.push(0);
        }
        let end = at as i32 + (code.len() - at) as i32 + 8 + 8 * pairs;
        let rel = end - at as i32;
        code.extend_from_slice(&rel.to_be_bytes());
        code.extend_from_slice(&pairs.to_be_bytes());
        for k in 0..pairs {
            code.extend_from_slice(&(k * 3).to_be_bytes());
            code.extend_from_slice(&rel.to_be_bytes());
        }
        code.push(0xb1);
        code
    }

    #[test]
    fn test_table_switch_padding_and_sizes() {
        for nops in 0..4 {
            for cases in [1, 2, 7] {
                let code = table_switch_code(nops, cases);
                let (insn, next) = decode(&code, nops as u32).unwrap();
                let pad = (4 - (nops + 1) % 4) % 4;
                assert_eq!(insn.length as usize, 1 + pad + 12 + 4 * cases as usize);
                assert_eq!(next as usize, code.len() - 1);
                let (ret, _) = decode(&code, next).unwrap();
                assert_eq!(ret.op, Operation::Return(None));
                match insn.op {
                    Operation::TableSwitch {
                        default, targets, ..
                    } => {
                        assert_eq!(default, next);
                        assert_eq!(targets.len(), cases as usize);
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_lookup_switch_padding_and_sizes() {
        for nops in 0..4 {
            for pairs in [0, 1, 5] {
                let code = lookup_switch_code(nops, pairs);
                let (insn, next) = decode(&code, nops as u32).unwrap();
                let pad = (4 - (nops + 1) % 4) % 4;
                assert_eq!(insn.length as usize, 1 + pad + 8 + 8 * pairs as usize);
                assert_eq!(next as usize, code.len() - 1);
                let all = decode_all(&code).unwrap();
                assert_eq!(all.len(), nops + 2);
            }
        }
    }

    #[test]
    fn test_wide_lengths() {
        let code = [0xc4, 0x84, 0x01, 0x00, 0xff, 0xff, 0xc4, 0x15, 0x01, 0x00, 0xb1];
        let (iinc, next) = decode(&code, 0).unwrap();
        assert_eq!(iinc.length, 6);
        assert_eq!(
            iinc.op,
            Operation::Iinc {
                index: 256,
                value: -1
            }
        );
        let (load, next) = decode(&code, next).unwrap();
        assert_eq!(load.length, 4);
        assert_eq!(load.op, Operation::Load(ValueKind::Int, 256));
        assert_eq!(next, 10);
    }

    #[test]
    fn test_invalid_wide_target() {
        let code = [0xc4, 0x60, 0x00, 0x00];
        assert_eq!(
            decode(&code, 0),
            Err(DecodeError::InvalidWide {
                offset: 0,
                opcode: 0x60
            })
        );
    }

    #[test]
    fn test_short_forms_and_branches() {
        // iload_2, bipush -3, if_icmplt -3, return
        let code = [0x1c, 0x10, 0xfd, 0xa1, 0xff, 0xfd, 0xb1];
        let all = decode_all(&code).unwrap();
        assert_eq!(all[0].op, Operation::Load(ValueKind::Int, 2));
        assert_eq!(all[1].op, Operation::Iconst(-3));
        assert_eq!(all[2].op, Operation::IfIcmp(CmpOp::Lt, 0));
        assert_eq!(all[2].offset, 3);
        assert_eq!(all[3].offset, 6);
    }

    #[test]
    fn test_out_of_range_and_truncated() {
        let code = [0x11, 0x00];
        assert_eq!(
            decode(&code, 5),
            Err(DecodeError::OffsetOutOfRange {
                offset: 5,
                code_length: 2
            })
        );
        assert_eq!(decode(&code, 0), Err(DecodeError::Truncated { offset: 0 }));
        assert_eq!(
            decode(&[0xa7, 0x00, 0x40], 0),
            Err(DecodeError::BadBranchTarget {
                offset: 0,
                target: 0x40
            })
        );
        assert_eq!(
            decode(&[0xcb], 0),
            Err(DecodeError::UnknownOpcode {
                offset: 0,
                opcode: 0xcb
            })
        );
    }

    #[test]
    fn test_table_switch_rejects_inverted_bounds() {
        let mut code = vec![0xaa, 0, 0, 0];
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&5i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        assert_eq!(
            decode(&code, 0),
            Err(DecodeError::InvalidSwitch {
                offset: 0,
                low: 5,
                high: 1
            })
        );
    }
}
