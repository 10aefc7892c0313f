use std::collections::{BTreeMap, BTreeSet};

use crate::attribute_info::CodeAttribute;
use crate::code_attribute::{Instruction, Operation};
use crate::constant_info::ConstantPool;
use crate::error::{DecompileError, DecompileResult};

use super::cfg_types::*;

/// Resolve the exception table against the pool, keeping table order.
pub fn exception_edges(
    code_attr: &CodeAttribute,
    const_pool: &ConstantPool,
) -> DecompileResult<Vec<ExceptionEdge>> {
    code_attr
        .exception_table
        .iter()
        .map(|e| {
            if e.handler_pc as u32 >= code_attr.code_length {
                return Err(DecompileError::MalformedHandler {
                    handler_pc: e.handler_pc as u32,
                });
            }
            let catch_type = if e.catch_type == 0 {
                None
            } else {
                Some(const_pool.class_name(e.catch_type)?.to_string())
            };
            Ok(ExceptionEdge {
                start_pc: e.start_pc as u32,
                end_pc: e.end_pc as u32,
                handler_block: e.handler_pc as u32,
                catch_type,
            })
        })
        .collect()
}

/// Build a control flow graph from decoded instructions.
///
/// Leaders are the entry, every branch target, the instruction after any
/// branch, return, throw or switch, the bounds of each protected range,
/// each handler, and `extra_leaders` requested by handler classification.
pub fn build_cfg(
    instructions: &[Instruction],
    exception_edges: Vec<ExceptionEdge>,
    extra_leaders: &BTreeSet<u32>,
) -> ControlFlowGraph {
    if instructions.is_empty() {
        return ControlFlowGraph {
            blocks: BTreeMap::new(),
            entry: 0,
            exception_edges,
        };
    }

    // Step 1: Identify block leaders
    let mut leaders = BTreeSet::new();
    leaders.insert(0u32);
    for ex in &exception_edges {
        leaders.insert(ex.start_pc);
        leaders.insert(ex.end_pc);
        leaders.insert(ex.handler_block);
    }
    leaders.extend(extra_leaders.iter().copied());

    for instr in instructions {
        let op = &instr.op;
        leaders.extend(op.branch_targets());
        if op.ends_flow() || op.is_conditional_branch() || matches!(op, Operation::Jsr(_)) {
            leaders.insert(instr.next_offset());
        }
    }

    // Step 2: Build basic blocks
    let mut blocks = BTreeMap::new();
    let mut current: Vec<Instruction> = Vec::new();
    for (i, instr) in instructions.iter().enumerate() {
        current.push(instr.clone());
        let next = instructions.get(i + 1).map(|n| n.offset);
        let at_boundary = match next {
            Some(n) => leaders.contains(&n),
            None => true,
        };
        if !at_boundary {
            continue;
        }
        let block_instrs = std::mem::take(&mut current);
        let id = block_instrs[0].offset;
        let terminator = build_terminator(instr);
        blocks.insert(
            id,
            BasicBlock {
                id,
                instructions: block_instrs,
                terminator,
            },
        );
    }

    log::debug!(
        "built CFG: {} blocks, {} exception edges",
        blocks.len(),
        exception_edges.len()
    );

    ControlFlowGraph {
        blocks,
        entry: 0,
        exception_edges,
    }
}

fn build_terminator(last: &Instruction) -> Terminator {
    let next = last.next_offset();
    match &last.op {
        Operation::Goto(target) => Terminator::Goto { target: *target },
        Operation::IfZero(_, target)
        | Operation::IfIcmp(_, target)
        | Operation::IfAcmp(_, target)
        | Operation::IfNull(target)
        | Operation::IfNonNull(target) => Terminator::ConditionalBranch {
            if_true: *target,
            if_false: next,
        },
        Operation::TableSwitch {
            default,
            low,
            targets,
            ..
        } => Terminator::Switch {
            default: *default,
            cases: targets
                .iter()
                .enumerate()
                .map(|(i, t)| (low.wrapping_add(i as i32), *t))
                .collect(),
        },
        Operation::LookupSwitch { default, pairs } => Terminator::Switch {
            default: *default,
            cases: pairs.clone(),
        },
        Operation::Return(_) => Terminator::Return,
        Operation::AThrow => Terminator::Throw,
        Operation::Jsr(target) => Terminator::Jsr {
            target: *target,
            return_addr: next,
        },
        Operation::Ret(_) => Terminator::Ret,
        _ => Terminator::FallThrough { target: next },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::decode_all;

    #[test]
    fn test_blocks_split_at_branches() {
        // 0: iload_0; 1: ifeq 8; 4: iconst_1; 5: ireturn; 6: nop; 7: nop; 8: iconst_0; 9: ireturn
        let code = [0x1a, 0x99, 0x00, 0x07, 0x04, 0xac, 0x00, 0x00, 0x03, 0xac];
        let insns = decode_all(&code).unwrap();
        let cfg = build_cfg(&insns, Vec::new(), &BTreeSet::new());
        assert_eq!(cfg.blocks.keys().copied().collect::<Vec<_>>(), vec![0, 4, 6, 8]);
        assert_eq!(
            cfg.blocks[&0].terminator,
            Terminator::ConditionalBranch {
                if_true: 8,
                if_false: 4
            }
        );
        assert_eq!(cfg.blocks[&4].terminator, Terminator::Return);
        // 6 is dead code and never reached.
        assert_eq!(cfg.reverse_postorder(), vec![0, 4, 8]);
    }

    #[test]
    fn test_loop_detection() {
        // 0: iconst_0; 1: istore_1; 2: iload_1; 3: bipush 10; 5: if_icmpge 14;
        // 8: iinc 1 1; 11: goto 2; 14: return
        let code = [
            0x03, 0x3c, 0x1b, 0x10, 0x0a, 0xa2, 0x00, 0x09, 0x84, 0x01, 0x01, 0xa7, 0xff, 0xf7,
            0xb1,
        ];
        let insns = decode_all(&code).unwrap();
        let cfg = build_cfg(&insns, Vec::new(), &BTreeSet::new());
        let loops = cfg.flow_graph().natural_loops();
        assert_eq!(loops.len(), 1);
        let info = &loops[&2];
        assert_eq!(info.latches, vec![8]);
        assert_eq!(info.body, BTreeSet::from([2, 8]));
    }

    #[test]
    fn test_handlers_are_reachable() {
        // 0: aload_0; 1: athrow; 2: astore_1; 3: return  with [0,2) -> 2
        let code = [0x2a, 0xbf, 0x4c, 0xb1];
        let insns = decode_all(&code).unwrap();
        let edges = vec![ExceptionEdge {
            start_pc: 0,
            end_pc: 2,
            handler_block: 2,
            catch_type: None,
        }];
        let cfg = build_cfg(&insns, edges, &BTreeSet::new());
        assert_eq!(cfg.handlers_of(0), vec![2]);
        assert_eq!(cfg.reverse_postorder(), vec![0, 2]);
        let doms = cfg.flow_graph().dominators(&cfg.reverse_postorder());
        assert!(dominates(&doms, 0, 2));
    }
}
