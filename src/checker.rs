//! Post-allocation validation: walks the rewritten sequence and verifies
//! the structural invariants the allocator promises, without trusting the
//! allocator's own bookkeeping. Errors are collected rather than panicked
//! so embedders and tests can report all of them at once.

use rustc_hash::FxHashMap;
use std::fmt;

use crate::allocation_data::{AllocationData, SpillOperand};
use crate::data_structures::{BlockIx, InstIx, VirtualReg};
use crate::instructions::{GapPosition, InstructionOperand, OperandRef};

#[derive(Debug)]
pub enum CheckerError {
    /// An operand survived allocation in unallocated or pending form.
    UnresolvedOperand {
        slot: OperandRef,
        operand: InstructionOperand,
    },
    /// Two virtual registers occupy the same spill slot at the same
    /// instruction.
    SpillSlotConflict {
        instr: InstIx,
        stack_slot: i32,
        first: VirtualReg,
        second: VirtualReg,
    },
    /// A spilled heap reference is live across a safepoint whose reference
    /// map does not list its slot.
    MissingReference {
        instr: InstIx,
        vreg: VirtualReg,
        stack_slot: i32,
    },
}

impl fmt::Display for CheckerError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CheckerError::UnresolvedOperand { slot, operand } => {
                write!(fmt, "unresolved operand {:?} at {:?}", operand, slot)
            }
            CheckerError::SpillSlotConflict {
                instr,
                stack_slot,
                first,
                second,
            } => write!(
                fmt,
                "spill slot S{} holds both {:?} and {:?} at {:?}",
                stack_slot, first, second, instr
            ),
            CheckerError::MissingReference {
                instr,
                vreg,
                stack_slot,
            } => write!(
                fmt,
                "reference map at {:?} is missing {:?} (slot S{})",
                instr, vreg, stack_slot
            ),
        }
    }
}

/// Check the allocated sequence. Call after the driver has run all phases.
pub fn check_allocation(data: &AllocationData) -> Result<(), Vec<CheckerError>> {
    let mut errors = Vec::new();
    check_operands_resolved(data, &mut errors);
    check_spill_slot_occupancy(data, &mut errors);
    check_reference_maps(data, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn resolved(operand: InstructionOperand) -> bool {
    operand.is_allocated() || operand.is_constant()
}

fn check_operands_resolved(data: &AllocationData, errors: &mut Vec<CheckerError>) {
    let code = data.code();
    for instr_number in 0..code.instruction_count() {
        let instr_index = InstIx::new(instr_number);
        let instr = code.instruction_at(instr_index);
        let mut slots: Vec<OperandRef> = Vec::new();
        for i in 0..instr.output_count() {
            slots.push(OperandRef::Output {
                instr: instr_index,
                index: i,
            });
        }
        for i in 0..instr.input_count() {
            slots.push(OperandRef::Input {
                instr: instr_index,
                index: i,
            });
        }
        for i in 0..instr.temp_count() {
            slots.push(OperandRef::Temp {
                instr: instr_index,
                index: i,
            });
        }
        for &pos in &[GapPosition::Start, GapPosition::End] {
            for i in 0..code.gap_move_count(instr_index, pos) {
                slots.push(OperandRef::MoveSource {
                    instr: instr_index,
                    pos,
                    index: i,
                });
                slots.push(OperandRef::MoveDestination {
                    instr: instr_index,
                    pos,
                    index: i,
                });
            }
        }
        for slot in slots {
            let operand = code.operand(slot);
            if !resolved(operand) {
                errors.push(CheckerError::UnresolvedOperand { slot, operand });
            }
        }
    }
}

fn spilled_to_stack(data: &AllocationData) -> Vec<(VirtualReg, i32)> {
    data.spilled_vregs()
        .into_iter()
        .filter_map(|vreg| match data.vreg_data(vreg).spill_operand() {
            SpillOperand::Allocated(allocated) if allocated.is_stack_slot() => {
                Some((vreg, allocated.index))
            }
            _ => None,
        })
        .collect()
}

fn check_spill_slot_occupancy(data: &AllocationData, errors: &mut Vec<CheckerError>) {
    let spilled = spilled_to_stack(data);
    let code = data.code();
    for instr_number in 0..code.instruction_count() {
        let instr_index = InstIx::new(instr_number);
        let block: BlockIx = code.instruction_at(instr_index).block();
        let mut occupants: FxHashMap<i32, VirtualReg> = FxHashMap::default();
        for &(vreg, stack_slot) in &spilled {
            let vreg_data = data.vreg_data(vreg);
            if !vreg_data.has_spill_range() {
                continue;
            }
            if !vreg_data
                .spill_range()
                .is_live_at(instr_index, block, &data.block_states)
            {
                continue;
            }
            if let Some(&first) = occupants.get(&stack_slot) {
                errors.push(CheckerError::SpillSlotConflict {
                    instr: instr_index,
                    stack_slot,
                    first,
                    second: vreg,
                });
            } else {
                occupants.insert(stack_slot, vreg);
            }
        }
    }
}

fn check_reference_maps(data: &AllocationData, errors: &mut Vec<CheckerError>) {
    let code = data.code();
    for (vreg, stack_slot) in spilled_to_stack(data) {
        if !code.is_reference(vreg) {
            continue;
        }
        let vreg_data = data.vreg_data(vreg);
        if !vreg_data.has_spill_range() {
            continue;
        }
        for &instr_index in &data.reference_map_instructions {
            let block = code.instruction_at(instr_index).block();
            if !vreg_data
                .spill_range()
                .is_live_at(instr_index, block, &data.block_states)
            {
                continue;
            }
            let recorded = code
                .instruction_at(instr_index)
                .reference_map()
                .map_or(false, |map| {
                    map.reference_operands()
                        .iter()
                        .any(|operand| operand.is_stack_slot() && operand.index == stack_slot)
                });
            if !recorded {
                errors.push(CheckerError::MissingReference {
                    instr: instr_index,
                    vreg,
                    stack_slot,
                });
            }
        }
    }
}
