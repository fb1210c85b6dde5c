//! Fills in the reference maps of safepoint instructions with the stack
//! slots of spilled heap references, so the garbage collector can find (and
//! update) them while the frame is on the stack.

use log::trace;

use crate::allocation_data::{AllocationData, SpillOperand};

/// For every spilled reference-typed virtual register with a resolved stack
/// slot, record that slot in each safepoint whose instruction lies inside
/// the spill range and whose block the spilled value is live in.
pub fn populate_reference_maps(data: &mut AllocationData) {
    for vreg in data.spilled_vregs() {
        if !data.vreg_data(vreg).has_allocated_spill_operand() {
            continue;
        }
        if !data.code.is_reference(vreg) {
            continue;
        }
        let allocated = match data.vreg_data(vreg).spill_operand() {
            SpillOperand::Allocated(allocated) => allocated,
            _ => continue,
        };
        debug_assert!(allocated.is_stack_slot());
        let spill_range = *data.vreg_data(vreg).spill_range();
        let live_range = *spill_range.live_range();

        for i in 0..data.reference_map_instructions.len() {
            let instr_index = data.reference_map_instructions[i];
            if !live_range.contains(instr_index) {
                continue;
            }
            let block = data.code.instruction_at(instr_index).block();
            debug_assert!(data.code.instruction_at(instr_index).has_reference_map());
            if spill_range.is_live_at(instr_index, block, &data.block_states) {
                trace!("record {:?} spill slot in reference map at {:?}", vreg, instr_index);
                data.code
                    .instruction_at_mut(instr_index)
                    .reference_map_mut()
                    .expect("safepoint without reference map")
                    .record_reference(allocated);
            }
        }
    }
}
