//! A mid-tier register allocator: a fast, single-pass assignment of an
//! unbounded set of virtual registers in a block-structured instruction
//! sequence onto two small fixed register files (general and
//! floating-point), inserting spill slots and parallel gap moves as operand
//! constraints demand.
//!
//! There is no up-front live-range analysis and no interference graph.
//! Each block is allocated independently, walking its instructions in
//! reverse; values live across block boundaries travel through their spill
//! slots. The result is deliberately cheaper-to-compute and cheaper-quality
//! code than a top-tier allocator would produce, which is the intended
//! trade-off for a mid compilation tier.
//!
//! The pipeline, driven by [`allocate_registers`]:
//!
//! 1. `DefineOutputs`: record every virtual register's definition site and
//!    flags, and compute the per-block dominated-block sets.
//! 2. `AllocateRegisters`: the reverse single pass over every block, one
//!    sub-allocator per register kind.
//! 3. `AllocateSpillSlots`: pack the spill ranges onto reusable frame
//!    slots.
//! 4. `PopulateReferenceMaps`: annotate safepoints with the slots of live
//!    spilled heap references.

pub mod allocation_data;
pub mod checker;
pub mod data_structures;
pub mod instructions;
pub mod mid_tier;
pub mod reference_maps;
pub mod register_state;
pub mod single_pass;
pub mod spill_slots;

#[cfg(test)]
mod tests;

pub use crate::allocation_data::AllocationData;
pub use crate::data_structures::{BitVec, BlockIx, InstIx, Range, VirtualReg};
pub use crate::instructions::{
    AllocatedOperand, Frame, GapPosition, Instruction, InstructionOperand, InstructionSequence,
    InstructionSequenceBuilder, LocationKind, MachineRepresentation, MoveOperands, OperandPolicy,
    OperandRef, ReferenceMap, RegisterConfiguration, RegisterKind, TickCounter,
    UnallocatedOperand,
};
pub use crate::mid_tier::MidTierRegisterAllocator;

/// Allocate registers for `code`, rewriting its operands in place, adding
/// gap moves, and assigning spill slots on `frame`.
pub fn allocate_registers(
    config: &RegisterConfiguration,
    code: &mut InstructionSequence,
    frame: &mut Frame,
    tick_counter: &mut TickCounter,
) {
    let mut data = AllocationData::new(config, code, frame, tick_counter);
    run_allocation(&mut data);
}

/// Run the four allocation phases over already-constructed pass state. Kept
/// separate from [`allocate_registers`] so the state can be inspected (or
/// [`checker::check_allocation`] run) afterwards.
pub fn run_allocation(data: &mut AllocationData) {
    let mut allocator = MidTierRegisterAllocator::new(data);
    allocator.define_outputs(data);
    allocator.allocate_registers(data);
    spill_slots::allocate_spill_slots(data);
    reference_maps::populate_reference_maps(data);
}
