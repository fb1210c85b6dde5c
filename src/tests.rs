//! End-to-end allocation scenarios over small hand-built sequences. Every
//! test runs the full pipeline and then the checker, before making precise
//! assertions about the rewritten operands and inserted gap moves; register
//! choice is deterministic (lowest free index first), so exact registers
//! can be asserted.

use crate::allocation_data::AllocationData;
use crate::checker::check_allocation;
use crate::data_structures::{BlockIx, InstIx, VirtualReg};
use crate::instructions::{
    AllocatedOperand, Frame, GapPosition, Instruction, InstructionOperand, InstructionSequence,
    InstructionSequenceBuilder, MoveOperands, OperandPolicy, OperandRef, RegisterConfiguration,
    TickCounter, UnallocatedOperand,
};
use crate::mid_tier::MidTierRegisterAllocator;
use crate::run_allocation;

use crate::instructions::MachineRepresentation::{Float64, Tagged, Word64};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config(num_general: usize) -> RegisterConfiguration {
    RegisterConfiguration::new(
        num_general,
        (0..num_general as u8).collect(),
        2,
        vec![0, 1],
    )
}

/// Run the full pipeline plus the checker.
fn run(config: &RegisterConfiguration, code: &mut InstructionSequence) -> (Frame, TickCounter) {
    init_logging();
    let mut frame = Frame::new();
    let mut tick_counter = TickCounter::new();
    {
        let mut data = AllocationData::new(config, code, &mut frame, &mut tick_counter);
        run_allocation(&mut data);
        if let Err(errors) = check_allocation(&data) {
            let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            panic!("checker failed: {:#?}", rendered);
        }
    }
    (frame, tick_counter)
}

//=============================================================================
// Operand shorthands

fn reg_def(vreg: VirtualReg) -> InstructionOperand {
    InstructionOperand::Unallocated(UnallocatedOperand::new(OperandPolicy::Register, vreg))
}

fn any_def(vreg: VirtualReg) -> InstructionOperand {
    InstructionOperand::Unallocated(UnallocatedOperand::new(OperandPolicy::RegisterOrSlot, vreg))
}

fn same_as_input_def(vreg: VirtualReg) -> InstructionOperand {
    InstructionOperand::Unallocated(UnallocatedOperand::new(OperandPolicy::SameAsInput, vreg))
}

fn fixed_reg_def(vreg: VirtualReg, code: u8) -> InstructionOperand {
    InstructionOperand::Unallocated(UnallocatedOperand::new(
        OperandPolicy::FixedRegister(code),
        vreg,
    ))
}

fn const_def(vreg: VirtualReg) -> InstructionOperand {
    InstructionOperand::Constant(vreg)
}

fn reg_use(vreg: VirtualReg) -> InstructionOperand {
    InstructionOperand::Unallocated(
        UnallocatedOperand::new(OperandPolicy::Register, vreg).at_start(),
    )
}

fn any_use(vreg: VirtualReg) -> InstructionOperand {
    InstructionOperand::Unallocated(
        UnallocatedOperand::new(OperandPolicy::RegisterOrSlot, vreg).at_start(),
    )
}

fn slot_use(vreg: VirtualReg) -> InstructionOperand {
    InstructionOperand::Unallocated(UnallocatedOperand::new(OperandPolicy::Slot, vreg))
}

fn fixed_reg_use(vreg: VirtualReg, code: u8) -> InstructionOperand {
    InstructionOperand::Unallocated(
        UnallocatedOperand::new(OperandPolicy::FixedRegister(code), vreg).at_start(),
    )
}

fn fixed_slot_use(vreg: VirtualReg, slot: i32) -> InstructionOperand {
    InstructionOperand::Unallocated(UnallocatedOperand::new(OperandPolicy::FixedSlot(slot), vreg))
}

fn reg_temp(vreg: VirtualReg) -> InstructionOperand {
    InstructionOperand::Unallocated(UnallocatedOperand::new(OperandPolicy::Register, vreg))
}

fn instr(
    outputs: Vec<InstructionOperand>,
    inputs: Vec<InstructionOperand>,
) -> Instruction {
    Instruction::new(outputs, inputs, vec![])
}

//=============================================================================
// Assertion helpers

fn assert_reg(operand: InstructionOperand, code: u8) {
    match operand {
        InstructionOperand::Allocated(allocated) if allocated.is_register() => {
            assert_eq!(allocated.index, code as i32, "wrong register")
        }
        other => panic!("expected register R{}, got {:?}", code, other),
    }
}

fn stack_slot_of(operand: InstructionOperand) -> i32 {
    match operand {
        InstructionOperand::Allocated(allocated) if allocated.is_stack_slot() => allocated.index,
        other => panic!("expected a stack slot, got {:?}", other),
    }
}

fn moves_at(code: &InstructionSequence, index: InstIx, pos: GapPosition) -> &[MoveOperands] {
    code.instruction_at(index)
        .parallel_move(pos)
        .map(|moves| moves.as_slice())
        .unwrap_or(&[])
}

fn is_reg(operand: InstructionOperand, code: u8) -> bool {
    matches!(operand,
        InstructionOperand::Allocated(a) if a.is_register() && a.index == code as i32)
}

fn is_slot(operand: InstructionOperand, slot: i32) -> bool {
    matches!(operand,
        InstructionOperand::Allocated(a) if a.is_stack_slot() && a.index == slot)
}

//=============================================================================
// S1: straight-line code, two registers, no spills

#[test]
fn straight_line_add_of_constants_needs_no_spills() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v0 = builder.new_vreg(Word64);
    let v1 = builder.new_vreg(Word64);
    let v2 = builder.new_vreg(Word64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![const_def(v0)], vec![]));
    let i1 = builder.add_instruction(instr(vec![const_def(v1)], vec![]));
    let i2 = builder.add_instruction(instr(vec![reg_def(v2)], vec![reg_use(v0), reg_use(v1)]));
    let i3 = builder.add_instruction(instr(vec![], vec![reg_use(v2)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    assert_eq!(frame.spill_slot_count(), 0);
    // The add reads the two constants out of r0/r1 and defines into r0,
    // which the return then consumes.
    assert_reg(code.instruction_at(i2).input_at(0), 0);
    assert_reg(code.instruction_at(i2).input_at(1), 1);
    assert_reg(code.instruction_at(i2).output_at(0), 0);
    assert_reg(code.instruction_at(i3).input_at(0), 0);
    // Constant outputs stay constant operands; the values materialize via
    // gap moves right before their use.
    assert!(code.instruction_at(i0).output_at(0).is_constant());
    assert!(code.instruction_at(i1).output_at(0).is_constant());
    let moves = moves_at(&code, i2, GapPosition::End);
    assert_eq!(moves.len(), 2);
    assert!(moves
        .iter()
        .any(|m| m.source == InstructionOperand::Constant(v0) && is_reg(m.destination, 0)));
    assert!(moves
        .iter()
        .any(|m| m.source == InstructionOperand::Constant(v1) && is_reg(m.destination, 1)));
    // No safepoints, so no reference maps.
    for n in [i0, i1, i2, i3] {
        assert!(code.instruction_at(n).reference_map().is_none());
    }
}

//=============================================================================
// S2: three values live across two registers force exactly one spill

#[test]
fn register_pressure_spills_exactly_one_vreg() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v0 = builder.new_vreg(Word64);
    let v1 = builder.new_vreg(Word64);
    let v2 = builder.new_vreg(Word64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![reg_def(v0)], vec![]));
    let i1 = builder.add_instruction(instr(vec![reg_def(v1)], vec![]));
    let i2 = builder.add_instruction(instr(vec![reg_def(v2)], vec![]));
    let i3 = builder.add_instruction(instr(vec![], vec![reg_use(v2)]));
    let i4 = builder.add_instruction(instr(vec![], vec![reg_use(v0), reg_use(v1)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    // v0 has the earliest definition and loses its register to v2.
    assert_eq!(frame.spill_slot_count(), 1);
    assert_eq!(frame.spill_slot_width(0), 8);
    assert_reg(code.instruction_at(i0).output_at(0), 0);
    assert_reg(code.instruction_at(i1).output_at(0), 1);
    assert_reg(code.instruction_at(i2).output_at(0), 0);
    assert_reg(code.instruction_at(i3).input_at(0), 0);
    assert_reg(code.instruction_at(i4).input_at(0), 0);
    assert_reg(code.instruction_at(i4).input_at(1), 1);
    // Stored to the slot right after its definition...
    let stores = moves_at(&code, i1, GapPosition::Start);
    assert_eq!(stores.len(), 1);
    assert!(is_reg(stores[0].source, 0));
    assert!(is_slot(stores[0].destination, 0));
    // ...and reloaded right before the later use.
    let reloads = moves_at(&code, i4, GapPosition::End);
    assert_eq!(reloads.len(), 1);
    assert!(is_slot(reloads[0].source, 0));
    assert!(is_reg(reloads[0].destination, 0));
}

//=============================================================================
// S3: fixed-register input colliding with an existing allocation

#[test]
fn fixed_register_input_evicts_live_occupant() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v0 = builder.new_vreg(Word64);
    let v1 = builder.new_vreg(Word64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![reg_def(v0)], vec![]));
    let i1 = builder.add_instruction(instr(vec![reg_def(v1)], vec![]));
    let i2 = builder.add_instruction(instr(vec![], vec![fixed_reg_use(v0, 0), reg_use(v1)]));
    let i3 = builder.add_instruction(instr(vec![], vec![reg_use(v1)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    // v1 held r0 for its use at i3; the fixed constraint at i2 evicts it to
    // its spill slot, with a reload before i3.
    assert_eq!(frame.spill_slot_count(), 1);
    assert_reg(code.instruction_at(i2).input_at(0), 0);
    assert_reg(code.instruction_at(i2).input_at(1), 1);
    assert_reg(code.instruction_at(i3).input_at(0), 0);
    assert_reg(code.instruction_at(i0).output_at(0), 0);
    assert_reg(code.instruction_at(i1).output_at(0), 1);
    let stores = moves_at(&code, i2, GapPosition::Start);
    assert_eq!(stores.len(), 1);
    assert!(is_reg(stores[0].source, 1));
    assert!(is_slot(stores[0].destination, 0));
    let reloads = moves_at(&code, i3, GapPosition::End);
    assert_eq!(reloads.len(), 1);
    assert!(is_slot(reloads[0].source, 0));
    assert!(is_reg(reloads[0].destination, 0));
}

#[test]
fn fixed_register_input_spares_occupant_defined_by_same_instruction() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v0 = builder.new_vreg(Word64);
    let v2 = builder.new_vreg(Word64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![reg_def(v0)], vec![]));
    let i1 = builder.add_instruction(instr(vec![any_def(v2)], vec![fixed_reg_use(v0, 0)]));
    let i2 = builder.add_instruction(instr(vec![], vec![reg_use(v2)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    // r0 holds v2, but v2 is defined by i1 itself: the start-of-instruction
    // fixed use does not interfere with the end-of-instruction definition,
    // so nothing spills and both share r0.
    assert_eq!(frame.spill_slot_count(), 0);
    assert_reg(code.instruction_at(i0).output_at(0), 0);
    assert_reg(code.instruction_at(i1).input_at(0), 0);
    assert_reg(code.instruction_at(i1).output_at(0), 0);
    assert_reg(code.instruction_at(i2).input_at(0), 0);
    assert!(moves_at(&code, i1, GapPosition::Start).is_empty());
    assert!(moves_at(&code, i1, GapPosition::End).is_empty());
    assert!(moves_at(&code, i2, GapPosition::End).is_empty());
}

//=============================================================================
// S4: phi at a loop header; spill ranges must cover the whole loop

#[test]
fn loop_header_phi_spills_get_loop_wide_slots() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v0 = builder.new_vreg(Word64);
    let v_phi = builder.new_vreg(Word64);
    let v4 = builder.new_vreg(Word64);

    let b0 = builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![any_def(v0)], vec![]));
    let i1 = builder.add_instruction(instr(vec![], vec![]));
    builder.end_block(&[BlockIx::new(1)]);

    let b1 = builder.begin_block(Some(b0));
    builder.mark_loop_header(BlockIx::new(4));
    builder.add_phi(v_phi, &[v0, v4]);
    let i2 = builder.add_instruction(instr(vec![], vec![any_use(v_phi), any_use(v0)]));
    let _i3 = builder.add_instruction(instr(vec![], vec![]));
    builder.end_block(&[BlockIx::new(2)]);

    let b2 = builder.begin_block(Some(b1));
    let i4 = builder.add_instruction(instr(vec![any_def(v4)], vec![]));
    let _i5 = builder.add_instruction(instr(vec![], vec![]));
    builder.end_block(&[BlockIx::new(3), BlockIx::new(4)]);

    let _b3 = builder.begin_block(Some(b2));
    let i6 = builder.add_instruction(instr(vec![], vec![]));
    builder.end_block(&[b1]);

    let _b4 = builder.begin_block(Some(b2));
    let _i7 = builder.add_instruction(instr(vec![], vec![]));
    builder.end_block(&[]);

    let mut code = builder.finish();
    let (frame, tick_counter) = run(&config, &mut code);

    // One tick per block per pass.
    assert_eq!(tick_counter.ticks(), 10);

    // Everything lives in memory around the loop: v0 (live into the loop),
    // the phi, and the loop-defined v4. v0's range ends at its last read in
    // the header, but the loop fixup must keep its slot reserved for the
    // whole loop, so all three get distinct slots.
    assert_eq!(frame.spill_slot_count(), 3);
    let v0_slot = stack_slot_of(code.instruction_at(i0).output_at(0));
    let phi_slot = stack_slot_of(code.instruction_at(i2).input_at(0));
    let v4_slot = stack_slot_of(code.instruction_at(i4).output_at(0));
    assert_eq!(stack_slot_of(code.instruction_at(i2).input_at(1)), v0_slot);
    assert_ne!(v0_slot, phi_slot);
    assert_ne!(v0_slot, v4_slot);
    assert_ne!(phi_slot, v4_slot);

    // Each predecessor exit writes its phi input into the phi's slot.
    let entry_moves = moves_at(&code, i1, GapPosition::End);
    assert_eq!(entry_moves.len(), 1);
    assert!(is_slot(entry_moves[0].source, v0_slot));
    assert!(is_slot(entry_moves[0].destination, phi_slot));
    let backedge_moves = moves_at(&code, i6, GapPosition::End);
    assert_eq!(backedge_moves.len(), 1);
    assert!(is_slot(backedge_moves[0].source, v4_slot));
    assert!(is_slot(backedge_moves[0].destination, phi_slot));
}

//=============================================================================
// S5: same-as-input output forced to spill routes the input through the
// output's slot

#[test]
fn spilled_same_as_input_output_shares_slot_with_input() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v_in = builder.new_vreg(Word64);
    let v_out = builder.new_vreg(Word64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![reg_def(v_in)], vec![]));
    let i1 = builder.add_instruction(instr(vec![same_as_input_def(v_out)], vec![any_use(v_in)]));
    let i2 = builder.add_instruction(instr(vec![], vec![slot_use(v_out)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    // The slot-policy use spills v_out before its definition is seen, so
    // the same-as-input output lands in the slot, the input operand becomes
    // that same slot, and a gap move carries the input value into it.
    assert_eq!(frame.spill_slot_count(), 1);
    let out_slot = stack_slot_of(code.instruction_at(i1).output_at(0));
    assert_eq!(stack_slot_of(code.instruction_at(i1).input_at(0)), out_slot);
    assert_eq!(stack_slot_of(code.instruction_at(i2).input_at(0)), out_slot);
    assert_reg(code.instruction_at(i0).output_at(0), 0);
    let moves = moves_at(&code, i1, GapPosition::End);
    assert_eq!(moves.len(), 1);
    assert!(is_reg(moves[0].source, 0));
    assert!(is_slot(moves[0].destination, out_slot));
}

//=============================================================================
// S6: reference-typed spill across a safepoint

#[test]
fn spilled_reference_is_recorded_in_safepoint_map() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v0 = builder.new_vreg(Tagged);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![any_def(v0)], vec![]));
    let i1 = builder.add_instruction(
        Instruction::new(vec![], vec![], vec![])
            .set_clobbers_registers()
            .set_reference_map(),
    );
    let i2 = builder.add_instruction(instr(vec![], vec![any_use(v0)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    assert_eq!(frame.spill_slot_count(), 1);
    assert_eq!(frame.spill_slot_width(0), 8);
    let slot = stack_slot_of(code.instruction_at(i0).output_at(0));
    assert_eq!(stack_slot_of(code.instruction_at(i2).input_at(0)), slot);
    let map = code
        .instruction_at(i1)
        .reference_map()
        .expect("safepoint keeps its reference map");
    assert!(map
        .reference_operands()
        .iter()
        .any(|op| op.is_stack_slot() && op.index == slot && op.rep == Tagged));
}

//=============================================================================
// Further allocation behaviors

#[test]
fn fixed_output_register_moves_value_to_previously_chosen_register() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v0 = builder.new_vreg(Word64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![fixed_reg_def(v0, 1)], vec![]));
    let i1 = builder.add_instruction(instr(vec![], vec![reg_use(v0)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    // The use parked v0 in r0; the definition is pinned to r1, so a gap
    // move carries the output over.
    assert_eq!(frame.spill_slot_count(), 0);
    assert_reg(code.instruction_at(i0).output_at(0), 1);
    assert_reg(code.instruction_at(i1).input_at(0), 0);
    let moves = moves_at(&code, i1, GapPosition::Start);
    assert_eq!(moves.len(), 1);
    assert!(is_reg(moves[0].source, 1));
    assert!(is_reg(moves[0].destination, 0));
}

#[test]
fn fixed_slot_input_stores_through_gap_move() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v0 = builder.new_vreg(Word64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![reg_def(v0)], vec![]));
    let i1 = builder.add_instruction(instr(vec![], vec![fixed_slot_use(v0, 7)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    // The operand is pinned to frame slot 7; the value first goes to v0's
    // own spill slot after its definition, then into slot 7 in the gap.
    assert_eq!(frame.spill_slot_count(), 1);
    assert_eq!(stack_slot_of(code.instruction_at(i1).input_at(0)), 7);
    assert_reg(code.instruction_at(i0).output_at(0), 0);
    let stores = moves_at(&code, i1, GapPosition::Start);
    assert_eq!(stores.len(), 1);
    assert!(is_reg(stores[0].source, 0));
    assert!(is_slot(stores[0].destination, 0));
    let fills = moves_at(&code, i1, GapPosition::End);
    assert_eq!(fills.len(), 1);
    assert!(is_slot(fills[0].source, 0));
    assert!(is_slot(fills[0].destination, 7));
}

#[test]
fn temps_block_their_register_for_the_whole_instruction() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v0 = builder.new_vreg(Word64);
    let t = builder.new_vreg(Word64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![reg_def(v0)], vec![]));
    let i1 = builder.add_instruction(Instruction::new(vec![], vec![reg_use(v0)], vec![reg_temp(t)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    assert_eq!(frame.spill_slot_count(), 0);
    assert_reg(code.instruction_at(i1).temp_at(0), 0);
    assert_reg(code.instruction_at(i1).input_at(0), 1);
    assert_reg(code.instruction_at(i0).output_at(0), 1);
}

#[test]
fn general_and_double_files_are_independent() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let g = builder.new_vreg(Word64);
    let f = builder.new_vreg(Float64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![reg_def(g)], vec![]));
    let i1 = builder.add_instruction(instr(vec![reg_def(f)], vec![]));
    let i2 = builder.add_instruction(instr(vec![], vec![reg_use(g), reg_use(f)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    // Both files hand out their own register 0 without colliding.
    assert_reg(code.instruction_at(i0).output_at(0), 0);
    assert_reg(code.instruction_at(i1).output_at(0), 0);
    assert_reg(code.instruction_at(i2).input_at(0), 0);
    assert_reg(code.instruction_at(i2).input_at(1), 0);
    assert_eq!(
        code.instruction_at(i2).input_at(1).as_allocated().map(|a| a.rep),
        Some(Float64)
    );
    assert!(frame.allocated_registers().expect("recorded").contains(0));
    assert!(frame.allocated_double_registers().expect("recorded").contains(0));
}

#[test]
fn disjoint_spill_ranges_reuse_the_same_slot() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let va = builder.new_vreg(Word64);
    let vb = builder.new_vreg(Word64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![any_def(va)], vec![]));
    let _i1 = builder.add_instruction(instr(vec![], vec![slot_use(va)]));
    let i2 = builder.add_instruction(instr(vec![any_def(vb)], vec![]));
    let _i3 = builder.add_instruction(instr(vec![], vec![slot_use(vb)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let (frame, _) = run(&config, &mut code);

    // vb's range starts after va's ends, so packing hands it the same slot.
    assert_eq!(frame.spill_slot_count(), 1);
    assert_eq!(stack_slot_of(code.instruction_at(i0).output_at(0)), 0);
    assert_eq!(stack_slot_of(code.instruction_at(i2).output_at(0)), 0);
}

//=============================================================================
// Pass internals

#[test]
fn dominated_block_sets_are_transitive() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let b0 = builder.begin_block(None);
    builder.add_instruction(instr(vec![], vec![]));
    builder.end_block(&[BlockIx::new(1), BlockIx::new(2)]);
    let b1 = builder.begin_block(Some(b0));
    builder.add_instruction(instr(vec![], vec![]));
    builder.end_block(&[BlockIx::new(3)]);
    let b2 = builder.begin_block(Some(b0));
    builder.add_instruction(instr(vec![], vec![]));
    builder.end_block(&[BlockIx::new(3)]);
    let b3 = builder.begin_block(Some(b0));
    builder.add_instruction(instr(vec![], vec![]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let mut frame = Frame::new();
    let mut tick_counter = TickCounter::new();
    let mut data = AllocationData::new(&config, &mut code, &mut frame, &mut tick_counter);
    let mut allocator = MidTierRegisterAllocator::new(&data);
    allocator.define_outputs(&mut data);

    let dominated: Vec<Vec<usize>> = [b0, b1, b2, b3]
        .iter()
        .map(|&b| data.block_states[b].dominated_blocks().iter().collect())
        .collect();
    assert_eq!(dominated[0], vec![0, 1, 2, 3]);
    assert_eq!(dominated[1], vec![1]);
    assert_eq!(dominated[2], vec![2]);
    assert_eq!(dominated[3], vec![3]);
}

#[test]
fn pending_spill_operands_resolve_every_linked_slot() {
    let config = config(2);
    let mut builder = InstructionSequenceBuilder::new();
    let v = builder.new_vreg(Word64);
    builder.begin_block(None);
    let i0 = builder.add_instruction(instr(vec![any_def(v)], vec![]));
    let i1 = builder.add_instruction(instr(vec![], vec![any_use(v)]));
    let i2 = builder.add_instruction(instr(vec![], vec![any_use(v)]));
    builder.end_block(&[]);
    let mut code = builder.finish();

    let mut frame = Frame::new();
    let mut tick_counter = TickCounter::new();
    let mut data = AllocationData::new(&config, &mut code, &mut frame, &mut tick_counter);
    data.define_as_unallocated_operand(v, i0);

    let first = OperandRef::Input { instr: i1, index: 0 };
    let second = OperandRef::Input { instr: i2, index: 0 };
    data.spill_operand(v, first, i1);
    data.spill_operand(v, second, i2);
    assert!(data.code().operand(first).is_pending());
    assert!(data.code().operand(second).is_pending());
    assert!(data.vreg_data(v).has_pending_spill_operand());

    let slot = AllocatedOperand::stack_slot(3, Word64);
    data.allocate_pending_spill_operand(v, slot);
    assert_eq!(data.code().operand(first), InstructionOperand::Allocated(slot));
    assert_eq!(data.code().operand(second), InstructionOperand::Allocated(slot));
    assert!(data.vreg_data(v).has_allocated_spill_operand());
    let range = *data.vreg_data(v).spill_range().live_range();
    assert_eq!(range.start(), i0);
    assert_eq!(range.end(), i2);
}
