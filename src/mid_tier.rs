//! The two-pass orchestrator: a DefineOutputs pass recording every virtual
//! register's definition (and the dominator sets), then the allocation pass
//! proper, driving one single-pass allocator per register kind over the
//! blocks in reverse order.

use log::debug;

use crate::allocation_data::AllocationData;
use crate::data_structures::{BlockIx, InstIx, VirtualReg};
use crate::instructions::{
    GapPosition, InstructionOperand, OperandPolicy, OperandRef, RegisterKind,
    UnallocatedOperand,
};
use crate::single_pass::SinglePassRegisterAllocator;

pub struct MidTierRegisterAllocator {
    general_reg_allocator: SinglePassRegisterAllocator,
    double_reg_allocator: SinglePassRegisterAllocator,
}

impl MidTierRegisterAllocator {
    pub fn new(data: &AllocationData) -> Self {
        let vreg_count = data.code().virtual_register_count();
        Self {
            general_reg_allocator: SinglePassRegisterAllocator::new(
                RegisterKind::General,
                data.config,
                vreg_count,
            ),
            double_reg_allocator: SinglePassRegisterAllocator::new(
                RegisterKind::Double,
                data.config,
                vreg_count,
            ),
        }
    }

    fn allocator_for(&mut self, data: &AllocationData, vreg: VirtualReg) -> &mut SinglePassRegisterAllocator {
        if data.representation_for(vreg).is_floating_point() {
            &mut self.double_reg_allocator
        } else {
            &mut self.general_reg_allocator
        }
    }

    //-------------------------------------------------------------------------
    // Pass A: define outputs

    /// Record each virtual register's definition and propagate the
    /// dominated-block sets. Blocks are walked last-to-first so that, when a
    /// block is visited, every block it dominates has already folded its set
    /// into it.
    pub fn define_outputs(&mut self, data: &mut AllocationData) {
        for block_number in (0..data.code.block_count()).rev() {
            let block_ix = BlockIx::new(block_number);
            data.tick_counter.tick();
            Self::initialize_block_state(data, block_ix);
            self.define_outputs_for_block(data, block_ix);
        }
    }

    fn initialize_block_state(data: &mut AllocationData, block_ix: BlockIx) {
        // Every block dominates itself.
        data.block_states[block_ix]
            .dominated_blocks_mut()
            .add(block_ix.get_usize());

        match data.code.block(block_ix).dominator() {
            Some(dominator) => {
                // Fold this block's dominated set into its immediate
                // dominator's.
                let dominated = data.block_states[block_ix].dominated_blocks().clone();
                data.block_states[dominator]
                    .dominated_blocks_mut()
                    .union_with(&dominated);
            }
            None => {
                // Only the entry block has no dominator.
                debug_assert_eq!(block_ix, BlockIx::new(0));
            }
        }
    }

    fn define_outputs_for_block(&mut self, data: &mut AllocationData, block_ix: BlockIx) {
        debug!("define outputs for {:?}", block_ix);
        let first = data.code.block(block_ix).first_instruction_index();
        let last = data.code.block(block_ix).last_instruction_index();
        for index in (first.get()..=last.get()).rev() {
            let instr_index = InstIx::new(index);
            let output_count = data.code.instruction_at(instr_index).output_count();
            for i in 0..output_count {
                let output = data.code.instruction_at(instr_index).output_at(i);
                match output {
                    InstructionOperand::Constant(vreg) => {
                        data.define_as_constant_operand(vreg, instr_index);
                    }
                    InstructionOperand::Unallocated(unallocated) => {
                        let vreg = unallocated.virtual_register;
                        if let OperandPolicy::FixedSlot(slot_index) = unallocated.policy {
                            // Allocate the spill operand up front so the
                            // allocation pass can reuse the slot for every
                            // other spill of this vreg.
                            data.define_as_fixed_spill_operand(vreg, instr_index, slot_index);
                        } else {
                            data.define_as_unallocated_operand(vreg, instr_index);
                        }
                    }
                    _ => debug_assert!(false, "output already allocated before allocation"),
                }
            }

            if data.code.instruction_at(instr_index).has_reference_map() {
                data.reference_map_instructions.push(instr_index);
            }
        }

        // Phi definitions, and the writes of the phi inputs into the phi's
        // slot at each predecessor's exit. The moves are emitted here, in
        // the pass that runs before any allocation, because a loop's
        // back-edge predecessor is allocated before the loop header is
        // reached.
        let phi_count = data.code.block(block_ix).phis().len();
        for phi_ix in 0..phi_count {
            let phi = data.code.block(block_ix).phis()[phi_ix].clone();
            data.define_as_phi(phi.virtual_register, first);

            let predecessors: Vec<BlockIx> =
                data.code.block(block_ix).predecessors().to_vec();
            debug_assert_eq!(predecessors.len(), phi.operands.len());
            for (pred, &input_vreg) in predecessors.iter().zip(phi.operands.iter()) {
                let pred_exit = data.code.block(*pred).last_instruction_index();
                let move_ix = data.code.next_gap_move_index(pred_exit, GapPosition::End);
                let destination = data.spill_use_operand(
                    phi.virtual_register,
                    pred_exit,
                    OperandRef::MoveDestination {
                        instr: pred_exit,
                        pos: GapPosition::End,
                        index: move_ix,
                    },
                );
                let source = InstructionOperand::Unallocated(UnallocatedOperand::new(
                    OperandPolicy::RegisterOrSlot,
                    input_vreg,
                ));
                data.add_gap_move(pred_exit, GapPosition::End, source, destination);
            }
        }
    }

    //-------------------------------------------------------------------------
    // Pass B: allocate registers

    pub fn allocate_registers(&mut self, data: &mut AllocationData) {
        for block_number in (0..data.code.block_count()).rev() {
            data.tick_counter.tick();
            self.allocate_registers_for_block(data, BlockIx::new(block_number));
        }

        Self::update_spill_ranges_for_loops(data);

        data.frame
            .set_allocated_registers(self.general_reg_allocator.assigned_registers().clone());
        data.frame
            .set_allocated_double_registers(self.double_reg_allocator.assigned_registers().clone());
    }

    fn allocate_registers_for_block(&mut self, data: &mut AllocationData, block_ix: BlockIx) {
        debug!("allocate registers for {:?}", block_ix);
        self.general_reg_allocator.start_block();
        self.double_reg_allocator.start_block();

        let first = data.code.block(block_ix).first_instruction_index();
        let last = data.code.block(block_ix).last_instruction_index();
        for index in (first.get()..=last.get()).rev() {
            let instr_index = InstIx::new(index);

            // Reserve fixed-register operands up front so no other operand
            // of this instruction takes their register.
            self.reserve_fixed_registers(data, instr_index);

            // Outputs.
            let output_count = data.code.instruction_at(instr_index).output_count();
            for i in 0..output_count {
                let slot = OperandRef::Output {
                    instr: instr_index,
                    index: i,
                };
                let output = data.code.operand(slot);
                debug_assert!(!output.is_allocated());
                match output {
                    InstructionOperand::Constant(vreg) => {
                        self.allocator_for(data, vreg)
                            .allocate_constant_output(data, vreg);
                    }
                    InstructionOperand::Unallocated(unallocated) => {
                        if unallocated.policy == OperandPolicy::SameAsInput {
                            debug_assert_eq!(i, 0);
                            let input_slot = OperandRef::Input {
                                instr: instr_index,
                                index: 0,
                            };
                            let vreg = unallocated.virtual_register;
                            self.allocator_for(data, vreg).allocate_same_input_output(
                                data,
                                slot,
                                input_slot,
                                instr_index,
                            );
                        } else {
                            let vreg = unallocated.virtual_register;
                            self.allocator_for(data, vreg)
                                .allocate_output(data, slot, instr_index);
                        }
                    }
                    _ => debug_assert!(false, "unexpected output operand"),
                }
            }

            if data.code.instruction_at(instr_index).clobbers_registers() {
                self.general_reg_allocator.spill_all_registers(data);
            }
            if data.code.instruction_at(instr_index).clobbers_double_registers() {
                self.double_reg_allocator.spill_all_registers(data);
            }

            // Temporaries.
            let temp_count = data.code.instruction_at(instr_index).temp_count();
            for i in 0..temp_count {
                let slot = OperandRef::Temp {
                    instr: instr_index,
                    index: i,
                };
                if let Some(unallocated) = data.code.operand(slot).as_unallocated() {
                    self.allocator_for(data, unallocated.virtual_register)
                        .allocate_temp(data, slot, instr_index);
                }
            }

            // Inputs live through the instruction, then inputs only used at
            // its start.
            let input_count = data.code.instruction_at(instr_index).input_count();
            for i in 0..input_count {
                let slot = OperandRef::Input {
                    instr: instr_index,
                    index: i,
                };
                match data.code.operand(slot).as_unallocated() {
                    Some(unallocated) if !unallocated.used_at_start => {
                        self.allocator_for(data, unallocated.virtual_register)
                            .allocate_input(data, slot, instr_index);
                    }
                    _ => {}
                }
            }
            for i in 0..input_count {
                let slot = OperandRef::Input {
                    instr: instr_index,
                    index: i,
                };
                match data.code.operand(slot).as_unallocated() {
                    Some(unallocated) => {
                        debug_assert!(unallocated.used_at_start);
                        self.allocator_for(data, unallocated.virtual_register)
                            .allocate_input(data, slot, instr_index);
                    }
                    None => {}
                }
            }

            // Any still-unallocated sources of this instruction's END moves
            // (reloads target allocated operands; phi writes and spill
            // stores leave their sources unconstrained).
            let move_count = data.code.gap_move_count(instr_index, GapPosition::End);
            for i in 0..move_count {
                let destination = data.code.operand(OperandRef::MoveDestination {
                    instr: instr_index,
                    pos: GapPosition::End,
                    index: i,
                });
                debug_assert!(!destination.is_unallocated());
                let slot = OperandRef::MoveSource {
                    instr: instr_index,
                    pos: GapPosition::End,
                    index: i,
                };
                if let Some(unallocated) = data.code.operand(slot).as_unallocated() {
                    self.allocator_for(data, unallocated.virtual_register)
                        .allocate_gap_move_input(data, slot, instr_index);
                }
            }

            self.general_reg_allocator.end_instruction();
            self.double_reg_allocator.end_instruction();
        }

        // Registers don't survive block boundaries; everything still live
        // goes to its spill slot.
        self.general_reg_allocator.spill_all_registers(data);
        self.double_reg_allocator.spill_all_registers(data);

        self.general_reg_allocator.end_block();
        self.double_reg_allocator.end_block();
    }

    fn reserve_fixed_registers(&mut self, data: &mut AllocationData, instr_index: InstIx) {
        let output_count = data.code.instruction_at(instr_index).output_count();
        for i in 0..output_count {
            let operand = data.code.instruction_at(instr_index).output_at(i);
            let unallocated = match operand.as_unallocated() {
                Some(unallocated) => unallocated,
                None => continue,
            };
            // A same-as-input output takes its constraints from the input,
            // so reserve using the input operand (it is reserved for the
            // input's own position below as well).
            let unallocated = if unallocated.policy == OperandPolicy::SameAsInput {
                match data.code.instruction_at(instr_index).input_at(i).as_unallocated() {
                    Some(input) => input,
                    None => continue,
                }
            } else {
                unallocated
            };
            let vreg = unallocated.virtual_register;
            match unallocated.policy {
                OperandPolicy::FixedRegister(code) | OperandPolicy::FixedFPRegister(code) => {
                    self.allocator_for(data, vreg)
                        .reserve_fixed_output_register(data, vreg, code, instr_index);
                }
                _ => {}
            }
        }

        let temp_count = data.code.instruction_at(instr_index).temp_count();
        for i in 0..temp_count {
            let operand = data.code.instruction_at(instr_index).temp_at(i);
            if let Some(unallocated) = operand.as_unallocated() {
                let vreg = unallocated.virtual_register;
                match unallocated.policy {
                    OperandPolicy::FixedRegister(code) | OperandPolicy::FixedFPRegister(code) => {
                        self.allocator_for(data, vreg)
                            .reserve_fixed_temp_register(data, vreg, code, instr_index);
                    }
                    _ => {}
                }
            }
        }

        let input_count = data.code.instruction_at(instr_index).input_count();
        for i in 0..input_count {
            let operand = data.code.instruction_at(instr_index).input_at(i);
            if let Some(unallocated) = operand.as_unallocated() {
                let vreg = unallocated.virtual_register;
                match unallocated.policy {
                    OperandPolicy::FixedRegister(code) | OperandPolicy::FixedFPRegister(code) => {
                        self.allocator_for(data, vreg).reserve_fixed_input_register(
                            data,
                            vreg,
                            code,
                            unallocated.used_at_start,
                            instr_index,
                        );
                    }
                    _ => {}
                }
            }
        }
    }

    //-------------------------------------------------------------------------
    // Loop fixup

    /// A spill slot written before a loop and read inside it is live for the
    /// whole loop: a second iteration may read it after the instruction
    /// range of the first. Extend every such spill range to the loop's last
    /// instruction so slot packing can't reuse the slot inside the loop.
    fn update_spill_ranges_for_loops(data: &mut AllocationData) {
        for block_number in 0..data.code.block_count() {
            let block_ix = BlockIx::new(block_number);
            if !data.code.block(block_ix).is_loop_header() {
                continue;
            }
            let loop_end = data.code.block(block_ix).loop_end().expect("loop header without end");
            let last_loop_block = loop_end.minus(1);
            let last_loop_instr = data.code.block(last_loop_block).last_instruction_index();
            let header_entry = data.code.block(block_ix).first_instruction_index();

            for vreg in data.spilled_vregs() {
                let live_at_header = {
                    let vreg_data = data.vreg_data(vreg);
                    vreg_data.has_spill_range()
                        && vreg_data.spill_range().is_live_at(
                            header_entry,
                            block_ix,
                            &data.block_states,
                        )
                };
                if live_at_header {
                    data.virtual_register_data[vreg]
                        .spill_range_mut()
                        .extend_range_to(last_loop_instr);
                }
            }
        }
    }
}
