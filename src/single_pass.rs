//! The single-pass allocator for one register kind over one block.
//!
//! Instructions are visited strictly in reverse. Uses are therefore seen
//! before the definition that feeds them: a use optimistically parks its
//! virtual register in a register (as a pending use where the operand
//! policy allows), and the definition later either commits that register,
//! rewriting every pending operand to it, or finds the register long since
//! evicted and writes the value to the spill slot instead. Nothing here
//! survives a block boundary; every live register is spilled at block entry
//! (which in reverse order is processed last).

use log::trace;

use crate::allocation_data::AllocationData;
use crate::data_structures::{BitVec, InstIx, RegisterIndex, TypedIxVec, VirtualReg};
use crate::instructions::{
    AllocatedOperand, GapPosition, InstructionOperand, OperandPolicy, OperandRef,
    RegisterConfiguration, RegisterKind, UnallocatedOperand,
};

/// Which half of the gap around an instruction a register is live through.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum UsePosition {
    /// Used at the start of the instruction.
    Start,
    /// Used at the end of the instruction.
    End,
    /// Used across the whole instruction.
    All,
    /// Not used by the instruction; pending uses reserve with this so they
    /// don't block other operands of the same instruction.
    None,
}

pub struct SinglePassRegisterAllocator {
    kind: RegisterKind,
    num_allocatable_registers: usize,
    /// Map from virtual register to its current register, if any. Inverse of
    /// the register state's vreg-per-register; the two are kept in lockstep.
    virtual_register_to_reg: TypedIxVec<VirtualReg, Option<RegisterIndex>>,
    /// Lazily created per block; absent for kinds a function never touches.
    register_state: Option<crate::register_state::RegisterState>,
    reg_code_to_index: Vec<Option<RegisterIndex>>,
    index_to_reg_code: Vec<u8>,
    /// Register codes this allocator has ever assigned, reported to the
    /// frame at the end of allocation.
    assigned_registers: BitVec,
    in_use_at_instr_start_bits: u64,
    in_use_at_instr_end_bits: u64,
    allocated_registers_bits: u64,
}

impl SinglePassRegisterAllocator {
    pub fn new(
        kind: RegisterKind,
        config: &RegisterConfiguration,
        virtual_register_count: u32,
    ) -> Self {
        let codes = config.allocatable_register_codes(kind);
        let mut reg_code_to_index = vec![None; config.num_registers(kind)];
        for (index, &code) in codes.iter().enumerate() {
            reg_code_to_index[code as usize] = Some(RegisterIndex::new(index));
        }
        Self {
            kind,
            num_allocatable_registers: codes.len(),
            virtual_register_to_reg: TypedIxVec::from_vec(vec![
                None;
                virtual_register_count as usize
            ]),
            register_state: None,
            reg_code_to_index,
            index_to_reg_code: codes.to_vec(),
            assigned_registers: BitVec::new(config.num_registers(kind)),
            in_use_at_instr_start_bits: 0,
            in_use_at_instr_end_bits: 0,
            allocated_registers_bits: 0,
        }
    }

    pub fn kind(&self) -> RegisterKind {
        self.kind
    }

    pub fn assigned_registers(&self) -> &BitVec {
        &self.assigned_registers
    }

    //-------------------------------------------------------------------------
    // Block and instruction boundaries

    pub fn start_block(&mut self) {
        debug_assert!(self.register_state.is_none());
        debug_assert_eq!(self.in_use_at_instr_start_bits, 0);
        debug_assert_eq!(self.in_use_at_instr_end_bits, 0);
        debug_assert_eq!(self.allocated_registers_bits, 0);
    }

    pub fn end_block(&mut self) {
        debug_assert_eq!(self.in_use_at_instr_start_bits, 0);
        debug_assert_eq!(self.in_use_at_instr_end_bits, 0);
        debug_assert_eq!(self.allocated_registers_bits, 0);
        self.register_state = None;
    }

    pub fn end_instruction(&mut self) {
        self.in_use_at_instr_start_bits = 0;
        self.in_use_at_instr_end_bits = 0;
    }

    fn ensure_register_state(&mut self) {
        if self.register_state.is_none() {
            self.register_state = Some(crate::register_state::RegisterState::new(
                self.num_allocatable_registers,
            ));
        }
    }

    fn state(&self) -> &crate::register_state::RegisterState {
        self.register_state.as_ref().expect("no register state")
    }

    fn state_mut(&mut self) -> &mut crate::register_state::RegisterState {
        self.register_state.as_mut().expect("no register state")
    }

    //-------------------------------------------------------------------------
    // Code <-> index mapping, register bookkeeping

    fn from_reg_code(&self, reg_code: u8) -> RegisterIndex {
        self.reg_code_to_index[reg_code as usize].expect("not an allocatable register code")
    }

    fn to_reg_code(&self, reg: RegisterIndex) -> u8 {
        self.index_to_reg_code[reg.get_usize()]
    }

    fn register_for_virtual_register(&self, vreg: VirtualReg) -> Option<RegisterIndex> {
        self.virtual_register_to_reg[vreg]
    }

    fn virtual_register_for_register(&self, reg: RegisterIndex) -> Option<VirtualReg> {
        self.state().virtual_register_for(reg)
    }

    /// `reg` is unoccupied or already holds `vreg`.
    fn is_free_or_same_virtual_register(&self, reg: RegisterIndex, vreg: VirtualReg) -> bool {
        match self.virtual_register_for_register(reg) {
            Some(occupant) => occupant == vreg,
            None => true,
        }
    }

    /// `vreg` has no register yet or is already in `reg`.
    fn virtual_register_is_unallocated_or_in_reg(
        &self,
        vreg: VirtualReg,
        reg: RegisterIndex,
    ) -> bool {
        match self.register_for_virtual_register(vreg) {
            Some(existing) => existing == reg,
            None => true,
        }
    }

    fn allocated_operand_for_reg(
        &self,
        data: &AllocationData,
        reg: RegisterIndex,
        vreg: VirtualReg,
    ) -> AllocatedOperand {
        AllocatedOperand::register(self.to_reg_code(reg), data.representation_for(vreg))
    }

    fn mark_register_use(&mut self, reg: RegisterIndex, pos: UsePosition) {
        match pos {
            UsePosition::Start => self.in_use_at_instr_start_bits |= reg.bit(),
            UsePosition::End => self.in_use_at_instr_end_bits |= reg.bit(),
            UsePosition::All => {
                self.in_use_at_instr_start_bits |= reg.bit();
                self.in_use_at_instr_end_bits |= reg.bit();
            }
            UsePosition::None => {}
        }
    }

    fn in_use_bitmap(&self, pos: UsePosition) -> u64 {
        match pos {
            UsePosition::Start => self.in_use_at_instr_start_bits,
            UsePosition::End => self.in_use_at_instr_end_bits,
            UsePosition::All => self.in_use_at_instr_start_bits | self.in_use_at_instr_end_bits,
            UsePosition::None => unreachable!("no in-use bitmap for UsePosition::None"),
        }
    }

    fn assign_register(&mut self, reg: RegisterIndex, vreg: VirtualReg, pos: UsePosition) {
        trace!("assign {:?} to {:?} ({:?})", vreg, reg, pos);
        self.assigned_registers.add(self.to_reg_code(reg) as usize);
        self.mark_register_use(reg, pos);
        self.allocated_registers_bits |= reg.bit();
        self.virtual_register_to_reg[vreg] = Some(reg);
    }

    fn free_register(&mut self, reg: RegisterIndex, vreg: VirtualReg) {
        self.allocated_registers_bits &= !reg.bit();
        self.virtual_register_to_reg[vreg] = None;
    }

    /// Verify that the vreg-to-register and register-to-vreg maps agree.
    fn check_consistency(&self, _data: &AllocationData) {
        if !cfg!(debug_assertions) {
            return;
        }
        let state = match &self.register_state {
            Some(state) => state,
            None => return,
        };
        for (vreg, reg) in self.virtual_register_to_reg.enumerated() {
            if let Some(reg) = reg {
                assert_eq!(state.virtual_register_for(*reg), Some(vreg));
                assert_ne!(self.allocated_registers_bits & reg.bit(), 0);
            }
        }
        for index in 0..self.num_allocatable_registers {
            let reg = RegisterIndex::new(index);
            if let Some(vreg) = state.virtual_register_for(reg) {
                assert_eq!(self.virtual_register_to_reg[vreg], Some(reg));
                assert_ne!(self.allocated_registers_bits & reg.bit(), 0);
            }
        }
    }

    //-------------------------------------------------------------------------
    // Register choice

    /// Pick a register for `vreg`, preferring its current register. Without
    /// `must_use_register`, an already-spilled value is left in memory
    /// rather than being handed a register it would have to vacate again.
    fn choose_register_for_vreg(
        &mut self,
        data: &mut AllocationData,
        vreg: VirtualReg,
        pos: UsePosition,
        must_use_register: bool,
    ) -> Option<RegisterIndex> {
        if let Some(reg) = self.register_for_virtual_register(vreg) {
            return Some(reg);
        }
        if !must_use_register && data.vreg_data(vreg).has_spill_operand() {
            return None;
        }
        self.choose_register(data, pos, must_use_register)
    }

    fn choose_register(
        &mut self,
        data: &mut AllocationData,
        pos: UsePosition,
        must_use_register: bool,
    ) -> Option<RegisterIndex> {
        let reg = self.choose_free_register(pos);
        if reg.is_none() && must_use_register {
            let reg = self.choose_register_to_spill(data, pos);
            self.spill_register(data, reg);
            return Some(reg);
        }
        reg
    }

    fn choose_free_register(&self, pos: UsePosition) -> Option<RegisterIndex> {
        // Take the lowest-indexed register that is neither blocked at this
        // position nor holding a value.
        let taken = self.in_use_bitmap(pos) | self.allocated_registers_bits;
        let index = (!taken).trailing_zeros() as usize;
        if index >= self.num_allocatable_registers {
            None
        } else {
            Some(RegisterIndex::new(index))
        }
    }

    /// Every register is taken; pick the cheapest to evict. Preferences, in
    /// order: a register with only pending uses (its eviction costs no gap
    /// move), then one whose value already has a spill slot (no new slot
    /// write at its definition), then the one holding the value with the
    /// earliest definition.
    fn choose_register_to_spill(&self, data: &AllocationData, pos: UsePosition) -> RegisterIndex {
        let in_use = self.in_use_bitmap(pos);
        let state = self.state();
        let mut chosen: Option<RegisterIndex> = None;
        let mut earliest_definition = InstIx::new(u32::MAX);
        let mut pending_only_use = false;
        let mut already_spilled = false;
        for index in 0..self.num_allocatable_registers {
            let reg = RegisterIndex::new(index);
            if in_use & reg.bit() != 0 {
                continue;
            }
            let vreg = match state.virtual_register_for(reg) {
                Some(vreg) => vreg,
                None => {
                    // A free register would have been taken by
                    // choose_free_register.
                    debug_assert!(false, "unoccupied register in spill scan");
                    continue;
                }
            };
            let vreg_data = data.vreg_data(vreg);
            let reg_pending_only = state.has_pending_uses_only(reg);
            let reg_spilled = vreg_data.has_spill_operand();
            if (!pending_only_use && reg_pending_only)
                || (!already_spilled && reg_spilled)
                || vreg_data.output_instr_index() < earliest_definition
            {
                chosen = Some(reg);
                earliest_definition = vreg_data.output_instr_index();
                pending_only_use = reg_pending_only;
                already_spilled = reg_spilled;
            }
        }
        // The instruction format keeps the number of concurrently in-use
        // registers below the register count, so an eviction candidate must
        // exist here; callers of reserve_fixed_register rely on the same
        // bound.
        chosen.expect("no spillable register available")
    }

    //-------------------------------------------------------------------------
    // Commit / spill primitives

    /// Bind `reg` to the operand at `target` (if any), resolve the
    /// register's pending uses to it, and free it for earlier code.
    fn commit_register(
        &mut self,
        data: &mut AllocationData,
        reg: RegisterIndex,
        vreg: VirtualReg,
        target: Option<OperandRef>,
        pos: UsePosition,
    ) -> AllocatedOperand {
        let allocated = self.allocated_operand_for_reg(data, reg, vreg);
        if let Some(slot) = target {
            data.code.replace_operand(slot, allocated.into());
        }
        self.state_mut().commit(reg, allocated, data);
        self.mark_register_use(reg, pos);
        self.free_register(reg, vreg);
        self.check_consistency(data);
        allocated
    }

    fn spill_register(&mut self, data: &mut AllocationData, reg: RegisterIndex) {
        let vreg = match self.virtual_register_for_register(reg) {
            Some(vreg) => vreg,
            None => return,
        };
        let allocated = self.allocated_operand_for_reg(data, reg, vreg);
        self.state_mut().spill(reg, allocated, data);
        self.free_register(reg, vreg);
    }

    /// Spill every live register of this kind; used for clobbering
    /// instructions and at block entry.
    pub fn spill_all_registers(&mut self, data: &mut AllocationData) {
        if self.register_state.is_none() {
            return;
        }
        for index in 0..self.num_allocatable_registers {
            self.spill_register(data, RegisterIndex::new(index));
        }
    }

    fn spill_register_for_virtual_register(&mut self, data: &mut AllocationData, vreg: VirtualReg) {
        if let Some(reg) = self.register_for_virtual_register(vreg) {
            self.spill_register(data, reg);
        }
    }

    fn allocate_use(
        &mut self,
        data: &mut AllocationData,
        reg: RegisterIndex,
        vreg: VirtualReg,
        slot: OperandRef,
        instr_index: InstIx,
        pos: UsePosition,
    ) {
        debug_assert!(self.is_free_or_same_virtual_register(reg, vreg));
        let allocated = self.allocated_operand_for_reg(data, reg, vreg);
        data.code.replace_operand(slot, allocated.into());
        // Commit any in-progress allocation of this register (necessarily
        // pending uses of the same vreg) before taking it over.
        self.state_mut().commit(reg, allocated, data);
        self.state_mut().allocate_use(reg, vreg, instr_index);
        self.assign_register(reg, vreg, pos);
        self.check_consistency(data);
    }

    fn allocate_pending_use(
        &mut self,
        data: &mut AllocationData,
        reg: RegisterIndex,
        vreg: VirtualReg,
        slot: OperandRef,
        instr_index: InstIx,
    ) {
        debug_assert!(self.is_free_or_same_virtual_register(reg, vreg));
        self.state_mut()
            .allocate_pending_use(reg, vreg, slot, instr_index, data);
        // A pending use doesn't need the register during this instruction,
        // so assign with UsePosition::None to keep it available to the other
        // operands.
        self.assign_register(reg, vreg, UsePosition::None);
        self.check_consistency(data);
    }

    /// The operand must be in `reg`, but `vreg` already lives elsewhere:
    /// satisfy the constraint with a gap move from wherever the vreg is.
    fn allocate_use_with_move(
        &mut self,
        data: &mut AllocationData,
        reg: RegisterIndex,
        vreg: VirtualReg,
        slot: OperandRef,
        instr_index: InstIx,
        pos: UsePosition,
    ) {
        let to = self.allocated_operand_for_reg(data, reg, vreg);
        let from = InstructionOperand::Unallocated(UnallocatedOperand::new(
            OperandPolicy::RegisterOrSlot,
            vreg,
        ));
        data.add_gap_move(instr_index, GapPosition::End, from, to.into());
        data.code.replace_operand(slot, to.into());
        self.mark_register_use(reg, pos);
        self.check_consistency(data);
    }

    //-------------------------------------------------------------------------
    // Operand verbs

    pub fn allocate_input(
        &mut self,
        data: &mut AllocationData,
        slot: OperandRef,
        instr_index: InstIx,
    ) {
        self.ensure_register_state();
        let unallocated = data
            .code
            .operand(slot)
            .as_unallocated()
            .expect("input must be unallocated");
        let vreg = unallocated.virtual_register;

        match unallocated.policy {
            OperandPolicy::FixedSlot(slot_index) => {
                // The value has to be in a specific frame slot: rewrite the
                // operand to it, move an unconstrained copy of the vreg into
                // the slot in the gap, and spill that copy's source.
                let rep = data.representation_for(vreg);
                let allocated = AllocatedOperand::stack_slot(slot_index, rep);
                data.code.replace_operand(slot, allocated.into());
                let input_copy = InstructionOperand::Unallocated(UnallocatedOperand::new(
                    OperandPolicy::RegisterOrSlot,
                    vreg,
                ));
                let move_ix =
                    data.add_gap_move(instr_index, GapPosition::End, input_copy, allocated.into());
                data.spill_operand(
                    vreg,
                    OperandRef::MoveSource {
                        instr: instr_index,
                        pos: GapPosition::End,
                        index: move_ix,
                    },
                    instr_index,
                );
                return;
            }
            OperandPolicy::Slot => {
                data.spill_operand(vreg, slot, instr_index);
                return;
            }
            _ => {}
        }

        let pos = if unallocated.used_at_start {
            UsePosition::Start
        } else {
            UsePosition::All
        };
        match unallocated.policy {
            OperandPolicy::FixedRegister(code) | OperandPolicy::FixedFPRegister(code) => {
                let reg = self.from_reg_code(code);
                if !self.virtual_register_is_unallocated_or_in_reg(vreg, reg) {
                    // Already in some other register; route it into the
                    // fixed one with a gap move instead of reallocating.
                    self.allocate_use_with_move(data, reg, vreg, slot, instr_index, pos);
                } else {
                    self.allocate_use(data, reg, vreg, slot, instr_index, pos);
                }
            }
            policy => {
                let must_use_register = policy == OperandPolicy::Register
                    || (data.vreg_data(vreg).is_constant()
                        && policy != OperandPolicy::RegisterOrSlotOrConstant);
                match self.choose_register_for_vreg(data, vreg, pos, must_use_register) {
                    Some(reg) => {
                        if must_use_register {
                            self.allocate_use(data, reg, vreg, slot, instr_index, pos);
                        } else {
                            self.allocate_pending_use(data, reg, vreg, slot, instr_index);
                        }
                    }
                    None => data.spill_operand(vreg, slot, instr_index),
                }
            }
        }
    }

    /// An unconstrained source operand of a gap move: prefer keeping it in a
    /// register as a pending use, fall back to the spill slot.
    pub fn allocate_gap_move_input(
        &mut self,
        data: &mut AllocationData,
        slot: OperandRef,
        instr_index: InstIx,
    ) {
        self.ensure_register_state();
        let unallocated = data
            .code
            .operand(slot)
            .as_unallocated()
            .expect("gap move input must be unallocated");
        debug_assert_eq!(unallocated.policy, OperandPolicy::RegisterOrSlot);
        let vreg = unallocated.virtual_register;
        match self.choose_register_for_vreg(data, vreg, UsePosition::Start, false) {
            Some(reg) => self.allocate_pending_use(data, reg, vreg, slot, instr_index),
            None => data.spill_operand(vreg, slot, instr_index),
        }
    }

    /// A constant definition: nothing to allocate, but if the constant has
    /// been parked in a register by later uses, spill it now so the
    /// register's uses materialize from the constant.
    pub fn allocate_constant_output(&mut self, data: &mut AllocationData, vreg: VirtualReg) {
        self.ensure_register_state();
        self.spill_register_for_virtual_register(data, vreg);
    }

    pub fn allocate_output(
        &mut self,
        data: &mut AllocationData,
        slot: OperandRef,
        instr_index: InstIx,
    ) {
        self.allocate_output_at(data, slot, instr_index, UsePosition::End);
    }

    fn allocate_output_at(
        &mut self,
        data: &mut AllocationData,
        slot: OperandRef,
        instr_index: InstIx,
        pos: UsePosition,
    ) -> Option<RegisterIndex> {
        self.ensure_register_state();
        let unallocated = data
            .code
            .operand(slot)
            .as_unallocated()
            .expect("output must be unallocated");
        let vreg = unallocated.virtual_register;

        let reg = match unallocated.policy {
            OperandPolicy::Slot | OperandPolicy::FixedSlot(_) => {
                // The output goes to the stack; evict any register parked
                // with the value so its uses read the slot (or get their
                // reload moves).
                self.spill_register_for_virtual_register(data, vreg);
                None
            }
            OperandPolicy::FixedRegister(code) | OperandPolicy::FixedFPRegister(code) => {
                Some(self.from_reg_code(code))
            }
            policy => self.choose_register_for_vreg(
                data,
                vreg,
                pos,
                policy == OperandPolicy::Register,
            ),
        };

        let reg = match reg {
            None => {
                data.spill_operand(vreg, slot, instr_index);
                return None;
            }
            Some(reg) => reg,
        };

        let mut move_output_to: Option<AllocatedOperand> = None;
        if !self.virtual_register_is_unallocated_or_in_reg(vreg, reg) {
            // The vreg is parked in a different register (a fixed-register
            // constraint forced this one). Commit that register here and
            // move the output into it. Its use belongs to the following
            // instructions' gap moves, so don't mark it in-use here.
            let existing = self
                .register_for_virtual_register(vreg)
                .expect("vreg in another register");
            move_output_to =
                Some(self.commit_register(data, existing, vreg, None, UsePosition::None));
        }
        let allocated = self.commit_register(data, reg, vreg, Some(slot), pos);
        if let Some(to) = move_output_to {
            self.emit_gap_move_from_output(data, allocated, to, instr_index);
        }
        if data.vreg_data(vreg).needs_spill_at_output() {
            let block = data.block_for_instr(instr_index);
            data.emit_gap_move_from_output_to_spill_slot(vreg, allocated, block, instr_index);
        }
        Some(reg)
    }

    /// Output constrained to input 0's location. The input carries the real
    /// constraints; allocate the output under them, then constrain the input
    /// to whatever was decided.
    pub fn allocate_same_input_output(
        &mut self,
        data: &mut AllocationData,
        output_slot: OperandRef,
        input_slot: OperandRef,
        instr_index: InstIx,
    ) {
        self.ensure_register_state();
        let input = data
            .code
            .operand(input_slot)
            .as_unallocated()
            .expect("same-as-input input must be unallocated");
        let output = data
            .code
            .operand(output_slot)
            .as_unallocated()
            .expect("same-as-input output must be unallocated");
        let input_vreg = input.virtual_register;
        let output_vreg = output.virtual_register;

        let mut output_as_input = input;
        output_as_input.virtual_register = output_vreg;
        data.code
            .replace_operand(output_slot, InstructionOperand::Unallocated(output_as_input));
        let reg = self.allocate_output_at(data, output_slot, instr_index, UsePosition::All);

        match reg {
            Some(reg) => {
                // Pin the input to the chosen register.
                let code = self.to_reg_code(reg);
                let policy = match self.kind {
                    RegisterKind::General => OperandPolicy::FixedRegister(code),
                    RegisterKind::Double => OperandPolicy::FixedFPRegister(code),
                };
                data.code.replace_operand(
                    input_slot,
                    InstructionOperand::Unallocated(UnallocatedOperand::new(policy, input_vreg)),
                );
            }
            None => {
                // The output spilled, so the input must be the output's
                // spill slot too; route the input value into that slot with
                // an unconstrained gap move.
                data.spill_operand(output_vreg, input_slot, instr_index);
                let move_ix = data.code.next_gap_move_index(instr_index, GapPosition::End);
                let destination = data.spill_use_operand(
                    output_vreg,
                    instr_index,
                    OperandRef::MoveDestination {
                        instr: instr_index,
                        pos: GapPosition::End,
                        index: move_ix,
                    },
                );
                let source = InstructionOperand::Unallocated(UnallocatedOperand::new(
                    OperandPolicy::RegisterOrSlot,
                    input_vreg,
                ));
                data.add_gap_move(instr_index, GapPosition::End, source, destination);
            }
        }
    }

    /// Temporaries are live across the whole instruction and dead after it.
    pub fn allocate_temp(
        &mut self,
        data: &mut AllocationData,
        slot: OperandRef,
        instr_index: InstIx,
    ) {
        self.ensure_register_state();
        let unallocated = data
            .code
            .operand(slot)
            .as_unallocated()
            .expect("temp must be unallocated");
        let vreg = unallocated.virtual_register;
        debug_assert!(!matches!(unallocated.policy, OperandPolicy::FixedSlot(_)));

        let reg = match unallocated.policy {
            OperandPolicy::Slot => None,
            OperandPolicy::FixedRegister(code) | OperandPolicy::FixedFPRegister(code) => {
                Some(self.from_reg_code(code))
            }
            policy => self.choose_register(
                data,
                UsePosition::All,
                policy == OperandPolicy::Register,
            ),
        };
        match reg {
            Some(reg) => {
                debug_assert!(self.virtual_register_is_unallocated_or_in_reg(vreg, reg));
                self.commit_register(data, reg, vreg, Some(slot), UsePosition::All);
            }
            None => data.spill_operand(vreg, slot, instr_index),
        }
    }

    //-------------------------------------------------------------------------
    // Fixed-register reservation

    pub fn reserve_fixed_input_register(
        &mut self,
        data: &mut AllocationData,
        vreg: VirtualReg,
        reg_code: u8,
        used_at_start: bool,
        instr_index: InstIx,
    ) {
        let pos = if used_at_start {
            UsePosition::Start
        } else {
            UsePosition::All
        };
        self.reserve_fixed_register(data, vreg, reg_code, instr_index, pos);
    }

    pub fn reserve_fixed_temp_register(
        &mut self,
        data: &mut AllocationData,
        vreg: VirtualReg,
        reg_code: u8,
        instr_index: InstIx,
    ) {
        self.reserve_fixed_register(data, vreg, reg_code, instr_index, UsePosition::All);
    }

    pub fn reserve_fixed_output_register(
        &mut self,
        data: &mut AllocationData,
        vreg: VirtualReg,
        reg_code: u8,
        instr_index: InstIx,
    ) {
        self.reserve_fixed_register(data, vreg, reg_code, instr_index, UsePosition::End);
    }

    /// Pre-reserve a fixed register before the instruction's operands are
    /// allocated, evicting an unrelated occupant, so that no other operand
    /// of this instruction picks it.
    fn reserve_fixed_register(
        &mut self,
        data: &mut AllocationData,
        vreg: VirtualReg,
        reg_code: u8,
        instr_index: InstIx,
        pos: UsePosition,
    ) {
        self.ensure_register_state();
        let reg = self.from_reg_code(reg_code);
        if !self.is_free_or_same_virtual_register(reg, vreg)
            && !self.defined_after(data, reg, instr_index, pos)
        {
            // Occupied by a different live vreg; evict it now.
            self.spill_register(data, reg);
        }
        self.mark_register_use(reg, pos);
    }

    /// Is the occupant of `reg` defined strictly after this use position
    /// (in which case there is no interference and no need to evict)?
    fn defined_after(
        &self,
        data: &AllocationData,
        reg: RegisterIndex,
        instr_index: InstIx,
        pos: UsePosition,
    ) -> bool {
        let vreg = match self.virtual_register_for_register(reg) {
            Some(vreg) => vreg,
            None => return false,
        };
        let defined_at = data.vreg_data(vreg).output_instr_index();
        defined_at > instr_index || (defined_at == instr_index && pos == UsePosition::Start)
    }

    //-------------------------------------------------------------------------
    // Output move placement

    /// A register-to-register move of a freshly defined output, placed after
    /// the defining instruction: at the next instruction's START gap, or in
    /// each successor for a block-final definition.
    fn emit_gap_move_from_output(
        &self,
        data: &mut AllocationData,
        from: AllocatedOperand,
        to: AllocatedOperand,
        instr_index: InstIx,
    ) {
        let block_ix = data.block_for_instr(instr_index);
        if instr_index == data.code.block(block_ix).last_instruction_index() {
            let successors: Vec<_> = data.code.block(block_ix).successors().to_vec();
            for succ in successors {
                debug_assert_eq!(data.code.block(succ).predecessor_count(), 1);
                let first = data.code.block(succ).first_instruction_index();
                data.add_gap_move(first, GapPosition::Start, from.into(), to.into());
            }
        } else {
            data.add_gap_move(instr_index.plus(1), GapPosition::Start, from.into(), to.into());
        }
    }
}
