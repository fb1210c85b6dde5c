//! Central state of one allocation pass: the per-virtual-register records,
//! the per-block dominated-block sets, the pending-operand side table and
//! the gap-move plumbing shared by the passes.
//!
//! Pending operands are the load-bearing trick of the whole design. The
//! reverse pass regularly has to emit an operand whose binding it has not
//! decided yet (a use that may stay in its register or may end up reading
//! the spill slot). Such a slot is overwritten with a `Pending` placeholder
//! carrying an index into [`AllocationData::pending_operands`]; the entries
//! form singly linked chains rooted either at a virtual register's spill
//! operand or at a physical register's pending-use list. Resolving a chain
//! walks the indices and overwrites every recorded slot with the same
//! concrete operand.

use log::trace;

use crate::data_structures::{
    BitVec, BlockIx, InstIx, PendingOperandIx, Range, TypedIxVec, VirtualReg,
};
use crate::instructions::{
    AllocatedOperand, Frame, GapPosition, InstructionOperand, InstructionSequence,
    MachineRepresentation, OperandRef, RegisterConfiguration, TickCounter,
};

//=============================================================================
// Block state

/// Per-block metadata: the set of blocks this block dominates (itself
/// included), as a bit set over RPO numbers. Populated by the reverse walk
/// in the DefineOutputs pass.
pub struct BlockState {
    dominated_blocks: BitVec,
}

impl BlockState {
    fn new(block_count: usize) -> Self {
        Self {
            dominated_blocks: BitVec::new(block_count),
        }
    }

    pub fn dominated_blocks(&self) -> &BitVec {
        &self.dominated_blocks
    }

    pub fn dominated_blocks_mut(&mut self) -> &mut BitVec {
        &mut self.dominated_blocks
    }
}

//=============================================================================
// Pending operands

/// Side-table entry for one pending operand: the slot it was written into
/// and the next entry of its chain. Entries are allocated append-only and
/// never reused; a chain abandoned by re-spilling simply goes dead.
#[derive(Clone, Copy, Debug)]
pub struct PendingOperand {
    pub slot: OperandRef,
    pub next: Option<PendingOperandIx>,
}

//=============================================================================
// Virtual register data

/// Where a virtual register's spilled value lives. The state only ever
/// moves forward: absent, then a chain of pending placeholders, then a
/// resolved stack slot. Constants are resolved at definition and never
/// change.
#[derive(Clone, Copy, Debug)]
pub enum SpillOperand {
    None,
    Pending(PendingOperandIx),
    Allocated(AllocatedOperand),
    Constant(VirtualReg),
}

/// The instructions during which a spilled virtual register occupies its
/// stack slot, restricted to the blocks dominated by its defining block.
#[derive(Clone, Copy, Debug)]
pub struct SpillRange {
    live_range: Range,
    live_blocks: BlockIx,
}

impl SpillRange {
    pub fn live_range(&self) -> &Range {
        &self.live_range
    }

    pub fn extend_range_to(&mut self, instr_index: InstIx) {
        self.live_range.add_instr(instr_index);
    }

    /// Is the spill slot occupied at `instr_index` inside `block`? The
    /// dominated-set restriction is what makes slot packing safe for values
    /// whose range numerically covers unrelated blocks.
    pub fn is_live_at(
        &self,
        instr_index: InstIx,
        block: BlockIx,
        block_states: &TypedIxVec<BlockIx, BlockState>,
    ) -> bool {
        self.live_range.contains(instr_index)
            && block_states[self.live_blocks]
                .dominated_blocks()
                .contains(block.get_usize())
    }
}

/// Per-virtual-register metadata: its defining instruction, the phi and
/// constant flags, and the spill operand state machine.
#[derive(Clone)]
pub struct VirtualRegisterData {
    vreg: VirtualReg,
    output_instr_index: InstIx,
    is_phi: bool,
    is_constant: bool,
    spill_operand: SpillOperand,
    spill_range: Option<SpillRange>,
}

impl VirtualRegisterData {
    fn new(
        vreg: VirtualReg,
        spill_operand: SpillOperand,
        output_instr_index: InstIx,
        is_phi: bool,
        is_constant: bool,
    ) -> Self {
        Self {
            vreg,
            output_instr_index,
            is_phi,
            is_constant,
            spill_operand,
            spill_range: None,
        }
    }

    pub fn vreg(&self) -> VirtualReg {
        self.vreg
    }

    pub fn output_instr_index(&self) -> InstIx {
        self.output_instr_index
    }

    pub fn is_phi(&self) -> bool {
        self.is_phi
    }

    pub fn is_constant(&self) -> bool {
        self.is_constant
    }

    pub fn spill_operand(&self) -> SpillOperand {
        self.spill_operand
    }

    pub fn has_spill_operand(&self) -> bool {
        !matches!(self.spill_operand, SpillOperand::None)
    }

    pub fn has_pending_spill_operand(&self) -> bool {
        matches!(self.spill_operand, SpillOperand::Pending(_))
    }

    pub fn has_allocated_spill_operand(&self) -> bool {
        matches!(self.spill_operand, SpillOperand::Allocated(_))
    }

    pub fn has_constant_spill_operand(&self) -> bool {
        debug_assert_eq!(
            self.is_constant,
            matches!(self.spill_operand, SpillOperand::Constant(_))
        );
        self.is_constant
    }

    /// A spilled, non-constant value must be written to its slot when its
    /// defining instruction produces it.
    pub fn needs_spill_at_output(&self) -> bool {
        self.has_spill_operand() && !self.is_constant
    }

    pub fn has_spill_range(&self) -> bool {
        self.spill_range.is_some()
    }

    pub fn spill_range(&self) -> &SpillRange {
        self.spill_range.as_ref().expect("no spill range")
    }

    pub fn spill_range_mut(&mut self) -> &mut SpillRange {
        self.spill_range.as_mut().expect("no spill range")
    }
}

//=============================================================================
// Allocation data

/// Everything one register-allocation run owns or borrows: the sequence
/// being rewritten, the frame, the configuration, and the tables built up
/// by the passes. All state lives for exactly one run.
pub struct AllocationData<'a> {
    pub(crate) config: &'a RegisterConfiguration,
    pub(crate) code: &'a mut InstructionSequence,
    pub(crate) frame: &'a mut Frame,
    pub(crate) tick_counter: &'a mut TickCounter,
    pub(crate) virtual_register_data: TypedIxVec<VirtualReg, VirtualRegisterData>,
    pub(crate) block_states: TypedIxVec<BlockIx, BlockState>,
    pub(crate) pending_operands: TypedIxVec<PendingOperandIx, PendingOperand>,
    pub(crate) reference_map_instructions: Vec<InstIx>,
    pub(crate) spilled_virtual_registers: BitVec,
}

impl<'a> AllocationData<'a> {
    pub fn new(
        config: &'a RegisterConfiguration,
        code: &'a mut InstructionSequence,
        frame: &'a mut Frame,
        tick_counter: &'a mut TickCounter,
    ) -> Self {
        let vreg_count = code.virtual_register_count();
        let block_count = code.block_count() as usize;
        let virtual_register_data = TypedIxVec::from_vec(
            (0..vreg_count)
                .map(|n| {
                    VirtualRegisterData::new(
                        VirtualReg::new(n),
                        SpillOperand::None,
                        InstIx::new(0),
                        false,
                        false,
                    )
                })
                .collect(),
        );
        let block_states =
            TypedIxVec::from_vec((0..block_count).map(|_| BlockState::new(block_count)).collect());
        Self {
            config,
            code,
            frame,
            tick_counter,
            virtual_register_data,
            block_states,
            pending_operands: TypedIxVec::new(),
            reference_map_instructions: Vec::new(),
            spilled_virtual_registers: BitVec::new(vreg_count as usize),
        }
    }

    pub fn code(&self) -> &InstructionSequence {
        self.code
    }

    pub fn frame(&self) -> &Frame {
        self.frame
    }

    pub fn vreg_data(&self, vreg: VirtualReg) -> &VirtualRegisterData {
        &self.virtual_register_data[vreg]
    }

    pub fn representation_for(&self, vreg: VirtualReg) -> MachineRepresentation {
        self.code.representation_for(vreg)
    }

    pub fn block_for_instr(&self, instr_index: InstIx) -> BlockIx {
        self.code.instruction_at(instr_index).block()
    }

    /// The set of spilled virtual registers, materialized for iteration
    /// while the rest of the state is mutated.
    pub(crate) fn spilled_vregs(&self) -> Vec<VirtualReg> {
        self.spilled_virtual_registers
            .iter()
            .map(|n| VirtualReg::new(n as u32))
            .collect()
    }

    //-------------------------------------------------------------------------
    // Definitions (DefineOutputs pass)

    pub(crate) fn define_as_unallocated_operand(&mut self, vreg: VirtualReg, instr_index: InstIx) {
        self.virtual_register_data[vreg] =
            VirtualRegisterData::new(vreg, SpillOperand::None, instr_index, false, false);
    }

    pub(crate) fn define_as_fixed_spill_operand(
        &mut self,
        vreg: VirtualReg,
        instr_index: InstIx,
        slot_index: i32,
    ) {
        let rep = self.representation_for(vreg);
        let spill_operand = SpillOperand::Allocated(AllocatedOperand::stack_slot(slot_index, rep));
        self.virtual_register_data[vreg] =
            VirtualRegisterData::new(vreg, spill_operand, instr_index, false, false);
    }

    pub(crate) fn define_as_constant_operand(&mut self, vreg: VirtualReg, instr_index: InstIx) {
        self.virtual_register_data[vreg] =
            VirtualRegisterData::new(vreg, SpillOperand::Constant(vreg), instr_index, false, true);
    }

    pub(crate) fn define_as_phi(&mut self, vreg: VirtualReg, instr_index: InstIx) {
        self.virtual_register_data[vreg] =
            VirtualRegisterData::new(vreg, SpillOperand::None, instr_index, true, false);
    }

    //-------------------------------------------------------------------------
    // Spill ranges and spill operands

    fn ensure_spill_range(&mut self, vreg: VirtualReg) {
        debug_assert!(!self.virtual_register_data[vreg].is_constant());
        if self.virtual_register_data[vreg].has_spill_range() {
            return;
        }

        let def_index = self.virtual_register_data[vreg].output_instr_index();
        let def_block = self.block_for_instr(def_index);
        let spill_range = if self.virtual_register_data[vreg].is_phi() {
            // A phi's slot is written in the gap at the exit of every
            // predecessor, so the range must cover those instructions as
            // well as the phi block itself.
            let first = self.code.block(def_block).first_instruction_index();
            let predecessors: Vec<BlockIx> = self.code.block(def_block).predecessors().to_vec();
            let mut live_range = Range::new(first, first);
            for pred in predecessors {
                live_range.add_instr(self.code.block(pred).last_instruction_index());
            }
            SpillRange {
                live_range,
                live_blocks: def_block,
            }
        } else {
            SpillRange {
                live_range: Range::new(def_index, def_index),
                live_blocks: def_block,
            }
        };

        trace!("{:?} spill range {:?}", vreg, spill_range.live_range);
        self.virtual_register_data[vreg].spill_range = Some(spill_range);
        self.spilled_virtual_registers.add(vreg.get_usize());
    }

    fn add_spill_use(&mut self, vreg: VirtualReg, instr_index: InstIx) {
        if self.virtual_register_data[vreg].is_constant() {
            return;
        }
        self.ensure_spill_range(vreg);
        self.virtual_register_data[vreg]
            .spill_range_mut()
            .extend_range_to(instr_index);
    }

    /// Record a spill-slot use of `vreg` at `instr_index` and return the
    /// operand for the slot `target`: the resolved spill operand if there is
    /// one, otherwise a fresh pending placeholder prepended to the virtual
    /// register's chain. The caller is responsible for storing the returned
    /// operand at `target`.
    pub(crate) fn spill_use_operand(
        &mut self,
        vreg: VirtualReg,
        instr_index: InstIx,
        target: OperandRef,
    ) -> InstructionOperand {
        self.add_spill_use(vreg, instr_index);
        match self.virtual_register_data[vreg].spill_operand {
            SpillOperand::Allocated(allocated) => InstructionOperand::Allocated(allocated),
            SpillOperand::Constant(constant) => InstructionOperand::Constant(constant),
            SpillOperand::None | SpillOperand::Pending(_) => {
                debug_assert!(self.virtual_register_data[vreg].has_spill_range());
                let next = match self.virtual_register_data[vreg].spill_operand {
                    SpillOperand::Pending(head) => Some(head),
                    _ => None,
                };
                let ix = self.new_pending_operand(target, next);
                self.virtual_register_data[vreg].spill_operand = SpillOperand::Pending(ix);
                InstructionOperand::Pending(ix)
            }
        }
    }

    /// Overwrite the operand at `slot` with `vreg`'s spill operand (concrete
    /// or pending), extending the spill range to `instr_index`.
    pub(crate) fn spill_operand(&mut self, vreg: VirtualReg, slot: OperandRef, instr_index: InstIx) {
        trace!("spill {:?} at {:?} for {:?}", vreg, instr_index, slot);
        let operand = self.spill_use_operand(vreg, instr_index, slot);
        self.code.replace_operand(slot, operand);
    }

    pub(crate) fn new_pending_operand(
        &mut self,
        slot: OperandRef,
        next: Option<PendingOperandIx>,
    ) -> PendingOperandIx {
        let ix = PendingOperandIx::new(self.pending_operands.len());
        self.pending_operands.push(PendingOperand { slot, next });
        ix
    }

    /// Resolve `vreg`'s whole pending chain to `allocated` (its packed stack
    /// slot).
    pub(crate) fn allocate_pending_spill_operand(
        &mut self,
        vreg: VirtualReg,
        allocated: AllocatedOperand,
    ) {
        debug_assert!(self.virtual_register_data[vreg].has_pending_spill_operand());
        let mut current = match self.virtual_register_data[vreg].spill_operand {
            SpillOperand::Pending(head) => Some(head),
            _ => None,
        };
        while let Some(ix) = current {
            let entry = self.pending_operands[ix];
            self.code
                .replace_operand(entry.slot, InstructionOperand::Allocated(allocated));
            current = entry.next;
        }
        self.virtual_register_data[vreg].spill_operand = SpillOperand::Allocated(allocated);
    }

    //-------------------------------------------------------------------------
    // Gap moves

    pub(crate) fn add_gap_move(
        &mut self,
        instr_index: InstIx,
        pos: GapPosition,
        source: InstructionOperand,
        destination: InstructionOperand,
    ) -> usize {
        self.code.add_gap_move(instr_index, pos, source, destination)
    }

    /// Materialize `vreg` into `to` just before `instr_index`, reading from
    /// its spill slot (or constant). Used when a register holding a real use
    /// is spilled: the value still has to be in the register at the use.
    pub(crate) fn emit_gap_move_to_input_from_spill_slot(
        &mut self,
        vreg: VirtualReg,
        to: AllocatedOperand,
        instr_index: InstIx,
    ) {
        let move_ix = self.code.next_gap_move_index(instr_index, GapPosition::End);
        let source = self.spill_use_operand(
            vreg,
            instr_index,
            OperandRef::MoveSource {
                instr: instr_index,
                pos: GapPosition::End,
                index: move_ix,
            },
        );
        self.code
            .add_gap_move(instr_index, GapPosition::End, source, to.into());
    }

    /// Write `from` into `vreg`'s spill slot in the START gap of
    /// `instr_index`.
    pub(crate) fn emit_gap_move_to_spill_slot(
        &mut self,
        vreg: VirtualReg,
        from: AllocatedOperand,
        instr_index: InstIx,
    ) {
        let move_ix = self.code.next_gap_move_index(instr_index, GapPosition::Start);
        let destination = self.spill_use_operand(
            vreg,
            instr_index,
            OperandRef::MoveDestination {
                instr: instr_index,
                pos: GapPosition::Start,
                index: move_ix,
            },
        );
        self.code
            .add_gap_move(instr_index, GapPosition::Start, from.into(), destination);
    }

    /// Spill an output: the slot write lands after the defining instruction,
    /// which for a block-final instruction means the START gap of each
    /// successor's first instruction. Requires every such successor to have
    /// a single predecessor; the CFG construction upstream guarantees this.
    pub(crate) fn emit_gap_move_from_output_to_spill_slot(
        &mut self,
        vreg: VirtualReg,
        from: AllocatedOperand,
        current_block: BlockIx,
        instr_index: InstIx,
    ) {
        debug_assert_eq!(self.block_for_instr(instr_index), current_block);
        if instr_index == self.code.block(current_block).last_instruction_index() {
            let successors: Vec<BlockIx> =
                self.code.block(current_block).successors().to_vec();
            for succ in successors {
                debug_assert_eq!(self.code.block(succ).predecessor_count(), 1);
                let first = self.code.block(succ).first_instruction_index();
                self.emit_gap_move_to_spill_slot(vreg, from, first);
            }
        } else {
            self.emit_gap_move_to_spill_slot(vreg, from, instr_index.plus(1));
        }
    }
}
