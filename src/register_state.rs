//! Per-block state of the physical registers of one kind: which virtual
//! register each one currently holds, and what has to happen to the
//! operands involved when the register is committed or spilled.
//!
//! A register accumulates *pending* uses while the reverse pass walks
//! upwards: operand slots that will become the register if the defining
//! instruction eventually commits it, or spill-slot reads if register
//! pressure evicts it first. Deferring that decision is what lets a single
//! reverse pass produce allocations that would otherwise need two.

use log::trace;

use crate::allocation_data::AllocationData;
use crate::data_structures::{InstIx, PendingOperandIx, RegisterIndex, VirtualReg};
use crate::instructions::{AllocatedOperand, InstructionOperand, OperandRef};

/// One physical register's in-progress allocation.
struct Register {
    /// True once the register has a committed (non-pending) use; spilling it
    /// then requires a gap move re-materializing the value at that use.
    /// A register can carry many pending uses but only ever one committed
    /// use, because a second one commits the first before taking over.
    needs_gap_move_on_spill: bool,
    /// The lowest instruction index the current allocation is used at. This
    /// is both where a spill's gap move goes and how far the virtual
    /// register's spill range must reach.
    last_use_instr_index: InstIx,
    virtual_register: Option<VirtualReg>,
    pending_uses: Option<PendingOperandIx>,
}

impl Register {
    fn new() -> Self {
        Self {
            needs_gap_move_on_spill: false,
            last_use_instr_index: InstIx::new(0),
            virtual_register: None,
            pending_uses: None,
        }
    }

    fn reset(&mut self) {
        self.needs_gap_move_on_spill = false;
        self.last_use_instr_index = InstIx::new(0);
        self.virtual_register = None;
        self.pending_uses = None;
    }

    fn is_allocated(&self) -> bool {
        self.virtual_register.is_some()
    }
}

/// The registers of one kind within one block. Created lazily on the first
/// allocation in a block and discarded at the block's end; no register
/// survives a block boundary.
pub struct RegisterState {
    registers: Vec<Register>,
}

impl RegisterState {
    pub fn new(num_allocatable_registers: usize) -> Self {
        Self {
            registers: (0..num_allocatable_registers).map(|_| Register::new()).collect(),
        }
    }

    pub fn is_allocated(&self, reg: RegisterIndex) -> bool {
        self.registers[reg.get_usize()].is_allocated()
    }

    pub fn virtual_register_for(&self, reg: RegisterIndex) -> Option<VirtualReg> {
        self.registers[reg.get_usize()].virtual_register
    }

    /// True if spilling `reg` would not cost a gap move.
    pub fn has_pending_uses_only(&self, reg: RegisterIndex) -> bool {
        debug_assert!(self.is_allocated(reg));
        !self.registers[reg.get_usize()].needs_gap_move_on_spill
    }

    /// Mark `reg` as holding `vreg` with a committed use at `instr_index`.
    /// The register must be free: a prior allocation has to be committed or
    /// spilled first.
    pub fn allocate_use(&mut self, reg: RegisterIndex, vreg: VirtualReg, instr_index: InstIx) {
        let register = &mut self.registers[reg.get_usize()];
        debug_assert!(!register.is_allocated());
        register.needs_gap_move_on_spill = true;
        register.virtual_register = Some(vreg);
        register.last_use_instr_index = instr_index;
    }

    /// Record a pending use of `reg` by `vreg`: overwrite the operand at
    /// `slot` with a placeholder linked onto the register's chain. The
    /// binding is decided when the register is committed or spilled.
    pub fn allocate_pending_use(
        &mut self,
        reg: RegisterIndex,
        vreg: VirtualReg,
        slot: OperandRef,
        instr_index: InstIx,
        data: &mut AllocationData,
    ) {
        {
            let register = &mut self.registers[reg.get_usize()];
            if !register.is_allocated() {
                register.virtual_register = Some(vreg);
                register.last_use_instr_index = instr_index;
            }
            debug_assert_eq!(register.virtual_register, Some(vreg));
            debug_assert!(register.last_use_instr_index >= instr_index);
        }
        let next = self.registers[reg.get_usize()].pending_uses;
        let ix = data.new_pending_operand(slot, next);
        data.code.replace_operand(slot, InstructionOperand::Pending(ix));
        self.registers[reg.get_usize()].pending_uses = Some(ix);
    }

    /// The register's value source has been decided to be `allocated`:
    /// resolve every pending use to it and free the register.
    pub fn commit(&mut self, reg: RegisterIndex, allocated: AllocatedOperand, data: &mut AllocationData) {
        let register = &mut self.registers[reg.get_usize()];
        if !register.is_allocated() {
            return;
        }
        let mut current = register.pending_uses.take();
        while let Some(ix) = current {
            let entry = data.pending_operands[ix];
            data.code
                .replace_operand(entry.slot, InstructionOperand::Allocated(allocated));
            current = entry.next;
        }
        register.reset();
    }

    /// Evict the register: re-materialize a committed use from the spill
    /// slot with a gap move, convert every pending use into a spill-slot
    /// read, and free the register.
    pub fn spill(&mut self, reg: RegisterIndex, allocated: AllocatedOperand, data: &mut AllocationData) {
        let (vreg, last_use, needs_gap_move, mut current) = {
            let register = &self.registers[reg.get_usize()];
            debug_assert!(register.is_allocated());
            (
                register.virtual_register.expect("spilling an unallocated register"),
                register.last_use_instr_index,
                register.needs_gap_move_on_spill,
                register.pending_uses,
            )
        };
        trace!("spill {:?} holding {:?}", reg, vreg);
        if needs_gap_move {
            data.emit_gap_move_to_input_from_spill_slot(vreg, allocated, last_use);
        }
        while let Some(ix) = current {
            let entry = data.pending_operands[ix];
            data.spill_operand(vreg, entry.slot, last_use);
            current = entry.next;
        }
        self.registers[reg.get_usize()].reset();
    }
}
