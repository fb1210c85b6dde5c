//! Packs pending spill operands onto stack slots. Spilled virtual registers
//! are processed in order of their first slot use, sweeping a position
//! cursor forward; slots whose last use is behind the cursor return to a
//! free pool and are reused for later values of the same byte width.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use log::debug;

use crate::allocation_data::AllocationData;
use crate::data_structures::{InstIx, Range, VirtualReg};
use crate::instructions::AllocatedOperand;

struct SpillSlot {
    stack_slot: i32,
    byte_width: usize,
    range: Range,
}

struct SpillSlotAllocator {
    slots: Vec<SpillSlot>,
    /// Slots currently holding a live value, keyed by last use so that the
    /// soonest-expiring slot surfaces first.
    allocated_slots: BinaryHeap<(Reverse<InstIx>, usize)>,
    free_slots: VecDeque<usize>,
    position: InstIx,
}

impl SpillSlotAllocator {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            allocated_slots: BinaryHeap::new(),
            free_slots: VecDeque::new(),
            position: InstIx::new(0),
        }
    }

    /// Retire every slot whose last use is before `instr_index`.
    fn advance_to(&mut self, instr_index: InstIx) {
        debug_assert!(self.position <= instr_index);
        while let Some(&(Reverse(last_use), slot_ix)) = self.allocated_slots.peek() {
            if instr_index > last_use {
                self.allocated_slots.pop();
                self.free_slots.push_front(slot_ix);
            } else {
                break;
            }
        }
        self.position = instr_index;
    }

    fn get_free_slot(&mut self, byte_width: usize) -> Option<usize> {
        let found = self
            .free_slots
            .iter()
            .position(|&slot_ix| self.slots[slot_ix].byte_width == byte_width)?;
        self.free_slots.remove(found)
    }

    fn allocate(&mut self, data: &mut AllocationData, vreg: VirtualReg) {
        debug_assert!(data.vreg_data(vreg).has_pending_spill_operand());
        let rep = data.representation_for(vreg);
        let byte_width = rep.byte_width_for_spill_slot();
        let live_range = *data.vreg_data(vreg).spill_range().live_range();

        self.advance_to(live_range.start());

        // Reuse an expired slot of the right width if there is one.
        let slot_ix = match self.get_free_slot(byte_width) {
            Some(slot_ix) => slot_ix,
            None => {
                let stack_slot = data.frame.allocate_spill_slot(byte_width);
                self.slots.push(SpillSlot {
                    stack_slot,
                    byte_width,
                    range: Range::empty(),
                });
                self.slots.len() - 1
            }
        };

        self.slots[slot_ix].range.add_range(&live_range);
        let allocated = AllocatedOperand::stack_slot(self.slots[slot_ix].stack_slot, rep);
        debug!("{:?} -> spill slot {} {:?}", vreg, self.slots[slot_ix].stack_slot, live_range);
        data.allocate_pending_spill_operand(vreg, allocated);
        self.allocated_slots
            .push((Reverse(self.slots[slot_ix].range.end()), slot_ix));
    }
}

/// Resolve every pending spill operand against a packed stack layout.
pub fn allocate_spill_slots(data: &mut AllocationData) {
    let mut spilled: Vec<_> = data
        .spilled_vregs()
        .into_iter()
        .filter(|&vreg| data.vreg_data(vreg).has_pending_spill_operand())
        .collect();

    // Process in order of first use so the sweep over slot lifetimes is
    // linear.
    spilled.sort_by_key(|&vreg| data.vreg_data(vreg).spill_range().live_range().start());

    let mut allocator = SpillSlotAllocator::new();
    for vreg in spilled {
        allocator.allocate(data, vreg);
    }
}
