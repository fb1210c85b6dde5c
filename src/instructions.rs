//! The instruction sequence the allocator transforms, together with the
//! operand taxonomy, the register configuration, the stack frame and the
//! per-safepoint reference maps.
//!
//! The sequence is consumed read-only except for three mutations: operand
//! slots are rewritten in place from unallocated to allocated (or pending)
//! form, parallel gap moves are appended between instructions, and the frame
//! is asked for stack slots. Operands are plain `Copy` values; every rewrite
//! goes through [`InstructionSequence::replace_operand`] addressed by an
//! [`OperandRef`].

use smallvec::SmallVec;

use crate::data_structures::{BitVec, BlockIx, InstIx, PendingOperandIx, TypedIxVec, VirtualReg};
use std::fmt;

//=============================================================================
// Machine representations

/// The machine-level type of a virtual register. Determines which register
/// kind the value allocates from and the byte width of its spill slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MachineRepresentation {
    Word32,
    Word64,
    Float32,
    Float64,
    Simd128,
    /// A tagged heap reference, tracked by the garbage collector.
    Tagged,
}

impl MachineRepresentation {
    /// Floating-point values (including vectors) allocate from the double
    /// register file; everything else from the general file.
    pub fn is_floating_point(self) -> bool {
        matches!(
            self,
            MachineRepresentation::Float32
                | MachineRepresentation::Float64
                | MachineRepresentation::Simd128
        )
    }

    pub fn is_reference(self) -> bool {
        self == MachineRepresentation::Tagged
    }

    /// Spill slots are system-pointer sized except for vector values.
    pub fn byte_width_for_spill_slot(self) -> usize {
        match self {
            MachineRepresentation::Simd128 => 16,
            _ => 8,
        }
    }
}

/// Representation assumed for virtual registers never explicitly tagged.
pub const DEFAULT_REPRESENTATION: MachineRepresentation = MachineRepresentation::Word64;

/// The two register files handled by the allocator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegisterKind {
    General,
    Double,
}

//=============================================================================
// Operands

/// Constraint placed on an unallocated operand by the instruction format.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandPolicy {
    /// Must be in a register.
    Register,
    /// Register or spill slot, allocator's choice.
    RegisterOrSlot,
    /// Register, spill slot or the constant itself.
    RegisterOrSlotOrConstant,
    /// Must be in a spill slot.
    Slot,
    /// Must be in the given frame slot.
    FixedSlot(i32),
    /// Must be in the general register with the given code.
    FixedRegister(u8),
    /// Must be in the floating-point register with the given code.
    FixedFPRegister(u8),
    /// Output only: must be wherever input 0 ends up.
    SameAsInput,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UnallocatedOperand {
    pub policy: OperandPolicy,
    pub virtual_register: VirtualReg,
    pub used_at_start: bool,
}

impl UnallocatedOperand {
    pub fn new(policy: OperandPolicy, virtual_register: VirtualReg) -> Self {
        Self {
            policy,
            virtual_register,
            used_at_start: false,
        }
    }

    pub fn at_start(mut self) -> Self {
        self.used_at_start = true;
        self
    }
}

impl fmt::Debug for UnallocatedOperand {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{:?}({:?})", self.virtual_register, self.policy)?;
        if self.used_at_start {
            write!(fmt, "@start")?;
        }
        Ok(())
    }
}

/// Whether an allocated operand lives in a register or on the stack.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LocationKind {
    Register,
    StackSlot,
}

/// A fully-allocated operand: a register code or a frame slot index, plus the
/// representation of the value it carries.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AllocatedOperand {
    pub kind: LocationKind,
    pub rep: MachineRepresentation,
    pub index: i32,
}

impl AllocatedOperand {
    pub fn register(code: u8, rep: MachineRepresentation) -> Self {
        Self {
            kind: LocationKind::Register,
            rep,
            index: code as i32,
        }
    }

    pub fn stack_slot(index: i32, rep: MachineRepresentation) -> Self {
        Self {
            kind: LocationKind::StackSlot,
            rep,
            index,
        }
    }

    pub fn is_register(&self) -> bool {
        self.kind == LocationKind::Register
    }

    pub fn is_stack_slot(&self) -> bool {
        self.kind == LocationKind::StackSlot
    }
}

impl fmt::Debug for AllocatedOperand {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            LocationKind::Register => write!(fmt, "R{}", self.index),
            LocationKind::StackSlot => write!(fmt, "S{}", self.index),
        }
    }
}

/// An operand slot in the sequence. A fixed-size tagged union; rewriting a
/// slot is a plain overwrite of the whole value.
///
/// `Pending` is a placeholder for a binding that the single reverse pass has
/// not decided yet; the index points into the pass's side table of pending
/// operands, which threads each placeholder onto the chain of its virtual
/// register or register. All placeholders are overwritten with concrete
/// operands before allocation completes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum InstructionOperand {
    Unallocated(UnallocatedOperand),
    Constant(VirtualReg),
    Allocated(AllocatedOperand),
    Pending(PendingOperandIx),
}

impl InstructionOperand {
    pub fn is_unallocated(&self) -> bool {
        matches!(self, InstructionOperand::Unallocated(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, InstructionOperand::Constant(_))
    }

    pub fn is_allocated(&self) -> bool {
        matches!(self, InstructionOperand::Allocated(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, InstructionOperand::Pending(_))
    }

    pub fn as_unallocated(&self) -> Option<UnallocatedOperand> {
        match self {
            InstructionOperand::Unallocated(unallocated) => Some(*unallocated),
            _ => None,
        }
    }

    pub fn as_allocated(&self) -> Option<AllocatedOperand> {
        match self {
            InstructionOperand::Allocated(allocated) => Some(*allocated),
            _ => None,
        }
    }
}

impl From<AllocatedOperand> for InstructionOperand {
    fn from(allocated: AllocatedOperand) -> Self {
        InstructionOperand::Allocated(allocated)
    }
}

impl fmt::Debug for InstructionOperand {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InstructionOperand::Unallocated(unallocated) => unallocated.fmt(fmt),
            InstructionOperand::Constant(vreg) => write!(fmt, "const:{:?}", vreg),
            InstructionOperand::Allocated(allocated) => allocated.fmt(fmt),
            InstructionOperand::Pending(ix) => write!(fmt, "pending:{:?}", ix),
        }
    }
}

//=============================================================================
// Gap moves

/// The two parallel-move positions in the gap preceding an instruction.
/// START moves run first, then END moves, then the instruction itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GapPosition {
    Start,
    End,
}

impl GapPosition {
    fn index(self) -> usize {
        match self {
            GapPosition::Start => 0,
            GapPosition::End => 1,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MoveOperands {
    pub source: InstructionOperand,
    pub destination: InstructionOperand,
}

pub type ParallelMove = Vec<MoveOperands>;

//=============================================================================
// Reference maps

/// Per-safepoint record of the stack slots holding live heap references.
#[derive(Clone, Debug, Default)]
pub struct ReferenceMap {
    reference_operands: Vec<AllocatedOperand>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reference(&mut self, allocated: AllocatedOperand) {
        debug_assert!(allocated.is_stack_slot());
        self.reference_operands.push(allocated);
    }

    pub fn reference_operands(&self) -> &[AllocatedOperand] {
        &self.reference_operands
    }
}

//=============================================================================
// Instructions and blocks

/// Locates one operand slot in the sequence, so that rewrites can be
/// expressed without holding references into the instruction storage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum OperandRef {
    Output { instr: InstIx, index: usize },
    Input { instr: InstIx, index: usize },
    Temp { instr: InstIx, index: usize },
    MoveSource { instr: InstIx, pos: GapPosition, index: usize },
    MoveDestination { instr: InstIx, pos: GapPosition, index: usize },
}

pub struct Instruction {
    outputs: SmallVec<[InstructionOperand; 2]>,
    inputs: SmallVec<[InstructionOperand; 4]>,
    temps: SmallVec<[InstructionOperand; 2]>,
    clobbers_registers: bool,
    clobbers_double_registers: bool,
    reference_map: Option<ReferenceMap>,
    gap_moves: [Option<ParallelMove>; 2],
    block: BlockIx,
}

impl Instruction {
    pub fn new(
        outputs: Vec<InstructionOperand>,
        inputs: Vec<InstructionOperand>,
        temps: Vec<InstructionOperand>,
    ) -> Self {
        Self {
            outputs: SmallVec::from_vec(outputs),
            inputs: SmallVec::from_vec(inputs),
            temps: SmallVec::from_vec(temps),
            clobbers_registers: false,
            clobbers_double_registers: false,
            reference_map: None,
            gap_moves: [None, None],
            block: BlockIx::new(0),
        }
    }

    /// Mark as clobbering every general register (calls and the like).
    pub fn set_clobbers_registers(mut self) -> Self {
        self.clobbers_registers = true;
        self
    }

    /// Mark as clobbering every floating-point register.
    pub fn set_clobbers_double_registers(mut self) -> Self {
        self.clobbers_double_registers = true;
        self
    }

    /// Attach an (empty) reference map, marking this as a safepoint.
    pub fn set_reference_map(mut self) -> Self {
        self.reference_map = Some(ReferenceMap::new());
        self
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn temp_count(&self) -> usize {
        self.temps.len()
    }

    pub fn output_at(&self, index: usize) -> InstructionOperand {
        self.outputs[index]
    }

    pub fn input_at(&self, index: usize) -> InstructionOperand {
        self.inputs[index]
    }

    pub fn temp_at(&self, index: usize) -> InstructionOperand {
        self.temps[index]
    }

    pub fn clobbers_registers(&self) -> bool {
        self.clobbers_registers
    }

    pub fn clobbers_double_registers(&self) -> bool {
        self.clobbers_double_registers
    }

    pub fn has_reference_map(&self) -> bool {
        self.reference_map.is_some()
    }

    pub fn reference_map(&self) -> Option<&ReferenceMap> {
        self.reference_map.as_ref()
    }

    pub fn reference_map_mut(&mut self) -> Option<&mut ReferenceMap> {
        self.reference_map.as_mut()
    }

    pub fn parallel_move(&self, pos: GapPosition) -> Option<&ParallelMove> {
        self.gap_moves[pos.index()].as_ref()
    }

    pub fn get_or_create_parallel_move(&mut self, pos: GapPosition) -> &mut ParallelMove {
        self.gap_moves[pos.index()].get_or_insert_with(Vec::new)
    }

    pub fn block(&self) -> BlockIx {
        self.block
    }
}

/// A phi at a block entry: the defined virtual register and one input
/// virtual register per predecessor, in predecessor order.
#[derive(Clone, Debug)]
pub struct PhiInstruction {
    pub virtual_register: VirtualReg,
    pub operands: SmallVec<[VirtualReg; 2]>,
}

pub struct InstructionBlock {
    rpo_number: BlockIx,
    first_instruction_index: InstIx,
    last_instruction_index: InstIx,
    successors: SmallVec<[BlockIx; 2]>,
    predecessors: SmallVec<[BlockIx; 2]>,
    dominator: Option<BlockIx>,
    is_loop_header: bool,
    loop_end: Option<BlockIx>,
    phis: Vec<PhiInstruction>,
}

impl InstructionBlock {
    pub fn rpo_number(&self) -> BlockIx {
        self.rpo_number
    }

    pub fn first_instruction_index(&self) -> InstIx {
        self.first_instruction_index
    }

    pub fn last_instruction_index(&self) -> InstIx {
        self.last_instruction_index
    }

    pub fn successors(&self) -> &[BlockIx] {
        &self.successors
    }

    pub fn predecessors(&self) -> &[BlockIx] {
        &self.predecessors
    }

    pub fn predecessor_count(&self) -> usize {
        self.predecessors.len()
    }

    pub fn dominator(&self) -> Option<BlockIx> {
        self.dominator
    }

    pub fn is_loop_header(&self) -> bool {
        self.is_loop_header
    }

    /// RPO number one past the last block of the loop, when a loop header.
    pub fn loop_end(&self) -> Option<BlockIx> {
        self.loop_end
    }

    pub fn phis(&self) -> &[PhiInstruction] {
        &self.phis
    }
}

//=============================================================================
// The sequence

pub struct InstructionSequence {
    blocks: TypedIxVec<BlockIx, InstructionBlock>,
    instructions: TypedIxVec<InstIx, Instruction>,
    representations: TypedIxVec<VirtualReg, MachineRepresentation>,
}

impl InstructionSequence {
    pub fn block_count(&self) -> u32 {
        self.blocks.len()
    }

    pub fn block(&self, block: BlockIx) -> &InstructionBlock {
        &self.blocks[block]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &InstructionBlock> {
        self.blocks.iter()
    }

    pub fn instruction_count(&self) -> u32 {
        self.instructions.len()
    }

    pub fn instruction_at(&self, index: InstIx) -> &Instruction {
        &self.instructions[index]
    }

    pub fn instruction_at_mut(&mut self, index: InstIx) -> &mut Instruction {
        &mut self.instructions[index]
    }

    pub fn virtual_register_count(&self) -> u32 {
        self.representations.len()
    }

    pub fn representation_for(&self, vreg: VirtualReg) -> MachineRepresentation {
        self.representations[vreg]
    }

    pub fn is_reference(&self, vreg: VirtualReg) -> bool {
        self.representation_for(vreg).is_reference()
    }

    /// Read the operand at `slot`.
    pub fn operand(&self, slot: OperandRef) -> InstructionOperand {
        match slot {
            OperandRef::Output { instr, index } => self.instructions[instr].outputs[index],
            OperandRef::Input { instr, index } => self.instructions[instr].inputs[index],
            OperandRef::Temp { instr, index } => self.instructions[instr].temps[index],
            OperandRef::MoveSource { instr, pos, index } => {
                self.move_at(instr, pos, index).source
            }
            OperandRef::MoveDestination { instr, pos, index } => {
                self.move_at(instr, pos, index).destination
            }
        }
    }

    /// Overwrite the operand at `slot` in place.
    pub fn replace_operand(&mut self, slot: OperandRef, operand: InstructionOperand) {
        match slot {
            OperandRef::Output { instr, index } => {
                self.instructions[instr].outputs[index] = operand;
            }
            OperandRef::Input { instr, index } => {
                self.instructions[instr].inputs[index] = operand;
            }
            OperandRef::Temp { instr, index } => {
                self.instructions[instr].temps[index] = operand;
            }
            OperandRef::MoveSource { instr, pos, index } => {
                self.move_at_mut(instr, pos, index).source = operand;
            }
            OperandRef::MoveDestination { instr, pos, index } => {
                self.move_at_mut(instr, pos, index).destination = operand;
            }
        }
    }

    /// The index the next gap move appended at `(instr, pos)` will get.
    pub fn next_gap_move_index(&self, instr: InstIx, pos: GapPosition) -> usize {
        self.instructions[instr]
            .parallel_move(pos)
            .map_or(0, |moves| moves.len())
    }

    pub fn gap_move_count(&self, instr: InstIx, pos: GapPosition) -> usize {
        self.next_gap_move_index(instr, pos)
    }

    /// Append a gap move, returning its index within the parallel move.
    pub fn add_gap_move(
        &mut self,
        instr: InstIx,
        pos: GapPosition,
        source: InstructionOperand,
        destination: InstructionOperand,
    ) -> usize {
        let moves = self.instructions[instr].get_or_create_parallel_move(pos);
        moves.push(MoveOperands {
            source,
            destination,
        });
        moves.len() - 1
    }

    fn move_at(&self, instr: InstIx, pos: GapPosition, index: usize) -> &MoveOperands {
        &self.instructions[instr]
            .parallel_move(pos)
            .expect("no parallel move at this gap position")[index]
    }

    fn move_at_mut(&mut self, instr: InstIx, pos: GapPosition, index: usize) -> &mut MoveOperands {
        &mut self.instructions[instr].get_or_create_parallel_move(pos)[index]
    }
}

//=============================================================================
// Sequence construction

/// Builds an [`InstructionSequence`]: blocks are opened and closed in RPO
/// order, instructions are numbered contiguously, and predecessor lists are
/// derived from the successor lists when the sequence is finished.
pub struct InstructionSequenceBuilder {
    blocks: Vec<InstructionBlock>,
    instructions: Vec<Instruction>,
    representations: Vec<MachineRepresentation>,
    current_block: Option<BlockIx>,
}

impl InstructionSequenceBuilder {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            instructions: Vec::new(),
            representations: Vec::new(),
            current_block: None,
        }
    }

    /// Create a fresh virtual register of the given representation.
    pub fn new_vreg(&mut self, rep: MachineRepresentation) -> VirtualReg {
        let vreg = VirtualReg::new(self.representations.len() as u32);
        self.representations.push(rep);
        vreg
    }

    /// Open a new block. `dominator` is the immediate dominator; only the
    /// entry block may have none.
    pub fn begin_block(&mut self, dominator: Option<BlockIx>) -> BlockIx {
        assert!(self.current_block.is_none(), "previous block still open");
        let rpo_number = BlockIx::new(self.blocks.len() as u32);
        self.blocks.push(InstructionBlock {
            rpo_number,
            first_instruction_index: InstIx::new(self.instructions.len() as u32),
            last_instruction_index: InstIx::new(0),
            successors: SmallVec::new(),
            predecessors: SmallVec::new(),
            dominator,
            is_loop_header: false,
            loop_end: None,
            phis: Vec::new(),
        });
        self.current_block = Some(rpo_number);
        rpo_number
    }

    /// Mark the open block as a loop header whose loop body is the RPO range
    /// `[header, loop_end)`.
    pub fn mark_loop_header(&mut self, loop_end: BlockIx) {
        let block = self.open_block_mut();
        block.is_loop_header = true;
        block.loop_end = Some(loop_end);
    }

    /// Add a phi to the open block. `operands` are the input virtual
    /// registers, one per predecessor in predecessor (RPO) order.
    pub fn add_phi(&mut self, virtual_register: VirtualReg, operands: &[VirtualReg]) {
        let phi = PhiInstruction {
            virtual_register,
            operands: SmallVec::from_slice(operands),
        };
        self.open_block_mut().phis.push(phi);
    }

    /// Append an instruction to the open block, returning its index.
    pub fn add_instruction(&mut self, instruction: Instruction) -> InstIx {
        let block = self.current_block.expect("no open block");
        let index = InstIx::new(self.instructions.len() as u32);
        let mut instruction = instruction;
        instruction.block = block;
        self.instructions.push(instruction);
        index
    }

    /// Close the open block, recording its successors.
    pub fn end_block(&mut self, successors: &[BlockIx]) {
        let next = self.instructions.len() as u32;
        let block = self.open_block_mut();
        assert!(
            next > block.first_instruction_index.get(),
            "a block must contain at least one instruction"
        );
        block.last_instruction_index = InstIx::new(next - 1);
        block.successors = SmallVec::from_slice(successors);
        self.current_block = None;
    }

    /// Finish the sequence: validate successor indices and derive the
    /// predecessor lists (in RPO order, which is also the order phi operands
    /// are given in).
    pub fn finish(self) -> InstructionSequence {
        assert!(self.current_block.is_none(), "last block still open");
        let mut blocks = self.blocks;
        let block_count = blocks.len();
        for block_ix in 0..block_count {
            for succ_ix in 0..blocks[block_ix].successors.len() {
                let succ = blocks[block_ix].successors[succ_ix];
                assert!(succ.get_usize() < block_count, "successor out of range");
                let pred = BlockIx::new(block_ix as u32);
                blocks[succ.get_usize()].predecessors.push(pred);
            }
        }
        InstructionSequence {
            blocks: TypedIxVec::from_vec(blocks),
            instructions: TypedIxVec::from_vec(self.instructions),
            representations: TypedIxVec::from_vec(self.representations),
        }
    }

    fn open_block_mut(&mut self) -> &mut InstructionBlock {
        let block = self.current_block.expect("no open block");
        &mut self.blocks[block.get_usize()]
    }
}

//=============================================================================
// Register configuration

/// The allocatable register files, as provided by the embedder: for each
/// kind, the total number of architectural registers and the codes of the
/// ones the allocator may use. At most a machine word of allocatable
/// registers per kind, so that register sets fit in one word.
pub struct RegisterConfiguration {
    num_general_registers: usize,
    num_double_registers: usize,
    allocatable_general_codes: Vec<u8>,
    allocatable_double_codes: Vec<u8>,
}

impl RegisterConfiguration {
    pub fn new(
        num_general_registers: usize,
        allocatable_general_codes: Vec<u8>,
        num_double_registers: usize,
        allocatable_double_codes: Vec<u8>,
    ) -> Self {
        assert!(allocatable_general_codes.len() <= 64);
        assert!(allocatable_double_codes.len() <= 64);
        assert!(allocatable_general_codes
            .iter()
            .all(|&code| (code as usize) < num_general_registers));
        assert!(allocatable_double_codes
            .iter()
            .all(|&code| (code as usize) < num_double_registers));
        Self {
            num_general_registers,
            num_double_registers,
            allocatable_general_codes,
            allocatable_double_codes,
        }
    }

    pub fn num_registers(&self, kind: RegisterKind) -> usize {
        match kind {
            RegisterKind::General => self.num_general_registers,
            RegisterKind::Double => self.num_double_registers,
        }
    }

    pub fn num_allocatable_registers(&self, kind: RegisterKind) -> usize {
        self.allocatable_register_codes(kind).len()
    }

    pub fn allocatable_register_codes(&self, kind: RegisterKind) -> &[u8] {
        match kind {
            RegisterKind::General => &self.allocatable_general_codes,
            RegisterKind::Double => &self.allocatable_double_codes,
        }
    }
}

//=============================================================================
// The frame

/// The stack frame under construction. Hands out spill slots and records
/// which registers allocation ended up touching.
pub struct Frame {
    spill_slot_widths: Vec<usize>,
    allocated_registers: Option<BitVec>,
    allocated_double_registers: Option<BitVec>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            spill_slot_widths: Vec::new(),
            allocated_registers: None,
            allocated_double_registers: None,
        }
    }

    /// Allocate a fresh spill slot of the given byte width, returning its
    /// index.
    pub fn allocate_spill_slot(&mut self, byte_width: usize) -> i32 {
        let index = self.spill_slot_widths.len() as i32;
        self.spill_slot_widths.push(byte_width);
        index
    }

    pub fn spill_slot_count(&self) -> usize {
        self.spill_slot_widths.len()
    }

    pub fn spill_slot_width(&self, index: usize) -> usize {
        self.spill_slot_widths[index]
    }

    pub fn set_allocated_registers(&mut self, registers: BitVec) {
        self.allocated_registers = Some(registers);
    }

    pub fn set_allocated_double_registers(&mut self, registers: BitVec) {
        self.allocated_double_registers = Some(registers);
    }

    pub fn allocated_registers(&self) -> Option<&BitVec> {
        self.allocated_registers.as_ref()
    }

    pub fn allocated_double_registers(&self) -> Option<&BitVec> {
        self.allocated_double_registers.as_ref()
    }
}

//=============================================================================
// Tick counter

/// Cooperative-safepoint hook, bumped once per block per pass. The embedder
/// can poll the count from another thread to decide when to interrupt a long
/// compilation; this crate only counts.
#[derive(Default)]
pub struct TickCounter {
    ticks: u64,
}

impl TickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
