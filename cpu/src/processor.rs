//! The B5500 processor.
//!
//! The processor is a stack machine.  The top two stack cells are
//! kept in the A and B registers, each with a flag (AROF, BROF)
//! saying whether the register holds a value; the rest of the stack
//! is in memory below S.  Programs are sequences of 12-bit syllables
//! packed four to a word.
//!
//! There are two modes of execution.  In word mode, syllables push
//! literals, operands and descriptors, or are operators acting on
//! the top of the stack.  In character mode (entered by CMN) A and
//! B instead buffer the current source and destination words, and
//! syllables move, compare and edit character strings.
//!
//! The processor runs in time slices.  At every syllable boundary
//! in normal state it checks for a pending interrupt, and if there
//! is one it executes a Store For Interrupt instead of the next
//! program syllable.
//!
//! The operators are implemented in the submodules:
//!
//! - `stack`: adjustment of the A and B registers.
//! - `op_word`: word-mode syllables.
//! - `op_char`: character-mode syllables.
//! - `sfi`: Store For Interrupt and Initiate.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, span, Level};

use base::prelude::*;

use super::central::CentralControl;
use super::interrupt::{I_ADDRESS, I_PARITY};
use super::memory::{AccessRequest, MemoryAccessError};
use super::types::{ProcessorId, Requestor};

mod control_word;
mod op_char;
mod op_word;
mod sfi;
mod stack;
mod timing;

pub use timing::{next_slice_delay_ms, CYCLES_PER_MS, MEMORY_CYCLES, SLICE_CYCLES};

/// The syllable the processor executes instead of the next program
/// syllable when it takes an interrupt (SFI, octal 3011).
pub const SFI_SYLLABLE: u16 = 0o3011;

/// The register set.  Register names are the ones used in the
/// machine documentation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Registers {
    pub a: Word,
    pub arof: bool,
    pub b: Word,
    pub brof: bool,
    /// Address of the current program word.
    pub c: u16,
    /// Index of the next syllable within the program word.
    pub l: u8,
    /// The current program word.
    pub p: Word,
    pub prof: bool,
    /// The syllable being executed.
    pub t: u16,
    pub trof: bool,
    /// Stack pointer; in character mode, the source word address.
    pub s: u16,
    /// Address of the most recent stack mark.
    pub f: u16,
    /// PRT base; the Program Reference Table starts at R*64.
    pub r: u16,
    /// Destination word address in character mode.
    pub m: u16,
    pub n: u8,
    /// Loop control.
    pub x: Word,
    pub y: u8,
    pub z: u8,
    /// Destination character and bit.
    pub g: u8,
    pub h: u8,
    /// Source character and bit.
    pub k: u8,
    pub v: u8,
    /// Maintenance flip-flops Q01F to Q09F.
    pub q: u16,
    /// Normal state (clear means control state).
    pub ncsf: bool,
    /// Mark stack.
    pub msff: bool,
    /// Subroutine level.
    pub salf: bool,
    /// Variant mode.
    pub varf: bool,
    /// Character mode.
    pub cwmf: bool,
    /// The true/false flip-flop of the character-mode tests.
    pub tfff: bool,
    pub tally: u8,
    /// A repeat count set by CRF for the next syllable.
    pub repeat_override: Option<u8>,
}

/// Why a processor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorFault {
    /// P1 suffered a memory error while in control state.
    ControlStateMemoryError(MemoryAccessError),
}

impl Display for ProcessorFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorFault::ControlStateMemoryError(e) => {
                write!(f, "memory error in control state: {e}")
            }
        }
    }
}

impl std::error::Error for ProcessorFault {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorStatus {
    pub id: ProcessorId,
    pub busy: bool,
    pub registers: Registers,
    pub cycles: u64,
    pub fault: Option<String>,
}

#[derive(Debug)]
pub struct Processor {
    id: ProcessorId,
    pub(crate) regs: Registers,
    busy: bool,
    fault: Option<ProcessorFault>,
    /// Cycles used in the current slice.
    slice_cycles: u64,
    total_cycles: u64,
}

impl Processor {
    pub fn new(id: ProcessorId) -> Processor {
        Processor {
            id,
            regs: Registers::default(),
            busy: false,
            fault: None,
            slice_cycles: 0,
            total_cycles: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> ProcessorId {
        self.id
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    #[must_use]
    pub fn fault(&self) -> Option<ProcessorFault> {
        self.fault
    }

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn status(&self) -> ProcessorStatus {
        ProcessorStatus {
            id: self.id,
            busy: self.busy,
            registers: self.regs.clone(),
            cycles: self.total_cycles,
            fault: self.fault.map(|f| f.to_string()),
        }
    }

    /// Power-on clear.
    pub fn clear(&mut self) {
        self.regs = Registers::default();
        self.busy = false;
        self.fault = None;
        self.slice_cycles = 0;
    }

    pub fn halt(&mut self) {
        if self.busy {
            event!(Level::INFO, "{} halted", self.id);
        }
        self.busy = false;
    }

    /// Starts the processor in control state at `addr`; this is how
    /// P1 begins after a Load.
    pub fn start_at(&mut self, addr: u16) {
        self.clear();
        self.regs.c = addr & ADDRESS_MASK;
        self.regs.l = 0;
        self.regs.ncsf = false;
        self.busy = true;
    }

    /// Starts P2 from the INCW in cell 8.
    pub fn start_from_cell_8(&mut self, cc: &mut CentralControl) {
        self.fault = None;
        self.busy = true;
        self.regs.ncsf = false;
        let incw = self.fetch(cc, 0o10);
        self.initiate(cc, incw, false);
    }

    fn requestor(&self) -> Requestor {
        Requestor::Processor(self.id)
    }

    fn memory_error(&mut self, cc: &mut CentralControl, e: MemoryAccessError) {
        if self.id == ProcessorId::P1 && !self.regs.ncsf {
            event!(Level::ERROR, "{} halted: {}", self.id, e);
            self.fault = Some(ProcessorFault::ControlStateMemoryError(e));
            self.busy = false;
        } else {
            event!(Level::DEBUG, "{}: {}", self.id, e);
            let bit = match e {
                MemoryAccessError::Address(_) => I_ADDRESS,
                MemoryAccessError::Parity(_) => I_PARITY,
            };
            cc.set_processor_interrupt(self.id, bit);
        }
    }

    /// Fetches a word.  A failed fetch gives zero.
    pub(crate) fn fetch(&mut self, cc: &mut CentralControl, addr: u16) -> Word {
        self.slice_cycles += MEMORY_CYCLES;
        let mut req = AccessRequest::new(self.requestor(), addr, self.regs.ncsf);
        cc.fetch(&mut req);
        match req.outcome() {
            Ok(w) => w,
            Err(e) => {
                self.memory_error(cc, e);
                0
            }
        }
    }

    /// Stores a word.  Returns false if the store failed.
    pub(crate) fn store(&mut self, cc: &mut CentralControl, addr: u16, w: Word) -> bool {
        self.slice_cycles += MEMORY_CYCLES;
        let mut req = AccessRequest::new(self.requestor(), addr, self.regs.ncsf).with_word(w);
        cc.store(&mut req);
        match req.outcome() {
            Ok(_) => true,
            Err(e) => {
                self.memory_error(cc, e);
                false
            }
        }
    }

    /// The address of cell `offset` of the Program Reference Table.
    pub(crate) fn prt(&self, offset: u16) -> u16 {
        (self.regs.r.wrapping_mul(64)).wrapping_add(offset) & ADDRESS_MASK
    }

    /// Loads the next syllable into T.
    fn fetch_syllable(&mut self, cc: &mut CentralControl) {
        if !self.regs.prof {
            let c = self.regs.c;
            self.regs.p = self.fetch(cc, c);
            self.regs.prof = true;
        }
        self.regs.t = syllable_at(self.regs.p, usize::from(self.regs.l));
        self.regs.trof = true;
        if self.regs.l >= 3 {
            self.regs.l = 0;
            self.regs.c = self.regs.c.wrapping_add(1) & ADDRESS_MASK;
            self.regs.prof = false;
        } else {
            self.regs.l += 1;
        }
    }

    /// Moves the program counter by `count` syllables (forward or
    /// back).
    pub(crate) fn jump_syllables(&mut self, count: i32) {
        let here = i32::from(self.regs.c) * 4 + i32::from(self.regs.l);
        let there = (here + count).rem_euclid(i32::from(ADDRESS_MASK) * 4 + 4);
        self.regs.c = (there / 4) as u16;
        self.regs.l = (there % 4) as u8;
        self.regs.prof = false;
    }

    fn interrupt_pending(&self, cc: &CentralControl) -> bool {
        match self.id {
            ProcessorId::P1 => cc.interrupt_address() != 0,
            ProcessorId::P2 => cc.processor_interrupt(ProcessorId::P2) != 0,
        }
    }

    /// Executes one syllable (or takes an interrupt).
    pub fn step(&mut self, cc: &mut CentralControl) {
        self.slice_cycles += 1;
        if self.regs.ncsf && self.interrupt_pending(cc) {
            // SFI is a word-mode operator; character mode has no
            // syllable for it, so it is executed directly.
            self.regs.t = SFI_SYLLABLE;
            self.regs.trof = true;
            event!(Level::TRACE, "{} taking an interrupt", self.id);
            self.store_for_interrupt(cc, false);
            self.regs.trof = false;
            return;
        }
        self.fetch_syllable(cc);
        event!(
            Level::TRACE,
            "{} executing {:04o} ({} mode)",
            self.id,
            self.regs.t,
            if self.regs.cwmf { "char" } else { "word" }
        );
        if self.regs.cwmf {
            self.execute_char_mode(cc);
        } else {
            self.execute_word_mode(cc);
        }
        self.regs.trof = false;
    }

    /// Runs for one time slice, or until the processor stops.
    /// Returns the number of cycles used.
    pub fn run_slice(&mut self, cc: &mut CentralControl) -> u64 {
        let span = span!(Level::TRACE, "run_slice", processor = %self.id);
        let _enter = span.enter();
        self.slice_cycles = 0;
        while self.busy && self.slice_cycles < SLICE_CYCLES {
            self.step(cc);
        }
        self.total_cycles += self.slice_cycles;
        self.slice_cycles
    }
}

#[cfg(test)]
mod tests;
