//! Layouts of the control words the processor saves on the stack.
//!
//! Bit positions here are value bits (bit 0 has weight 1), not the
//! high-order-first numbering of the machine documentation.  Every
//! control word carries [`CONTROL_WORD`] in its top two bits.
use base::prelude::*;

const fn bits(w: Word, shift: u32, width: u32) -> u64 {
    (w >> shift) & ((1 << width) - 1)
}

const fn put(value: u64, shift: u32, width: u32) -> Word {
    (value & ((1 << width) - 1)) << shift
}

const fn flag(w: Word, shift: u32) -> bool {
    bits(w, shift, 1) != 0
}

/// Interrupt Control Word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Icw {
    pub m: u16,
    pub n: u8,
    pub varf: bool,
    pub salf: bool,
    pub msff: bool,
    pub r: u16,
    /// A held a value when the interrupt happened.
    pub arof: bool,
}

impl Icw {
    pub(crate) fn encode(&self) -> Word {
        put(u64::from(self.m), 0, 15)
            | put(u64::from(self.n), 15, 4)
            | put(u64::from(self.varf), 24, 1)
            | put(u64::from(self.salf), 30, 1)
            | put(u64::from(self.msff), 31, 1)
            | put(u64::from(self.r), 33, 9)
            | put(u64::from(self.arof), 45, 1)
            | CONTROL_WORD
    }

    pub(crate) fn decode(w: Word) -> Icw {
        Icw {
            m: bits(w, 0, 15) as u16,
            n: bits(w, 15, 4) as u8,
            varf: flag(w, 24),
            salf: flag(w, 30),
            msff: flag(w, 31),
            r: bits(w, 33, 9) as u16,
            arof: flag(w, 45),
        }
    }
}

/// Interrupt Return Control Word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Ircw {
    pub c: u16,
    pub f: u16,
    pub k: u8,
    pub g: u8,
    pub l: u8,
    pub v: u8,
    pub h: u8,
    pub brof: bool,
}

impl Ircw {
    pub(crate) fn encode(&self) -> Word {
        put(u64::from(self.c), 0, 15)
            | put(u64::from(self.f), 15, 15)
            | put(u64::from(self.k), 30, 3)
            | put(u64::from(self.g), 33, 3)
            | put(u64::from(self.l), 36, 2)
            | put(u64::from(self.v), 38, 3)
            | put(u64::from(self.h), 41, 3)
            | put(u64::from(self.brof), 45, 1)
            | CONTROL_WORD
    }

    pub(crate) fn decode(w: Word) -> Ircw {
        Ircw {
            c: bits(w, 0, 15) as u16,
            f: bits(w, 15, 15) as u16,
            k: bits(w, 30, 3) as u8,
            g: bits(w, 33, 3) as u8,
            l: bits(w, 36, 2) as u8,
            v: bits(w, 38, 3) as u8,
            h: bits(w, 41, 3) as u8,
            brof: flag(w, 45),
        }
    }
}

/// Initiate Control Word, stored at R*64+8; it locates the rest of
/// the saved state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Incw {
    pub s: u16,
    pub cwmf: bool,
}

impl Incw {
    pub(crate) fn encode(&self) -> Word {
        put(u64::from(self.s), 0, 15) | put(u64::from(self.cwmf), 15, 1) | CONTROL_WORD
    }

    pub(crate) fn decode(w: Word) -> Incw {
        Incw {
            s: bits(w, 0, 15) as u16,
            cwmf: flag(w, 15),
        }
    }
}

/// The character-mode loop control register, X.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct LoopControl {
    /// Where the loop body starts.
    pub c: u16,
    pub l: u8,
    /// The stack address saved on entry to character mode, or (in a
    /// nested loop) the cell holding the enclosing loop's X.
    pub s: u16,
    pub repeat: u8,
}

pub(crate) const LOOP_CONTROL_BITS: u32 = 38;

impl LoopControl {
    pub(crate) fn encode(&self) -> Word {
        put(u64::from(self.c), 0, 15)
            | put(u64::from(self.s), 15, 15)
            | put(u64::from(self.repeat), 30, 6)
            | put(u64::from(self.l), 36, 2)
    }

    pub(crate) fn decode(w: Word) -> LoopControl {
        LoopControl {
            c: bits(w, 0, 15) as u16,
            s: bits(w, 15, 15) as u16,
            repeat: bits(w, 30, 6) as u8,
            l: bits(w, 36, 2) as u8,
        }
    }
}

/// Interrupt Loop Control Word, saved only in character mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Ilcw {
    pub x: Word,
    pub tally: u8,
    pub tfff: bool,
    pub arof: bool,
}

impl Ilcw {
    pub(crate) fn encode(&self) -> Word {
        put(self.x, 0, LOOP_CONTROL_BITS)
            | put(u64::from(self.tally), 38, 6)
            | put(u64::from(self.tfff), 44, 1)
            | put(u64::from(self.arof), 45, 1)
            | CONTROL_WORD
    }

    pub(crate) fn decode(w: Word) -> Ilcw {
        Ilcw {
            x: bits(w, 0, LOOP_CONTROL_BITS),
            tally: bits(w, 38, 6) as u8,
            tfff: flag(w, 44),
            arof: flag(w, 45),
        }
    }
}

/// The maintenance registers saved by Store For Test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct MaintenanceWord {
    pub y: u8,
    pub z: u8,
    pub q: u16,
}

impl MaintenanceWord {
    pub(crate) fn encode(&self) -> Word {
        put(u64::from(self.y), 0, 6)
            | put(u64::from(self.z), 6, 6)
            | put(u64::from(self.q), 12, 9)
            | CONTROL_WORD
    }

    pub(crate) fn decode(w: Word) -> MaintenanceWord {
        MaintenanceWord {
            y: bits(w, 0, 6) as u8,
            z: bits(w, 6, 6) as u8,
            q: bits(w, 12, 9) as u16,
        }
    }
}
