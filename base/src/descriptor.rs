//! I/O descriptors and result descriptors.
//!
//! An I/O operation is described to an I/O unit by a single word,
//! the I/O descriptor (IOD).  When the operation is complete the I/O
//! unit writes back a result descriptor of the same shape, in which
//! the device control field has been replaced by error bits.
//!
//! Bits are named `Dn` after their position in the descriptor (bit n
//! in the machine's high-order-first numbering), since that is how
//! the operating system listings refer to them.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
#[cfg(test)]
use test_strategy::Arbitrary;

use super::word::{field, set_field, Word, ADDRESS_MASK};

const UNIT_START: u32 = 3;
const UNIT_BITS: u32 = 5;
const WORD_COUNT_START: u32 = 8;
const WORD_COUNT_BITS: u32 = 10;
const CONTROL_START: u32 = 25;
const CONTROL_BITS: u32 = 8;

/// D18: memory inhibit (no data is transferred to or from memory).
pub const D18_MEMORY_INHIBIT: Word = 1 << 29;
/// D21: mode; set for binary, clear for alpha.
pub const D21_BINARY: Word = 1 << 26;
/// D22: direction; set for reverse.
pub const D22_REVERSE: Word = 1 << 25;
/// D23: word count enable.
pub const D23_WORD_COUNT: Word = 1 << 24;
/// D24: set for read, clear for write.
pub const D24_READ: Word = 1 << 23;

/// D26: memory address error.
pub const D26_ADDRESS_ERROR: Word = 1 << 21;
/// D27: first device-specific error bit.
pub const D27_DEVICE_ERROR_1: Word = 1 << 20;
/// D28: second device-specific error bit.
pub const D28_DEVICE_ERROR_2: Word = 1 << 19;
/// D29: third device-specific error bit, also memory parity error
/// during the data transfer.
pub const D29_DEVICE_ERROR_3: Word = 1 << 18;
/// D30: unit not ready.
pub const D30_NOT_READY: Word = 1 << 17;
/// D31: memory parity error while fetching the descriptor.
pub const D31_DESCRIPTOR_PARITY: Word = 1 << 16;
/// D32: unit busy.
pub const D32_BUSY: Word = 1 << 15;

/// Shift which aligns a 7-bit device error mask with D26..D32.
pub const ERROR_MASK_SHIFT: u32 = 15;

/// The largest number of words a single operation can move.
pub const MAX_WORD_COUNT: u16 = 1023;

/// Transfer mode of an I/O operation.
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransferMode {
    /// Characters are translated between BIC and the host character
    /// set, and a group mark ends the transfer.
    Alpha,
    /// Characters move as raw 6-bit codes.
    Binary,
}

/// A decoded I/O descriptor.
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IoDescriptor {
    #[cfg_attr(test, strategy(0u8..32))]
    pub designate: u8,
    #[cfg_attr(test, strategy(0u16..1024))]
    pub word_count: u16,
    pub memory_inhibit: bool,
    pub mode: TransferMode,
    pub reverse: bool,
    pub word_count_enabled: bool,
    pub read: bool,
    pub control: u8,
    #[cfg_attr(test, strategy(0u16..0x8000))]
    pub address: u16,
}

impl IoDescriptor {
    /// Decodes an I/O descriptor word.  Every 48-bit pattern is a
    /// valid descriptor, so this cannot fail.
    #[must_use]
    pub fn decode(w: Word) -> IoDescriptor {
        IoDescriptor {
            designate: field(w, UNIT_START, UNIT_BITS) as u8,
            word_count: field(w, WORD_COUNT_START, WORD_COUNT_BITS) as u16,
            memory_inhibit: w & D18_MEMORY_INHIBIT != 0,
            mode: if w & D21_BINARY != 0 {
                TransferMode::Binary
            } else {
                TransferMode::Alpha
            },
            reverse: w & D22_REVERSE != 0,
            word_count_enabled: w & D23_WORD_COUNT != 0,
            read: w & D24_READ != 0,
            control: field(w, CONTROL_START, CONTROL_BITS) as u8,
            address: (w as u16) & ADDRESS_MASK,
        }
    }

    /// Encodes the descriptor as a word.
    #[must_use]
    pub fn encode(&self) -> Word {
        let mut w: Word = 0;
        w = set_field(w, UNIT_START, UNIT_BITS, u64::from(self.designate));
        w = set_field(w, WORD_COUNT_START, WORD_COUNT_BITS, u64::from(self.word_count));
        if self.memory_inhibit {
            w |= D18_MEMORY_INHIBIT;
        }
        if self.mode == TransferMode::Binary {
            w |= D21_BINARY;
        }
        if self.reverse {
            w |= D22_REVERSE;
        }
        if self.word_count_enabled {
            w |= D23_WORD_COUNT;
        }
        if self.read {
            w |= D24_READ;
        }
        w = set_field(w, CONTROL_START, CONTROL_BITS, u64::from(self.control));
        w | u64::from(self.address & ADDRESS_MASK)
    }
}

impl Display for IoDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unit {:02} {} {:?} wc={} addr={:05o}{}{}",
            self.designate,
            if self.read { "read" } else { "write" },
            self.mode,
            self.word_count,
            self.address,
            if self.word_count_enabled { " D23" } else { "" },
            if self.memory_inhibit { " inhibit" } else { "" },
        )
    }
}

/// The error and status conditions carried by a result descriptor.
/// More than one may be set at once.
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResultFlags {
    pub address_error: bool,
    pub device_error_1: bool,
    pub device_error_2: bool,
    pub device_error_3: bool,
    pub not_ready: bool,
    pub descriptor_parity: bool,
    pub busy: bool,
}

impl ResultFlags {
    #[must_use]
    pub fn is_clear(&self) -> bool {
        *self == ResultFlags::default()
    }

    /// Converts a device error mask (aligned so that 0x40 is D26 and
    /// 0x01 is D32) to flags.
    #[must_use]
    pub fn from_error_mask(mask: u8) -> ResultFlags {
        ResultFlags::from_bits(Word::from(mask & 0x7F) << ERROR_MASK_SHIFT)
    }

    /// The inverse of [`ResultFlags::from_error_mask`].
    #[must_use]
    pub fn error_mask(&self) -> u8 {
        ((self.bits() >> ERROR_MASK_SHIFT) & 0x7F) as u8
    }

    /// Extracts the error flags from a result descriptor word.
    #[must_use]
    pub fn from_bits(w: Word) -> ResultFlags {
        ResultFlags {
            address_error: w & D26_ADDRESS_ERROR != 0,
            device_error_1: w & D27_DEVICE_ERROR_1 != 0,
            device_error_2: w & D28_DEVICE_ERROR_2 != 0,
            device_error_3: w & D29_DEVICE_ERROR_3 != 0,
            not_ready: w & D30_NOT_READY != 0,
            descriptor_parity: w & D31_DESCRIPTOR_PARITY != 0,
            busy: w & D32_BUSY != 0,
        }
    }

    /// The bits (D26..D32) which represent these flags.
    #[must_use]
    pub fn bits(&self) -> Word {
        [
            (self.address_error, D26_ADDRESS_ERROR),
            (self.device_error_1, D27_DEVICE_ERROR_1),
            (self.device_error_2, D28_DEVICE_ERROR_2),
            (self.device_error_3, D29_DEVICE_ERROR_3),
            (self.not_ready, D30_NOT_READY),
            (self.descriptor_parity, D31_DESCRIPTOR_PARITY),
            (self.busy, D32_BUSY),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |acc, (_, b)| acc | b)
    }

    /// Merges the conditions of `other` into `self`.
    pub fn merge(&mut self, other: ResultFlags) {
        *self = ResultFlags::from_bits(self.bits() | other.bits());
    }
}

/// A result descriptor: the descriptor which was executed, the
/// final transfer address and word count, and the error flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResultDescriptor {
    pub iod: IoDescriptor,
    pub flags: ResultFlags,
}

impl ResultDescriptor {
    #[must_use]
    pub fn encode(&self) -> Word {
        let iod = IoDescriptor {
            control: 0,
            ..self.iod
        };
        iod.encode() | self.flags.bits()
    }

    #[must_use]
    pub fn decode(w: Word) -> ResultDescriptor {
        let mut iod = IoDescriptor::decode(w);
        iod.control = 0;
        ResultDescriptor {
            iod,
            flags: ResultFlags::from_bits(w),
        }
    }
}

impl Display for ResultFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_clear() {
            return f.write_str("ok");
        }
        let names: Vec<&str> = [
            (self.address_error, "address-error"),
            (self.device_error_1, "D27"),
            (self.device_error_2, "D28"),
            (self.device_error_3, "D29"),
            (self.not_ready, "not-ready"),
            (self.descriptor_parity, "descriptor-parity"),
            (self.busy, "busy"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests;
