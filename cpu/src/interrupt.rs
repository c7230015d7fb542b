//! B5500 interrupts.
//!
//! Central Control holds a set of interrupt latches, plus (for each
//! processor) a 4+4 bit error register `I` whose low bits record
//! memory parity, memory address and stack overflow errors and whose
//! high nibble holds a "syllable-dependent" interrupt code (for
//! example the communicate operator sets code 4).
//!
//! When any of these conditions is set, Central Control selects the
//! highest-priority one and places its vector (the address of the
//! memory cell through which the interrupt is handled) in the
//! interrupt address register, IAR.  The priority order is fixed,
//! and the operating system depends on it.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
#[cfg(test)]
use test_strategy::Arbitrary;

use super::types::{IoUnitId, ProcessorId};

/// Processor `I` register bit: memory parity error.
pub const I_PARITY: u8 = 0x01;
/// Processor `I` register bit: invalid memory address.
pub const I_ADDRESS: u8 = 0x02;
/// Processor `I` register bit: stack overflow.
pub const I_STACK_OVERFLOW: u8 = 0x04;
/// Processor `I` register: the syllable-dependent interrupt code.
pub const I_SYLLABLE_MASK: u8 = 0xF0;

/// An interrupting condition.
///
/// The documentation names the Central Control latches CCI03F to
/// CCI16F.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Interrupt {
    P1Parity,
    P1Address,
    /// CCI03F
    TimeInterval,
    /// CCI04F: an Initiate I/O found no free I/O unit.
    IoBusy,
    /// CCI05F
    KeyboardRequest,
    /// CCI08F to CCI11F
    IoFinished(IoUnitId),
    /// CCI06F and CCI07F; the value is 0 for printer 1.
    PrinterFinished(u8),
    /// CCI12F: an Initiate P2 found P2 already busy.
    P2Busy,
    /// CCI13F
    InquiryRequest,
    /// CCI14F
    Special1,
    /// CCI15F and CCI16F; the value is 0 for disk 1.
    DiskReadCheck(u8),
    P1StackOverflow,
    /// P1 syllable-dependent interrupt; the value is the code (1..15).
    P1Syllable(u8),
    P2Parity,
    P2Address,
    P2StackOverflow,
    P2Syllable(u8),
}

impl Interrupt {
    /// The address of the memory cell which handles this interrupt.
    #[must_use]
    pub fn vector(&self) -> u16 {
        match self {
            Interrupt::P1Parity => 0x30,
            Interrupt::P1Address => 0x31,
            Interrupt::TimeInterval => 0x12,
            Interrupt::IoBusy => 0x13,
            Interrupt::KeyboardRequest => 0x14,
            Interrupt::PrinterFinished(n) => 0x15 + u16::from(*n & 1),
            Interrupt::IoFinished(u) => 0x17 + u16::from(u.0),
            Interrupt::P2Busy => 0x1B,
            Interrupt::InquiryRequest => 0x1C,
            Interrupt::Special1 => 0x1D,
            Interrupt::DiskReadCheck(n) => 0x1E + u16::from(*n & 1),
            Interrupt::P1StackOverflow => 0x32,
            Interrupt::P1Syllable(code) => 0x30 + u16::from(*code & 0x0F),
            Interrupt::P2Parity => 0x20,
            Interrupt::P2Address => 0x21,
            Interrupt::P2StackOverflow => 0x22,
            Interrupt::P2Syllable(code) => 0x20 + u16::from(*code & 0x0F),
        }
    }

    /// The position of this interrupt in the priority order; lower
    /// values are higher priority.
    #[must_use]
    pub fn rank(&self) -> u16 {
        let (group, sub): (u16, u16) = match self {
            Interrupt::P1Parity => (1, 0),
            Interrupt::P1Address => (2, 0),
            Interrupt::TimeInterval => (3, 0),
            Interrupt::IoBusy => (4, 0),
            Interrupt::KeyboardRequest => (5, 0),
            Interrupt::IoFinished(u) => (6, u16::from(u.0)),
            Interrupt::PrinterFinished(n) => (7, u16::from(*n)),
            Interrupt::P2Busy => (8, 0),
            Interrupt::InquiryRequest => (9, 0),
            Interrupt::Special1 => (10, 0),
            Interrupt::DiskReadCheck(n) => (11, u16::from(*n)),
            Interrupt::P1StackOverflow => (12, 0),
            Interrupt::P1Syllable(_) => (13, 0),
            Interrupt::P2Parity => (14, 0),
            Interrupt::P2Address => (15, 0),
            Interrupt::P2StackOverflow => (16, 0),
            Interrupt::P2Syllable(_) => (17, 0),
        };
        group * 16 + sub
    }
}

impl Display for Interrupt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::IoFinished(u) => write!(f, "{u} finished"),
            Interrupt::PrinterFinished(n) => write!(f, "printer {} finished", n + 1),
            Interrupt::DiskReadCheck(n) => write!(f, "disk {} read check finished", n + 1),
            Interrupt::P1Syllable(code) | Interrupt::P2Syllable(code) => {
                write!(f, "{self:?} code {code}")
            }
            other => write!(f, "{other:?}"),
        }?;
        write!(f, " (vector {:03o})", self.vector())
    }
}

/// The interrupt latches of Central Control together with the two
/// processor `I` registers.
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct InterruptLatches {
    pub time_interval: bool,
    pub io_busy: bool,
    pub keyboard_request: bool,
    pub printer_finished: [bool; 2],
    pub io_finished: [bool; 4],
    pub p2_busy: bool,
    pub inquiry_request: bool,
    pub special_1: bool,
    pub disk_read_check: [bool; 2],
    /// The `I` registers of P1 and P2.
    pub processor: [u8; 2],
}

fn processor_interrupt(id: ProcessorId, i: u8) -> Option<Interrupt> {
    let p1 = id == ProcessorId::P1;
    if i & I_PARITY != 0 {
        Some(if p1 {
            Interrupt::P1Parity
        } else {
            Interrupt::P2Parity
        })
    } else if i & I_ADDRESS != 0 {
        Some(if p1 {
            Interrupt::P1Address
        } else {
            Interrupt::P2Address
        })
    } else if i & I_STACK_OVERFLOW != 0 {
        Some(if p1 {
            Interrupt::P1StackOverflow
        } else {
            Interrupt::P2StackOverflow
        })
    } else if i & I_SYLLABLE_MASK != 0 {
        let code = i >> 4;
        Some(if p1 {
            Interrupt::P1Syllable(code)
        } else {
            Interrupt::P2Syllable(code)
        })
    } else {
        None
    }
}

impl InterruptLatches {
    /// Selects the highest-priority condition which is currently set.
    #[must_use]
    pub fn highest(&self) -> Option<Interrupt> {
        let p1 = self.processor[0];
        if p1 & I_PARITY != 0 {
            return Some(Interrupt::P1Parity);
        }
        if p1 & I_ADDRESS != 0 {
            return Some(Interrupt::P1Address);
        }
        if self.time_interval {
            return Some(Interrupt::TimeInterval);
        }
        if self.io_busy {
            return Some(Interrupt::IoBusy);
        }
        if self.keyboard_request {
            return Some(Interrupt::KeyboardRequest);
        }
        if let Some(n) = self.io_finished.iter().position(|set| *set) {
            return Some(Interrupt::IoFinished(IoUnitId(n as u8)));
        }
        if let Some(n) = self.printer_finished.iter().position(|set| *set) {
            return Some(Interrupt::PrinterFinished(n as u8));
        }
        if self.p2_busy {
            return Some(Interrupt::P2Busy);
        }
        if self.inquiry_request {
            return Some(Interrupt::InquiryRequest);
        }
        if self.special_1 {
            return Some(Interrupt::Special1);
        }
        if let Some(n) = self.disk_read_check.iter().position(|set| *set) {
            return Some(Interrupt::DiskReadCheck(n as u8));
        }
        // Parity and address errors of P1 were dealt with above.
        if let Some(found) = processor_interrupt(ProcessorId::P1, p1 & !(I_PARITY | I_ADDRESS)) {
            return Some(found);
        }
        processor_interrupt(ProcessorId::P2, self.processor[1])
    }

    /// Every condition which is currently set, in no particular
    /// order.
    #[must_use]
    pub fn all_set(&self) -> Vec<Interrupt> {
        let mut result = Vec::new();
        let flags = [
            (self.time_interval, Interrupt::TimeInterval),
            (self.io_busy, Interrupt::IoBusy),
            (self.keyboard_request, Interrupt::KeyboardRequest),
            (self.p2_busy, Interrupt::P2Busy),
            (self.inquiry_request, Interrupt::InquiryRequest),
            (self.special_1, Interrupt::Special1),
        ];
        result.extend(flags.iter().filter(|(set, _)| *set).map(|(_, i)| *i));
        for (n, set) in self.io_finished.iter().enumerate() {
            if *set {
                result.push(Interrupt::IoFinished(IoUnitId(n as u8)));
            }
        }
        for (n, set) in self.printer_finished.iter().enumerate() {
            if *set {
                result.push(Interrupt::PrinterFinished(n as u8));
            }
        }
        for (n, set) in self.disk_read_check.iter().enumerate() {
            if *set {
                result.push(Interrupt::DiskReadCheck(n as u8));
            }
        }
        for (id, i) in [(ProcessorId::P1, self.processor[0]), (ProcessorId::P2, self.processor[1])] {
            for bit in [I_PARITY, I_ADDRESS, I_STACK_OVERFLOW, I_SYLLABLE_MASK] {
                if let Some(found) = processor_interrupt(id, i & bit) {
                    result.push(found);
                }
            }
        }
        result
    }

    /// Sets the latch (or processor error bits) for `which`.
    pub fn set(&mut self, which: Interrupt) {
        self.update(which, true);
    }

    /// Resets exactly the latch (or processor error bits) for
    /// `which`.
    pub fn reset(&mut self, which: Interrupt) {
        self.update(which, false);
    }

    fn update(&mut self, which: Interrupt, value: bool) {
        fn bits(i: &mut u8, mask: u8, value: bool) {
            if value {
                *i |= mask;
            } else {
                *i &= !mask;
            }
        }
        match which {
            Interrupt::TimeInterval => self.time_interval = value,
            Interrupt::IoBusy => self.io_busy = value,
            Interrupt::KeyboardRequest => self.keyboard_request = value,
            Interrupt::IoFinished(u) => self.io_finished[u.index() & 3] = value,
            Interrupt::PrinterFinished(n) => self.printer_finished[usize::from(n & 1)] = value,
            Interrupt::P2Busy => self.p2_busy = value,
            Interrupt::InquiryRequest => self.inquiry_request = value,
            Interrupt::Special1 => self.special_1 = value,
            Interrupt::DiskReadCheck(n) => self.disk_read_check[usize::from(n & 1)] = value,
            Interrupt::P1Parity => bits(&mut self.processor[0], I_PARITY, value),
            Interrupt::P1Address => bits(&mut self.processor[0], I_ADDRESS, value),
            Interrupt::P1StackOverflow => bits(&mut self.processor[0], I_STACK_OVERFLOW, value),
            Interrupt::P2Parity => bits(&mut self.processor[1], I_PARITY, value),
            Interrupt::P2Address => bits(&mut self.processor[1], I_ADDRESS, value),
            Interrupt::P2StackOverflow => bits(&mut self.processor[1], I_STACK_OVERFLOW, value),
            Interrupt::P1Syllable(code) | Interrupt::P2Syllable(code) => {
                let idx = usize::from(matches!(which, Interrupt::P2Syllable(_)));
                let i = &mut self.processor[idx];
                *i &= !I_SYLLABLE_MASK;
                if value {
                    *i |= (code & 0x0F) << 4;
                }
            }
        }
    }
}
