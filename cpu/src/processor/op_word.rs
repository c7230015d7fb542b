//! Word-mode syllables.
//!
//! The low two bits of a word-mode syllable select its kind:
//!
//! - 0: literal call, pushes the 10-bit literal `T >> 2`.
//! - 2: operand call, pushes the word at `R*64 + (T >> 2)`.
//! - 3: descriptor call, pushes a present descriptor of `R*64 + (T >> 2)`.
//! - 1: an operator, selected by `T & 0o77` and varied by `T >> 6`.
//!
//! ## Control-state and interrupt operators (XX11)
//!
//! - PRL (0111), ITI (0211), RTR (0411), COM (1011), IOR (2111),
//!   HP2 (2211), ZPI (2411), SFI (3011), SFT (3411), IP1 (4111),
//!   IP2 (4211), IIO (4411), IFT (5111).
//!
//! ## Logical operators (XX15)
//!
//! - LNG (0115), LOR (0215), LND (0415), MOP (1015), LQV (2015),
//!   MDS (4015).  All of these leave the flag bit alone except MOP
//!   (which resets it) and MDS (which sets it).
//!
//! ## Others
//!
//! - XCH (1025), DUP (2025), DEL (0051), CMN (4441).
//! - DIA (XX55) and its zero-variant NOP (0055).
//! - DIB (XX61) and its zero-variant XRT (0061).
//!
//! Every other operator is a no-op.
use tracing::{event, Level};

use base::prelude::*;

use super::super::central::CentralControl;
use super::control_word::LoopControl;
use super::Processor;

/// The syllable-dependent interrupt code set by COM.
const COMMUNICATE_CODE: u8 = 0x40;
/// The syllable-dependent interrupt code set by PRL in normal state.
const PROGRAM_RELEASE_CODE: u8 = 0x50;

fn with_flag_of(value: Word, flag_from: Word) -> Word {
    (value & WORD_MASK & !FLAG_BIT) | (flag_from & FLAG_BIT)
}

impl Processor {
    pub(crate) fn execute_word_mode(&mut self, cc: &mut CentralControl) {
        let t = self.regs.t;
        match t & 3 {
            0 => {
                self.push_value(cc, Word::from(t >> 2));
            }
            2 => {
                let addr = self.prt(t >> 2);
                if self.a_empty(cc) {
                    self.regs.a = self.fetch(cc, addr);
                    self.regs.arof = true;
                }
            }
            3 => {
                let addr = self.prt(t >> 2);
                self.push_value(cc, FLAG_BIT | PRESENCE_BIT | Word::from(addr));
            }
            _ => self.word_operator(cc, t & 0o77, (t >> 6) as u8),
        }
    }

    fn word_operator(&mut self, cc: &mut CentralControl, op: u16, variant: u8) {
        match op {
            0o11 => self.op_control(cc, variant),
            0o15 => self.op_logical(cc, variant),
            0o25 => match variant {
                0o10 => self.op_xch(cc),
                0o20 => self.op_dup(cc),
                _ => (),
            },
            0o41 if variant == 0o44 => self.op_cmn(cc),
            0o51 if variant == 0 => self.op_del(),
            0o55 => {
                // Variant zero is NOP.
                if variant != 0 {
                    self.regs.g = variant >> 3;
                    self.regs.h = variant & 7;
                }
            }
            0o61 => {
                if variant == 0 {
                    // XRT
                    self.regs.varf = self.regs.salf;
                    self.regs.salf = false;
                } else {
                    self.regs.k = variant >> 3;
                    self.regs.v = variant & 7;
                }
            }
            _ => {
                event!(
                    Level::TRACE,
                    "{}: operator {:04o} is a no-op",
                    self.id,
                    (u16::from(variant) << 6) | op
                );
            }
        }
    }

    /// Takes the value on top of the stack.
    fn pop_a(&mut self, cc: &mut CentralControl) -> Word {
        self.a_full(cc);
        self.regs.arof = false;
        self.regs.a
    }

    fn set_presence_bit(&mut self, cc: &mut CentralControl, descriptor: Word) {
        let addr = address_of(descriptor);
        let w = self.fetch(cc, addr);
        self.store(cc, addr, w | PRESENCE_BIT);
    }

    fn op_control(&mut self, cc: &mut CentralControl, variant: u8) {
        let control_state = !self.regs.ncsf;
        match variant {
            0o01 => {
                // PRL
                let a = self.pop_a(cc);
                if control_state {
                    self.set_presence_bit(cc, a);
                } else {
                    let cell = self.prt(9);
                    self.store(cc, cell, a);
                    cc.set_processor_interrupt(self.id, PROGRAM_RELEASE_CODE);
                }
            }
            0o02 => self.interrogate_interrupt(cc),
            0o04 if control_state => {
                // RTR
                let timer = cc.read_timer();
                self.push_value(cc, timer);
            }
            0o10 if !control_state => {
                // COM
                let a = self.pop_a(cc);
                let cell = self.prt(9);
                self.store(cc, cell, a);
                cc.set_processor_interrupt(self.id, COMMUNICATE_CODE);
            }
            0o21 if control_state => {
                // IOR
                let a = self.pop_a(cc);
                self.set_presence_bit(cc, a);
            }
            0o22 if control_state => cc.halt_p2(),
            0o30 => self.store_for_interrupt(cc, false),
            0o34 => self.store_for_interrupt(cc, true),
            0o41 if control_state => {
                // IP1
                let incw = self.pop_a(cc);
                self.initiate(cc, incw, false);
            }
            0o42 if control_state => {
                // IP2
                let a = self.pop_a(cc);
                self.store(cc, 0o10, a);
                cc.initiate_p2();
            }
            0o44 if control_state => {
                // IIO
                let a = self.pop_a(cc);
                self.store(cc, 0o10, a);
                if cc.initiate_io().is_none() {
                    event!(Level::DEBUG, "{}: no I/O unit was free", self.id);
                }
            }
            0o51 if control_state => {
                // IFT
                let incw = self.pop_a(cc);
                self.initiate(cc, incw, true);
            }
            // ZPI, and the control-state operators in normal state.
            _ => (),
        }
    }

    fn op_logical(&mut self, cc: &mut CentralControl, variant: u8) {
        match variant {
            0o01 => {
                // LNG
                self.a_full(cc);
                self.regs.a = with_flag_of(!self.regs.a, self.regs.a);
            }
            0o02 | 0o04 | 0o20 => {
                self.ab_full(cc);
                let (a, b) = (self.regs.a, self.regs.b);
                let value = match variant {
                    0o02 => a | b,
                    0o04 => a & b,
                    _ => !(a ^ b),
                };
                self.regs.a = with_flag_of(value, b);
                self.regs.brof = false;
            }
            0o10 => {
                // MOP
                self.a_full(cc);
                self.regs.a &= !FLAG_BIT;
            }
            0o40 => {
                // MDS
                self.a_full(cc);
                self.regs.a |= FLAG_BIT;
            }
            _ => (),
        }
    }

    fn op_xch(&mut self, cc: &mut CentralControl) {
        self.ab_full(cc);
        std::mem::swap(&mut self.regs.a, &mut self.regs.b);
    }

    fn op_dup(&mut self, cc: &mut CentralControl) {
        self.a_full(cc);
        if self.b_empty(cc) {
            self.regs.b = self.regs.a;
            self.regs.brof = true;
        }
    }

    fn op_del(&mut self) {
        if self.regs.arof {
            self.regs.arof = false;
        } else if self.regs.brof {
            self.regs.brof = false;
        } else {
            self.regs.s = self.regs.s.wrapping_sub(1) & ADDRESS_MASK;
        }
    }

    /// CMN: enter character mode.  A addresses the destination string
    /// and B the source; each gives a word address in its low 15 bits
    /// and a character index in the next three.
    fn op_cmn(&mut self, cc: &mut CentralControl) {
        self.ab_full(cc);
        let (a, b) = (self.regs.a, self.regs.b);
        let x = LoopControl {
            s: self.regs.s,
            ..LoopControl::default()
        };
        self.regs.x = x.encode();
        self.regs.m = address_of(a);
        self.regs.g = ((a >> 15) & 7) as u8;
        self.regs.h = 0;
        self.regs.s = address_of(b);
        self.regs.k = ((b >> 15) & 7) as u8;
        self.regs.v = 0;
        self.regs.arof = false;
        self.regs.brof = false;
        self.regs.cwmf = true;
        event!(
            Level::TRACE,
            "{} entering character mode, source {:05o}:{} destination {:05o}:{}",
            self.id,
            self.regs.s,
            self.regs.k,
            self.regs.m,
            self.regs.g
        );
    }
}

#[test]
fn test_with_flag_of() {
    assert_eq!(with_flag_of(!0, 0), WORD_MASK & !FLAG_BIT);
    assert_eq!(with_flag_of(0, FLAG_BIT), FLAG_BIT);
}
