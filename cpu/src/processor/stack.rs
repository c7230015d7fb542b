//! Stack adjustment.
//!
//! The top of the stack is held in A and B.  Before an operator
//! runs, the registers are adjusted so that the operands it needs
//! are present (or so that there is room for its result), spilling
//! to or filling from memory below S.
use base::prelude::*;

use super::super::central::CentralControl;
use super::super::interrupt::I_STACK_OVERFLOW;
use super::Processor;

impl Processor {
    /// Pushes `w` to memory at S+1 without checking for overflow.
    pub(crate) fn push_raw(&mut self, cc: &mut CentralControl, w: Word) {
        self.regs.s = self.regs.s.wrapping_add(1) & ADDRESS_MASK;
        let s = self.regs.s;
        self.store(cc, s, w);
    }

    /// Pops a word from memory at S.
    pub(crate) fn pop_raw(&mut self, cc: &mut CentralControl) -> Word {
        let s = self.regs.s;
        let w = self.fetch(cc, s);
        self.regs.s = s.wrapping_sub(1) & ADDRESS_MASK;
        w
    }

    /// In normal state, the stack may not grow into the next
    /// 64-word page above the PRT.  Returns false, having raised the
    /// stack overflow interrupt, if a push would do so.
    fn check_overflow(&mut self, cc: &mut CentralControl) -> bool {
        let next = self.regs.s.wrapping_add(1) & ADDRESS_MASK;
        if self.regs.ncsf && (next >> 6) == self.regs.r {
            cc.set_processor_interrupt(self.id, I_STACK_OVERFLOW);
            false
        } else {
            true
        }
    }

    /// Spills B to memory.  Returns false on stack overflow, leaving
    /// the registers unchanged.
    pub(crate) fn b_empty(&mut self, cc: &mut CentralControl) -> bool {
        if self.regs.brof {
            if !self.check_overflow(cc) {
                return false;
            }
            let b = self.regs.b;
            self.push_raw(cc, b);
            self.regs.brof = false;
        }
        true
    }

    /// Makes A empty, moving its value to B (spilling B first if
    /// need be).
    pub(crate) fn a_empty(&mut self, cc: &mut CentralControl) -> bool {
        if self.regs.arof {
            if !self.b_empty(cc) {
                return false;
            }
            self.regs.b = self.regs.a;
            self.regs.brof = true;
            self.regs.arof = false;
        }
        true
    }

    /// Makes A full, from B or from memory.
    pub(crate) fn a_full(&mut self, cc: &mut CentralControl) {
        if !self.regs.arof {
            if self.regs.brof {
                self.regs.a = self.regs.b;
                self.regs.brof = false;
            } else {
                self.regs.a = self.pop_raw(cc);
            }
            self.regs.arof = true;
        }
    }

    pub(crate) fn b_full(&mut self, cc: &mut CentralControl) {
        if !self.regs.brof {
            self.regs.b = self.pop_raw(cc);
            self.regs.brof = true;
        }
    }

    /// Makes both A and B full.
    pub(crate) fn ab_full(&mut self, cc: &mut CentralControl) {
        self.a_full(cc);
        self.b_full(cc);
    }

    /// Pushes `w` onto the top of the stack, in A.
    pub(crate) fn push_value(&mut self, cc: &mut CentralControl, w: Word) -> bool {
        if !self.a_empty(cc) {
            return false;
        }
        self.regs.a = w & WORD_MASK;
        self.regs.arof = true;
        true
    }
}
