//! Store For Interrupt, Store For Test, Initiate and Interrogate
//! Interrupt.
//!
//! Store For Interrupt saves the processor state on the stack as a
//! sequence of control words:
//!
//! | pushed | when | contents |
//! | ------ | ---- | -------- |
//! | A, B, ILCW | character mode | the buffers and loop control |
//! | B, A | word mode, if present (always for SFT) | top of stack |
//! | maintenance word | SFT only | Y, Z and Q |
//! | ICW | always | M, N, VARF, SALF, MSFF, R, AROF |
//! | IRCW | always | C, F, K, G, L, V, H, BROF |
//!
//! and then stores an INCW (the final S, and whether the processor
//! was in character mode) at R*64+8.  Initiate pops the same words
//! in the reverse order.
use std::mem;

use tracing::{event, span, Level};

use base::prelude::*;

use super::super::central::CentralControl;
use super::super::types::ProcessorId;
use super::control_word::{Icw, Ilcw, Incw, Ircw, LoopControl, MaintenanceWord};
use super::Processor;

/// The stack address at which the interrupt handler starts.
const INTERRUPT_STACK: u16 = 0o100;

impl Processor {
    /// In character mode, S is the source address and the stack
    /// address lives in X.  Exchanges the two.
    fn swap_stack_with_loop_control(&mut self) {
        let mut x = LoopControl::decode(self.regs.x);
        mem::swap(&mut self.regs.s, &mut x.s);
        self.regs.x = x.encode();
    }

    pub(crate) fn store_for_interrupt(&mut self, cc: &mut CentralControl, for_test: bool) {
        let span = span!(Level::DEBUG, "sfi", processor = %self.id, for_test);
        let _enter = span.enter();
        // The state is saved in control state, so the INCW can reach
        // a PRT in protected memory.
        self.regs.ncsf = false;
        let cwmf = self.regs.cwmf;
        if cwmf {
            self.swap_stack_with_loop_control();
            let (a, b) = (self.regs.a, self.regs.b);
            self.push_raw(cc, a);
            self.push_raw(cc, b);
            let ilcw = Ilcw {
                x: self.regs.x,
                tally: self.regs.tally,
                tfff: self.regs.tfff,
                arof: self.regs.arof,
            };
            self.push_raw(cc, ilcw.encode());
        } else {
            if self.regs.brof || for_test {
                let b = self.regs.b;
                self.push_raw(cc, b);
            }
            if self.regs.arof || for_test {
                let a = self.regs.a;
                self.push_raw(cc, a);
            }
        }
        if for_test {
            let mw = MaintenanceWord {
                y: self.regs.y,
                z: self.regs.z,
                q: self.regs.q,
            };
            self.push_raw(cc, mw.encode());
        }
        let icw = Icw {
            m: self.regs.m,
            n: self.regs.n,
            varf: self.regs.varf,
            salf: self.regs.salf,
            msff: self.regs.msff,
            r: self.regs.r,
            arof: self.regs.arof,
        };
        self.push_raw(cc, icw.encode());
        let ircw = Ircw {
            c: self.regs.c,
            f: self.regs.f,
            k: self.regs.k,
            g: self.regs.g,
            l: self.regs.l,
            v: self.regs.v,
            h: self.regs.h,
            brof: self.regs.brof,
        };
        self.push_raw(cc, ircw.encode());
        let incw = Incw {
            s: self.regs.s,
            cwmf,
        };
        let cell = self.prt(8);
        self.store(cc, cell, incw.encode());
        event!(
            Level::DEBUG,
            "{} stored state, INCW {:016o} at {:05o}",
            self.id,
            incw.encode(),
            cell
        );

        self.regs.arof = false;
        self.regs.brof = false;
        self.regs.cwmf = false;
        self.regs.msff = false;
        self.regs.salf = false;
        self.regs.prof = false;

        match self.id {
            ProcessorId::P1 => self.interrogate_interrupt(cc),
            ProcessorId::P2 if for_test => self.interrogate_interrupt(cc),
            ProcessorId::P2 => {
                event!(Level::DEBUG, "P2 idles after storing its state");
                self.busy = false;
            }
        }
    }

    /// ITI: in control state, branches to the vector of the pending
    /// interrupt and clears it.
    pub(crate) fn interrogate_interrupt(&mut self, cc: &mut CentralControl) {
        if self.regs.ncsf {
            return;
        }
        let vector = cc.interrupt_address();
        if vector == 0 {
            return;
        }
        event!(Level::DEBUG, "{} taking interrupt at {:03o}", self.id, vector);
        self.regs.c = vector;
        self.regs.l = 0;
        self.regs.prof = false;
        self.regs.s = INTERRUPT_STACK;
        cc.clear_interrupt();
    }

    /// Restores the state saved by Store For Interrupt (or Store For
    /// Test, if `for_test`), and enters normal state.
    pub(crate) fn initiate(&mut self, cc: &mut CentralControl, incw: Word, for_test: bool) {
        let span = span!(Level::DEBUG, "initiate", processor = %self.id, for_test);
        let _enter = span.enter();
        let incw = Incw::decode(incw);
        self.regs.s = incw.s;

        let ircw = Ircw::decode(self.pop_raw(cc));
        self.regs.c = ircw.c;
        self.regs.f = ircw.f;
        self.regs.k = ircw.k;
        self.regs.g = ircw.g;
        self.regs.l = ircw.l;
        self.regs.v = ircw.v;
        self.regs.h = ircw.h;
        self.regs.brof = ircw.brof;

        let icw = Icw::decode(self.pop_raw(cc));
        self.regs.m = icw.m;
        self.regs.n = icw.n;
        self.regs.varf = icw.varf;
        self.regs.salf = icw.salf;
        self.regs.msff = icw.msff;
        self.regs.r = icw.r;
        self.regs.arof = icw.arof;

        if for_test {
            let mw = MaintenanceWord::decode(self.pop_raw(cc));
            self.regs.y = mw.y;
            self.regs.z = mw.z;
            self.regs.q = mw.q;
        }

        if incw.cwmf {
            let ilcw = Ilcw::decode(self.pop_raw(cc));
            self.regs.x = ilcw.x;
            self.regs.tally = ilcw.tally;
            self.regs.tfff = ilcw.tfff;
            self.regs.b = self.pop_raw(cc);
            self.regs.a = self.pop_raw(cc);
            self.swap_stack_with_loop_control();
        } else {
            if self.regs.arof || for_test {
                self.regs.a = self.pop_raw(cc);
            }
            if self.regs.brof || for_test {
                self.regs.b = self.pop_raw(cc);
            }
        }
        self.regs.cwmf = incw.cwmf;
        self.regs.prof = false;
        self.regs.trof = false;
        self.regs.ncsf = true;
        event!(
            Level::DEBUG,
            "{} initiated at {:05o}:{} with S={:05o}",
            self.id,
            self.regs.c,
            self.regs.l,
            self.regs.s
        );
    }
}
