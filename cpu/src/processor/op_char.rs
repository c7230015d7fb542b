//! Character-mode syllables.
//!
//! In character mode the low six bits of a syllable select the
//! operator and the high six bits are its repeat count, `n` (which CRF
//! can override for the following syllable).
//!
//! The processor works on two strings.  The source is addressed by
//! S (word), K (character) and V (bit), and its current word is
//! buffered in A.  The destination is addressed by M, G and H, and its
//! current word is buffered in B; a modified B is written back when
//! the destination moves to another word.  Operators which keep
//! addresses in memory use the cell `n` words below F.
//!
//! ## Transfers
//!
//! - TRW (05), TRS (76), TRN (74), TRZ (75), TRP (73), TBN (12)
//! - BIS (63), BIR (64)
//! - OCV (65), ICV (66), FAD (72), FSU (71)
//!
//! ## Addressing
//!
//! - SFD (16), SRD (17), SFS (31), SRS (30), BSD (02), BSS (03)
//! - RDA (04), RSA (52), SDA (14), SSA (15), SED (06), SES (22)
//! - TDA (07), TSA (55), RCA (47), SCA (53)
//!
//! ## Tests and comparisons
//!
//! - TEQ (24), TNE (25), TEG (26), TGR (27), TEL (33), TLS (34),
//!   TAN (35), BIT (36)
//! - CEQ (57), CNE (60), CEG (61), CGR (62), CEL (67), CLS (70)
//!
//! ## Control
//!
//! - EXC (00), INC (37), STC (40), SEC (41), CRF (42)
//! - BNS (51), ENS (50), JNS (45), JNC (43)
//! - JFW (46), JRV (56), JFC (44), JRC (54)
//!
//! Every other operator is a no-op.
use std::cmp::Ordering;

use tracing::{event, Level};

use base::charset::{bic_to_ansi, BLANK};
use base::prelude::*;

use super::super::central::CentralControl;
use super::control_word::{LoopControl, LOOP_CONTROL_BITS};
use super::Processor;

const CHAR_POSITIONS: i64 = (ADDRESS_MASK as i64 + 1) * CHARS_PER_WORD as i64;
const BIT_POSITIONS: i64 = CHAR_POSITIONS * BITS_PER_CHAR as i64;
const SYLLABLE_POSITIONS: i64 = (ADDRESS_MASK as i64 + 1) * SYLLABLES_PER_WORD as i64;

/// The zone bits which mark a decimal field as negative, when they
/// appear on its last character.
const NEGATIVE_ZONE: u8 = 0o40;

/// Sign bit of a numeric word's mantissa.
const MANTISSA_SIGN: Word = 1 << 46;
const MANTISSA_MASK: Word = (1 << 39) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
}

impl Relation {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Relation::Equal => ord == Ordering::Equal,
            Relation::NotEqual => ord != Ordering::Equal,
            Relation::GreaterOrEqual => ord != Ordering::Less,
            Relation::Greater => ord == Ordering::Greater,
            Relation::LessOrEqual => ord != Ordering::Greater,
            Relation::Less => ord == Ordering::Less,
        }
    }
}

fn split_char(pos: i64) -> (u16, u8) {
    let p = pos.rem_euclid(CHAR_POSITIONS);
    ((p / 8) as u16, (p % 8) as u8)
}

fn linear_char(addr: u16, ch: u8) -> i64 {
    i64::from(addr) * 8 + i64::from(ch)
}

fn split_bit(pos: i64) -> (u16, u8, u8) {
    let p = pos.rem_euclid(BIT_POSITIONS);
    let (addr, ch) = split_char(p / 6);
    (addr, ch, (p % 6) as u8)
}

fn is_negative_zone(ch: u8) -> bool {
    ch & 0o60 == NEGATIVE_ZONE
}

fn add_digits(x: &[u8], y: &[u8]) -> (Vec<u8>, bool) {
    let mut out = vec![0; x.len()];
    let mut carry = 0;
    for i in (0..x.len()).rev() {
        let t = x[i] + y[i] + carry;
        out[i] = t % 10;
        carry = t / 10;
    }
    (out, carry != 0)
}

/// Computes `x - y`, where `x >= y`.
fn subtract_digits(x: &[u8], y: &[u8]) -> Vec<u8> {
    let mut out = vec![0; x.len()];
    let mut borrow = 0;
    for i in (0..x.len()).rev() {
        let mut t = i16::from(x[i]) - i16::from(y[i]) - borrow;
        if t < 0 {
            t += 10;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = t as u8;
    }
    out
}

/// Adds two signed decimal fields of equal length, most significant
/// digit first.  Returns the digits of the result, its sign and
/// whether it overflowed.
fn decimal_sum(d: &[u8], d_negative: bool, s: &[u8], s_negative: bool) -> (Vec<u8>, bool, bool) {
    if d_negative == s_negative {
        let (digits, overflow) = add_digits(d, s);
        (digits, d_negative, overflow)
    } else {
        match d.cmp(s) {
            Ordering::Less => (subtract_digits(s, d), s_negative, false),
            Ordering::Equal => (vec![0; d.len()], false, false),
            Ordering::Greater => (subtract_digits(d, s), d_negative, false),
        }
    }
}

impl Processor {
    pub(crate) fn execute_char_mode(&mut self, cc: &mut CentralControl) {
        let t = self.regs.t;
        let n = self
            .regs
            .repeat_override
            .take()
            .unwrap_or((t >> 6) as u8);
        match t & 0o77 {
            0o00 => self.op_exc(cc),
            0o02 => self.move_dest_bits(cc, i64::from(n)),
            0o03 => self.move_source_bits(i64::from(n)),
            0o04 => {
                // RDA
                let w = self.fetch_f_relative(cc, n);
                self.flush_dest(cc);
                self.regs.m = address_of(w);
                self.regs.g = ((w >> 15) & 7) as u8;
                self.regs.h = 0;
            }
            0o52 => {
                // RSA
                let w = self.fetch_f_relative(cc, n);
                self.regs.arof = false;
                self.regs.s = address_of(w);
                self.regs.k = ((w >> 15) & 7) as u8;
                self.regs.v = 0;
            }
            0o14 => {
                // SDA
                let w = Word::from(self.regs.m) | (Word::from(self.regs.g) << 15);
                self.store_f_relative(cc, n, w);
            }
            0o15 => {
                // SSA
                let w = Word::from(self.regs.s) | (Word::from(self.regs.k) << 15);
                self.store_f_relative(cc, n, w);
            }
            0o53 => {
                // SCA
                let w = Word::from(self.regs.c) | (Word::from(self.regs.l) << 15);
                self.store_f_relative(cc, n, w);
            }
            0o47 => {
                // RCA
                let w = self.fetch_f_relative(cc, n);
                self.regs.c = address_of(w);
                self.regs.l = ((w >> 15) & 3) as u8;
                self.regs.prof = false;
            }
            0o06 => {
                // SED
                self.flush_dest(cc);
                self.regs.m = self.f_relative(n);
                self.regs.g = 0;
                self.regs.h = 0;
            }
            0o22 => {
                // SES
                self.regs.arof = false;
                self.regs.s = self.f_relative(n);
                self.regs.k = 0;
                self.regs.v = 0;
            }
            0o07 => {
                // TDA
                let value = self.take_address(cc);
                self.flush_dest(cc);
                self.regs.m = address_of(value);
                self.regs.g = ((value >> 15) & 7) as u8;
                self.regs.h = 0;
            }
            0o55 => {
                // TSA
                let value = self.take_address(cc);
                self.regs.arof = false;
                self.regs.s = address_of(value);
                self.regs.k = ((value >> 15) & 7) as u8;
                self.regs.v = 0;
            }
            0o12 => self.op_tbn(cc, n),
            0o16 => self.move_dest_chars(cc, i64::from(n)),
            0o17 => self.move_dest_chars(cc, -i64::from(n)),
            0o31 => self.move_source_chars(i64::from(n)),
            0o30 => self.move_source_chars(-i64::from(n)),
            0o24 => self.test_source(cc, n, Relation::Equal),
            0o25 => self.test_source(cc, n, Relation::NotEqual),
            0o26 => self.test_source(cc, n, Relation::GreaterOrEqual),
            0o27 => self.test_source(cc, n, Relation::Greater),
            0o33 => self.test_source(cc, n, Relation::LessOrEqual),
            0o34 => self.test_source(cc, n, Relation::Less),
            0o35 => {
                // TAN
                let ch = self.source_char(cc);
                self.regs.tfff = bic_to_ansi(ch).is_ascii_alphanumeric();
            }
            0o36 => {
                // BIT
                self.move_source_bits(0);
                let ch = self.source_char(cc);
                let bit = (ch >> (5 - self.regs.v)) & 1;
                self.regs.tfff = bit == n & 1;
            }
            0o37 => self.regs.tally = self.regs.tally.wrapping_add(n) & 0o77,
            0o41 => self.regs.tally = n & 0o77,
            0o40 => {
                let tally = Word::from(self.regs.tally);
                self.store_f_relative(cc, n, tally);
            }
            0o42 => {
                // CRF
                let w = self.fetch_f_relative(cc, n);
                self.regs.repeat_override = Some((w & 0o77) as u8);
            }
            0o51 => self.op_bns(cc, n),
            0o50 => self.op_ens(cc),
            0o45 => self.op_jns(cc, n),
            0o43 => {
                if !self.regs.tfff {
                    self.op_jns(cc, n);
                }
            }
            0o46 => self.jump_syllables(i32::from(n)),
            0o56 => self.jump_syllables(-i32::from(n)),
            0o44 => {
                if !self.regs.tfff {
                    self.jump_syllables(i32::from(n));
                }
            }
            0o54 => {
                if !self.regs.tfff {
                    self.jump_syllables(-i32::from(n));
                }
            }
            0o57 => self.compare_fields(cc, n, Relation::Equal),
            0o60 => self.compare_fields(cc, n, Relation::NotEqual),
            0o61 => self.compare_fields(cc, n, Relation::GreaterOrEqual),
            0o62 => self.compare_fields(cc, n, Relation::Greater),
            0o67 => self.compare_fields(cc, n, Relation::LessOrEqual),
            0o70 => self.compare_fields(cc, n, Relation::Less),
            0o63 => self.set_dest_bits(cc, n, true),
            0o64 => self.set_dest_bits(cc, n, false),
            0o65 => self.op_ocv(cc, n),
            0o66 => self.op_icv(cc, n),
            0o71 => self.decimal_field_arithmetic(cc, n, true),
            0o72 => self.decimal_field_arithmetic(cc, n, false),
            0o73 => self.op_trp(cc, n),
            0o74 => {
                // TRN
                self.regs.tfff = false;
                for i in 0..n {
                    let ch = self.next_source_char(cc);
                    if i + 1 == n {
                        self.regs.tfff = is_negative_zone(ch);
                    }
                    self.put_dest_char(cc, ch & 0o17);
                }
            }
            0o75 => {
                // TRZ
                for _ in 0..n {
                    let ch = self.next_source_char(cc);
                    let d = self.dest_char(cc);
                    self.put_dest_char(cc, (d & 0o17) | (ch & 0o60));
                }
            }
            0o76 => {
                // TRS
                for _ in 0..n {
                    let ch = self.next_source_char(cc);
                    self.put_dest_char(cc, ch);
                }
            }
            0o05 => self.op_trw(cc, n),
            other => {
                event!(
                    Level::TRACE,
                    "{}: character-mode operator {:02o} is a no-op",
                    self.id,
                    other
                );
            }
        }
    }

    fn f_relative(&self, n: u8) -> u16 {
        self.regs.f.wrapping_sub(u16::from(n)) & ADDRESS_MASK
    }

    fn fetch_f_relative(&mut self, cc: &mut CentralControl, n: u8) -> Word {
        let addr = self.f_relative(n);
        self.fetch(cc, addr)
    }

    fn store_f_relative(&mut self, cc: &mut CentralControl, n: u8, w: Word) {
        let addr = self.f_relative(n);
        self.store(cc, addr, w);
    }

    fn load_source(&mut self, cc: &mut CentralControl) {
        if !self.regs.arof {
            let s = self.regs.s;
            self.regs.a = self.fetch(cc, s);
            self.regs.arof = true;
        }
    }

    fn load_dest(&mut self, cc: &mut CentralControl) {
        if !self.regs.brof {
            let m = self.regs.m;
            self.regs.b = self.fetch(cc, m);
            self.regs.brof = true;
        }
    }

    /// Writes the destination buffer back to memory.
    fn flush_dest(&mut self, cc: &mut CentralControl) {
        if self.regs.brof {
            let (m, b) = (self.regs.m, self.regs.b);
            self.store(cc, m, b);
            self.regs.brof = false;
        }
    }

    fn move_source_chars(&mut self, delta: i64) {
        let (s, k) = split_char(linear_char(self.regs.s, self.regs.k) + delta);
        if s != self.regs.s {
            self.regs.arof = false;
        }
        self.regs.s = s;
        self.regs.k = k;
        self.regs.v = 0;
    }

    fn move_dest_chars(&mut self, cc: &mut CentralControl, delta: i64) {
        let (m, g) = split_char(linear_char(self.regs.m, self.regs.g) + delta);
        if m != self.regs.m {
            self.flush_dest(cc);
        }
        self.regs.m = m;
        self.regs.g = g;
        self.regs.h = 0;
    }

    fn move_source_bits(&mut self, delta: i64) {
        let here = linear_char(self.regs.s, self.regs.k) * 6 + i64::from(self.regs.v);
        let (s, k, v) = split_bit(here + delta);
        if s != self.regs.s {
            self.regs.arof = false;
        }
        self.regs.s = s;
        self.regs.k = k;
        self.regs.v = v;
    }

    fn move_dest_bits(&mut self, cc: &mut CentralControl, delta: i64) {
        let here = linear_char(self.regs.m, self.regs.g) * 6 + i64::from(self.regs.h);
        let (m, g, h) = split_bit(here + delta);
        if m != self.regs.m {
            self.flush_dest(cc);
        }
        self.regs.m = m;
        self.regs.g = g;
        self.regs.h = h;
    }

    fn source_char(&mut self, cc: &mut CentralControl) -> u8 {
        self.load_source(cc);
        char_at(self.regs.a, usize::from(self.regs.k))
    }

    fn next_source_char(&mut self, cc: &mut CentralControl) -> u8 {
        let ch = self.source_char(cc);
        self.move_source_chars(1);
        ch
    }

    fn dest_char(&mut self, cc: &mut CentralControl) -> u8 {
        self.load_dest(cc);
        char_at(self.regs.b, usize::from(self.regs.g))
    }

    /// Replaces the current destination character and moves on.
    fn put_dest_char(&mut self, cc: &mut CentralControl, ch: u8) {
        self.load_dest(cc);
        self.regs.b = set_char_at(self.regs.b, usize::from(self.regs.g), ch);
        self.move_dest_chars(cc, 1);
    }

    /// TDA and TSA take an address from three source characters.
    fn take_address(&mut self, cc: &mut CentralControl) -> Word {
        let mut value: Word = 0;
        for _ in 0..3 {
            value = (value << 6) | Word::from(self.next_source_char(cc));
        }
        value
    }

    fn op_exc(&mut self, cc: &mut CentralControl) {
        self.flush_dest(cc);
        let x = LoopControl::decode(self.regs.x);
        self.regs.s = x.s;
        self.regs.arof = false;
        self.regs.cwmf = false;
        event!(Level::TRACE, "{} leaving character mode", self.id);
    }

    /// TBN: blanks leading characters of the destination up to the
    /// first non-zero digit.  TFFF is set if all `n` were blanked.
    fn op_tbn(&mut self, cc: &mut CentralControl, n: u8) {
        let mut all_blanked = true;
        for _ in 0..n {
            let ch = self.dest_char(cc);
            if (1..=9).contains(&ch) {
                all_blanked = false;
                break;
            }
            self.put_dest_char(cc, BLANK);
        }
        self.regs.tfff = all_blanked;
    }

    fn test_source(&mut self, cc: &mut CentralControl, n: u8, relation: Relation) {
        let ch = self.source_char(cc);
        self.regs.tfff = relation.holds(ch.cmp(&(n & 0o77)));
    }

    fn compare_fields(&mut self, cc: &mut CentralControl, n: u8, relation: Relation) {
        let mut ord = Ordering::Equal;
        for _ in 0..n {
            let s = self.next_source_char(cc);
            let d = self.dest_char(cc);
            self.move_dest_chars(cc, 1);
            if ord == Ordering::Equal {
                ord = s.cmp(&d);
            }
        }
        self.regs.tfff = relation.holds(ord);
    }

    fn set_dest_bits(&mut self, cc: &mut CentralControl, n: u8, value: bool) {
        for _ in 0..n {
            // H is three bits wide; 6 and 7 name bits of the next
            // character.
            self.move_dest_bits(cc, 0);
            self.load_dest(cc);
            let shift = (7 - u32::from(self.regs.g)) * BITS_PER_CHAR + (5 - u32::from(self.regs.h));
            if value {
                self.regs.b |= 1 << shift;
            } else {
                self.regs.b &= !(1 << shift);
            }
            self.move_dest_bits(cc, 1);
        }
    }

    fn op_bns(&mut self, cc: &mut CentralControl, n: u8) {
        let outer = LoopControl::decode(self.regs.x);
        let cell = outer.s.wrapping_add(1) & ADDRESS_MASK;
        let x = self.regs.x;
        self.store(cc, cell, x);
        let inner = LoopControl {
            c: self.regs.c,
            l: self.regs.l,
            s: cell,
            repeat: n.saturating_sub(1),
        };
        self.regs.x = inner.encode();
    }

    fn pop_loop(&mut self, cc: &mut CentralControl) {
        let x = LoopControl::decode(self.regs.x);
        self.regs.x = self.fetch(cc, x.s) & ((1 << LOOP_CONTROL_BITS) - 1);
    }

    fn op_ens(&mut self, cc: &mut CentralControl) {
        let mut x = LoopControl::decode(self.regs.x);
        if x.repeat > 0 {
            x.repeat -= 1;
            self.regs.x = x.encode();
            self.regs.c = x.c;
            self.regs.l = x.l;
            self.regs.prof = false;
        } else {
            self.pop_loop(cc);
        }
    }

    fn op_jns(&mut self, cc: &mut CentralControl, n: u8) {
        self.pop_loop(cc);
        self.jump_syllables(i32::from(n));
    }

    /// OCV: converts the binary integer in the word at S to `n`
    /// decimal digits in the destination.
    fn op_ocv(&mut self, cc: &mut CentralControl, n: u8) {
        let s = self.regs.s;
        let w = self.fetch(cc, s);
        let negative = w & MANTISSA_SIGN != 0;
        let mut magnitude = w & MANTISSA_MASK;
        let mut digits = vec![0u8; usize::from(n)];
        for d in digits.iter_mut().rev() {
            *d = (magnitude % 10) as u8;
            magnitude /= 10;
        }
        self.put_decimal(cc, &digits, negative);
        self.regs.s = s.wrapping_add(1) & ADDRESS_MASK;
        self.regs.k = 0;
        self.regs.v = 0;
        self.regs.arof = false;
    }

    /// ICV: converts `n` decimal source digits to a binary integer,
    /// stored at M.
    fn op_icv(&mut self, cc: &mut CentralControl, n: u8) {
        let (digits, negative) = self.take_decimal(cc, n);
        let magnitude = digits
            .iter()
            .fold(0u64, |acc, d| acc.wrapping_mul(10).wrapping_add(u64::from(*d)))
            & MANTISSA_MASK;
        let w = if negative {
            magnitude | MANTISSA_SIGN
        } else {
            magnitude
        };
        self.flush_dest(cc);
        let m = self.regs.m;
        self.store(cc, m, w);
        self.regs.m = m.wrapping_add(1) & ADDRESS_MASK;
        self.regs.g = 0;
        self.regs.h = 0;
    }

    fn take_decimal(&mut self, cc: &mut CentralControl, n: u8) -> (Vec<u8>, bool) {
        let mut digits = Vec::with_capacity(usize::from(n));
        let mut negative = false;
        for _ in 0..n {
            let ch = self.next_source_char(cc);
            negative = is_negative_zone(ch);
            digits.push((ch & 0o17) % 10);
        }
        (digits, negative)
    }

    fn put_decimal(&mut self, cc: &mut CentralControl, digits: &[u8], negative: bool) {
        let last = digits.len().saturating_sub(1);
        for (i, d) in digits.iter().enumerate() {
            let ch = if negative && i == last {
                d | NEGATIVE_ZONE
            } else {
                *d
            };
            self.put_dest_char(cc, ch);
        }
    }

    /// FAD and FSU: adds the source field to (or subtracts it from)
    /// the destination field.  TFFF reports overflow.
    fn decimal_field_arithmetic(&mut self, cc: &mut CentralControl, n: u8, subtract: bool) {
        let (source, source_negative) = self.take_decimal(cc, n);
        let mut dest = Vec::with_capacity(usize::from(n));
        let mut dest_negative = false;
        for _ in 0..n {
            let ch = self.dest_char(cc);
            dest_negative = is_negative_zone(ch);
            dest.push((ch & 0o17) % 10);
            self.move_dest_chars(cc, 1);
        }
        self.move_dest_chars(cc, -i64::from(n));
        let (digits, negative, overflow) =
            decimal_sum(&dest, dest_negative, &source, source_negative != subtract);
        self.put_decimal(cc, &digits, negative);
        self.regs.tfff = overflow;
    }

    /// TRP: copies `n` characters from the program stream, two per
    /// syllable, and skips over them.
    fn op_trp(&mut self, cc: &mut CentralControl, n: u8) {
        let base = i64::from(self.regs.c) * 4 + i64::from(self.regs.l);
        let mut current: Option<(u16, Word)> = None;
        for i in 0..i64::from(n) {
            let pos = (base + i / 2).rem_euclid(SYLLABLE_POSITIONS);
            let addr = (pos / 4) as u16;
            let word = match current {
                Some((a, w)) if a == addr => w,
                _ => {
                    let w = self.fetch(cc, addr);
                    current = Some((addr, w));
                    w
                }
            };
            let syllable = syllable_at(word, (pos % 4) as usize);
            let ch = if i % 2 == 0 {
                (syllable >> 6) as u8
            } else {
                (syllable & 0o77) as u8
            };
            self.put_dest_char(cc, ch);
        }
        self.jump_syllables((i32::from(n) + 1) / 2);
    }

    /// TRW: copies `n` whole words, starting at the next word
    /// boundary of each string.
    fn op_trw(&mut self, cc: &mut CentralControl, n: u8) {
        if self.regs.k != 0 || self.regs.v != 0 {
            self.regs.s = self.regs.s.wrapping_add(1) & ADDRESS_MASK;
        }
        self.flush_dest(cc);
        if self.regs.g != 0 || self.regs.h != 0 {
            self.regs.m = self.regs.m.wrapping_add(1) & ADDRESS_MASK;
        }
        self.regs.k = 0;
        self.regs.v = 0;
        self.regs.g = 0;
        self.regs.h = 0;
        self.regs.arof = false;
        for _ in 0..n {
            let (s, m) = (self.regs.s, self.regs.m);
            let w = self.fetch(cc, s);
            self.store(cc, m, w);
            self.regs.s = s.wrapping_add(1) & ADDRESS_MASK;
            self.regs.m = m.wrapping_add(1) & ADDRESS_MASK;
        }
    }
}
