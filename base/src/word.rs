//! Words and bit fields.
//!
//! The B5500 word is 48 bits long (plus a parity bit which we never
//! model as being wrong).  We keep words in a `u64` whose upper 16
//! bits are always zero.
//!
//! The machine documentation numbers bits from the high-order end:
//! bit 0 is the most significant bit of the word and bit 47 the
//! least significant, so bit n has weight 2^(47-n).  Fields are
//! described as `[start:length]` in that numbering, and that is the
//! way [`field`] and [`set_field`] take their arguments.  This keeps
//! the field definitions here directly comparable with the
//! reference manual.

/// A 48-bit machine word.
pub type Word = u64;

/// Number of significant bits in a [`Word`].
pub const WORD_BITS: u32 = 48;

/// All 48 bits of a word.
pub const WORD_MASK: Word = (1 << WORD_BITS) - 1;

/// Bit 0, which distinguishes control words and descriptors from
/// operands.
pub const FLAG_BIT: Word = 1 << 47;

/// Bit 2, the presence bit of a data descriptor.
pub const PRESENCE_BIT: Word = 1 << 45;

/// Bits 0 and 1 together; every control word the processor builds
/// on the stack carries these.
pub const CONTROL_WORD: Word = FLAG_BIT | (1 << 46);

/// Memory addresses are 15 bits wide.
pub const ADDRESS_MASK: u16 = 0x7FFF;

/// The highest valid memory address.
pub const MAX_ADDRESS: u16 = ADDRESS_MASK;

/// Number of characters packed into each word.
pub const CHARS_PER_WORD: usize = 8;

/// Number of bits in each character.
pub const BITS_PER_CHAR: u32 = 6;

/// Syllables per program word.
pub const SYLLABLES_PER_WORD: usize = 4;

/// Extracts the field `[start:length]` of `word`.
///
/// # Examples
///
/// ```
/// use base::prelude::*;
/// // The unit designate of an I/O descriptor is [3:5].
/// let iod: Word = 0o22 << 40;
/// assert_eq!(field(iod, 3, 5), 0o22);
/// ```
#[must_use]
pub const fn field(word: Word, start: u32, length: u32) -> u64 {
    let shift = WORD_BITS - start - length;
    (word >> shift) & ((1 << length) - 1)
}

/// Returns `word` with the field `[start:length]` replaced by
/// `value` (which is truncated to fit).
#[must_use]
pub const fn set_field(word: Word, start: u32, length: u32, value: u64) -> Word {
    let shift = WORD_BITS - start - length;
    let mask: u64 = ((1 << length) - 1) << shift;
    (word & !mask) | ((value << shift) & mask)
}

/// Returns true if bit `n` (in the machine's numbering) is set.
#[must_use]
pub const fn bit(word: Word, n: u32) -> bool {
    field(word, n, 1) != 0
}

/// Extracts character `index` (0 is the high-order character) of
/// `word`.
#[must_use]
pub const fn char_at(word: Word, index: usize) -> u8 {
    let shift = (7 - (index as u32 % 8)) * BITS_PER_CHAR;
    ((word >> shift) & 0o77) as u8
}

/// Returns `word` with character `index` replaced by `ch`.
#[must_use]
pub const fn set_char_at(word: Word, index: usize, ch: u8) -> Word {
    let shift = (7 - (index as u32 % 8)) * BITS_PER_CHAR;
    (word & !(0o77 << shift)) | (((ch & 0o77) as u64) << shift)
}

/// Extracts syllable `index` (0 is the high-order syllable) of a
/// program word.
#[must_use]
pub const fn syllable_at(word: Word, index: usize) -> u16 {
    let shift = (3 - (index as u32 % 4)) * 12;
    ((word >> shift) & 0o7777) as u16
}

/// Truncates `value` to a 15-bit memory address.
#[must_use]
pub const fn address_of(value: u64) -> u16 {
    (value as u16) & ADDRESS_MASK
}

#[test]
fn test_field_numbering() {
    // Bit 47 is the low-order bit.
    assert_eq!(field(1, 47, 1), 1);
    assert_eq!(field(FLAG_BIT, 0, 1), 1);
    assert!(bit(PRESENCE_BIT, 2));
    assert!(!bit(PRESENCE_BIT, 1));
    assert_eq!(field(0o7777_0000_0000_0000, 0, 12), 0o7777);
}

#[test]
fn test_set_field() {
    let w = set_field(0, 33, 15, 0x1234);
    assert_eq!(w, 0x1234);
    let w = set_field(w, 3, 5, 0o37);
    assert_eq!(field(w, 3, 5), 0o37);
    assert_eq!(field(w, 33, 15), 0x1234);
    // Values which are too wide are truncated.
    assert_eq!(set_field(0, 44, 4, 0xFF), 0xF);
}

#[test]
fn test_chars() {
    let w: Word = 0o0102030405060770;
    assert_eq!(char_at(w, 0), 0o01);
    assert_eq!(char_at(w, 6), 0o07);
    assert_eq!(char_at(w, 7), 0o70);
    let w = set_char_at(w, 7, 0o12);
    assert_eq!(char_at(w, 7), 0o12);
    assert_eq!(char_at(w, 6), 0o07);
}

#[test]
fn test_syllables() {
    let w: Word = 0o1111_2222_3333_4444;
    assert_eq!(syllable_at(w, 0), 0o1111);
    assert_eq!(syllable_at(w, 3), 0o4444);
}
