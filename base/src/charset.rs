//! Character set conversions.
//!
//! The B5500 keeps characters in its own 6-bit code, BIC (Binary
//! Internal Code).  Peripherals and the host use 8-bit characters,
//! so the I/O unit translates in each direction when it moves data
//! in alpha mode.
//!
//! The translation table below must not be changed; text produced by
//! (and for) software running on the emulator depends on it.
//!
//! Not every 8-bit character has a BIC representation.  Those which
//! don't all translate to the BIC code for `?`, which the machine
//! treats as an invalid character.

/// BIC codes 0o00 to 0o77 in order, as 8-bit characters.
pub const BIC_TO_ANSI: [u8; 64] =
    *b"0123456789#@?:>}+ABCDEFGHI.[&(<~|JKLMNOPQR$*-);{ /STUVWXYZ,%!=]\"";

/// The group mark.  In alpha mode this character terminates a
/// transfer.
pub const GROUP_MARK: u8 = 0o37;

/// The code produced for characters which have no BIC equivalent.
pub const INVALID_CHAR: u8 = 0o14;

/// BIC blank.
pub const BLANK: u8 = 0o60;

const fn build_ansi_to_bic() -> [u8; 256] {
    let mut table = [INVALID_CHAR; 256];
    let mut i = 0;
    while i < BIC_TO_ANSI.len() {
        table[BIC_TO_ANSI[i] as usize] = i as u8;
        i += 1;
    }
    // Lower-case letters print as upper case.
    let mut c = b'a';
    while c <= b'z' {
        table[c as usize] = table[(c - b'a' + b'A') as usize];
        c += 1;
    }
    table
}

const ANSI_TO_BIC: [u8; 256] = build_ansi_to_bic();

/// Translates a BIC character (only the low 6 bits of `bic` are
/// used) to the host character set.
///
/// # Examples
/// ```
/// use base::charset::bic_to_ansi;
/// assert_eq!(bic_to_ansi(0o21), b'A');
/// assert_eq!(bic_to_ansi(0o60), b' ');
/// ```
#[must_use]
pub const fn bic_to_ansi(bic: u8) -> u8 {
    BIC_TO_ANSI[(bic & 0o77) as usize]
}

/// Translates a host character to BIC.
#[must_use]
pub const fn ansi_to_bic(ch: u8) -> u8 {
    ANSI_TO_BIC[ch as usize]
}

/// Translates a string of BIC characters for display.
#[must_use]
pub fn bic_to_string(codes: &[u8]) -> String {
    codes.iter().map(|c| char::from(bic_to_ansi(*c))).collect()
}

/// Translates host text to BIC, one code per byte.
#[must_use]
pub fn string_to_bic(s: &str) -> Vec<u8> {
    s.bytes().map(ansi_to_bic).collect()
}
