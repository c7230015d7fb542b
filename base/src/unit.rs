//! Peripheral unit designates.
//!
//! An I/O descriptor names its peripheral with a 5-bit unit
//! designate.  A few designates name a different physical unit
//! depending on the direction of the transfer (designate 10 is the
//! card reader when reading and the card punch when writing), so a
//! unit is identified by the designate together with the read bit.
//!
//! Each unit has a fixed ordinal, which is its bit position in
//! Central Control's ready and busy masks.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
#[cfg(test)]
use test_strategy::Arbitrary;

/// A peripheral unit.  The names are the ones used by the operating
/// system and in the machine documentation.
#[allow(clippy::upper_case_acronyms)]
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum UnitId {
    MTA,
    MTB,
    MTC,
    MTD,
    MTE,
    MTF,
    MTH,
    MTJ,
    MTK,
    MTL,
    MTM,
    MTN,
    MTP,
    MTR,
    MTS,
    MTT,
    DRA,
    DRB,
    DKA,
    DKB,
    CRA,
    CRB,
    CPA,
    LPA,
    LPB,
    PRA,
    PRB,
    PPA,
    PPB,
    DCA,
    SPO,
}

const TAPES: [UnitId; 16] = [
    UnitId::MTA,
    UnitId::MTB,
    UnitId::MTC,
    UnitId::MTD,
    UnitId::MTE,
    UnitId::MTF,
    UnitId::MTH,
    UnitId::MTJ,
    UnitId::MTK,
    UnitId::MTL,
    UnitId::MTM,
    UnitId::MTN,
    UnitId::MTP,
    UnitId::MTR,
    UnitId::MTS,
    UnitId::MTT,
];

impl UnitId {
    /// Identifies the unit addressed by `designate` for a read
    /// (`read` is true) or a write.  Designates which do not
    /// correspond to any unit give `None`; the I/O unit reports those
    /// as not ready.
    #[must_use]
    pub fn from_designate(designate: u8, read: bool) -> Option<UnitId> {
        match designate {
            d if d & 1 == 1 && d < 32 => Some(TAPES[usize::from(d >> 1)]),
            4 => Some(UnitId::DRA),
            6 => Some(UnitId::DKA),
            8 => Some(UnitId::DRB),
            10 if read => Some(UnitId::CRA),
            10 => Some(UnitId::CPA),
            12 => Some(UnitId::DKB),
            14 if read => Some(UnitId::CRB),
            16 => Some(UnitId::DCA),
            20 if read => Some(UnitId::PRA),
            20 => Some(UnitId::PPA),
            22 if !read => Some(UnitId::LPA),
            24 if read => Some(UnitId::PRB),
            24 => Some(UnitId::PPB),
            26 if !read => Some(UnitId::LPB),
            30 => Some(UnitId::SPO),
            _ => None,
        }
    }

    /// The unit designate used to address this unit in an I/O
    /// descriptor.
    #[must_use]
    pub fn designate(&self) -> u8 {
        match self {
            UnitId::DRA => 4,
            UnitId::DKA => 6,
            UnitId::DRB => 8,
            UnitId::CRA | UnitId::CPA => 10,
            UnitId::DKB => 12,
            UnitId::CRB => 14,
            UnitId::DCA => 16,
            UnitId::PRA | UnitId::PPA => 20,
            UnitId::LPA => 22,
            UnitId::PRB | UnitId::PPB => 24,
            UnitId::LPB => 26,
            UnitId::SPO => 30,
            tape => {
                let pos = TAPES.iter().position(|t| t == tape).unwrap_or(0);
                // pos is below 16, so this fits.
                (pos as u8) * 2 + 1
            }
        }
    }

    /// The bit position of this unit in the ready and busy masks.
    #[must_use]
    pub fn ordinal(&self) -> u32 {
        *self as u32
    }

    /// The bit corresponding to this unit in the ready and busy
    /// masks.
    #[must_use]
    pub fn mask(&self) -> u64 {
        1 << self.ordinal()
    }

    #[must_use]
    pub fn is_disk(&self) -> bool {
        matches!(self, UnitId::DKA | UnitId::DKB)
    }

    #[must_use]
    pub fn is_tape(&self) -> bool {
        TAPES.contains(self)
    }

    #[must_use]
    pub const fn all() -> [UnitId; 31] {
        [
            UnitId::MTA,
            UnitId::MTB,
            UnitId::MTC,
            UnitId::MTD,
            UnitId::MTE,
            UnitId::MTF,
            UnitId::MTH,
            UnitId::MTJ,
            UnitId::MTK,
            UnitId::MTL,
            UnitId::MTM,
            UnitId::MTN,
            UnitId::MTP,
            UnitId::MTR,
            UnitId::MTS,
            UnitId::MTT,
            UnitId::DRA,
            UnitId::DRB,
            UnitId::DKA,
            UnitId::DKB,
            UnitId::CRA,
            UnitId::CRB,
            UnitId::CPA,
            UnitId::LPA,
            UnitId::LPB,
            UnitId::PRA,
            UnitId::PRB,
            UnitId::PPA,
            UnitId::PPB,
            UnitId::DCA,
            UnitId::SPO,
        ]
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // The Debug representation is exactly the unit's mnemonic.
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownUnitName(String);

impl Display for UnknownUnitName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown unit name '{}'", self.0)
    }
}

impl std::error::Error for UnknownUnitName {}

impl TryFrom<&str> for UnitId {
    type Error = UnknownUnitName;

    fn try_from(s: &str) -> Result<UnitId, UnknownUnitName> {
        UnitId::all()
            .into_iter()
            .find(|u| u.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownUnitName(s.to_string()))
    }
}

#[test]
fn test_designates() {
    assert_eq!(UnitId::from_designate(10, true), Some(UnitId::CRA));
    assert_eq!(UnitId::from_designate(10, false), Some(UnitId::CPA));
    assert_eq!(UnitId::from_designate(30, false), Some(UnitId::SPO));
    assert_eq!(UnitId::from_designate(1, true), Some(UnitId::MTA));
    assert_eq!(UnitId::from_designate(31, false), Some(UnitId::MTT));
    assert_eq!(UnitId::from_designate(22, true), None);
    assert_eq!(UnitId::from_designate(2, true), None);
    assert_eq!(UnitId::from_designate(18, false), None);
    assert_eq!(UnitId::from_designate(28, false), None);
}

#[test]
fn test_unit_name_parse() {
    assert_eq!(UnitId::try_from("lpa"), Ok(UnitId::LPA));
    assert_eq!(UnitId::try_from("SPO"), Ok(UnitId::SPO));
    assert!(UnitId::try_from("XYZ").is_err());
}

#[test]
fn test_ordinals_fit_mask() {
    for u in UnitId::all() {
        assert!(u.ordinal() < 64);
    }
}

#[cfg(test)]
#[test_strategy::proptest]
fn designate_identifies_unit(unit: UnitId) {
    let read = !matches!(
        unit,
        UnitId::CPA | UnitId::LPA | UnitId::LPB | UnitId::PPA | UnitId::PPB
    );
    assert_eq!(UnitId::from_designate(unit.designate(), read), Some(unit));
}
