use std::fmt::{self, Debug, Display, Formatter};

use serde::Serialize;

/// Identifies one of the (at most two) processors.  P1 is the
/// processor which handles interrupts; P2 only ever runs programs
/// which P1 initiates on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ProcessorId {
    P1,
    P2,
}

impl ProcessorId {
    pub(crate) fn index(&self) -> usize {
        match self {
            ProcessorId::P1 => 0,
            ProcessorId::P2 => 1,
        }
    }
}

impl Display for ProcessorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessorId::P1 => "P1",
            ProcessorId::P2 => "P2",
        })
    }
}

/// Identifies an I/O unit (the machine has up to four of them).  The
/// value is zero-based but I/O units are displayed starting from 1
/// as in the documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IoUnitId(pub(crate) u8);

impl IoUnitId {
    pub const MAX_UNITS: u8 = 4;

    /// Makes an identifier for I/O unit `number`, counting from 1.
    #[must_use]
    pub fn new(number: u8) -> Option<IoUnitId> {
        if (1..=IoUnitId::MAX_UNITS).contains(&number) {
            Some(IoUnitId(number - 1))
        } else {
            None
        }
    }

    #[must_use]
    pub fn number(&self) -> u8 {
        self.0 + 1
    }

    pub(crate) fn index(&self) -> usize {
        usize::from(self.0)
    }
}

impl Display for IoUnitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "IO{}", self.number())
    }
}

/// The identity of the unit making a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Requestor {
    Processor(ProcessorId),
    IoUnit(IoUnitId),
}

impl Display for Requestor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Requestor::Processor(p) => write!(f, "{p}"),
            Requestor::IoUnit(u) => write!(f, "{u}"),
        }
    }
}
