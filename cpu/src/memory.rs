//! Main memory and memory access arbitration.
//!
//! B5500 memory is made of up to eight modules of 4096 words each.
//! The high-order three bits of a 15-bit address select the module
//! and the rest select the word within it.  Module 0 is always
//! present; a system may be built without some of the others, and
//! an access to a missing module is an address error.
//!
//! Every access is made through Central Control, on behalf of some
//! requestor (a processor or an I/O unit), and is described by an
//! [`AccessRequest`].  The request carries the result of the access
//! (the word read, or the error flags) back to the requestor.
//!
//! The hardware checks parity on every access.  The emulator's
//! memory never has parity errors, but the flag exists so that
//! requestors handle it just as they would have to on the real
//! machine.
use std::error;
use std::fmt::{self, Debug, Display, Formatter};

use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

use super::types::Requestor;

pub const MODULE_BITS: u32 = 12;
pub const MODULE_SIZE: usize = 1 << MODULE_BITS;
pub const MODULE_MASK: u16 = (1 << MODULE_BITS) - 1;
pub const MAX_MODULES: usize = 8;

/// Addresses below this are accessible only in control state.
pub const PROTECTED_LIMIT: u16 = 0o1000;

/// Describes which memory modules are fitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryConfiguration {
    /// Module 0 is fitted even if this says it isn't.
    pub modules: [bool; MAX_MODULES],
}

impl MemoryConfiguration {
    /// A configuration with modules 0 to `count - 1` fitted.
    #[must_use]
    pub fn contiguous(count: usize) -> MemoryConfiguration {
        let mut modules = [false; MAX_MODULES];
        for (i, fitted) in modules.iter_mut().enumerate() {
            *fitted = i < count.max(1);
        }
        MemoryConfiguration { modules }
    }
}

impl Default for MemoryConfiguration {
    fn default() -> MemoryConfiguration {
        MemoryConfiguration::contiguous(MAX_MODULES)
    }
}

/// A single memory access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub requestor: Requestor,
    pub addr: u16,
    /// For a store, the word to store.  For a fetch, the word read.
    pub word: Word,
    /// The access is to the protected low range of memory by a
    /// requestor which is in normal state.
    pub invalid_in_normal_state: bool,
    pub parity_error: bool,
    pub address_error: bool,
}

impl AccessRequest {
    /// Describes an access by `requestor` to `addr`; `normal_state`
    /// says whether the requestor is in normal (rather than control)
    /// state.
    #[must_use]
    pub fn new(requestor: Requestor, addr: u16, normal_state: bool) -> AccessRequest {
        let addr = addr & ADDRESS_MASK;
        AccessRequest {
            requestor,
            addr,
            word: 0,
            invalid_in_normal_state: normal_state && addr < PROTECTED_LIMIT,
            parity_error: false,
            address_error: false,
        }
    }

    #[must_use]
    pub fn with_word(self, word: Word) -> AccessRequest {
        AccessRequest {
            word: word & WORD_MASK,
            ..self
        }
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        self.parity_error || self.address_error
    }

    /// Converts the outcome of the access into a `Result`.
    pub fn outcome(&self) -> Result<Word, MemoryAccessError> {
        if self.parity_error {
            Err(MemoryAccessError::Parity(self.addr))
        } else if self.address_error {
            Err(MemoryAccessError::Address(self.addr))
        } else {
            Ok(self.word)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAccessError {
    /// The address is in a missing module, or is protected.
    Address(u16),
    Parity(u16),
}

impl Display for MemoryAccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            MemoryAccessError::Address(addr) => {
                write!(f, "address {addr:05o} is not accessible")
            }
            MemoryAccessError::Parity(addr) => {
                write!(f, "memory parity error at {addr:05o}")
            }
        }
    }
}

impl error::Error for MemoryAccessError {}

pub(crate) struct Memory {
    modules: Vec<Option<Box<[Word]>>>,
    /// Modules accessed since the last call to `take_activity`.
    busy: u8,
    /// The requestor which last selected each module's exchange.
    exchange: [Option<Requestor>; MAX_MODULES],
}

fn split(addr: u16) -> (usize, usize) {
    (
        usize::from(addr >> MODULE_BITS),
        usize::from(addr & MODULE_MASK),
    )
}

impl Memory {
    pub(crate) fn new(config: &MemoryConfiguration) -> Memory {
        let modules = config
            .modules
            .iter()
            .enumerate()
            .map(|(i, fitted)| {
                if *fitted || i == 0 {
                    Some(vec![0; MODULE_SIZE].into_boxed_slice())
                } else {
                    None
                }
            })
            .collect();
        Memory {
            modules,
            busy: 0,
            exchange: [None; MAX_MODULES],
        }
    }

    fn select(&mut self, req: &AccessRequest) -> (usize, usize) {
        let (module, offset) = split(req.addr);
        self.busy |= 1 << module;
        self.exchange[module] = Some(req.requestor);
        (module, offset)
    }

    fn cell(&mut self, module: usize, offset: usize) -> Option<&mut Word> {
        self.modules
            .get_mut(module)
            .and_then(|m| m.as_mut())
            .and_then(|m| m.get_mut(offset))
    }

    pub(crate) fn fetch(&mut self, req: &mut AccessRequest) {
        let (module, offset) = self.select(req);
        req.parity_error = false;
        if req.invalid_in_normal_state {
            req.address_error = true;
            req.word = 0;
        } else if let Some(w) = self.cell(module, offset) {
            req.address_error = false;
            req.word = *w;
        } else {
            req.address_error = true;
            req.word = 0;
        }
        if req.address_error {
            event!(
                Level::DEBUG,
                "{} fetch from {:05o} failed",
                req.requestor,
                req.addr
            );
        }
    }

    pub(crate) fn store(&mut self, req: &mut AccessRequest) {
        let (module, offset) = self.select(req);
        req.parity_error = false;
        let word = req.word & WORD_MASK;
        if req.invalid_in_normal_state {
            req.address_error = true;
        } else if let Some(w) = self.cell(module, offset) {
            *w = word;
            req.address_error = false;
        } else {
            req.address_error = true;
        }
        if req.address_error {
            event!(
                Level::DEBUG,
                "{} store to {:05o} failed",
                req.requestor,
                req.addr
            );
        }
    }

    /// Returns the set of modules accessed since the last call, and
    /// forgets them.
    pub(crate) fn take_activity(&mut self) -> u8 {
        std::mem::take(&mut self.busy)
    }

    pub(crate) fn exchange_select(&self, module: usize) -> Option<Requestor> {
        self.exchange.get(module).copied().flatten()
    }

    pub(crate) fn fitted(&self) -> u8 {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_some())
            .fold(0, |acc, (i, _)| acc | (1 << i))
    }

    pub(crate) fn clear(&mut self) {
        for m in self.modules.iter_mut().flatten() {
            m.fill(0);
        }
    }
}

impl Debug for Memory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("fitted", &format_args!("{:08b}", self.fitted()))
            .field("busy", &format_args!("{:08b}", self.busy))
            .finish()
    }
}
