//! The I/O units.
//!
//! An I/O unit carries out one I/O operation at a time.  When the
//! Initiate I/O operator selects it, the unit fetches the address of
//! an I/O descriptor from cell 8, fetches the descriptor itself, and
//! checks that the peripheral it names exists, is ready and is not
//! in use by another I/O unit.  It then starts the operation on the
//! device.  When the device finishes, the unit moves the data
//! between the device buffer and memory (translating characters in
//! alpha mode), builds a result descriptor, stores it in the unit's
//! result cell, and sets its I/O finished interrupt.
//!
//! Errors found at any stage are recorded in the result descriptor;
//! none of them is an error as far as the emulator is concerned.
//!
//! The same machinery performs the hardware Load sequence, which
//! reads the first program into memory.  A load does not store a
//! result descriptor or set an interrupt.
use std::error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, span, Level};

use base::charset::{ansi_to_bic, bic_to_ansi, GROUP_MARK};
use base::descriptor::MAX_WORD_COUNT;
use base::prelude::*;

use super::central::CentralControl;
use super::device::{DeviceManager, DeviceRequest, IoCompletion, Operation};
use super::memory::{AccessRequest, MemoryAccessError};
use super::types::{IoUnitId, Requestor};

/// The cell holding the address of the I/O descriptor.
pub const IOD_POINTER_CELL: u16 = 0o10;

/// The result descriptor of I/O unit 1 is stored here, that of I/O
/// unit 2 in the next cell, and so on.
pub const RESULT_CELL_BASE: u16 = 0o14;

/// Programs are loaded here.
pub const LOAD_ADDRESS: u16 = 0o20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IoUnitState {
    Idle,
    FetchingDescriptor,
    Validating,
    Transferring,
    Finishing,
}

/// Where the Load sequence reads the first program from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LoadSource {
    /// Card reader A.
    Card,
    /// Segment 1 of disk A.
    Disk,
}

impl LoadSource {
    /// The descriptor the hardware uses to load from this source.
    #[must_use]
    pub fn descriptor(&self) -> IoDescriptor {
        let (unit, words) = match self {
            LoadSource::Card => (UnitId::CRA, 20),
            LoadSource::Disk => (UnitId::DKA, 63),
        };
        IoDescriptor {
            designate: unit.designate(),
            word_count: words,
            memory_inhibit: false,
            mode: TransferMode::Binary,
            reverse: false,
            word_count_enabled: true,
            read: true,
            control: 0,
            address: LOAD_ADDRESS,
        }
    }
}

impl Display for LoadSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadSource::Card => "card",
            LoadSource::Disk => "disk",
        })
    }
}

/// The I/O unit could not obtain its I/O descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorError {
    Pointer(MemoryAccessError),
    Descriptor(MemoryAccessError),
}

impl Display for DescriptorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::Pointer(e) => {
                write!(f, "failed to fetch the I/O descriptor address: {e}")
            }
            DescriptorError::Descriptor(e) => {
                write!(f, "failed to fetch the I/O descriptor: {e}")
            }
        }
    }
}

impl error::Error for DescriptorError {}

/// The end of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub io_unit: IoUnitId,
    pub result: ResultDescriptor,
    /// True if this was the Load sequence.
    pub load: bool,
}

#[derive(Debug)]
pub struct IoUnit {
    id: IoUnitId,
    state: IoUnitState,
    iod: IoDescriptor,
    unit: Option<UnitId>,
    op: Option<Operation>,
    flags: ResultFlags,
    /// The next memory address to transfer to or from.
    address: u16,
    /// Words remaining to transfer.
    word_count: u16,
    /// The transfer has used the last word of memory.
    wrapped: bool,
    loading: bool,
    last: Option<ResultDescriptor>,
}

/// Decodes the segment address held (as decimal digits) in the low
/// seven characters of a disk header word.
fn segment_address(header: Word) -> u32 {
    (1..CHARS_PER_WORD).fold(0, |acc, i| {
        acc * 10 + u32::from(char_at(header, i) & 0o17)
    })
}

fn select_operation(iod: &IoDescriptor, unit: UnitId) -> Operation {
    match (iod.read, iod.memory_inhibit) {
        (true, false) => Operation::Read,
        (true, true) if unit.is_disk() => {
            if iod.control & 1 != 0 {
                Operation::ReadInterrogate
            } else {
                Operation::ReadCheck
            }
        }
        (true, true) => Operation::Space,
        (false, false) => Operation::Write,
        (false, true) if unit.is_disk() => Operation::WriteInterrogate,
        (false, true) if unit.is_tape() && iod.word_count == 0 => Operation::Rewind,
        (false, true) => Operation::Erase,
    }
}

impl IoUnit {
    pub fn new(id: IoUnitId) -> IoUnit {
        IoUnit {
            id,
            state: IoUnitState::Idle,
            iod: IoDescriptor::decode(0),
            unit: None,
            op: None,
            flags: ResultFlags::default(),
            address: 0,
            word_count: 0,
            wrapped: false,
            loading: false,
            last: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> IoUnitId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> IoUnitState {
        self.state
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state != IoUnitState::Idle
    }

    /// The result of the last operation this unit finished.
    #[must_use]
    pub fn last_result(&self) -> Option<ResultDescriptor> {
        self.last
    }

    fn requestor(&self) -> Requestor {
        Requestor::IoUnit(self.id)
    }

    fn reset(&mut self) {
        self.unit = None;
        self.op = None;
        self.flags = ResultFlags::default();
        self.wrapped = false;
        self.loading = false;
    }

    /// Abandons any operation in progress.
    pub fn clear(&mut self) {
        self.reset();
        self.state = IoUnitState::Idle;
    }

    fn fetch_word(&self, cc: &mut CentralControl, addr: u16) -> Result<Word, MemoryAccessError> {
        let mut req = AccessRequest::new(self.requestor(), addr, false);
        cc.fetch(&mut req);
        req.outcome()
    }

    fn store_word(
        &self,
        cc: &mut CentralControl,
        addr: u16,
        word: Word,
    ) -> Result<(), MemoryAccessError> {
        let mut req = AccessRequest::new(self.requestor(), addr, false).with_word(word);
        cc.store(&mut req);
        req.outcome().map(|_| ())
    }

    fn note_memory_error(&mut self, e: MemoryAccessError) {
        event!(Level::DEBUG, "{}: {}", self.id, e);
        match e {
            MemoryAccessError::Address(_) => self.flags.address_error = true,
            MemoryAccessError::Parity(_) => self.flags.device_error_3 = true,
        }
    }

    fn fetch_descriptor(&self, cc: &mut CentralControl) -> Result<Word, DescriptorError> {
        let pointer = self
            .fetch_word(cc, IOD_POINTER_CELL)
            .map_err(DescriptorError::Pointer)?;
        self.fetch_word(cc, address_of(pointer))
            .map_err(DescriptorError::Descriptor)
    }

    /// Starts the operation described by the descriptor whose
    /// address is in cell 8.  Returns the outcome if the operation
    /// finished without reaching a device.
    pub fn initiate(
        &mut self,
        cc: &mut CentralControl,
        devices: &mut DeviceManager,
    ) -> Option<Outcome> {
        let span = span!(Level::DEBUG, "initiate", io = %self.id);
        let _enter = span.enter();
        self.reset();
        self.state = IoUnitState::FetchingDescriptor;
        match self.fetch_descriptor(cc) {
            Ok(w) => self.begin(cc, devices, IoDescriptor::decode(w)),
            Err(e) => {
                event!(Level::DEBUG, "{}", e);
                self.iod = IoDescriptor::decode(0);
                self.address = 0;
                self.word_count = 0;
                self.flags.descriptor_parity = true;
                Some(self.finish(cc))
            }
        }
    }

    /// Performs the hardware Load sequence.
    pub fn load(
        &mut self,
        cc: &mut CentralControl,
        devices: &mut DeviceManager,
        source: LoadSource,
    ) -> Option<Outcome> {
        let span = span!(Level::DEBUG, "load", io = %self.id, %source);
        let _enter = span.enter();
        self.reset();
        self.loading = true;
        self.begin(cc, devices, source.descriptor())
    }

    fn begin(
        &mut self,
        cc: &mut CentralControl,
        devices: &mut DeviceManager,
        iod: IoDescriptor,
    ) -> Option<Outcome> {
        self.state = IoUnitState::Validating;
        self.iod = iod;
        self.address = iod.address;
        self.word_count = iod.word_count;
        event!(Level::DEBUG, "{}: {}", self.id, iod);

        let Some(unit) = UnitId::from_designate(iod.designate, iod.read) else {
            event!(Level::DEBUG, "unit designate {} is not implemented", iod.designate);
            self.flags.not_ready = true;
            return Some(self.finish(cc));
        };
        if cc.test_unit_busy(self.id, unit) {
            self.flags.busy = true;
            return Some(self.finish(cc));
        }
        if !cc.test_unit_ready(unit) || !devices.is_attached(unit) {
            self.flags.not_ready = true;
            return Some(self.finish(cc));
        }

        let op = select_operation(&iod, unit);
        let mut segment = None;
        if unit.is_disk() {
            if self.loading {
                segment = Some(1);
            } else {
                match self.fetch_word(cc, self.address) {
                    Ok(header) => {
                        segment = Some(segment_address(header));
                        self.address = self.address.wrapping_add(1) & ADDRESS_MASK;
                    }
                    Err(e) => {
                        self.note_memory_error(e);
                        return Some(self.finish(cc));
                    }
                }
            }
        }
        let words = if iod.word_count_enabled {
            iod.word_count
        } else {
            MAX_WORD_COUNT
        };
        let length = usize::from(words) * CHARS_PER_WORD;
        let buffer = if op == Operation::Write {
            self.fetch_buffer(cc, length)
        } else {
            Vec::new()
        };
        if self.flags.address_error || self.flags.device_error_3 {
            return Some(self.finish(cc));
        }

        self.unit = Some(unit);
        self.op = Some(op);
        self.state = IoUnitState::Transferring;
        cc.set_unit_busy(self.id, unit, true);
        let req = DeviceRequest {
            unit,
            mode: iod.mode,
            reverse: iod.reverse,
            control: iod.control,
            length: if op == Operation::Write {
                buffer.len()
            } else {
                length
            },
            segment,
            buffer,
        };
        if devices.start(self.id, op, req) {
            None
        } else {
            cc.set_unit_busy(self.id, unit, false);
            self.flags.not_ready = true;
            Some(self.finish(cc))
        }
    }

    /// Called when the device reports the end of the operation.
    pub fn complete(&mut self, cc: &mut CentralControl, done: IoCompletion) -> Option<Outcome> {
        if self.state != IoUnitState::Transferring || self.unit != Some(done.unit) {
            event!(
                Level::WARN,
                "{}: unexpected completion from {} in state {:?}",
                self.id,
                done.unit,
                self.state
            );
            return None;
        }
        let span = span!(Level::DEBUG, "complete", io = %self.id, unit = %done.unit);
        let _enter = span.enter();
        self.flags.merge(ResultFlags::from_error_mask(done.error_mask));
        if self.op == Some(Operation::Read) {
            let length = done.length.min(done.buffer.len());
            self.store_buffer(cc, &done.buffer[..length]);
        }
        cc.set_unit_busy(self.id, done.unit, false);
        Some(self.finish(cc))
    }

    fn count_word(&mut self) {
        if self.iod.word_count_enabled {
            self.word_count = self.word_count.saturating_sub(1);
        }
    }

    /// Moves the transfer address on by one word: up, or down for a
    /// reverse transfer.
    fn advance(&mut self) {
        self.count_word();
        let limit = if self.iod.reverse { 0 } else { MAX_ADDRESS };
        if self.address == limit {
            self.wrapped = true;
        } else if self.iod.reverse {
            self.address -= 1;
        } else {
            self.address += 1;
        }
    }

    /// The position within a word of the `i`th character transferred.
    /// A reverse transfer fills (or empties) each word from its last
    /// character.
    fn char_index(&self, i: usize) -> usize {
        if self.iod.reverse {
            CHARS_PER_WORD - 1 - i
        } else {
            i
        }
    }

    /// Stores one word at the current transfer address and advances
    /// it.  Returns false if the transfer must stop.
    fn put_word(&mut self, cc: &mut CentralControl, word: Word) -> bool {
        if self.wrapped {
            self.flags.address_error = true;
            return false;
        }
        match self.store_word(cc, self.address, word) {
            Ok(()) => {
                self.advance();
                true
            }
            Err(e) => {
                self.note_memory_error(e);
                false
            }
        }
    }

    /// Moves characters from a device buffer into memory.
    pub(crate) fn store_buffer(&mut self, cc: &mut CentralControl, buffer: &[u8]) {
        let alpha = self.iod.mode == TransferMode::Alpha;
        let mut word: Word = 0;
        let mut count = 0;
        for &byte in buffer {
            let ch = if alpha { ansi_to_bic(byte) } else { byte & 0o77 };
            word = set_char_at(word, self.char_index(count), ch);
            count += 1;
            if count == CHARS_PER_WORD {
                if !self.put_word(cc, word) {
                    return;
                }
                word = 0;
                count = 0;
            }
            if alpha && ch == GROUP_MARK {
                break;
            }
        }
        if count > 0 {
            self.put_word(cc, word);
        }
    }

    /// Collects up to `length` characters from memory for a write.
    pub(crate) fn fetch_buffer(&mut self, cc: &mut CentralControl, length: usize) -> Vec<u8> {
        let alpha = self.iod.mode == TransferMode::Alpha;
        let mut buffer = Vec::with_capacity(length);
        while buffer.len() < length {
            if self.wrapped {
                self.flags.address_error = true;
                break;
            }
            let word = match self.fetch_word(cc, self.address) {
                Ok(w) => w,
                Err(e) => {
                    self.note_memory_error(e);
                    break;
                }
            };
            self.advance();
            let mut group_mark = false;
            for i in 0..CHARS_PER_WORD {
                let ch = char_at(word, self.char_index(i));
                if alpha {
                    if ch == GROUP_MARK {
                        group_mark = true;
                        break;
                    }
                    buffer.push(bic_to_ansi(ch));
                } else {
                    buffer.push(ch);
                }
            }
            if group_mark {
                break;
            }
        }
        buffer.truncate(length);
        buffer
    }

    fn finish(&mut self, cc: &mut CentralControl) -> Outcome {
        self.state = IoUnitState::Finishing;
        let result = ResultDescriptor {
            iod: IoDescriptor {
                address: self.address,
                word_count: self.word_count,
                ..self.iod
            },
            flags: self.flags,
        };
        event!(
            Level::DEBUG,
            "{} finished: {:016o} {:?}",
            self.id,
            result.encode(),
            result.flags
        );
        let load = self.loading;
        if load {
            cc.release_io_unit(self.id);
        } else {
            let cell = RESULT_CELL_BASE + self.id.index() as u16;
            if let Err(e) = self.store_word(cc, cell, result.encode()) {
                event!(Level::ERROR, "{}: result descriptor lost: {}", self.id, e);
            }
            cc.io_finished(self.id);
        }
        self.last = Some(result);
        self.reset();
        self.state = IoUnitState::Idle;
        Outcome {
            io_unit: self.id,
            result,
            load,
        }
    }
}
