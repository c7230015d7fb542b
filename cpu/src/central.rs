//! Central Control.
//!
//! Central Control is the only place where the processors and the
//! I/O units share state.  It owns main memory (and arbitrates every
//! access to it), the interrupt latches and the interrupt address
//! register, the real-time clock, and the peripheral ready and busy
//! masks.  It also accepts the operator-level requests which one
//! unit makes of another (Initiate I/O, Initiate P2, Halt P2).
//! Those requests are queued here and carried out by the system,
//! since only the system can reach the unit being asked.
use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

use super::interrupt::{Interrupt, InterruptLatches};
use super::memory::{AccessRequest, Memory, MemoryConfiguration, MAX_MODULES};
use super::types::{IoUnitId, ProcessorId, Requestor};

/// The real-time clock register is six bits wide.
pub const TM_MODULUS: u8 = 64;

/// Something Central Control needs another unit to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Start the I/O unit on the descriptor whose address is in
    /// cell 8.
    InitiateIo(IoUnitId),
    /// Start P2 from the INCW in cell 8.
    StartP2,
    HaltP2,
}

/// A snapshot of the state of Central Control, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CentralControlStatus {
    pub iar: u16,
    pub tm: u8,
    pub latches: InterruptLatches,
    pub memory_activity: u8,
    /// The modules fitted, one bit per module.
    pub memory_fitted: u8,
    /// The requestor last connected to each memory module.
    pub exchange: Vec<Option<Requestor>>,
    pub ready_mask: u64,
    pub busy_mask: u64,
    pub io_units_busy: Vec<bool>,
    pub p2_busy: bool,
}

#[derive(Debug)]
pub struct CentralControl {
    memory: Memory,
    latches: InterruptLatches,
    /// The interrupt address register.
    iar: Option<Interrupt>,
    tm: u8,
    ready_mask: u64,
    busy_mask: u64,
    /// The I/O unit using each busy peripheral.
    busy_owner: BTreeMap<UnitId, IoUnitId>,
    io_unit_busy: Vec<bool>,
    p2_present: bool,
    p2_busy: bool,
    requests: VecDeque<ControlRequest>,
}

impl CentralControl {
    pub fn new(memory: &MemoryConfiguration, io_units: u8, p2_present: bool) -> CentralControl {
        let io_units = io_units.clamp(1, IoUnitId::MAX_UNITS);
        CentralControl {
            memory: Memory::new(memory),
            latches: InterruptLatches::default(),
            iar: None,
            tm: 0,
            ready_mask: 0,
            busy_mask: 0,
            busy_owner: BTreeMap::new(),
            io_unit_busy: vec![false; usize::from(io_units)],
            p2_present,
            p2_busy: false,
            requests: VecDeque::new(),
        }
    }

    pub fn fetch(&mut self, req: &mut AccessRequest) {
        self.memory.fetch(req);
    }

    pub fn store(&mut self, req: &mut AccessRequest) {
        self.memory.store(req);
    }

    /// Recomputes the interrupt address register from the latches.
    pub fn signal_interrupt(&mut self) {
        let previous = self.iar;
        self.iar = self.latches.highest();
        if self.iar != previous {
            match self.iar {
                Some(interrupt) => {
                    event!(Level::DEBUG, "interrupt address is now {}", interrupt);
                }
                None => {
                    event!(Level::DEBUG, "no interrupt is pending");
                }
            }
        }
    }

    /// Resets the condition currently in the interrupt address
    /// register and selects the next one.  Does nothing if no
    /// interrupt is pending.
    pub fn clear_interrupt(&mut self) {
        if let Some(current) = self.iar {
            self.latches.reset(current);
            self.signal_interrupt();
        }
    }

    /// The vector of the pending interrupt, or 0 if there is none.
    #[must_use]
    pub fn interrupt_address(&self) -> u16 {
        self.iar.map(|i| i.vector()).unwrap_or(0)
    }

    #[must_use]
    pub fn current_interrupt(&self) -> Option<Interrupt> {
        self.iar
    }

    pub fn set_interrupt(&mut self, which: Interrupt) {
        self.latches.set(which);
        self.signal_interrupt();
    }

    /// ORs `bits` into the `I` register of processor `id`.
    pub fn set_processor_interrupt(&mut self, id: ProcessorId, bits: u8) {
        self.latches.processor[id.index()] |= bits;
        self.signal_interrupt();
    }

    #[must_use]
    pub fn processor_interrupt(&self, id: ProcessorId) -> u8 {
        self.latches.processor[id.index()]
    }

    #[must_use]
    pub fn latches(&self) -> &InterruptLatches {
        &self.latches
    }

    /// Called (through the device event channel) when a peripheral
    /// becomes ready or stops being ready.
    pub fn status_change(&mut self, unit: UnitId, ready: bool) {
        if ready {
            self.ready_mask |= unit.mask();
        } else {
            self.ready_mask &= !unit.mask();
        }
        event!(
            Level::DEBUG,
            "{unit} is {}",
            if ready { "ready" } else { "not ready" }
        );
    }

    #[must_use]
    pub fn test_unit_ready(&self, unit: UnitId) -> bool {
        self.ready_mask & unit.mask() != 0
    }

    /// True if `unit` is in use by some I/O unit other than `io`.
    #[must_use]
    pub fn test_unit_busy(&self, io: IoUnitId, unit: UnitId) -> bool {
        match self.busy_owner.get(&unit) {
            Some(owner) => *owner != io,
            None => false,
        }
    }

    pub fn set_unit_busy(&mut self, io: IoUnitId, unit: UnitId, busy: bool) {
        if busy {
            self.busy_mask |= unit.mask();
            self.busy_owner.insert(unit, io);
        } else if self.busy_owner.get(&unit) == Some(&io) {
            self.busy_mask &= !unit.mask();
            self.busy_owner.remove(&unit);
        }
    }

    #[must_use]
    pub fn io_unit_count(&self) -> usize {
        self.io_unit_busy.len()
    }

    #[must_use]
    pub fn is_io_unit_busy(&self, io: IoUnitId) -> bool {
        self.io_unit_busy.get(io.index()).copied().unwrap_or(true)
    }

    /// Claims a specific I/O unit (the Load sequence always uses
    /// I/O unit 1).  Returns false if it is busy.
    pub fn claim_io_unit(&mut self, io: IoUnitId) -> bool {
        match self.io_unit_busy.get_mut(io.index()) {
            Some(busy) if !*busy => {
                *busy = true;
                true
            }
            _ => false,
        }
    }

    /// Marks an I/O unit idle without reporting anything.
    pub fn release_io_unit(&mut self, io: IoUnitId) {
        if let Some(busy) = self.io_unit_busy.get_mut(io.index()) {
            *busy = false;
        }
    }

    /// The Initiate I/O operator.  Starts the lowest-numbered idle
    /// I/O unit; if they are all busy, sets the I/O busy interrupt.
    pub fn initiate_io(&mut self) -> Option<IoUnitId> {
        match self.io_unit_busy.iter().position(|busy| !*busy) {
            Some(n) => {
                self.io_unit_busy[n] = true;
                // There are at most four I/O units.
                let io = IoUnitId(n as u8);
                event!(Level::DEBUG, "initiate I/O on {io}");
                self.requests.push_back(ControlRequest::InitiateIo(io));
                Some(io)
            }
            None => {
                event!(Level::DEBUG, "initiate I/O: all I/O units are busy");
                self.set_interrupt(Interrupt::IoBusy);
                None
            }
        }
    }

    /// The Initiate P2 operator.
    pub fn initiate_p2(&mut self) {
        if !self.p2_present || self.p2_busy {
            event!(Level::DEBUG, "initiate P2: P2 is busy");
            self.set_interrupt(Interrupt::P2Busy);
        } else {
            self.p2_busy = true;
            self.requests.push_back(ControlRequest::StartP2);
        }
    }

    pub fn halt_p2(&mut self) {
        if self.p2_busy {
            self.requests.push_back(ControlRequest::HaltP2);
        }
    }

    pub fn set_p2_busy(&mut self, busy: bool) {
        self.p2_busy = busy;
    }

    #[must_use]
    pub fn p2_busy(&self) -> bool {
        self.p2_busy
    }

    pub fn take_requests(&mut self) -> Vec<ControlRequest> {
        self.requests.drain(..).collect()
    }

    /// Called by an I/O unit when it has stored its result
    /// descriptor.
    pub fn io_finished(&mut self, io: IoUnitId) {
        self.release_io_unit(io);
        self.set_interrupt(Interrupt::IoFinished(io));
    }

    /// Advances the real-time clock by one tick (1/60 second).
    pub fn tick_rtc(&mut self) {
        self.tm = (self.tm + 1) % TM_MODULUS;
        if self.tm == 0 {
            self.set_interrupt(Interrupt::TimeInterval);
        }
    }

    /// The value read by the Read Timer operator: the time-interval
    /// latch above the six bits of `TM`.
    #[must_use]
    pub fn read_timer(&self) -> Word {
        (Word::from(self.latches.time_interval) << 6) | Word::from(self.tm)
    }

    /// A device-initiated interrupt (keyboard request, printer
    /// finished and so on).  Units which have no such interrupt are
    /// ignored.
    pub fn device_signal(&mut self, unit: UnitId) {
        let which = match unit {
            UnitId::SPO => Interrupt::KeyboardRequest,
            UnitId::LPA => Interrupt::PrinterFinished(0),
            UnitId::LPB => Interrupt::PrinterFinished(1),
            UnitId::DCA => Interrupt::InquiryRequest,
            UnitId::DKA => Interrupt::DiskReadCheck(0),
            UnitId::DKB => Interrupt::DiskReadCheck(1),
            other => {
                event!(Level::WARN, "{other} signalled, but it has no interrupt");
                return;
            }
        };
        self.set_interrupt(which);
    }

    /// Power-on clear.  Peripheral readiness is a property of the
    /// peripherals, so the ready mask is kept.
    pub fn clear(&mut self) {
        self.latches = InterruptLatches::default();
        self.iar = None;
        self.tm = 0;
        self.busy_mask = 0;
        self.busy_owner.clear();
        self.io_unit_busy.fill(false);
        self.p2_busy = false;
        self.requests.clear();
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    pub fn status(&mut self) -> CentralControlStatus {
        CentralControlStatus {
            iar: self.interrupt_address(),
            tm: self.tm,
            latches: self.latches.clone(),
            memory_activity: self.memory.take_activity(),
            memory_fitted: self.memory.fitted(),
            exchange: (0..MAX_MODULES)
                .map(|m| self.memory.exchange_select(m))
                .collect(),
            ready_mask: self.ready_mask,
            busy_mask: self.busy_mask,
            io_units_busy: self.io_unit_busy.clone(),
            p2_busy: self.p2_busy,
        }
    }

    #[cfg(test)]
    pub(crate) fn memory(&self) -> &Memory {
        &self.memory
    }
}
