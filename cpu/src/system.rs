//! The whole machine.
//!
//! [`B5500`] owns Central Control, the processors, the I/O units and
//! the attached devices, and runs them through a [`Scheduler`]:
//!
//! - each busy processor runs one time slice per callback, and
//!   schedules its next slice for when the hardware would have
//!   finished the one it just ran;
//! - the real-time clock ticks sixty times a second;
//! - device completions arrive on the device event channel and are
//!   handed to their I/O unit from a callback of their own.
//!
//! The program driving the scheduler must call [`B5500::service`]
//! regularly (the CLI does it on every pass of its main loop) so that
//! device events and Central Control requests are picked up.
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, span, Level};

use base::prelude::*;

use super::central::{CentralControl, CentralControlStatus, ControlRequest};
use super::config::{ConfigError, SystemConfig};
use super::device::{Device, DeviceEvent, DeviceManager, IoCompletion};
use super::iounit::{IoUnit, LoadSource, Outcome, LOAD_ADDRESS};
use super::processor::{next_slice_delay_ms, Processor, ProcessorFault, ProcessorStatus};
use super::scheduler::{CallbackResult, Category, Scheduler, Token};
use super::types::{IoUnitId, ProcessorId};

/// The real-time clock ticks every 1/60 second.
pub const RTC_PERIOD_MS: f64 = 1000.0 / 60.0;

/// Why a Load could not be performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    /// P1 is already running; halt it first.
    AlreadyRunning,
    /// I/O unit 1 is still busy with an earlier operation.
    IoUnitBusy,
    /// The load operation itself reported errors.
    Unit(ResultFlags),
}

impl Display for LoadFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LoadFailure::AlreadyRunning => f.write_str("the system is already running"),
            LoadFailure::IoUnitBusy => f.write_str("I/O unit 1 is busy"),
            LoadFailure::Unit(flags) => write!(f, "the load operation failed: {flags}"),
        }
    }
}

impl Error for LoadFailure {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub central: CentralControlStatus,
    pub processors: Vec<ProcessorStatus>,
    pub io_units_busy: Vec<bool>,
}

#[derive(Debug)]
pub struct B5500 {
    cc: CentralControl,
    processors: Vec<Processor>,
    io_units: Vec<IoUnit>,
    devices: DeviceManager,
    rtc: Option<Token>,
    slices: BTreeMap<ProcessorId, Token>,
    load_failure: Option<LoadFailure>,
}

impl B5500 {
    pub fn new(config: &SystemConfig) -> Result<B5500, ConfigError> {
        config.validate()?;
        let mut processors = vec![Processor::new(ProcessorId::P1)];
        if config.has_p2() {
            processors.push(Processor::new(ProcessorId::P2));
        }
        let io_units = (1..=config.io_units)
            .filter_map(IoUnitId::new)
            .map(IoUnit::new)
            .collect();
        event!(
            Level::INFO,
            "configured {} processor(s), {} I/O unit(s), {} memory module(s)",
            config.processors,
            config.io_units,
            config.memory_modules
        );
        Ok(B5500 {
            cc: CentralControl::new(&config.memory(), config.io_units, config.has_p2()),
            processors,
            io_units,
            devices: DeviceManager::new(),
            rtc: None,
            slices: BTreeMap::new(),
            load_failure: None,
        })
    }

    pub fn attach(&mut self, unit: UnitId, device: Box<dyn Device>) {
        self.devices.attach(unit, device);
    }

    #[must_use]
    pub fn central(&self) -> &CentralControl {
        &self.cc
    }

    #[must_use]
    pub fn processor(&self, id: ProcessorId) -> Option<&Processor> {
        self.processors.get(id.index())
    }

    #[must_use]
    pub fn io_unit(&self, io: IoUnitId) -> Option<&IoUnit> {
        self.io_units.get(io.index())
    }

    /// True while any processor is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.processors.iter().any(Processor::is_busy)
    }

    /// The reason P1 stopped, if it stopped on a fault.
    #[must_use]
    pub fn fault(&self) -> Option<ProcessorFault> {
        self.processors.first().and_then(Processor::fault)
    }

    /// Takes the failure of the most recent Load, if it failed after
    /// [`B5500::load`] returned.
    pub fn take_load_failure(&mut self) -> Option<LoadFailure> {
        self.load_failure.take()
    }

    pub fn status(&mut self) -> SystemStatus {
        SystemStatus {
            central: self.cc.status(),
            processors: self.processors.iter().map(Processor::status).collect(),
            io_units_busy: self.io_units.iter().map(IoUnit::is_busy).collect(),
        }
    }

    /// Starts the real-time clock.
    pub fn power_on(&mut self, sched: &mut Scheduler<B5500>) {
        if self.rtc.is_none() {
            event!(Level::INFO, "power on");
            self.schedule_rtc(sched);
        }
    }

    /// Stops everything, including the real-time clock.
    pub fn power_off(&mut self, sched: &mut Scheduler<B5500>) {
        self.halt(sched);
        if let Some(token) = self.rtc.take() {
            sched.cancel(token);
        }
        event!(Level::INFO, "power off");
    }

    fn schedule_rtc(&mut self, sched: &mut Scheduler<B5500>) {
        let token = sched.schedule(Category::TimeInterval, RTC_PERIOD_MS, |sys, sched| {
            sys.rtc = None;
            sys.cc.tick_rtc();
            sys.schedule_rtc(sched);
            Ok(())
        });
        self.rtc = Some(token);
    }

    /// The operator's Load button: clears the system and reads the
    /// bootstrap program into memory at 0o20 through I/O unit 1,
    /// then starts P1 there.
    pub fn load(
        &mut self,
        sched: &mut Scheduler<B5500>,
        source: LoadSource,
    ) -> Result<(), LoadFailure> {
        let span = span!(Level::INFO, "load", %source);
        let _enter = span.enter();
        if self.is_running() {
            return Err(LoadFailure::AlreadyRunning);
        }
        // Pick up any change in the readiness of the load device.
        self.drain_device_events(sched);
        self.clear(sched);
        let io = self.io_units[0].id();
        if !self.cc.claim_io_unit(io) {
            return Err(LoadFailure::IoUnitBusy);
        }
        self.load_failure = None;
        match self.io_units[0].load(&mut self.cc, &mut self.devices, source) {
            Some(outcome) => {
                self.finish_outcome(sched, outcome);
                match self.load_failure.take() {
                    Some(failure) => Err(failure),
                    None => Ok(()),
                }
            }
            None => {
                event!(Level::INFO, "waiting for {} to finish the load", source);
                Ok(())
            }
        }
    }

    /// The operator's Halt button.
    pub fn halt(&mut self, sched: &mut Scheduler<B5500>) {
        for token in std::mem::take(&mut self.slices).into_values() {
            sched.cancel(token);
        }
        for p in &mut self.processors {
            p.halt();
        }
        self.cc.set_p2_busy(false);
    }

    /// Halts and clears the processors, the I/O units and Central
    /// Control.  Memory is not cleared.
    pub fn clear(&mut self, sched: &mut Scheduler<B5500>) {
        self.halt(sched);
        for p in &mut self.processors {
            p.clear();
        }
        for iou in &mut self.io_units {
            iou.clear();
        }
        self.cc.clear();
    }

    /// Picks up device events and Central Control requests.
    pub fn service(&mut self, sched: &mut Scheduler<B5500>) {
        self.drain_device_events(sched);
        self.dispatch_requests(sched);
    }

    fn drain_device_events(&mut self, sched: &mut Scheduler<B5500>) {
        for ev in self.devices.drain() {
            match ev {
                DeviceEvent::StatusChange { unit, ready } => self.cc.status_change(unit, ready),
                DeviceEvent::Signal(unit) => self.cc.device_signal(unit),
                DeviceEvent::Finished(done) => {
                    sched.schedule(Category::IoUnit(done.io_unit), 0.0, move |sys, sched| {
                        sys.complete_io(sched, done)
                    });
                }
            }
        }
    }

    fn complete_io(&mut self, sched: &mut Scheduler<B5500>, done: IoCompletion) -> CallbackResult {
        let Some(iou) = self.io_units.get_mut(done.io_unit.index()) else {
            return Err(format!("completion for missing {}", done.io_unit).into());
        };
        if let Some(outcome) = iou.complete(&mut self.cc, done) {
            self.finish_outcome(sched, outcome);
        }
        Ok(())
    }

    fn finish_outcome(&mut self, sched: &mut Scheduler<B5500>, outcome: Outcome) {
        if !outcome.load {
            return;
        }
        if outcome.result.flags.is_clear() {
            event!(Level::INFO, "load complete, starting P1 at {:03o}", LOAD_ADDRESS);
            self.processors[0].start_at(LOAD_ADDRESS);
            self.schedule_slice(sched, ProcessorId::P1, 0.0);
        } else {
            event!(
                Level::ERROR,
                "load failed: {}",
                outcome.result.flags
            );
            self.load_failure = Some(LoadFailure::Unit(outcome.result.flags));
        }
    }

    fn dispatch_requests(&mut self, sched: &mut Scheduler<B5500>) {
        for request in self.cc.take_requests() {
            match request {
                ControlRequest::InitiateIo(io) => {
                    let Some(iou) = self.io_units.get_mut(io.index()) else {
                        event!(Level::ERROR, "initiate for missing {}", io);
                        continue;
                    };
                    if let Some(outcome) = iou.initiate(&mut self.cc, &mut self.devices) {
                        self.finish_outcome(sched, outcome);
                    }
                }
                ControlRequest::StartP2 => {
                    if let Some(p2) = self.processors.get_mut(ProcessorId::P2.index()) {
                        p2.start_from_cell_8(&mut self.cc);
                        self.schedule_slice(sched, ProcessorId::P2, 0.0);
                    }
                }
                ControlRequest::HaltP2 => {
                    if let Some(token) = self.slices.remove(&ProcessorId::P2) {
                        sched.cancel(token);
                    }
                    if let Some(p2) = self.processors.get_mut(ProcessorId::P2.index()) {
                        p2.halt();
                    }
                    self.cc.set_p2_busy(false);
                }
            }
        }
    }

    fn schedule_slice(&mut self, sched: &mut Scheduler<B5500>, id: ProcessorId, delay_ms: f64) {
        let token = sched.schedule(Category::Processor(id), delay_ms, move |sys, sched| {
            sys.run_processor(sched, id)
        });
        if let Some(old) = self.slices.insert(id, token) {
            sched.cancel(old);
        }
    }

    fn run_processor(&mut self, sched: &mut Scheduler<B5500>, id: ProcessorId) -> CallbackResult {
        self.slices.remove(&id);
        let Some(p) = self.processors.get_mut(id.index()) else {
            return Err(format!("no processor {id}").into());
        };
        let started = sched.now();
        let cycles = p.run_slice(&mut self.cc);
        let elapsed = sched.now().saturating_sub(started);
        let busy = p.is_busy();
        let fault = p.fault();
        self.service(sched);
        if busy {
            self.schedule_slice(sched, id, next_slice_delay_ms(cycles, elapsed));
        } else {
            if id == ProcessorId::P2 {
                self.cc.set_p2_busy(false);
            }
            match fault {
                Some(f) => event!(Level::ERROR, "{} stopped: {}", id, f),
                None => event!(Level::INFO, "{} stopped", id),
            }
        }
        Ok(())
    }
}
