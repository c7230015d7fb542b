//! The interface between the I/O units and peripheral devices.
//!
//! An I/O unit starts an operation on a device by calling one of the
//! [`Device`] methods, handing over a [`Completion`].  The device
//! finishes the operation (now, or later from some other thread) by
//! calling [`Completion::finish`], which consumes the completion, so
//! an operation can finish at most once.  The result travels back to
//! the emulator as a [`DeviceEvent`] on a channel, and the system
//! picks it up the next time it drains device events.
//!
//! Devices also use the channel to report that they have become
//! ready or not ready, and to raise device interrupts (keyboard
//! request, printer finished and so on), through their
//! [`StatusLine`].
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{event, Level};

use base::descriptor::D30_NOT_READY;
use base::descriptor::ERROR_MASK_SHIFT;
use base::prelude::*;

use super::types::IoUnitId;

/// The device error mask for "not ready".
pub const NOT_READY_MASK: u8 = (D30_NOT_READY >> ERROR_MASK_SHIFT) as u8;

/// The parameters of a device operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub unit: UnitId,
    pub mode: TransferMode,
    pub reverse: bool,
    /// The device-specific control bits of the I/O descriptor.
    pub control: u8,
    /// The largest number of characters to transfer.
    pub length: usize,
    /// For disk operations, the segment address.
    pub segment: Option<u32>,
    /// For a write, the characters to write.  In alpha mode these are
    /// host (ANSI) characters; in binary mode they are 6-bit codes.
    pub buffer: Vec<u8>,
}

/// The outcome of a device operation, as delivered to the I/O unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoCompletion {
    pub io_unit: IoUnitId,
    pub unit: UnitId,
    /// Device error bits, aligned so that 0x40 is D26.
    pub error_mask: u8,
    /// The number of characters transferred.
    pub length: usize,
    /// For a read, the characters read (see [`DeviceRequest::buffer`]
    /// for their representation).
    pub buffer: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Finished(IoCompletion),
    StatusChange { unit: UnitId, ready: bool },
    Signal(UnitId),
}

/// The single-use handle through which a device reports the end of
/// an operation.
pub struct Completion {
    io_unit: IoUnitId,
    unit: UnitId,
    tx: Sender<DeviceEvent>,
    done: bool,
}

impl Completion {
    pub(crate) fn new(io_unit: IoUnitId, unit: UnitId, tx: Sender<DeviceEvent>) -> Completion {
        Completion {
            io_unit,
            unit,
            tx,
            done: false,
        }
    }

    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn finish(mut self, error_mask: u8, length: usize, buffer: Vec<u8>) {
        self.done = true;
        let completion = IoCompletion {
            io_unit: self.io_unit,
            unit: self.unit,
            error_mask: error_mask & 0x7F,
            length,
            buffer,
        };
        if let Err(e) = self.tx.send(DeviceEvent::Finished(completion)) {
            event!(
                Level::WARN,
                "{}: emulator went away before the operation finished: {}",
                self.unit,
                e
            );
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.done {
            // The I/O unit stays busy forever, as the hardware would.
            event!(
                Level::WARN,
                "{} abandoned an operation for {}",
                self.unit,
                self.io_unit
            );
        }
    }
}

impl Debug for Completion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("io_unit", &self.io_unit)
            .field("unit", &self.unit)
            .field("done", &self.done)
            .finish()
    }
}

/// A device's connection to Central Control.
#[derive(Debug, Clone)]
pub struct StatusLine {
    unit: UnitId,
    tx: Sender<DeviceEvent>,
}

impl StatusLine {
    fn send(&self, ev: DeviceEvent) {
        if let Err(e) = self.tx.send(ev) {
            event!(Level::WARN, "{}: status event lost: {}", self.unit, e);
        }
    }

    pub fn status_change(&self, ready: bool) {
        self.send(DeviceEvent::StatusChange {
            unit: self.unit,
            ready,
        });
    }

    pub fn signal(&self) {
        self.send(DeviceEvent::Signal(self.unit));
    }
}

/// A peripheral device.  Operations the device does not support
/// finish immediately with "not ready".
pub trait Device {
    fn name(&self) -> String;

    /// Called once, when the device is attached to the system.  The
    /// device should report its initial readiness on `line`.
    fn attach(&mut self, line: StatusLine);

    fn read(&mut self, req: DeviceRequest, done: Completion);

    fn write(&mut self, req: DeviceRequest, done: Completion);

    fn space(&mut self, _req: DeviceRequest, done: Completion) {
        done.finish(NOT_READY_MASK, 0, Vec::new());
    }

    fn erase(&mut self, _req: DeviceRequest, done: Completion) {
        done.finish(NOT_READY_MASK, 0, Vec::new());
    }

    fn rewind(&mut self, _req: DeviceRequest, done: Completion) {
        done.finish(NOT_READY_MASK, 0, Vec::new());
    }

    fn read_check(&mut self, _req: DeviceRequest, done: Completion) {
        done.finish(NOT_READY_MASK, 0, Vec::new());
    }

    fn read_interrogate(&mut self, _req: DeviceRequest, done: Completion) {
        done.finish(NOT_READY_MASK, 0, Vec::new());
    }

    fn write_interrogate(&mut self, _req: DeviceRequest, done: Completion) {
        done.finish(NOT_READY_MASK, 0, Vec::new());
    }
}

/// The operation an I/O descriptor asks a device to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Space,
    Erase,
    Rewind,
    ReadCheck,
    ReadInterrogate,
    WriteInterrogate,
}

/// The attached devices, and the channel on which they report.
pub struct DeviceManager {
    devices: BTreeMap<UnitId, Box<dyn Device>>,
    tx: Sender<DeviceEvent>,
    rx: Receiver<DeviceEvent>,
}

impl DeviceManager {
    pub fn new() -> DeviceManager {
        let (tx, rx) = unbounded();
        DeviceManager {
            devices: BTreeMap::new(),
            tx,
            rx,
        }
    }

    pub fn attach(&mut self, unit: UnitId, mut device: Box<dyn Device>) {
        event!(Level::INFO, "attaching {} as {}", device.name(), unit);
        device.attach(StatusLine {
            unit,
            tx: self.tx.clone(),
        });
        if let Some(old) = self.devices.insert(unit, device) {
            event!(Level::WARN, "{} replaced {}", unit, old.name());
        }
    }

    #[must_use]
    pub fn is_attached(&self, unit: UnitId) -> bool {
        self.devices.contains_key(&unit)
    }

    /// Starts `op` on the device attached as `req.unit`.  Returns
    /// false (having done nothing) if there is no such device.
    pub fn start(&mut self, io_unit: IoUnitId, op: Operation, req: DeviceRequest) -> bool {
        let unit = req.unit;
        let Some(device) = self.devices.get_mut(&unit) else {
            return false;
        };
        let done = Completion::new(io_unit, unit, self.tx.clone());
        event!(Level::DEBUG, "{io_unit}: {op:?} on {unit}");
        match op {
            Operation::Read => device.read(req, done),
            Operation::Write => device.write(req, done),
            Operation::Space => device.space(req, done),
            Operation::Erase => device.erase(req, done),
            Operation::Rewind => device.rewind(req, done),
            Operation::ReadCheck => device.read_check(req, done),
            Operation::ReadInterrogate => device.read_interrogate(req, done),
            Operation::WriteInterrogate => device.write_interrogate(req, done),
        }
        true
    }

    /// Takes every event which the devices have posted so far.
    pub fn drain(&self) -> Vec<DeviceEvent> {
        self.rx.try_iter().collect()
    }
}

impl Default for DeviceManager {
    fn default() -> DeviceManager {
        DeviceManager::new()
    }
}

impl Debug for DeviceManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for (unit, device) in &self.devices {
            m.entry(unit, &format_args!("<device: {}>", device.name()));
        }
        m.finish()
    }
}
