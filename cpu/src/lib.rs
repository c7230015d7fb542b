//! This crate emulates the B5500 mainframe: its processors, Central
//! Control (memory, interrupts and unit dispatch) and I/O units, all
//! paced by an adaptive callback scheduler.
#![crate_name = "cpu"]

mod central;
mod clock;
mod config;
mod device;
mod interrupt;
mod iounit;
mod memory;
mod processor;
mod scheduler;
mod system;
mod types;

pub use central::{CentralControl, CentralControlStatus, ControlRequest, TM_MODULUS};
pub use clock::{HostClock, ManualClock};
pub use config::{ConfigError, SystemConfig};
pub use device::{
    Completion, Device, DeviceEvent, DeviceManager, DeviceRequest, IoCompletion, Operation,
    StatusLine, NOT_READY_MASK,
};
pub use interrupt::{Interrupt, InterruptLatches};
pub use iounit::{DescriptorError, IoUnit, IoUnitState, LoadSource, Outcome, LOAD_ADDRESS};
pub use memory::{AccessRequest, MemoryAccessError, MemoryConfiguration};
pub use processor::{
    next_slice_delay_ms, Processor, ProcessorFault, ProcessorStatus, Registers, CYCLES_PER_MS,
    SLICE_CYCLES,
};
pub use scheduler::{CallbackResult, Category, Scheduler, Token, MIN_TIMEOUT_MS};
pub use system::{LoadFailure, SystemStatus, B5500, RTC_PERIOD_MS};
pub use types::{IoUnitId, ProcessorId, Requestor};
