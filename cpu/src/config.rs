//! System configuration.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use base::prelude::*;

use super::memory::{MemoryConfiguration, MAX_MODULES};
use super::types::IoUnitId;

/// The shape of the emulated installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemConfig {
    /// 1 (P1 only) or 2.
    pub processors: u8,
    pub io_units: u8,
    /// Memory modules fitted, counting from module 0.
    pub memory_modules: u8,
    /// The units for which the front end attaches devices.
    pub devices: Vec<UnitId>,
}

impl Default for SystemConfig {
    fn default() -> SystemConfig {
        SystemConfig {
            processors: 1,
            io_units: 4,
            memory_modules: MAX_MODULES as u8,
            devices: vec![UnitId::CRA, UnitId::LPA, UnitId::SPO],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Processors(u8),
    IoUnits(u8),
    MemoryModules(u8),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Processors(n) => {
                write!(f, "a system has 1 or 2 processors, not {n}")
            }
            ConfigError::IoUnits(n) => write!(
                f,
                "a system has between 1 and {} I/O units, not {n}",
                IoUnitId::MAX_UNITS
            ),
            ConfigError::MemoryModules(n) => write!(
                f,
                "a system has between 1 and {MAX_MODULES} memory modules, not {n}"
            ),
        }
    }
}

impl Error for ConfigError {}

impl SystemConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=2).contains(&self.processors) {
            return Err(ConfigError::Processors(self.processors));
        }
        if !(1..=IoUnitId::MAX_UNITS).contains(&self.io_units) {
            return Err(ConfigError::IoUnits(self.io_units));
        }
        if !(1..=MAX_MODULES).contains(&usize::from(self.memory_modules)) {
            return Err(ConfigError::MemoryModules(self.memory_modules));
        }
        Ok(())
    }

    #[must_use]
    pub fn memory(&self) -> MemoryConfiguration {
        MemoryConfiguration::contiguous(usize::from(self.memory_modules))
    }

    #[must_use]
    pub fn has_p2(&self) -> bool {
        self.processors > 1
    }
}

#[test]
fn test_validate() {
    assert_eq!(SystemConfig::default().validate(), Ok(()));
    let bad = SystemConfig {
        processors: 3,
        ..SystemConfig::default()
    };
    assert_eq!(bad.validate(), Err(ConfigError::Processors(3)));
    let bad = SystemConfig {
        io_units: 0,
        ..SystemConfig::default()
    };
    assert_eq!(bad.validate(), Err(ConfigError::IoUnits(0)));
    let bad = SystemConfig {
        memory_modules: 9,
        ..SystemConfig::default()
    };
    assert_eq!(bad.validate(), Err(ConfigError::MemoryModules(9)));
}

#[test]
fn test_config_error_display() {
    assert_eq!(
        ConfigError::IoUnits(5).to_string(),
        "a system has between 1 and 4 I/O units, not 5"
    );
}
