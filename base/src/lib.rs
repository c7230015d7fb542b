//! The `base` crate defines the B5500-related things which are
//! useful in both an emulator and other associated tools (for
//! example something which prepares card decks).  Word layout, the
//! I/O descriptor formats, unit designates and the BIC character set
//! live here; nothing in this crate knows about time or devices.

mod word;

pub mod charset;
pub mod descriptor;
pub mod prelude;
pub mod unit;
