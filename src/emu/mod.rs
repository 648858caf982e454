//! BNS emulation core.
//!
//! CPU execution is delegated to an external Z180 engine (see
//! [`cpu::Z180Core`]); everything else — shadow-RAM memory, I/O port
//! dispatch, SSI-263, keyboard, display, watchdog — lives here.

pub mod cpu;
pub mod display;
pub mod iobus;
pub mod irq;
pub mod keyboard;
pub mod machine;
pub mod memory;
pub mod rom;
pub mod ssi263;
pub mod watchdog;
