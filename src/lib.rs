//! BNS — Braille 'n Speak note-taker emulator.
//!
//! The machine is a Z180 wired to a Braille chord keyboard, a Braille
//! cell display, a watchdog, and an SSI-263 phoneme speech chip.  The
//! Z180 instruction core is delegated to an external engine behind the
//! [`emu::cpu::Z180Core`] trait; everything else — memory/MMU, I/O bus,
//! peripherals, speech synthesis — lives here.

pub mod config;
pub mod emu;
pub mod synth;
