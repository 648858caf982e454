//! Top-level BNS machine.
//!
//! Wires the Z180 facade to the board — memory, I/O bus, SSI-263,
//! keyboard, display, watchdog — and drives the outer execution loop:
//! run the CPU in chunks, advance the speech chip's clock, deliver
//! deferred interrupts, flush trace output.

use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{fs, io};

use super::cpu::{Bus, Cpu, IrqLine, Z180Core};
use super::display::Display;
use super::iobus::{IoBus, IoDir, PortDevice};
use super::irq::IrqRouter;
use super::keyboard::Keyboard;
use super::memory::Memory;
use super::rom;
use super::ssi263::Ssi263;
use super::watchdog::Watchdog;
use crate::synth::Ssi263Synth;

// I/O port assignments.
pub const PORT_KEYCLR: u8 = 0x20;
pub const PORT_ITC: u8 = 0x34;
pub const PORT_CBR: u8 = 0x38;
pub const PORT_BBR: u8 = 0x39;
pub const PORT_CBAR: u8 = 0x3A;
pub const PORT_KEYBOARD: u8 = 0x40;
pub const PORT_DISPLAY: u8 = 0x80;
pub const PORT_WATCHDOG: u8 = 0x80;

/// Cycles per execution chunk between peripheral updates.
const CHUNK_CYCLES: u32 = 1000;

// ── Machine variants ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    BsPlus,
    Bl40,
}

impl Variant {
    /// Base port of the SSI-263 register window.
    pub fn ssi263_base(self) -> u8 {
        match self {
            Variant::BsPlus => 0xC0,
            Variant::Bl40 => 0x90,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bsplus" => Some(Variant::BsPlus),
            "bl40" => Some(Variant::Bl40),
            _ => None,
        }
    }
}

// ── Board ─────────────────────────────────────────────────────

/// Everything on the bus side of the CPU.  Split from [`Bns`] so the
/// engine can borrow it as the bus while the facade stays borrowable
/// for IRQ delivery.
pub struct Board {
    pub memory: Memory,
    pub io: IoBus,
    pub ssi263: Ssi263,
    pub keyboard: Keyboard,
    pub display: Display,
    pub watchdog: Watchdog,
    pub irq: IrqRouter,

    ssi263_base: u8,
    pub trace_itc: bool,
}

impl Board {
    fn new(variant: Variant, clock: u32) -> Self {
        let mut board = Self {
            memory: Memory::new(),
            io: IoBus::new(),
            ssi263: Ssi263::new(clock),
            keyboard: Keyboard::new(),
            display: Display::new(),
            watchdog: Watchdog::new(),
            irq: IrqRouter::new(),
            ssi263_base: variant.ssi263_base(),
            trace_itc: false,
        };
        board.setup_io();
        board
    }

    /// Wire the port map (BSPLUS layout, speech base per variant).
    fn setup_io(&mut self) {
        let ssi = self.ssi263_base;
        self.io
            .register_range(ssi, ssi + 4, Some(PortDevice::Ssi263), Some(PortDevice::Ssi263));

        self.io
            .register(PORT_KEYBOARD, Some(PortDevice::Keyboard), Some(PortDevice::Keyboard));
        self.io.register(PORT_KEYCLR, None, Some(PortDevice::KeyClear));

        self.io.register_range(
            PORT_DISPLAY,
            PORT_DISPLAY + 3,
            Some(PortDevice::Display),
            Some(PortDevice::Display),
        );
        // Watchdog overlays the display's first port: writes kick the
        // dog, reads still go to the display.
        self.io.register(PORT_WATCHDOG, None, Some(PortDevice::Watchdog));

        self.io.register(PORT_CBR, Some(PortDevice::MmuCbr), Some(PortDevice::MmuCbr));
        self.io.register(PORT_BBR, Some(PortDevice::MmuBbr), Some(PortDevice::MmuBbr));
        self.io
            .register(PORT_CBAR, Some(PortDevice::MmuCbar), Some(PortDevice::MmuCbar));

        self.io.register(PORT_ITC, None, Some(PortDevice::Itc));
    }

    fn decode_itc(&self, value: u8) {
        if self.trace_itc {
            let en = |bit: u8| if value & bit != 0 { "EN" } else { "DIS" };
            eprintln!(
                "[itc] INT0={} INT1={} INT2={} (val={value:02X})",
                en(0x01),
                en(0x02),
                en(0x04)
            );
        }
    }
}

impl Bus for Board {
    fn mem_read(&mut self, phys: u32) -> u8 {
        self.memory.read(phys)
    }

    fn mem_write(&mut self, phys: u32, value: u8) {
        self.memory.write(phys, value);
    }

    fn io_read(&mut self, port: u8) -> u8 {
        let value = match self.io.route_read(port) {
            PortDevice::Ssi263 => self.ssi263.read(port - self.ssi263_base),
            PortDevice::Keyboard => {
                let dots = self.keyboard.read();
                self.irq.clear(IrqLine::Int2, "keyboard");
                dots
            }
            PortDevice::Display => self.display.read(port - PORT_DISPLAY),
            PortDevice::MmuCbr => self.memory.cbr,
            PortDevice::MmuBbr => self.memory.bbr,
            PortDevice::MmuCbar => self.memory.cbar,
            PortDevice::KeyClear
            | PortDevice::Watchdog
            | PortDevice::Itc
            | PortDevice::Unmapped => 0xFF,
        };
        self.io.trace(IoDir::Read, port, value);
        value
    }

    fn io_write(&mut self, port: u8, value: u8) {
        self.io.trace(IoDir::Write, port, value);
        match self.io.route_write(port) {
            PortDevice::Ssi263 => self.ssi263.write(port - self.ssi263_base, value),
            PortDevice::Keyboard => {} // input only
            PortDevice::KeyClear => {
                self.keyboard.clear();
                self.irq.clear(IrqLine::Int2, "keyboard");
            }
            PortDevice::Display => self.display.write(port - PORT_DISPLAY, value),
            PortDevice::Watchdog => self.watchdog.kick(),
            PortDevice::MmuCbr => self.memory.set_mmu(Some(value), None, None),
            PortDevice::MmuBbr => self.memory.set_mmu(None, Some(value), None),
            PortDevice::MmuCbar => self.memory.set_mmu(None, None, Some(value)),
            PortDevice::Itc => self.decode_itc(value),
            PortDevice::Unmapped => {}
        }
    }
}

// ── Machine ───────────────────────────────────────────────────

pub struct Bns {
    pub cpu: Cpu,
    pub board: Board,
    /// Cycles executed since power-on.
    cycles: u64,
}

impl Bns {
    pub fn new(variant: Variant, clock: u32, engine: Option<Box<dyn Z180Core>>) -> Self {
        Self {
            cpu: Cpu::new(clock, engine),
            board: Board::new(variant, clock),
            cycles: 0,
        }
    }

    /// Connect a synthesizer: speech register writes produce audio.
    pub fn attach_synth(&mut self, synth: Ssi263Synth) {
        self.board.ssi263.set_synth(synth);
    }

    // ── ROM loading ───────────────────────────────────────────

    pub fn load_rom_file(&mut self, path: &Path) -> io::Result<()> {
        let firmware = rom::load_rom_file(path)?;
        eprintln!(
            "[bns] Loaded ROM: {} ({} bytes)",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            firmware.len()
        );
        self.board.memory.load_rom(&firmware);
        Ok(())
    }

    /// Load raw firmware bytes at physical 0 (tests, embedders).
    pub fn load_rom(&mut self, data: &[u8]) {
        self.board.memory.load_rom(data);
    }

    // ── Reset / input ─────────────────────────────────────────

    /// Reset CPU and MMU.  RAM is deliberately left alone — the
    /// hardware does not clear it at power-on either, the firmware
    /// initializes its own data.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.board
            .memory
            .set_mmu(Some(0x00), Some(0x00), Some(0xF0));
        self.board.ssi263.reset();
        self.board.display.reset();
        self.board.watchdog.reset();
        self.cycles = 0;
        eprintln!("[bns] Reset complete");
    }

    /// Inject a chord press from the host.
    pub fn press_keys(&mut self, dots: u8) {
        if self.board.keyboard.press(dots) {
            self.board.irq.raise(IrqLine::Int2, "keyboard");
        }
        self.board.irq.flush(&mut self.cpu, self.cycles);
    }

    pub fn release_keys(&mut self) {
        self.board.keyboard.release();
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycles
    }

    // ── Execution ─────────────────────────────────────────────

    /// Execute a single instruction.  Returns cycles consumed.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.board);
        self.cycles += cycles as u64;
        self.tick_peripherals();
        cycles
    }

    /// Run the machine.  `max_cycles == 0` means unbounded; `stop` is
    /// polled at chunk boundaries (Ctrl-C).  Returns cycles executed
    /// this call.
    pub fn run(&mut self, max_cycles: u64, stop: &AtomicBool) -> u64 {
        eprintln!("[bns] Starting emulation...");
        eprintln!(
            "[bns] MMU: CBR={:02X} BBR={:02X} CBAR={:02X}",
            self.board.memory.cbr, self.board.memory.bbr, self.board.memory.cbar
        );
        if let Some(synth) = self.board.ssi263.synth_mut() {
            eprintln!("[bns] Audio: ENABLED");
            synth.start();
        }

        let mut cycles_run: u64 = 0;
        while !self.cpu.halted() && (max_cycles == 0 || cycles_run < max_cycles) {
            if stop.load(Ordering::Relaxed) {
                eprintln!("\n[bns] Emulation stopped by user");
                break;
            }

            let chunk = if max_cycles == 0 {
                CHUNK_CYCLES
            } else {
                (max_cycles - cycles_run).min(CHUNK_CYCLES as u64) as u32
            };

            let actual = self.cpu.run(&mut self.board, chunk);
            cycles_run += actual as u64;
            self.cycles += actual as u64;

            self.tick_peripherals();
            self.flush_traces();

            // An engine that makes no progress would spin us forever.
            if actual == 0 {
                break;
            }
        }

        // The audio device must go down on every exit path.
        if let Some(synth) = self.board.ssi263.synth_mut() {
            synth.stop();
        }

        eprintln!("[bns] Executed {cycles_run} cycles");
        eprintln!("[bns] Final PC: {:04X}", self.cpu.pc());
        cycles_run
    }

    /// Advance the speech chip's clock and deliver deferred IRQs.
    fn tick_peripherals(&mut self) {
        self.board.ssi263.set_cycle_count(self.cycles);
        if self.board.ssi263.check_pending_irq(self.cycles) {
            self.board.irq.raise(IrqLine::Int1, "ssi263");
        }
        self.board.irq.flush(&mut self.cpu, self.cycles);
    }

    fn flush_traces(&mut self) {
        // Without a synth the phoneme log is the only speech output.
        if !self.board.ssi263.has_synth() && self.board.ssi263.has_logged_phonemes() {
            let phonemes = self.board.ssi263.take_phoneme_log();
            eprintln!("[speech] Phonemes: {phonemes:02X?}");
        }
        if self.board.io.tracing {
            for line in self.board.io.dump_log(None) {
                eprintln!("[io] {line}");
            }
            self.board.io.clear_log();
        }
    }

    // ── Diagnostics ───────────────────────────────────────────

    /// Print the boot header and single-step the first instructions.
    pub fn trace_boot(&mut self) {
        let rom = self.board.memory.rom_bytes();
        if !self.board.memory.rom_loaded() || rom.len() < 16 {
            eprintln!("[bns] Error: ROM too small to trace");
            return;
        }

        eprintln!("=== BNS Boot Trace ===");
        eprintln!("ROM starts with: {:02X} {:02X}", rom[0], rom[1]);
        eprintln!("  -> JR +{} (jump over header)", rom[1]);
        eprintln!("Magic: {:?}", String::from_utf8_lossy(&rom[2..6]));

        let entry = 2 + rom[1] as usize;
        eprintln!("Entry point: {entry:#06X}");
        let first: Vec<String> = rom[entry..(entry + 16).min(rom.len())]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();
        eprintln!("First bytes: {}", first.join(" "));

        self.reset();
        eprintln!("\n=== First 10 instructions ===");
        for i in 0..10 {
            let pc_before = self.cpu.pc();
            let cycles = self.step();
            eprintln!(
                "{}. PC: {pc_before:04X} -> {:04X} ({cycles} cycles)",
                i + 1,
                self.cpu.pc()
            );
        }
    }

    /// Write the physical-write census as CSV.
    pub fn dump_write_census(&self, path: &Path) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        self.board.memory.dump_write_census(&mut file)?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::cpu::DEFAULT_CLOCK_HZ;

    fn machine() -> Bns {
        Bns::new(Variant::BsPlus, DEFAULT_CLOCK_HZ, None)
    }

    #[test]
    fn test_mmu_ports_mirror_registers() {
        let mut bns = machine();
        bns.board.io_write(PORT_CBR, 0x12);
        bns.board.io_write(PORT_BBR, 0x34);
        bns.board.io_write(PORT_CBAR, 0xC8);

        assert_eq!(bns.board.memory.cbr, 0x12);
        assert_eq!(bns.board.io_read(PORT_CBR), 0x12);
        assert_eq!(bns.board.io_read(PORT_BBR), 0x34);
        assert_eq!(bns.board.io_read(PORT_CBAR), 0xC8);
    }

    #[test]
    fn test_speech_ports_reach_the_chip() {
        let mut bns = machine();
        bns.board.io_write(0xC0, 0xC5);
        bns.board.io_write(0xC3, 0x7F);
        assert!(bns.board.ssi263.speaking);
        assert_eq!(bns.board.io_read(0xC4), 0x80);
    }

    #[test]
    fn test_bl40_moves_the_speech_window() {
        let mut bns = Bns::new(Variant::Bl40, DEFAULT_CLOCK_HZ, None);
        bns.board.io_write(0x90, 0xC5);
        bns.board.io_write(0x93, 0x7F);
        assert!(bns.board.ssi263.speaking);
        assert_eq!(bns.board.io_read(0x94), 0x80);
        // 0xC0 window is unmapped on the BL40.
        assert_eq!(bns.board.io_read(0xC4), 0xFF);
    }

    #[test]
    fn test_watchdog_overlays_display_port() {
        let mut bns = machine();
        bns.board.io_write(PORT_WATCHDOG, 0x00);
        bns.board.io_write(PORT_WATCHDOG, 0x00);
        assert_eq!(bns.board.watchdog.kicks(), 2);
        // Reads at 0x80 go to the display, not the watchdog.
        assert_eq!(bns.board.io_read(0x81), 0x00);
        // Display data landed nowhere: watchdog swallowed the writes.
        assert_eq!(bns.board.display.cells()[0], 0);
    }

    #[test]
    fn test_keyboard_read_clears_pending_edge() {
        let mut bns = machine();
        bns.press_keys(0x15);
        assert_eq!(bns.board.io_read(PORT_KEYBOARD), 0x15);
        bns.board.io_write(PORT_KEYCLR, 0x00);
        assert_eq!(bns.board.io_read(PORT_KEYBOARD), 0x00);
    }

    #[test]
    fn test_unmapped_port_reads_float_high() {
        let mut bns = machine();
        assert_eq!(bns.board.io_read(0x55), 0xFF);
        bns.board.io_write(0x55, 0xAA); // dropped
    }

    #[test]
    fn test_run_degraded_respects_budget() {
        let mut bns = machine();
        let stop = AtomicBool::new(false);
        let executed = bns.run(12_345, &stop);
        assert_eq!(executed, 12_345);
        assert_eq!(bns.cycle_count(), 12_345);
    }

    #[test]
    fn test_run_honors_stop_flag() {
        let mut bns = machine();
        let stop = AtomicBool::new(true);
        assert_eq!(bns.run(1_000_000, &stop), 0);
    }

    #[test]
    fn test_reset_restores_mmu_defaults() {
        let mut bns = machine();
        bns.board.io_write(PORT_CBR, 0x55);
        bns.board.memory.write(0x100, 0x42);
        bns.reset();
        assert_eq!(bns.board.memory.cbr, 0x00);
        assert_eq!(bns.board.memory.cbar, 0xF0);
        // RAM survives reset.
        assert_eq!(bns.board.memory.read(0x100), 0x42);
    }
}
