//! End-to-end machine tests driven by a scripted Z180 engine.
//!
//! The scripted core replays a fixed list of bus operations through
//! the real board — I/O dispatch, memory, SSI-263 scheduling, IRQ
//! delivery — without needing firmware or a full instruction core.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use bns::emu::cpu::{Bus, IrqLine, LineState, Reg, Z180Core, DEFAULT_CLOCK_HZ};
use bns::emu::machine::{Bns, Variant};

#[derive(Debug, Clone, Copy)]
enum Op {
    Out(u8, u8),
    In(u8),
    Poke(u32, u8),
    Peek(u32),
}

/// Cost charged per scripted bus operation.
const OP_CYCLES: u32 = 12;

struct ScriptedCore {
    script: VecDeque<Op>,
    irqs: Arc<Mutex<Vec<(IrqLine, LineState)>>>,
    reads: Arc<Mutex<Vec<u8>>>,
    pc: u16,
}

impl ScriptedCore {
    fn new(
        script: &[Op],
    ) -> (
        Box<Self>,
        Arc<Mutex<Vec<(IrqLine, LineState)>>>,
        Arc<Mutex<Vec<u8>>>,
    ) {
        let irqs = Arc::new(Mutex::new(Vec::new()));
        let reads = Arc::new(Mutex::new(Vec::new()));
        let core = Box::new(Self {
            script: script.iter().copied().collect(),
            irqs: irqs.clone(),
            reads: reads.clone(),
            pc: 0,
        });
        (core, irqs, reads)
    }
}

impl Z180Core for ScriptedCore {
    fn reset(&mut self) {
        self.pc = 0;
    }

    fn execute(&mut self, bus: &mut dyn Bus, max_cycles: u32) -> u32 {
        let mut used = 0;
        while used < max_cycles {
            match self.script.pop_front() {
                Some(Op::Out(port, value)) => bus.io_write(port, value),
                Some(Op::In(port)) => {
                    let value = bus.io_read(port);
                    self.reads.lock().unwrap().push(value);
                }
                Some(Op::Poke(addr, value)) => bus.mem_write(addr, value),
                Some(Op::Peek(addr)) => {
                    let value = bus.mem_read(addr);
                    self.reads.lock().unwrap().push(value);
                }
                None => return max_cycles, // idle: burn the rest
            }
            self.pc = self.pc.wrapping_add(2);
            used += OP_CYCLES;
        }
        used
    }

    fn set_irq_line(&mut self, line: IrqLine, state: LineState) {
        self.irqs.lock().unwrap().push((line, state));
    }

    fn get_state(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Pc => self.pc as u32,
            Reg::Sp => 0xFFFF,
            Reg::Cbar => 0xF0,
            _ => 0,
        }
    }

    fn halted(&self) -> bool {
        false
    }
}

fn asserted(irqs: &Arc<Mutex<Vec<(IrqLine, LineState)>>>, line: IrqLine) -> usize {
    irqs.lock()
        .unwrap()
        .iter()
        .filter(|&&(l, s)| l == line && s == LineState::Assert)
        .count()
}

#[test]
fn test_phoneme_completion_interrupt_is_delivered() {
    let (core, irqs, reads) = ScriptedCore::new(&[
        Op::Out(0xC0, 0xC5), // mode 3, phoneme 5 (latched: chip in standby)
        Op::Out(0xC2, 0x00), // rate 0
        Op::Out(0xC3, 0x7F), // wake, amplitude 15 — speaks
        Op::In(0xC4),        // A/R status while speaking
    ]);
    let mut bns = Bns::new(Variant::BsPlus, DEFAULT_CLOCK_HZ, Some(core));

    let stop = AtomicBool::new(false);
    // Phoneme lasts 786_432 cycles; run past it.
    bns.run(800_000, &stop);

    assert_eq!(reads.lock().unwrap().as_slice(), &[0x80]);
    assert_eq!(asserted(&irqs, IrqLine::Int1), 1);
    assert!(!bns.board.ssi263.speaking);
}

#[test]
fn test_completion_interrupt_waits_for_its_cycle() {
    let (core, irqs, _) = ScriptedCore::new(&[
        Op::Out(0xC0, 0xC5),
        Op::Out(0xC2, 0x00),
        Op::Out(0xC3, 0x7F),
    ]);
    let mut bns = Bns::new(Variant::BsPlus, DEFAULT_CLOCK_HZ, Some(core));

    let stop = AtomicBool::new(false);
    bns.run(700_000, &stop); // short of 786_432

    assert_eq!(asserted(&irqs, IrqLine::Int1), 0);
    assert!(bns.board.ssi263.speaking);
}

#[test]
fn test_standby_mid_flight_suppresses_interrupt() {
    let (core, irqs, _) = ScriptedCore::new(&[
        Op::Out(0xC0, 0xC5),
        Op::Out(0xC3, 0x7F), // speak
        Op::Out(0xC3, 0x80), // back to standby
    ]);
    let mut bns = Bns::new(Variant::BsPlus, DEFAULT_CLOCK_HZ, Some(core));

    let stop = AtomicBool::new(false);
    bns.run(2_000_000, &stop);

    assert_eq!(asserted(&irqs, IrqLine::Int1), 0);
    assert!(!bns.board.ssi263.speaking);
}

#[test]
fn test_keyboard_chord_interrupts_and_polls() {
    let (core, irqs, reads) = ScriptedCore::new(&[Op::In(0x40), Op::In(0x40)]);
    let mut bns = Bns::new(Variant::BsPlus, DEFAULT_CLOCK_HZ, Some(core));

    bns.press_keys(0b0010_0101);
    assert_eq!(asserted(&irqs, IrqLine::Int2), 1);

    let stop = AtomicBool::new(false);
    bns.run(100, &stop);

    // Poll returns the chord; the latch clear reaches the CPU too.
    assert_eq!(reads.lock().unwrap().as_slice(), &[0x25, 0x25]);
    let cleared = irqs
        .lock()
        .unwrap()
        .iter()
        .any(|&(l, s)| l == IrqLine::Int2 && s == LineState::Clear);
    assert!(cleared);
}

#[test]
fn test_mmu_ports_and_shadow_memory() {
    let (core, _, reads) = ScriptedCore::new(&[
        Op::Out(0x38, 0x04),  // CBR
        Op::Out(0x3A, 0xF0),  // CBAR
        Op::In(0x38),
        Op::Poke(0x01234, 0xAB), // shadow write underneath the ROM
        Op::Peek(0x01234),
    ]);
    let mut bns = Bns::new(Variant::BsPlus, DEFAULT_CLOCK_HZ, Some(core));
    bns.load_rom(&vec![0xFFu8; 0x4_0000]); // ROM covers the poked address

    let stop = AtomicBool::new(false);
    bns.run(1_000, &stop);

    assert_eq!(bns.board.memory.cbr, 0x04);
    assert_eq!(reads.lock().unwrap().as_slice(), &[0x04, 0xAB]);
    assert_eq!(
        bns.board.memory.translate(0x1234).1,
        0x05234,
        "diagnostic translate follows the CBR written through the port"
    );
}

#[test]
fn test_rom_package_loads_past_header() {
    let dir = std::env::temp_dir();
    let path = dir.join("bns_machine_test_package.rom");

    let mut package = vec![0u8; 0x3000 + 8];
    package[2..5].copy_from_slice(b"BNS");
    package[0x3000..0x3008].copy_from_slice(&[0x18, 0x06, 0x42, 0x4E, 0x53, 0x00, 0xC3, 0x00]);
    std::fs::write(&path, &package).unwrap();

    let mut bns = Bns::new(Variant::BsPlus, DEFAULT_CLOCK_HZ, None);
    bns.load_rom_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    // The 0x3000-byte distribution header is gone.
    assert_eq!(bns.board.memory.read(0), 0x18);
    assert_eq!(bns.board.memory.read(6), 0xC3);
}
