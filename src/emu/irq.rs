//! Interrupt-line routing between peripherals and the CPU.
//!
//! Peripherals publish edges here while the engine is mid-chunk (the
//! CPU is mutably borrowed during `execute`, so edges cannot reach it
//! directly); the run loop flushes the queue at the next chunk
//! boundary.  Line assignment: INT1 = SSI-263 A/R, INT2 = keyboard,
//! INT0 reserved.

use super::cpu::{Cpu, IrqLine, LineState};

#[derive(Debug, Clone, Copy)]
struct IrqEdge {
    line: IrqLine,
    state: LineState,
    source: &'static str,
}

#[derive(Default)]
pub struct IrqRouter {
    pending: Vec<IrqEdge>,
    pub trace: bool,
}

impl IrqRouter {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            trace: false,
        }
    }

    pub fn raise(&mut self, line: IrqLine, source: &'static str) {
        self.pending.push(IrqEdge {
            line,
            state: LineState::Assert,
            source,
        });
    }

    pub fn clear(&mut self, line: IrqLine, source: &'static str) {
        self.pending.push(IrqEdge {
            line,
            state: LineState::Clear,
            source,
        });
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Deliver all queued edges to the CPU, in publication order.
    pub fn flush(&mut self, cpu: &mut Cpu, cycle: u64) {
        for edge in self.pending.drain(..) {
            if self.trace {
                let state = match edge.state {
                    LineState::Assert => "ASSERT",
                    LineState::Clear => "CLEAR",
                };
                eprintln!(
                    "[irq] line={} {state} source={} cycle={cycle}",
                    edge.line as u8, edge.source
                );
            }
            cpu.set_irq(edge.line, edge.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::cpu::{Bus, Reg, Z180Core, DEFAULT_CLOCK_HZ};
    use std::sync::{Arc, Mutex};

    struct SpyCore {
        seen: Arc<Mutex<Vec<(IrqLine, LineState)>>>,
    }

    impl Z180Core for SpyCore {
        fn reset(&mut self) {}
        fn execute(&mut self, _bus: &mut dyn Bus, max_cycles: u32) -> u32 {
            max_cycles
        }
        fn set_irq_line(&mut self, line: IrqLine, state: LineState) {
            self.seen.lock().unwrap().push((line, state));
        }
        fn get_state(&self, _reg: Reg) -> u32 {
            0
        }
        fn halted(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_edges_flush_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut cpu = Cpu::new(
            DEFAULT_CLOCK_HZ,
            Some(Box::new(SpyCore { seen: seen.clone() })),
        );

        let mut router = IrqRouter::new();
        router.raise(IrqLine::Int2, "keyboard");
        router.clear(IrqLine::Int2, "keyboard");
        router.raise(IrqLine::Int1, "ssi263");
        assert!(router.has_pending());

        router.flush(&mut cpu, 42);
        assert!(!router.has_pending());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (IrqLine::Int2, LineState::Assert),
                (IrqLine::Int2, LineState::Clear),
                (IrqLine::Int1, LineState::Assert),
            ]
        );
    }
}
