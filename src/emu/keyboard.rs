//! 8-dot Braille chord keyboard.
//!
//! One byte of state: each bit is one dot.  The hardware latches a
//! chord and interrupts the CPU on the 0→non-zero edge; the firmware
//! polls the port, which clears the latch.

pub struct Keyboard {
    dots: u8,
    irq_latched: bool,
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            dots: 0x00,
            irq_latched: false,
        }
    }

    /// Host-side key press.  Returns `true` when the chord latch fires
    /// (0 → non-zero edge) and the IRQ line should be asserted.
    pub fn press(&mut self, dots: u8) -> bool {
        let edge = self.dots == 0 && dots != 0;
        self.dots = dots;
        if edge {
            self.irq_latched = true;
        }
        edge
    }

    /// Host-side key release.
    pub fn release(&mut self) {
        self.dots = 0x00;
    }

    /// Firmware poll: returns the chord and clears the latch.
    pub fn read(&mut self) -> u8 {
        self.irq_latched = false;
        self.dots
    }

    /// Firmware latch clear (keyclr port).
    pub fn clear(&mut self) {
        self.dots = 0x00;
        self.irq_latched = false;
    }

    pub fn irq_latched(&self) -> bool {
        self.irq_latched
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_edge_fires_once() {
        let mut kb = Keyboard::new();
        assert!(kb.press(0b0000_0101));
        // Chord change without release: no new edge.
        assert!(!kb.press(0b0000_0111));
        kb.release();
        assert!(kb.press(0b0100_0000));
    }

    #[test]
    fn test_read_returns_chord_and_clears_latch() {
        let mut kb = Keyboard::new();
        kb.press(0x28);
        assert!(kb.irq_latched());
        assert_eq!(kb.read(), 0x28);
        assert!(!kb.irq_latched());
        // Chord stays until released.
        assert_eq!(kb.read(), 0x28);
    }

    #[test]
    fn test_clear_drops_chord() {
        let mut kb = Keyboard::new();
        kb.press(0xFF);
        kb.clear();
        assert_eq!(kb.read(), 0x00);
        assert!(!kb.irq_latched());
    }
}
