//! SSI-263 phoneme speech synthesizer chip.
//!
//! Register map:
//! ```text
//!   0 DURPHON  D7:D6 = duration mode, D5:D0 = phoneme
//!   1 INFLECT  I10:I3
//!   2 RATEINF  D7:D4 = rate, D3 = I11, D2:D0 = I2:I0
//!   3 CTRLAMP  D7 = CTL (1 = standby), D6:D4 = articulation, D3:D0 = amplitude
//!   4 FILTER   filter frequency (0xFF = silence)
//! ```
//!
//! The chip raises its A/R line when the current phoneme finishes; on
//! the BNS that line is wired to INT1.  The host loop feeds the chip a
//! cycle count between execution chunks (`set_cycle_count`) and polls
//! `check_pending_irq`, so at most one completion interrupt is in
//! flight at a time — the chip can only play one phoneme.

use std::collections::VecDeque;

use crate::synth::Ssi263Synth;

// Register offsets.
pub const REG_DURPHON: u8 = 0;
pub const REG_INFLECT: u8 = 1;
pub const REG_RATEINF: u8 = 2;
pub const REG_CTRLAMP: u8 = 3;
pub const REG_FILTER: u8 = 4;

/// Duration-mode value (bits 7:6 of DURPHON) that disables the
/// completion interrupt.
pub const MODE_IRQ_DISABLED: u8 = 0x00;

/// CTL bit in CTRLAMP: 1 = standby.
pub const CONTROL_BIT: u8 = 0x80;

/// Bounded phoneme-log capacity.
pub const PHONEME_LOG_CAP: usize = 256;

/// All 64 phoneme codes: (name, example word).
pub const PHONEMES: [(&str, &str); 64] = [
    ("PA", "pause"),
    ("E", "bEEt"),
    ("E1", "bIt"),
    ("Y", "Yet"),
    ("YI", "bAby"),
    ("AY", "bAlt"),
    ("EH", "gEt"),
    ("EH1", "bEt"),
    ("EH2", "gEt"),
    ("EH3", "jAcket"),
    ("A", "dAy"),
    ("A1", "mAde"),
    ("A2", "hAt"),
    ("AW", "fAther"),
    ("AW1", "fAll"),
    ("AW2", "cAlt"),
    ("UH", "bOOk"),
    ("UH1", "lOOk"),
    ("UH2", "rOOm"),
    ("UH3", "fOOl"),
    ("O", "bOAt"),
    ("O1", "rOAd"),
    ("O2", "nOt"),
    ("IU", "yOU"),
    ("U", "yOU"),
    ("U1", "fOOd"),
    ("ER", "bIRd"),
    ("ER1", "hER"),
    ("ER2", "lEARn"),
    ("R", "Red"),
    ("R1", "caR"),
    ("R2", "gReat"),
    ("L", "Let"),
    ("L1", "caLL"),
    ("LF", "Leaf"),
    ("W", "Win"),
    ("B", "Bet"),
    ("D", "Dog"),
    ("KV", "sKy"),
    ("P", "Pot"),
    ("T", "Top"),
    ("K", "Kit"),
    ("HV", "aHead"),
    ("HVC", "aHead"),
    ("HF", "Help"),
    ("HFC", "Help"),
    ("HN", "Horse"),
    ("Z", "Zoo"),
    ("S", "See"),
    ("J", "aZure"),
    ("SCH", "SHip"),
    ("V", "Vest"),
    ("F", "Fan"),
    ("THV", "THis"),
    ("TH", "THin"),
    ("M", "Met"),
    ("N", "Net"),
    ("NG", "siNG"),
    ("A", "lAst"),
    ("OH", "cOUgh"),
    ("U", "nEW"),
    ("UH", "pUt"),
    ("PA1", "pause"),
    ("STOP", "stop"),
];

pub fn phoneme_name(code: u8) -> &'static str {
    PHONEMES.get(code as usize).map(|p| p.0).unwrap_or("?")
}

pub struct Ssi263 {
    clock: u32,

    // Register bytes
    duration_phoneme: u8,
    inflection: u8,
    rate_inflection: u8,
    ctrl_art_amp: u8,
    filter_freq: u8,

    // Derived state
    pub speaking: bool,
    irq_enabled: bool,
    pub current_phoneme: u8,

    /// Cycle at which the A/R interrupt should fire.  Set iff
    /// `speaking && irq_enabled`.
    pending_irq_cycle: Option<u64>,
    current_cycle: u64,

    phoneme_log: VecDeque<u8>,
    synth: Option<Ssi263Synth>,
}

impl Ssi263 {
    pub fn new(clock: u32) -> Self {
        Self {
            clock,
            duration_phoneme: 0xC0, // phoneme-transitioned mode, phoneme 0
            inflection: 0,
            rate_inflection: 0,
            ctrl_art_amp: CONTROL_BIT, // standby
            filter_freq: 0xFF,         // silence
            speaking: false,
            irq_enabled: false,
            current_phoneme: 0,
            pending_irq_cycle: None,
            current_cycle: 0,
            phoneme_log: VecDeque::new(),
            synth: None,
        }
    }

    /// Connect a synthesizer: phoneme emissions produce audio.
    pub fn set_synth(&mut self, synth: Ssi263Synth) {
        self.synth = Some(synth);
    }

    pub fn synth_mut(&mut self) -> Option<&mut Ssi263Synth> {
        self.synth.as_mut()
    }

    pub fn has_synth(&self) -> bool {
        self.synth.is_some()
    }

    pub fn reset(&mut self) {
        self.duration_phoneme = 0xC0;
        self.inflection = 0;
        self.rate_inflection = 0;
        self.ctrl_art_amp = CONTROL_BIT;
        self.filter_freq = 0xFF;
        self.speaking = false;
        self.irq_enabled = false;
        self.current_phoneme = 0;
        self.pending_irq_cycle = None;
        self.phoneme_log.clear();
    }

    // ── Timing ────────────────────────────────────────────────

    /// Host loop: update the chip's notion of "now" (cycles since
    /// power-on), used as the base when scheduling completions.
    pub fn set_cycle_count(&mut self, cycles: u64) {
        self.current_cycle = cycles;
    }

    /// Current-phoneme duration in CPU cycles, from the rate and
    /// duration-mode fields:
    ///
    /// ```text
    /// duration_ms = floor(((16 - rate) * 4096) / 1023) * (4 - dur_mode)
    /// ```
    pub fn duration_cycles(&self) -> u64 {
        let rate = ((self.rate_inflection >> 4) & 0x0F) as u64;
        let dur_mode = ((self.duration_phoneme >> 6) & 0x03) as u64;
        let duration_ms = (((16 - rate) * 4096) / 1023) * (4 - dur_mode);
        duration_ms * self.clock as u64 / 1000
    }

    /// Fire the completion interrupt if its cycle has been reached.
    /// Returns `true` when the A/R line should be asserted; the caller
    /// owns the actual line (the firmware clears it on acknowledge).
    pub fn check_pending_irq(&mut self, current_cycle: u64) -> bool {
        match self.pending_irq_cycle {
            Some(at) if current_cycle >= at => {
                self.pending_irq_cycle = None;
                self.speaking = false;
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_irq_cycle(&self) -> Option<u64> {
        self.pending_irq_cycle
    }

    // ── Register interface ────────────────────────────────────

    pub fn read(&self, reg: u8) -> u8 {
        if reg == REG_FILTER {
            // A/R status: bit 7 set while a phoneme is playing.
            if self.speaking {
                0x80
            } else {
                0x00
            }
        } else {
            0xFF
        }
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg {
            REG_DURPHON => {
                self.duration_phoneme = value;
                let phoneme = value & 0x3F;
                self.irq_enabled = (value & 0xC0) != MODE_IRQ_DISABLED;

                if let Some(synth) = self.synth.as_mut() {
                    synth.write_durphon(value);
                }

                // Standby swallows the phoneme; it plays on wake-up.
                if self.ctrl_art_amp & CONTROL_BIT == 0 {
                    self.speak_phoneme(phoneme);
                }
            }
            REG_INFLECT => {
                self.inflection = value;
                if let Some(synth) = self.synth.as_mut() {
                    synth.write_inflect(value);
                }
            }
            REG_RATEINF => {
                self.rate_inflection = value;
                if let Some(synth) = self.synth.as_mut() {
                    synth.write_rateinf(value);
                }
            }
            REG_CTRLAMP => {
                let old_ctl = self.ctrl_art_amp & CONTROL_BIT;
                self.ctrl_art_amp = value;
                let new_ctl = value & CONTROL_BIT;
                log::debug!(
                    "CTRLAMP write: {value:02X} CTL={} AMP={}",
                    (new_ctl != 0) as u8,
                    value & 0x0F
                );

                if let Some(synth) = self.synth.as_mut() {
                    synth.write_ctrlamp(value);
                }

                if old_ctl != 0 && new_ctl == 0 {
                    // 1→0: wake up and play the latched phoneme.
                    let phoneme = self.duration_phoneme & 0x3F;
                    self.speak_phoneme(phoneme);
                } else if old_ctl == 0 && new_ctl != 0 {
                    // 0→1: standby cancels the in-flight phoneme.
                    self.speaking = false;
                    self.pending_irq_cycle = None;
                }
            }
            REG_FILTER => {
                self.filter_freq = value;
                if let Some(synth) = self.synth.as_mut() {
                    synth.write_filter(value);
                }
            }
            _ => {}
        }
    }

    // ── Phoneme emission ──────────────────────────────────────

    fn speak_phoneme(&mut self, phoneme: u8) {
        self.current_phoneme = phoneme;
        if self.phoneme_log.len() == PHONEME_LOG_CAP {
            self.phoneme_log.pop_front();
        }
        self.phoneme_log.push_back(phoneme);

        let duration_cycles = self.duration_cycles();
        log::debug!(
            "phoneme {phoneme:02X} {} ({}) duration={}ms",
            phoneme_name(phoneme),
            PHONEMES.get(phoneme as usize).map(|p| p.1).unwrap_or("unknown"),
            duration_cycles * 1000 / self.clock as u64
        );

        self.speaking = true;

        // The A/R line asserts AFTER the phoneme finishes; the ISR
        // queues the next phoneme in response.  A phoneme started with
        // interrupts disabled also cancels any stale completion.
        self.pending_irq_cycle = if self.irq_enabled {
            Some(self.current_cycle + duration_cycles)
        } else {
            None
        };

        if let Some(synth) = self.synth.as_mut() {
            synth.play_current();
        }
    }

    // ── Log access ────────────────────────────────────────────

    pub fn has_logged_phonemes(&self) -> bool {
        !self.phoneme_log.is_empty()
    }

    pub fn phoneme_log(&self) -> impl Iterator<Item = u8> + '_ {
        self.phoneme_log.iter().copied()
    }

    /// Drain the phoneme log (run-loop flush).
    pub fn take_phoneme_log(&mut self) -> Vec<u8> {
        self.phoneme_log.drain(..).collect()
    }

    /// Approximate text readback of the log; pauses are skipped.
    pub fn phoneme_text(&self) -> String {
        let names: Vec<&str> = self
            .phoneme_log
            .iter()
            .map(|&code| phoneme_name(code))
            .filter(|name| !matches!(*name, "PA" | "PA1" | "STOP"))
            .collect();
        names.join(" ")
    }
}
