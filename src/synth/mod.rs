//! SSI-263 speech synthesis.
//!
//! [`Ssi263Synth`] holds a decoded mirror of the chip registers, the
//! phoneme bank, and the audio player.  It can be driven by the
//! emulated chip (register writes forwarded byte-for-byte) or used
//! standalone through the high-level API.

pub mod dsp;
pub mod phonemes;
pub mod player;

use std::thread;
use std::time::Duration;

use dsp::{apply_amplitude, apply_filter, pitch_shift, time_stretch};
use phonemes::{PhonemeBank, SAMPLE_RATE};
use player::AudioPlayer;

/// Silence returned for the pause phoneme (code 0): 50 ms.
const PAUSE_SAMPLES: usize = SAMPLE_RATE as usize * 50 / 1000;

/// Silence returned for a code with no recording.
const FALLBACK_SAMPLES: usize = 100;

/// Decoded register state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthState {
    /// 6-bit phoneme code.
    pub phoneme: u8,
    /// 2-bit duration mode; 0 = longest output.
    pub duration: u8,
    /// 12-bit inflection; 2048 = neutral pitch.
    pub inflection: u16,
    /// 4-bit rate.
    pub rate: u8,
    /// 3-bit articulation.
    pub articulation: u8,
    /// 4-bit amplitude; 15 = unity.
    pub amplitude: u8,
    /// 8-bit filter frequency; 0xFF = silence.
    pub filter_freq: u8,
    /// CTL bit; `true` = standby.
    pub control: bool,
}

impl Default for SynthState {
    fn default() -> Self {
        Self {
            phoneme: 0,
            duration: 0,
            inflection: 2048,
            rate: 8,
            articulation: 0,
            amplitude: 15,
            filter_freq: 0,
            control: true,
        }
    }
}

pub struct Ssi263Synth {
    pub state: SynthState,
    bank: PhonemeBank,
    player: Option<AudioPlayer>,
}

impl Ssi263Synth {
    /// Synth with audio output.
    pub fn new(bank: PhonemeBank) -> Self {
        Self {
            state: SynthState::default(),
            bank,
            player: Some(AudioPlayer::new()),
        }
    }

    /// Synth without an output device (DSP still runs; nothing is
    /// played).
    pub fn without_audio(bank: PhonemeBank) -> Self {
        Self {
            state: SynthState::default(),
            bank,
            player: None,
        }
    }

    /// Open the audio device.  Failure is downgraded to a warning —
    /// the emulator keeps running silently.
    pub fn start(&mut self) {
        if let Some(player) = self.player.as_mut() {
            if let Err(e) = player.start() {
                log::warn!("audio unavailable ({e}), speech will be silent");
                self.player = None;
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.stop();
        }
    }

    // ── Register mirror (driven by the emulated chip) ─────────

    /// Duration/Phoneme register: D7:D6 duration, D5:D0 phoneme.
    pub fn write_durphon(&mut self, value: u8) {
        self.state.duration = (value >> 6) & 0x03;
        self.state.phoneme = value & 0x3F;
    }

    /// Inflection register: I10:I3.
    pub fn write_inflect(&mut self, value: u8) {
        self.state.inflection = (self.state.inflection & 0x807) | ((value as u16) << 3);
    }

    /// Rate/Inflection register: D7:D4 rate, D3 = I11, D2:D0 = I2:I0.
    pub fn write_rateinf(&mut self, value: u8) {
        self.state.rate = (value >> 4) & 0x0F;
        let i11 = ((value >> 3) & 0x01) as u16;
        let i2_0 = (value & 0x07) as u16;
        self.state.inflection = (i11 << 11) | (self.state.inflection & 0x7F8) | i2_0;
    }

    /// Control/Articulation/Amplitude register.
    pub fn write_ctrlamp(&mut self, value: u8) {
        self.state.control = value & 0x80 != 0;
        self.state.articulation = (value >> 4) & 0x07;
        self.state.amplitude = value & 0x0F;
    }

    /// Filter-frequency register.
    pub fn write_filter(&mut self, value: u8) {
        self.state.filter_freq = value;
    }

    // ── High-level API (standalone use) ───────────────────────

    /// Speak one phoneme with the current register settings.
    pub fn speak_phoneme(&mut self, phoneme: u8) {
        self.state.phoneme = phoneme & 0x3F;
        self.play_current();
    }

    pub fn speak_phonemes(&mut self, phonemes: &[u8]) {
        for &p in phonemes {
            self.speak_phoneme(p);
        }
    }

    /// Pitch as a multiplier; 1.0 = neutral.
    pub fn set_pitch(&mut self, pitch: f64) {
        let inflection = 2048.0 + (pitch - 1.0) * 4096.0;
        self.state.inflection = inflection.clamp(0.0, 4095.0) as u16;
    }

    /// Speed as a multiplier; 1.0 = middle rate.
    pub fn set_speed(&mut self, speed: f64) {
        self.state.rate = (speed * 8.0).clamp(0.0, 15.0) as u8;
    }

    /// Volume 0.0–1.0.
    pub fn set_volume(&mut self, volume: f64) {
        self.state.amplitude = (volume * 15.0).clamp(0.0, 15.0) as u8;
    }

    pub fn is_speaking(&self) -> bool {
        self.player.as_ref().map_or(false, |p| p.is_playing())
    }

    /// Block until queued speech has drained.
    pub fn wait_until_done(&self) {
        while self.is_speaking() {
            thread::sleep(Duration::from_millis(10));
        }
    }

    // ── Audio generation ──────────────────────────────────────

    /// Processed, float-normalized samples for a phoneme code under
    /// the current register state.
    ///
    /// Code 0 is the pause phoneme (silence); code 1 has no recording
    /// and is aliased to code 2; codes 2–63 map to data indices 0–61.
    /// A code with no recording yields a short silence, never an
    /// error.
    pub fn get_phoneme_audio(&self, phoneme: u8) -> Vec<f32> {
        if phoneme == 0 {
            return vec![0.0; PAUSE_SAMPLES];
        }
        let code = if phoneme == 1 { 2 } else { phoneme };
        let index = (code - 2) as usize;

        let samples = match self.bank.samples(index) {
            Some(s) => s,
            None => return vec![0.0; FALLBACK_SAMPLES],
        };

        let samples = apply_amplitude(samples, self.state.amplitude);
        let samples = apply_filter(&samples, self.state.filter_freq);
        let samples = time_stretch(&samples, self.state.rate, self.state.duration);
        let samples = pitch_shift(&samples, self.state.inflection);

        samples.iter().map(|&s| s as f32 / 32_768.0).collect()
    }

    /// Render the current phoneme and hand it to the player.
    pub fn play_current(&mut self) {
        let audio = self.get_phoneme_audio(self.state.phoneme);
        log::debug!(
            "play phoneme={} amp={} infl={} dur={} ({} samples)",
            self.state.phoneme,
            self.state.amplitude,
            self.state.inflection,
            self.state.duration,
            audio.len()
        );
        if let Some(player) = self.player.as_ref() {
            player.play(audio);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth() -> Ssi263Synth {
        Ssi263Synth::without_audio(PhonemeBank::builtin())
    }

    #[test]
    fn test_inflection_merge_from_both_registers() {
        let mut s = synth();
        // All twelve bits set: I10:I3 = 0xFF, I11 = 1, I2:I0 = 0b111.
        s.write_inflect(0xFF);
        s.write_rateinf(0x0F);
        assert_eq!(s.state.inflection, 0x0FFF);
        assert_eq!(s.state.rate, 0);

        // Clearing the middle bits leaves I11 and I2:I0 alone.
        s.write_inflect(0x00);
        assert_eq!(s.state.inflection, 0x0807);

        s.write_rateinf(0xF0);
        assert_eq!(s.state.inflection, 0x0000);
        assert_eq!(s.state.rate, 15);
    }

    #[test]
    fn test_durphon_and_ctrlamp_decode() {
        let mut s = synth();
        s.write_durphon(0xC5);
        assert_eq!(s.state.duration, 3);
        assert_eq!(s.state.phoneme, 5);

        s.write_ctrlamp(0x7A);
        assert!(!s.state.control);
        assert_eq!(s.state.articulation, 7);
        assert_eq!(s.state.amplitude, 10);

        s.write_ctrlamp(0x80);
        assert!(s.state.control);
    }

    #[test]
    fn test_pause_phoneme_is_50ms_of_silence() {
        let s = synth();
        let audio = s.get_phoneme_audio(0);
        assert_eq!(audio.len(), 1102);
        assert!(audio.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_code_one_aliases_to_two() {
        let s = synth();
        assert_eq!(s.get_phoneme_audio(1), s.get_phoneme_audio(2));
    }

    #[test]
    fn test_audio_is_normalized() {
        let mut s = synth();
        s.state.amplitude = 15;
        for code in 2..=63u8 {
            let audio = s.get_phoneme_audio(code);
            assert!(!audio.is_empty());
            assert!(audio.iter().all(|&v| (-1.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn test_duration_mode_shrinks_output() {
        let mut s = synth();
        s.state.duration = 0;
        let full = s.get_phoneme_audio(5);
        s.state.duration = 3;
        let quarter = s.get_phoneme_audio(5);
        assert_eq!(quarter.len(), full.len() / 4);
    }

    #[test]
    fn test_helpers_clamp_fields() {
        let mut s = synth();
        s.set_pitch(1.0);
        assert_eq!(s.state.inflection, 2048);
        s.set_pitch(10.0);
        assert_eq!(s.state.inflection, 4095);
        s.set_speed(2.0);
        assert_eq!(s.state.rate, 15);
        s.set_volume(0.0);
        assert_eq!(s.state.amplitude, 0);
    }

    #[test]
    fn test_muted_amplitude_yields_silence() {
        let mut s = synth();
        s.state.amplitude = 0;
        let audio = s.get_phoneme_audio(5);
        assert!(audio.iter().all(|&v| v == 0.0));
    }
}
