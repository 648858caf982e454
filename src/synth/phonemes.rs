//! Phoneme PCM bank.
//!
//! 62 phoneme recordings share one immutable signed-16-bit pool,
//! addressed by an `(offset, length)` index.  A real bank is extracted
//! from speech-card recordings by external tooling and loaded from a
//! file; when none is available a placeholder bank is synthesized in
//! code so the emulator always has something to play, the same way a
//! stub ROM stands in for a missing Kernal image.
//!
//! Bank file layout (little-endian):
//! ```text
//!   "SSIP"  magic
//!   u32     entry count
//!   entry × (u32 offset, u32 length)     in samples
//!   u32     pool length                  in samples
//!   pool × i16
//! ```

use std::f64::consts::TAU;
use std::fs;
use std::path::Path;

/// Sample rate of all phoneme data.
pub const SAMPLE_RATE: u32 = 22_050;

/// Pool size of the canonical extracted bank.
pub const POOL_SAMPLES: usize = 156_566;

/// Number of phoneme recordings (codes 2–63 of the chip map here).
pub const PHONEME_COUNT: usize = 62;

const BANK_MAGIC: &[u8; 4] = b"SSIP";

pub struct PhonemeBank {
    info: Vec<(u32, u32)>,
    pool: Vec<i16>,
}

impl PhonemeBank {
    // ── Construction ──────────────────────────────────────────

    /// Synthesize the built-in placeholder bank: one short voiced-ish
    /// burst per phoneme, deterministic, nothing like real speech but
    /// enough to hear the firmware talk.
    pub fn builtin() -> Self {
        let mut info = Vec::with_capacity(PHONEME_COUNT);
        let mut pool = vec![0i16; POOL_SAMPLES];

        let mut offset = 0usize;
        for index in 0..PHONEME_COUNT {
            let length = 2200 + (index % 8) * 60;
            synth_placeholder(index, &mut pool[offset..offset + length]);
            info.push((offset as u32, length as u32));
            offset += length;
        }

        Self { info, pool }
    }

    /// Load an extracted bank file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let data = fs::read(path).map_err(|e| format!("read {}: {e}", path.display()))?;
        Self::parse(&data)
    }

    /// Load `path` if given and valid, otherwise fall back to the
    /// built-in bank with a warning.
    pub fn load_or_builtin(path: Option<&Path>) -> Self {
        match path {
            Some(p) => match Self::from_file(p) {
                Ok(bank) => {
                    log::info!("phoneme bank: {} ({} phonemes)", p.display(), bank.len());
                    bank
                }
                Err(e) => {
                    log::warn!("phoneme bank unusable ({e}), using built-in placeholder");
                    Self::builtin()
                }
            },
            None => Self::builtin(),
        }
    }

    fn parse(data: &[u8]) -> Result<Self, String> {
        let mut r = Reader::new(data);
        if r.take(4)? != BANK_MAGIC {
            return Err("bad magic (expected SSIP)".into());
        }

        let count = r.u32()? as usize;
        if count == 0 || count > 256 {
            return Err(format!("implausible entry count {count}"));
        }

        let mut info = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = r.u32()?;
            let length = r.u32()?;
            info.push((offset, length));
        }

        let pool_len = r.u32()? as usize;
        let mut pool = Vec::with_capacity(pool_len);
        for _ in 0..pool_len {
            pool.push(r.i16()?);
        }

        for &(offset, length) in &info {
            if offset as usize + length as usize > pool.len() {
                return Err(format!(
                    "entry {offset}+{length} overruns pool of {}",
                    pool.len()
                ));
            }
        }

        Ok(Self { info, pool })
    }

    // ── Access ────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn info(&self) -> &[(u32, u32)] {
        &self.info
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Samples of one recording, by data index (not chip code).
    pub fn samples(&self, index: usize) -> Option<&[i16]> {
        let &(offset, length) = self.info.get(index)?;
        self.pool.get(offset as usize..offset as usize + length as usize)
    }
}

// ── Placeholder synthesis ─────────────────────────────────────

/// Damped three-harmonic tone with a per-index fundamental plus an
/// LCG noise floor; later indices (fricative territory) get more
/// noise.
fn synth_placeholder(index: usize, out: &mut [i16]) {
    let f0 = 96.0 + index as f64 * 7.5;
    let noise_mix = if index >= 40 { 0.55 } else { 0.12 };
    let mut seed: u32 = 3_686_734 ^ (index as u32).wrapping_mul(2_654_435_761);

    let len = out.len();
    for (n, slot) in out.iter_mut().enumerate() {
        let t = n as f64 / SAMPLE_RATE as f64;
        let tone = (TAU * f0 * t).sin()
            + 0.5 * (TAU * 2.0 * f0 * t).sin()
            + 0.25 * (TAU * 3.0 * f0 * t).sin();

        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let noise = ((seed >> 16) as i16 as f64) / 32_768.0;

        let env = 1.0 - n as f64 / len as f64;
        *slot = ((tone * 0.5 * (1.0 - noise_mix) + noise * noise_mix) * env * 14_000.0) as i16;
    }
}

// ── Little-endian reader ──────────────────────────────────────

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err("truncated bank file".into());
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i16(&mut self) -> Result<i16, String> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }
}
