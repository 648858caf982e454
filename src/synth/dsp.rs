//! Pure DSP for SSI-263 phoneme audio.
//!
//! Each stage maps `&[i16]` → `Vec<i16>`; the chain is
//! amplitude → filter → time-stretch → pitch-shift.

/// Linear amplitude scale.  `amplitude` is the chip's 4-bit field:
/// 0 mutes, 15 is unity.
pub fn apply_amplitude(samples: &[i16], amplitude: u8) -> Vec<i16> {
    if amplitude == 0 {
        return vec![0; samples.len()];
    }
    if amplitude >= 15 {
        return samples.to_vec();
    }
    let scale = amplitude as f64 / 15.0;
    samples.iter().map(|&s| (s as f64 * scale) as i16).collect()
}

/// Filter stage.  `0xFF` mutes; every other value currently passes
/// through (the resonance filter slot is unimplemented).
pub fn apply_filter(samples: &[i16], filter_freq: u8) -> Vec<i16> {
    if filter_freq == 0xFF {
        return vec![0; samples.len()];
    }
    samples.to_vec()
}

/// Duration-mode time stretch.  Modes 0 and 1 are identity; mode 2
/// averages consecutive pairs, mode 3 consecutive quadruples.  The
/// mean truncates toward zero; a tail shorter than the group is
/// dropped.
pub fn time_stretch(samples: &[i16], _rate: u8, duration: u8) -> Vec<i16> {
    let avg = match duration {
        2 => 2usize,
        3 => 4usize,
        _ => return samples.to_vec(),
    };

    let out_len = samples.len() / avg;
    if out_len == 0 {
        return samples.to_vec();
    }

    (0..out_len)
        .map(|i| {
            let group = &samples[i * avg..i * avg + avg];
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            (sum / avg as i32) as i16
        })
        .collect()
}

/// Inflection pitch shift via linear-interpolation resampling.
/// 2048 is neutral; the ratio spans roughly 0.5×–2.0×.
pub fn pitch_shift(samples: &[i16], inflection: u16) -> Vec<i16> {
    let ratio = 1.0 + (inflection as f64 - 2048.0) / 4096.0;
    if (ratio - 1.0).abs() < 0.01 {
        return samples.to_vec();
    }

    let old_len = samples.len();
    if old_len == 0 {
        return Vec::new();
    }
    let new_len = ((old_len as f64 / ratio) as usize).max(1);

    let step = if new_len > 1 {
        (old_len - 1) as f64 / (new_len - 1) as f64
    } else {
        0.0
    };

    (0..new_len)
        .map(|j| {
            let pos = j as f64 * step;
            let i0 = pos as usize;
            let i1 = (i0 + 1).min(old_len - 1);
            let frac = pos - i0 as f64;
            (samples[i0] as f64 * (1.0 - frac) + samples[i1] as f64 * frac) as i16
        })
        .collect()
}
