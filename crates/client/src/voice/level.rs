//! Microphone level metering.
//!
//! Mirrors a browser analyser node: the latest window is Blackman-windowed,
//! transformed, and each bin's magnitude is mapped from decibels in
//! `[MIN_DB, MAX_DB]` onto `[0, 1]`. The meter value is the RMS of those bins
//! times `GAIN`, clamped to `[0, 1]`.

use std::f32::consts::PI;

pub const WINDOW: usize = 256;
pub const MIN_DB: f32 = -100.0;
pub const MAX_DB: f32 = -30.0;
pub const GAIN: f32 = 10.0;

/// Normalized magnitude per frequency bin, each in `[0, 1]`.
///
/// Uses at most the last `WINDOW` samples; shorter input is zero-padded.
pub fn frequency_bins(samples: &[f32]) -> Vec<f32> {
    let start = samples.len().saturating_sub(WINDOW);
    let window = &samples[start..];
    let n = WINDOW as f32;

    let windowed: Vec<f32> = (0..WINDOW)
        .map(|i| {
            let x = window.get(i).copied().unwrap_or(0.0);
            let x = if x.is_finite() { x } else { 0.0 };
            let phase = 2.0 * PI * i as f32 / n;
            let blackman = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
            x * blackman
        })
        .collect();

    (0..WINDOW / 2)
        .map(|k| {
            let (mut re, mut im) = (0.0f32, 0.0f32);
            for (i, &x) in windowed.iter().enumerate() {
                let angle = 2.0 * PI * (k * i) as f32 / n;
                re += x * angle.cos();
                im -= x * angle.sin();
            }
            let magnitude = (re * re + im * im).sqrt() / n;
            normalize_db(20.0 * magnitude.max(f32::MIN_POSITIVE).log10())
        })
        .collect()
}

fn normalize_db(db: f32) -> f32 {
    if !db.is_finite() {
        return 0.0;
    }
    ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0)
}

/// Meter value in `[0, 1]` from already-normalized bins.
pub fn level_from_bins(bins: &[f32]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let energy = bins.iter().map(|b| b * b).sum::<f32>() / bins.len() as f32;
    let level = energy.sqrt() * GAIN;
    if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Meter value in `[0, 1]` for the latest window of raw samples.
pub fn audio_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    level_from_bins(&frequency_bins(samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(amplitude: f32, bin: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * bin as f32 * i as f32 / WINDOW as f32).sin())
            .collect()
    }

    #[test]
    fn silence_reads_zero() {
        assert_eq!(audio_level(&[]), 0.0);
        assert_abs_diff_eq!(audio_level(&[0.0; WINDOW]), 0.0);
    }

    #[test]
    fn bins_are_normalized() {
        let bins = frequency_bins(&sine(0.001, 10, WINDOW));
        assert_eq!(bins.len(), WINDOW / 2);
        assert!(bins.iter().all(|b| (0.0..=1.0).contains(b)));
        // The tone's own bin is the loudest.
        let loudest = bins
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(10));
    }

    #[test]
    fn level_is_clamped_for_any_amplitude() {
        for amplitude in [1e-4, 0.01, 0.5, 1.0, 50.0, 1e6, f32::MAX] {
            let level = audio_level(&sine(amplitude, 7, WINDOW * 2));
            assert!((0.0..=1.0).contains(&level), "{amplitude} -> {level}");
        }
    }

    #[test]
    fn louder_input_reads_higher() {
        let quiet = audio_level(&sine(0.001, 5, WINDOW));
        let loud = audio_level(&sine(0.5, 5, WINDOW));
        assert!(loud > quiet, "loud={loud} quiet={quiet}");
        assert!(loud > 0.5);
    }

    #[test]
    fn non_finite_samples_are_ignored() {
        let level = audio_level(&[f32::NAN, f32::INFINITY, f32::NEG_INFINITY]);
        assert_abs_diff_eq!(level, 0.0);
    }

    #[test]
    fn gain_then_clamp() {
        assert_abs_diff_eq!(level_from_bins(&[0.05; 4]), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(level_from_bins(&[0.5; 4]), 1.0);
        assert_eq!(level_from_bins(&[]), 0.0);
    }
}
