//! Rhythmic-regularity and syncopation summary, built from beat tracking
//! over an onset strength envelope.

use crate::beat::track_beats;
use crate::bpm::estimate_bpm;
use crate::config::{BeatConfig, BpmConfig, RhythmConfig};
use crate::errors::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rhythm {
    pub bpm: f32,
    /// `1.0` = perfectly isochronous beats, lower values mean more variation
    /// in inter-beat interval.
    pub regularity: f32,
    /// Fraction of onset energy falling between, rather than on, beats.
    pub syncopation: f32,
    /// Mean ratio of long-to-short inter-beat interval across consecutive
    /// pairs; `1.0` means straight (unswung) timing.
    pub swing_ratio: f32,
    pub is_swung: bool,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn regularity_score(intervals: &[f64]) -> f32 {
    if intervals.len() < 2 {
        return 0.0;
    }
    let m = mean(intervals);
    if m <= 0.0 {
        return 0.0;
    }
    let variance = intervals.iter().map(|&i| (i - m).powi(2)).sum::<f64>() / intervals.len() as f64;
    let coefficient_of_variation = variance.sqrt() / m;
    (1.0 - coefficient_of_variation).clamp(0.0, 1.0) as f32
}

fn swing_ratio(intervals: &[f64], threshold: f32) -> (f32, bool) {
    if intervals.len() < 2 {
        return (1.0, false);
    }
    let ratios: Vec<f64> = intervals
        .windows(2)
        .map(|w| {
            let (a, b) = (w[0], w[1]);
            if a <= 0.0 || b <= 0.0 {
                1.0
            } else {
                a.max(b) / a.min(b)
            }
        })
        .collect();
    let ratio = mean(&ratios) as f32;
    (ratio, ratio > threshold)
}

/// Sums onset energy within one frame of each tracked beat, against total
/// onset energy, to estimate how much of the signal's emphasis lands away
/// from the beat grid.
fn syncopation_score(onset_env: &[f32], beat_frames: &[usize]) -> f32 {
    let total: f32 = onset_env.iter().sum();
    if total <= 1e-12 {
        return 0.0;
    }
    let mut on_beat = 0.0f32;
    for &frame in beat_frames {
        let lo = frame.saturating_sub(1);
        let hi = (frame + 1).min(onset_env.len().saturating_sub(1));
        on_beat += onset_env[lo..=hi].iter().cloned().fold(0.0f32, f32::max);
    }
    (1.0 - (on_beat / total)).clamp(0.0, 1.0)
}

/// Estimates BPM, tracks beats, then summarises rhythmic regularity,
/// syncopation and swing from the resulting beat grid.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] for an empty `onset_env`, or
/// propagates [`estimate_bpm`]/[`track_beats`] errors.
pub fn analyze_rhythm(onset_env: &[f32], sr: u32, config: &RhythmConfig) -> AnalysisResult<Rhythm> {
    if onset_env.is_empty() {
        return Err(AnalysisError::invalid_parameter(
            "onset_env",
            "must not be empty",
        ));
    }

    let bpm_config = BpmConfig {
        bpm_min: config.bpm_min,
        bpm_max: config.bpm_max,
        start_bpm: config.start_bpm,
        n_fft: config.n_fft,
        hop_length: config.hop_length,
    };
    let bpm_estimate = estimate_bpm(onset_env, sr, &bpm_config)?;

    let beat_config = BeatConfig {
        start_bpm: config.start_bpm,
        bpm_min: config.bpm_min,
        bpm_max: config.bpm_max,
        ..BeatConfig::default()
    };
    let beats = track_beats(onset_env, bpm_estimate.bpm, sr, config.hop_length, &beat_config)?;

    let intervals: Vec<f64> = beats.windows(2).map(|w| w[1].time - w[0].time).collect();
    let beat_frames: Vec<usize> = beats.iter().map(|b| b.frame).collect();
    let (swing_ratio_value, is_swung) = swing_ratio(&intervals, config.swing_threshold);

    Ok(Rhythm {
        bpm: bpm_estimate.bpm,
        regularity: regularity_score(&intervals),
        syncopation: syncopation_score(onset_env, &beat_frames),
        swing_ratio: swing_ratio_value,
        is_swung,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_envelope(period_frames: usize, n_frames: usize) -> Vec<f32> {
        (0..n_frames)
            .map(|i| if i % period_frames == 0 { 1.0 } else { 0.05 })
            .collect()
    }

    #[test]
    fn isochronous_clicks_have_high_regularity_and_low_syncopation() {
        let sr = 22050;
        let period_frames = (60.0 * sr as f32 / (120.0 * 512.0)).round() as usize;
        let env = click_envelope(period_frames, 400);
        let rhythm = analyze_rhythm(&env, sr, &RhythmConfig::default()).unwrap();
        assert!(rhythm.regularity > 0.8, "{}", rhythm.regularity);
        assert!(rhythm.syncopation < 0.3, "{}", rhythm.syncopation);
    }

    #[test]
    fn rejects_empty_envelope() {
        assert!(analyze_rhythm(&[], 22050, &RhythmConfig::default()).is_err());
    }

    #[test]
    fn straight_clicks_are_not_reported_as_swung() {
        let sr = 22050;
        let period_frames = (60.0 * sr as f32 / (120.0 * 512.0)).round() as usize;
        let env = click_envelope(period_frames, 400);
        let rhythm = analyze_rhythm(&env, sr, &RhythmConfig::default()).unwrap();
        assert!(!rhythm.is_swung);
    }
}
