//! Dynamic-programming beat tracker and time-signature estimation.

use crate::config::BeatConfig;
use crate::errors::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beat {
    pub frame: usize,
    pub time: f64,
    pub strength: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
    pub confidence: f32,
}

const TRIM_THRESHOLD: f32 = 0.1;

fn normalize_unit_interval(env: &[f32]) -> Vec<f32> {
    let max = env.iter().cloned().fold(0.0_f32, f32::max);
    if max <= 1e-12 {
        return vec![0.0; env.len()];
    }
    env.iter().map(|&v| (v / max).clamp(0.0, 1.0)).collect()
}

/// Tracks beats in an onset strength envelope via the DP recurrence
/// `cumulative[i] = max_{j in [i-2P, i-P/2]} cumulative[j] + local[i] -
/// tightness * ((i-j-P)/P)^2`, seeded with `cumulative[i] = local[i]` for
/// `i < 1.5P`.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] for a non-positive `bpm`.
pub fn track_beats(
    onset_env: &[f32],
    bpm: f32,
    sr: u32,
    hop_length: usize,
    config: &BeatConfig,
) -> AnalysisResult<Vec<Beat>> {
    if bpm <= 0.0 {
        return Err(AnalysisError::invalid_parameter(
            "bpm",
            "must be positive",
        ));
    }
    if onset_env.is_empty() {
        return Ok(Vec::new());
    }

    let local = normalize_unit_interval(onset_env);
    let n = local.len();
    let period = (60.0 * sr as f32 / (bpm * hop_length as f32)).max(1.0);
    let p = period;

    let mut cumulative = vec![f32::NEG_INFINITY; n];
    let mut backpointer = vec![usize::MAX; n];

    for i in 0..n {
        if (i as f32) < 1.5 * p {
            cumulative[i] = local[i];
            continue;
        }
        let lo = (i as f32 - 2.0 * p).max(0.0).round() as usize;
        let hi = (i as f32 - p / 2.0).max(0.0).round() as usize;
        let hi = hi.min(i.saturating_sub(1));
        if lo > hi {
            cumulative[i] = local[i];
            continue;
        }
        let mut best = f32::NEG_INFINITY;
        let mut best_j = lo;
        for j in lo..=hi {
            if cumulative[j] == f32::NEG_INFINITY {
                continue;
            }
            let deviation = (i as f32 - j as f32 - p) / p;
            let score = cumulative[j] + local[i] - config.tightness * deviation * deviation;
            if score > best {
                best = score;
                best_j = j;
            }
        }
        if best == f32::NEG_INFINITY {
            cumulative[i] = local[i];
        } else {
            cumulative[i] = best;
            backpointer[i] = best_j;
        }
    }

    // finalise: best i in the last 2P frames
    let tail_start = n.saturating_sub((2.0 * p).round() as usize).max(0);
    let mut best_i = tail_start;
    let mut best_score = f32::NEG_INFINITY;
    for i in tail_start..n {
        if cumulative[i] > best_score {
            best_score = cumulative[i];
            best_i = i;
        }
    }

    let mut frames = Vec::new();
    let mut i = best_i;
    loop {
        frames.push(i);
        if backpointer[i] == usize::MAX {
            break;
        }
        i = backpointer[i];
    }
    frames.reverse();

    if config.trim {
        while frames.first().is_some_and(|&f| local[f] < TRIM_THRESHOLD) {
            frames.remove(0);
        }
        while frames.last().is_some_and(|&f| local[f] < TRIM_THRESHOLD) {
            frames.pop();
        }
    }

    Ok(frames
        .into_iter()
        .map(|frame| Beat {
            frame,
            time: frame as f64 * hop_length as f64 / f64::from(sr),
            strength: local[frame],
        })
        .collect())
}

/// Refines a BPM estimate from the beat times actually found:
/// `60 / mean(inter-beat interval)`.
#[must_use]
pub fn refine_bpm(beats: &[Beat]) -> Option<f32> {
    if beats.len() < 2 {
        return None;
    }
    let intervals: Vec<f64> = beats.windows(2).map(|w| w[1].time - w[0].time).collect();
    let mean_interval = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if mean_interval <= 0.0 {
        None
    } else {
        Some((60.0 / mean_interval) as f32)
    }
}

/// Estimates the time signature from the beat strength sequence: for each
/// candidate meter, finds the phase offset that maximises the ratio of
/// mean-strength-on-the-beat to mean-strength-elsewhere, then picks the
/// meter with the largest such ratio.
#[must_use]
pub fn estimate_time_signature(beats: &[Beat]) -> TimeSignature {
    const CANDIDATES: [u8; 3] = [3, 4, 6];
    if beats.len() < 4 {
        return TimeSignature {
            numerator: 4,
            denominator: 4,
            confidence: 0.0,
        };
    }

    let mut best = TimeSignature {
        numerator: 4,
        denominator: 4,
        confidence: 0.0,
    };
    let mut best_ratio = 0.0f32;

    for &m in &CANDIDATES {
        let mut best_phase_ratio = 0.0f32;
        for phase in 0..m {
            let (on, off): (Vec<f32>, Vec<f32>) = beats
                .iter()
                .enumerate()
                .map(|(i, b)| (i, b.strength))
                .fold((Vec::new(), Vec::new()), |(mut on, mut off), (i, s)| {
                    if (i as u8) % m == phase {
                        on.push(s);
                    } else {
                        off.push(s);
                    }
                    (on, off)
                });
            let mean_on = on.iter().sum::<f32>() / on.len().max(1) as f32;
            let mean_off = off.iter().sum::<f32>() / off.len().max(1) as f32;
            let ratio = if mean_off > 1e-10 {
                mean_on / mean_off
            } else {
                mean_on
            };
            if ratio > best_phase_ratio {
                best_phase_ratio = ratio;
            }
        }
        if best_phase_ratio > best_ratio {
            best_ratio = best_phase_ratio;
            best = TimeSignature {
                numerator: m,
                denominator: 4,
                confidence: (best_phase_ratio / 2.0).min(1.0),
            };
        }
    }

    best
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
    fn beats_are_strictly_increasing_in_time() {
        let sr = 22050;
        let hop = 512;
        let period_frames = (60.0 * sr as f32 / (120.0 * hop as f32)).round() as usize;
        let env = click_envelope(period_frames, 200);
        let beats = track_beats(&env, 120.0, sr, hop, &BeatConfig::default()).unwrap();
        for w in beats.windows(2) {
            assert!(w[0].time < w[1].time);
        }
    }

    #[test]
    fn click_track_120bpm_yields_seven_to_nine_beats_over_four_seconds() {
        let sr = 22050;
        let hop = 512;
        let period_frames = (60.0 * sr as f32 / (120.0 * hop as f32)).round() as usize;
        let n_frames = (4.0 * sr as f32 / hop as f32) as usize;
        let env = click_envelope(period_frames, n_frames);
        let beats = track_beats(&env, 120.0, sr, hop, &BeatConfig::default()).unwrap();
        assert!(
            (7..=9).contains(&beats.len()),
            "got {} beats",
            beats.len()
        );
    }

    #[test]
    fn rejects_non_positive_bpm() {
        assert!(track_beats(&[0.0; 10], 0.0, 22050, 512, &BeatConfig::default()).is_err());
    }
}
