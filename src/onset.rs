//! Onset strength envelope (log-power mel difference) and onset-time peak
//! picking.

use crate::config::{OnsetConfig, OnsetDetectConfig};
use crate::mel::MelSpectrogram;

/// 1-D onset strength envelope: for each frame `t >= lag`,
/// `o[t] = sum_m max(0, log S[m,t] - log S[m,t-lag])` (half-wave rectified).
/// Optionally detrended (subtract mean) and centered (z-scored).
#[must_use]
pub fn onset_strength(mel: &MelSpectrogram, config: &OnsetConfig) -> Vec<f32> {
    let log_mel = mel.log_power();
    let n_frames = log_mel.ncols();
    let mut env = vec![0.0f32; n_frames];

    for t in config.lag..n_frames {
        let mut acc = 0.0f32;
        for m in 0..log_mel.nrows() {
            acc += (log_mel[[m, t]] - log_mel[[m, t - config.lag]]).max(0.0);
        }
        env[t] = acc;
    }

    if config.detrend {
        let mean = env.iter().sum::<f32>() / env.len().max(1) as f32;
        for v in &mut env {
            *v -= mean;
        }
    }
    if config.center {
        let mean = env.iter().sum::<f32>() / env.len().max(1) as f32;
        let variance = env.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / env.len().max(1) as f32;
        let std = variance.sqrt().max(1e-10);
        for v in &mut env {
            *v = (*v - mean) / std;
        }
    }

    env
}

/// A multi-band variant: mel bins are split into `n_bands` contiguous
/// groups, each emitting its own envelope (row-major `[n_bands x
/// n_frames]`, returned as a `Vec` of per-band envelopes for simplicity).
#[must_use]
pub fn onset_strength_multi(mel: &MelSpectrogram, config: &OnsetConfig, n_bands: usize) -> Vec<Vec<f32>> {
    if n_bands == 0 {
        return Vec::new();
    }
    let log_mel = mel.log_power();
    let n_mels = log_mel.nrows();
    let n_frames = log_mel.ncols();
    let band_size = n_mels.div_ceil(n_bands);

    (0..n_bands)
        .map(|band| {
            let lo = band * band_size;
            let hi = (lo + band_size).min(n_mels);
            let mut env = vec![0.0f32; n_frames];
            for t in config.lag..n_frames {
                let mut acc = 0.0f32;
                for m in lo..hi {
                    acc += (log_mel[[m, t]] - log_mel[[m, t - config.lag]]).max(0.0);
                }
                env[t] = acc;
            }
            env
        })
        .collect()
}

/// Picks onset frame indices from an onset strength envelope.
///
/// A candidate at frame `i` is a local max over `[i - pre_max, i +
/// post_max]` that exceeds `mean(env[i-pre_avg..i+post_avg]) + delta`
/// (adaptive threshold when `config.threshold == 0.0`, else the fixed
/// `config.threshold` is added instead of the local mean). Per the
/// test-visible peak-picking contract, `wait` overrides local-max status:
/// a candidate is accepted only if it is more than `wait` frames after the
/// last accepted one, regardless of whether it's a local max elsewhere in
/// the window.
#[must_use]
pub fn pick_onsets(env: &[f32], config: &OnsetDetectConfig) -> Vec<usize> {
    let n = env.len();
    let mut onsets = Vec::new();
    let mut last_accepted: Option<usize> = None;

    for i in 0..n {
        let pre_max = i.saturating_sub(config.pre_max);
        let post_max = (i + config.post_max + 1).min(n);
        let is_local_max = env[pre_max..post_max]
            .iter()
            .all(|&v| v <= env[i]);
        if !is_local_max {
            continue;
        }

        let pre_avg = i.saturating_sub(config.pre_avg);
        let post_avg = (i + config.post_avg + 1).min(n);
        let window = &env[pre_avg..post_avg];
        let local_mean = window.iter().sum::<f32>() / window.len().max(1) as f32;

        let threshold = if config.threshold > 0.0 {
            config.threshold
        } else {
            local_mean + config.delta
        };
        if env[i] < threshold {
            continue;
        }

        if let Some(last) = last_accepted {
            if i.saturating_sub(last) <= config.wait {
                continue;
            }
        }

        onsets.push(i);
        last_accepted = Some(i);
    }

    onsets
}
