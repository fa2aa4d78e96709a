//! Autocorrelation-based BPM estimation with harmonic-cluster
//! disambiguation, to avoid the octave errors plain autocorrelation tends
//! to lock onto.

use log::warn;

use crate::config::BpmConfig;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::primitives::fft::autocorrelate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpmEstimate {
    pub bpm: f32,
    pub confidence: f32,
}

const HARMONIC_RATIOS: [f32; 7] = [1.0, 2.0, 3.0, 0.5, 1.0 / 3.0, 1.5, 2.0 / 3.0];
const HARMONIC_EPSILON: f32 = 0.04;
const TOP_K_BINS: usize = 15;
const HIGHER_CLUSTER_OVERRIDE_FRACTION: f32 = 0.15;
const PREFERRED_RANGE: (f32, f32) = (80.0, 180.0);
const PREFERRED_VOTE_FRACTION: f32 = 0.30;
const FALLBACK_RANGE: (f32, f32) = (60.0, 200.0);
const FALLBACK_VOTE_FRACTION: f32 = 0.50;
const HISTOGRAM_BIN_WIDTH: f32 = 0.5;

#[inline]
fn bpm_to_lag(bpm: f32, sr: u32, hop_length: usize) -> usize {
    (60.0 * sr as f32 / (bpm * hop_length as f32)).round().max(1.0) as usize
}

#[inline]
fn lag_to_bpm(lag: usize, sr: u32, hop_length: usize) -> f32 {
    60.0 * sr as f32 / (lag as f32 * hop_length as f32)
}

struct Cluster {
    base_bpm: f32,
    votes: u32,
    members: Vec<(f32, u32)>,
}

/// Estimates the dominant tempo of an onset strength envelope.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] if `bpm_min >= bpm_max` or
/// either bound is non-positive.
pub fn estimate_bpm(onset_env: &[f32], sr: u32, config: &BpmConfig) -> AnalysisResult<BpmEstimate> {
    if config.bpm_min <= 0.0 || config.bpm_max <= 0.0 || config.bpm_min >= config.bpm_max {
        return Err(AnalysisError::invalid_parameter(
            "bpm_min/bpm_max",
            "bpm_min must be positive and less than bpm_max",
        ));
    }
    if onset_env.len() < 2 {
        warn!("onset envelope too short for autocorrelation, falling back to start_bpm");
        return Ok(BpmEstimate {
            bpm: config.start_bpm,
            confidence: 0.0,
        });
    }

    let max_lag = bpm_to_lag(config.bpm_min, sr, config.hop_length);
    let autocorr = autocorrelate(onset_env, max_lag);

    let min_lag = bpm_to_lag(config.bpm_max, sr, config.hop_length).max(1);
    let max_lag_search = bpm_to_lag(config.bpm_min, sr, config.hop_length).min(autocorr.len() - 1);

    // local maxima -> weighted candidate multiset
    let mut weighted: Vec<(f32, f32)> = Vec::new(); // (bpm, weight)
    for lag in min_lag..=max_lag_search {
        if lag == 0 || lag >= autocorr.len() - 1 {
            continue;
        }
        if autocorr[lag] > autocorr[lag - 1] && autocorr[lag] >= autocorr[lag + 1] && autocorr[lag] > 0.0 {
            let bpm = lag_to_bpm(lag, sr, config.hop_length);
            weighted.push((bpm, autocorr[lag]));
        }
    }

    if weighted.is_empty() {
        warn!("no autocorrelation peaks found in the configured bpm range, falling back to start_bpm");
        return Ok(BpmEstimate {
            bpm: config.start_bpm,
            confidence: 0.0,
        });
    }

    // histogram: bin width 0.5 BPM, repeat each candidate round(weight*100) times
    let mut histogram: std::collections::BTreeMap<i64, u32> = std::collections::BTreeMap::new();
    for (bpm, weight) in &weighted {
        let bin = (bpm / HISTOGRAM_BIN_WIDTH).round() as i64;
        let repeats = (weight * 100.0).round().max(1.0) as u32;
        *histogram.entry(bin).or_insert(0) += repeats;
    }

    let mut bins: Vec<(f32, u32)> = histogram
        .into_iter()
        .map(|(bin, votes)| (bin as f32 * HISTOGRAM_BIN_WIDTH, votes))
        .collect();
    bins.sort_by(|a, b| b.1.cmp(&a.1));
    bins.truncate(TOP_K_BINS);

    // harmonic clustering
    let mut clusters: Vec<Cluster> = Vec::new();
    for (bpm, votes) in bins {
        let existing = clusters.iter_mut().find(|c| {
            HARMONIC_RATIOS.iter().any(|&r| {
                let ratio = bpm / c.base_bpm;
                (ratio - r).abs() < HARMONIC_EPSILON || (ratio - 1.0 / r).abs() < HARMONIC_EPSILON
            })
        });
        match existing {
            Some(cluster) => {
                cluster.votes += votes;
                cluster.members.push((bpm, votes));
            }
            None => clusters.push(Cluster {
                base_bpm: bpm,
                votes,
                members: vec![(bpm, votes)],
            }),
        }
    }

    let total_votes: u32 = clusters.iter().map(|c| c.votes).sum::<u32>().max(1);

    let base_idx = clusters
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| c.votes)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let base_bpm = clusters[base_idx].base_bpm;

    // strictly-higher-bpm cluster override
    if let Some(higher) = clusters
        .iter()
        .filter(|c| c.base_bpm > base_bpm)
        .find(|c| c.votes as f32 / total_votes as f32 >= HIGHER_CLUSTER_OVERRIDE_FRACTION)
    {
        return Ok(BpmEstimate {
            bpm: higher.base_bpm,
            confidence: higher.votes as f32 / total_votes as f32,
        });
    }

    let base = &clusters[base_idx];
    let peak_votes = base.members.iter().map(|&(_, v)| v).max().unwrap_or(1) as f32;

    let chosen_bpm = pick_in_range(base, peak_votes, PREFERRED_RANGE, PREFERRED_VOTE_FRACTION)
        .or_else(|| pick_in_range(base, peak_votes, FALLBACK_RANGE, FALLBACK_VOTE_FRACTION))
        .unwrap_or_else(|| {
            base.members
                .iter()
                .max_by_key(|&&(_, v)| v)
                .map(|&(bpm, _)| bpm)
                .unwrap_or(base.base_bpm)
        });

    Ok(BpmEstimate {
        bpm: chosen_bpm,
        confidence: base.votes as f32 / total_votes as f32,
    })
}

fn pick_in_range(cluster: &Cluster, peak_votes: f32, range: (f32, f32), fraction: f32) -> Option<f32> {
    cluster
        .members
        .iter()
        .filter(|&&(bpm, votes)| {
            bpm >= range.0 && bpm <= range.1 && votes as f32 >= fraction * peak_votes
        })
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
        .map(|&(bpm, _)| bpm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_onset_env(sr: u32, hop_length: usize, bpm: f32, duration_secs: f32) -> Vec<f32> {
        let n_frames = (duration_secs * sr as f32 / hop_length as f32) as usize;
        let period_frames = (60.0 * sr as f32 / (bpm * hop_length as f32)).round() as usize;
        (0..n_frames)
            .map(|i| if period_frames > 0 && i % period_frames == 0 { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn rejects_invalid_range() {
        let config = BpmConfig {
            bpm_min: 150.0,
            bpm_max: 100.0,
            ..BpmConfig::default()
        };
        assert!(estimate_bpm(&[0.0; 100], 22050, &config).is_err());
    }

    #[test]
    fn recovers_120bpm_click_track_within_tolerance_or_harmonic() {
        let sr = 22050;
        let hop = 512;
        let env = click_onset_env(sr, hop, 120.0, 4.0);
        let config = BpmConfig {
            hop_length: hop,
            ..BpmConfig::default()
        };
        let estimate = estimate_bpm(&env, sr, &config).unwrap();
        let in_range = |lo: f32, hi: f32| estimate.bpm >= lo && estimate.bpm <= hi;
        assert!(
            in_range(114.0, 126.0) || in_range(57.0, 63.0) || in_range(228.0, 252.0),
            "bpm = {}",
            estimate.bpm
        );
    }
}
