//! Loudness and dynamic-range summary: peak/RMS levels, crest factor, a
//! short-term loudness curve, and a simple compression heuristic.

use ndarray::Array1;
use ndarray_stats::{interpolate::Midpoint, Quantile1dExt};
use noisy_float::prelude::*;

use crate::config::DynamicsConfig;
use crate::errors::{AnalysisError, AnalysisResult};

const EPS: f32 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dynamics {
    pub dynamic_range_db: f32,
    pub peak_db: f32,
    pub rms_db: f32,
    pub crest_factor: f32,
    pub loudness_range_db: f32,
    pub is_compressed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LoudnessCurve {
    pub times: Vec<f64>,
    pub rms_db: Vec<f32>,
}

fn to_db(value: f32) -> f32 {
    20.0 * value.max(EPS).log10()
}

/// Computes the dynamics summary and loudness-over-time curve of a signal.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] for an empty signal.
pub fn analyze_dynamics(signal: &[f32], sr: u32, config: &DynamicsConfig) -> AnalysisResult<(Dynamics, LoudnessCurve)> {
    if signal.is_empty() {
        return Err(AnalysisError::invalid_parameter(
            "signal",
            "must not be empty",
        ));
    }

    let peak = signal.iter().map(|&x| x.abs()).fold(0.0f32, f32::max);
    let sum_sq: f64 = signal.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
    let rms = (sum_sq / signal.len() as f64).sqrt() as f32;

    let peak_db = to_db(peak);
    let rms_db = to_db(rms);
    let crest_factor = peak_db - rms_db;

    let window_samples = (f64::from(config.window_sec) * f64::from(sr)) as usize;
    let hop = config.hop_length.max(1);

    let mut times = Vec::new();
    let mut curve_db = Vec::new();
    if window_samples > 0 && window_samples <= signal.len() {
        let mut pos = 0;
        while pos + window_samples <= signal.len() {
            let window = &signal[pos..pos + window_samples];
            let sum_sq: f64 = window.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
            let win_rms = (sum_sq / window_samples as f64).sqrt() as f32;
            let time = (pos + window_samples / 2) as f64 / f64::from(sr.max(1));
            times.push(time);
            curve_db.push(to_db(win_rms));
            pos += hop;
        }
    }

    let dynamic_range_db = if curve_db.is_empty() {
        0.0
    } else {
        let mut values = Array1::from_vec(curve_db.iter().map(|&v| f64::from(v)).collect::<Vec<_>>());
        let p10 = values.clone().quantile_mut(n64(0.10), &Midpoint).unwrap_or(0.0);
        let p95 = values.quantile_mut(n64(0.95), &Midpoint).unwrap_or(0.0);
        (p95 - p10) as f32
    };

    let is_compressed = dynamic_range_db < config.compression_threshold || crest_factor < 8.0;

    let dynamics = Dynamics {
        dynamic_range_db,
        peak_db,
        rms_db,
        crest_factor,
        loudness_range_db: dynamic_range_db,
        is_compressed,
    };
    let curve = LoudnessCurve {
        times,
        rms_db: curve_db,
    };
    Ok((dynamics, curve))
}

/// Histogram of the loudness curve's RMS-dB values into `n_bins` buckets
/// spanning `[min_db, max_db]`, clamping out-of-range samples by discarding
/// them (matching the teacher's skip-out-of-range behavior).
#[must_use]
pub fn loudness_histogram(curve: &LoudnessCurve, n_bins: usize, min_db: f32, max_db: f32) -> Vec<u32> {
    let mut histogram = vec![0u32; n_bins];
    if n_bins == 0 {
        return histogram;
    }
    let bin_width = (max_db - min_db) / n_bins as f32;
    if bin_width <= 0.0 {
        return histogram;
    }
    for &value in &curve.rms_db {
        if value < min_db || value > max_db {
            continue;
        }
        let bin = (((value - min_db) / bin_width) as usize).min(n_bins - 1);
        histogram[bin] += 1;
    }
    histogram
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_has_floor_db_and_is_compressed() {
        let (dynamics, _) = analyze_dynamics(&vec![0.0f32; 22050], 22050, &DynamicsConfig::default()).unwrap();
        assert!(dynamics.peak_db <= -150.0);
        assert!(dynamics.is_compressed);
    }

    #[test]
    fn full_scale_sine_has_small_crest_factor() {
        let sr = 22050u32;
        let sig: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let (dynamics, _) = analyze_dynamics(&sig, sr, &DynamicsConfig::default()).unwrap();
        assert!(dynamics.crest_factor < 6.0, "{}", dynamics.crest_factor);
    }

    #[test]
    fn rejects_empty_signal() {
        assert!(analyze_dynamics(&[], 22050, &DynamicsConfig::default()).is_err());
    }

    #[test]
    fn histogram_sums_to_in_range_sample_count() {
        let curve = LoudnessCurve {
            times: vec![0.0, 1.0, 2.0],
            rms_db: vec![-10.0, -20.0, -200.0],
        };
        let hist = loudness_histogram(&curve, 10, -60.0, 0.0);
        assert_eq!(hist.iter().sum::<u32>(), 2);
    }
}
