//! MFCC and delta features, built on top of log-power mel and the DCT-II
//! primitive.

use std::f32::consts::PI;

use ndarray::Array2;

use crate::mel::MelSpectrogram;
use crate::primitives::dct::DctPlanner;

/// `[n_mfcc x n_frames]` MFCCs: DCT-II of dB-clipped log-power mel,
/// keeping the first `n_mfcc` coefficients, with an optional sinusoidal
/// lifter applied to coefficient `k`: `1 + (L/2) * sin(pi*k/L)`.
#[must_use]
pub fn mfcc(mel: &MelSpectrogram, n_mfcc: usize, lifter: Option<f32>) -> Array2<f32> {
    let max_db = -80.0_f32;
    let log_db = mel.values().mapv(|x| {
        let db = 10.0 * x.max(1e-10).log10();
        db.max(max_db - 80.0)
    });

    let planner = DctPlanner::new();
    let n_frames = log_db.ncols();
    let mut out = Array2::zeros((n_mfcc, n_frames));
    for t in 0..n_frames {
        let column: Vec<f32> = log_db.column(t).to_vec();
        let coeffs = planner.transform(&column, n_mfcc);
        for (k, c) in coeffs.into_iter().enumerate() {
            out[[k, t]] = c;
        }
    }

    if let Some(l) = lifter {
        if l > 0.0 {
            for k in 0..n_mfcc {
                let factor = 1.0 + (l / 2.0) * (PI * k as f32 / l).sin();
                for t in 0..n_frames {
                    out[[k, t]] *= factor;
                }
            }
        }
    }

    out
}

/// Centered first-derivative estimator over an odd-length window:
/// `delta[t] = sum_{i=1..=w}(i * (x[t+i] - x[t-i])) / (2 * sum i^2)`, with
/// edges clamped to the nearest valid index.
#[must_use]
pub fn delta(features: &Array2<f32>, width: usize) -> Array2<f32> {
    let w = width / 2;
    let denom: f32 = 2.0 * (1..=w).map(|i| (i * i) as f32).sum::<f32>();
    let n_frames = features.ncols();
    let mut out = Array2::zeros(features.raw_dim());

    if denom <= 0.0 || n_frames == 0 {
        return out;
    }

    for row in 0..features.nrows() {
        for t in 0..n_frames {
            let mut acc = 0.0f32;
            for i in 1..=w {
                let hi = (t + i).min(n_frames - 1);
                let lo = t.saturating_sub(i);
                acc += i as f32 * (features[[row, hi]] - features[[row, lo]]);
            }
            out[[row, t]] = acc / denom;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MelFilterConfig, StftConfig};
    use crate::spectrogram::Spectrogram;
    use std::f32::consts::PI as PIF;

    #[test]
    fn mfcc_has_expected_shape() {
        let sr = 22050u32;
        let sig: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PIF * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let spec = Spectrogram::new(&sig, &StftConfig::default())
            .unwrap()
            .with_sample_rate(sr);
        let mel = MelSpectrogram::from_spectrogram(&spec, &MelFilterConfig::default()).unwrap();
        let coeffs = mfcc(&mel, 13, Some(22.0));
        assert_eq!(coeffs.nrows(), 13);
        assert_eq!(coeffs.ncols(), mel.n_frames());
    }

    #[test]
    fn delta_of_constant_signal_is_zero() {
        let features = Array2::from_elem((4, 20), 1.0f32);
        let d = delta(&features, 9);
        for v in d.iter() {
            assert!(v.abs() < 1e-6);
        }
    }

    #[test]
    fn delta_of_ramp_is_roughly_constant_slope() {
        let mut features = Array2::zeros((1, 50));
        for t in 0..50 {
            features[[0, t]] = t as f32;
        }
        let d = delta(&features, 9);
        for t in 10..40 {
            assert!((d[[0, t]] - 1.0).abs() < 0.05, "{}", d[[0, t]]);
        }
    }
}
