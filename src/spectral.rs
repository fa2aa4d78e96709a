//! Per-frame scalar spectral features over a magnitude spectrogram, plus
//! the time-domain scalars (ZCR, RMS) the spec groups alongside them.

use ndarray::{Array1, Array2};
use ndarray_stats::{interpolate::Midpoint, Quantile1dExt};
use noisy_float::prelude::*;

use crate::spectrogram::Spectrogram;

#[must_use]
#[allow(clippy::cast_precision_loss)]
fn bin_frequencies(n_bins: usize, n_fft: usize, sr: u32) -> Vec<f32> {
    (0..n_bins)
        .map(|b| b as f32 * sr as f32 / n_fft as f32)
        .collect()
}

/// `sum(f * |X|) / sum(|X|)` per frame.
#[must_use]
pub fn spectral_centroid(spec: &Spectrogram) -> Vec<f32> {
    let freqs = bin_frequencies(spec.n_bins(), spec.n_fft(), spec.sample_rate());
    spec.magnitude()
        .columns()
        .into_iter()
        .map(|col| {
            let total: f32 = col.sum();
            if total <= 1e-12 {
                return 0.0;
            }
            col.iter().zip(freqs.iter()).map(|(&m, &f)| m * f).sum::<f32>() / total
        })
        .collect()
}

/// `(sum(|f - centroid|^p * |X|) / sum(|X|))^(1/p)` per frame, default `p=2`.
#[must_use]
pub fn spectral_bandwidth(spec: &Spectrogram, p: f32) -> Vec<f32> {
    let freqs = bin_frequencies(spec.n_bins(), spec.n_fft(), spec.sample_rate());
    let centroid = spectral_centroid(spec);
    spec.magnitude()
        .columns()
        .into_iter()
        .zip(centroid.iter())
        .map(|(col, &c)| {
            let total: f32 = col.sum();
            if total <= 1e-12 {
                return 0.0;
            }
            let acc: f32 = col
                .iter()
                .zip(freqs.iter())
                .map(|(&m, &f)| (f - c).abs().powf(p) * m)
                .sum();
            (acc / total).powf(1.0 / p)
        })
        .collect()
}

/// Smallest frequency such that cumulative energy >= `r` of total energy,
/// default `r=0.85`.
#[must_use]
pub fn spectral_rolloff(spec: &Spectrogram, r: f32) -> Vec<f32> {
    let freqs = bin_frequencies(spec.n_bins(), spec.n_fft(), spec.sample_rate());
    spec.power()
        .columns()
        .into_iter()
        .map(|col| {
            let total: f32 = col.sum();
            if total <= 1e-12 {
                return 0.0;
            }
            let threshold = r * total;
            let mut cumulative = 0.0f32;
            for (i, &p) in col.iter().enumerate() {
                cumulative += p;
                if cumulative >= threshold {
                    return freqs[i];
                }
            }
            *freqs.last().unwrap_or(&0.0)
        })
        .collect()
}

/// Geometric mean / arithmetic mean of the magnitude spectrum, per frame.
#[must_use]
pub fn spectral_flatness(spec: &Spectrogram) -> Vec<f32> {
    spec.magnitude()
        .columns()
        .into_iter()
        .map(|col| {
            let n = col.len();
            if n == 0 {
                return 0.0;
            }
            let arithmetic = col.sum() / n as f32;
            if arithmetic <= 1e-12 {
                return 0.0;
            }
            let log_sum: f32 = col.iter().map(|&m| m.max(1e-10).ln()).sum();
            let geometric = (log_sum / n as f32).exp();
            geometric / arithmetic
        })
        .collect()
}

/// `n_bands` octave-like bands (plus one residual "global log-mean" band).
/// Within each band: peak = top-quantile magnitude, valley = bottom-quantile
/// magnitude, reported as `log(peak) - log(valley)`. Returned row-major
/// `[n_bands + 1 x n_frames]`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn spectral_contrast(spec: &Spectrogram, n_bands: usize, quantile: f64) -> Array2<f32> {
    let n_bins = spec.n_bins();
    let n_frames = spec.n_frames();
    let mut out = Array2::zeros((n_bands + 1, n_frames));
    if n_bins == 0 || n_bands == 0 {
        return out;
    }

    // log-spaced band edges across the bin axis (bin 0 excluded, it's DC).
    let edges: Vec<usize> = (0..=n_bands)
        .map(|i| {
            let frac = i as f64 / n_bands as f64;
            (1.0 + (n_bins as f64 - 1.0).max(1.0).powf(frac)).min(n_bins as f64) as usize
        })
        .collect();

    for t in 0..n_frames {
        let column = spec.magnitude().column(t);
        for band in 0..n_bands {
            let lo = edges[band].max(1).min(n_bins);
            let hi = edges[band + 1].max(lo + 1).min(n_bins);
            let mut values: Array1<f64> = column.slice(ndarray::s![lo..hi]).mapv(f64::from);
            if values.is_empty() {
                continue;
            }
            let peak = values
                .clone()
                .quantile_mut(n64(1.0 - quantile), &Midpoint)
                .unwrap_or(0.0);
            let valley = values.quantile_mut(n64(quantile), &Midpoint).unwrap_or(0.0);
            out[[band, t]] = (peak.max(1e-10).ln() - valley.max(1e-10).ln()) as f32;
        }
        let residual_mean: f64 = column.iter().map(|&m| f64::from(m).max(1e-10).ln()).sum::<f64>()
            / column.len().max(1) as f64;
        out[[n_bands, t]] = residual_mean as f32;
    }

    out
}

/// Half-wave-rectified magnitude difference between consecutive frames,
/// summed across bins: `sum(max(0, |X[t]| - |X[t-1]|))`. Frame 0 has no
/// predecessor and is reported as `0`.
#[must_use]
pub fn spectral_flux(spec: &Spectrogram) -> Vec<f32> {
    let magnitude = spec.magnitude();
    let n_frames = magnitude.ncols();
    if n_frames == 0 {
        return Vec::new();
    }
    let mut flux = vec![0.0f32; n_frames];
    for t in 1..n_frames {
        let prev = magnitude.column(t - 1);
        let curr = magnitude.column(t);
        flux[t] = curr
            .iter()
            .zip(prev.iter())
            .map(|(&c, &p)| (c - p).max(0.0))
            .sum();
    }
    flux
}

/// Fraction of sign changes per frame, over a framed time-domain signal
/// (teacher's Essentia-style algorithm, generalized to arbitrary frames).
#[must_use]
pub fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    number_crossings(frame) as f32 / (frame.len() - 1) as f32
}

fn number_crossings(input: &[f32]) -> u32 {
    if input.is_empty() {
        return 0;
    }
    let mut crossings = 0;
    let mut was_positive = input[0] > 0.0;
    for &sample in input {
        let is_positive = sample > 0.0;
        if was_positive != is_positive {
            crossings += 1;
            was_positive = is_positive;
        }
    }
    crossings
}

/// `sqrt(mean(x^2))` per frame.
#[must_use]
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|&x| x * x).sum::<f32>() / frame.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StftConfig;
    use std::f32::consts::PI;

    #[test]
    fn pure_tone_centroid_is_near_its_frequency() {
        let sr = 22050u32;
        let sig: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let spec = Spectrogram::new(&sig, &StftConfig::default())
            .unwrap()
            .with_sample_rate(sr);
        let centroid = spectral_centroid(&spec);
        let mid = centroid[centroid.len() / 2];
        assert!((mid - 440.0).abs() / 440.0 < 0.2, "{mid}");
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0.0; 1024]), 0.0);
    }

    #[test]
    fn zcr_of_alternating_signal_is_high() {
        let frame: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(zero_crossing_rate(&frame) > 0.9);
    }

    #[test]
    fn flux_of_constant_spectrum_is_near_zero_after_first_frame() {
        let sr = 22050u32;
        let sig: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let spec = Spectrogram::new(&sig, &StftConfig::default()).unwrap();
        let flux = spectral_flux(&spec);
        assert_eq!(flux[0], 0.0);
        let mid = flux[flux.len() / 2];
        assert!(mid >= 0.0);
    }

    #[test]
    fn flatness_of_white_noise_like_flat_spectrum_is_near_one() {
        let flat = Array2::from_elem((100, 1), 1.0f32);
        // construct a throwaway spectrogram-equivalent via direct call path
        // isn't possible without a Spectrogram; instead validate analytically
        // that the geometric/arithmetic ratio of a uniform vector is 1.
        let col = flat.column(0);
        let n = col.len() as f32;
        let arithmetic = col.sum() / n;
        let geometric = (col.iter().map(|&m| m.max(1e-10).ln()).sum::<f32>() / n).exp();
        assert!((geometric / arithmetic - 1.0).abs() < 1e-4);
    }
}
