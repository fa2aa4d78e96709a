//! Harmonic/percussive (and residual) source separation via median-filtered
//! masks on the magnitude spectrogram, applied to the complex STFT.

use ndarray::Array2;
use num_complex::Complex32;

use crate::config::{HpssConfig, StftConfig};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::istft::istft;
use crate::primitives::SlidingMedian;
use crate::spectrogram::Spectrogram;

fn median_of(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median filter along the time axis (per frequency bin), matching the
/// horizontal smoothing used to enhance harmonic (tonal, time-stable)
/// content.
fn median_filter_horizontal(magnitude: &Array2<f32>, kernel_size: usize) -> Array2<f32> {
    let (n_bins, n_frames) = magnitude.dim();
    let half = kernel_size / 2;
    let mut out = Array2::zeros((n_bins, n_frames));

    for k in 0..n_bins {
        let row = magnitude.row(k);
        for t in 0..half.min(n_frames) {
            let end = (t + half + 1).min(n_frames);
            out[[k, t]] = median_of(&row.as_slice().unwrap()[0..end]);
        }
        if n_frames > 2 * half {
            let mut sm = SlidingMedian::new();
            for &v in &row.as_slice().unwrap()[0..kernel_size] {
                sm.insert(v);
            }
            out[[k, half]] = sm.median();
            for t in (half + 1)..(n_frames - half) {
                sm.erase(row[t - half - 1]);
                sm.insert(row[t + half]);
                out[[k, t]] = sm.median();
            }
        }
        for t in half.max(n_frames.saturating_sub(half))..n_frames {
            let start = t.saturating_sub(half);
            out[[k, t]] = median_of(&row.as_slice().unwrap()[start..n_frames]);
        }
    }
    out
}

/// Median filter along the frequency axis (per time frame), matching the
/// vertical smoothing used to enhance percussive (broadband, transient)
/// content.
fn median_filter_vertical(magnitude: &Array2<f32>, kernel_size: usize) -> Array2<f32> {
    let (n_bins, n_frames) = magnitude.dim();
    let half = kernel_size / 2;
    let mut out = Array2::zeros((n_bins, n_frames));

    for t in 0..n_frames {
        let col = magnitude.column(t);
        for k in 0..half.min(n_bins) {
            let end = (k + half + 1).min(n_bins);
            let window: Vec<f32> = (0..end).map(|kk| col[kk]).collect();
            out[[k, t]] = median_of(&window);
        }
        if n_bins > 2 * half {
            let mut sm = SlidingMedian::new();
            for k in 0..kernel_size {
                sm.insert(col[k]);
            }
            out[[half, t]] = sm.median();
            for k in (half + 1)..(n_bins - half) {
                sm.erase(col[k - half - 1]);
                sm.insert(col[k + half]);
                out[[k, t]] = sm.median();
            }
        }
        for k in half.max(n_bins.saturating_sub(half))..n_bins {
            let start = k.saturating_sub(half);
            let window: Vec<f32> = (start..n_bins).map(|kk| col[kk]).collect();
            out[[k, t]] = median_of(&window);
        }
    }
    out
}

/// Harmonic/percussive pair, still in the spectral domain.
#[derive(Debug, Clone)]
pub struct HpssSpectrogramResult {
    pub harmonic: Array2<Complex32>,
    pub percussive: Array2<Complex32>,
}

/// Harmonic/percussive/residual triple, still in the spectral domain.
#[derive(Debug, Clone)]
pub struct HpssSpectrogramResultWithResidual {
    pub harmonic: Array2<Complex32>,
    pub percussive: Array2<Complex32>,
    pub residual: Array2<Complex32>,
}

fn masks(spec: &Spectrogram, config: &HpssConfig) -> (Array2<f32>, Array2<f32>) {
    let harmonic_enhanced = median_filter_horizontal(spec.magnitude(), config.kernel_size_harmonic);
    let percussive_enhanced = median_filter_vertical(spec.magnitude(), config.kernel_size_percussive);

    let eps = 1e-10f32;
    let h = harmonic_enhanced.mapv(|v| v.powf(config.power));
    let p = percussive_enhanced.mapv(|v| v.powf(config.power));

    if config.use_soft_mask {
        let h_margin = &h * config.margin_harmonic;
        let p_margin = &p * config.margin_percussive;
        let total = &h_margin + &p_margin + eps;
        (&h_margin / &total, &p_margin / &total)
    } else {
        let mut harmonic_mask = Array2::zeros(h.dim());
        let mut percussive_mask = Array2::zeros(h.dim());
        ndarray::Zip::from(&mut harmonic_mask)
            .and(&mut percussive_mask)
            .and(&h)
            .and(&p)
            .for_each(|hm, pm, &hv, &pv| {
                if hv >= pv {
                    *hm = 1.0;
                } else {
                    *pm = 1.0;
                }
            });
        (harmonic_mask, percussive_mask)
    }
}

/// Splits a spectrogram into harmonic and percussive complex spectra.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] if `spec` has no frames.
pub fn hpss(spec: &Spectrogram, config: &HpssConfig) -> AnalysisResult<HpssSpectrogramResult> {
    if spec.n_frames() == 0 {
        return Err(AnalysisError::invalid_parameter(
            "spec",
            "must have at least one frame",
        ));
    }
    let (harmonic_mask, percussive_mask) = masks(spec, config);
    let harmonic = spec.bins() * harmonic_mask.mapv(Complex32::from);
    let percussive = spec.bins() * percussive_mask.mapv(Complex32::from);
    Ok(HpssSpectrogramResult { harmonic, percussive })
}

/// Splits a spectrogram into harmonic, percussive, and residual complex
/// spectra (the residual catches bins where neither source dominates).
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] if `spec` has no frames.
pub fn hpss_with_residual(
    spec: &Spectrogram,
    config: &HpssConfig,
) -> AnalysisResult<HpssSpectrogramResultWithResidual> {
    if spec.n_frames() == 0 {
        return Err(AnalysisError::invalid_parameter(
            "spec",
            "must have at least one frame",
        ));
    }
    let harmonic_enhanced = median_filter_horizontal(spec.magnitude(), config.kernel_size_harmonic);
    let percussive_enhanced = median_filter_vertical(spec.magnitude(), config.kernel_size_percussive);
    let eps = 1e-10f32;
    let h = harmonic_enhanced.mapv(|v| v.powf(config.power));
    let p = percussive_enhanced.mapv(|v| v.powf(config.power));

    let mut harmonic_mask = Array2::zeros(h.dim());
    let mut percussive_mask = Array2::zeros(h.dim());
    let mut residual_mask = Array2::zeros(h.dim());

    if config.use_soft_mask {
        ndarray::Zip::from(&mut harmonic_mask)
            .and(&mut percussive_mask)
            .and(&mut residual_mask)
            .and(&h)
            .and(&p)
            .for_each(|hm, pm, rm, &hv, &pv| {
                let h_margin = hv * config.margin_harmonic;
                let p_margin = pv * config.margin_percussive;
                let sum = h_margin + p_margin;
                if sum < 1.0 {
                    let residual = 1.0 - sum;
                    let total = sum + residual;
                    *hm = h_margin / total;
                    *pm = p_margin / total;
                    *rm = residual / total;
                } else {
                    let total = sum + eps;
                    *hm = h_margin / total;
                    *pm = p_margin / total;
                    *rm = 0.0;
                }
            });
    } else {
        ndarray::Zip::from(&mut harmonic_mask)
            .and(&mut percussive_mask)
            .and(&mut residual_mask)
            .and(&h)
            .and(&p)
            .for_each(|hm, pm, rm, &hv, &pv| {
                let ratio = (hv + eps) / (pv + eps);
                if ratio > 2.0 {
                    *hm = 1.0;
                } else if ratio < 0.5 {
                    *pm = 1.0;
                } else {
                    *rm = 1.0;
                }
            });
    }

    let harmonic = spec.bins() * harmonic_mask.mapv(Complex32::from);
    let percussive = spec.bins() * percussive_mask.mapv(Complex32::from);
    let residual = spec.bins() * residual_mask.mapv(Complex32::from);
    Ok(HpssSpectrogramResultWithResidual {
        harmonic,
        percussive,
        residual,
    })
}

/// Runs [`hpss`] and resynthesizes both components to the time domain.
///
/// # Errors
///
/// Propagates [`hpss`] errors.
pub fn hpss_audio(
    signal: &[f32],
    stft_config: &StftConfig,
    config: &HpssConfig,
) -> AnalysisResult<(Vec<f32>, Vec<f32>)> {
    let spec = Spectrogram::new(signal, stft_config)?;
    let result = hpss(&spec, config)?;
    let len = Some(signal.len());
    Ok((
        istft(&result.harmonic, stft_config, len),
        istft(&result.percussive, stft_config, len),
    ))
}

/// Convenience wrapper returning just the harmonic component as audio.
///
/// # Errors
///
/// Propagates [`hpss_audio`] errors.
pub fn harmonic(signal: &[f32], stft_config: &StftConfig, config: &HpssConfig) -> AnalysisResult<Vec<f32>> {
    Ok(hpss_audio(signal, stft_config, config)?.0)
}

/// Convenience wrapper returning just the percussive component as audio.
///
/// # Errors
///
/// Propagates [`hpss_audio`] errors.
pub fn percussive(signal: &[f32], stft_config: &StftConfig, config: &HpssConfig) -> AnalysisResult<Vec<f32>> {
    Ok(hpss_audio(signal, stft_config, config)?.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone_plus_click(sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let tone = (2.0 * PI * 440.0 * i as f32 / sr as f32).sin();
                let click = if i % 4410 == 0 { 0.8 } else { 0.0 };
                tone + click
            })
            .collect()
    }

    #[test]
    fn harmonic_and_percussive_masks_sum_to_roughly_one() {
        let sr = 22050u32;
        let sig = tone_plus_click(sr, sr as usize);
        let stft_config = StftConfig::default();
        let spec = Spectrogram::new(&sig, &stft_config).unwrap();
        let config = HpssConfig::default();
        let (h, p) = masks(&spec, &config);
        let total = &h + &p;
        for &v in total.iter() {
            assert!((v - 1.0).abs() < 1e-3, "{v}");
        }
    }

    #[test]
    fn rejects_empty_spectrogram() {
        let spec = Spectrogram::new(&[], &StftConfig::default());
        assert!(spec.is_err() || hpss(&spec.unwrap(), &HpssConfig::default()).is_err());
    }

    #[test]
    fn residual_split_masks_sum_to_one() {
        let sr = 22050u32;
        let sig = tone_plus_click(sr, sr as usize);
        let stft_config = StftConfig::default();
        let spec = Spectrogram::new(&sig, &stft_config).unwrap();
        let result = hpss_with_residual(&spec, &HpssConfig::default()).unwrap();
        assert_eq!(result.harmonic.dim(), spec.bins().dim());
    }
}
