//! Mel scale conversions, mel filterbank construction, and `MelSpectrogram`.

use ndarray::Array2;

use crate::config::{MelFilterConfig, MelNorm};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::spectrogram::Spectrogram;

const SLANEY_BREAK_HZ: f64 = 1000.0;
const SLANEY_BREAK_MEL: f64 = SLANEY_BREAK_HZ / (200.0 / 3.0);
const SLANEY_LOG_STEP: f64 = 27.0 / 6.4_f64.ln();

#[must_use]
pub fn hz_to_mel(hz: f64, htk: bool) -> f64 {
    if htk {
        return 2595.0 * (1.0 + hz / 700.0).log10();
    }
    if hz < SLANEY_BREAK_HZ {
        hz / (200.0 / 3.0)
    } else {
        SLANEY_BREAK_MEL + (hz / SLANEY_BREAK_HZ).ln() * SLANEY_LOG_STEP
    }
}

#[must_use]
pub fn mel_to_hz(mel: f64, htk: bool) -> f64 {
    if htk {
        return 700.0 * (10f64.powf(mel / 2595.0) - 1.0);
    }
    if mel < SLANEY_BREAK_MEL {
        mel * (200.0 / 3.0)
    } else {
        SLANEY_BREAK_HZ * ((mel - SLANEY_BREAK_MEL) / SLANEY_LOG_STEP).exp()
    }
}

/// Row-major `[n_mels x n_bins]` triangular filterbank.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] if `fmax > sr / 2` or
/// `n_mels == 0`.
pub fn mel_filterbank(sr: u32, n_fft: usize, config: &MelFilterConfig) -> AnalysisResult<Array2<f32>> {
    if config.n_mels == 0 {
        return Err(AnalysisError::invalid_parameter(
            "n_mels",
            "must be positive",
        ));
    }
    let nyquist = f64::from(sr) / 2.0;
    let fmax = if config.fmax <= 0.0 {
        nyquist
    } else {
        config.fmax
    };
    if fmax > nyquist + 1e-6 {
        return Err(AnalysisError::invalid_parameter(
            "fmax",
            "must not exceed sr / 2",
        ));
    }

    let n_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|b| b as f64 * f64::from(sr) / n_fft as f64)
        .collect();

    let mel_min = hz_to_mel(config.fmin, config.htk);
    let mel_max = hz_to_mel(fmax, config.htk);
    let mel_points: Vec<f64> = (0..config.n_mels + 2)
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (config.n_mels + 1) as f64)
        .collect();
    let hz_points: Vec<f64> = mel_points.iter().map(|&m| mel_to_hz(m, config.htk)).collect();

    let mut filterbank = Array2::zeros((config.n_mels, n_bins));
    for m in 0..config.n_mels {
        let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
        for (b, &freq) in fft_freqs.iter().enumerate() {
            let weight = if freq <= left || freq >= right {
                0.0
            } else if freq <= center {
                (freq - left) / (center - left).max(1e-12)
            } else {
                (right - freq) / (right - center).max(1e-12)
            };
            filterbank[[m, b]] = weight as f32;
        }

        if matches!(config.norm, MelNorm::Slaney) {
            let enorm = 2.0 / (right - left).max(1e-12);
            for b in 0..n_bins {
                filterbank[[m, b]] *= enorm as f32;
            }
        }
    }

    Ok(filterbank)
}

/// Non-negative `[n_mels x n_frames]` power mel spectrogram.
#[derive(Debug, Clone)]
pub struct MelSpectrogram {
    values: Array2<f32>,
    sr: u32,
    hop_length: usize,
    n_mels: usize,
}

impl MelSpectrogram {
    /// # Errors
    ///
    /// Propagates [`mel_filterbank`] errors.
    pub fn from_spectrogram(spec: &Spectrogram, config: &MelFilterConfig) -> AnalysisResult<Self> {
        let filterbank = mel_filterbank(spec.sample_rate(), spec.n_fft(), config)?;
        let values = filterbank.dot(spec.power());
        Ok(Self {
            values,
            sr: spec.sample_rate(),
            hop_length: spec.hop_length(),
            n_mels: config.n_mels,
        })
    }

    #[must_use]
    #[inline]
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    #[must_use]
    #[inline]
    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    #[must_use]
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.values.ncols()
    }

    #[must_use]
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sr
    }

    #[must_use]
    #[inline]
    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Log-power mel with clamping to avoid `log(0)`.
    #[must_use]
    pub fn log_power(&self) -> Array2<f32> {
        self.values.mapv(|x| x.max(1e-10).ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StftConfig;
    use std::f32::consts::PI;

    #[test]
    fn mel_hz_round_trip_slaney() {
        for hz in [20.0_f64, 100.0, 440.0, 1000.0, 4000.0, 18000.0] {
            let back = mel_to_hz(hz_to_mel(hz, false), false);
            assert!((back - hz).abs() < 0.1, "{back} !~= {hz}");
        }
    }

    #[test]
    fn mel_hz_round_trip_htk() {
        for hz in [20.0_f64, 440.0, 4000.0, 18000.0] {
            let back = mel_to_hz(hz_to_mel(hz, true), true);
            assert!((back - hz).abs() < 0.1, "{back} !~= {hz}");
        }
    }

    #[test]
    fn filterbank_rows_are_nonnegative_and_nonzero() {
        let fb = mel_filterbank(22050, 2048, &MelFilterConfig::default()).unwrap();
        for row in fb.rows() {
            assert!(row.iter().all(|&v| v >= 0.0));
            assert!(row.iter().any(|&v| v > 0.0));
        }
    }

    #[test]
    fn filterbank_rejects_fmax_above_nyquist() {
        let config = MelFilterConfig {
            fmax: 20_000.0,
            ..Default::default()
        };
        assert!(mel_filterbank(22050, 2048, &config).is_err());
    }

    #[test]
    fn mel_spectrogram_is_nonnegative() {
        let sr = 22050u32;
        let sig: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let stft_cfg = StftConfig::default();
        let spec = Spectrogram::new(&sig, &stft_cfg).unwrap().with_sample_rate(sr);
        let mel = MelSpectrogram::from_spectrogram(&spec, &MelFilterConfig::default()).unwrap();
        assert!(mel.values().iter().all(|&v| v >= 0.0));
    }
}
