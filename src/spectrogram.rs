//! STFT and the `Spectrogram` type: the immutable, shape-`[n_bins x
//! n_frames]` complex time-frequency representation every L3 feature is
//! derived from.

use std::cell::OnceCell;

use ndarray::Array2;
use rustfft::num_complex::Complex32;

use crate::config::StftConfig;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::primitives::fft::rfft;
use crate::primitives::window::window;

fn reflect_pad(signal: &[f32], pad: usize) -> Vec<f32> {
    debug_assert!(pad < signal.len(), "padding is too large");
    let prefix = signal[1..=pad].iter().rev().copied();
    let suffix = signal[signal.len() - 1 - pad..signal.len() - 1]
        .iter()
        .rev()
        .copied();
    prefix.chain(signal.iter().copied()).chain(suffix).collect()
}

/// Complex short-time Fourier transform of an audio buffer, shape
/// `[n_bins x n_frames]` with `n_bins = n_fft / 2 + 1`.
///
/// Magnitude and power are lazily computed and cached on first access;
/// per the concurrency model, a single instance is not safe to read
/// concurrently while those caches are being filled in — each thread
/// should own its own `Spectrogram`.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    bins: Array2<Complex32>,
    n_fft: usize,
    hop_length: usize,
    sr: u32,
    magnitude: OnceCell<Array2<f32>>,
    power: OnceCell<Array2<f32>>,
}

impl Spectrogram {
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidParameter`] for a zero-length
    /// signal, non-positive `n_fft`/`hop_length`, or `win_length > n_fft`.
    pub fn new(signal: &[f32], config: &StftConfig) -> AnalysisResult<Self> {
        if signal.is_empty() {
            return Err(AnalysisError::invalid_parameter(
                "signal",
                "must not be empty",
            ));
        }
        if config.n_fft == 0 || config.hop_length == 0 {
            return Err(AnalysisError::invalid_parameter(
                "n_fft/hop_length",
                "must be positive",
            ));
        }
        let win_length = config.effective_win_length();
        if win_length > config.n_fft {
            return Err(AnalysisError::invalid_parameter(
                "win_length",
                "must not exceed n_fft",
            ));
        }

        let win = window(config.window, win_length, config.n_fft);

        let padded;
        let frame_source: &[f32] = if config.center {
            let pad = config.n_fft / 2;
            if signal.len() <= pad {
                return Err(AnalysisError::invalid_parameter(
                    "signal",
                    "too short to center-pad at this n_fft",
                ));
            }
            padded = reflect_pad(signal, pad);
            &padded
        } else {
            signal
        };

        let n_frames = if frame_source.len() >= config.n_fft {
            (frame_source.len() - config.n_fft) / config.hop_length + 1
        } else {
            0
        };
        let n_bins = config.n_fft / 2 + 1;
        let mut bins = Array2::from_elem((n_bins, n_frames), Complex32::new(0.0, 0.0));

        for (t, frame) in frame_source
            .windows(config.n_fft)
            .step_by(config.hop_length)
            .enumerate()
            .take(n_frames)
        {
            let windowed: Vec<f32> = frame.iter().zip(win.iter()).map(|(&x, &w)| x * w).collect();
            let spectrum = rfft(&windowed);
            for (bin, value) in spectrum.into_iter().enumerate() {
                bins[[bin, t]] = value;
            }
        }

        Ok(Self {
            bins,
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            sr: 0,
            magnitude: OnceCell::new(),
            power: OnceCell::new(),
        })
    }

    #[must_use]
    #[inline]
    pub fn with_sample_rate(mut self, sr: u32) -> Self {
        self.sr = sr;
        self
    }

    #[must_use]
    #[inline]
    pub fn bins(&self) -> &Array2<Complex32> {
        &self.bins
    }

    #[must_use]
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.bins.nrows()
    }

    #[must_use]
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.bins.ncols()
    }

    #[must_use]
    #[inline]
    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    #[must_use]
    #[inline]
    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    #[must_use]
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sr
    }

    #[must_use]
    pub fn magnitude(&self) -> &Array2<f32> {
        self.magnitude
            .get_or_init(|| self.bins.mapv(|c| c.norm()))
    }

    #[must_use]
    pub fn power(&self) -> &Array2<f32> {
        self.power.get_or_init(|| self.magnitude().mapv(|m| m * m))
    }

    /// `10 * log10(max(power / ref^2, amin))`.
    #[must_use]
    pub fn to_db(&self, reference: f32, amin: f32) -> Array2<f32> {
        let ref_sq = (reference * reference).max(1e-20);
        self.power()
            .mapv(|p| 10.0 * (p / ref_sq).max(amin).log10())
    }

    /// Frame index -> time in seconds: `frame * hop_length / sr`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frame_to_time(&self, frame: usize) -> f64 {
        (frame * self.hop_length) as f64 / f64::from(self.sr.max(1))
    }

    /// Time in seconds -> frame index, using the floor contract so
    /// `time_to_frame(frame_to_time(f)) == f`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn time_to_frame(&self, time: f64) -> usize {
        ((time * f64::from(self.sr.max(1))) / self.hop_length as f64).floor() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn power_equals_magnitude_squared() {
        let sig = sine(440.0, 22050, 22050);
        let spec = Spectrogram::new(&sig, &StftConfig::default()).unwrap();
        for (p, m) in spec.power().iter().zip(spec.magnitude().iter()) {
            assert!((p - m * m).abs() < 1e-5 * m * m + 1e-8);
        }
    }

    #[test]
    fn n_bins_matches_n_fft_over_two_plus_one() {
        let sig = sine(440.0, 22050, 22050);
        let cfg = StftConfig {
            n_fft: 1024,
            ..Default::default()
        };
        let spec = Spectrogram::new(&sig, &cfg).unwrap();
        assert_eq!(spec.n_bins(), 1024 / 2 + 1);
    }

    #[test]
    fn pure_tone_has_dominant_bin_near_frequency() {
        let sr = 22050u32;
        let sig = sine(440.0, sr, sr as usize);
        let cfg = StftConfig {
            n_fft: 2048,
            hop_length: 512,
            ..Default::default()
        };
        let spec = Spectrogram::new(&sig, &cfg).unwrap().with_sample_rate(sr);
        let mid_frame = spec.n_frames() / 2;
        let column = spec.magnitude().column(mid_frame);
        let (argmax, _) = column
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        let bin_hz = argmax as f32 * sr as f32 / cfg.n_fft as f32;
        assert!((bin_hz - 440.0).abs() < 50.0, "{bin_hz} !~= 440");
    }

    #[test]
    fn rejects_empty_signal() {
        assert!(Spectrogram::new(&[], &StftConfig::default()).is_err());
    }

    #[test]
    fn frame_time_round_trip_uses_floor_contract() {
        let sig = sine(440.0, 22050, 22050);
        let spec = Spectrogram::new(&sig, &StftConfig::default())
            .unwrap()
            .with_sample_rate(22050);
        for frame in [0usize, 1, 10, 43] {
            let t = spec.frame_to_time(frame);
            assert_eq!(spec.time_to_frame(t), frame);
        }
    }
}
