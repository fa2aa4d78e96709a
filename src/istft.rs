//! Inverse STFT via overlap-add.

use ndarray::Array2;
use rustfft::num_complex::Complex32;

use crate::config::StftConfig;
use crate::primitives::fft::irfft;
use crate::primitives::window::window;

/// Overlap-add reconstruction of a complex STFT (shape `[n_bins x
/// n_frames]`) back to a time-domain signal.
///
/// Each frame is inverse-transformed and re-windowed (analysis == synthesis
/// window), accumulated into a running buffer alongside the window-squared
/// envelope; the final signal divides by that envelope (guarded by a small
/// epsilon) to compensate for the overlap, then trims the `center` padding.
/// If `target_length` is given the result is truncated or zero-padded to
/// match it.
#[must_use]
pub fn istft(
    bins: &Array2<Complex32>,
    config: &StftConfig,
    target_length: Option<usize>,
) -> Vec<f32> {
    let n_bins = bins.nrows();
    let n_frames = bins.ncols();
    let n_fft = config.n_fft;
    let hop = config.hop_length;
    let win_length = config.effective_win_length();
    let win = window(config.window, win_length, n_fft);

    if n_frames == 0 {
        return match target_length {
            Some(len) => vec![0.0; len],
            None => Vec::new(),
        };
    }

    let total_len = n_fft + hop * (n_frames - 1);
    let mut signal = vec![0.0f32; total_len];
    let mut envelope = vec![0.0f32; total_len];

    for t in 0..n_frames {
        let column: Vec<Complex32> = (0..n_bins).map(|b| bins[[b, t]]).collect();
        let frame = irfft(&column, n_fft);
        let start = t * hop;
        for (i, (&sample, &w)) in frame.iter().zip(win.iter()).enumerate() {
            signal[start + i] += sample * w;
            envelope[start + i] += w * w;
        }
    }

    for (s, e) in signal.iter_mut().zip(envelope.iter()) {
        *s /= e.max(1e-10);
    }

    let trimmed = if config.center {
        let pad = n_fft / 2;
        if signal.len() > 2 * pad {
            signal[pad..signal.len() - pad].to_vec()
        } else {
            Vec::new()
        }
    } else {
        signal
    };

    match target_length {
        Some(len) => {
            let mut out = trimmed;
            out.resize(len, 0.0);
            out
        }
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrogram::Spectrogram;
    use std::f32::consts::PI;

    #[test]
    fn stft_then_istft_recovers_a_sine_with_good_snr() {
        let sr = 22050usize;
        let signal: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let cfg = StftConfig::default();
        let spec = Spectrogram::new(&signal, &cfg).unwrap();
        let reconstructed = istft(spec.bins(), &cfg, Some(signal.len()));

        let skip = cfg.n_fft;
        let signal_power: f32 = signal[skip..signal.len() - skip]
            .iter()
            .map(|x| x * x)
            .sum();
        let noise_power: f32 = signal[skip..signal.len() - skip]
            .iter()
            .zip(reconstructed[skip..signal.len() - skip].iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        let snr_db = 10.0 * (signal_power / noise_power.max(1e-12)).log10();
        assert!(snr_db >= 20.0, "SNR was {snr_db} dB");
    }

    #[test]
    fn target_length_pads_or_truncates() {
        let cfg = StftConfig::default();
        let signal: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.001).sin()).collect();
        let spec = Spectrogram::new(&signal, &cfg).unwrap();
        let out = istft(spec.bins(), &cfg, Some(10_000));
        assert_eq!(out.len(), 10_000);
    }
}
