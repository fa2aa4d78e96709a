//! Griffin-Lim magnitude-only phase reconstruction.

use ndarray::Array2;
use rustfft::num_complex::Complex32;

use crate::config::StftConfig;
use crate::istft::istft;
use crate::primitives::fft::rfft;
use crate::primitives::window::window;

const DEFAULT_ITERATIONS: usize = 32;
const DEFAULT_MOMENTUM: f32 = 0.99;

/// Recovers a time-domain signal whose STFT magnitude approximates the
/// given target magnitude matrix (shape `[n_bins x n_frames]`).
///
/// Starts from a zero-phase complex spectrum, then iterates
/// `iSTFT -> STFT`, replacing the resulting magnitude with the target while
/// keeping the phase, with momentum acceleration: `Y = current +
/// momentum * (current - previous)` before the magnitude is reimposed.
#[must_use]
pub fn griffin_lim(target_magnitude: &Array2<f32>, config: &StftConfig) -> Vec<f32> {
    griffin_lim_with(target_magnitude, config, DEFAULT_ITERATIONS, DEFAULT_MOMENTUM)
}

#[must_use]
pub fn griffin_lim_with(
    target_magnitude: &Array2<f32>,
    config: &StftConfig,
    iterations: usize,
    momentum: f32,
) -> Vec<f32> {
    let n_frames = target_magnitude.ncols();
    if n_frames == 0 {
        return Vec::new();
    }

    let target_length = config.n_fft + config.hop_length * (n_frames - 1);

    let mut current = target_magnitude.mapv(|m| Complex32::new(m, 0.0));
    let mut previous = current.clone();

    for _ in 0..iterations {
        let signal = istft(&current, config, Some(target_length));
        let rebuilt = forward_stft(&signal, config, n_frames);

        let accelerated = &rebuilt + &(&rebuilt - &previous) * momentum;
        previous = rebuilt;

        current = impose_magnitude(&accelerated, target_magnitude);
    }

    istft(&current, config, Some(target_length))
}

fn forward_stft(signal: &[f32], config: &StftConfig, n_frames: usize) -> Array2<Complex32> {
    let win_length = config.effective_win_length();
    let win = window(config.window, win_length, config.n_fft);
    let n_bins = config.n_fft / 2 + 1;
    let mut bins = Array2::from_elem((n_bins, n_frames), Complex32::new(0.0, 0.0));

    for (t, frame) in signal
        .windows(config.n_fft)
        .step_by(config.hop_length)
        .enumerate()
        .take(n_frames)
    {
        let windowed: Vec<f32> = frame.iter().zip(win.iter()).map(|(&x, &w)| x * w).collect();
        for (bin, value) in rfft(&windowed).into_iter().enumerate() {
            bins[[bin, t]] = value;
        }
    }
    bins
}

fn impose_magnitude(
    spectrum: &Array2<Complex32>,
    target_magnitude: &Array2<f32>,
) -> Array2<Complex32> {
    let mut out = spectrum.clone();
    for (value, &target) in out.iter_mut().zip(target_magnitude.iter()) {
        let phase = if value.norm() > 1e-12 {
            *value / value.norm()
        } else {
            Complex32::new(1.0, 0.0)
        };
        *value = phase * target;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrogram::Spectrogram;
    use std::f32::consts::PI;

    #[test]
    fn reconstructs_a_signal_whose_magnitude_matches_the_target() {
        let sr = 22050usize;
        let signal: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let cfg = StftConfig::default();
        let spec = Spectrogram::new(&signal, &cfg).unwrap();
        let target = spec.magnitude().clone();

        let reconstructed = griffin_lim(&target, &cfg);
        let reconstructed_spec = Spectrogram::new(&reconstructed, &cfg).unwrap();

        // Griffin-Lim is only asked to match magnitude, not phase; compare
        // the total spectral energy rather than a sample-exact waveform.
        let target_energy: f32 = target.iter().map(|m| m * m).sum();
        let reconstructed_energy: f32 = reconstructed_spec.magnitude().iter().map(|m| m * m).sum();
        let ratio = reconstructed_energy / target_energy;
        assert!((0.5..2.0).contains(&ratio), "energy ratio {ratio}");
    }
}
