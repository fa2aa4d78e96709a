//! Phase-vocoder time-stretching, and pitch-shifting as time-stretch
//! composed with resampling.

use ndarray::Array2;
use num_complex::Complex32;

use crate::config::{PhaseVocoderConfig, StftConfig};
use crate::decoder::Resampler;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::istft::istft;
use crate::spectrogram::Spectrogram;

fn wrap_phase(phase: f32) -> f32 {
    if !phase.is_finite() {
        return 0.0;
    }
    let two_pi = 2.0 * std::f32::consts::PI;
    phase - two_pi * (phase / two_pi).round()
}

/// Per-bin instantaneous frequency estimate between two consecutive phase
/// frames, used to track true oscillation frequency past the `2*pi`
/// ambiguity of a raw phase difference.
#[must_use]
pub fn compute_instantaneous_frequency(phase: &[f32], prev_phase: &[f32], hop_length: usize, sample_rate: u32) -> Vec<f32> {
    let n_bins = phase.len();
    let time_step = hop_length as f32 / sample_rate as f32;
    (0..n_bins)
        .map(|k| {
            let bin_freq = k as f32 * sample_rate as f32 / ((n_bins - 1) * 2).max(1) as f32;
            let expected_advance = 2.0 * std::f32::consts::PI * bin_freq * time_step;
            let phase_diff = phase[k] - prev_phase[k];
            let deviation = wrap_phase(phase_diff - expected_advance);
            bin_freq + deviation / (2.0 * std::f32::consts::PI * time_step)
        })
        .collect()
}

/// Resamples a complex spectrogram along time by `rate` (>1 shortens,
/// <1 lengthens), preserving per-bin phase continuity via instantaneous
/// frequency tracking.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] for an empty spectrogram or
/// non-positive `rate`.
pub fn phase_vocoder(spec: &Spectrogram, rate: f32, config: &PhaseVocoderConfig) -> AnalysisResult<Array2<Complex32>> {
    if spec.n_frames() == 0 {
        return Err(AnalysisError::invalid_parameter(
            "spec",
            "must have at least one frame",
        ));
    }
    if rate <= 0.0 {
        return Err(AnalysisError::invalid_parameter("rate", "must be positive"));
    }

    let n_bins = spec.n_bins();
    let n_frames_in = spec.n_frames();
    let n_fft = spec.n_fft();
    let hop_length = if config.hop_length > 0 { config.hop_length } else { spec.hop_length() };
    let sample_rate = spec.sample_rate();

    let n_frames_out = ((n_frames_in as f32 / rate).ceil() as usize).max(1);
    let mut output = Array2::<Complex32>::zeros((n_bins, n_frames_out));
    let mut phase_acc = vec![0.0f32; n_bins];
    let time_step = hop_length as f32 / sample_rate.max(1) as f32;

    for t_out in 0..n_frames_out {
        let t_in_f = t_out as f32 * rate;
        let mut t_in = t_in_f as isize;
        let mut frac = t_in_f - t_in as f32;

        if t_in >= n_frames_in as isize - 1 {
            t_in = n_frames_in as isize - 2;
            frac = 1.0;
        }
        if t_in < 0 {
            t_in = 0;
            frac = 0.0;
        }
        let t_in = t_in as usize;
        let t_in1 = (t_in + 1).min(n_frames_in - 1);

        for k in 0..n_bins {
            let frame0 = spec.bins()[[k, t_in]];
            let frame1 = spec.bins()[[k, t_in1]];

            let mag = frame0.norm() * (1.0 - frac) + frame1.norm() * frac;
            let phase0 = frame0.arg();
            let phase1 = frame1.arg();

            let bin_freq = k as f32 * sample_rate as f32 / n_fft as f32;
            let expected_advance = 2.0 * std::f32::consts::PI * bin_freq * time_step;
            let phase_diff = wrap_phase(phase1 - phase0 - expected_advance);
            let inst_freq = bin_freq + phase_diff / (2.0 * std::f32::consts::PI * time_step);

            if t_out == 0 {
                phase_acc[k] = phase0 + frac * wrap_phase(phase1 - phase0);
            } else {
                phase_acc[k] += 2.0 * std::f32::consts::PI * inst_freq * time_step;
                phase_acc[k] = wrap_phase(phase_acc[k]);
            }

            output[[k, t_out]] = Complex32::from_polar(mag, phase_acc[k]);
        }
    }

    Ok(output)
}

/// Changes the duration of a signal by `rate` without changing its pitch.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] for an empty signal or
/// non-positive `rate`, or propagates [`phase_vocoder`] errors.
pub fn time_stretch(signal: &[f32], rate: f32, stft_config: &StftConfig) -> AnalysisResult<Vec<f32>> {
    if signal.is_empty() {
        return Err(AnalysisError::invalid_parameter("signal", "must not be empty"));
    }
    if rate <= 0.0 {
        return Err(AnalysisError::invalid_parameter("rate", "must be positive"));
    }

    let spec = Spectrogram::new(signal, stft_config)?;
    let pv_config = PhaseVocoderConfig {
        hop_length: stft_config.hop_length,
    };
    let stretched = phase_vocoder(&spec, rate, &pv_config)?;
    let expected_length = (signal.len() as f32 / rate).ceil() as usize;
    Ok(istft(&stretched, stft_config, Some(expected_length)))
}

/// Changes the pitch of a signal by a frequency `ratio` (>1 raises pitch)
/// without changing its duration: time-stretch by `ratio`, then resample
/// the result back to `sample_rate` from an effective rate of
/// `sample_rate * ratio`.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] for an empty signal or
/// non-positive `ratio`, or propagates [`time_stretch`]/resampler errors.
pub fn pitch_shift_ratio(
    signal: &[f32],
    sample_rate: u32,
    ratio: f32,
    stft_config: &StftConfig,
    resampler: &dyn Resampler,
) -> AnalysisResult<Vec<f32>> {
    if signal.is_empty() {
        return Err(AnalysisError::invalid_parameter("signal", "must not be empty"));
    }
    if ratio <= 0.0 {
        return Err(AnalysisError::invalid_parameter("ratio", "must be positive"));
    }

    let stretched = time_stretch(signal, ratio, stft_config)?;

    let effective_sr = (sample_rate as f32 * ratio).round().clamp(1000.0, 192_000.0) as u32;
    resampler.resample(&stretched, effective_sr, sample_rate)
}

/// Changes the pitch of a signal by `semitones` without changing its
/// duration.
///
/// # Errors
///
/// Propagates [`pitch_shift_ratio`] errors.
pub fn pitch_shift(
    signal: &[f32],
    sample_rate: u32,
    semitones: f32,
    stft_config: &StftConfig,
    resampler: &dyn Resampler,
) -> AnalysisResult<Vec<f32>> {
    let ratio = 2.0f32.powf(semitones / 12.0);
    pitch_shift_ratio(signal, sample_rate, ratio, stft_config, resampler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    struct LinearResampler;
    impl Resampler for LinearResampler {
        fn resample(&self, samples: &[f32], src_sr: u32, dst_sr: u32) -> AnalysisResult<Vec<f32>> {
            if src_sr == 0 || dst_sr == 0 {
                return Err(AnalysisError::invalid_parameter("sample_rate", "must be positive"));
            }
            let ratio = dst_sr as f64 / src_sr as f64;
            let out_len = ((samples.len() as f64) * ratio).round() as usize;
            Ok((0..out_len)
                .map(|i| {
                    let src_pos = i as f64 / ratio;
                    let idx = src_pos as usize;
                    if idx + 1 < samples.len() {
                        let frac = (src_pos - idx as f64) as f32;
                        samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
                    } else {
                        *samples.last().unwrap_or(&0.0)
                    }
                })
                .collect())
        }
    }

    fn tone(sr: u32, n: usize, freq: f32) -> Vec<f32> {
        (0..n).map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin()).collect()
    }

    #[test]
    fn time_stretch_doubles_length_at_half_rate() {
        let sr = 22050u32;
        let sig = tone(sr, sr as usize, 440.0);
        let stretched = time_stretch(&sig, 0.5, &StftConfig::default()).unwrap();
        assert!((stretched.len() as f32 - sig.len() as f32 * 2.0).abs() < sig.len() as f32 * 0.05);
    }

    #[test]
    fn rejects_non_positive_rate() {
        let sig = tone(22050, 1000, 440.0);
        assert!(time_stretch(&sig, 0.0, &StftConfig::default()).is_err());
        assert!(time_stretch(&sig, -1.0, &StftConfig::default()).is_err());
    }

    #[test]
    fn pitch_shift_preserves_duration() {
        let sr = 22050u32;
        let sig = tone(sr, sr as usize, 440.0);
        let shifted = pitch_shift(&sig, sr, 12.0, &StftConfig::default(), &LinearResampler).unwrap();
        assert!((shifted.len() as f32 - sig.len() as f32).abs() < sig.len() as f32 * 0.05);
    }
}
