//! Biquad IIR filters: Direct-Form-II-Transposed application, Butterworth
//! factory functions, and a zero-phase `filtfilt` variant.

use std::f32::consts::PI;

/// `(b0, b1, b2, a1, a2)`, `a0` implicitly normalised to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    #[must_use]
    pub fn butterworth_lowpass(cutoff_hz: f32, sample_rate: f32) -> Self {
        Self::butterworth(cutoff_hz, sample_rate, false)
    }

    #[must_use]
    pub fn butterworth_highpass(cutoff_hz: f32, sample_rate: f32) -> Self {
        Self::butterworth(cutoff_hz, sample_rate, true)
    }

    fn butterworth(cutoff_hz: f32, sample_rate: f32, highpass: bool) -> Self {
        let q = std::f32::consts::FRAC_1_SQRT_2;
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2) = if highpass {
            let b0 = (1.0 + cos_w0) / 2.0;
            (b0, -(1.0 + cos_w0), b0)
        } else {
            let b0 = (1.0 - cos_w0) / 2.0;
            (b0, 1.0 - cos_w0, b0)
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    #[must_use]
    pub fn bandpass(center_hz: f32, q: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * center_hz / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    #[must_use]
    pub fn notch(center_hz: f32, q: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * center_hz / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = 1.0;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Direct-Form-II-Transposed biquad, one sample at a time.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    z1: f32,
    z2: f32,
}

impl Biquad {
    #[must_use]
    #[inline]
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let BiquadCoeffs { b0, b1, b2, a1, a2 } = self.coeffs;
        let y = b0 * x + self.z1;
        self.z1 = b1 * x - a1 * y + self.z2;
        self.z2 = b2 * x - a2 * y;
        y
    }

    pub fn process(&mut self, signal: &[f32]) -> Vec<f32> {
        signal.iter().map(|&x| self.process_sample(x)).collect()
    }

    /// Forward pass, then time-reversed pass, for zero-phase response.
    #[must_use]
    pub fn filtfilt(coeffs: BiquadCoeffs, signal: &[f32]) -> Vec<f32> {
        let mut forward = Self::new(coeffs);
        let pass1 = forward.process(signal);
        let mut reversed: Vec<f32> = pass1.into_iter().rev().collect();
        let mut backward = Self::new(coeffs);
        reversed = backward.process(&reversed);
        reversed.reverse();
        reversed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_attenuates_high_frequency_tone() {
        let sr = 22050.0;
        let coeffs = BiquadCoeffs::butterworth_lowpass(500.0, sr);
        let n = 4096;
        let tone: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 8000.0 * i as f32 / sr).sin())
            .collect();
        let filtered = Biquad::new(coeffs).process(&tone);
        let input_rms = (tone.iter().map(|x| x * x).sum::<f32>() / n as f32).sqrt();
        let output_rms = (filtered.iter().map(|x| x * x).sum::<f32>() / n as f32).sqrt();
        assert!(output_rms < input_rms * 0.3);
    }

    #[test]
    fn filtfilt_is_zero_phase_on_a_symmetric_pulse() {
        let sr = 22050.0;
        let coeffs = BiquadCoeffs::butterworth_lowpass(1000.0, sr);
        let mut signal = vec![0.0f32; 256];
        signal[128] = 1.0;
        let out = Biquad::filtfilt(coeffs, &signal);
        // zero-phase filtering keeps the response symmetric about the impulse
        let left = &out[108..128];
        let right: Vec<f32> = out[129..149].iter().rev().copied().collect();
        for (a, b) in left.iter().zip(right.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} !~= {b}");
        }
    }
}
