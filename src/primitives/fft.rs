//! Real-to-complex forward and complex-to-real inverse FFT.
//!
//! `rustfft` only exposes full complex transforms, so real input is lifted
//! into the complex plane before the forward transform and conjugate
//! symmetry is used to rebuild the negative-frequency half before the
//! inverse transform — the same trick the teacher's `utils::stft` uses
//! inline, pulled out here so every L2 consumer shares one implementation.
//!
//! FFT plans are cached in a thread-local [`FftPlanner`], per the "process
//! or thread-local cache, never global mutable state" guidance that applies
//! to every cached table in this crate (window, DCT, filterbank).

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

thread_local! {
    static FORWARD_CACHE: RefCell<(FftPlanner<f32>, HashMap<usize, Arc<dyn Fft<f32>>>)> =
        RefCell::new((FftPlanner::new(), HashMap::new()));
    static INVERSE_CACHE: RefCell<(FftPlanner<f32>, HashMap<usize, Arc<dyn Fft<f32>>>)> =
        RefCell::new((FftPlanner::new(), HashMap::new()));
}

fn cached_forward(n: usize) -> Arc<dyn Fft<f32>> {
    FORWARD_CACHE.with(|cache| {
        let (planner, map) = &mut *cache.borrow_mut();
        map.entry(n).or_insert_with(|| planner.plan_fft_forward(n)).clone()
    })
}

fn cached_inverse(n: usize) -> Arc<dyn Fft<f32>> {
    INVERSE_CACHE.with(|cache| {
        let (planner, map) = &mut *cache.borrow_mut();
        map.entry(n).or_insert_with(|| planner.plan_fft_inverse(n)).clone()
    })
}

/// Forward real FFT. `input.len()` is the transform size `n_fft`; returns
/// `n_fft / 2 + 1` complex bins (Hermitian half).
#[must_use]
pub fn rfft(input: &[f32]) -> Vec<Complex32> {
    let n = input.len();
    let mut buf: Vec<Complex32> = input.iter().map(|&x| Complex32::new(x, 0.0)).collect();
    cached_forward(n).process(&mut buf);
    buf.truncate(n / 2 + 1);
    buf
}

/// Inverse real FFT. `bins` holds `n/2 + 1` complex values; rebuilds the
/// Hermitian-symmetric negative-frequency half, inverse-transforms, and
/// returns `n` real samples normalised by `1/n`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn irfft(bins: &[Complex32], n: usize) -> Vec<f32> {
    debug_assert_eq!(bins.len(), n / 2 + 1);
    let mut full = vec![Complex32::new(0.0, 0.0); n];
    full[..bins.len()].copy_from_slice(bins);
    for k in (n / 2 + 1)..n {
        full[k] = full[n - k].conj();
    }
    cached_inverse(n).process(&mut full);
    let scale = 1.0 / n as f32;
    full.into_iter().map(|c| c.re * scale).collect()
}

/// FFT-based autocorrelation of a real signal via the Wiener-Khinchin
/// theorem: zero-pad to the next power of two `>= 2N`, forward-transform,
/// replace with `|X|^2`, inverse-transform, normalise by `N * variance`.
/// Returns the first `max_lag + 1` lags (lag 0 is always `1.0` unless the
/// signal is constant, in which case every lag is `0.0`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn autocorrelate(signal: &[f32], max_lag: usize) -> Vec<f32> {
    let n = signal.len();
    if n == 0 {
        return vec![0.0; max_lag + 1];
    }
    let mean = signal.iter().sum::<f32>() / n as f32;
    let padded_len = (2 * n).next_power_of_two();
    let mut padded = vec![0.0f32; padded_len];
    for (dst, &src) in padded.iter_mut().zip(signal.iter()) {
        *dst = src - mean;
    }

    let mut spectrum = rfft(&padded);
    for c in &mut spectrum {
        *c = Complex32::new(c.norm_sqr(), 0.0);
    }
    let autocorr = irfft(&spectrum, padded_len);

    // autocorr[0] is the sum of squares of the (zero-padded, demeaned)
    // signal, i.e. `n * variance`; normalising by it directly gives the
    // `var * N` scaling the spec calls for and leaves `ac[0] == 1`.
    let denom = autocorr[0].max(1e-10);

    let lags = max_lag.min(n.saturating_sub(1));
    let mut out = vec![0.0f32; max_lag + 1];
    for lag in 0..=lags {
        out[lag] = autocorr[lag] / denom;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn round_trips_impulse() {
        let mut signal = vec![0.0f32; 16];
        signal[0] = 1.0;
        let spectrum = rfft(&signal);
        let back = irfft(&spectrum, 16);
        for (a, b) in signal.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn round_trips_sine() {
        let n = 64;
        let signal: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 5.0 * i as f32 / n as f32).sin())
            .collect();
        let spectrum = rfft(&signal);
        let back = irfft(&spectrum, n);
        for (a, b) in signal.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn autocorrelation_of_periodic_signal_peaks_at_period() {
        let n = 2048;
        let period = 32;
        let signal: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * i as f32 / period as f32).sin())
            .collect();
        let ac = autocorrelate(&signal, 128);
        assert!(ac[0] > 0.9);
        assert!(ac[period] > 0.5, "ac[{period}] = {}", ac[period]);
    }

    #[test]
    fn autocorrelation_of_constant_signal_is_zero() {
        let signal = vec![1.0f32; 256];
        let ac = autocorrelate(&signal, 32);
        for &v in &ac {
            assert!(v.abs() < 1e-6);
        }
    }
}
