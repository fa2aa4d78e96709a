//! Cached window functions. Windows are periodic (i.e. computed over
//! `length + 1` samples, then truncated) so that overlap-add STFT/iSTFT
//! pairs satisfy COLA, the same convention the teacher's `utils::stft`
//! hand-rolls for Hann alone.

use std::cell::RefCell;
use std::collections::HashMap;
use std::f32::consts::PI;
use std::rc::Rc;

use crate::config::WindowType;

thread_local! {
    static CACHE: RefCell<HashMap<(WindowType, usize, usize), Rc<Vec<f32>>>> =
        RefCell::new(HashMap::new());
}

fn periodic(length: usize, f: impl Fn(usize, f32) -> f32) -> Vec<f32> {
    if length == 0 {
        return Vec::new();
    }
    let n = length + 1;
    (0..length).map(|i| f(i, n as f32)).collect()
}

fn build(kind: WindowType, length: usize) -> Vec<f32> {
    match kind {
        WindowType::Hann => periodic(length, |i, n| {
            0.5f32.mul_add(-f32::cos(2.0 * i as f32 * PI / n), 0.5)
        }),
        WindowType::Hamming => periodic(length, |i, n| {
            0.54 - 0.46 * f32::cos(2.0 * i as f32 * PI / n)
        }),
        WindowType::Blackman => periodic(length, |i, n| {
            let a0 = 0.42;
            let a1 = 0.5;
            let a2 = 0.08;
            a0 - a1 * f32::cos(2.0 * i as f32 * PI / n) + a2 * f32::cos(4.0 * i as f32 * PI / n)
        }),
        WindowType::Rect => vec![1.0; length],
    }
}

/// Returns the cached window of `kind`, `win_length` samples long, centered
/// and zero-padded out to `n_fft` when `win_length < n_fft`.
#[must_use]
pub fn window(kind: WindowType, win_length: usize, n_fft: usize) -> Rc<Vec<f32>> {
    CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        cache
            .entry((kind, win_length, n_fft))
            .or_insert_with(|| Rc::new(centered(kind, win_length, n_fft)))
            .clone()
    })
}

fn centered(kind: WindowType, win_length: usize, n_fft: usize) -> Vec<f32> {
    let w = build(kind, win_length);
    if win_length >= n_fft {
        return w;
    }
    let pad_left = (n_fft - win_length) / 2;
    let mut out = vec![0.0; n_fft];
    out[pad_left..pad_left + win_length].copy_from_slice(&w);
    out
}

#[must_use]
#[inline]
pub fn hann(length: usize) -> Vec<f32> {
    build(WindowType::Hann, length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_endpoints_are_near_zero() {
        let w = hann(1024);
        assert!(w[0] < 1e-3);
        assert!(w[w.len() - 1] < 0.02);
    }

    #[test]
    fn rect_is_all_ones() {
        let w = build(WindowType::Rect, 8);
        assert!(w.iter().all(|&x| (x - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn short_window_is_centered_and_zero_padded() {
        let w = centered(WindowType::Rect, 4, 8);
        assert_eq!(w, vec![0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
    }
}
