//! Sliding-window median via two balanced multisets, the same structure as
//! `SlidingMedian` in the harmonic/percussive separator this crate was
//! ported from: a lower half (max at the top) and an upper half (min at
//! the bottom), rebalanced on every insert/erase so the median is always
//! O(1) to read. Rust has no `std::multiset`; a `BTreeMap<N32, usize>`
//! keyed by ordered-float value with a multiplicity count plays the same
//! role.

use std::collections::BTreeMap;

use noisy_float::prelude::*;

#[derive(Debug, Default, Clone)]
pub struct SlidingMedian {
    lo: BTreeMap<N32, usize>,
    hi: BTreeMap<N32, usize>,
    lo_len: usize,
    hi_len: usize,
}

impl SlidingMedian {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: f32) {
        let v = n32(value);
        let goes_lo = match self.lo.keys().next_back() {
            Some(&max_lo) => v <= max_lo,
            None => true,
        };
        if goes_lo {
            *self.lo.entry(v).or_insert(0) += 1;
            self.lo_len += 1;
        } else {
            *self.hi.entry(v).or_insert(0) += 1;
            self.hi_len += 1;
        }
        self.rebalance();
    }

    pub fn erase(&mut self, value: f32) {
        let v = n32(value);
        if let Some(count) = self.lo.get_mut(&v) {
            *count -= 1;
            if *count == 0 {
                self.lo.remove(&v);
            }
            self.lo_len -= 1;
        } else if let Some(count) = self.hi.get_mut(&v) {
            *count -= 1;
            if *count == 0 {
                self.hi.remove(&v);
            }
            self.hi_len -= 1;
        }
        self.rebalance();
    }

    #[must_use]
    pub fn median(&self) -> f32 {
        if self.lo.is_empty() {
            return 0.0;
        }
        let max_lo = *self.lo.keys().next_back().unwrap();
        if self.lo_len > self.hi_len {
            return max_lo.raw();
        }
        let min_hi = *self.hi.keys().next().unwrap();
        (max_lo.raw() + min_hi.raw()) / 2.0
    }

    pub fn clear(&mut self) {
        self.lo.clear();
        self.hi.clear();
        self.lo_len = 0;
        self.hi_len = 0;
    }

    fn rebalance(&mut self) {
        while self.lo_len > self.hi_len + 1 {
            let &key = self.lo.keys().next_back().unwrap();
            move_one(&mut self.lo, &mut self.lo_len, &mut self.hi, &mut self.hi_len, key);
        }
        while self.hi_len > self.lo_len {
            let &key = self.hi.keys().next().unwrap();
            move_one(&mut self.hi, &mut self.hi_len, &mut self.lo, &mut self.lo_len, key);
        }
    }
}

fn move_one(
    from: &mut BTreeMap<N32, usize>,
    from_len: &mut usize,
    to: &mut BTreeMap<N32, usize>,
    to_len: &mut usize,
    key: N32,
) {
    let count = from.get_mut(&key).unwrap();
    *count -= 1;
    if *count == 0 {
        from.remove(&key);
    }
    *from_len -= 1;
    *to.entry(key).or_insert(0) += 1;
    *to_len += 1;
}

/// One-shot median of a buffer, for boundary regions too short for a full
/// sliding window.
#[must_use]
pub fn median_of(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sliding-window median filter over a full array with a centered window
/// of (odd) `kernel_size`, edges clamped to the array boundary.
#[must_use]
pub fn sliding_median_filter(values: &[f32], kernel_size: usize) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let half = kernel_size / 2;
    let mut window = SlidingMedian::new();
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(values.len() - 1);
        // Rebuilding the window per-sample keeps this correct near the
        // edges without special-casing them; a caller on a hot path would
        // instead insert/erase incrementally as the window slides.
        window.clear();
        for &v in &values[lo..=hi] {
            window.insert(v);
        }
        out.push(window.median());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_length() {
        let mut m = SlidingMedian::new();
        for v in [5.0, 1.0, 3.0] {
            m.insert(v);
        }
        assert!((m.median() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn median_of_even_length_averages_middle_two() {
        let mut m = SlidingMedian::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            m.insert(v);
        }
        assert!((m.median() - 2.5).abs() < 1e-6);
    }

    #[test]
    fn insert_then_erase_restores_previous_median() {
        let mut m = SlidingMedian::new();
        for v in [1.0, 2.0, 3.0] {
            m.insert(v);
        }
        m.insert(100.0);
        m.erase(100.0);
        assert!((m.median() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn filter_smooths_an_impulse() {
        let mut signal = vec![0.0f32; 21];
        signal[10] = 10.0;
        let filtered = sliding_median_filter(&signal, 5);
        assert!(filtered[10] < 1.0);
    }
}
