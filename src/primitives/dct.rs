//! Orthonormal DCT-II, with a small per-thread matrix cache keyed on
//! `(n_output, n_input)`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::rc::Rc;

use ndarray::Array2;

const CACHE_BOUND: usize = 8;

thread_local! {
    static CACHE: RefCell<HashMap<(usize, usize), Rc<Array2<f32>>>> =
        RefCell::new(HashMap::new());
}

/// Builds (and caches) orthonormal DCT-II basis matrices of shape
/// `[n_output x n_input]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DctPlanner;

impl DctPlanner {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self
    }

    /// `matrix · input_column` gives the first `n_output` DCT-II
    /// coefficients of a length-`n_input` signal.
    #[must_use]
    pub fn matrix(&self, n_output: usize, n_input: usize) -> Rc<Array2<f32>> {
        CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            if cache.len() >= CACHE_BOUND && !cache.contains_key(&(n_output, n_input)) {
                cache.clear();
            }
            cache
                .entry((n_output, n_input))
                .or_insert_with(|| Rc::new(build_matrix(n_output, n_input)))
                .clone()
        })
    }

    #[must_use]
    pub fn transform(&self, signal: &[f32], n_output: usize) -> Vec<f32> {
        let matrix = self.matrix(n_output, signal.len());
        matrix
            .rows()
            .into_iter()
            .map(|row| row.iter().zip(signal).map(|(&c, &x)| c * x).sum())
            .collect()
    }
}

#[allow(clippy::cast_precision_loss)]
fn build_matrix(n_output: usize, n_input: usize) -> Array2<f32> {
    let mut matrix = Array2::zeros((n_output, n_input));
    let scale_others = (2.0 / n_input as f64).sqrt();
    let scale_dc = scale_others / std::f64::consts::SQRT_2;
    for k in 0..n_output {
        let scale = if k == 0 { scale_dc } else { scale_others };
        for n in 0..n_input {
            let angle = PI * (n as f64 + 0.5) * k as f64 / n_input as f64;
            matrix[[k, n]] = (scale * angle.cos()) as f32;
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn square_matrix_is_orthonormal() {
        let planner = DctPlanner::new();
        let m = planner.matrix(16, 16);
        let product = m.dot(&m.t());
        for i in 0..16 {
            for j in 0..16 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product[[i, j]], expected, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn transform_of_constant_signal_is_zero_beyond_dc() {
        let planner = DctPlanner::new();
        let signal = vec![1.0f32; 32];
        let coeffs = planner.transform(&signal, 8);
        assert!(coeffs[0].abs() > 1.0);
        for &c in &coeffs[1..] {
            assert!(c.abs() < 1e-3, "{c}");
        }
    }
}
