//! Chroma filterbank and the `Chroma` chromagram.

use ndarray::Array2;

use crate::config::ChromaFilterConfig;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::spectrogram::Spectrogram;

/// Row-major `[n_chroma x n_bins]` triangular filterbank: each FFT bin
/// above `fmin` is distributed into the two nearest chroma bins based on
/// its fractional chroma position `12 * log2(f / 440) - tuning (mod 12)`.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] if `n_chroma == 0`.
pub fn chroma_filterbank(sr: u32, n_fft: usize, config: &ChromaFilterConfig) -> AnalysisResult<Array2<f32>> {
    if config.n_chroma == 0 {
        return Err(AnalysisError::invalid_parameter(
            "n_chroma",
            "must be positive",
        ));
    }
    let n_chroma = config.n_chroma;
    let n_bins = n_fft / 2 + 1;
    let mut filterbank = Array2::zeros((n_chroma, n_bins));

    for b in 1..n_bins {
        let freq = b as f64 * f64::from(sr) / n_fft as f64;
        if freq < config.fmin {
            continue;
        }
        let chroma_pos = n_chroma as f64 * (freq / 440.0).log2() - config.tuning;
        let wrapped = chroma_pos.rem_euclid(n_chroma as f64);
        let lower = wrapped.floor() as usize % n_chroma;
        let upper = (lower + 1) % n_chroma;
        let frac = wrapped - wrapped.floor();

        filterbank[[lower, b]] += (1.0 - frac) as f32;
        filterbank[[upper, b]] += frac as f32;
    }

    for mut row in filterbank.rows_mut() {
        let sum: f32 = row.sum();
        if sum > 1e-12 {
            row.mapv_inplace(|v| v / sum);
        }
    }

    Ok(filterbank)
}

/// Non-negative `[n_chroma x n_frames]` chromagram.
#[derive(Debug, Clone)]
pub struct Chroma {
    values: Array2<f32>,
    sr: u32,
    hop_length: usize,
}

impl Chroma {
    /// # Errors
    ///
    /// Propagates [`chroma_filterbank`] errors.
    pub fn from_spectrogram(spec: &Spectrogram, config: &ChromaFilterConfig) -> AnalysisResult<Self> {
        let filterbank = chroma_filterbank(spec.sample_rate(), spec.n_fft(), config)?;
        let values = filterbank.dot(spec.power());
        Ok(Self {
            values,
            sr: spec.sample_rate(),
            hop_length: spec.hop_length(),
        })
    }

    #[must_use]
    #[inline]
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    #[must_use]
    #[inline]
    pub fn n_chroma(&self) -> usize {
        self.values.nrows()
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

    /// L2-normalises every frame in place; frames whose norm is `~0` are
    /// left untouched rather than divided to NaN.
    pub fn normalize_l2(&mut self) {
        for mut col in self.values.columns_mut() {
            let norm = col.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 1e-10 {
                col.mapv_inplace(|v| v / norm);
            }
        }
    }

    #[must_use]
    pub fn mean_vector(&self) -> Vec<f32> {
        if self.values.ncols() == 0 {
            return vec![0.0; self.values.nrows()];
        }
        self.values
            .rows()
            .into_iter()
            .map(|row| row.sum() / self.values.ncols() as f32)
            .collect()
    }
}

/// Extracts the chroma vector of a single frame, L2-normalised, suitable
/// for feeding chord/key template matching without mutating a shared
/// `Chroma` instance.
#[must_use]
pub fn normalized_frame(chroma: &Array2<f32>, frame: usize) -> Vec<f32> {
    let column = chroma.column(frame);
    let norm = column.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-10 {
        column.iter().map(|&v| v / norm).collect()
    } else {
        vec![0.0; column.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StftConfig;
    use std::f32::consts::PI;

    #[test]
    fn filterbank_rows_are_nonnegative_and_sum_near_one() {
        let fb = chroma_filterbank(22050, 2048, &ChromaFilterConfig::default()).unwrap();
        for row in fb.rows() {
            assert!(row.iter().all(|&v| v >= 0.0));
            let sum: f32 = row.sum();
            if sum > 0.0 {
                assert!((sum - 1.0).abs() < 1e-3, "row sum {sum}");
            }
        }
    }

    #[test]
    fn pure_440hz_sine_peaks_at_chroma_index_a() {
        let sr = 22050u32;
        let sig: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let spec = Spectrogram::new(&sig, &StftConfig::default())
            .unwrap()
            .with_sample_rate(sr);
        let chroma = Chroma::from_spectrogram(&spec, &ChromaFilterConfig::default()).unwrap();
        let mean = chroma.mean_vector();
        let (argmax, _) = mean
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        // A is chroma index 9 (C=0, C#=1, ..., A=9)
        assert_eq!(argmax, 9);
    }

    #[test]
    fn normalize_l2_gives_unit_norm_frames() {
        let sr = 22050u32;
        let sig: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let spec = Spectrogram::new(&sig, &StftConfig::default())
            .unwrap()
            .with_sample_rate(sr);
        let mut chroma = Chroma::from_spectrogram(&spec, &ChromaFilterConfig::default()).unwrap();
        chroma.normalize_l2();
        for col in chroma.values().columns() {
            let norm = col.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!(norm < 1e-6 || (norm - 1.0).abs() < 0.01);
        }
    }
}
