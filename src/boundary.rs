//! Structural boundary detection via self-similarity-matrix checkerboard
//! novelty.

use ndarray::{Array1, Array2, Axis};

use crate::config::BoundaryConfig;
use crate::errors::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    pub time: f64,
    pub frame: usize,
    pub strength: f32,
}

fn l2_normalize_columns(features: &mut Array2<f32>) {
    for mut col in features.columns_mut() {
        let norm = col.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 1e-10 {
            col.mapv_inplace(|v| v / norm);
        }
    }
}

/// Builds the per-frame feature matrix `[n_features x n_frames]` the
/// self-similarity matrix is computed from: MFCC and/or chroma,
/// concatenated along the feature axis and independently L2-normalised
/// per frame (per-source, then once more after concatenation).
fn build_features(mfcc: Option<&Array2<f32>>, chroma: Option<&Array2<f32>>) -> AnalysisResult<Array2<f32>> {
    let sources: Vec<&Array2<f32>> = [mfcc, chroma].into_iter().flatten().collect();
    if sources.is_empty() {
        return Err(AnalysisError::invalid_parameter(
            "mfcc/chroma",
            "at least one feature source must be enabled",
        ));
    }
    let n_frames = sources[0].ncols();
    if sources.iter().any(|s| s.ncols() != n_frames) {
        return Err(AnalysisError::invalid_parameter(
            "mfcc/chroma",
            "feature sources must share the same frame count",
        ));
    }
    let n_features: usize = sources.iter().map(|s| s.nrows()).sum();
    let mut features = Array2::zeros((n_features, n_frames));
    let mut row = 0;
    for source in sources {
        features.slice_mut(ndarray::s![row..row + source.nrows(), ..]).assign(source);
        row += source.nrows();
    }
    l2_normalize_columns(&mut features);
    Ok(features)
}

fn cosine_similarity(a: ndarray::ArrayView1<f32>, b: ndarray::ArrayView1<f32>) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a < 1e-10 || norm_b < 1e-10 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn self_similarity_matrix(features: &Array2<f32>) -> Array2<f32> {
    let n_frames = features.ncols();
    let mut ssm = Array2::zeros((n_frames, n_frames));
    for i in 0..n_frames {
        for j in i..n_frames {
            let sim = cosine_similarity(features.column(i), features.column(j));
            ssm[[i, j]] = sim;
            ssm[[j, i]] = sim;
        }
    }
    ssm
}

/// Checkerboard-kernel novelty at frame `center`: quadrant signs
/// `(+, -, -, +)` over a `kernel_size x kernel_size` window of the SSM.
fn checkerboard_kernel(ssm: &Array2<f32>, center: usize, kernel_size: usize) -> f32 {
    let half = (kernel_size / 2) as isize;
    let n = ssm.nrows() as isize;
    let center = center as isize;
    if center < half || center >= n - half {
        return 0.0;
    }
    let mut sum = 0.0f32;
    for di in -half..half {
        for dj in -half..half {
            let row = (center + di) as usize;
            let col = (center + dj) as usize;
            let sign = if (di < 0 && dj < 0) || (di >= 0 && dj >= 0) { 1.0 } else { -1.0 };
            sum += sign * ssm[[row, col]];
        }
    }
    sum / (kernel_size * kernel_size) as f32
}

fn novelty_curve(ssm: &Array2<f32>, kernel_size: usize) -> Array1<f32> {
    let n_frames = ssm.nrows();
    let mut novelty = Array1::zeros(n_frames);
    for i in 0..n_frames {
        novelty[i] = checkerboard_kernel(ssm, i, kernel_size);
    }
    let max_val = novelty.fold(0.0f32, |acc, &v| acc.max(v));
    if max_val > 1e-10 {
        novelty.mapv_inplace(|v| (v / max_val).max(0.0));
    }
    novelty
}

fn pick_peaks(novelty: &Array1<f32>, sr: u32, hop_length: usize, config: &BoundaryConfig) -> Vec<Boundary> {
    let hop_duration = hop_length as f64 / f64::from(sr.max(1));
    let min_distance = ((f64::from(config.peak_distance) / hop_duration) as usize).max(1);

    let mut boundaries: Vec<Boundary> = Vec::new();
    let n = novelty.len();
    for i in 1..n.saturating_sub(1) {
        let is_peak = novelty[i] > novelty[i - 1] && novelty[i] > novelty[i + 1];
        if !is_peak || novelty[i] < config.threshold {
            continue;
        }
        if let Some(prev) = boundaries.last_mut() {
            if i - prev.frame < min_distance {
                if novelty[i] > prev.strength {
                    prev.frame = i;
                    prev.time = i as f64 * hop_duration;
                    prev.strength = novelty[i];
                }
                continue;
            }
        }
        boundaries.push(Boundary {
            time: i as f64 * hop_duration,
            frame: i,
            strength: novelty[i],
        });
    }
    boundaries
}

/// Detects structural boundaries from already-computed MFCC and/or chroma
/// matrices (shape `[n_feat x n_frames]`, sharing a hop/sample-rate).
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] if neither `mfcc` nor
/// `chroma` is given, or their frame counts disagree.
pub fn detect_boundaries(
    mfcc: Option<&Array2<f32>>,
    chroma: Option<&Array2<f32>>,
    sr: u32,
    hop_length: usize,
    config: &BoundaryConfig,
) -> AnalysisResult<Vec<Boundary>> {
    let features = build_features(mfcc, chroma)?;
    if features.len_of(Axis(1)) == 0 {
        return Ok(Vec::new());
    }
    let ssm = self_similarity_matrix(&features);
    let novelty = novelty_curve(&ssm, config.kernel_size);
    Ok(pick_peaks(&novelty, sr, hop_length, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_features(n_frames: usize, n_feat: usize, switch_at: usize) -> Array2<f32> {
        let mut features = Array2::zeros((n_feat, n_frames));
        for f in 0..n_frames {
            let val = if f < switch_at { 1.0 } else { -1.0 };
            for r in 0..n_feat {
                features[[r, f]] = val;
            }
        }
        features
    }

    #[test]
    fn detects_a_boundary_between_two_contrasting_blocks() {
        let chroma = block_features(80, 12, 40);
        let config = BoundaryConfig {
            kernel_size: 16,
            threshold: 0.05,
            peak_distance: 0.1,
            ..BoundaryConfig::default()
        };
        let boundaries = detect_boundaries(None, Some(&chroma), 22050, 512, &config).unwrap();
        assert!(!boundaries.is_empty());
        let nearest = boundaries
            .iter()
            .min_by_key(|b| (b.frame as i64 - 40).abs())
            .unwrap();
        assert!((nearest.frame as i64 - 40).abs() < 5);
    }

    #[test]
    fn requires_at_least_one_feature_source() {
        assert!(detect_boundaries(None, None, 22050, 512, &BoundaryConfig::default()).is_err());
    }
}
