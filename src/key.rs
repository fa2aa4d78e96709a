//! Krumhansl-Schmuckler / Temperley key estimation from a mean chroma
//! vector.

use crate::config::{KeyConfig, KeyProfileType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Major,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Key {
    pub root: u8,
    pub mode: Mode,
    pub confidence: f32,
}

// Krumhansl & Kessler (1982) tonal hierarchy ratings.
const KS_MAJOR: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const KS_MINOR: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

// Temperley (1999) revised profiles.
const TEMPERLEY_MAJOR: [f64; 12] = [
    5.0, 2.0, 3.5, 2.0, 4.5, 4.0, 2.0, 4.5, 2.0, 3.5, 1.5, 4.0,
];
const TEMPERLEY_MINOR: [f64; 12] = [
    5.0, 2.0, 3.5, 4.5, 2.0, 4.0, 2.0, 4.5, 3.5, 2.0, 1.5, 4.0,
];

fn profiles(profile_type: KeyProfileType) -> ([f64; 12], [f64; 12]) {
    match profile_type {
        KeyProfileType::KrumhanslSchmuckler => (KS_MAJOR, KS_MINOR),
        KeyProfileType::Temperley => (TEMPERLEY_MAJOR, TEMPERLEY_MINOR),
    }
}

fn rotate(profile: &[f64; 12], root: usize) -> [f64; 12] {
    let mut out = [0.0; 12];
    for i in 0..12 {
        out[i] = profile[(i + 12 - root) % 12];
    }
    out
}

fn pearson_correlation(a: &[f64; 12], b: &[f32]) -> f64 {
    let mean_a = a.iter().sum::<f64>() / 12.0;
    let mean_b = b.iter().map(|&v| f64::from(v)).sum::<f64>() / 12.0;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..12 {
        let da = a[i] - mean_a;
        let db = f64::from(b[i]) - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom <= 1e-12 {
        0.0
    } else {
        cov / denom
    }
}

/// Correlates `mean_chroma` against all 24 rotated major/minor profiles,
/// sorted by descending correlation (best match first).
fn ranked_candidates(mean_chroma: &[f32], config: &KeyConfig) -> Vec<(u8, Mode, f64)> {
    let (major, minor) = profiles(config.profile_type);

    let mut candidates: Vec<(u8, Mode, f64)> = Vec::with_capacity(24);
    for root in 0..12u8 {
        let rotated_major = rotate(&major, root as usize);
        let rotated_minor = rotate(&minor, root as usize);
        candidates.push((root, Mode::Major, pearson_correlation(&rotated_major, mean_chroma)));
        candidates.push((root, Mode::Minor, pearson_correlation(&rotated_minor, mean_chroma)));
    }

    candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap());
    candidates
}

/// Best-matching key root/mode and its raw Pearson correlation (`[-1, 1]`),
/// before any confidence blending. Callers that need to derive their own
/// confidence (e.g. streaming's time-discounted estimate) start here.
pub(crate) fn top_correlation(mean_chroma: &[f32], config: &KeyConfig) -> (u8, Mode, f64) {
    let candidates = ranked_candidates(mean_chroma, config);
    candidates[0]
}

/// Estimates the musical key of a mean chroma vector (length 12).
///
/// Confidence blends the top correlation with the gap to the runner-up: a
/// gap `>= 0.2` yields full confidence (the top correlation itself);
/// smaller gaps scale it down proportionally.
#[must_use]
pub fn estimate_key(mean_chroma: &[f32], config: &KeyConfig) -> Key {
    let candidates = ranked_candidates(mean_chroma, config);
    let top = candidates[0];
    let runner_up = candidates.get(1).map_or(top.2 - 1.0, |c| c.2);
    let gap = (top.2 - runner_up).max(0.0);

    let confidence = if gap >= 0.2 {
        top.2.clamp(0.0, 1.0)
    } else {
        (top.2 * (gap / 0.2)).clamp(0.0, 1.0)
    };

    Key {
        root: top.0,
        mode: top.1,
        confidence: confidence as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_a_chroma_reports_root_a() {
        let mut chroma = [0.0f32; 12];
        chroma[9] = 1.0; // A
        let key = estimate_key(&chroma, &KeyConfig::default());
        assert_eq!(key.root, 9);
    }

    #[test]
    fn confidence_is_bounded() {
        let chroma = [1.0f32; 12];
        let key = estimate_key(&chroma, &KeyConfig::default());
        assert!(key.confidence >= 0.0 && key.confidence <= 1.0);
    }
}
