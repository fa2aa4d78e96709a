//! Running estimates the streaming analyzer refines frame-by-frame: BPM,
//! key and chord progression, each only as confident as the evidence
//! accumulated so far warrants.

use std::collections::VecDeque;

use crate::bpm::estimate_bpm;
use crate::chord::best_template;
use crate::chord_templates::{template_library, ChordQuality};
use crate::config::{BpmConfig, KeyConfig};
use crate::key::{top_correlation, Key, Mode};
use crate::primitives::median::median_of;

use super::bars::BarChord;

/// One detected chord change, recorded the instant the progressive chord
/// estimate settles on a new root/quality pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChordChange {
    pub root: u8,
    pub quality: ChordQuality,
    pub start_time: f64,
    pub confidence: f32,
}

/// Snapshot of every running estimate the stream analyzer maintains,
/// cloned out on each drain.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressiveEstimate {
    pub bpm: f32,
    pub bpm_confidence: f32,
    pub key_root: u8,
    pub key_minor: bool,
    pub key_confidence: f32,
    pub chord_root: u8,
    pub chord_quality: ChordQuality,
    pub chord_confidence: f32,
    pub chord_progression: Vec<ChordChange>,
    /// Tonic-relative `(degree, quality)` pairs tallied from
    /// `bar_chord_progression`, diatonic degrees weighted up.
    pub voted_pattern: Vec<(u8, ChordQuality)>,
    pub bar_chord_progression: Vec<BarChord>,
    pub detected_pattern_name: Option<&'static str>,
    pub pattern_score: f32,
    pub accumulated_seconds: f64,
    pub used_frames: usize,
    pub updated: bool,
}

impl Default for ProgressiveEstimate {
    fn default() -> Self {
        Self {
            bpm: 0.0,
            bpm_confidence: 0.0,
            key_root: 0,
            key_minor: false,
            key_confidence: 0.0,
            chord_root: 0,
            chord_quality: ChordQuality::default(),
            chord_confidence: 0.0,
            chord_progression: Vec::new(),
            voted_pattern: Vec::new(),
            bar_chord_progression: Vec::new(),
            detected_pattern_name: None,
            pattern_score: 0.0,
            accumulated_seconds: 0.0,
            used_frames: 0,
            updated: false,
        }
    }
}

impl ProgressiveEstimate {
    #[must_use]
    pub fn key(&self) -> Key {
        Key {
            root: self.key_root,
            mode: if self.key_minor { Mode::Minor } else { Mode::Major },
            confidence: self.key_confidence,
        }
    }
}

/// Re-estimates BPM from the onset envelope accumulated so far. Cheap
/// relative to a single frame's cost only because [`estimate_bpm`] itself
/// is an FFT-based autocorrelation over the whole envelope; callers throttle
/// how often this runs via `StreamConfig::bpm_update_interval_sec`.
pub(crate) fn update_bpm(onset_env: &[f32], sr: u32, config: &BpmConfig) -> Option<(f32, f32)> {
    estimate_bpm(onset_env, sr, config).ok().map(|e| (e.bpm, e.confidence))
}

/// Re-estimates key from the mean of all chroma frames accumulated so far.
/// Returns the raw Pearson correlation of the winning profile (`[-1, 1]`),
/// not a blended confidence; callers combine it with a time factor
/// (confidence should only grow as more audio is seen).
pub(crate) fn update_key(chroma_history: &[[f32; 12]], config: &KeyConfig) -> (u8, bool, f64) {
    if chroma_history.is_empty() {
        return (0, false, 0.0);
    }
    let mut mean = [0.0f32; 12];
    for frame in chroma_history {
        for i in 0..12 {
            mean[i] += frame[i];
        }
    }
    let n = chroma_history.len() as f32;
    for v in &mut mean {
        *v /= n;
    }
    let (root, mode, correlation) = top_correlation(&mean, config);
    (root, mode == Mode::Minor, correlation)
}

/// Median-filtered chroma across a short recent-frame window: more robust
/// to single-frame noise than an average, and unlike exponential smoothing
/// it doesn't let one outlier linger across many frames.
pub(crate) fn median_chroma(history: &VecDeque<[f32; 12]>) -> [f32; 12] {
    let mut out = [0.0f32; 12];
    if history.is_empty() {
        return out;
    }
    let mut values = vec![0.0f32; history.len()];
    for (c, slot) in out.iter_mut().enumerate() {
        for (v, frame) in values.iter_mut().zip(history.iter()) {
            *v = frame[c];
        }
        *slot = median_of(&values);
    }
    out
}

/// Matches the current smoothed chroma frame against the chord template
/// library, reusing the exact same per-frame scoring as the batch
/// `ChordAnalyzer` so progressive and final chord labels never disagree on
/// identical chroma.
pub(crate) fn match_chord(chroma_frame: &[f32; 12], triads_only: bool) -> (u8, ChordQuality, f32) {
    let templates = template_library(triads_only);
    let (idx, score) = best_template(chroma_frame, &templates);
    (templates[idx].root, templates[idx].quality, score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_key_on_c_major_chroma_favors_c() {
        let history = vec![[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]; 8];
        let (root, minor, correlation) = update_key(&history, &KeyConfig::default());
        assert_eq!(root, 0);
        assert!(!minor);
        assert!(correlation > 0.0);
    }

    #[test]
    fn match_chord_on_c_major_pattern_returns_c_major() {
        let chroma = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let (root, quality, _confidence) = match_chord(&chroma, false);
        assert_eq!(root, 0);
        assert_eq!(quality, ChordQuality::Major);
    }

    #[test]
    fn update_key_on_empty_history_is_unconfident() {
        let (_, _, correlation) = update_key(&[], &KeyConfig::default());
        assert_eq!(correlation, 0.0);
    }

    #[test]
    fn median_chroma_rejects_a_single_outlier_frame() {
        let mut history = VecDeque::new();
        for _ in 0..7 {
            history.push_back([0.0f32; 12]);
        }
        let mut outlier = [0.0f32; 12];
        outlier[0] = 1.0;
        history.push_back(outlier);
        let median = median_chroma(&history);
        assert_eq!(median[0], 0.0);
    }
}
