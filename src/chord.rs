//! Chord detection: per-frame template matching against a smoothed chroma,
//! run-length segmentation, and Roman-numeral functional analysis.

use ndarray::Array2;

use crate::chord_templates::{chord_to_roman_numeral, note_name, template_library, ChordQuality, ChordTemplate};
use crate::config::ChordConfig;
use crate::errors::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chord {
    pub root: u8,
    pub quality: ChordQuality,
    pub start: f64,
    pub end: f64,
    pub confidence: f32,
}

impl Chord {
    #[must_use]
    #[inline]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    #[must_use]
    pub fn name(&self) -> String {
        let suffix = match self.quality {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Dim => "dim",
            ChordQuality::Aug => "aug",
            ChordQuality::Dom7 => "7",
            ChordQuality::Maj7 => "maj7",
            ChordQuality::Min7 => "m7",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Sus4 => "sus4",
        };
        format!("{}{suffix}", note_name(self.root))
    }
}

fn empty_chord() -> Chord {
    Chord {
        root: 0,
        quality: ChordQuality::Major,
        start: 0.0,
        end: 0.0,
        confidence: 0.0,
    }
}

pub(crate) fn cosine(a: &[f32], b: &[f32; 12]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..12 {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    if norm_a < 1e-12 || norm_b < 1e-12 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

/// Scores a 12-dim chroma vector against one template: cosine similarity,
/// plus a bonus when the template's root is itself a strong chroma peak,
/// minus a fixed penalty for unstable qualities (diminished/augmented).
pub(crate) fn score_template(chroma: &[f32; 12], template: &ChordTemplate) -> f32 {
    let max_chroma = chroma.iter().cloned().fold(0.0f32, f32::max);
    let root_value = chroma[template.root as usize];
    let root_bonus = if max_chroma > 1e-12 && root_value >= 0.5 * max_chroma {
        0.1 * (root_value / max_chroma)
    } else {
        0.0
    };
    cosine(chroma, &template.pattern) + root_bonus - template.quality.penalty()
}

pub(crate) fn best_template(chroma: &[f32; 12], templates: &[ChordTemplate]) -> (usize, f32) {
    let mut best_idx = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, template) in templates.iter().enumerate() {
        let score = score_template(chroma, template);
        if score > best_score {
            best_score = score;
            best_idx = i;
        }
    }
    (best_idx, best_score)
}

/// Averages chroma columns over a window of `smooth_frames` centered at
/// `frame`, returned as a fixed 12-element array regardless of `n_chroma`
/// (callers are expected to pass 12-bin chroma).
fn smoothed_chroma(chroma: &Array2<f32>, frame: usize, smooth_frames: usize) -> [f32; 12] {
    let n_frames = chroma.ncols();
    let half = smooth_frames / 2;
    let start = frame.saturating_sub(half);
    let end = (frame + half + 1).min(n_frames);
    let count = (end - start).max(1) as f32;

    let mut out = [0.0f32; 12];
    for f in start..end {
        let col = chroma.column(f);
        for c in 0..12.min(col.len()) {
            out[c] += col[c];
        }
    }
    for v in &mut out {
        *v /= count;
    }
    out
}

/// Detects the chord progression implied by a 12-bin chromagram.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidParameter`] if `chroma` does not have
/// exactly 12 rows.
pub struct ChordAnalyzer {
    chords: Vec<Chord>,
    frame_chords: Vec<(u8, ChordQuality)>,
}

impl ChordAnalyzer {
    pub fn new(chroma: &Array2<f32>, sr: u32, hop_length: usize, config: &ChordConfig) -> AnalysisResult<Self> {
        if chroma.nrows() != 12 {
            return Err(AnalysisError::invalid_parameter(
                "chroma",
                "must have exactly 12 rows",
            ));
        }
        let n_frames = chroma.ncols();
        if n_frames == 0 {
            return Ok(Self {
                chords: Vec::new(),
                frame_chords: Vec::new(),
            });
        }

        let templates = template_library(config.use_triads_only);
        let hop_duration = hop_length as f64 / f64::from(sr.max(1));
        let smooth_frames = ((f64::from(config.smoothing_window) * f64::from(sr)
            / hop_length as f64) as usize)
            .max(1);

        let mut frame_chords = Vec::with_capacity(n_frames);
        let mut scores = Vec::with_capacity(n_frames);
        for f in 0..n_frames {
            let smoothed = smoothed_chroma(chroma, f, smooth_frames);
            let (idx, score) = best_template(&smoothed, &templates);
            frame_chords.push((templates[idx].root, templates[idx].quality));
            scores.push(score);
        }

        let mut segments = Vec::new();
        let mut seg_start = 0usize;
        let mut seg_confidence = scores[0];
        let mut seg_count = 1usize;
        let mut current = frame_chords[0];

        for f in 1..=n_frames {
            let is_last = f == n_frames;
            let changed = !is_last && frame_chords[f] != current;
            if changed || is_last {
                segments.push(Chord {
                    root: current.0,
                    quality: current.1,
                    start: seg_start as f64 * hop_duration,
                    end: f as f64 * hop_duration,
                    confidence: seg_confidence / seg_count as f32,
                });
                if !is_last {
                    current = frame_chords[f];
                    seg_start = f;
                    seg_confidence = scores[f];
                    seg_count = 1;
                }
            } else if !is_last {
                seg_confidence += scores[f];
                seg_count += 1;
            }
        }

        let chords = merge_short_segments(segments, f64::from(config.min_duration));

        Ok(Self {
            chords,
            frame_chords,
        })
    }

    #[must_use]
    #[inline]
    pub fn chords(&self) -> &[Chord] {
        &self.chords
    }

    #[must_use]
    #[inline]
    pub fn frame_chords(&self) -> &[(u8, ChordQuality)] {
        &self.frame_chords
    }

    #[must_use]
    pub fn chord_at(&self, time: f64) -> Chord {
        self.chords
            .iter()
            .find(|c| time >= c.start && time < c.end)
            .copied()
            .unwrap_or_else(empty_chord)
    }

    #[must_use]
    pub fn most_common_chord(&self) -> Chord {
        let Some(best) = self
            .chords
            .iter()
            .max_by(|a, b| a.duration().partial_cmp(&b.duration()).unwrap())
        else {
            return empty_chord();
        };
        let key = (best.root, best.quality);
        self.chords
            .iter()
            .find(|c| (c.root, c.quality) == key)
            .copied()
            .unwrap_or(*best)
    }

    #[must_use]
    pub fn progression_pattern(&self) -> String {
        self.chords
            .iter()
            .map(Chord::name)
            .collect::<Vec<_>>()
            .join(" - ")
    }

    /// Roman-numeral functional analysis relative to `(key_root, key_is_minor)`.
    #[must_use]
    pub fn functional_analysis(&self, key_root: u8, key_is_minor: bool) -> Vec<String> {
        self.chords
            .iter()
            .map(|c| chord_to_roman_numeral(c.root, c.quality, key_root, key_is_minor))
            .collect()
    }
}

/// Merges segments shorter than `min_duration` into the predecessor (or,
/// lacking one, leaves them for the identical-chord fusion pass below to
/// pick up), then fuses adjacent identical chords, averaging confidence.
fn merge_short_segments(segments: Vec<Chord>, min_duration: f64) -> Vec<Chord> {
    let mut merged: Vec<Chord> = Vec::with_capacity(segments.len());
    for seg in segments {
        if seg.duration() < min_duration {
            if let Some(last) = merged.last_mut() {
                last.end = seg.end;
                continue;
            }
        }
        if let Some(last) = merged.last_mut() {
            if last.root == seg.root && last.quality == seg.quality {
                last.end = seg.end;
                last.confidence = (last.confidence + seg.confidence) / 2.0;
                continue;
            }
        }
        merged.push(seg);
    }
    merged
}

/// One-shot convenience wrapper over [`ChordAnalyzer`].
///
/// # Errors
///
/// Propagates [`ChordAnalyzer::new`] errors.
pub fn detect_chords(chroma: &Array2<f32>, sr: u32, hop_length: usize, config: &ChordConfig) -> AnalysisResult<Vec<Chord>> {
    Ok(ChordAnalyzer::new(chroma, sr, hop_length, config)?.chords().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChromaFilterConfig;
    use crate::spectrogram::Spectrogram;
    use crate::chroma::Chroma;
    use crate::config::StftConfig;
    use std::f32::consts::PI;

    fn triad_signal(sr: u32, n: usize, freqs: &[f32]) -> Vec<f32> {
        (0..n)
            .map(|i| {
                freqs
                    .iter()
                    .map(|&f| (2.0 * PI * f * i as f32 / sr as f32).sin())
                    .sum::<f32>()
                    / freqs.len() as f32
            })
            .collect()
    }

    #[test]
    fn c_major_triad_is_detected_as_c_major() {
        let sr = 22050u32;
        // C4, E4, G4
        let sig = triad_signal(sr, sr as usize * 2, &[261.63, 329.63, 392.0]);
        let cfg = StftConfig::default();
        let spec = Spectrogram::new(&sig, &cfg).unwrap().with_sample_rate(sr);
        let chroma = Chroma::from_spectrogram(&spec, &ChromaFilterConfig::default()).unwrap();

        let analyzer = ChordAnalyzer::new(chroma.values(), sr, cfg.hop_length, &ChordConfig::default()).unwrap();
        let chord = analyzer.most_common_chord();
        assert_eq!(chord.root, 0); // C
        assert_eq!(chord.quality, ChordQuality::Major);
    }

    #[test]
    fn rejects_non_12_row_chroma() {
        let chroma = Array2::<f32>::zeros((10, 5));
        let result = ChordAnalyzer::new(&chroma, 22050, 512, &ChordConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn empty_chroma_yields_no_chords() {
        let chroma = Array2::<f32>::zeros((12, 0));
        let analyzer = ChordAnalyzer::new(&chroma, 22050, 512, &ChordConfig::default()).unwrap();
        assert!(analyzer.chords().is_empty());
    }
}
