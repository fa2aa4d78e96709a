//! Named chord progression patterns, scored against a bar-synchronous
//! progression relative to the tonic so that a progression can be
//! recognized transposed into any key.
//!
//! Patterns are listed as `(scale degree 0-11, quality)` pairs. Degrees
//! follow semitone distance from the tonic, not diatonic step number, so a
//! pattern survives modal inflection (e.g. a bVII) without special-casing.

use super::bars::BarChord;
use crate::chord_templates::ChordQuality;

/// One entry in the pattern library: a name and its degree/quality
/// sequence relative to the tonic.
pub struct ChordPattern {
    pub name: &'static str,
    pub degrees: &'static [(u8, ChordQuality)],
}

use ChordQuality::{Major, Minor};

pub const PATTERNS: &[ChordPattern] = &[
    ChordPattern {
        name: "royal_road",
        degrees: &[(0, Major), (7, Major), (9, Minor), (5, Major)],
    },
    ChordPattern {
        name: "komuro",
        degrees: &[(9, Minor), (5, Major), (7, Major), (0, Major)],
    },
    ChordPattern {
        name: "canon",
        degrees: &[(0, Major), (7, Major), (9, Minor), (4, Major), (5, Major), (0, Major), (5, Major), (7, Major)],
    },
    ChordPattern {
        name: "just_the_two_of_us",
        degrees: &[(0, Major), (4, Minor), (9, Minor), (2, Major)],
    },
    ChordPattern {
        name: "basic_145",
        degrees: &[(0, Major), (5, Major), (7, Major), (0, Major)],
    },
    ChordPattern {
        name: "blues_12",
        degrees: &[
            (0, Major), (0, Major), (0, Major), (0, Major),
            (5, Major), (5, Major), (0, Major), (0, Major),
            (7, Major), (5, Major), (0, Major), (7, Major),
        ],
    },
    ChordPattern {
        name: "axis",
        degrees: &[(0, Major), (5, Major), (9, Minor), (4, Major)],
    },
    ChordPattern {
        name: "fifties",
        degrees: &[(0, Major), (9, Minor), (5, Major), (7, Major)],
    },
    ChordPattern {
        name: "sensitive",
        degrees: &[(9, Minor), (4, Major), (0, Major), (5, Major)],
    },
];

/// Major-scale diatonic degrees, used to weight the voted-degree histogram
/// toward harmonically expected chords.
const DIATONIC_DEGREES: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
const DIATONIC_BONUS: f32 = 1.15;

/// One bar's harmonic function relative to the tonic: a semitone degree
/// and the quality that was actually sung/played there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VotedDegree {
    pub degree: u8,
    pub quality: ChordQuality,
    pub weight: f32,
}

/// Converts a run of bar chords into tonic-relative degrees and tallies how
/// often each `(degree, quality)` combination occurs, diatonic degrees
/// weighted up since they are harmonically more likely to be the "real"
/// function rather than a passing chord.
#[must_use]
pub fn voted_progression(bars: &[BarChord], tonic: u8) -> Vec<VotedDegree> {
    bars.iter()
        .map(|bar| {
            let degree = (u16::from(bar.root) + 12 - u16::from(tonic)) % 12;
            let degree = degree as u8;
            let weight = if DIATONIC_DEGREES.contains(&degree) {
                bar.confidence * DIATONIC_BONUS
            } else {
                bar.confidence
            };
            VotedDegree {
                degree,
                quality: bar.quality,
                weight,
            }
        })
        .collect()
}

fn degree_distance_score(a: u8, b: u8) -> f32 {
    if a == b {
        return 1.0;
    }
    let diff = (i16::from(a) - i16::from(b)).rem_euclid(12) as u8;
    let diff = diff.min(12 - diff);
    match diff {
        7 | 5 => 0.3, // fifth/fourth relation
        4 | 8 | 3 | 9 => 0.25, // third/sixth relation
        1 | 11 => 0.2,  // semitone neighbor
        2 | 10 => 0.15, // whole-tone neighbor
        _ => 0.0,
    }
}

/// Scores one bar's `(degree, quality)` against a pattern entry: `1.0` for
/// an exact match, partial credit for harmonically related substitutions,
/// `0.0` for unrelated chords.
#[must_use]
pub fn match_score(observed: (u8, ChordQuality), expected: (u8, ChordQuality)) -> f32 {
    if observed == expected {
        return 1.0;
    }
    if observed.0 == expected.0 {
        return 0.6; // same root, different quality
    }
    let base = degree_distance_score(observed.0, expected.0);
    if base > 0.0 && observed.1 == expected.1 {
        base + 0.1
    } else {
        base
    }
}

/// Minimum score for a detected pattern to be considered "locked in".
pub const PATTERN_LOCK_THRESHOLD: f32 = 0.75;

/// Minimum number of bars observed before a pattern lock is reported, the
/// larger of twice the pattern's own length and a quarter of
/// `expected_total_bars` (when known).
#[must_use]
pub fn min_bars_for_lock(pattern_len: usize, expected_total_bars: Option<usize>) -> usize {
    let twice_len = pattern_len.saturating_mul(2);
    match expected_total_bars {
        Some(total) if total > 0 => twice_len.max(total / 4),
        _ => twice_len,
    }
}

/// Best-matching named pattern for an observed run of `(degree, quality)`
/// pairs, scored bar-by-bar against each candidate's same-length windows
/// and averaged; returns `None` if the observed run is shorter than every
/// pattern.
#[must_use]
pub fn best_pattern_match(observed: &[(u8, ChordQuality)]) -> Option<(&'static str, f32)> {
    let mut best: Option<(&'static str, f32)> = None;
    for pattern in PATTERNS {
        let len = pattern.degrees.len();
        if observed.len() < len {
            continue;
        }
        let mut best_window_score = 0.0f32;
        for window in observed.windows(len) {
            let score: f32 = window
                .iter()
                .zip(pattern.degrees.iter())
                .map(|(&obs, &exp)| match_score(obs, exp))
                .sum::<f32>()
                / len as f32;
            if score > best_window_score {
                best_window_score = score;
            }
        }
        let replace = match best {
            Some((_, s)) => best_window_score > s,
            None => true,
        };
        if replace {
            best = Some((pattern.name, best_window_score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_royal_road_progression_matches_itself() {
        let observed: Vec<(u8, ChordQuality)> = PATTERNS[0].degrees.to_vec();
        let (name, score) = best_pattern_match(&observed).unwrap();
        assert_eq!(name, "royal_road");
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unrelated_progression_scores_below_lock_threshold() {
        let observed = vec![(1, ChordQuality::Dim); 4];
        let (_, score) = best_pattern_match(&observed).unwrap();
        assert!(score < PATTERN_LOCK_THRESHOLD);
    }

    #[test]
    fn same_root_different_quality_scores_partial_credit() {
        let score = match_score((0, ChordQuality::Minor), (0, ChordQuality::Major));
        assert!((score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn min_bars_for_lock_uses_quarter_of_expected_total_when_larger() {
        assert_eq!(min_bars_for_lock(4, Some(200)), 50);
        assert_eq!(min_bars_for_lock(4, None), 8);
    }
}
