//! Chord templates: 12-dim binary pitch-class masks per quality, and the
//! Roman-numeral degree table used for functional analysis.

use strum::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ChordQuality {
    Major,
    Minor,
    Dim,
    Aug,
    Dom7,
    Maj7,
    Min7,
    Sus2,
    Sus4,
}

impl Default for ChordQuality {
    #[inline]
    fn default() -> Self {
        Self::Major
    }
}

impl ChordQuality {
    #[must_use]
    pub fn intervals(self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Minor => &[0, 3, 7],
            Self::Dim => &[0, 3, 6],
            Self::Aug => &[0, 4, 8],
            Self::Dom7 => &[0, 4, 7, 10],
            Self::Maj7 => &[0, 4, 7, 11],
            Self::Min7 => &[0, 3, 7, 10],
            Self::Sus2 => &[0, 2, 7],
            Self::Sus4 => &[0, 5, 7],
        }
    }

    #[must_use]
    pub fn is_triad(self) -> bool {
        self.intervals().len() == 3
    }

    /// Quality penalty subtracted from the cosine-similarity match score.
    #[must_use]
    pub fn penalty(self) -> f32 {
        match self {
            Self::Dim | Self::Aug => 0.05,
            _ => 0.0,
        }
    }

    /// Uppercase for major-family qualities, lowercase for minor/diminished,
    /// matching Roman-numeral convention.
    #[must_use]
    pub fn roman_suffix(self) -> &'static str {
        match self {
            Self::Major | Self::Sus2 | Self::Sus4 => "",
            Self::Minor => "",
            Self::Dim => "\u{b0}",
            Self::Aug => "+",
            Self::Dom7 => "7",
            Self::Maj7 => "maj7",
            Self::Min7 => "7",
        }
    }

    #[must_use]
    pub fn is_minor_family(self) -> bool {
        matches!(self, Self::Minor | Self::Dim | Self::Min7)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChordTemplate {
    pub root: u8,
    pub quality: ChordQuality,
    pub pattern: [f32; 12],
}

impl ChordTemplate {
    #[must_use]
    pub fn new(root: u8, quality: ChordQuality) -> Self {
        let mut pattern = [0.0f32; 12];
        for &interval in quality.intervals() {
            pattern[((u16::from(root) + u16::from(interval)) % 12) as usize] = 1.0;
        }
        Self {
            root,
            quality,
            pattern,
        }
    }
}

/// Builds the full template library: 48 triads (12 roots x 4 triad
/// qualities) when `triads_only`, else 108 (12 roots x 9 qualities).
#[must_use]
pub fn template_library(triads_only: bool) -> Vec<ChordTemplate> {
    let qualities: &[ChordQuality] = if triads_only {
        &[
            ChordQuality::Major,
            ChordQuality::Minor,
            ChordQuality::Dim,
            ChordQuality::Aug,
        ]
    } else {
        &[
            ChordQuality::Major,
            ChordQuality::Minor,
            ChordQuality::Dim,
            ChordQuality::Aug,
            ChordQuality::Dom7,
            ChordQuality::Maj7,
            ChordQuality::Min7,
            ChordQuality::Sus2,
            ChordQuality::Sus4,
        ]
    };
    let mut out = Vec::with_capacity(12 * qualities.len());
    for root in 0..12u8 {
        for &quality in qualities {
            out.push(ChordTemplate::new(root, quality));
        }
    }
    out
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[must_use]
pub fn note_name(pitch_class: u8) -> &'static str {
    NOTE_NAMES[(pitch_class % 12) as usize]
}

/// Major-scale degree names, chromatic degrees prefixed with `b`/`#` the
/// way functional analysis annotates non-diatonic chords.
const MAJOR_DEGREE_NAMES: [&str; 12] = [
    "I", "bII", "II", "bIII", "III", "IV", "#IV", "V", "bVI", "VI", "bVII", "VII",
];
const MINOR_DEGREE_NAMES: [&str; 12] = [
    "i", "bii", "ii", "III", "iv", "v", "#iv", "V", "VI", "#vi", "VII", "vii",
];

/// Translates a chord root into a Roman numeral relative to `(key_root,
/// is_minor_key)`, decorated with the chord quality's suffix
/// (`deg7`/`maj7`/`\u{b0}`/`+`) and cased per major/minor convention.
#[must_use]
pub fn chord_to_roman_numeral(
    chord_root: u8,
    quality: ChordQuality,
    key_root: u8,
    key_is_minor: bool,
) -> String {
    let degree = ((u16::from(chord_root) + 12 - u16::from(key_root)) % 12) as usize;
    let base = if key_is_minor {
        MINOR_DEGREE_NAMES[degree]
    } else {
        MAJOR_DEGREE_NAMES[degree]
    };

    let mut numeral = if quality.is_minor_family() {
        base.to_lowercase()
    } else {
        base.to_uppercase()
    };
    // preserve chromatic accidental casing convention: lowercase letters
    // only for the numeral itself, not the leading accidental.
    if let Some(stripped) = numeral.strip_prefix('B') {
        numeral = format!("b{stripped}");
    } else if let Some(stripped) = numeral.strip_prefix('#') {
        numeral = format!("#{stripped}");
    }

    numeral.push_str(quality.roman_suffix());
    numeral
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_major_template_has_correct_pitch_classes() {
        let template = ChordTemplate::new(0, ChordQuality::Major);
        assert_eq!(template.pattern, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn library_has_48_triads_or_108_with_sevenths() {
        assert_eq!(template_library(true).len(), 48);
        assert_eq!(template_library(false).len(), 108);
    }

    #[test]
    fn tonic_major_chord_in_major_key_is_uppercase_one() {
        let numeral = chord_to_roman_numeral(0, ChordQuality::Major, 0, false);
        assert_eq!(numeral, "I");
    }

    #[test]
    fn dominant_seventh_in_major_key_is_v7() {
        let numeral = chord_to_roman_numeral(7, ChordQuality::Dom7, 0, false);
        assert_eq!(numeral, "V7");
    }
}
