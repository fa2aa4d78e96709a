//! Section labelling: boundary-delimited segments classified into
//! Intro/Verse/PreChorus/Chorus/Bridge/Instrumental/Outro by position and
//! relative energy.

use ndarray::Array2;

use crate::boundary::detect_boundaries;
use crate::config::SectionConfig;
use crate::errors::AnalysisResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Intro,
    Verse,
    PreChorus,
    Chorus,
    Bridge,
    Instrumental,
    Outro,
}

impl SectionType {
    #[must_use]
    #[inline]
    pub fn as_char(self) -> char {
        match self {
            Self::Intro => 'I',
            Self::Verse => 'A',
            Self::PreChorus => 'P',
            Self::Chorus => 'B',
            Self::Bridge => 'C',
            Self::Instrumental => 'S',
            Self::Outro => 'O',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Section {
    pub start: f64,
    pub end: f64,
    pub energy_level: f32,
    pub confidence: f32,
    pub section_type: SectionType,
}

impl Section {
    #[must_use]
    #[inline]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Frame-hop RMS energy curve over a raw signal, matching the hop grid the
/// boundary detector's feature matrices were computed on.
#[must_use]
pub fn rms_energy_curve(signal: &[f32], n_fft: usize, hop_length: usize) -> Vec<f32> {
    if n_fft == 0 || hop_length == 0 || signal.len() < n_fft {
        return Vec::new();
    }
    signal
        .windows(n_fft)
        .step_by(hop_length)
        .map(crate::spectral::rms)
        .collect()
}

fn section_energy(curve: &[f32], start: f64, end: f64, sr: u32, hop_length: usize) -> f32 {
    if curve.is_empty() || start >= end {
        return 0.0;
    }
    let hop_duration = hop_length as f64 / f64::from(sr.max(1));
    let start_frame = ((start / hop_duration) as usize).min(curve.len());
    let end_frame = ((end / hop_duration) as usize).min(curve.len());
    if start_frame >= end_frame {
        return 0.0;
    }
    curve[start_frame..end_frame].iter().sum::<f32>() / (end_frame - start_frame) as f32
}

/// Splits `duration` seconds of audio into labelled sections, using
/// boundary detection over the caller's MFCC/chroma feature matrices and
/// the raw signal's RMS energy curve for classification.
///
/// # Errors
///
/// Propagates [`crate::boundary::detect_boundaries`] errors.
pub fn analyze_sections(
    signal: &[f32],
    mfcc: Option<&Array2<f32>>,
    chroma: Option<&Array2<f32>>,
    sr: u32,
    duration: f64,
    config: &SectionConfig,
) -> AnalysisResult<Vec<Section>> {
    let boundary_config = crate::config::BoundaryConfig {
        n_fft: config.n_fft,
        hop_length: config.hop_length,
        kernel_size: config.kernel_size,
        threshold: config.boundary_threshold,
        peak_distance: config.min_section_sec,
        ..crate::config::BoundaryConfig::default()
    };
    let boundaries = detect_boundaries(mfcc, chroma, sr, config.hop_length, &boundary_config)?;
    let energy_curve = rms_energy_curve(signal, config.n_fft, config.hop_length);

    let mut edges = vec![0.0f64];
    edges.extend(boundaries.iter().map(|b| b.time));
    edges.push(duration);

    let mut sections: Vec<Section> = Vec::new();
    for window in edges.windows(2) {
        let (start, end) = (window[0], window[1]);
        if end - start < f64::from(config.min_section_sec) * 0.5 {
            continue;
        }
        let energy = section_energy(&energy_curve, start, end, sr, config.hop_length);
        sections.push(Section {
            start,
            end,
            energy_level: energy,
            confidence: 0.5,
            section_type: SectionType::Verse,
        });
    }

    classify_sections(&mut sections, config);
    Ok(sections)
}

fn classify_sections(sections: &mut [Section], config: &SectionConfig) {
    if sections.is_empty() {
        return;
    }
    let max_energy = sections.iter().map(|s| s.energy_level).fold(0.0f32, f32::max);
    if max_energy > 1e-6 {
        for section in sections.iter_mut() {
            section.energy_level /= max_energy;
        }
    }

    let snapshot: Vec<Section> = sections.to_vec();
    let n = snapshot.len();
    for (i, section) in sections.iter_mut().enumerate() {
        section.section_type = classify_one(&snapshot, i, n, config);
        section.confidence = 0.6 + 0.2 * section.energy_level;
    }
}

fn classify_one(sections: &[Section], i: usize, n: usize, config: &SectionConfig) -> SectionType {
    let section = sections[i];
    let is_first = i == 0;
    let is_last = i == n - 1;
    let relative_position = i as f32 / (n - 1).max(1) as f32;

    let energy = section.energy_level;
    let is_high_energy = energy > 0.7;
    let is_low_energy = energy < 0.3;
    let duration = section.duration();
    let is_short = duration < f64::from(config.min_section_sec);

    if is_first && is_low_energy {
        return SectionType::Intro;
    }
    if is_last && is_low_energy {
        return SectionType::Outro;
    }
    if is_first && duration < 10.0 {
        return SectionType::Intro;
    }
    if is_last && duration < 10.0 {
        return SectionType::Outro;
    }
    if is_high_energy && !is_first && !is_last {
        return SectionType::Chorus;
    }
    if is_short && i + 1 < n && sections[i + 1].energy_level > section.energy_level + 0.2 {
        return SectionType::PreChorus;
    }
    if is_low_energy && !is_first && !is_last {
        let prev_high = i > 0 && sections[i - 1].energy_level > 0.6;
        let next_high = i + 1 < n && sections[i + 1].energy_level > 0.6;
        if prev_high || next_high {
            return SectionType::Bridge;
        }
    }
    if relative_position > 0.1 && relative_position < 0.9 && !is_high_energy {
        return SectionType::Verse;
    }
    SectionType::Verse
}

/// Concatenates each section's type character in order, e.g. `"IAABCAO"`.
#[must_use]
pub fn form(sections: &[Section]) -> String {
    sections.iter().map(|s| s.section_type.as_char()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_block_signal_yields_intro_and_a_later_section() {
        let sr = 22050u32;
        let quiet: Vec<f32> = (0..sr * 3).map(|i| 0.01 * (i as f32 * 0.01).sin()).collect();
        let loud: Vec<f32> = (0..sr * 3).map(|i| 0.9 * (i as f32 * 0.05).sin()).collect();
        let mut signal = quiet;
        signal.extend(loud);

        let chroma = Array2::<f32>::from_shape_fn((12, signal.len() / 512), |(r, c)| {
            if c < signal.len() / 512 / 2 { (r == 0) as u8 as f32 } else { (r == 6) as u8 as f32 }
        });

        let config = SectionConfig {
            min_section_sec: 1.0,
            kernel_size: 8,
            threshold: 0.05,
            ..SectionConfig::default()
        };
        let duration = signal.len() as f64 / f64::from(sr);
        let sections = analyze_sections(&signal, None, Some(&chroma), sr, duration, &config).unwrap();
        assert!(!sections.is_empty());
        assert!(sections[0].section_type == SectionType::Intro || sections[0].energy_level < 0.5);
    }

    #[test]
    fn form_concatenates_type_characters() {
        let sections = vec![
            Section { start: 0.0, end: 1.0, energy_level: 0.1, confidence: 0.5, section_type: SectionType::Intro },
            Section { start: 1.0, end: 2.0, energy_level: 0.9, confidence: 0.5, section_type: SectionType::Chorus },
        ];
        assert_eq!(form(&sections), "IB");
    }
}
