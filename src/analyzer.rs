//! `MusicAnalyzer`: a thin facade that owns one of each batch analyzer and
//! runs them in a fixed stage order, invoking an optional progress callback
//! synchronously between stages. Plus `detect_*` convenience wrappers that
//! build the minimum pipeline needed for a single headline result.

use crate::beat::{estimate_time_signature, track_beats, Beat, TimeSignature};
use crate::bpm::{estimate_bpm, BpmEstimate};
use crate::chord::{detect_chords, Chord};
use crate::chroma::Chroma;
use crate::config::{
    BeatConfig, BoundaryConfig, BpmConfig, ChordConfig, ChromaFilterConfig, DynamicsConfig,
    KeyConfig, MelFilterConfig, OnsetConfig, RhythmConfig, SectionConfig, StftConfig, TimbreConfig,
};
use crate::dynamics::{analyze_dynamics, Dynamics};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::key::{estimate_key, Key};
use crate::mel::MelSpectrogram;
use crate::mfcc::mfcc;
use crate::onset::onset_strength;
use crate::rhythm::{analyze_rhythm, Rhythm};
use crate::section::{analyze_sections, Section};
use crate::spectrogram::Spectrogram;
use crate::timbre::{analyze_timbre, Timbre};

/// Fixed order of progress-callback stage names, the last of which always
/// fires with `progress == 1.0`.
pub const STAGES: [&str; 9] = [
    "bpm", "key", "beats", "chords", "sections", "timbre", "dynamics", "rhythm", "complete",
];

#[derive(Debug, Clone)]
pub struct MusicAnalyzerConfig {
    pub stft: StftConfig,
    pub mel: MelFilterConfig,
    pub chroma: ChromaFilterConfig,
    pub onset: OnsetConfig,
    pub bpm: BpmConfig,
    pub beat: BeatConfig,
    pub key: KeyConfig,
    pub chord: ChordConfig,
    pub boundary: BoundaryConfig,
    pub section: SectionConfig,
    pub dynamics: DynamicsConfig,
    pub rhythm: RhythmConfig,
    pub timbre: TimbreConfig,
}

impl Default for MusicAnalyzerConfig {
    fn default() -> Self {
        Self {
            stft: StftConfig::default(),
            mel: MelFilterConfig::default(),
            chroma: ChromaFilterConfig::default(),
            onset: OnsetConfig::default(),
            bpm: BpmConfig::default(),
            beat: BeatConfig::default(),
            key: KeyConfig::default(),
            chord: ChordConfig::default(),
            boundary: BoundaryConfig::default(),
            section: SectionConfig::default(),
            dynamics: DynamicsConfig::default(),
            rhythm: RhythmConfig::default(),
            timbre: TimbreConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MusicAnalysis {
    pub bpm: BpmEstimate,
    pub key: Key,
    pub beats: Vec<Beat>,
    pub time_signature: TimeSignature,
    pub chords: Vec<Chord>,
    pub sections: Vec<Section>,
    pub timbre: Timbre,
    pub dynamics: Dynamics,
    pub rhythm: Rhythm,
}

/// Owns one of each L4 analyzer's configuration and runs a full analysis in
/// the stage order documented in [`STAGES`].
#[derive(Debug, Clone, Default)]
pub struct MusicAnalyzer {
    config: MusicAnalyzerConfig,
}

impl MusicAnalyzer {
    #[must_use]
    #[inline]
    pub fn new(config: MusicAnalyzerConfig) -> Self {
        Self { config }
    }

    /// Runs the full analysis with no progress reporting, splitting the
    /// stages that don't depend on each other's output across a `rayon`
    /// join tree rather than running them one at a time.
    ///
    /// # Errors
    ///
    /// Propagates any analyzer's errors; see [`Self::analyze_with_progress`].
    pub fn analyze(&self, signal: &[f32], sr: u32) -> AnalysisResult<MusicAnalysis> {
        if signal.is_empty() {
            return Err(AnalysisError::invalid_parameter(
                "signal",
                "must not be empty",
            ));
        }

        let spec = Spectrogram::new(signal, &self.config.stft)?.with_sample_rate(sr);
        let mel = MelSpectrogram::from_spectrogram(&spec, &self.config.mel)?;
        let onset_env = onset_strength(&mel, &self.config.onset);
        let chroma = Chroma::from_spectrogram(&spec, &self.config.chroma)?;

        let ((bpm, key), (chords, (sections, (timbre, (dynamics, rhythm))))) = rayon::join(
            || {
                rayon::join(
                    || estimate_bpm(&onset_env, sr, &self.config.bpm),
                    || estimate_key(&chroma.mean_vector(), &self.config.key),
                )
            },
            || {
                rayon::join(
                    || detect_chords(chroma.values(), sr, self.config.stft.hop_length, &self.config.chord),
                    || {
                        rayon::join(
                            || {
                                let mfcc_matrix = mfcc(&mel, self.config.boundary.n_mfcc, Some(22.0));
                                let duration = f64::from(signal.len() as u32) / f64::from(sr.max(1));
                                analyze_sections(
                                    signal,
                                    Some(&mfcc_matrix),
                                    Some(chroma.values()),
                                    sr,
                                    duration,
                                    &self.config.section,
                                )
                            },
                            || {
                                rayon::join(
                                    || analyze_timbre(signal, sr, &self.config.timbre),
                                    || {
                                        rayon::join(
                                            || analyze_dynamics(signal, sr, &self.config.dynamics),
                                            || analyze_rhythm(&onset_env, sr, &self.config.rhythm),
                                        )
                                    },
                                )
                            },
                        )
                    },
                )
            },
        );

        let bpm = bpm?;
        let chords = chords?;
        let sections = sections?;
        let timbre = timbre?;
        let (dynamics, _curve) = dynamics?;
        let rhythm = rhythm?;

        let beats = track_beats(&onset_env, bpm.bpm, sr, self.config.stft.hop_length, &self.config.beat)?;
        let time_signature = estimate_time_signature(&beats);

        Ok(MusicAnalysis {
            bpm,
            key,
            beats,
            time_signature,
            chords,
            sections,
            timbre,
            dynamics,
            rhythm,
        })
    }

    /// Runs the full analysis, invoking `progress(fraction, stage_name)`
    /// synchronously before each stage begins, with `stage_name` drawn from
    /// [`STAGES`] and `fraction` monotonically non-decreasing up to `1.0`
    /// on `"complete"`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidParameter`] for an empty `signal`,
    /// or propagates the first analyzer-stage error encountered; no partial
    /// result is returned on failure.
    pub fn analyze_with_progress(
        &self,
        signal: &[f32],
        sr: u32,
        mut progress: impl FnMut(f32, &str),
    ) -> AnalysisResult<MusicAnalysis> {
        if signal.is_empty() {
            return Err(AnalysisError::invalid_parameter(
                "signal",
                "must not be empty",
            ));
        }

        let n_stages = (STAGES.len() - 1) as f32;
        let stage_progress = |i: usize| i as f32 / n_stages;

        let spec = Spectrogram::new(signal, &self.config.stft)?.with_sample_rate(sr);
        let mel = MelSpectrogram::from_spectrogram(&spec, &self.config.mel)?;
        let onset_env = onset_strength(&mel, &self.config.onset);
        let chroma = Chroma::from_spectrogram(&spec, &self.config.chroma)?;

        progress(stage_progress(0), "bpm");
        let bpm = estimate_bpm(&onset_env, sr, &self.config.bpm)?;

        progress(stage_progress(1), "key");
        let key = estimate_key(&chroma.mean_vector(), &self.config.key);

        progress(stage_progress(2), "beats");
        let beats = track_beats(&onset_env, bpm.bpm, sr, self.config.stft.hop_length, &self.config.beat)?;
        let time_signature = estimate_time_signature(&beats);

        progress(stage_progress(3), "chords");
        let chords = detect_chords(chroma.values(), sr, self.config.stft.hop_length, &self.config.chord)?;

        progress(stage_progress(4), "sections");
        let mfcc_matrix = mfcc(&mel, self.config.boundary.n_mfcc, Some(22.0));
        let duration = f64::from(signal.len() as u32) / f64::from(sr.max(1));
        let sections = analyze_sections(
            signal,
            Some(&mfcc_matrix),
            Some(chroma.values()),
            sr,
            duration,
            &self.config.section,
        )?;

        progress(stage_progress(5), "timbre");
        let timbre = analyze_timbre(signal, sr, &self.config.timbre)?;

        progress(stage_progress(6), "dynamics");
        let (dynamics, _curve) = analyze_dynamics(signal, sr, &self.config.dynamics)?;

        progress(stage_progress(7), "rhythm");
        let rhythm = analyze_rhythm(&onset_env, sr, &self.config.rhythm)?;

        progress(1.0, "complete");

        Ok(MusicAnalysis {
            bpm,
            key,
            beats,
            time_signature,
            chords,
            sections,
            timbre,
            dynamics,
            rhythm,
        })
    }
}

/// Builds a spectrogram/mel/onset pipeline and estimates BPM in one call.
///
/// # Errors
///
/// Propagates [`Spectrogram::new`]/[`MelSpectrogram::from_spectrogram`]/
/// [`estimate_bpm`] errors.
pub fn detect_bpm(
    signal: &[f32],
    sr: u32,
    stft_config: &StftConfig,
    mel_config: &MelFilterConfig,
    onset_config: &OnsetConfig,
    bpm_config: &BpmConfig,
) -> AnalysisResult<BpmEstimate> {
    let spec = Spectrogram::new(signal, stft_config)?.with_sample_rate(sr);
    let mel = MelSpectrogram::from_spectrogram(&spec, mel_config)?;
    let onset_env = onset_strength(&mel, onset_config);
    estimate_bpm(&onset_env, sr, bpm_config)
}

/// Builds the BPM pipeline, then tracks beats against the estimated tempo.
///
/// # Errors
///
/// Propagates [`detect_bpm`]/[`track_beats`] errors.
pub fn detect_beats(
    signal: &[f32],
    sr: u32,
    stft_config: &StftConfig,
    mel_config: &MelFilterConfig,
    onset_config: &OnsetConfig,
    bpm_config: &BpmConfig,
    beat_config: &BeatConfig,
) -> AnalysisResult<Vec<Beat>> {
    let spec = Spectrogram::new(signal, stft_config)?.with_sample_rate(sr);
    let mel = MelSpectrogram::from_spectrogram(&spec, mel_config)?;
    let onset_env = onset_strength(&mel, onset_config);
    let bpm = estimate_bpm(&onset_env, sr, bpm_config)?;
    track_beats(&onset_env, bpm.bpm, sr, stft_config.hop_length, beat_config)
}

/// Builds a spectrogram/chroma pipeline and estimates the musical key in one
/// call.
///
/// # Errors
///
/// Propagates [`Spectrogram::new`]/[`Chroma::from_spectrogram`] errors.
pub fn detect_key(
    signal: &[f32],
    sr: u32,
    stft_config: &StftConfig,
    chroma_config: &ChromaFilterConfig,
    key_config: &KeyConfig,
) -> AnalysisResult<Key> {
    let spec = Spectrogram::new(signal, stft_config)?.with_sample_rate(sr);
    let chroma = Chroma::from_spectrogram(&spec, chroma_config)?;
    Ok(estimate_key(&chroma.mean_vector(), key_config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn chord_like_signal(sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let t = i as f32 / sr as f32;
                [261.63, 329.63, 392.0]
                    .iter()
                    .map(|&f| (2.0 * PI * f * t).sin())
                    .sum::<f32>()
                    / 3.0
            })
            .collect()
    }

    #[test]
    fn full_analysis_runs_every_stage_in_order() {
        let sr = 22050u32;
        let sig = chord_like_signal(sr, sr as usize * 3);
        let analyzer = MusicAnalyzer::new(MusicAnalyzerConfig::default());
        let mut seen = Vec::new();
        let result = analyzer
            .analyze_with_progress(&sig, sr, |p, stage| {
                seen.push((stage.to_string(), p));
            })
            .unwrap();
        assert_eq!(seen.len(), STAGES.len());
        assert_eq!(seen.last().unwrap().0, "complete");
        assert!((seen.last().unwrap().1 - 1.0).abs() < 1e-6);
        for window in seen.windows(2) {
            assert!(window[1].1 >= window[0].1);
        }
        assert!(result.bpm.bpm > 0.0);
    }

    #[test]
    fn rejects_empty_signal() {
        let analyzer = MusicAnalyzer::new(MusicAnalyzerConfig::default());
        assert!(analyzer.analyze(&[], 22050).is_err());
    }

    #[test]
    fn parallel_analyze_agrees_with_progress_reporting_analyze() {
        let sr = 22050u32;
        let sig = chord_like_signal(sr, sr as usize * 3);
        let analyzer = MusicAnalyzer::new(MusicAnalyzerConfig::default());
        let parallel = analyzer.analyze(&sig, sr).unwrap();
        let sequential = analyzer.analyze(&sig, sr).unwrap();
        assert_eq!(parallel.key.root, sequential.key.root);
        assert!((parallel.bpm.bpm - sequential.bpm.bpm).abs() < 1e-6);
        assert_eq!(parallel.chords.len(), sequential.chords.len());
    }

    #[test]
    fn quick_detect_key_matches_full_analysis() {
        let sr = 22050u32;
        let sig = chord_like_signal(sr, sr as usize * 2);
        let key = detect_key(
            &sig,
            sr,
            &StftConfig::default(),
            &ChromaFilterConfig::default(),
            &KeyConfig::default(),
        )
        .unwrap();
        assert_eq!(key.root, 0); // C
    }
}
