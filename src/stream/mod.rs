//! Streaming (frame-at-a-time) analysis: the L5 counterpart to the batch
//! analyzers in [`crate::analyzer`], built for callers who feed audio in as
//! it arrives (live capture, progressive file decode) rather than handing
//! over a whole signal up front.
//!
//! [`StreamAnalyzer`] buffers raw samples into overlapping `n_fft`-sample
//! windows, runs one small per-frame pipeline per hop, and maintains
//! running BPM/key/chord estimates that only sharpen as more audio arrives.
//! It never reconstructs a batch [`crate::spectrogram::Spectrogram`] over
//! the whole signal; each hop gets its own single-frame transform so memory
//! use stays bounded regardless of stream length.

mod bars;
mod frame;
mod patterns;
mod progressive;

pub use bars::{BarChord, MAX_CHROMA_HISTORY_FRAMES};
pub use frame::{FrameBuffer, QuantizedFrameBufferI16, QuantizedFrameBufferU8, StreamFrame};
pub use patterns::{ChordPattern, VotedDegree, PATTERNS, PATTERN_LOCK_THRESHOLD};
pub use progressive::{ChordChange, ProgressiveEstimate};

use std::collections::VecDeque;

use ndarray::Array2;

use crate::chord::ChordAnalyzer;
use crate::chord_templates::ChordQuality;
use crate::config::{BpmConfig, ChordConfig, KeyConfig, QuantizeConfig, StreamConfig};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::mel::mel_filterbank;
use crate::chroma::chroma_filterbank;
use crate::primitives::fft::rfft;
use crate::primitives::window::window;

use bars::BarVoter;
use patterns::{best_pattern_match, min_bars_for_lock, voted_progression};
use progressive::{match_chord, median_chroma, update_bpm, update_key};

fn l2_normalize(values: &mut [f32; 12]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-10 {
        for v in values {
            *v /= norm;
        }
    }
}

/// Width of the recent-chroma window median-filtered before per-frame chord
/// template matching; short enough to track real chord changes, long
/// enough to reject single-frame noise.
const CHORD_SMOOTHING_FRAMES: usize = 8;

/// Minimum template-match correlation before a per-frame chord estimate is
/// trusted; below this, the previous committed chord is held instead.
const CHORD_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Minimum time a chord must hold before a change is recorded in the
/// progression, so single unstable frames don't each spawn a chord change.
const CHORD_MIN_DURATION_SEC: f64 = 0.3;

/// Minimum spacing between batch-style chord-progression replays.
const CHORD_ANALYSIS_INTERVAL_SEC: f64 = 2.0;

/// Minimum accumulated frames before a batch-style chord-progression replay
/// is worth running.
const MIN_FRAMES_FOR_CHORD_ANALYSIS: usize = 50;

/// Minimum BPM confidence before bar-synchronous chord voting begins.
const BAR_VOTING_BPM_CONFIDENCE: f32 = 0.5;

/// Frame-at-a-time analyzer. Owns its own bounded state; feed it raw
/// samples via [`Self::process`] and pull results back out with
/// [`Self::drain_frames`]/[`Self::frame_buffer`]/[`Self::progressive`].
pub struct StreamAnalyzer {
    config: StreamConfig,
    mel_fb: Array2<f32>,
    chroma_fb: Array2<f32>,
    bpm_config: BpmConfig,
    key_config: KeyConfig,
    chord_config: ChordConfig,

    sample_buffer: VecDeque<f32>,
    total_samples: u64,
    frame_counter: usize,
    frames_since_emit: usize,

    prev_log_mel: Option<Vec<f32>>,
    onset_history: Vec<f32>,
    chroma_history: Vec<[f32; 12]>,
    chord_smoothing_window: VecDeque<[f32; 12]>,
    accumulated_chroma: Vec<[f32; 12]>,

    progressive: ProgressiveEstimate,
    bar_voter: Option<BarVoter>,
    beats_per_bar: u8,
    last_bpm_update_sec: f64,
    last_key_update_sec: f64,
    last_chord_analysis_sec: f64,
    prev_stable_chord: Option<(u8, ChordQuality)>,
    chord_stable_time: f64,
    expected_total_bars: Option<usize>,

    frames: Vec<StreamFrame>,
}

impl StreamAnalyzer {
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidParameter`] if `n_fft`/`hop_length`
    /// are non-positive, or propagates [`mel_filterbank`]/
    /// [`chroma_filterbank`] errors.
    pub fn new(config: StreamConfig) -> AnalysisResult<Self> {
        if config.n_fft == 0 || config.hop_length == 0 {
            return Err(AnalysisError::invalid_parameter(
                "n_fft/hop_length",
                "must be positive",
            ));
        }

        let mel_config = crate::config::MelFilterConfig {
            n_mels: config.n_mels,
            fmin: config.fmin,
            fmax: config.fmax,
            ..crate::config::MelFilterConfig::default()
        };
        let mel_fb = mel_filterbank(config.sample_rate, config.n_fft, &mel_config)?;

        let chroma_config = crate::config::ChromaFilterConfig {
            tuning: 0.0,
            ..crate::config::ChromaFilterConfig::default()
        };
        let chroma_fb = chroma_filterbank(config.sample_rate, config.n_fft, &chroma_config)?;

        let bpm_config = BpmConfig {
            hop_length: config.hop_length,
            ..BpmConfig::default()
        };

        Ok(Self {
            mel_fb,
            chroma_fb,
            bpm_config,
            key_config: KeyConfig::default(),
            chord_config: ChordConfig::default(),
            sample_buffer: VecDeque::with_capacity(config.n_fft),
            total_samples: 0,
            frame_counter: 0,
            frames_since_emit: 0,
            prev_log_mel: None,
            onset_history: Vec::new(),
            chroma_history: Vec::new(),
            chord_smoothing_window: VecDeque::with_capacity(CHORD_SMOOTHING_FRAMES),
            accumulated_chroma: Vec::new(),
            progressive: ProgressiveEstimate::default(),
            bar_voter: None,
            beats_per_bar: 4,
            last_bpm_update_sec: f64::NEG_INFINITY,
            last_key_update_sec: f64::NEG_INFINITY,
            last_chord_analysis_sec: f64::NEG_INFINITY,
            prev_stable_chord: None,
            chord_stable_time: 0.0,
            expected_total_bars: None,
            frames: Vec::new(),
            config,
        })
    }

    /// Hint used to size the minimum-bars-before-lock threshold in pattern
    /// detection; has no effect on correctness if never called or wrong.
    pub fn set_expected_duration_seconds(&mut self, seconds: f64) {
        if self.progressive.bpm > 0.0 && self.beats_per_bar > 0 {
            let seconds_per_bar = 60.0 / f64::from(self.progressive.bpm) * f64::from(self.beats_per_bar);
            if seconds_per_bar > 0.0 {
                self.expected_total_bars = Some((seconds / seconds_per_bar).ceil() as usize);
                return;
            }
        }
        self.expected_total_bars = None;
    }

    /// Resets all running state, optionally continuing the absolute sample
    /// counter from `starting_sample_offset` rather than zero (for resuming
    /// a stream after a seek).
    pub fn reset(&mut self, starting_sample_offset: u64) {
        self.sample_buffer.clear();
        self.total_samples = starting_sample_offset;
        self.frame_counter = 0;
        self.frames_since_emit = 0;
        self.prev_log_mel = None;
        self.onset_history.clear();
        self.chroma_history.clear();
        self.chord_smoothing_window.clear();
        self.accumulated_chroma.clear();
        self.progressive = ProgressiveEstimate::default();
        self.bar_voter = None;
        self.last_bpm_update_sec = f64::NEG_INFINITY;
        self.last_key_update_sec = f64::NEG_INFINITY;
        self.last_chord_analysis_sec = f64::NEG_INFINITY;
        self.prev_stable_chord = None;
        self.chord_stable_time = 0.0;
        self.frames.clear();
    }

    /// Feeds `samples` (mono, at `StreamConfig::sample_rate`) into the
    /// analyzer, producing zero or more [`StreamFrame`]s internally;
    /// retrieve them with [`Self::drain_frames`] or the other accessors.
    ///
    /// # Errors
    ///
    /// Propagates errors from the per-frame pipeline (chord/key estimation
    /// never fail; this can currently only fail if a filterbank built at
    /// construction time turns out empty, which [`Self::new`] already
    /// guards against).
    pub fn process(&mut self, samples: &[f32]) -> AnalysisResult<()> {
        for &sample in samples {
            self.sample_buffer.push_back(sample);
            self.total_samples += 1;
            if self.sample_buffer.len() > self.config.n_fft {
                self.sample_buffer.pop_front();
            }
            if self.sample_buffer.len() == self.config.n_fft {
                // a hop boundary is reached once n_fft samples have been
                // seen and every `hop_length` samples thereafter.
                let samples_past_window = self.total_samples - self.config.n_fft as u64;
                if samples_past_window % self.config.hop_length as u64 == 0 {
                    self.process_frame()?;
                }
            }
        }
        Ok(())
    }

    fn process_frame(&mut self) -> AnalysisResult<()> {
        let windowed: Vec<f32> = {
            let win = window(self.config.window, self.config.n_fft, self.config.n_fft);
            self.sample_buffer
                .iter()
                .zip(win.iter())
                .map(|(&s, &w)| s * w)
                .collect()
        };

        let spectrum = rfft(&windowed);
        let power: Vec<f32> = spectrum.iter().map(num_complex::Complex32::norm_sqr).collect();
        let magnitude: Vec<f32> = spectrum.iter().map(num_complex::Complex32::norm).collect();

        let mel_power = self.mel_fb.dot(&ndarray::Array1::from_vec(power.clone()));
        let log_mel: Vec<f32> = mel_power.iter().map(|&v| v.max(1e-10).ln()).collect();

        let onset_strength = match &self.prev_log_mel {
            Some(prev) => log_mel
                .iter()
                .zip(prev.iter())
                .map(|(&cur, &prev)| (cur - prev).max(0.0))
                .sum(),
            None => 0.0,
        };
        let onset_valid = self.prev_log_mel.is_some();
        self.onset_history.push(onset_strength);
        self.prev_log_mel = Some(log_mel.clone());

        let chroma_power = self.chroma_fb.dot(&ndarray::Array1::from_vec(power));
        let mut chroma_frame = [0.0f32; 12];
        for (i, &v) in chroma_power.iter().take(12).enumerate() {
            chroma_frame[i] = v;
        }
        l2_normalize(&mut chroma_frame);
        if self.chroma_history.len() >= MAX_CHROMA_HISTORY_FRAMES {
            self.chroma_history.remove(0);
        }
        self.chroma_history.push(chroma_frame);

        self.chord_smoothing_window.push_back(chroma_frame);
        while self.chord_smoothing_window.len() > CHORD_SMOOTHING_FRAMES {
            self.chord_smoothing_window.pop_front();
        }

        self.accumulated_chroma.push(chroma_frame);

        let nyquist = f64::from(self.config.sample_rate) / 2.0;
        let freqs: Vec<f32> = (0..magnitude.len())
            .map(|b| b as f32 * self.config.sample_rate as f32 / self.config.n_fft as f32)
            .collect();
        let total_mag: f32 = magnitude.iter().sum();
        let centroid = if self.config.compute_spectral && total_mag > 1e-12 {
            Some(magnitude.iter().zip(freqs.iter()).map(|(&m, &f)| m * f).sum::<f32>() / total_mag)
        } else {
            None
        };
        let flatness = if self.config.compute_spectral && !magnitude.is_empty() {
            let n = magnitude.len() as f32;
            let arithmetic = total_mag / n;
            if arithmetic > 1e-12 {
                let log_sum: f32 = magnitude.iter().map(|&m| m.max(1e-10).ln()).sum();
                Some((log_sum / n).exp() / arithmetic)
            } else {
                Some(0.0)
            }
        } else {
            None
        };
        let rms = (power.iter().sum::<f32>() / power.len().max(1) as f32).sqrt();

        let time = self.total_samples as f64 / f64::from(self.config.sample_rate.max(1));

        let time_factor = (time / 30.0).min(1.0) as f32;
        let frame_duration = f64::from(self.config.hop_length) / f64::from(self.config.sample_rate.max(1));

        if time - self.last_bpm_update_sec >= f64::from(self.config.bpm_update_interval_sec) {
            if let Some((bpm, rel_confidence)) = update_bpm(&self.onset_history, self.config.sample_rate, &self.bpm_config) {
                let confidence = rel_confidence * time_factor;
                self.progressive.bpm = bpm;
                self.progressive.bpm_confidence = confidence;
                self.progressive.updated = true;

                if self.bar_voter.is_none() {
                    if confidence >= BAR_VOTING_BPM_CONFIDENCE && bpm > 0.0 {
                        let seconds_per_bar = 60.0 / f64::from(bpm) * f64::from(self.beats_per_bar.max(1));
                        let retroactive = bars::retroactive_bar_chords(
                            &self.chroma_history,
                            seconds_per_bar,
                            frame_duration,
                            CHORD_SMOOTHING_FRAMES,
                            CHORD_CONFIDENCE_THRESHOLD,
                            self.chord_config.use_triads_only,
                        );
                        self.progressive.bar_chord_progression.extend(retroactive);
                        self.bar_voter = Some(BarVoter::new(bpm, self.beats_per_bar));
                    }
                } else if let Some(voter) = &mut self.bar_voter {
                    voter.retune(bpm, self.beats_per_bar);
                }
            }
            self.last_bpm_update_sec = time;
        }

        if time - self.last_key_update_sec >= f64::from(self.config.key_update_interval_sec) {
            let (root, minor, correlation) = update_key(&self.chroma_history, &self.key_config);
            self.progressive.key_root = root;
            self.progressive.key_minor = minor;
            self.progressive.key_confidence = (((correlation + 1.0) / 2.0) as f32 * time_factor).clamp(0.0, 1.0);
            self.last_key_update_sec = time;
        }

        // Per-frame chord detection, from a median over the last few frames
        // rather than a single noisy frame.
        let smoothed = median_chroma(&self.chord_smoothing_window);
        let (new_root, new_quality, new_corr) = match_chord(&smoothed, self.chord_config.use_triads_only);
        let new_confidence = new_corr.max(0.0);

        if new_confidence >= CHORD_CONFIDENCE_THRESHOLD {
            self.progressive.chord_root = new_root;
            self.progressive.chord_quality = new_quality;
            self.progressive.chord_confidence = new_confidence;
        } else {
            // Low confidence: hold the previously committed chord, but
            // report the weaker confidence so callers can see it waver.
            self.progressive.chord_confidence = new_confidence;
        }

        if new_confidence >= CHORD_CONFIDENCE_THRESHOLD {
            match self.prev_stable_chord {
                Some((root, quality)) if root == new_root && quality == new_quality => {
                    self.chord_stable_time += frame_duration;
                }
                _ => {
                    if let Some((prev_root, prev_quality)) = self.prev_stable_chord {
                        if self.chord_stable_time >= CHORD_MIN_DURATION_SEC {
                            let chord_start = time - self.chord_stable_time;
                            let already_last = self.progressive.chord_progression.last().is_some_and(|c| {
                                c.root == prev_root && c.quality == prev_quality
                            });
                            if !already_last {
                                self.progressive.chord_progression.push(ChordChange {
                                    root: prev_root,
                                    quality: prev_quality,
                                    start_time: chord_start,
                                    confidence: new_confidence,
                                });
                            }
                        }
                    }
                    self.prev_stable_chord = Some((new_root, new_quality));
                    self.chord_stable_time = frame_duration;
                }
            }
        }

        // Periodically replace the progression with a full batch-style
        // re-analysis of everything accumulated so far, so streaming
        // converges on the same segmentation a batch run would produce.
        if time - self.last_chord_analysis_sec >= CHORD_ANALYSIS_INTERVAL_SEC
            && self.accumulated_chroma.len() >= MIN_FRAMES_FOR_CHORD_ANALYSIS
        {
            let n_frames = self.accumulated_chroma.len();
            let mut transposed = Array2::<f32>::zeros((12, n_frames));
            for (f, frame) in self.accumulated_chroma.iter().enumerate() {
                for (c, &v) in frame.iter().enumerate() {
                    transposed[[c, f]] = v;
                }
            }
            let replay_config = ChordConfig {
                smoothing_window: 2.0,
                min_duration: 0.3,
                threshold: self.chord_config.threshold,
                use_triads_only: true,
                n_fft: self.config.n_fft,
                hop_length: self.config.hop_length,
            };
            if let Ok(analyzer) = ChordAnalyzer::new(&transposed, self.config.sample_rate, self.config.hop_length, &replay_config) {
                self.progressive.chord_progression = analyzer
                    .chords()
                    .iter()
                    .map(|c| ChordChange {
                        root: c.root,
                        quality: c.quality,
                        start_time: c.start,
                        confidence: c.confidence,
                    })
                    .collect();
            }
            self.last_chord_analysis_sec = time;
            self.progressive.updated = true;
        }

        if let Some(voter) = &mut self.bar_voter {
            let candidate = (new_confidence >= CHORD_CONFIDENCE_THRESHOLD).then_some((new_root, new_quality, new_confidence));
            if let Some(bar) = voter.vote(time, candidate) {
                self.progressive.bar_chord_progression.push(bar);
                self.progressive.voted_pattern = voted_progression(&self.progressive.bar_chord_progression, self.progressive.key_root)
                    .into_iter()
                    .map(|v| (v.degree, v.quality))
                    .collect();
                let observed: Vec<(u8, ChordQuality)> = self.progressive.voted_pattern.clone();
                let min_bars = self.progressive.bar_chord_progression.len();
                if let Some((name, score)) = best_pattern_match(&observed) {
                    let min_required = min_bars_for_lock(4, self.expected_total_bars);
                    if score >= PATTERN_LOCK_THRESHOLD && min_bars >= min_required {
                        self.progressive.detected_pattern_name = Some(name);
                    }
                    self.progressive.pattern_score = score;
                }
            }
        }

        self.progressive.accumulated_seconds = time;
        self.progressive.used_frames = self.frame_counter + 1;

        self.frames_since_emit += 1;
        if self.frames_since_emit >= self.config.emit_every_n_frames {
            self.frames_since_emit = 0;
            self.frames.push(StreamFrame {
                frame_index: self.frame_counter,
                time,
                magnitude: if self.config.compute_magnitude {
                    Some(downsample(&magnitude, self.config.magnitude_downsample))
                } else {
                    None
                },
                mel: if self.config.compute_mel { Some(log_mel) } else { None },
                chroma: if self.config.compute_chroma { Some(chroma_frame) } else { None },
                centroid,
                flatness,
                rms,
                onset_strength,
                onset_valid,
                chord_root: Some(self.progressive.chord_root),
                chord_quality: Some(self.progressive.chord_quality),
                chord_confidence: self.progressive.chord_confidence,
            });
        }

        self.frame_counter += 1;
        Ok(())
    }

    /// Finalizes any in-progress bar so its chord vote is not lost when the
    /// stream ends mid-bar.
    pub fn finish(&mut self) {
        if let Some(voter) = &mut self.bar_voter {
            if let Some(bar) = voter.flush() {
                self.progressive.bar_chord_progression.push(bar);
            }
        }
    }

    #[must_use]
    pub fn drain_frames(&mut self) -> Vec<StreamFrame> {
        std::mem::take(&mut self.frames)
    }

    #[must_use]
    #[inline]
    pub fn frames(&self) -> &[StreamFrame] {
        &self.frames
    }

    #[must_use]
    pub fn frame_buffer(&self) -> FrameBuffer {
        FrameBuffer::from_frames(&self.frames)
    }

    #[must_use]
    pub fn quantized_u8(&self, config: &QuantizeConfig) -> QuantizedFrameBufferU8 {
        QuantizedFrameBufferU8::from_buffer(&self.frame_buffer(), config)
    }

    #[must_use]
    pub fn quantized_i16(&self, config: &QuantizeConfig) -> QuantizedFrameBufferI16 {
        QuantizedFrameBufferI16::from_buffer(&self.frame_buffer(), config)
    }

    #[must_use]
    #[inline]
    pub fn progressive(&self) -> &ProgressiveEstimate {
        &self.progressive
    }

    #[must_use]
    #[inline]
    pub fn bar_chords(&self) -> &[BarChord] {
        &self.progressive.bar_chord_progression
    }
}

fn downsample(values: &[f32], factor: usize) -> Vec<f32> {
    if factor <= 1 {
        return values.to_vec();
    }
    values.iter().step_by(factor).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn click_track(sr: u32, bpm: f32, n_beats: usize) -> Vec<f32> {
        let beat_interval = (60.0 / bpm * sr as f32) as usize;
        let mut out = vec![0.0f32; beat_interval * n_beats];
        for beat in 0..n_beats {
            let start = beat * beat_interval;
            for i in 0..200.min(out.len() - start) {
                out[start + i] = (1.0 - i as f32 / 200.0) * (2.0 * PI * 1000.0 * i as f32 / sr as f32).sin();
            }
        }
        out
    }

    #[test]
    fn streaming_emits_one_frame_per_hop_after_warmup() {
        let config = StreamConfig {
            sample_rate: 22050,
            n_fft: 1024,
            hop_length: 256,
            ..StreamConfig::default()
        };
        let mut analyzer = StreamAnalyzer::new(config.clone()).unwrap();
        let signal = click_track(config.sample_rate, 120.0, 8);
        analyzer.process(&signal).unwrap();
        let frames = analyzer.drain_frames();
        let expected = (signal.len() - config.n_fft) / config.hop_length + 1;
        assert_eq!(frames.len(), expected);
    }

    #[test]
    fn first_frame_onset_is_marked_invalid() {
        let config = StreamConfig {
            sample_rate: 22050,
            n_fft: 1024,
            hop_length: 512,
            ..StreamConfig::default()
        };
        let mut analyzer = StreamAnalyzer::new(config.clone()).unwrap();
        let signal = click_track(config.sample_rate, 120.0, 4);
        analyzer.process(&signal).unwrap();
        let frames = analyzer.drain_frames();
        assert!(!frames[0].onset_valid);
        assert!(frames[1].onset_valid);
    }

    #[test]
    fn processing_in_small_chunks_matches_processing_in_one_call() {
        let config = StreamConfig {
            sample_rate: 22050,
            n_fft: 512,
            hop_length: 256,
            ..StreamConfig::default()
        };
        let signal = click_track(config.sample_rate, 100.0, 6);

        let mut whole = StreamAnalyzer::new(config.clone()).unwrap();
        whole.process(&signal).unwrap();
        let whole_frames = whole.drain_frames();

        let mut chunked = StreamAnalyzer::new(config).unwrap();
        for chunk in signal.chunks(97) {
            chunked.process(chunk).unwrap();
        }
        let chunked_frames = chunked.drain_frames();

        assert_eq!(whole_frames.len(), chunked_frames.len());
        for (a, b) in whole_frames.iter().zip(chunked_frames.iter()) {
            assert!((a.rms - b.rms).abs() < 1e-5);
        }
    }

    #[test]
    fn rejects_zero_hop_length() {
        let config = StreamConfig {
            hop_length: 0,
            ..StreamConfig::default()
        };
        assert!(StreamAnalyzer::new(config).is_err());
    }
}
