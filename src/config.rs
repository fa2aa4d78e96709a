//! Configuration structs for every analyzer, per the recognized-options
//! table in the external interfaces section. Each carries a hand-written
//! `Default`, matching the teacher's preference for explicit defaults over
//! `derive(Default)` whenever the defaults aren't all-zero.

use strum::{Display, EnumString};

/// Window function used by [`crate::spectrogram::Spectrogram`] and every
/// other framed analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum WindowType {
    Hann,
    Hamming,
    Blackman,
    Rect,
}

impl Default for WindowType {
    #[inline]
    fn default() -> Self {
        Self::Hann
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MelNorm {
    None,
    Slaney,
}

impl Default for MelNorm {
    #[inline]
    fn default() -> Self {
        Self::Slaney
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum KeyProfileType {
    KrumhanslSchmuckler,
    Temperley,
}

impl Default for KeyProfileType {
    #[inline]
    fn default() -> Self {
        Self::KrumhanslSchmuckler
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutputFormat {
    Float32,
    Int16,
    Uint8,
}

impl Default for StreamOutputFormat {
    #[inline]
    fn default() -> Self {
        Self::Float32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StftConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    /// `0` means "use `n_fft`".
    pub win_length: usize,
    pub window: WindowType,
    pub center: bool,
}

impl Default for StftConfig {
    #[inline]
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            win_length: 0,
            window: WindowType::Hann,
            center: true,
        }
    }
}

impl StftConfig {
    #[must_use]
    #[inline]
    pub fn effective_win_length(&self) -> usize {
        if self.win_length == 0 {
            self.n_fft
        } else {
            self.win_length
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MelFilterConfig {
    pub n_mels: usize,
    pub fmin: f64,
    /// `0.0` means "use `sr / 2`".
    pub fmax: f64,
    pub htk: bool,
    pub norm: MelNorm,
}

impl Default for MelFilterConfig {
    #[inline]
    fn default() -> Self {
        Self {
            n_mels: 128,
            fmin: 0.0,
            fmax: 0.0,
            htk: false,
            norm: MelNorm::Slaney,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromaFilterConfig {
    pub n_chroma: usize,
    /// Tuning offset, in fractions of a semitone.
    pub tuning: f64,
    pub fmin: f64,
    pub n_octaves: u32,
}

impl Default for ChromaFilterConfig {
    #[inline]
    fn default() -> Self {
        Self {
            n_chroma: 12,
            tuning: 0.0,
            fmin: 32.70, // C1
            n_octaves: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetConfig {
    pub lag: usize,
    pub detrend: bool,
    pub center: bool,
}

impl Default for OnsetConfig {
    #[inline]
    fn default() -> Self {
        Self {
            lag: 1,
            detrend: false,
            center: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetDetectConfig {
    /// `0.0` means adaptive.
    pub threshold: f32,
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    pub delta: f32,
    pub wait: usize,
    pub backtrack: bool,
    pub backtrack_range: usize,
}

impl Default for OnsetDetectConfig {
    #[inline]
    fn default() -> Self {
        Self {
            threshold: 0.0,
            pre_max: 3,
            post_max: 3,
            pre_avg: 3,
            post_avg: 5,
            delta: 0.07,
            wait: 3,
            backtrack: false,
            backtrack_range: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpmConfig {
    pub bpm_min: f32,
    pub bpm_max: f32,
    pub start_bpm: f32,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for BpmConfig {
    #[inline]
    fn default() -> Self {
        Self {
            bpm_min: 60.0,
            bpm_max: 200.0,
            start_bpm: 120.0,
            n_fft: 2048,
            hop_length: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatConfig {
    pub start_bpm: f32,
    pub bpm_min: f32,
    pub bpm_max: f32,
    pub tightness: f32,
    pub trim: bool,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for BeatConfig {
    #[inline]
    fn default() -> Self {
        Self {
            start_bpm: 120.0,
            bpm_min: 60.0,
            bpm_max: 200.0,
            tightness: 100.0,
            trim: true,
            n_fft: 2048,
            hop_length: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub profile_type: KeyProfileType,
}

impl Default for KeyConfig {
    #[inline]
    fn default() -> Self {
        Self {
            n_fft: 4096,
            hop_length: 1024,
            profile_type: KeyProfileType::KrumhanslSchmuckler,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChordConfig {
    pub min_duration: f32,
    pub smoothing_window: f32,
    pub threshold: f32,
    pub use_triads_only: bool,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for ChordConfig {
    #[inline]
    fn default() -> Self {
        Self {
            min_duration: 0.2,
            smoothing_window: 0.3,
            threshold: 0.5,
            use_triads_only: false,
            n_fft: 4096,
            hop_length: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub kernel_size: usize,
    pub threshold: f32,
    pub n_mfcc: usize,
    pub n_chroma: usize,
    pub peak_distance: f32,
    pub use_mfcc: bool,
    pub use_chroma: bool,
}

impl Default for BoundaryConfig {
    #[inline]
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            kernel_size: 32,
            threshold: 0.1,
            n_mfcc: 13,
            n_chroma: 12,
            peak_distance: 1.0,
            use_mfcc: true,
            use_chroma: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub min_section_sec: f32,
    pub boundary_threshold: f32,
    pub kernel_size: usize,
}

impl Default for SectionConfig {
    #[inline]
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            min_section_sec: 8.0,
            boundary_threshold: 0.1,
            kernel_size: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HpssConfig {
    pub kernel_size_harmonic: usize,
    pub kernel_size_percussive: usize,
    pub power: f32,
    pub margin_harmonic: f32,
    pub margin_percussive: f32,
    pub use_soft_mask: bool,
}

impl Default for HpssConfig {
    #[inline]
    fn default() -> Self {
        Self {
            kernel_size_harmonic: 31,
            kernel_size_percussive: 31,
            power: 2.0,
            margin_harmonic: 1.0,
            margin_percussive: 1.0,
            use_soft_mask: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseVocoderConfig {
    pub hop_length: usize,
}

impl Default for PhaseVocoderConfig {
    #[inline]
    fn default() -> Self {
        Self { hop_length: 512 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchConfig {
    pub frame_length: usize,
    pub hop_length: usize,
    pub fmin: f32,
    pub fmax: f32,
    pub threshold: f32,
    pub fill_na: bool,
}

impl Default for PitchConfig {
    #[inline]
    fn default() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
            fmin: 65.0,
            fmax: 2093.0,
            threshold: 0.1,
            fill_na: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub window: WindowType,
    pub compute_magnitude: bool,
    pub compute_mel: bool,
    pub compute_chroma: bool,
    pub compute_onset: bool,
    pub compute_spectral: bool,
    pub n_mels: usize,
    pub fmin: f64,
    pub fmax: f64,
    pub tuning_ref_hz: f64,
    pub output_format: StreamOutputFormat,
    pub emit_every_n_frames: usize,
    pub magnitude_downsample: usize,
    pub key_update_interval_sec: f32,
    pub bpm_update_interval_sec: f32,
}

impl Default for StreamConfig {
    #[inline]
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            n_fft: 2048,
            hop_length: 512,
            window: WindowType::Hann,
            compute_magnitude: true,
            compute_mel: true,
            compute_chroma: true,
            compute_onset: true,
            compute_spectral: true,
            n_mels: 40,
            fmin: 0.0,
            fmax: 0.0,
            tuning_ref_hz: 440.0,
            output_format: StreamOutputFormat::Float32,
            emit_every_n_frames: 1,
            magnitude_downsample: 1,
            key_update_interval_sec: 2.0,
            bpm_update_interval_sec: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicsConfig {
    pub window_sec: f32,
    pub hop_length: usize,
    pub compression_threshold: f32,
}

impl Default for DynamicsConfig {
    #[inline]
    fn default() -> Self {
        Self {
            window_sec: 0.4,
            hop_length: 512,
            compression_threshold: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RhythmConfig {
    pub start_bpm: f32,
    pub bpm_min: f32,
    pub bpm_max: f32,
    pub n_fft: usize,
    pub hop_length: usize,
    /// Inter-beat-interval ratio above which consecutive beats are treated
    /// as a swung long-short pair rather than straight eighths.
    pub swing_threshold: f32,
}

impl Default for RhythmConfig {
    #[inline]
    fn default() -> Self {
        Self {
            start_bpm: 120.0,
            bpm_min: 60.0,
            bpm_max: 200.0,
            n_fft: 2048,
            hop_length: 512,
            swing_threshold: 1.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimbreConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub n_mfcc: usize,
    pub window_sec: f32,
}

impl Default for TimbreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            n_mfcc: 13,
            window_sec: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizeConfig {
    pub mel_db_min: f32,
    pub mel_db_max: f32,
    pub onset_max: f32,
    pub rms_max: f32,
    pub centroid_max: f32,
}

impl Default for QuantizeConfig {
    #[inline]
    fn default() -> Self {
        Self {
            mel_db_min: -80.0,
            mel_db_max: 0.0,
            onset_max: 50.0,
            rms_max: 1.0,
            centroid_max: 11_025.0,
        }
    }
}
