//! The external collaborator boundary for audio ingestion.
//!
//! This crate never reads a file and never resamples. Callers decode and
//! resample audio themselves (or via their own `Resampler` impl) and hand
//! the result in as an [`AudioBuffer`]; every analyzer downstream only
//! depends on this module, never on a concrete codec.

use std::path::{Path, PathBuf};

use crate::errors::{AnalysisError, AnalysisResult};

/// Mono PCM samples at a fixed sample rate. Read-only once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidParameter`] if `sample_rate` is zero.
    #[inline]
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> AnalysisResult<Self> {
        if sample_rate == 0 {
            return Err(AnalysisError::invalid_parameter(
                "sample_rate",
                "must be positive",
            ));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    #[must_use]
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds, `N / sr`.
    #[must_use]
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Downmix an interleaved multi-channel buffer to mono by averaging
    /// channels, the way external decoders are expected to before handing
    /// samples to this crate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
        if channels <= 1 {
            return interleaved.to_vec();
        }
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// A black-box high-quality resampler. The core calls this but never
/// implements it; production code typically backs it with `rubato` or an
/// equivalent external crate.
pub trait Resampler {
    /// # Errors
    ///
    /// Implementations should return [`AnalysisError::InvalidParameter`] for
    /// non-positive rates.
    fn resample(&self, samples: &[f32], src_sr: u32, dst_sr: u32) -> AnalysisResult<Vec<f32>>;
}

/// Marker type naming where a file would have come from, kept only so
/// error messages can point at a path; this crate never opens it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub path: PathBuf,
}

impl AudioSource {
    #[must_use]
    #[inline]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }

    /// Reserved for the audio-IO collaborator; this crate never reads files
    /// itself, so this always fails.
    ///
    /// # Errors
    ///
    /// Always returns [`AnalysisError::NotImplemented`].
    pub fn load(&self) -> AnalysisResult<AudioBuffer> {
        if !self.path.exists() {
            return Err(AnalysisError::FileNotFound(self.path.clone()));
        }
        Err(AnalysisError::NotImplemented(
            "audio decoding is an external collaborator; construct an AudioBuffer directly",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_rejects_zero_sample_rate() {
        assert!(AudioBuffer::new(vec![0.0; 10], 0).is_err());
    }

    #[test]
    fn buffer_duration() {
        let buf = AudioBuffer::new(vec![0.0; 22050], 22050).unwrap();
        assert!((buf.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn downmix_averages_interleaved_stereo() {
        let interleaved = [1.0, 3.0, 2.0, 4.0];
        let mono = AudioBuffer::downmix(&interleaved, 2);
        assert_eq!(mono, vec![2.0, 3.0]);
    }

    #[test]
    fn missing_file_reports_file_not_found() {
        let source = AudioSource::new("/nonexistent/path/to/audio.flac");
        assert!(matches!(
            source.load(),
            Err(AnalysisError::FileNotFound(_))
        ));
    }
}
