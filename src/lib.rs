//! A music information retrieval library: spectral and time-domain
//! features, tempo/beat/key/chord/section analysis, harmonic-percussive
//! source separation, a phase vocoder, and a frame-at-a-time streaming
//! analyzer, built on `ndarray`/`rustfft` rather than any one reference
//! implementation's FFI bindings.
//!
//! Layering, lowest to highest:
//! - [`primitives`]: FFT, windowing, biquad IIR, DCT-II, sliding median —
//!   everything else is built only out of these.
//! - [`spectrogram`], [`istft`], [`griffin_lim`]: the complex time-frequency
//!   representation and its inverses.
//! - [`mel`], [`chroma`], [`mfcc`], [`spectral`], [`onset`], [`pitch`]: L3
//!   features derived from a [`spectrogram::Spectrogram`].
//! - [`bpm`], [`beat`], [`key`], [`chord`], [`boundary`], [`section`],
//!   [`hpss`], [`phase_vocoder`], [`dynamics`], [`rhythm`], [`timbre`]: L4
//!   analyzers, each independently callable.
//! - [`analyzer`]: a facade running every L4 analyzer in one pass.
//! - [`stream`]: the streaming, frame-at-a-time counterpart to
//!   [`analyzer`].
//!
//! [`config`] holds every analyzer's configuration struct; [`errors`] holds
//! the shared [`errors::AnalysisError`]/[`errors::AnalysisResult`].

#![deny(clippy::missing_inline_in_public_items)]

pub mod analyzer;
pub mod beat;
pub mod boundary;
pub mod bpm;
pub mod chord;
pub mod chord_templates;
pub mod chroma;
pub mod config;
pub mod decoder;
pub mod dynamics;
pub mod errors;
pub mod griffin_lim;
pub mod hpss;
pub mod istft;
pub mod key;
pub mod mel;
pub mod mfcc;
pub mod onset;
pub mod phase_vocoder;
pub mod pitch;
pub mod primitives;
pub mod rhythm;
pub mod section;
pub mod spectral;
pub mod spectrogram;
pub mod stream;
pub mod timbre;

pub use analyzer::{MusicAnalysis, MusicAnalyzer, MusicAnalyzerConfig};
pub use errors::{AnalysisError, AnalysisResult};
pub use spectrogram::Spectrogram;
pub use stream::StreamAnalyzer;
