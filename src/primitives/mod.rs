//! L1 primitives: FFT, windowing, biquad IIR, DCT-II and sliding-window
//! median. Everything above this layer (spectrograms, filterbanks,
//! analyzers) is built only out of these.

pub mod biquad;
pub mod dct;
pub mod fft;
pub mod median;
pub mod window;

pub use biquad::{Biquad, BiquadCoeffs};
pub use dct::DctPlanner;
pub use fft::{irfft, rfft};
pub use median::SlidingMedian;
pub use window::{hann, window};
