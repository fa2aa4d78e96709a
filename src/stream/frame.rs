//! Per-frame streaming output: the AoS [`StreamFrame`] plus the SoA
//! [`FrameBuffer`] and quantised `QuantizedFrameBufferU8`/`...I16`
//! equivalents that drain it.

use crate::chord_templates::ChordQuality;
use crate::config::QuantizeConfig;

/// One analyzed frame, struct-of-arrays style (array-of-structs here: one
/// instance per frame).
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    pub frame_index: usize,
    pub time: f64,
    /// Present when `StreamConfig::compute_magnitude`, downsampled by
    /// `magnitude_downsample`.
    pub magnitude: Option<Vec<f32>>,
    /// Present when `StreamConfig::compute_mel`; log-power mel, natural log.
    pub mel: Option<Vec<f32>>,
    /// Present when `StreamConfig::compute_chroma`; L2-normalised, length 12.
    pub chroma: Option<[f32; 12]>,
    pub centroid: Option<f32>,
    pub flatness: Option<f32>,
    pub rms: f32,
    pub onset_strength: f32,
    /// `false` only for the very first emitted frame, which has no
    /// predecessor to diff against.
    pub onset_valid: bool,
    pub chord_root: Option<u8>,
    pub chord_quality: Option<ChordQuality>,
    pub chord_confidence: f32,
}

/// Struct-of-arrays drain of a run of [`StreamFrame`]s. `mel`/`chroma` are
/// row-major with the frame axis outermost: `mel[f * n_mels + m]` is frame
/// `f`, mel bin `m`.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    pub frame_index: Vec<usize>,
    pub time: Vec<f64>,
    pub magnitude: Vec<f32>,
    pub n_magnitude_bins: usize,
    pub mel: Vec<f32>,
    pub n_mels: usize,
    pub chroma: Vec<f32>,
    pub centroid: Vec<f32>,
    pub flatness: Vec<f32>,
    pub rms: Vec<f32>,
    pub onset_strength: Vec<f32>,
    pub onset_valid: Vec<bool>,
    pub chord_root: Vec<u8>,
    pub chord_quality: Vec<ChordQuality>,
    pub chord_confidence: Vec<f32>,
}

impl FrameBuffer {
    #[must_use]
    pub fn from_frames(frames: &[StreamFrame]) -> Self {
        let mut buffer = Self::default();
        buffer.n_mels = frames.iter().find_map(|f| f.mel.as_ref()).map_or(0, Vec::len);
        buffer.n_magnitude_bins = frames.iter().find_map(|f| f.magnitude.as_ref()).map_or(0, Vec::len);

        for frame in frames {
            buffer.frame_index.push(frame.frame_index);
            buffer.time.push(frame.time);
            if let Some(magnitude) = &frame.magnitude {
                buffer.magnitude.extend_from_slice(magnitude);
            }
            if let Some(mel) = &frame.mel {
                buffer.mel.extend_from_slice(mel);
            }
            if let Some(chroma) = &frame.chroma {
                buffer.chroma.extend_from_slice(chroma);
            }
            buffer.centroid.push(frame.centroid.unwrap_or(0.0));
            buffer.flatness.push(frame.flatness.unwrap_or(0.0));
            buffer.rms.push(frame.rms);
            buffer.onset_strength.push(frame.onset_strength);
            buffer.onset_valid.push(frame.onset_valid);
            buffer.chord_root.push(frame.chord_root.unwrap_or(0));
            buffer.chord_quality.push(frame.chord_quality.unwrap_or_default());
            buffer.chord_confidence.push(frame.chord_confidence);
        }
        buffer
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.frame_index.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frame_index.is_empty()
    }
}

fn quantize_unipolar(value: f32, max: f32, levels: f32) -> f32 {
    if max <= 0.0 {
        return 0.0;
    }
    (value.clamp(0.0, max) / max * levels).round()
}

fn quantize_db(value_db: f32, min_db: f32, max_db: f32, levels: f32) -> f32 {
    if max_db <= min_db {
        return 0.0;
    }
    let clamped = value_db.clamp(min_db, max_db);
    ((clamped - min_db) / (max_db - min_db) * levels).round()
}

/// Quantised SoA drain, mel/onset/rms/centroid linearly mapped into
/// `0..=255`, chroma mapped from `[0,1]` into `0..=255`. Timestamps stay
/// `f32`.
#[derive(Debug, Clone, Default)]
pub struct QuantizedFrameBufferU8 {
    pub frame_index: Vec<usize>,
    pub time: Vec<f32>,
    pub mel: Vec<u8>,
    pub n_mels: usize,
    pub chroma: Vec<u8>,
    pub centroid: Vec<u8>,
    pub onset_strength: Vec<u8>,
    pub rms: Vec<u8>,
}

impl QuantizedFrameBufferU8 {
    #[must_use]
    pub fn from_buffer(buffer: &FrameBuffer, config: &QuantizeConfig) -> Self {
        const LEVELS: f32 = 255.0;
        Self {
            frame_index: buffer.frame_index.clone(),
            time: buffer.time.iter().map(|&t| t as f32).collect(),
            mel: buffer
                .mel
                .iter()
                .map(|&v| {
                    let db = 10.0 * v.exp().max(1e-10).log10();
                    quantize_db(db, config.mel_db_min, config.mel_db_max, LEVELS) as u8
                })
                .collect(),
            n_mels: buffer.n_mels,
            chroma: buffer.chroma.iter().map(|&v| quantize_unipolar(v, 1.0, LEVELS) as u8).collect(),
            centroid: buffer
                .centroid
                .iter()
                .map(|&v| quantize_unipolar(v, config.centroid_max, LEVELS) as u8)
                .collect(),
            onset_strength: buffer
                .onset_strength
                .iter()
                .map(|&v| quantize_unipolar(v, config.onset_max, LEVELS) as u8)
                .collect(),
            rms: buffer.rms.iter().map(|&v| quantize_unipolar(v, config.rms_max, LEVELS) as u8).collect(),
        }
    }
}

/// Same layout as [`QuantizedFrameBufferU8`] but mapped into
/// `-32768..=32767`.
#[derive(Debug, Clone, Default)]
pub struct QuantizedFrameBufferI16 {
    pub frame_index: Vec<usize>,
    pub time: Vec<f32>,
    pub mel: Vec<i16>,
    pub n_mels: usize,
    pub chroma: Vec<i16>,
    pub centroid: Vec<i16>,
    pub onset_strength: Vec<i16>,
    pub rms: Vec<i16>,
}

impl QuantizedFrameBufferI16 {
    #[must_use]
    pub fn from_buffer(buffer: &FrameBuffer, config: &QuantizeConfig) -> Self {
        const LEVELS: f32 = 65_535.0;
        const OFFSET: f32 = 32_768.0;
        Self {
            frame_index: buffer.frame_index.clone(),
            time: buffer.time.iter().map(|&t| t as f32).collect(),
            mel: buffer
                .mel
                .iter()
                .map(|&v| {
                    let db = 10.0 * v.exp().max(1e-10).log10();
                    (quantize_db(db, config.mel_db_min, config.mel_db_max, LEVELS) - OFFSET) as i16
                })
                .collect(),
            n_mels: buffer.n_mels,
            chroma: buffer
                .chroma
                .iter()
                .map(|&v| (quantize_unipolar(v, 1.0, LEVELS) - OFFSET) as i16)
                .collect(),
            centroid: buffer
                .centroid
                .iter()
                .map(|&v| (quantize_unipolar(v, config.centroid_max, LEVELS) - OFFSET) as i16)
                .collect(),
            onset_strength: buffer
                .onset_strength
                .iter()
                .map(|&v| (quantize_unipolar(v, config.onset_max, LEVELS) - OFFSET) as i16)
                .collect(),
            rms: buffer
                .rms
                .iter()
                .map(|&v| (quantize_unipolar(v, config.rms_max, LEVELS) - OFFSET) as i16)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame(index: usize) -> StreamFrame {
        StreamFrame {
            frame_index: index,
            time: index as f64 * 0.01,
            magnitude: None,
            mel: Some(vec![0.0; 4]),
            chroma: Some([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            centroid: Some(1000.0),
            flatness: Some(0.1),
            rms: 0.5,
            onset_strength: 0.2,
            onset_valid: index > 0,
            chord_root: Some(0),
            chord_quality: Some(ChordQuality::Major),
            chord_confidence: 0.8,
        }
    }

    #[test]
    fn frame_buffer_concatenates_mel_rows_in_frame_order() {
        let frames = vec![sample_frame(0), sample_frame(1)];
        let buffer = FrameBuffer::from_frames(&frames);
        assert_eq!(buffer.n_mels, 4);
        assert_eq!(buffer.mel.len(), 8);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn first_frame_onset_invalid_rest_valid() {
        let frames = vec![sample_frame(0), sample_frame(1), sample_frame(2)];
        let buffer = FrameBuffer::from_frames(&frames);
        assert!(!buffer.onset_valid[0]);
        assert!(buffer.onset_valid[1..].iter().all(|&v| v));
    }

    #[test]
    fn quantized_u8_chroma_peak_maps_to_max_level() {
        let frames = vec![sample_frame(0)];
        let buffer = FrameBuffer::from_frames(&frames);
        let quantized = QuantizedFrameBufferU8::from_buffer(&buffer, &QuantizeConfig::default());
        assert_eq!(quantized.chroma[0], 255);
    }
}
