//! Bar-synchronous chord voting: once BPM and a time signature are
//! confident enough to place bar lines, each bar's frame-level chord
//! guesses are tallied and the majority wins, smoothing over the frame
//! noise a purely local chord estimate is prone to.

use std::collections::HashMap;

use crate::chord_templates::ChordQuality;

/// Bound on how much chroma history bar voting retains; at typical hop
/// sizes this comfortably covers several minutes of audio without
/// unbounded growth in a long-running stream.
pub(crate) const MAX_CHROMA_HISTORY_FRAMES: usize = 200_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarChord {
    pub bar_index: usize,
    pub root: u8,
    pub quality: ChordQuality,
    pub start_time: f64,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default)]
struct BarVotes {
    start_time: f64,
    tally: HashMap<(u8, ChordQuality), (u32, f32)>,
}

/// Accumulates per-frame chord votes into bars and emits a finalized
/// [`BarChord`] every time a bar boundary is crossed.
#[derive(Debug, Clone, Default)]
pub struct BarVoter {
    seconds_per_bar: f64,
    current_bar: Option<(usize, BarVotes)>,
    finalized: Vec<BarChord>,
}

impl BarVoter {
    #[must_use]
    pub fn new(bpm: f32, beats_per_bar: u8) -> Self {
        let seconds_per_beat = if bpm > 0.0 { 60.0 / f64::from(bpm) } else { 0.0 };
        Self {
            seconds_per_bar: seconds_per_beat * f64::from(beats_per_bar.max(1)),
            current_bar: None,
            finalized: Vec::new(),
        }
    }

    /// Re-derives the bar length from a refined tempo/meter without
    /// discarding bars already finalized.
    pub fn retune(&mut self, bpm: f32, beats_per_bar: u8) {
        let seconds_per_beat = if bpm > 0.0 { 60.0 / f64::from(bpm) } else { 0.0 };
        self.seconds_per_bar = seconds_per_beat * f64::from(beats_per_bar.max(1));
    }

    /// Advances bar tracking to absolute stream time `time`, finalizing and
    /// returning the previous bar's winner if `time` has crossed into a new
    /// bar. `candidate` is this frame's independently detected chord,
    /// `Some((root, quality, confidence))`; pass `None` when the frame's
    /// chord confidence was too low to trust (the bar boundary is still
    /// checked, the frame just isn't tallied).
    pub fn vote(&mut self, time: f64, candidate: Option<(u8, ChordQuality, f32)>) -> Option<BarChord> {
        if self.seconds_per_bar <= 0.0 {
            return None;
        }
        let bar_index = (time / self.seconds_per_bar).floor() as usize;

        let mut finalized = None;
        let needs_rollover = match &self.current_bar {
            Some((idx, _)) => *idx != bar_index,
            None => false,
        };
        if needs_rollover {
            if let Some((idx, votes)) = self.current_bar.take() {
                finalized = Some(finalize_bar(idx, &votes));
                self.finalized.push(finalized.unwrap());
            }
        }
        if self.current_bar.is_none() {
            self.current_bar = Some((
                bar_index,
                BarVotes {
                    start_time: bar_index as f64 * self.seconds_per_bar,
                    tally: HashMap::new(),
                },
            ));
        }
        if let Some((root, quality, confidence)) = candidate {
            if let Some((_, votes)) = &mut self.current_bar {
                let entry = votes.tally.entry((root, quality)).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += confidence;
            }
        }
        finalized
    }

    #[must_use]
    #[inline]
    pub fn finalized(&self) -> &[BarChord] {
        &self.finalized
    }

    /// Finalizes the in-progress bar without waiting for a rollover, for
    /// use when the stream ends mid-bar.
    pub fn flush(&mut self) -> Option<BarChord> {
        let (idx, votes) = self.current_bar.take()?;
        let chord = finalize_bar(idx, &votes);
        self.finalized.push(chord);
        Some(chord)
    }
}

/// Bins `chroma_history` (the full, capped history kept since the stream
/// started) into `frames_per_bar`-sized windows and emits one [`BarChord`]
/// per complete bar, run once when bar-synchronous voting first activates
/// so the bars seen before activation aren't silently dropped.
///
/// Each frame's chord is detected from a local average over a
/// `smoothing_frames`-wide window centered on it (not the live median
/// smoother; this matches how the original batch-style retroactive pass
/// smooths chroma before voting).
pub(crate) fn retroactive_bar_chords(
    chroma_history: &[[f32; 12]],
    seconds_per_bar: f64,
    frame_duration: f64,
    smoothing_frames: usize,
    confidence_threshold: f32,
    triads_only: bool,
) -> Vec<BarChord> {
    if chroma_history.is_empty() || seconds_per_bar <= 0.0 || frame_duration <= 0.0 {
        return Vec::new();
    }
    let frames_per_bar = (seconds_per_bar / frame_duration).round().max(1.0) as usize;
    let n_frames = chroma_history.len();
    let n_bars = n_frames / frames_per_bar;
    let half = smoothing_frames / 2;

    let mut bars = Vec::with_capacity(n_bars);
    for bar in 0..n_bars {
        let start_frame = bar * frames_per_bar;
        let end_frame = (start_frame + frames_per_bar).min(n_frames);
        let mut tally: HashMap<(u8, ChordQuality), (u32, f32)> = HashMap::new();

        for f in start_frame..end_frame {
            let smooth_start = f.saturating_sub(half);
            let smooth_end = (f + half).min(n_frames);
            let mut smoothed = [0.0f32; 12];
            let mut count = 0u32;
            for sf in smooth_start..smooth_end {
                for c in 0..12 {
                    smoothed[c] += chroma_history[sf][c];
                }
                count += 1;
            }
            if count > 0 {
                let inv = 1.0 / count as f32;
                for v in &mut smoothed {
                    *v *= inv;
                }
            }
            let (root, quality, confidence) = super::progressive::match_chord(&smoothed, triads_only);
            if confidence >= confidence_threshold {
                let entry = tally.entry((root, quality)).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += confidence;
            }
        }

        let vote_count: u32 = tally.values().map(|(count, _)| count).sum();
        let winner = tally.iter().max_by(|a, b| {
            a.1 .0
                .cmp(&b.1 .0)
                .then_with(|| a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
        });
        let (root, quality, confidence) = match winner {
            Some((&(root, quality), &(count, _))) => (root, quality, count as f32 / vote_count.max(1) as f32),
            None => (0, ChordQuality::Major, 0.0),
        };

        bars.push(BarChord {
            bar_index: bar,
            root,
            quality,
            start_time: bar as f64 * seconds_per_bar,
            confidence,
        });
    }
    bars
}

fn finalize_bar(bar_index: usize, votes: &BarVotes) -> BarChord {
    let winner = votes
        .tally
        .iter()
        .max_by(|a, b| {
            a.1 .0
                .cmp(&b.1 .0)
                .then_with(|| a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
        })
        .map(|(key, (count, sum))| (*key, *count, *sum));

    match winner {
        Some(((root, quality), count, sum)) => BarChord {
            bar_index,
            root,
            quality,
            start_time: votes.start_time,
            confidence: sum / count.max(1) as f32,
        },
        None => BarChord {
            bar_index,
            root: 0,
            quality: ChordQuality::Major,
            start_time: votes.start_time,
            confidence: 0.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_chord_in_bar_wins() {
        let mut voter = BarVoter::new(120.0, 4);
        // bar length = 2s at 120bpm/4-4
        for t in [0.0, 0.5, 1.0] {
            voter.vote(t, Some((0, ChordQuality::Major, 0.9)));
        }
        voter.vote(1.5, Some((7, ChordQuality::Major, 0.9)));
        let finalized = voter.vote(2.1, Some((5, ChordQuality::Major, 0.8)));
        assert!(finalized.is_some());
        let bar = finalized.unwrap();
        assert_eq!(bar.root, 0);
        assert_eq!(bar.bar_index, 0);
    }

    #[test]
    fn low_confidence_frame_still_checks_bar_boundary() {
        let mut voter = BarVoter::new(120.0, 4);
        voter.vote(0.0, Some((0, ChordQuality::Major, 0.9)));
        // no candidate: below-threshold frame, but the boundary must still roll over.
        let finalized = voter.vote(2.1, None);
        assert!(finalized.is_some());
        assert_eq!(finalized.unwrap().root, 0);
    }

    #[test]
    fn flush_finalizes_partial_trailing_bar() {
        let mut voter = BarVoter::new(120.0, 4);
        voter.vote(0.0, Some((3, ChordQuality::Minor, 0.7)));
        let flushed = voter.flush();
        assert!(flushed.is_some());
        assert_eq!(flushed.unwrap().root, 3);
    }

    #[test]
    fn zero_bpm_never_emits_a_bar() {
        let mut voter = BarVoter::new(0.0, 4);
        assert!(voter.vote(10.0, Some((0, ChordQuality::Major, 1.0))).is_none());
    }

    #[test]
    fn retroactive_bar_chords_bins_history_accumulated_before_activation() {
        // 2s/bar at hop-derived frame_duration of 0.1s -> 20 frames/bar.
        let c_major_frame = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let history = vec![c_major_frame; 40];
        let bars = retroactive_bar_chords(&history, 2.0, 0.1, 4, 0.3, false);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].root, 0);
        assert_eq!(bars[0].quality, ChordQuality::Major);
        assert_eq!(bars[1].bar_index, 1);
    }

    #[test]
    fn retroactive_bar_chords_on_empty_history_is_empty() {
        assert!(retroactive_bar_chords(&[], 2.0, 0.1, 4, 0.3, false).is_empty());
    }
}
