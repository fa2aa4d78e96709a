//! YIN and pYIN monophonic pitch estimation.

use crate::config::PitchConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub f0: f32,
    pub confidence: f32,
}

/// Cumulative mean normalised difference function for a single frame:
/// `d[tau] = sum_{j} (x[j] - x[j+tau])^2`, then
/// `d'[tau] = d[tau] * tau / sum_{k=1..tau} d[k]`, with `d'[0] = 1`.
#[must_use]
pub fn cmnd(frame: &[f32], max_tau: usize) -> Vec<f32> {
    let w = frame.len();
    let max_tau = max_tau.min(w.saturating_sub(1));
    let mut d = vec![0.0f32; max_tau + 1];
    for tau in 1..=max_tau {
        let mut acc = 0.0f32;
        for j in 0..(w - tau) {
            let diff = frame[j] - frame[j + tau];
            acc += diff * diff;
        }
        d[tau] = acc;
    }

    let mut cmnd = vec![1.0f32; max_tau + 1];
    let mut running_sum = 0.0f32;
    for tau in 1..=max_tau {
        running_sum += d[tau];
        cmnd[tau] = if running_sum > 1e-10 {
            d[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }
    cmnd
}

/// Parabolic interpolation around index `tau` of `values`, clamped to the
/// array bounds.
#[must_use]
fn parabolic_interpolation(values: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= values.len() {
        return tau as f32;
    }
    let (s0, s1, s2) = (values[tau - 1], values[tau], values[tau + 1]);
    let denom = s0 - 2.0 * s1 + s2;
    if denom.abs() < 1e-12 {
        return tau as f32;
    }
    let shift = 0.5 * (s0 - s2) / denom;
    tau as f32 + shift
}

/// Single-frame YIN: searches `[min_period, max_period]` for the first
/// `d'[tau] < threshold` that is also a local minimum; falls back to the
/// global minimum in range when no candidate clears the threshold.
///
/// # Errors
///
/// Returns `None` when `min_period >= max_period` or the frame is too
/// short to evaluate any period in range.
#[must_use]
pub fn yin_frame(frame: &[f32], min_period: usize, max_period: usize, threshold: f32) -> Option<PitchEstimate> {
    if min_period >= max_period || max_period >= frame.len() {
        return None;
    }
    let d = cmnd(frame, max_period);

    let mut chosen = None;
    for tau in min_period..=max_period {
        let is_local_min = (tau == 0 || d[tau] <= d[tau - 1]) && (tau == max_period || d[tau] <= d[tau + 1]);
        if d[tau] < threshold && is_local_min {
            chosen = Some(tau);
            break;
        }
    }
    let tau = chosen.unwrap_or_else(|| {
        (min_period..=max_period)
            .min_by(|&a, &b| d[a].partial_cmp(&d[b]).unwrap())
            .unwrap_or(min_period)
    });

    let refined_tau = parabolic_interpolation(&d, tau);
    let confidence = (1.0 - d[tau]).clamp(0.0, 1.0);
    // `f0` here is actually the refined period in samples; the caller
    // (which knows the sample rate) converts it to Hz.
    Some(PitchEstimate {
        f0: refined_tau,
        confidence,
    })
}

/// Runs YIN over every overlapping frame of `signal`, returning `(f0_hz,
/// confidence, voiced)` per frame.
#[must_use]
pub fn yin(signal: &[f32], sr: u32, config: &PitchConfig) -> Vec<(f32, f32, bool)> {
    if config.fmax <= config.fmin || config.fmin <= 0.0 {
        return Vec::new();
    }
    let min_period = (sr as f32 / config.fmax).round().max(2.0) as usize;
    let max_period = (sr as f32 / config.fmin).round() as usize;

    let mut out = Vec::new();
    if config.frame_length == 0 || config.hop_length == 0 {
        return out;
    }
    let mut start = 0;
    while start + config.frame_length <= signal.len() {
        let frame = &signal[start..start + config.frame_length];
        match yin_frame(frame, min_period, max_period.min(config.frame_length - 1), config.threshold) {
            Some(est) if est.confidence > 0.0 && est.f0 > 0.0 => {
                let f0 = sr as f32 / est.f0;
                out.push((f0, est.confidence, true));
            }
            _ => {
                out.push((if config.fill_na { 0.0 } else { f32::NAN }, 0.0, false));
            }
        }
        start += config.hop_length;
    }
    out
}

/// One pYIN voicing/pitch candidate.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    tau: f32,
    probability: f32,
}

const BETA_ALPHA: f32 = 1.0;
const BETA_BETA: f32 = 18.0;
const UNVOICED_PROB: f32 = 0.01;
const TOP_K: usize = 20;
const TRANSITION_SIGMA_CENTS: f32 = 50.0;
const VOICED_UNVOICED_TRANSITION: f32 = 0.01;

fn beta_pdf(x: f32, alpha: f32, beta: f32) -> f32 {
    if !(0.0..=1.0).contains(&x) {
        return 0.0;
    }
    // unnormalised is sufficient: candidates are renormalised afterward.
    x.powf(alpha - 1.0) * (1.0 - x).powf(beta - 1.0)
}

fn frame_candidates(frame: &[f32], min_period: usize, max_period: usize) -> Vec<Candidate> {
    if min_period >= max_period || max_period >= frame.len() {
        return vec![Candidate {
            tau: 0.0,
            probability: 1.0,
        }];
    }
    let d = cmnd(frame, max_period);

    let mut minima: Vec<(usize, f32)> = (min_period..=max_period)
        .filter(|&tau| {
            (tau == min_period || d[tau] <= d[tau - 1]) && (tau == max_period || d[tau] <= d[tau + 1])
        })
        .map(|tau| (tau, beta_pdf(d[tau], BETA_ALPHA, BETA_BETA)))
        .collect();
    minima.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    minima.truncate(TOP_K);

    let voiced_total: f32 = minima.iter().map(|&(_, p)| p).sum();
    let mut candidates: Vec<Candidate> = minima
        .into_iter()
        .map(|(tau, p)| Candidate {
            tau: parabolic_interpolation(&d, tau),
            probability: p * (1.0 - UNVOICED_PROB),
        })
        .collect();

    candidates.push(Candidate {
        tau: 0.0,
        probability: UNVOICED_PROB,
    });

    let total = voiced_total * (1.0 - UNVOICED_PROB) + UNVOICED_PROB;
    if total > 1e-12 {
        for c in &mut candidates {
            c.probability /= total;
        }
    }
    candidates
}

/// pYIN: per-frame multi-candidate extraction followed by Viterbi decoding
/// that favours staying voiced and penalises large pitch jumps.
#[must_use]
pub fn pyin(signal: &[f32], sr: u32, config: &PitchConfig) -> Vec<(f32, bool, f32)> {
    if signal.is_empty() {
        return Vec::new();
    }
    if config.fmax <= config.fmin || config.fmin <= 0.0 || config.frame_length == 0 || config.hop_length == 0 {
        return Vec::new();
    }
    let min_period = (sr as f32 / config.fmax).round().max(2.0) as usize;
    let max_period = (sr as f32 / config.fmin).round() as usize;

    let mut per_frame: Vec<Vec<Candidate>> = Vec::new();
    let mut start = 0;
    while start + config.frame_length <= signal.len() {
        let frame = &signal[start..start + config.frame_length];
        per_frame.push(frame_candidates(
            frame,
            min_period,
            max_period.min(config.frame_length - 1),
        ));
        start += config.hop_length;
    }

    if per_frame.is_empty() {
        return Vec::new();
    }
    if per_frame.iter().all(|c| c.len() == 1) {
        // every frame degenerated to unvoiced (frame too short for range)
        return per_frame
            .iter()
            .map(|_| (if config.fill_na { 0.0 } else { f32::NAN }, false, 0.0))
            .collect();
    }

    viterbi_decode(&per_frame, sr, config.fill_na)
}

fn cents_between(tau_a: f32, tau_b: f32) -> f32 {
    if tau_a <= 0.0 || tau_b <= 0.0 {
        return f32::INFINITY;
    }
    1200.0 * (tau_b / tau_a).log2().abs()
}

fn viterbi_decode(frames: &[Vec<Candidate>], sr: u32, fill_na: bool) -> Vec<(f32, bool, f32)> {
    let n = frames.len();
    let mut scores: Vec<Vec<f32>> = frames.iter().map(|f| f.iter().map(|c| c.probability.max(1e-12).ln()).collect()).collect();
    let mut backptr: Vec<Vec<usize>> = frames.iter().map(|f| vec![0usize; f.len()]).collect();

    for t in 1..n {
        let prev = &frames[t - 1];
        let prev_scores = scores[t - 1].clone();
        for (j, cand) in frames[t].iter().enumerate() {
            let mut best = f32::NEG_INFINITY;
            let mut best_i = 0;
            for (i, prev_cand) in prev.iter().enumerate() {
                let same_voicing = (prev_cand.tau > 0.0) == (cand.tau > 0.0);
                let transition = if prev_cand.tau > 0.0 && cand.tau > 0.0 {
                    let cents = cents_between(prev_cand.tau, cand.tau);
                    (-(cents * cents) / (2.0 * TRANSITION_SIGMA_CENTS * TRANSITION_SIGMA_CENTS)).exp()
                } else if same_voicing {
                    1.0
                } else {
                    VOICED_UNVOICED_TRANSITION
                };
                let score = prev_scores[i] + transition.max(1e-12).ln();
                if score > best {
                    best = score;
                    best_i = i;
                }
            }
            scores[t][j] = best + cand.probability.max(1e-12).ln();
            backptr[t][j] = best_i;
        }
    }

    let mut path = vec![0usize; n];
    path[n - 1] = scores[n - 1]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map_or(0, |(i, _)| i);
    for t in (1..n).rev() {
        path[t - 1] = backptr[t][path[t]];
    }

    path.iter()
        .zip(frames.iter())
        .map(|(&idx, frame)| {
            let cand = frame[idx];
            if cand.tau > 0.0 {
                (sr as f32 / cand.tau, true, cand.probability)
            } else {
                (if fill_na { 0.0 } else { f32::NAN }, false, cand.probability)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn yin_recovers_440hz_within_two_percent() {
        let sr = 22050u32;
        let signal = sine(440.0, sr, (sr as f32 * 0.2) as usize);
        let config = PitchConfig {
            frame_length: 2048,
            hop_length: 512,
            fmin: 100.0,
            fmax: 1000.0,
            threshold: 0.1,
            fill_na: true,
        };
        let estimates = yin(&signal, sr, &config);
        let voiced: Vec<_> = estimates.iter().filter(|(_, conf, v)| *v && *conf > 0.5).collect();
        assert!(!voiced.is_empty());
        let (f0, conf, _) = voiced[voiced.len() / 2];
        assert!((f0 - 440.0).abs() / 440.0 < 0.02, "{f0}");
        assert!(*conf > 0.5);
    }

    #[test]
    fn pyin_on_silence_reports_all_unvoiced_with_fill_na() {
        let silence = vec![0.0f32; 22050];
        let config = PitchConfig {
            fill_na: true,
            ..PitchConfig::default()
        };
        let estimates = pyin(&silence, 22050, &config);
        assert!(!estimates.is_empty());
        for (f0, voiced, _) in estimates {
            assert!(!voiced);
            assert_eq!(f0, 0.0);
        }
    }
}
