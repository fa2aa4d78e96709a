use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sonare_core::analyzer::{MusicAnalyzer, MusicAnalyzerConfig};
use sonare_core::bpm::estimate_bpm;
use sonare_core::config::{BpmConfig, MelFilterConfig, OnsetConfig, StftConfig, StreamConfig};
use sonare_core::mel::MelSpectrogram;
use sonare_core::onset::onset_strength;
use sonare_core::{MusicAnalysis, Spectrogram, StreamAnalyzer};

fn click_track(sr: u32, bpm: f32, seconds: f32) -> Vec<f32> {
    let n = (sr as f32 * seconds) as usize;
    let period = (60.0 * sr as f32 / bpm) as usize;
    let mut out = vec![0.0f32; n];
    let mut i = 0;
    while i < n {
        out[i] = 1.0;
        i += period;
    }
    out
}

fn sine_wave(freq: f32, sr: u32, seconds: f32) -> Vec<f32> {
    let n = (sr as f32 * seconds) as usize;
    (0..n)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
        .collect()
}

fn bench_bpm(c: &mut Criterion) {
    let sr = 22050;
    let signal = click_track(sr, 120.0, 8.0);
    let spec = Spectrogram::new(&signal, &StftConfig::default())
        .unwrap()
        .with_sample_rate(sr);
    let mel = MelSpectrogram::from_spectrogram(&spec, &MelFilterConfig::default()).unwrap();
    let onset_env = onset_strength(&mel, &OnsetConfig::default());
    let config = BpmConfig::default();

    c.bench_function("sonare-core: bpm.rs: estimate_bpm", |b| {
        b.iter(|| {
            let _ = black_box(estimate_bpm(black_box(&onset_env), sr, black_box(&config)).unwrap());
        });
    });
}

fn bench_full_analysis(c: &mut Criterion) {
    let sr = 22050;
    let signal = click_track(sr, 120.0, 8.0);
    let analyzer = MusicAnalyzer::new(MusicAnalyzerConfig::default());

    c.bench_function("sonare-core: analyzer.rs: MusicAnalyzer::analyze", |b| {
        b.iter(|| {
            let _: MusicAnalysis = black_box(analyzer.analyze(black_box(&signal), sr).unwrap());
        });
    });
}

fn bench_stream_process(c: &mut Criterion) {
    let sr = 22050;
    let signal = sine_wave(440.0, sr, 5.0);
    let config = StreamConfig {
        sample_rate: sr,
        ..StreamConfig::default()
    };

    c.bench_function("sonare-core: stream/mod.rs: StreamAnalyzer::process", |b| {
        b.iter(|| {
            let mut analyzer = StreamAnalyzer::new(config).unwrap();
            for chunk in signal.chunks(2048) {
                analyzer.process(black_box(chunk)).unwrap();
            }
            let _ = black_box(analyzer.drain_frames());
        });
    });
}

criterion_group!(benches, bench_bpm, bench_full_analysis, bench_stream_process);
criterion_main!(benches);
