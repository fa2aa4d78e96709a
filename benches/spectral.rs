use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sonare_core::config::{ChromaFilterConfig, MelFilterConfig, StftConfig};
use sonare_core::mel::MelSpectrogram;
use sonare_core::mfcc::mfcc;
use sonare_core::chroma::Chroma;
use sonare_core::Spectrogram;

fn sine_wave(freq: f32, sr: u32, seconds: f32) -> Vec<f32> {
    let n = (sr as f32 * seconds) as usize;
    (0..n)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
        .collect()
}

fn bench_spectrogram(c: &mut Criterion) {
    let signal = sine_wave(440.0, 22050, 5.0);
    let config = StftConfig::default();

    c.bench_function("sonare-core: spectrogram.rs: Spectrogram::new", |b| {
        b.iter(|| {
            let _ = black_box(Spectrogram::new(black_box(&signal), black_box(&config)).unwrap());
        });
    });
}

fn bench_power(c: &mut Criterion) {
    let signal = sine_wave(440.0, 22050, 5.0);
    let spec = Spectrogram::new(&signal, &StftConfig::default()).unwrap();

    c.bench_function("sonare-core: spectrogram.rs: Spectrogram::power", |b| {
        b.iter(|| {
            let _ = black_box(spec.power());
        });
    });
}

fn bench_mel_spectrogram(c: &mut Criterion) {
    let signal = sine_wave(440.0, 22050, 5.0);
    let spec = Spectrogram::new(&signal, &StftConfig::default()).unwrap();
    let config = MelFilterConfig::default();

    c.bench_function("sonare-core: mel.rs: MelSpectrogram::from_spectrogram", |b| {
        b.iter(|| {
            let _ = black_box(MelSpectrogram::from_spectrogram(black_box(&spec), black_box(&config)).unwrap());
        });
    });
}

fn bench_mfcc(c: &mut Criterion) {
    let signal = sine_wave(440.0, 22050, 5.0);
    let spec = Spectrogram::new(&signal, &StftConfig::default()).unwrap();
    let mel = MelSpectrogram::from_spectrogram(&spec, &MelFilterConfig::default()).unwrap();

    c.bench_function("sonare-core: mfcc.rs: mfcc", |b| {
        b.iter(|| {
            let _ = black_box(mfcc(black_box(&mel), 13, None));
        });
    });
}

fn bench_chroma(c: &mut Criterion) {
    let signal = sine_wave(440.0, 22050, 5.0);
    let spec = Spectrogram::new(&signal, &StftConfig::default()).unwrap();
    let config = ChromaFilterConfig::default();

    c.bench_function("sonare-core: chroma.rs: Chroma::from_spectrogram", |b| {
        b.iter(|| {
            let _ = black_box(Chroma::from_spectrogram(black_box(&spec), black_box(&config)).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_spectrogram,
    bench_power,
    bench_mel_spectrogram,
    bench_mfcc,
    bench_chroma
);
criterion_main!(benches);
