//! Frame-encoding throughput for the quantization loops.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use psymp3::types::{FrameSpectrum, GRANULE_SIZE, SBMAX_L};
use psymp3::{ChannelMode, EncoderConfig, Mp3Encoder, VbrMode};

fn make_frame(seed: u64) -> FrameSpectrum {
    let mut state = seed;
    let mut frame = FrameSpectrum::default();
    for gr in 0..2 {
        for ch in 0..2 {
            for i in 0..GRANULE_SIZE {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let v = ((state >> 33) as f64 / (1u64 << 31) as f64 - 0.5) * 6000.0;
                frame.xr[gr][ch][i] = v / (1.0 + i as f64 / 64.0);
            }
            for band in 0..SBMAX_L {
                frame.ratio[gr][ch].en_l[band] = 1.0;
                frame.ratio[gr][ch].thm_l[band] = 1e-2;
            }
        }
    }
    frame
}

fn bench_cbr(c: &mut Criterion) {
    let mut enc = Mp3Encoder::new(EncoderConfig {
        samplerate: 44100,
        mode: ChannelMode::Stereo,
        bitrate: 128,
        ..Default::default()
    })
    .unwrap();

    c.bench_function("cbr_frame", |b| {
        let mut seed = 1;
        b.iter(|| {
            seed += 1;
            let mut frame = make_frame(seed);
            black_box(enc.encode_frame(&mut frame))
        })
    });
}

fn bench_vbr(c: &mut Criterion) {
    let mut enc = Mp3Encoder::new(EncoderConfig {
        samplerate: 44100,
        mode: ChannelMode::Stereo,
        vbr_mode: VbrMode::Rh,
        vbr_q: 4,
        ..Default::default()
    })
    .unwrap();

    c.bench_function("vbr_frame", |b| {
        let mut seed = 100;
        b.iter(|| {
            seed += 1;
            let mut frame = make_frame(seed);
            black_box(enc.encode_frame(&mut frame))
        })
    });
}

criterion_group!(benches, bench_cbr, bench_vbr);
criterion_main!(benches);
