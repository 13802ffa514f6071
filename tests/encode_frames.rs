//! Whole-frame encoding tests: drive the rate-control drivers with
//! synthetic spectra and check the emitted streams and side information.

use psymp3::types::{FrameSpectrum, GRANULE_SIZE, SBMAX_L, SBMAX_S};
use psymp3::{BlockType, ChannelMode, EncoderConfig, Mp3Encoder, VbrMode};

/// Tiny deterministic generator for test spectra.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) as f64 / (1u64 << 31) as f64) * 2.0 - 1.0
    }
}

/// Fill the psy ratios from the actual band energies, allowing noise
/// `mask` times the signal energy per band.
fn derive_psy(frame: &mut FrameSpectrum, channels: usize, mode_gr: usize, mask: f64) {
    // 44.1 kHz long-block boundaries; close enough for the other rates in
    // these tests since only relative energies matter.
    const L: [usize; 23] = [
        0, 4, 8, 12, 16, 20, 24, 30, 36, 44, 52, 62, 74, 90, 110, 134, 162, 196, 238, 288, 342,
        418, 576,
    ];
    const S: [usize; 14] = [0, 4, 8, 12, 16, 22, 30, 40, 52, 66, 84, 106, 136, 192];

    for gr in 0..mode_gr {
        for ch in 0..channels {
            let xr = &frame.xr[gr][ch];
            let ratio = &mut frame.ratio[gr][ch];
            for band in 0..SBMAX_L {
                let en: f64 = xr[L[band]..L[band + 1]].iter().map(|v| v * v).sum();
                ratio.en_l[band] = en;
                ratio.thm_l[band] = en * mask;
            }
            for band in 0..SBMAX_S {
                let width = S[band + 1] - S[band];
                for window in 0..3 {
                    let start = S[band] * 3 + width * window;
                    let en: f64 = xr[start..start + width].iter().map(|v| v * v).sum();
                    ratio.en_s[band][window] = en;
                    ratio.thm_s[band][window] = en * mask;
                }
            }
        }
    }
}

fn noise_frame(seed: u64, channels: usize, mode_gr: usize, amplitude: f64) -> FrameSpectrum {
    let mut rng = Lcg(seed);
    let mut frame = FrameSpectrum::default();
    for gr in 0..mode_gr {
        for ch in 0..channels {
            for i in 0..GRANULE_SIZE {
                // roll off towards the high end like real audio
                let rolloff = 1.0 / (1.0 + i as f64 / 64.0);
                frame.xr[gr][ch][i] = rng.next_f64() * amplitude * rolloff;
            }
        }
    }
    derive_psy(&mut frame, channels, mode_gr, 1e-2);
    frame
}

/// Split a stream into frames by walking the headers.
fn parse_frames(bytes: &[u8]) -> Vec<(usize, usize, bool)> {
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset + 4 <= bytes.len() {
        assert_eq!(bytes[offset], 0xff, "lost sync at offset {}", offset);
        assert_eq!(bytes[offset + 1] & 0xe0, 0xe0, "lost sync at {}", offset);
        let version_bits = (bytes[offset + 1] >> 3) & 3;
        let bitrate_index = (bytes[offset + 2] >> 4) as usize;
        let sr_bits = ((bytes[offset + 2] >> 2) & 3) as usize;
        let padding = (bytes[offset + 2] >> 1) & 1 == 1;

        let mpeg1 = version_bits == 3;
        let bitrate: usize = if mpeg1 {
            [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320][bitrate_index]
        } else {
            [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160][bitrate_index]
        };
        let samplerate: usize = match (version_bits, sr_bits) {
            (3, 0) => 44100,
            (3, 1) => 48000,
            (3, 2) => 32000,
            (2, 0) => 22050,
            (2, 1) => 24000,
            (2, 2) => 16000,
            (0, 0) => 11025,
            (0, 1) => 12000,
            (0, 2) => 8000,
            _ => panic!("bad header"),
        };
        let factor = if mpeg1 { 144_000 } else { 72_000 };
        let size = factor * bitrate / samplerate + padding as usize;
        frames.push((offset, bitrate_index, padding));
        offset += size;
    }
    assert_eq!(offset, bytes.len(), "stream ends mid-frame");
    frames
}

#[test]
fn cbr_silence_produces_empty_granules() {
    let cfg = EncoderConfig {
        samplerate: 44100,
        mode: ChannelMode::Mono,
        bitrate: 128,
        ..Default::default()
    };
    let mut enc = Mp3Encoder::new(cfg).unwrap();

    let mut out = Vec::new();
    // one second of digital silence
    let frames = (44100 + 1151) / 1152;
    for _ in 0..frames {
        let mut frame = FrameSpectrum::default();
        out.extend(enc.encode_frame(&mut frame));

        for gr in 0..2 {
            let gi = &enc.side_info().granules[gr][0];
            assert_eq!(gi.part2_3_length, 0);
            assert_eq!(gi.big_values, 0);
            assert_eq!(gi.count1, 0);
            assert_eq!(gi.global_gain, 210);
            assert!(enc.quantized(gr, 0).iter().all(|&v| v == 0));
        }
        let resv = enc.reservoir();
        assert!(resv.size() >= 0 && resv.size() <= resv.max_size());
    }
    out.extend(enc.flush());

    let parsed = parse_frames(&out);
    assert_eq!(parsed.len() as u64, enc.frames_encoded());
    assert_eq!(parsed.len(), frames);
    // CBR: every frame carries the configured bitrate index
    assert!(parsed.iter().all(|&(_, idx, _)| idx == 8));
}

#[test]
fn cbr_tone_keeps_long_blocks_and_signs() {
    let cfg = EncoderConfig {
        samplerate: 44100,
        mode: ChannelMode::Stereo,
        bitrate: 128,
        ..Default::default()
    };
    let mut enc = Mp3Encoder::new(cfg).unwrap();

    let mut out = Vec::new();
    for n in 0..10u64 {
        let mut frame = FrameSpectrum::default();
        for gr in 0..2 {
            for ch in 0..2 {
                // energy concentrated around bin 26 (~1 kHz at 44.1 kHz)
                for (k, bin) in (24..30).enumerate() {
                    let sign = if (n + k as u64) % 2 == 0 { 1.0 } else { -1.0 };
                    frame.xr[gr][ch][bin] = sign * 8000.0 / (1 + k) as f64;
                }
            }
        }
        derive_psy(&mut frame, 2, 2, 1e-2);
        let input = frame.clone();
        out.extend(enc.encode_frame(&mut frame));

        for gr in 0..2 {
            for ch in 0..2 {
                let gi = &enc.side_info().granules[gr][ch];
                assert_eq!(gi.block_type, BlockType::Norm);
                assert!(gi.part2_3_length > 0);
                assert!(gi.part2_3_length < 4096);
                assert!(gi.global_gain < 256);

                let ix = enc.quantized(gr, ch);
                for i in 0..GRANULE_SIZE {
                    let x = input.xr[gr][ch][i];
                    if ix[i] != 0 {
                        assert_eq!(
                            ix[i] > 0,
                            x > 0.0,
                            "sign mismatch at gr {} ch {} bin {}",
                            gr,
                            ch,
                            i
                        );
                    }
                    if x == 0.0 {
                        assert_eq!(ix[i], 0);
                    }
                }
            }
        }
    }
    out.extend(enc.flush());
    parse_frames(&out);
}

#[test]
fn vbr_noise_respects_bitrate_bounds_and_reservoir() {
    let cfg = EncoderConfig {
        samplerate: 44100,
        mode: ChannelMode::Stereo,
        vbr_mode: VbrMode::Rh,
        vbr_q: 4,
        ..Default::default()
    };
    let mut enc = Mp3Encoder::new(cfg).unwrap();

    let mut out = Vec::new();
    for n in 0..5u64 {
        let mut frame = noise_frame(n + 1, 2, 2, 3000.0);
        out.extend(enc.encode_frame(&mut frame));

        assert!(enc.bitrate_index() >= 1 && enc.bitrate_index() <= 14);
        let resv = enc.reservoir();
        assert!(resv.size() >= 0 && resv.size() <= resv.max_size());
        for gr in 0..2 {
            for ch in 0..2 {
                let gi = &enc.side_info().granules[gr][ch];
                assert!(gi.part2_3_length < 4096);
                assert!(gi.global_gain < 256);
            }
        }
    }
    out.extend(enc.flush());
    parse_frames(&out);
}

#[test]
fn vbr_silence_drops_to_the_smallest_frame() {
    let cfg = EncoderConfig {
        samplerate: 44100,
        mode: ChannelMode::Mono,
        vbr_mode: VbrMode::Rh,
        vbr_q: 4,
        ..Default::default()
    };
    let mut enc = Mp3Encoder::new(cfg).unwrap();

    let mut frame = FrameSpectrum::default();
    enc.encode_frame(&mut frame);
    assert_eq!(enc.bitrate_index(), 1);
}

#[test]
fn abr_adapts_the_frame_size_to_the_content() {
    let mk = || {
        Mp3Encoder::new(EncoderConfig {
            samplerate: 44100,
            mode: ChannelMode::Mono,
            vbr_mode: VbrMode::Abr,
            vbr_mean_bitrate_kbps: 128,
            ..Default::default()
        })
        .unwrap()
    };

    let mut quiet = mk();
    let mut frame = FrameSpectrum::default();
    quiet.encode_frame(&mut frame);
    let quiet_index = quiet.bitrate_index();

    let mut loud = mk();
    let mut frame = noise_frame(7, 1, 2, 8000.0);
    for gr in 0..2 {
        frame.pe[gr][0] = 2500.0;
    }
    loud.encode_frame(&mut frame);
    let loud_index = loud.bitrate_index();

    assert!(quiet_index <= loud_index);
    assert!(loud_index <= 14);
}

#[test]
fn abr_effective_bitrate_tracks_demanding_content() {
    let cfg = EncoderConfig {
        samplerate: 22050,
        mode: ChannelMode::Mono,
        vbr_mode: VbrMode::Abr,
        vbr_mean_bitrate_kbps: 96,
        ..Default::default()
    };
    let mut enc = Mp3Encoder::new(cfg).unwrap();

    let mut out = Vec::new();
    let frames = 200u64;
    for n in 0..frames {
        let mut frame = noise_frame(n * 3 + 1, 1, 1, 6000.0);
        frame.pe[0][0] = 1500.0;
        out.extend(enc.encode_frame(&mut frame));
    }
    out.extend(enc.flush());
    let parsed = parse_frames(&out);
    assert_eq!(parsed.len() as u64, frames);

    // effective bitrate stays within the configured ABR corridor
    let kbps = out.len() as f64 * 8.0 * 22050.0 / (576.0 * frames as f64) / 1000.0;
    assert!(kbps <= 160.0, "effective bitrate {} too high", kbps);
    assert!(kbps >= 8.0, "effective bitrate {} too low", kbps);
}

#[test]
fn overload_is_rescaled_into_a_valid_frame() {
    let cfg = EncoderConfig {
        samplerate: 44100,
        mode: ChannelMode::Stereo,
        bitrate: 32, // tiny frames, enormous demand
        ..Default::default()
    };
    let mut enc = Mp3Encoder::new(cfg).unwrap();

    let mut out = Vec::new();
    for n in 0..4u64 {
        let mut frame = noise_frame(n + 11, 2, 2, 20000.0);
        for gr in 0..2 {
            for ch in 0..2 {
                frame.pe[gr][ch] = 5000.0;
            }
        }
        out.extend(enc.encode_frame(&mut frame));

        for gr in 0..2 {
            for ch in 0..2 {
                let gi = &enc.side_info().granules[gr][ch];
                assert!(gi.part2_3_length < 4096);
                assert!(gi.global_gain >= 0 && gi.global_gain < 256);
                assert!(gi.big_values as usize * 2 <= GRANULE_SIZE);
            }
        }
    }
    out.extend(enc.flush());
    parse_frames(&out);
}

#[test]
fn block_type_sequence_flows_into_side_info() {
    let cfg = EncoderConfig {
        samplerate: 44100,
        mode: ChannelMode::Mono,
        bitrate: 128,
        ..Default::default()
    };
    let mut enc = Mp3Encoder::new(cfg).unwrap();

    // transient handling as the psy model would schedule it
    let sequence = [
        [BlockType::Norm, BlockType::Start],
        [BlockType::Short, BlockType::Short],
        [BlockType::Stop, BlockType::Norm],
    ];
    let mut out = Vec::new();
    for (n, pair) in sequence.iter().enumerate() {
        let mut frame = noise_frame(n as u64 + 21, 1, 2, 2000.0);
        for gr in 0..2 {
            frame.block_type[gr][0] = pair[gr];
        }
        out.extend(enc.encode_frame(&mut frame));

        for gr in 0..2 {
            let gi = &enc.side_info().granules[gr][0];
            assert_eq!(gi.block_type, pair[gr]);
            if pair[gr] == BlockType::Short {
                assert_eq!(gi.sfb_lmax, 0);
                for window in 0..3 {
                    assert!(gi.subblock_gain[window] <= 7);
                }
            }
        }
    }
    out.extend(enc.flush());
    parse_frames(&out);
}

#[test]
fn lsf_frames_encode_and_parse() {
    let cfg = EncoderConfig {
        samplerate: 16000,
        mode: ChannelMode::Mono,
        bitrate: 64,
        ..Default::default()
    };
    let mut enc = Mp3Encoder::new(cfg).unwrap();

    let mut out = Vec::new();
    for n in 0..12u64 {
        let mut frame = noise_frame(n + 31, 1, 1, 1500.0);
        out.extend(enc.encode_frame(&mut frame));
        let gi = &enc.side_info().granules[0][0];
        assert!(gi.part2_3_length < 4096);
    }
    out.extend(enc.flush());
    let parsed = parse_frames(&out);
    assert_eq!(parsed.len(), 12);
}
