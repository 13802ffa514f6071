//! Encoder configuration and validation.
//!
//! `EncoderConfig` is what callers fill in; `InternalFlags` is the derived,
//! frozen view the hot path reads. Quality presets map onto the internal
//! noise-shaping switches at init time, never on the per-frame path.

use crate::error::{ConfigError, ConfigResult};
use crate::tables::{samplerate_index, BITRATE_TABLE};

/// MPEG version, implied by the sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl MpegVersion {
    pub fn from_samplerate(samplerate: u32) -> ConfigResult<Self> {
        match samplerate {
            44100 | 48000 | 32000 => Ok(MpegVersion::Mpeg1),
            22050 | 24000 | 16000 => Ok(MpegVersion::Mpeg2),
            11025 | 12000 | 8000 => Ok(MpegVersion::Mpeg25),
            other => Err(ConfigError::UnsupportedSampleRate(other)),
        }
    }

    /// Low-sampling-frequency variants use the MPEG-2 scalefactor scheme
    /// and single-granule frames.
    pub fn is_lsf(self) -> bool {
        self != MpegVersion::Mpeg1
    }

    /// Row of [`BITRATE_TABLE`] for this version.
    pub fn bitrate_row(self) -> usize {
        if self.is_lsf() {
            1
        } else {
            0
        }
    }
}

/// Channel arrangement of the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Mono,
    Stereo,
    /// Stereo with per-frame mid/side coding decided by the psy model.
    JointStereo,
    DualChannel,
}

impl ChannelMode {
    pub fn channels(self) -> usize {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }

    /// Header `mode` field.
    pub fn code(self) -> u32 {
        match self {
            ChannelMode::Stereo => 0,
            ChannelMode::JointStereo => 1,
            ChannelMode::DualChannel => 2,
            ChannelMode::Mono => 3,
        }
    }
}

/// Rate-control driver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VbrMode {
    /// Constant bitrate.
    #[default]
    Off,
    /// Average bitrate: per-frame targets around a requested mean.
    Abr,
    /// True VBR, bisection search per granule.
    Rh,
    /// Historic alias of `Mtrh`.
    Mt,
    /// VBR with the same bisection fallback path.
    Mtrh,
}

impl VbrMode {
    pub fn is_vbr(self) -> bool {
        matches!(self, VbrMode::Rh | VbrMode::Mt | VbrMode::Mtrh)
    }
}

/// User-facing configuration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub samplerate: u32,
    pub mode: ChannelMode,
    /// CBR bitrate in kbps; also the fallback when ABR/VBR bounds are
    /// omitted.
    pub bitrate: u32,
    pub vbr_mode: VbrMode,
    /// VBR quality, 0 (best) ..= 9 (smallest).
    pub vbr_q: u8,
    /// ABR target mean bitrate in kbps.
    pub vbr_mean_bitrate_kbps: u32,
    /// Optional VBR bitrate bounds in kbps (0 = table limits).
    pub vbr_min_bitrate_kbps: u32,
    pub vbr_max_bitrate_kbps: u32,
    /// Enforce the VBR minimum even for digital silence.
    pub vbr_hard_min: bool,
    /// Speed/quality dial, 0 (best) ..= 9 (fastest).
    pub quality: u8,
    /// Comparator mode for the outer loop (spec modes 0..=8).
    pub experimental_x: u8,
    /// Disables the sfb21 tolerance.
    pub experimental_y: bool,
    /// Alternative subblock-gain gate.
    pub experimental_z: bool,
    /// Allow the top scalefactor band to cut VBR iteration short.
    pub sfb21_extra: bool,
    /// Override the quality preset: 0 = single pass, 1 = amplification,
    /// 2 = also promote scalefac_scale.
    pub noise_shaping: Option<u8>,
    /// Override the amplification aggressiveness (0 = all offending
    /// bands, 1+ = single worst per pass).
    pub noise_shaping_amp: Option<u8>,
    /// Override the iteration count before the stopping rules engage.
    pub noise_shaping_stop: Option<u32>,
    /// Extra masking headroom in dB; folded into `masking_lower`.
    pub masking_lower_db: f64,
    /// Estimated input/output compression ratio, used by ABR.
    pub compression_ratio: f64,
    pub copyright: bool,
    pub original: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            samplerate: 44100,
            mode: ChannelMode::JointStereo,
            bitrate: 128,
            vbr_mode: VbrMode::Off,
            vbr_q: 4,
            vbr_mean_bitrate_kbps: 128,
            vbr_min_bitrate_kbps: 0,
            vbr_max_bitrate_kbps: 0,
            vbr_hard_min: false,
            quality: 5,
            experimental_x: 0,
            experimental_y: false,
            experimental_z: false,
            sfb21_extra: true,
            noise_shaping: None,
            noise_shaping_amp: None,
            noise_shaping_stop: None,
            masking_lower_db: 0.0,
            compression_ratio: 11.025,
            copyright: false,
            original: true,
        }
    }
}

/// Derived switches read by the hot path. Built once in
/// `InternalFlags::from_config`, immutable afterwards.
#[derive(Debug, Clone)]
pub struct InternalFlags {
    pub version: MpegVersion,
    pub samplerate: u32,
    pub samplerate_index: usize,
    pub channels: usize,
    pub mode: ChannelMode,
    /// Granules per frame: 2 for MPEG-1, 1 for LSF.
    pub mode_gr: usize,
    /// Header plus side-info bytes per frame.
    pub sideinfo_len: usize,
    pub bitrate_index: usize,
    pub vbr_min_bitrate: usize,
    pub vbr_max_bitrate: usize,
    /// 0 = single pass, 1 = amplify, 2 = also promote scalefac_scale.
    pub noise_shaping: u8,
    /// 0 = amplify all offending bands, 1+ = single worst per pass.
    pub noise_shaping_amp: u8,
    pub noise_shaping_stop: u32,
    pub use_best_huffman: bool,
    pub masking_lower: f64,
    /// Extend the distortion bookkeeping to the scalefactor-less top band
    /// and let it cut VBR iteration short. Only meaningful for the VBR
    /// drivers and vetoed by `experimental_y`.
    pub sfb21_extra: bool,
}

impl InternalFlags {
    pub fn from_config(cfg: &EncoderConfig) -> ConfigResult<Self> {
        let version = MpegVersion::from_samplerate(cfg.samplerate)?;
        let samplerate_index =
            samplerate_index(cfg.samplerate).ok_or(ConfigError::UnsupportedSampleRate(cfg.samplerate))?;
        let channels = cfg.mode.channels();

        if cfg.quality > 9 {
            return Err(ConfigError::InvalidQuality(cfg.quality));
        }
        if cfg.vbr_q > 9 {
            return Err(ConfigError::InvalidVbrQuality(cfg.vbr_q));
        }
        if cfg.experimental_x > 8 {
            return Err(ConfigError::InvalidComparatorMode(cfg.experimental_x));
        }

        let row = &BITRATE_TABLE[version.bitrate_row()];
        let bitrate_index = match cfg.vbr_mode {
            VbrMode::Off => row
                .iter()
                .position(|&b| b == cfg.bitrate)
                .filter(|&i| i != 0)
                .ok_or(ConfigError::IncompatibleRateCombination {
                    sample_rate: cfg.samplerate,
                    bitrate: cfg.bitrate,
                })?,
            // ABR/VBR frames pick their index per frame; seed with the mean.
            _ => {
                let target = if cfg.vbr_mode == VbrMode::Abr {
                    cfg.vbr_mean_bitrate_kbps
                } else {
                    cfg.bitrate
                };
                row.iter()
                    .rposition(|&b| b != 0 && b <= target.max(row[1]))
                    .unwrap_or(1)
            }
        };

        let find_bound = |kbps: u32, default: usize| -> ConfigResult<usize> {
            if kbps == 0 {
                return Ok(default);
            }
            row.iter()
                .position(|&b| b == kbps)
                .filter(|&i| i != 0)
                .ok_or(ConfigError::IncompatibleRateCombination {
                    sample_rate: cfg.samplerate,
                    bitrate: kbps,
                })
        };
        let vbr_min_bitrate = find_bound(cfg.vbr_min_bitrate_kbps, 1)?;
        let vbr_max_bitrate = find_bound(cfg.vbr_max_bitrate_kbps, 14)?;
        if vbr_min_bitrate > vbr_max_bitrate {
            return Err(ConfigError::InvertedVbrBounds {
                min: cfg.vbr_min_bitrate_kbps,
                max: cfg.vbr_max_bitrate_kbps,
            });
        }

        // Header (4 bytes) plus side info.
        let sideinfo_len = if version == MpegVersion::Mpeg1 {
            if channels == 1 {
                4 + 17
            } else {
                4 + 32
            }
        } else if channels == 1 {
            4 + 9
        } else {
            4 + 17
        };

        // Speed/quality presets: slower settings enable progressively more
        // of the noise-shaping machinery. Explicit settings win.
        let (noise_shaping, noise_shaping_amp, noise_shaping_stop, use_best_huffman) =
            match cfg.quality {
                9 => (0, 0, 0, false),
                7 | 8 => (0, 0, 0, false),
                5 | 6 => (1, 0, 0, false),
                4 => (1, 0, 0, true),
                3 => (1, 1, 1, true),
                2 => (1, 1, 1, true),
                1 => (2, 2, 1, true),
                0 => (2, 2, 1, true),
                _ => unreachable!(),
            };
        let noise_shaping = cfg.noise_shaping.unwrap_or(noise_shaping);
        let noise_shaping_amp = cfg.noise_shaping_amp.unwrap_or(noise_shaping_amp);
        let noise_shaping_stop = cfg.noise_shaping_stop.unwrap_or(noise_shaping_stop);

        Ok(Self {
            version,
            samplerate: cfg.samplerate,
            samplerate_index,
            channels,
            mode: cfg.mode,
            mode_gr: if version == MpegVersion::Mpeg1 { 2 } else { 1 },
            sideinfo_len,
            bitrate_index,
            vbr_min_bitrate,
            vbr_max_bitrate,
            noise_shaping,
            noise_shaping_amp,
            noise_shaping_stop,
            use_best_huffman,
            masking_lower: 10f64.powf(cfg.masking_lower_db * 0.1),
            sfb21_extra: cfg.sfb21_extra && cfg.vbr_mode.is_vbr() && !cfg.experimental_y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbr_config_resolves_bitrate_index() {
        let cfg = EncoderConfig::default();
        let flags = InternalFlags::from_config(&cfg).unwrap();
        assert_eq!(flags.version, MpegVersion::Mpeg1);
        assert_eq!(flags.bitrate_index, 8); // 128 kbps
        assert_eq!(flags.mode_gr, 2);
        assert_eq!(flags.sideinfo_len, 36);
    }

    #[test]
    fn lsf_sideinfo_is_shorter() {
        let cfg = EncoderConfig {
            samplerate: 22050,
            mode: ChannelMode::Mono,
            bitrate: 64,
            ..Default::default()
        };
        let flags = InternalFlags::from_config(&cfg).unwrap();
        assert!(flags.version.is_lsf());
        assert_eq!(flags.mode_gr, 1);
        assert_eq!(flags.sideinfo_len, 13);
    }

    #[test]
    fn rejects_bad_rate_combination() {
        let cfg = EncoderConfig {
            samplerate: 44100,
            bitrate: 144, // MPEG-2 only
            ..Default::default()
        };
        assert!(matches!(
            InternalFlags::from_config(&cfg),
            Err(ConfigError::IncompatibleRateCombination { .. })
        ));
    }

    #[test]
    fn rejects_unknown_samplerate() {
        let cfg = EncoderConfig {
            samplerate: 96000,
            ..Default::default()
        };
        assert!(matches!(
            InternalFlags::from_config(&cfg),
            Err(ConfigError::UnsupportedSampleRate(96000))
        ));
    }

    #[test]
    fn quality_presets_toggle_shaping() {
        let fast = InternalFlags::from_config(&EncoderConfig {
            quality: 9,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(fast.noise_shaping, 0);
        assert!(!fast.use_best_huffman);

        let slow = InternalFlags::from_config(&EncoderConfig {
            quality: 0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(slow.noise_shaping, 2);
        assert_eq!(slow.noise_shaping_amp, 2);
        assert!(slow.use_best_huffman);
    }
}
