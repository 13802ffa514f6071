//! Error types for the encoder core.
//!
//! Only configuration problems surface as errors; the quantization hot path
//! always recovers locally by keeping the last viable candidate, so none of
//! its operations return `Result`.

use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// Configuration was rejected during initialization.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration validation errors, reported by `Mp3Encoder::new`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("unsupported bitrate: {0} kbps")]
    UnsupportedBitrate(u32),

    /// The bitrate is legal for some MPEG version, but not at this
    /// sample rate.
    #[error("bitrate {bitrate} kbps is not allowed at {sample_rate} Hz")]
    IncompatibleRateCombination { sample_rate: u32, bitrate: u32 },

    #[error("invalid stereo mode {mode} for {channels} channel(s)")]
    InvalidStereoMode { mode: &'static str, channels: u8 },

    #[error("VBR quality {0} out of range 0..=9")]
    InvalidVbrQuality(u8),

    #[error("quality {0} out of range 0..=9")]
    InvalidQuality(u8),

    #[error("comparator mode {0} out of range 0..=8")]
    InvalidComparatorMode(u8),

    #[error("VBR bitrate bounds are inverted: min {min} > max {max}")]
    InvertedVbrBounds { min: u32, max: u32 },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
pub type EncoderResult<T> = std::result::Result<T, EncoderError>;
