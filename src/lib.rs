//! # psymp3
//!
//! Perceptual MP3 Layer III quantization and rate-control core.
//!
//! The crate consumes MDCT spectra and psychoacoustic masking data (one
//! [`FrameSpectrum`] per frame) and produces standards-compliant Layer III
//! frames: it chooses scalefactors, global gains, Huffman tables and bit
//! budgets so that quantization noise stays below the masking threshold
//! wherever the bit budget allows, while maintaining the bit reservoir
//! across granules and frames. CBR, ABR and true VBR rate control are
//! provided.
//!
//! The analysis filter bank, the psychoacoustic model itself and all I/O
//! are out of scope; callers bring their own front end.

pub mod bitstream;
pub mod config;
pub mod encoder;
pub mod error;
pub mod huffman;
pub mod noise;
pub mod quantization;
pub mod rate_control;
pub mod reservoir;
pub mod scalefactor;
pub mod tables;
pub mod types;

pub use config::{ChannelMode, EncoderConfig, MpegVersion, VbrMode};
pub use encoder::Mp3Encoder;
pub use error::{ConfigError, EncoderError};
pub use types::{BlockType, FrameSpectrum, GranuleInfo, PsyRatio, Scalefac};
