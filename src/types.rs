//! Core data model: granule side information, scalefactors, psychoacoustic
//! inputs and the per-frame spectral working set.
//!
//! The layout mirrors the Layer III side-information syntax; every field of
//! [`GranuleInfo`] ends up in the bitstream or feeds the bit counters
//! directly.

/// MDCT coefficients per granule and channel.
pub const GRANULE_SIZE: usize = 576;
/// Long-block scalefactor bands (21 carry psychoacoustic data, band 21 is
/// the sfb21 tail).
pub const SBMAX_L: usize = 22;
/// Short-block scalefactor bands per window.
pub const SBMAX_S: usize = 13;
/// Long bands with their own scalefactor (sfb21 has none).
pub const SBPSY_L: usize = 21;
/// Short bands with their own scalefactor (sfb12 has none).
pub const SBPSY_S: usize = 12;

pub const MAX_CHANNELS: usize = 2;
pub const MAX_GRANULES: usize = 2;

/// Upper bound of `part2_3_length` (12-bit side-info field).
pub const MAX_BITS: i32 = 4095;
/// Sentinel bit count returned when a candidate gain cannot represent the
/// spectrum at all.
pub const LARGE_BITS: i32 = 100_000;
/// Largest quantized magnitude the Huffman escape tables can carry.
pub const IXMAX_VAL: i32 = 8206;

/// Window sequence of a granule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockType {
    /// Normal long block.
    #[default]
    Norm,
    /// Long-to-short transition window.
    Start,
    /// Three short windows of 192 coefficients each, interleaved.
    Short,
    /// Short-to-long transition window.
    Stop,
}

impl BlockType {
    /// Side-info encoding of the block type.
    pub fn code(self) -> u32 {
        match self {
            BlockType::Norm => 0,
            BlockType::Start => 1,
            BlockType::Short => 2,
            BlockType::Stop => 3,
        }
    }
}

/// Per granule-channel encoding state, written to the side information once
/// the outer loop settles on a candidate.
#[derive(Debug, Clone)]
pub struct GranuleInfo {
    pub part2_3_length: u32,
    pub part2_length: u32,
    pub big_values: u32,
    pub count1: u32,
    pub count1bits: u32,
    pub global_gain: i32,
    pub scalefac_compress: u32,
    pub block_type: BlockType,
    pub mixed_block_flag: bool,
    pub table_select: [u32; 3],
    pub subblock_gain: [i32; 3],
    pub region0_count: u32,
    pub region1_count: u32,
    pub preflag: bool,
    pub scalefac_scale: u32,
    pub count1table_select: u32,
    /// Long scalefactor bands in use: `scalefac.l[0..sfb_lmax]`.
    pub sfb_lmax: usize,
    /// First short band in use (3 under mixed blocks, 0 for pure short).
    pub sfb_smin: usize,
    /// Scalefactor field widths. MPEG-1 uses `slen[0..2]`, the LSF scheme
    /// all four.
    pub slen: [u32; 4],
    /// LSF scalefactor partition sizes in scalefactor slots.
    pub sfb_partition: [usize; 4],
}

impl Default for GranuleInfo {
    fn default() -> Self {
        Self {
            part2_3_length: 0,
            part2_length: 0,
            big_values: 0,
            count1: 0,
            count1bits: 0,
            global_gain: 210,
            scalefac_compress: 0,
            block_type: BlockType::Norm,
            mixed_block_flag: false,
            table_select: [0; 3],
            subblock_gain: [0; 3],
            region0_count: 0,
            region1_count: 0,
            preflag: false,
            scalefac_scale: 0,
            count1table_select: 0,
            sfb_lmax: SBPSY_L,
            sfb_smin: SBPSY_S,
            slen: [0; 4],
            sfb_partition: [0; 4],
        }
    }
}

/// Integer scalefactors for one granule-channel.
///
/// Values are signed because the scalefactor-storage pass uses negative
/// markers: `-2` flags an all-zero band, `-1` a band shared with granule 0
/// through SCFSI.
#[derive(Debug, Clone)]
pub struct Scalefac {
    pub l: [i32; SBMAX_L],
    pub s: [[i32; 3]; SBMAX_S],
}

impl Default for Scalefac {
    fn default() -> Self {
        Self {
            l: [0; SBMAX_L],
            s: [[0; 3]; SBMAX_S],
        }
    }
}

/// Per-band energies and masking thresholds delivered by the
/// psychoacoustic model for one granule-channel.
#[derive(Debug, Clone)]
pub struct PsyRatio {
    pub en_l: [f64; SBMAX_L],
    pub en_s: [[f64; 3]; SBMAX_S],
    pub thm_l: [f64; SBMAX_L],
    pub thm_s: [[f64; 3]; SBMAX_S],
}

impl Default for PsyRatio {
    fn default() -> Self {
        Self {
            en_l: [0.0; SBMAX_L],
            en_s: [[0.0; 3]; SBMAX_S],
            thm_l: [0.0; SBMAX_L],
            thm_s: [[0.0; 3]; SBMAX_S],
        }
    }
}

/// Allowed distortion per scalefactor band, derived from the psy ratios and
/// the absolute threshold of hearing.
#[derive(Debug, Clone)]
pub struct AllowedDistortion {
    pub l: [f64; SBMAX_L],
    pub s: [[f64; 3]; SBMAX_S],
}

impl Default for AllowedDistortion {
    fn default() -> Self {
        Self {
            l: [0.0; SBMAX_L],
            s: [[0.0; 3]; SBMAX_S],
        }
    }
}

/// Per-band noise-to-mask ratios. Row 0 holds long bands, rows 1..=3 the
/// three short windows.
pub type Distortion = [[f64; SBMAX_L]; 4];

/// Aggregate noise metrics of one quantization candidate, in dB relative to
/// the masking threshold.
#[derive(Debug, Clone, Copy)]
pub struct NoiseResult {
    /// Bands whose noise exceeds the masking threshold.
    pub over_count: u32,
    /// Summed excess over the threshold across distorted bands.
    pub over_noise: f64,
    /// Summed noise over all bands.
    pub tot_noise: f64,
    /// Worst single band.
    pub max_noise: f64,
    /// Softplus-accumulated figure used by the psychoacoustic comparator.
    pub klemm_noise: f64,
}

impl Default for NoiseResult {
    fn default() -> Self {
        Self {
            over_count: 100,
            over_noise: 0.0,
            tot_noise: 0.0,
            max_noise: 0.0,
            klemm_noise: 0.0,
        }
    }
}

/// Frame-level side information.
#[derive(Debug, Clone, Default)]
pub struct SideInfo {
    pub main_data_begin: u32,
    pub private_bits: u32,
    /// Stuffing bits requested by the reservoir at frame end.
    pub resv_drain: i32,
    pub scfsi: [[u32; 4]; MAX_CHANNELS],
    pub granules: [[GranuleInfo; MAX_CHANNELS]; MAX_GRANULES],
}

/// Spectral input for one frame, as produced by the analysis filter bank
/// and the psychoacoustic model. Block types arrive already delayed by one
/// granule; the core consumes them as-is.
#[derive(Debug, Clone)]
pub struct FrameSpectrum {
    pub xr: [[[f64; GRANULE_SIZE]; MAX_CHANNELS]; MAX_GRANULES],
    pub ratio: [[PsyRatio; MAX_CHANNELS]; MAX_GRANULES],
    /// Perceptual entropy per granule-channel.
    pub pe: [[f64; MAX_CHANNELS]; MAX_GRANULES],
    /// Side/total energy ratio per granule, 0.5 meaning no side energy.
    pub ms_ener_ratio: [f64; MAX_GRANULES],
    pub block_type: [[BlockType; MAX_CHANNELS]; MAX_GRANULES],
    pub mixed_block_flag: [[bool; MAX_CHANNELS]; MAX_GRANULES],
    /// Mid/side coding requested by the psy model for this frame.
    pub use_ms: bool,
}

impl Default for FrameSpectrum {
    fn default() -> Self {
        Self {
            xr: [[[0.0; GRANULE_SIZE]; MAX_CHANNELS]; MAX_GRANULES],
            ratio: Default::default(),
            pe: [[0.0; MAX_CHANNELS]; MAX_GRANULES],
            ms_ener_ratio: [0.5; MAX_GRANULES],
            block_type: [[BlockType::Norm; MAX_CHANNELS]; MAX_GRANULES],
            mixed_block_flag: [[false; MAX_CHANNELS]; MAX_GRANULES],
            use_ms: false,
        }
    }
}

/// Quantized output of one frame: indices with signs applied, ready for
/// Huffman emission.
pub type EncodedSpectrum = [[[i32; GRANULE_SIZE]; MAX_CHANNELS]; MAX_GRANULES];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granule_info_defaults() {
        let gi = GranuleInfo::default();
        assert_eq!(gi.global_gain, 210);
        assert_eq!(gi.sfb_lmax, SBPSY_L);
        assert_eq!(gi.sfb_smin, SBPSY_S);
        assert_eq!(gi.block_type, BlockType::Norm);
    }

    #[test]
    fn block_type_codes_match_side_info_syntax() {
        assert_eq!(BlockType::Norm.code(), 0);
        assert_eq!(BlockType::Start.code(), 1);
        assert_eq!(BlockType::Short.code(), 2);
        assert_eq!(BlockType::Stop.code(), 3);
    }
}
