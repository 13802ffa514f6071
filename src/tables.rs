//! Static lookup tables: scalefactor-band boundaries, Huffman code data,
//! scalefactor cost tables and the derived floating-point power tables used
//! by the quantizer.
//!
//! Everything here is immutable after initialization. The scalefactor-band
//! table selected at encoder setup is the single source of truth for any
//! iteration over bands.

use lazy_static::lazy_static;

use crate::types::IXMAX_VAL;

/// Supported sample rates; index order is the samplerate-table index used
/// throughout.
pub const SAMPLE_RATES: [u32; 9] = [
    44100, 48000, 32000, // MPEG-1
    22050, 24000, 16000, // MPEG-2
    11025, 12000, 8000, // MPEG-2.5
];

/// kbps per bitrate index. Row 0 is MPEG-1, row 1 MPEG-2/2.5. Index 0 is
/// the "free format" slot and index 15 is forbidden; both are unused here.
pub const BITRATE_TABLE: [[u32; 15]; 2] = [
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

/// Scalefactor-band boundaries for one sample rate, as MDCT-bin indices.
/// `l` partitions the 576 bins of a long block; `s` the 192 bins of one
/// short window.
#[derive(Debug, Clone, Copy)]
pub struct ScalefacBands {
    pub l: [usize; 23],
    pub s: [usize; 14],
}

/// ISO 11172-3 / 13818-3 annex B scalefactor bands, indexed like
/// [`SAMPLE_RATES`].
pub const SFB_TABLES: [ScalefacBands; 9] = [
    // 44.1 kHz
    ScalefacBands {
        l: [
            0, 4, 8, 12, 16, 20, 24, 30, 36, 44, 52, 62, 74, 90, 110, 134, 162, 196, 238, 288,
            342, 418, 576,
        ],
        s: [0, 4, 8, 12, 16, 22, 30, 40, 52, 66, 84, 106, 136, 192],
    },
    // 48 kHz
    ScalefacBands {
        l: [
            0, 4, 8, 12, 16, 20, 24, 30, 36, 42, 50, 60, 72, 88, 106, 128, 156, 190, 230, 276,
            330, 384, 576,
        ],
        s: [0, 4, 8, 12, 16, 22, 28, 38, 50, 64, 80, 100, 126, 192],
    },
    // 32 kHz
    ScalefacBands {
        l: [
            0, 4, 8, 12, 16, 20, 24, 30, 36, 44, 54, 66, 82, 102, 126, 156, 194, 240, 296, 364,
            448, 550, 576,
        ],
        s: [0, 4, 8, 12, 16, 22, 30, 42, 58, 78, 104, 138, 180, 192],
    },
    // 22.05 kHz
    ScalefacBands {
        l: [
            0, 6, 12, 18, 24, 30, 36, 44, 54, 66, 80, 96, 116, 140, 168, 200, 238, 284, 336, 396,
            464, 522, 576,
        ],
        s: [0, 4, 8, 12, 18, 24, 32, 42, 56, 74, 100, 132, 174, 192],
    },
    // 24 kHz
    ScalefacBands {
        l: [
            0, 6, 12, 18, 24, 30, 36, 44, 54, 66, 80, 96, 114, 136, 162, 194, 232, 278, 330, 394,
            464, 540, 576,
        ],
        s: [0, 4, 8, 12, 18, 26, 36, 48, 62, 80, 104, 136, 180, 192],
    },
    // 16 kHz
    ScalefacBands {
        l: [
            0, 6, 12, 18, 24, 30, 36, 44, 54, 66, 80, 96, 116, 140, 168, 200, 238, 284, 336, 396,
            464, 522, 576,
        ],
        s: [0, 4, 8, 12, 18, 26, 36, 48, 62, 80, 104, 134, 174, 192],
    },
    // 11.025 kHz
    ScalefacBands {
        l: [
            0, 6, 12, 18, 24, 30, 36, 44, 54, 66, 80, 96, 116, 140, 168, 200, 238, 284, 336, 396,
            464, 522, 576,
        ],
        s: [0, 4, 8, 12, 18, 26, 36, 48, 62, 80, 104, 134, 174, 192],
    },
    // 12 kHz
    ScalefacBands {
        l: [
            0, 6, 12, 18, 24, 30, 36, 44, 54, 66, 80, 96, 116, 140, 168, 200, 238, 284, 336, 396,
            464, 522, 576,
        ],
        s: [0, 4, 8, 12, 18, 26, 36, 48, 62, 80, 104, 136, 180, 192],
    },
    // 8 kHz
    ScalefacBands {
        l: [
            0, 12, 24, 36, 48, 60, 72, 88, 108, 132, 160, 192, 232, 280, 336, 400, 476, 566, 568,
            570, 572, 574, 576,
        ],
        s: [0, 8, 16, 24, 36, 52, 72, 96, 124, 160, 162, 164, 166, 192],
    },
];

/// Look up the samplerate-table index for a sample rate.
pub fn samplerate_index(samplerate: u32) -> Option<usize> {
    SAMPLE_RATES.iter().position(|&sr| sr == samplerate)
}

/// Pre-emphasis amounts added to the upper long-block scalefactors when
/// `preflag` is set.
pub const PRETAB: [i32; 22] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 3, 2, 0,
];

/// MPEG-1 scalefactor field widths per `scalefac_compress` value.
pub const SLEN1_TAB: [u32; 16] = [0, 0, 0, 0, 3, 1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4];
pub const SLEN2_TAB: [u32; 16] = [0, 1, 2, 3, 0, 1, 2, 3, 1, 2, 3, 1, 2, 3, 2, 3];

/// Total scalefactor bits per `scalefac_compress` value, by block shape.
pub const SCALE_LONG: [u32; 16] = [0, 10, 20, 30, 33, 21, 31, 41, 32, 42, 52, 43, 53, 63, 64, 74];
pub const SCALE_SHORT: [u32; 16] = [
    0, 18, 36, 54, 54, 36, 54, 72, 54, 72, 90, 72, 90, 108, 108, 126,
];
pub const SCALE_MIXED: [u32; 16] = [
    0, 18, 36, 54, 51, 35, 53, 71, 52, 70, 88, 69, 87, 105, 104, 122,
];

/// LSF scalefactor partition sizes (scalefactor slots per partition) for
/// long, short and mixed granules.
pub const LSF_PARTITIONS: [[usize; 4]; 3] = [[6, 5, 5, 5], [9, 9, 9, 9], [6, 9, 9, 9]];

/// Widest scalefactor field each LSF partition can carry.
pub const LSF_MAX_SLEN: [u32; 4] = [4, 4, 3, 3];

/// SCFSI band classes over the long scalefactor bands.
pub const SCFSI_BAND: [usize; 5] = [0, 6, 11, 16, 21];

/// Preferred (region0, region1) split per number of scalefactor bands
/// covered by the big-values region.
pub const SUBDV_TABLE: [(i32, i32); 23] = [
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 1),
    (1, 1),
    (1, 1),
    (1, 2),
    (2, 2),
    (2, 3),
    (2, 3),
    (3, 4),
    (3, 4),
    (3, 4),
    (4, 5),
    (4, 5),
    (4, 6),
    (5, 6),
    (5, 6),
    (5, 7),
    (6, 7),
    (6, 7),
];

lazy_static! {
    /// `2^((x - 210) / 4)`: quantizer step per effective gain, used when
    /// dequantizing for the noise calculation.
    pub static ref POW20: [f64; 256] = {
        let mut t = [0.0; 256];
        for (i, v) in t.iter_mut().enumerate() {
            *v = 2f64.powf((i as f64 - 210.0) * 0.25);
        }
        t
    };

    /// `2^(-(x - 210) * 3/16)`: the factor applied to `xrpow` when
    /// quantizing at gain `x`.
    pub static ref IPOW20: [f64; 256] = {
        let mut t = [0.0; 256];
        for (i, v) in t.iter_mut().enumerate() {
            *v = 2f64.powf(-(i as f64 - 210.0) * 0.1875);
        }
        t
    };

    /// `i^(4/3)` for every representable quantized magnitude.
    pub static ref POW43: Vec<f64> = (0..(IXMAX_VAL + 2) as usize)
        .map(|i| (i as f64).powf(4.0 / 3.0))
        .collect();
}

#[inline]
pub fn pow20(x: i32) -> f64 {
    POW20[x.clamp(0, 255) as usize]
}

#[inline]
pub fn ipow20(x: i32) -> f64 {
    IPOW20[x.clamp(0, 255) as usize]
}

#[inline]
pub fn pow43(ix: i32) -> f64 {
    POW43[ix as usize]
}

/// One Huffman code table. `xlen` is the width of the (square) code matrix;
/// pair `(x, y)` lives at `x * xlen + y`. Escape tables carry `linbits`
/// extra bits per value above 14.
#[derive(Debug, Clone, Copy)]
pub struct HuffmanTable {
    pub xlen: usize,
    pub linbits: u32,
    pub linmax: i32,
    pub codes: &'static [u16],
    pub lengths: &'static [u8],
}

static T1_CODES: [u16; 4] = [1, 1, 1, 0];
static T1_LENGTHS: [u8; 4] = [1, 3, 2, 3];

static T2_CODES: [u16; 9] = [1, 2, 1, 3, 1, 1, 3, 2, 0];
static T2_LENGTHS: [u8; 9] = [1, 3, 6, 3, 3, 5, 5, 5, 6];

static T3_CODES: [u16; 9] = [3, 2, 1, 1, 1, 1, 3, 2, 0];
static T3_LENGTHS: [u8; 9] = [2, 2, 6, 3, 2, 5, 5, 5, 6];

static T5_CODES: [u16; 16] = [1, 2, 6, 5, 3, 1, 4, 4, 7, 5, 7, 1, 6, 1, 1, 0];
static T5_LENGTHS: [u8; 16] = [1, 3, 6, 7, 3, 3, 6, 7, 6, 6, 7, 8, 7, 6, 7, 8];

static T6_CODES: [u16; 16] = [7, 3, 5, 1, 6, 2, 3, 2, 5, 4, 4, 1, 3, 3, 2, 0];
static T6_LENGTHS: [u8; 16] = [3, 3, 5, 7, 3, 2, 4, 5, 4, 4, 5, 6, 6, 5, 6, 7];

static T7_CODES: [u16; 36] = [
    1, 2, 10, 19, 16, 10, 3, 3, 7, 10, 5, 3, 11, 4, 13, 17, 8, 4, 12, 11, 18, 15, 11, 2, 7, 6, 9,
    14, 3, 1, 6, 4, 5, 3, 2, 0,
];
static T7_LENGTHS: [u8; 36] = [
    1, 3, 6, 8, 8, 9, 3, 4, 6, 7, 7, 8, 6, 5, 7, 8, 8, 9, 7, 7, 8, 9, 9, 9, 7, 7, 8, 9, 9, 10, 8,
    8, 9, 10, 10, 10,
];

static T8_CODES: [u16; 36] = [
    3, 4, 6, 18, 12, 5, 5, 1, 2, 16, 9, 3, 7, 3, 5, 14, 7, 3, 19, 17, 15, 13, 10, 4, 13, 5, 8, 11,
    5, 1, 12, 4, 4, 1, 1, 0,
];
static T8_LENGTHS: [u8; 36] = [
    2, 3, 6, 8, 8, 9, 3, 2, 4, 8, 8, 8, 6, 4, 6, 8, 8, 9, 8, 8, 8, 9, 9, 10, 8, 7, 8, 9, 10, 10,
    9, 8, 9, 9, 11, 11,
];

static T9_CODES: [u16; 36] = [
    7, 5, 9, 14, 15, 7, 6, 4, 5, 5, 6, 7, 7, 6, 8, 8, 8, 5, 15, 6, 9, 10, 5, 1, 11, 7, 9, 6, 4, 1,
    14, 4, 6, 2, 6, 0,
];
static T9_LENGTHS: [u8; 36] = [
    3, 3, 5, 6, 8, 9, 3, 3, 4, 5, 6, 8, 4, 4, 5, 6, 7, 8, 6, 5, 6, 7, 7, 8, 7, 6, 7, 7, 8, 9, 8,
    7, 8, 8, 9, 9,
];

static T10_CODES: [u16; 64] = [
    1, 2, 10, 23, 35, 30, 12, 17, 3, 3, 8, 12, 18, 21, 12, 7, 11, 9, 15, 21, 32, 40, 19, 6, 14,
    13, 22, 34, 46, 23, 18, 7, 20, 19, 33, 47, 27, 22, 9, 3, 31, 22, 41, 26, 21, 20, 5, 3, 14, 13,
    10, 11, 16, 6, 5, 1, 9, 8, 7, 8, 4, 4, 2, 0,
];
static T10_LENGTHS: [u8; 64] = [
    1, 3, 6, 8, 9, 9, 9, 10, 3, 4, 6, 7, 8, 9, 8, 8, 6, 6, 7, 8, 9, 10, 9, 9, 7, 7, 8, 9, 10, 10,
    9, 10, 8, 8, 9, 10, 10, 10, 10, 10, 9, 9, 10, 10, 11, 11, 10, 11, 8, 8, 9, 10, 10, 10, 11, 11,
    9, 8, 9, 10, 10, 11, 11, 11,
];

static T11_CODES: [u16; 64] = [
    3, 4, 10, 24, 34, 33, 21, 15, 5, 3, 4, 10, 32, 17, 11, 10, 11, 7, 13, 18, 30, 31, 20, 5, 25,
    11, 19, 59, 27, 18, 12, 5, 35, 33, 31, 58, 30, 16, 7, 5, 28, 26, 32, 19, 17, 15, 8, 14, 14,
    12, 9, 13, 14, 9, 4, 1, 11, 4, 6, 6, 6, 3, 2, 0,
];
static T11_LENGTHS: [u8; 64] = [
    2, 3, 5, 7, 8, 9, 8, 9, 3, 3, 4, 6, 8, 8, 7, 8, 5, 5, 6, 7, 8, 9, 8, 8, 7, 6, 7, 9, 8, 10, 8,
    9, 8, 8, 8, 9, 9, 10, 9, 10, 8, 8, 9, 10, 10, 11, 10, 11, 8, 7, 7, 8, 9, 10, 10, 10, 8, 7, 8,
    9, 10, 10, 10, 10,
];

static T12_CODES: [u16; 64] = [
    9, 6, 16, 33, 41, 39, 38, 26, 7, 5, 6, 9, 23, 16, 26, 11, 17, 7, 11, 14, 21, 30, 10, 7, 17,
    10, 15, 12, 18, 28, 14, 5, 32, 13, 22, 19, 18, 16, 9, 5, 40, 17, 31, 29, 17, 13, 4, 2, 27, 12,
    11, 15, 10, 7, 4, 1, 27, 12, 8, 12, 6, 3, 1, 0,
];
static T12_LENGTHS: [u8; 64] = [
    4, 3, 5, 7, 8, 9, 9, 9, 3, 3, 4, 5, 7, 7, 8, 8, 5, 4, 5, 6, 7, 8, 7, 8, 6, 5, 6, 6, 7, 8, 8,
    8, 7, 6, 7, 7, 8, 8, 8, 9, 8, 7, 8, 8, 8, 9, 8, 9, 8, 7, 7, 8, 8, 9, 9, 10, 9, 8, 8, 9, 9, 9,
    9, 10,
];

static T13_CODES: [u16; 256] = [
    1, 5, 14, 21, 34, 51, 46, 71, 42, 52, 68, 52, 67, 44, 43, 19, 3, 4, 12, 19, 31, 26, 44, 33,
    31, 24, 32, 24, 31, 35, 22, 14, 15, 13, 23, 36, 59, 49, 77, 65, 29, 40, 30, 40, 27, 33, 42,
    16, 22, 20, 37, 61, 56, 79, 73, 64, 43, 76, 56, 37, 26, 31, 25, 14, 35, 16, 60, 57, 97, 75,
    114, 91, 54, 73, 55, 41, 48, 53, 23, 24, 58, 27, 50, 96, 76, 70, 93, 84, 77, 58, 79, 29, 74,
    49, 41, 17, 47, 45, 78, 74, 115, 94, 90, 79, 69, 83, 71, 50, 59, 38, 36, 15, 72, 34, 56, 95,
    92, 85, 91, 90, 86, 73, 77, 65, 51, 44, 43, 42, 43, 20, 30, 44, 55, 78, 72, 87, 78, 61, 46,
    54, 37, 30, 20, 16, 53, 25, 41, 37, 44, 59, 54, 81, 66, 76, 57, 54, 37, 18, 39, 11, 35, 33,
    31, 57, 42, 82, 72, 80, 47, 58, 55, 21, 22, 26, 38, 22, 53, 25, 23, 38, 70, 60, 51, 36, 55,
    26, 34, 23, 27, 14, 9, 7, 34, 32, 28, 39, 49, 75, 30, 52, 48, 40, 52, 28, 18, 17, 9, 5, 45,
    21, 34, 64, 56, 50, 49, 45, 31, 19, 12, 15, 10, 7, 6, 3, 48, 23, 20, 39, 36, 35, 53, 21, 16,
    23, 13, 10, 6, 1, 4, 2, 16, 15, 17, 27, 25, 20, 29, 11, 17, 12, 16, 8, 1, 1, 0, 1,
];
static T13_LENGTHS: [u8; 256] = [
    1, 4, 6, 7, 8, 9, 9, 10, 9, 10, 11, 11, 12, 12, 13, 13, 3, 4, 6, 7, 8, 8, 9, 9, 9, 9, 10, 10,
    11, 12, 12, 12, 6, 6, 7, 8, 9, 9, 10, 10, 9, 10, 10, 11, 11, 12, 13, 13, 7, 7, 8, 9, 9, 10,
    10, 10, 10, 11, 11, 11, 11, 12, 13, 13, 8, 7, 9, 9, 10, 10, 11, 11, 10, 11, 11, 12, 12, 13,
    13, 14, 9, 8, 9, 10, 10, 10, 11, 11, 11, 11, 12, 11, 13, 13, 14, 14, 9, 9, 10, 10, 11, 11, 11,
    11, 11, 12, 12, 12, 13, 13, 14, 14, 10, 9, 10, 11, 11, 11, 12, 12, 12, 12, 13, 13, 13, 14, 16,
    16, 9, 8, 9, 10, 10, 11, 11, 12, 12, 12, 12, 13, 13, 14, 15, 15, 10, 9, 10, 10, 11, 11, 11,
    13, 12, 13, 13, 14, 14, 14, 16, 15, 10, 10, 10, 11, 11, 12, 12, 13, 12, 13, 14, 13, 14, 15,
    16, 17, 11, 10, 10, 11, 12, 12, 12, 12, 13, 13, 13, 14, 15, 15, 15, 16, 11, 11, 11, 12, 12,
    13, 12, 13, 14, 14, 15, 15, 15, 16, 16, 16, 12, 11, 12, 13, 13, 13, 14, 14, 14, 14, 14, 15,
    16, 15, 16, 16, 13, 12, 12, 13, 13, 13, 15, 14, 14, 17, 15, 15, 15, 17, 16, 16, 12, 12, 13,
    14, 14, 14, 15, 14, 15, 15, 16, 16, 19, 18, 19, 16,
];

static T15_CODES: [u16; 256] = [
    7, 12, 18, 53, 47, 76, 124, 108, 89, 123, 108, 119, 107, 81, 122, 63, 13, 5, 16, 27, 46, 36,
    61, 51, 42, 70, 52, 83, 65, 41, 59, 36, 19, 17, 15, 24, 41, 34, 59, 48, 40, 64, 50, 78, 62,
    80, 56, 33, 29, 28, 25, 43, 39, 63, 55, 93, 76, 59, 93, 72, 54, 75, 50, 29, 52, 22, 42, 40,
    67, 57, 95, 79, 72, 57, 89, 69, 49, 66, 46, 27, 77, 37, 35, 66, 58, 52, 91, 74, 62, 48, 79,
    63, 90, 62, 40, 38, 125, 32, 60, 56, 50, 92, 78, 65, 55, 87, 71, 51, 73, 51, 70, 30, 109, 53,
    49, 94, 88, 75, 66, 122, 91, 73, 56, 42, 64, 44, 21, 25, 90, 43, 41, 77, 73, 63, 56, 92, 77,
    66, 47, 67, 48, 53, 36, 20, 71, 34, 67, 60, 58, 49, 88, 76, 67, 106, 71, 54, 38, 39, 23, 15,
    109, 53, 51, 47, 90, 82, 58, 57, 48, 72, 57, 41, 23, 27, 62, 9, 86, 42, 40, 37, 70, 64, 52,
    43, 70, 55, 42, 25, 29, 18, 11, 11, 118, 68, 30, 55, 50, 46, 74, 65, 49, 39, 24, 16, 22, 13,
    14, 7, 91, 44, 39, 38, 34, 63, 52, 45, 31, 52, 28, 19, 14, 8, 9, 3, 123, 60, 58, 53, 47, 43,
    32, 22, 37, 24, 17, 12, 15, 10, 2, 1, 71, 37, 34, 30, 28, 20, 17, 26, 21, 16, 10, 6, 8, 6, 2,
    0,
];
static T15_LENGTHS: [u8; 256] = [
    3, 4, 5, 7, 7, 8, 9, 9, 9, 10, 10, 11, 11, 11, 12, 13, 4, 3, 5, 6, 7, 7, 8, 8, 8, 9, 9, 10,
    10, 10, 11, 11, 5, 5, 5, 6, 7, 7, 8, 8, 8, 9, 9, 10, 10, 11, 11, 11, 6, 6, 6, 7, 7, 8, 8, 9,
    9, 9, 10, 10, 10, 11, 11, 11, 7, 6, 7, 7, 8, 8, 9, 9, 9, 9, 10, 10, 10, 11, 11, 11, 8, 7, 7,
    8, 8, 8, 9, 9, 9, 9, 10, 10, 11, 11, 11, 12, 9, 7, 8, 8, 8, 9, 9, 9, 9, 10, 10, 10, 11, 11,
    12, 12, 9, 8, 8, 9, 9, 9, 9, 10, 10, 10, 10, 10, 11, 11, 11, 12, 9, 8, 8, 9, 9, 9, 9, 10, 10,
    10, 10, 11, 11, 12, 12, 12, 9, 8, 9, 9, 9, 9, 10, 10, 10, 11, 11, 11, 11, 12, 12, 12, 10, 9,
    9, 9, 10, 10, 10, 10, 10, 11, 11, 11, 11, 12, 13, 12, 10, 9, 9, 9, 10, 10, 10, 10, 11, 11, 11,
    11, 12, 12, 12, 13, 11, 10, 9, 10, 10, 10, 11, 11, 11, 11, 11, 11, 12, 12, 13, 13, 11, 10, 10,
    10, 10, 11, 11, 11, 11, 12, 12, 12, 12, 12, 13, 13, 12, 11, 11, 11, 11, 11, 11, 11, 12, 12,
    12, 12, 13, 13, 12, 13, 12, 11, 11, 11, 11, 11, 11, 12, 12, 12, 12, 12, 13, 13, 13, 13,
];

static T16_CODES: [u16; 256] = [
    1, 5, 14, 44, 74, 63, 110, 93, 172, 149, 138, 242, 225, 195, 376, 17, 3, 4, 12, 20, 35, 62,
    53, 47, 83, 75, 68, 119, 201, 107, 207, 9, 15, 13, 23, 38, 67, 58, 103, 90, 161, 72, 127, 117,
    110, 209, 206, 16, 45, 21, 39, 69, 64, 114, 99, 87, 158, 140, 252, 212, 199, 387, 365, 26, 75,
    36, 68, 65, 115, 101, 179, 164, 155, 264, 246, 226, 395, 382, 362, 9, 66, 30, 59, 56, 102,
    185, 173, 265, 142, 253, 232, 400, 388, 378, 445, 16, 111, 54, 52, 100, 184, 178, 160, 133,
    257, 244, 228, 217, 385, 366, 715, 10, 98, 48, 91, 88, 165, 157, 148, 261, 248, 407, 397, 372,
    380, 889, 884, 8, 85, 84, 81, 159, 156, 143, 260, 249, 427, 401, 392, 383, 727, 713, 708, 7,
    154, 76, 73, 141, 131, 256, 245, 426, 406, 394, 384, 735, 359, 710, 352, 11, 139, 129, 67,
    125, 247, 233, 229, 219, 393, 743, 737, 720, 885, 882, 439, 4, 243, 120, 118, 115, 227, 223,
    396, 746, 742, 736, 721, 712, 706, 223, 436, 6, 202, 224, 222, 218, 216, 389, 386, 381, 364,
    888, 443, 707, 440, 437, 1728, 4, 747, 211, 210, 208, 370, 379, 734, 723, 714, 1735, 883, 877,
    876, 3459, 865, 2, 377, 369, 102, 187, 726, 722, 358, 711, 709, 866, 1734, 871, 3458, 870,
    434, 0, 12, 10, 7, 11, 10, 17, 11, 9, 13, 12, 10, 7, 5, 3, 1, 3,
];
static T16_LENGTHS: [u8; 256] = [
    1, 4, 6, 8, 9, 9, 10, 10, 11, 11, 11, 12, 12, 12, 13, 9, 3, 4, 6, 7, 8, 9, 9, 9, 10, 10, 10,
    11, 12, 11, 12, 8, 6, 6, 7, 8, 9, 9, 10, 10, 11, 10, 11, 11, 11, 12, 12, 9, 8, 7, 8, 9, 9, 10,
    10, 10, 11, 11, 12, 12, 12, 13, 13, 10, 9, 8, 9, 9, 10, 10, 11, 11, 11, 12, 12, 12, 13, 13,
    13, 9, 9, 8, 9, 9, 10, 11, 11, 12, 11, 12, 12, 13, 13, 13, 14, 10, 10, 9, 9, 10, 11, 11, 11,
    11, 12, 12, 12, 12, 13, 13, 14, 10, 10, 9, 10, 10, 11, 11, 11, 12, 12, 13, 13, 13, 13, 15, 15,
    10, 10, 10, 10, 11, 11, 11, 12, 12, 13, 13, 13, 13, 14, 14, 14, 10, 11, 10, 10, 11, 11, 12,
    12, 13, 13, 13, 13, 14, 13, 14, 13, 11, 11, 11, 10, 11, 12, 12, 12, 12, 13, 14, 14, 14, 15,
    15, 14, 10, 12, 11, 11, 11, 12, 12, 13, 14, 14, 14, 14, 14, 14, 13, 14, 11, 12, 12, 12, 12,
    12, 13, 13, 13, 13, 15, 14, 14, 14, 14, 16, 11, 14, 12, 12, 12, 13, 13, 14, 14, 14, 16, 15,
    15, 15, 17, 15, 11, 13, 13, 11, 12, 14, 14, 13, 14, 14, 15, 16, 15, 17, 15, 14, 11, 9, 8, 8,
    9, 9, 10, 10, 10, 11, 11, 11, 11, 11, 11, 11, 8,
];

static T24_CODES: [u16; 256] = [
    15, 13, 46, 80, 146, 262, 248, 434, 426, 669, 653, 649, 621, 517, 1032, 88, 14, 12, 21, 38,
    71, 130, 122, 216, 209, 198, 327, 345, 319, 297, 279, 42, 47, 22, 41, 74, 68, 128, 120, 221,
    207, 194, 182, 340, 315, 295, 541, 18, 81, 39, 75, 70, 134, 125, 116, 220, 204, 190, 178, 325,
    311, 293, 271, 16, 147, 72, 69, 135, 127, 118, 112, 210, 200, 188, 352, 323, 306, 285, 540,
    14, 263, 66, 129, 126, 119, 114, 214, 202, 192, 180, 341, 317, 301, 281, 262, 12, 249, 123,
    121, 117, 113, 215, 206, 195, 185, 347, 330, 308, 291, 272, 520, 10, 435, 115, 111, 109, 211,
    203, 196, 187, 353, 332, 313, 298, 283, 531, 381, 17, 427, 212, 208, 205, 201, 193, 186, 177,
    169, 320, 303, 286, 268, 514, 377, 16, 335, 199, 197, 191, 189, 181, 174, 333, 321, 305, 289,
    275, 521, 379, 371, 11, 668, 184, 183, 179, 175, 344, 331, 314, 304, 290, 277, 530, 383, 373,
    366, 10, 652, 346, 171, 168, 164, 318, 309, 299, 287, 276, 263, 513, 375, 368, 362, 6, 648,
    322, 316, 312, 307, 302, 292, 284, 269, 261, 512, 376, 370, 364, 359, 4, 620, 300, 296, 294,
    288, 282, 273, 266, 515, 380, 374, 369, 365, 361, 357, 2, 1033, 280, 278, 274, 267, 264, 259,
    382, 378, 372, 367, 363, 360, 358, 356, 0, 43, 20, 19, 17, 15, 13, 11, 9, 7, 6, 4, 7, 5, 3, 1,
    3,
];
static T24_LENGTHS: [u8; 256] = [
    4, 4, 6, 7, 8, 9, 9, 10, 10, 11, 11, 11, 11, 11, 12, 9, 4, 4, 5, 6, 7, 8, 8, 9, 9, 9, 10, 10,
    10, 10, 10, 8, 6, 5, 6, 7, 7, 8, 8, 9, 9, 9, 9, 10, 10, 10, 11, 7, 7, 6, 7, 7, 8, 8, 8, 9, 9,
    9, 9, 10, 10, 10, 10, 7, 8, 7, 7, 8, 8, 8, 8, 9, 9, 9, 10, 10, 10, 10, 11, 7, 9, 7, 8, 8, 8,
    8, 9, 9, 9, 9, 10, 10, 10, 10, 10, 7, 9, 8, 8, 8, 8, 9, 9, 9, 9, 10, 10, 10, 10, 10, 11, 7,
    10, 8, 8, 8, 9, 9, 9, 9, 10, 10, 10, 10, 10, 11, 11, 8, 10, 9, 9, 9, 9, 9, 9, 9, 9, 10, 10,
    10, 10, 11, 11, 8, 10, 9, 9, 9, 9, 9, 9, 10, 10, 10, 10, 10, 11, 11, 11, 8, 11, 9, 9, 9, 9,
    10, 10, 10, 10, 10, 10, 11, 11, 11, 11, 8, 11, 10, 9, 9, 9, 10, 10, 10, 10, 10, 10, 11, 11,
    11, 11, 8, 11, 10, 10, 10, 10, 10, 10, 10, 10, 10, 11, 11, 11, 11, 11, 8, 11, 10, 10, 10, 10,
    10, 10, 10, 11, 11, 11, 11, 11, 11, 11, 8, 12, 10, 10, 10, 10, 10, 10, 11, 11, 11, 11, 11, 11,
    11, 11, 8, 8, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 8, 8, 8, 8, 4,
];

/// Count1 quadruple tables. Table A has variable lengths, table B is flat
/// 4-bit. Sign bits are counted separately.
pub static T32_CODES: [u16; 16] = [1, 5, 4, 5, 6, 5, 4, 4, 7, 3, 6, 0, 7, 2, 3, 1];
pub static T32_LENGTHS: [u8; 16] = [1, 4, 4, 5, 4, 6, 5, 6, 4, 5, 5, 6, 5, 6, 6, 6];

pub static T33_CODES: [u16; 16] = [15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0];
pub static T33_LENGTHS: [u8; 16] = [4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4];

macro_rules! ht {
    ($xlen:expr, $linbits:expr, $codes:expr, $lengths:expr) => {
        Some(HuffmanTable {
            xlen: $xlen,
            linbits: $linbits,
            linmax: (1 << $linbits) - 1,
            codes: &$codes,
            lengths: &$lengths,
        })
    };
}

/// Big-values Huffman tables 0..=31. Tables 0, 4 and 14 do not exist.
/// Tables 16..=23 share the table-16 codes, 24..=31 the table-24 codes;
/// only `linbits` differs.
pub static HUFFMAN_TABLES: [Option<HuffmanTable>; 32] = [
    None,
    ht!(2, 0, T1_CODES, T1_LENGTHS),
    ht!(3, 0, T2_CODES, T2_LENGTHS),
    ht!(3, 0, T3_CODES, T3_LENGTHS),
    None,
    ht!(4, 0, T5_CODES, T5_LENGTHS),
    ht!(4, 0, T6_CODES, T6_LENGTHS),
    ht!(6, 0, T7_CODES, T7_LENGTHS),
    ht!(6, 0, T8_CODES, T8_LENGTHS),
    ht!(6, 0, T9_CODES, T9_LENGTHS),
    ht!(8, 0, T10_CODES, T10_LENGTHS),
    ht!(8, 0, T11_CODES, T11_LENGTHS),
    ht!(8, 0, T12_CODES, T12_LENGTHS),
    ht!(16, 0, T13_CODES, T13_LENGTHS),
    None,
    ht!(16, 0, T15_CODES, T15_LENGTHS),
    ht!(16, 1, T16_CODES, T16_LENGTHS),
    ht!(16, 2, T16_CODES, T16_LENGTHS),
    ht!(16, 3, T16_CODES, T16_LENGTHS),
    ht!(16, 4, T16_CODES, T16_LENGTHS),
    ht!(16, 6, T16_CODES, T16_LENGTHS),
    ht!(16, 8, T16_CODES, T16_LENGTHS),
    ht!(16, 10, T16_CODES, T16_LENGTHS),
    ht!(16, 13, T16_CODES, T16_LENGTHS),
    ht!(16, 4, T24_CODES, T24_LENGTHS),
    ht!(16, 5, T24_CODES, T24_LENGTHS),
    ht!(16, 6, T24_CODES, T24_LENGTHS),
    ht!(16, 7, T24_CODES, T24_LENGTHS),
    ht!(16, 8, T24_CODES, T24_LENGTHS),
    ht!(16, 9, T24_CODES, T24_LENGTHS),
    ht!(16, 11, T24_CODES, T24_LENGTHS),
    ht!(16, 13, T24_CODES, T24_LENGTHS),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sfb_tables_cover_the_full_granule() {
        for bands in &SFB_TABLES {
            assert_eq!(bands.l[0], 0);
            assert_eq!(bands.l[22], 576);
            assert_eq!(bands.s[0], 0);
            assert_eq!(bands.s[13], 192);
            assert!(bands.l.windows(2).all(|w| w[0] < w[1]));
            assert!(bands.s.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn pow_tables_are_consistent() {
        // ipow20 is the 3/4 power of the inverse step selected by pow20.
        for gain in [0, 100, 210, 255] {
            let step = pow20(gain);
            let istep = ipow20(gain);
            assert!((istep - step.powf(-0.75)).abs() < 1e-12 * istep.abs());
        }
        assert!((pow43(8) - 16.0).abs() < 1e-9);
        assert_eq!(pow43(0), 0.0);
    }

    #[test]
    fn escape_tables_cover_the_quantizer_ceiling() {
        let t23 = HUFFMAN_TABLES[23].as_ref().unwrap();
        let t31 = HUFFMAN_TABLES[31].as_ref().unwrap();
        assert_eq!(t23.linmax, 8191);
        assert_eq!(t31.linmax, 8191);
        assert_eq!(15 + t31.linmax, IXMAX_VAL);
    }

    #[test]
    fn scalefac_cost_tables_match_slen_widths() {
        // Long blocks store 11 slen1 + 10 slen2 scalefactors.
        for k in 0..16 {
            assert_eq!(SCALE_LONG[k], 11 * SLEN1_TAB[k] + 10 * SLEN2_TAB[k]);
            assert_eq!(SCALE_SHORT[k], 18 * SLEN1_TAB[k] + 18 * SLEN2_TAB[k]);
            assert_eq!(SCALE_MIXED[k], 17 * SLEN1_TAB[k] + 18 * SLEN2_TAB[k]);
        }
    }
}
