//! Bit reservoir: bits saved by cheap granules, lendable to later ones.
//!
//! The reservoir level always stays within `[0, max]`; the cap is derived
//! per frame from the decoder's main-data buffer and the
//! `main_data_begin` field width, so the serialized stream can always
//! point back far enough.

use log::{debug, warn};

use crate::types::{GranuleInfo, MAX_BITS};

/// Decoder main-data buffer, in bits.
const BUFFER_BITS: i32 = 7680;

#[derive(Debug, Default)]
pub struct BitReservoir {
    size: i32,
    max_size: i32,
}

impl BitReservoir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a frame: derive the reservoir cap from this frame's length
    /// and return how many bits the whole frame may consume.
    pub fn frame_begin(
        &mut self,
        mpeg1: bool,
        mean_bits: i32,
        frame_bits: i32,
        mode_gr: i32,
    ) -> i32 {
        // main_data_begin counts bytes in a 9- or 8-bit field.
        let resv_limit = if mpeg1 { 8 * 511 } else { 8 * 255 };
        self.max_size = (BUFFER_BITS - frame_bits).clamp(0, resv_limit) & !7;

        debug!(
            "reservoir frame begin: level {} / cap {}, frame {} bits",
            self.size, self.max_size, frame_bits
        );
        mean_bits * mode_gr + self.size.min(self.max_size)
    }

    /// Granule-channel budget cap: the mean share plus a reservoir draw
    /// that grows with perceptual entropy, forced higher when the
    /// reservoir is running full.
    pub fn max_bits(&self, pe: f64, mean_bits: i32, channels: i32) -> i32 {
        let mean = mean_bits / channels;
        let max_bits = mean.min(MAX_BITS);
        if self.max_size == 0 {
            return max_bits;
        }

        let more_bits = (pe * 3.1) as i32 - mean;
        let mut add_bits = 0;
        if more_bits > 100 {
            add_bits = (self.size * 6 / 10).min(more_bits);
        }
        // drain anything above 80% of the cap regardless of demand
        let over_bits = self.size - self.max_size * 8 / 10 - add_bits;
        if over_bits > 0 {
            add_bits += over_bits;
        }
        (max_bits + add_bits).min(MAX_BITS)
    }

    /// Settle one granule-channel: unused share flows in, overdraw flows
    /// out.
    pub fn adjust(&mut self, gi: &GranuleInfo, mean_bits: i32, channels: i32) {
        self.size += mean_bits / channels - gi.part2_3_length as i32;
        if self.size < 0 {
            warn!("reservoir overdrawn by {} bits, clamping", -self.size);
            self.size = 0;
        }
    }

    /// Finish the frame: returns the stuffing bits that must be written
    /// into the ancillary area to keep the level within the cap and
    /// byte-aligned.
    pub fn frame_end(&mut self, mean_bits: i32, channels: i32) -> i32 {
        if channels == 2 && mean_bits & 1 != 0 {
            self.size += 1;
        }

        let mut stuffing = 0;
        let over = self.size - self.max_size;
        if over > 0 {
            self.size -= over;
            stuffing += over;
        }
        let align = self.size % 8;
        if align != 0 {
            self.size -= align;
            stuffing += align;
        }
        debug_assert!(self.size % 8 == 0);
        stuffing
    }

    /// Current level in bits. Always byte-aligned at frame boundaries.
    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn max_size(&self) -> i32 {
        self.max_size
    }
}
