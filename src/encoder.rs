//! The encoder instance: owns the configuration, the immutable tables,
//! the bit reservoir and the per-frame working state, and turns one
//! [`FrameSpectrum`] at a time into Layer III frames.
//!
//! The core is single-threaded and synchronous; a frame is processed
//! start to finish on the calling thread. Output bytes may lag the input
//! by up to the reservoir depth, so a final [`Mp3Encoder::flush`] is
//! required to close the last frames.

use log::debug;

use crate::bitstream::{
    write_header, write_main_data, write_side_info, BitstreamAssembler, BitstreamWriter,
    FrameHeader,
};
use crate::config::{EncoderConfig, InternalFlags, MpegVersion, VbrMode};
use crate::error::ConfigResult;
use crate::noise::{AthBands, QuantComparator};
use crate::reservoir::BitReservoir;
use crate::tables::{ScalefacBands, SFB_TABLES};
use crate::types::{
    EncodedSpectrum, FrameSpectrum, Scalefac, SideInfo, GRANULE_SIZE, MAX_CHANNELS, MAX_GRANULES,
};

pub struct Mp3Encoder {
    pub(crate) cfg: EncoderConfig,
    pub(crate) flags: InternalFlags,
    pub(crate) sfb: ScalefacBands,
    pub(crate) ath: AthBands,
    pub(crate) comparator: QuantComparator,
    pub(crate) resv: BitReservoir,
    pub(crate) side_info: SideInfo,
    pub(crate) scalefac: [[Scalefac; MAX_CHANNELS]; MAX_GRANULES],
    pub(crate) l3_enc: Box<EncodedSpectrum>,
    /// Previous global gain per channel, seeding the binary search.
    pub(crate) old_value: [i32; MAX_CHANNELS],
    /// Step memory of the binary search.
    pub(crate) current_step: i32,
    pub(crate) bitrate_index: usize,
    pub(crate) padding: u32,
    slot_lag: f64,
    frac_slots_per_frame: f64,
    assembler: BitstreamAssembler,
    frames_encoded: u64,
}

impl Mp3Encoder {
    pub fn new(cfg: EncoderConfig) -> ConfigResult<Self> {
        let flags = InternalFlags::from_config(&cfg)?;
        let sfb = SFB_TABLES[flags.samplerate_index];
        let ath = AthBands::new(&sfb, flags.samplerate);
        let comparator = QuantComparator::from_mode(cfg.experimental_x);

        // Fractional-slot padding schedule; no padding on the very first
        // frame.
        let frac_slots_per_frame = if cfg.vbr_mode == VbrMode::Off {
            let factor: i64 = if flags.version == MpegVersion::Mpeg1 {
                144_000
            } else {
                72_000
            };
            ((factor * cfg.bitrate as i64) % flags.samplerate as i64) as f64
        } else {
            0.0
        };

        let bitrate_index = flags.bitrate_index;
        Ok(Self {
            cfg,
            flags,
            sfb,
            ath,
            comparator,
            resv: BitReservoir::new(),
            side_info: SideInfo::default(),
            scalefac: Default::default(),
            l3_enc: Box::new([[[0; GRANULE_SIZE]; MAX_CHANNELS]; MAX_GRANULES]),
            old_value: [180; MAX_CHANNELS],
            current_step: 4,
            bitrate_index,
            padding: 0,
            slot_lag: frac_slots_per_frame,
            frac_slots_per_frame,
            assembler: BitstreamAssembler::new(),
            frames_encoded: 0,
        })
    }

    /// PCM samples consumed per frame.
    pub fn samples_per_frame(&self) -> usize {
        if self.flags.version == MpegVersion::Mpeg1 {
            1152
        } else {
            576
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.cfg
    }

    pub fn side_info(&self) -> &SideInfo {
        &self.side_info
    }

    pub fn reservoir(&self) -> &BitReservoir {
        &self.resv
    }

    pub fn bitrate_index(&self) -> usize {
        self.bitrate_index
    }

    pub fn quantized(&self, gr: usize, ch: usize) -> &[i32; GRANULE_SIZE] {
        &self.l3_enc[gr][ch]
    }

    pub fn scalefactors(&self, gr: usize, ch: usize) -> &Scalefac {
        &self.scalefac[gr][ch]
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Encode one frame of spectral data. Returns every output byte that
    /// became final; due to the bit reservoir this can be empty early on
    /// and cover multiple frames later.
    pub fn encode_frame(&mut self, frame: &mut FrameSpectrum) -> Vec<u8> {
        self.side_info = SideInfo::default();

        // CBR padding schedule
        self.padding = 0;
        if self.cfg.vbr_mode == VbrMode::Off && self.frac_slots_per_frame != 0.0 {
            self.slot_lag -= self.frac_slots_per_frame;
            if self.slot_lag < 0.0 {
                self.slot_lag += self.flags.samplerate as f64;
                self.padding = 1;
            }
        }

        // The decoder's back-pointer is the reservoir level entering this
        // frame.
        let main_data_begin = self.assembler.pending_main_bytes() as u32;
        debug_assert_eq!(main_data_begin as i32, self.resv.size() / 8);

        let (frame_bits, _mean_bits) = match self.cfg.vbr_mode {
            VbrMode::Off => self.cbr_iteration_loop(frame),
            VbrMode::Abr => self.abr_iteration_loop(frame),
            VbrMode::Rh | VbrMode::Mt | VbrMode::Mtrh => self.vbr_iteration_loop(frame),
        };
        self.side_info.main_data_begin = main_data_begin;

        // header + side info
        let mut head = BitstreamWriter::new();
        write_header(
            &mut head,
            &FrameHeader {
                version: self.flags.version,
                bitrate_index: self.bitrate_index,
                samplerate_index: self.flags.samplerate_index,
                padding: self.padding != 0,
                mode: self.flags.mode,
                ms_stereo: self.ms_active(frame),
                copyright: self.cfg.copyright,
                original: self.cfg.original,
            },
        );
        write_side_info(
            &mut head,
            &self.side_info,
            self.flags.version,
            self.flags.channels,
        );
        debug_assert_eq!(head.as_bytes().len(), self.flags.sideinfo_len);
        self.assembler
            .add_frame(head.into_bytes(), frame_bits as usize / 8);

        // main data for every granule-channel, then the reservoir drain
        let mut main = BitstreamWriter::new();
        for gr in 0..self.flags.mode_gr {
            for ch in 0..self.flags.channels {
                write_main_data(
                    &mut main,
                    &self.sfb,
                    self.flags.version,
                    &self.side_info.granules[gr][ch],
                    &self.scalefac[gr][ch],
                    &self.side_info.scfsi[ch],
                    gr,
                    &self.l3_enc[gr][ch],
                );
            }
        }
        let mut drain = self.side_info.resv_drain;
        while drain > 0 {
            let n = drain.min(32) as u32;
            main.put_bits(0, n);
            drain -= n as i32;
        }
        debug_assert!(main.is_byte_aligned());
        self.assembler.push_main_data(main);

        self.frames_encoded += 1;
        debug!(
            "frame {}: {} bytes, bitrate index {}, reservoir {}",
            self.frames_encoded,
            frame_bits / 8,
            self.bitrate_index,
            self.resv.size()
        );
        self.assembler.drain_output()
    }

    /// Close the stream: zero-pad and release every frame still waiting
    /// for main data.
    pub fn flush(&mut self) -> Vec<u8> {
        self.assembler.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_rejects_bad_config() {
        let cfg = EncoderConfig {
            samplerate: 12345,
            ..Default::default()
        };
        assert!(Mp3Encoder::new(cfg).is_err());
    }

    #[test]
    fn encoder_reports_frame_geometry() {
        let enc = Mp3Encoder::new(EncoderConfig::default()).unwrap();
        assert_eq!(enc.samples_per_frame(), 1152);

        let enc = Mp3Encoder::new(EncoderConfig {
            samplerate: 16000,
            bitrate: 64,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(enc.samples_per_frame(), 576);
    }
}
