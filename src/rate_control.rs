//! Rate-control drivers: CBR, ABR and VBR frame loops.
//!
//! All three share the outer-loop contract: compute per-granule-channel
//! target bits, run the outer loop, reconcile the reservoir. Granule 0 is
//! always settled before granule 1 (and left before right) because the
//! reservoir state each one sees is the post-predecessor state.

use log::{debug, warn};

use crate::config::{ChannelMode, MpegVersion};
use crate::encoder::Mp3Encoder;
use crate::huffman::best_huffman_divide;
use crate::noise::calc_xmin;
use crate::quantization::init_outer_loop;
use crate::scalefactor::best_scalefac_store;
use crate::types::{
    AllowedDistortion, BlockType, FrameSpectrum, GranuleInfo, Scalefac, GRANULE_SIZE, MAX_BITS,
    MAX_CHANNELS, MAX_GRANULES,
};

/// Masking adjustment per VBR quality step, in dB.
const DB_Q: [f64; 10] = [-4.0, -3.0, -2.0, -1.0, 0.0, 0.5, 1.0, 1.5, 2.0, 2.5];

const SQRT2: f64 = std::f64::consts::SQRT_2;

/// Convert a left/right granule pair to mid/side.
pub fn ms_convert(xr: &mut [[f64; GRANULE_SIZE]; MAX_CHANNELS]) {
    for i in 0..GRANULE_SIZE {
        let l = xr[0][i];
        let r = xr[1][i];
        xr[0][i] = (l + r) / SQRT2;
        xr[1][i] = (l - r) / SQRT2;
    }
}

/// Shift bits from the side channel to the mid channel in proportion to
/// how mono-like the granule is, then clamp the pair to `max_bits`.
pub fn reduce_side(targ_bits: &mut [i32; 2], ms_ener_ratio: f64, mean_bits: i32, max_bits: i32) {
    let fac = (0.33 * (0.5 - ms_ener_ratio) / 0.5).clamp(0.0, 0.5);
    let mut move_bits = (fac * 0.5 * (targ_bits[0] + targ_bits[1]) as f64) as i32;
    move_bits = move_bits.min(MAX_BITS - targ_bits[0]).max(0);

    if targ_bits[1] >= 125 {
        // never starve the side channel below its skeleton
        if targ_bits[1] - move_bits > 125 {
            if targ_bits[0] < mean_bits {
                targ_bits[0] += move_bits;
            }
            targ_bits[1] -= move_bits;
        } else {
            targ_bits[0] += targ_bits[1] - 125;
            targ_bits[1] = 125;
        }
    }

    let total = targ_bits[0] + targ_bits[1];
    if total > max_bits {
        targ_bits[0] = max_bits * targ_bits[0] / total;
        targ_bits[1] = max_bits * targ_bits[1] / total;
    }
}

impl Mp3Encoder {
    /// Frame and mean-bits accounting for one bitrate index.
    pub(crate) fn getframebits(&self, bitrate_index: usize, padding: u32) -> (i32, i32) {
        let bitrate =
            crate::tables::BITRATE_TABLE[self.flags.version.bitrate_row()][bitrate_index] as i64;
        let factor: i64 = if self.flags.version == MpegVersion::Mpeg1 {
            144_000
        } else {
            72_000
        };
        let slots = (factor * bitrate / self.flags.samplerate as i64) as i32 + padding as i32;
        let frame_bits = 8 * slots;
        let mean_bits = (frame_bits - self.flags.sideinfo_len as i32 * 8) / self.flags.mode_gr as i32;
        (frame_bits, mean_bits)
    }

    pub(crate) fn ms_active(&self, frame: &FrameSpectrum) -> bool {
        self.flags.mode == ChannelMode::JointStereo && frame.use_ms && self.flags.channels == 2
    }

    /// Seed the granule side info with this frame's psy block decision.
    fn prepare_blocks(&mut self, frame: &FrameSpectrum) {
        for gr in 0..self.flags.mode_gr {
            for ch in 0..self.flags.channels {
                let gi = &mut self.side_info.granules[gr][ch];
                *gi = GranuleInfo {
                    block_type: frame.block_type[gr][ch],
                    mixed_block_flag: frame.mixed_block_flag[gr][ch],
                    ..Default::default()
                };
                if gi.block_type == BlockType::Short {
                    gi.sfb_lmax = 0;
                    gi.sfb_smin = 0;
                    if gi.mixed_block_flag {
                        gi.sfb_lmax = if self.flags.version == MpegVersion::Mpeg1 { 8 } else { 6 };
                        gi.sfb_smin = 3;
                    }
                }
            }
        }
    }

    /// Per-granule CBR bit allocation driven by perceptual entropy.
    /// Returns the granule's reservoir-aware ceiling.
    fn on_pe(&self, frame: &FrameSpectrum, targ_bits: &mut [i32; 2], mean_bits: i32, gr: usize) -> i32 {
        let channels = self.flags.channels as i32;
        let mean_per_ch = mean_bits / channels;

        let mut max_bits_gr = 0;
        for ch in 0..self.flags.channels {
            max_bits_gr += self.resv.max_bits(frame.pe[gr][ch], mean_bits, channels);
        }

        for ch in 0..self.flags.channels {
            targ_bits[ch] = mean_per_ch;
            let pe = frame.pe[gr][ch];
            if pe > 700.0 {
                let mut add_bits = ((pe - 700.0) / 1.4) as i32;
                // transients always get something extra
                if frame.block_type[gr][ch] == BlockType::Short && add_bits < mean_per_ch / 2 {
                    add_bits = mean_per_ch / 2;
                }
                add_bits = add_bits.clamp(0, mean_per_ch * 3 / 4);
                targ_bits[ch] += add_bits;
            }
            targ_bits[ch] = targ_bits[ch].min(MAX_BITS);
        }

        let total: i32 = targ_bits[..self.flags.channels].iter().sum();
        if total > max_bits_gr {
            for t in targ_bits[..self.flags.channels].iter_mut() {
                *t = *t * max_bits_gr / total;
            }
        }
        max_bits_gr
    }

    /// Quantize one granule-channel into the encoder's output slots.
    #[allow(clippy::too_many_arguments)]
    fn encode_granule_channel(
        &mut self,
        frame: &FrameSpectrum,
        gr: usize,
        ch: usize,
        xmin: &AllowedDistortion,
        has_energy: bool,
        gi: &mut GranuleInfo,
        scalefac: &mut Scalefac,
        xrpow: &mut [f64; GRANULE_SIZE],
        targ_bits: i32,
    ) -> u32 {
        if !has_energy {
            self.l3_enc[gr][ch] = [0; GRANULE_SIZE];
            return 0;
        }
        let mut enc = [0i32; GRANULE_SIZE];
        let over = self.outer_loop(
            gi,
            &frame.xr[gr][ch],
            xmin,
            scalefac,
            xrpow,
            &mut enc,
            ch,
            targ_bits,
        );
        self.l3_enc[gr][ch] = enc;
        over
    }

    /// Scalefactor re-pack, optional Huffman re-division, reservoir
    /// settlement and sign application for one finished granule-channel.
    fn finish_granule_channel(&mut self, frame: &FrameSpectrum, gr: usize, ch: usize, mean_bits: i32) {
        best_scalefac_store(
            self.flags.version == MpegVersion::Mpeg1,
            &self.sfb,
            gr,
            ch,
            &self.l3_enc[gr][ch],
            &mut self.side_info,
            &mut self.scalefac,
        );
        if self.flags.use_best_huffman {
            best_huffman_divide(
                &self.sfb,
                self.flags.mode_gr,
                &mut self.side_info.granules[gr][ch],
                &self.l3_enc[gr][ch],
            );
        }
        self.resv.adjust(
            &self.side_info.granules[gr][ch],
            mean_bits,
            self.flags.channels as i32,
        );
        for i in 0..GRANULE_SIZE {
            if frame.xr[gr][ch][i] < 0.0 {
                self.l3_enc[gr][ch][i] = -self.l3_enc[gr][ch][i];
            }
        }
    }

    /// Constant-bitrate frame loop.
    pub(crate) fn cbr_iteration_loop(&mut self, frame: &mut FrameSpectrum) -> (i32, i32) {
        self.prepare_blocks(frame);
        let (frame_bits, mean_bits) = self.getframebits(self.bitrate_index, self.padding);
        self.resv.frame_begin(
            self.flags.version == MpegVersion::Mpeg1,
            mean_bits,
            frame_bits,
            self.flags.mode_gr as i32,
        );

        let ms = self.ms_active(frame);
        for gr in 0..self.flags.mode_gr {
            let mut targ_bits = [0i32; 2];
            let max_bits = self.on_pe(frame, &mut targ_bits, mean_bits, gr);
            if ms {
                ms_convert(&mut frame.xr[gr]);
                reduce_side(&mut targ_bits, frame.ms_ener_ratio[gr], mean_bits, max_bits);
            }

            for ch in 0..self.flags.channels {
                let mut gi = self.side_info.granules[gr][ch].clone();
                let mut scalefac = Scalefac::default();
                let mut xrpow = [0.0f64; GRANULE_SIZE];
                let has_energy = init_outer_loop(
                    self.flags.version,
                    &mut gi,
                    &mut scalefac,
                    &frame.xr[gr][ch],
                    &mut xrpow,
                );

                let mut xmin = AllowedDistortion::default();
                if has_energy {
                    calc_xmin(
                        &self.sfb,
                        &self.ath,
                        self.flags.masking_lower,
                        &frame.xr[gr][ch],
                        &frame.ratio[gr][ch],
                        &gi,
                        &mut xmin,
                        self.flags.sfb21_extra,
                    );
                }
                self.encode_granule_channel(
                    frame,
                    gr,
                    ch,
                    &xmin,
                    has_energy,
                    &mut gi,
                    &mut scalefac,
                    &mut xrpow,
                    targ_bits[ch],
                );
                debug_assert!(gi.part2_3_length < 4096);
                self.side_info.granules[gr][ch] = gi;
                self.scalefac[gr][ch] = scalefac;

                // settle before the next granule-channel reads the
                // reservoir
                self.finish_granule_channel(frame, gr, ch, mean_bits);
            }
        }

        self.side_info.resv_drain = self
            .resv
            .frame_end(mean_bits, self.flags.channels as i32);
        (frame_bits, mean_bits)
    }

    /// ABR target allocation: a compression-scaled mean with a PE surge,
    /// capped per granule-channel and rescaled to the frame ceiling.
    fn calc_target_bits(
        &mut self,
        frame: &FrameSpectrum,
        targ_bits: &mut [[i32; MAX_CHANNELS]; MAX_GRANULES],
    ) -> (i32, i32) {
        let mpeg1 = self.flags.version == MpegVersion::Mpeg1;
        let mode_gr = self.flags.mode_gr;
        let channels = self.flags.channels as i32;

        let (fb, mb) = self.getframebits(self.flags.vbr_max_bitrate, 0);
        let max_frame_bits = self.resv.frame_begin(mpeg1, mb, fb, mode_gr as i32);

        let (_, mb_min) = self.getframebits(1, 0);
        let analog_silence_bits = mb_min / channels;

        let framesize: i64 = if mpeg1 { 1152 } else { 576 };
        let mut mean_bits = (self.cfg.vbr_mean_bitrate_kbps as i64 * framesize * 1000
            / self.flags.samplerate as i64) as i32;
        mean_bits -= self.flags.sideinfo_len as i32 * 8;
        mean_bits /= mode_gr as i32;

        let res_factor =
            (0.90 + 0.10 * (11.0 - self.cfg.compression_ratio) / (11.0 - 5.5)).clamp(0.90, 1.00);

        for gr in 0..mode_gr {
            for ch in 0..self.flags.channels {
                targ_bits[gr][ch] = (res_factor * (mean_bits / channels) as f64) as i32;
                let pe = frame.pe[gr][ch];
                if pe > 700.0 {
                    let mut add_bits = ((pe - 700.0) / 1.4) as i32;
                    if frame.block_type[gr][ch] == BlockType::Short
                        && add_bits < mean_bits / channels / 4
                    {
                        add_bits = mean_bits / channels / 4;
                    }
                    add_bits = add_bits.clamp(0, mean_bits * 3 / 4);
                    targ_bits[gr][ch] += add_bits;
                }
            }
        }

        if self.ms_active(frame) {
            for gr in 0..mode_gr {
                let mut pair = [targ_bits[gr][0], targ_bits[gr][1]];
                reduce_side(&mut pair, frame.ms_ener_ratio[gr], mean_bits, MAX_BITS);
                targ_bits[gr][0] = pair[0];
                targ_bits[gr][1] = pair[1];
            }
        }

        let mut total = 0;
        for gr in 0..mode_gr {
            for ch in 0..self.flags.channels {
                targ_bits[gr][ch] = targ_bits[gr][ch].min(MAX_BITS);
                total += targ_bits[gr][ch];
            }
        }
        if total > max_frame_bits {
            for gr in 0..mode_gr {
                for ch in 0..self.flags.channels {
                    targ_bits[gr][ch] = targ_bits[gr][ch] * max_frame_bits / total;
                }
            }
        }

        (analog_silence_bits, max_frame_bits)
    }

    /// Average-bitrate frame loop.
    pub(crate) fn abr_iteration_loop(&mut self, frame: &mut FrameSpectrum) -> (i32, i32) {
        self.prepare_blocks(frame);
        let mut targ_bits = [[0i32; MAX_CHANNELS]; MAX_GRANULES];
        let (analog_silence_bits, _max_frame_bits) = self.calc_target_bits(frame, &mut targ_bits);

        let ms = self.ms_active(frame);
        let mut tot_bits = 0i32;
        for gr in 0..self.flags.mode_gr {
            if ms {
                ms_convert(&mut frame.xr[gr]);
            }
            for ch in 0..self.flags.channels {
                let mut gi = self.side_info.granules[gr][ch].clone();
                let mut scalefac = Scalefac::default();
                let mut xrpow = [0.0f64; GRANULE_SIZE];
                let has_energy = init_outer_loop(
                    self.flags.version,
                    &mut gi,
                    &mut scalefac,
                    &frame.xr[gr][ch],
                    &mut xrpow,
                );

                let mut xmin = AllowedDistortion::default();
                let mut target = targ_bits[gr][ch];
                if has_energy {
                    let ath_over = calc_xmin(
                        &self.sfb,
                        &self.ath,
                        self.flags.masking_lower,
                        &frame.xr[gr][ch],
                        &frame.ratio[gr][ch],
                        &gi,
                        &mut xmin,
                        self.flags.sfb21_extra,
                    );
                    if ath_over == 0 {
                        target = analog_silence_bits;
                    }
                }
                self.encode_granule_channel(
                    frame,
                    gr,
                    ch,
                    &xmin,
                    has_energy,
                    &mut gi,
                    &mut scalefac,
                    &mut xrpow,
                    target,
                );
                tot_bits += gi.part2_3_length as i32;
                self.side_info.granules[gr][ch] = gi;
                self.scalefac[gr][ch] = scalefac;
            }
        }

        // lowest bitrate whose frame can carry what we spent
        let mut chosen = (self.flags.vbr_min_bitrate, 0i32, 0i32);
        for index in self.flags.vbr_min_bitrate..=self.flags.vbr_max_bitrate {
            let (fb, mb) = self.getframebits(index, 0);
            let cap = self.resv.frame_begin(
                self.flags.version == MpegVersion::Mpeg1,
                mb,
                fb,
                self.flags.mode_gr as i32,
            );
            chosen = (index, fb, mb);
            if tot_bits <= cap {
                break;
            }
        }
        self.bitrate_index = chosen.0;
        if tot_bits > chosen.1 {
            warn!("ABR frame exceeds even the top bitrate: {} bits", tot_bits);
        }
        debug!(
            "ABR frame: {} bits used, bitrate index {}",
            tot_bits, self.bitrate_index
        );

        let mean_bits = chosen.2;
        self.iteration_finish(frame, mean_bits);
        (chosen.1, mean_bits)
    }

    /// Per-granule VBR budget floor.
    #[allow(clippy::too_many_arguments)]
    fn calc_min_bits(
        &self,
        gi: &GranuleInfo,
        pe: f64,
        ms_ener_ratio: f64,
        bands: u32,
        mch_bits: i32,
        analog_mean_bits: i32,
        min_mean_bits: i32,
        analog_silence: bool,
        side_channel: bool,
    ) -> i32 {
        let mut min_bits = 125.max(min_mean_bits);
        if side_channel {
            min_bits = min_bits.max(mch_bits / 5);
        }

        // PE skeleton: short-block surges spread over 3x13 band-windows
        let divisor = if gi.block_type == BlockType::Short { 39 } else { 22 };
        let mut min_pe_bits = (pe as i32 - 350) * bands as i32 / divisor;
        if side_channel {
            let fac = 0.33 * (0.5 - ms_ener_ratio) / 0.5;
            min_pe_bits = (min_pe_bits as f64 * ((1.0 - fac) / (1.0 + fac))) as i32;
        }
        min_pe_bits = min_pe_bits.min(1820 * self.flags.samplerate as i32 / 44100);

        if analog_silence && !self.cfg.vbr_hard_min {
            analog_mean_bits
        } else {
            min_bits.max(min_pe_bits).min(MAX_BITS)
        }
    }

    fn calc_max_bits(&self, frame_bits_tab: &[i32; 15], min_bits: i32) -> i32 {
        let mut max_bits =
            frame_bits_tab[self.flags.vbr_max_bitrate] / (self.flags.channels * self.flags.mode_gr) as i32;
        max_bits = (1200 + max_bits).min(MAX_BITS - 195 * (self.flags.channels as i32 - 1));
        max_bits.max(min_bits)
    }

    /// Masking adjustment and allowed-distortion computation for a VBR
    /// frame. Returns true when every granule is analog silence.
    fn vbr_prepare(
        &mut self,
        frame: &mut FrameSpectrum,
        l3_xmin: &mut [[AllowedDistortion; MAX_CHANNELS]; MAX_GRANULES],
        bands: &mut [[u32; MAX_CHANNELS]; MAX_GRANULES],
    ) -> bool {
        let ms = self.ms_active(frame);
        let mut analog_silence = true;

        for gr in 0..self.flags.mode_gr {
            if ms {
                ms_convert(&mut frame.xr[gr]);
            }
            for ch in 0..self.flags.channels {
                let gi = self.side_info.granules[gr][ch].clone();
                let pe = frame.pe[gr][ch];
                let adjust = if gi.block_type == BlockType::Short {
                    5.0 / (1.0 + (3.5 - pe / 300.0).exp()) - 0.14
                } else {
                    2.0 / (1.0 + (3.5 - pe / 300.0).exp()) - 0.05
                };
                let masking_lower_db = DB_Q[self.cfg.vbr_q as usize] - adjust;
                let masking_lower = 10f64.powf(masking_lower_db * 0.1);

                bands[gr][ch] = calc_xmin(
                    &self.sfb,
                    &self.ath,
                    masking_lower,
                    &frame.xr[gr][ch],
                    &frame.ratio[gr][ch],
                    &gi,
                    &mut l3_xmin[gr][ch],
                    self.flags.sfb21_extra,
                );
                if bands[gr][ch] > 0 {
                    analog_silence = false;
                }
            }
        }
        analog_silence
    }

    /// Frame capacities per bitrate index, plus the analog-silence and
    /// minimum mean bits.
    fn get_framebits_table(&mut self) -> (i32, i32, [i32; 15]) {
        let mpeg1 = self.flags.version == MpegVersion::Mpeg1;
        let (_, mean) = self.getframebits(self.flags.vbr_min_bitrate, 0);
        let min_mean_bits = mean / self.flags.channels as i32;

        let (_, mean) = self.getframebits(1, 0);
        let analog_mean_bits = mean / self.flags.channels as i32;

        let mut tab = [0i32; 15];
        for index in 1..=self.flags.vbr_max_bitrate {
            let (fb, mb) = self.getframebits(index, 0);
            tab[index] = self
                .resv
                .frame_begin(mpeg1, mb, fb, self.flags.mode_gr as i32);
        }
        (analog_mean_bits, min_mean_bits, tab)
    }

    /// Bisection in bits: find the smallest budget the outer loop can
    /// quantize without audible distortion, keeping the last clean
    /// candidate.
    #[allow(clippy::too_many_arguments)]
    fn vbr_encode_granule(
        &mut self,
        gi: &mut GranuleInfo,
        xr: &[f64; GRANULE_SIZE],
        l3_xmin: &AllowedDistortion,
        scalefac: &mut Scalefac,
        xrpow: &mut [f64; GRANULE_SIZE],
        l3_enc: &mut [i32; GRANULE_SIZE],
        ch: usize,
        min_bits: i32,
        max_bits: i32,
    ) {
        let hard_max = max_bits;
        let mut min_bits = min_bits;
        let mut max_bits = max_bits;
        let mut real_bits = max_bits + 1;
        let mut this_bits = min_bits + (max_bits - min_bits) / 2;

        let mut bst_gi = gi.clone();
        let mut bst_scalefac = Scalefac::default();
        let mut bst_xrpow = *xrpow;
        let mut bst_l3_enc = *l3_enc;

        debug_assert!(hard_max < 4096);

        loop {
            debug_assert!(this_bits >= min_bits && this_bits <= max_bits);

            let over = self.outer_loop(gi, xr, l3_xmin, scalefac, xrpow, l3_enc, ch, this_bits);
            let dbits;

            if over == 0 {
                // clean: remember it and try cheaper
                real_bits = gi.part2_3_length as i32;
                bst_gi = gi.clone();
                bst_scalefac = scalefac.clone();
                bst_xrpow = *xrpow;
                bst_l3_enc = *l3_enc;

                max_bits = real_bits - 32;
                dbits = max_bits - min_bits;
                this_bits = min_bits + dbits / 2;
            } else {
                // distorted: need more bits
                min_bits = this_bits + 32;
                dbits = max_bits - min_bits;
                this_bits = min_bits + dbits / 2;

                if dbits > 8 {
                    // restart from the best state found so far
                    *gi = bst_gi.clone();
                    *scalefac = bst_scalefac.clone();
                    *xrpow = bst_xrpow;
                }
            }

            if dbits <= 8 {
                break;
            }
        }

        if real_bits <= hard_max {
            *gi = bst_gi;
            *scalefac = bst_scalefac;
            *l3_enc = bst_l3_enc;
        }
    }

    /// Variable-bitrate frame loop (rh/mtrh): quantize every granule at
    /// its cheapest clean budget, then pick the smallest frame that holds
    /// the sum, re-quantizing proportionally if even the largest cannot.
    pub(crate) fn vbr_iteration_loop(&mut self, frame: &mut FrameSpectrum) -> (i32, i32) {
        self.prepare_blocks(frame);
        let mpeg1 = self.flags.version == MpegVersion::Mpeg1;

        // Side-channel reduction: at fast quality settings the side
        // channel is derived from the mid channel's spend instead of
        // being searched.
        let reduce_s_ch = self.ms_active(frame) && self.cfg.quality >= 5;
        let num_chan = if reduce_s_ch { 1 } else { self.flags.channels };

        let mut l3_xmin: [[AllowedDistortion; MAX_CHANNELS]; MAX_GRANULES] = Default::default();
        let mut bands = [[0u32; MAX_CHANNELS]; MAX_GRANULES];
        let analog_silence = self.vbr_prepare(frame, &mut l3_xmin, &mut bands);

        let (analog_mean_bits, min_mean_bits, frame_bits_tab) = self.get_framebits_table();

        let mut save_bits = [[0i32; MAX_CHANNELS]; MAX_GRANULES];
        let mut used_bits = 0i32;

        for gr in 0..self.flags.mode_gr {
            for ch in 0..num_chan {
                let mut gi = self.side_info.granules[gr][ch].clone();
                let mut scalefac = Scalefac::default();
                let mut xrpow = [0.0f64; GRANULE_SIZE];
                let has_energy = init_outer_loop(
                    self.flags.version,
                    &mut gi,
                    &mut scalefac,
                    &frame.xr[gr][ch],
                    &mut xrpow,
                );
                if !has_energy {
                    self.l3_enc[gr][ch] = [0; GRANULE_SIZE];
                    save_bits[gr][ch] = 0;
                    self.side_info.granules[gr][ch] = gi;
                    self.scalefac[gr][ch] = scalefac;
                    continue;
                }

                let min_bits = self.calc_min_bits(
                    &gi,
                    frame.pe[gr][ch],
                    frame.ms_ener_ratio[gr],
                    bands[gr][ch],
                    save_bits[gr][0],
                    analog_mean_bits,
                    min_mean_bits,
                    analog_silence,
                    self.ms_active(frame) && ch == 1,
                );
                let max_bits = self.calc_max_bits(&frame_bits_tab, min_bits);

                let mut enc = [0i32; GRANULE_SIZE];
                self.vbr_encode_granule(
                    &mut gi,
                    &frame.xr[gr][ch],
                    &l3_xmin[gr][ch],
                    &mut scalefac,
                    &mut xrpow,
                    &mut enc,
                    ch,
                    min_bits,
                    max_bits,
                );
                self.l3_enc[gr][ch] = enc;

                save_bits[gr][ch] = gi.part2_3_length as i32;
                used_bits += save_bits[gr][ch];
                self.side_info.granules[gr][ch] = gi;
                self.scalefac[gr][ch] = scalefac;
            }
        }

        if reduce_s_ch {
            // the side channel follows the mid channel's spend
            for gr in 0..self.flags.mode_gr {
                let fac = 0.33 * (0.5 - frame.ms_ener_ratio[gr]) / 0.5;
                let mut bits = (((1.0 - fac) / (1.0 + fac)) * save_bits[gr][0] as f64) as i32;
                bits = bits.max(analog_mean_bits);
                save_bits[gr][1] = bits;
                used_bits += bits;
            }
        }

        // smallest frame able to hold the spend
        self.bitrate_index = if analog_silence && !self.cfg.vbr_hard_min {
            1
        } else {
            self.flags.vbr_min_bitrate
        };
        while self.bitrate_index < self.flags.vbr_max_bitrate
            && used_bits > frame_bits_tab[self.bitrate_index]
        {
            self.bitrate_index += 1;
        }

        let (frame_bits, mean_bits) = self.getframebits(self.bitrate_index, 0);
        let bits = self
            .resv
            .frame_begin(mpeg1, mean_bits, frame_bits, self.flags.mode_gr as i32);
        debug!(
            "VBR frame: {} bits over budget {}, bitrate index {}",
            used_bits, bits, self.bitrate_index
        );

        // re-quantize whatever exceeds the final budget, and the side
        // channel skipped above
        for gr in 0..self.flags.mode_gr {
            for ch in 0..self.flags.channels {
                if used_bits <= bits && !(reduce_s_ch && ch == 1) {
                    continue;
                }
                if used_bits > bits {
                    save_bits[gr][ch] = save_bits[gr][ch] * frame_bits_tab[self.bitrate_index]
                        / used_bits;
                }

                let mut gi = self.side_info.granules[gr][ch].clone();
                gi.block_type = frame.block_type[gr][ch];
                gi.mixed_block_flag = frame.mixed_block_flag[gr][ch];
                let mut scalefac = Scalefac::default();
                let mut xrpow = [0.0f64; GRANULE_SIZE];
                let has_energy = init_outer_loop(
                    self.flags.version,
                    &mut gi,
                    &mut scalefac,
                    &frame.xr[gr][ch],
                    &mut xrpow,
                );
                if !has_energy {
                    self.l3_enc[gr][ch] = [0; GRANULE_SIZE];
                } else {
                    let mut enc = [0i32; GRANULE_SIZE];
                    self.outer_loop(
                        &mut gi,
                        &frame.xr[gr][ch],
                        &l3_xmin[gr][ch],
                        &mut scalefac,
                        &mut xrpow,
                        &mut enc,
                        ch,
                        save_bits[gr][ch],
                    );
                    self.l3_enc[gr][ch] = enc;
                }
                self.side_info.granules[gr][ch] = gi;
                self.scalefac[gr][ch] = scalefac;
            }
        }

        self.iteration_finish(frame, mean_bits);
        (frame_bits, mean_bits)
    }

    /// Frame finalization shared by the ABR and VBR drivers.
    pub(crate) fn iteration_finish(&mut self, frame: &FrameSpectrum, mean_bits: i32) {
        for gr in 0..self.flags.mode_gr {
            for ch in 0..self.flags.channels {
                self.finish_granule_channel(frame, gr, ch, mean_bits);
            }
        }
        self.side_info.resv_drain = self
            .resv
            .frame_end(mean_bits, self.flags.channels as i32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_convert_is_sum_difference() {
        let mut xr = [[0.0; GRANULE_SIZE]; MAX_CHANNELS];
        xr[0][0] = 3.0;
        xr[1][0] = 1.0;
        ms_convert(&mut xr);
        assert!((xr[0][0] - 4.0 / SQRT2).abs() < 1e-12);
        assert!((xr[1][0] - 2.0 / SQRT2).abs() < 1e-12);
    }

    #[test]
    fn reduce_side_moves_bits_to_mid() {
        let mut targ = [1000, 1000];
        reduce_side(&mut targ, 0.0, 2000, 4000);
        assert!(targ[0] > 1000);
        assert!(targ[1] < 1000);
        assert!(targ[1] >= 125);
    }

    #[test]
    fn reduce_side_respects_the_cap() {
        let mut targ = [3000, 3000];
        reduce_side(&mut targ, 0.5, 3000, 4000);
        assert!(targ[0] + targ[1] <= 4000);
    }
}
