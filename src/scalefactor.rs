//! Scalefactor storage: bit costing under the MPEG-1 and LSF schemes, and
//! the post-quantization storage optimizations (zero-band wipe,
//! scalefac_scale promotion, SCFSI sharing between granules).

use crate::tables::{
    ScalefacBands, LSF_MAX_SLEN, LSF_PARTITIONS, PRETAB, SCALE_LONG, SCALE_MIXED, SCALE_SHORT,
    SCFSI_BAND, SLEN1_TAB, SLEN2_TAB,
};
use crate::types::{
    BlockType, GranuleInfo, Scalefac, SideInfo, GRANULE_SIZE, MAX_CHANNELS, MAX_GRANULES,
    SBPSY_L, SBPSY_S,
};

/// Cost the current MPEG-1 scalefactor set, choosing `scalefac_compress`.
/// Returns true when no compress option can represent the scalefactors.
///
/// Long blocks absorb the pre-emphasis table into `preflag` when every
/// upper-band scalefactor covers it.
pub fn scale_bitcount(scalefac: &mut Scalefac, gi: &mut GranuleInfo) -> bool {
    let mut max1 = 0i32;
    let mut max2 = 0i32;

    let tab: &[u32; 16] = if gi.block_type == BlockType::Short {
        for sfb in 0..gi.sfb_lmax {
            max1 = max1.max(scalefac.l[sfb]);
        }
        for sfb in gi.sfb_smin..6 {
            for window in 0..3 {
                max1 = max1.max(scalefac.s[sfb][window]);
            }
        }
        for sfb in 6..SBPSY_S {
            for window in 0..3 {
                max2 = max2.max(scalefac.s[sfb][window]);
            }
        }
        if gi.mixed_block_flag {
            &SCALE_MIXED
        } else {
            &SCALE_SHORT
        }
    } else {
        if !gi.preflag {
            let covered = (11..SBPSY_L).all(|sfb| scalefac.l[sfb] >= PRETAB[sfb]);
            if covered {
                gi.preflag = true;
                for sfb in 11..SBPSY_L {
                    scalefac.l[sfb] -= PRETAB[sfb];
                }
            }
        }
        for sfb in 0..11 {
            max1 = max1.max(scalefac.l[sfb]);
        }
        for sfb in 11..SBPSY_L {
            max2 = max2.max(scalefac.l[sfb]);
        }
        &SCALE_LONG
    };

    gi.part2_length = u32::MAX;
    for k in 0..16 {
        if max1 < (1 << SLEN1_TAB[k]) && max2 < (1 << SLEN2_TAB[k]) && gi.part2_length > tab[k] {
            gi.part2_length = tab[k];
            gi.scalefac_compress = k as u32;
        }
    }
    if gi.part2_length == u32::MAX {
        return true;
    }
    gi.slen[0] = SLEN1_TAB[gi.scalefac_compress as usize];
    gi.slen[1] = SLEN2_TAB[gi.scalefac_compress as usize];
    false
}

/// Scalefactor slots of an LSF granule in transmission order.
pub(crate) fn lsf_slots(scalefac: &Scalefac, gi: &GranuleInfo) -> Vec<i32> {
    let mut slots = Vec::with_capacity(36);
    if gi.block_type == BlockType::Short {
        for sfb in 0..gi.sfb_lmax {
            slots.push(scalefac.l[sfb]);
        }
        for sfb in gi.sfb_smin.max(if gi.mixed_block_flag { 3 } else { 0 })..SBPSY_S {
            for window in 0..3 {
                slots.push(scalefac.s[sfb][window]);
            }
        }
    } else {
        for sfb in 0..SBPSY_L {
            slots.push(scalefac.l[sfb]);
        }
    }
    slots
}

/// Cost the current scalefactor set under the MPEG-2/2.5 partition scheme
/// (partition table 0, no intensity stereo). Returns true when a partition
/// overflows its widest field.
pub fn scale_bitcount_lsf(scalefac: &Scalefac, gi: &mut GranuleInfo) -> bool {
    let row = if gi.block_type == BlockType::Short {
        if gi.mixed_block_flag {
            2
        } else {
            1
        }
    } else {
        0
    };
    let partitions = LSF_PARTITIONS[row];
    let slots = lsf_slots(scalefac, gi);

    let mut slen = [0u32; 4];
    let mut offset = 0;
    for (p, &size) in partitions.iter().enumerate() {
        let mut max = 0i32;
        for &v in &slots[offset..offset + size] {
            max = max.max(v);
        }
        offset += size;
        let mut bits = 0u32;
        while (1 << bits) <= max {
            bits += 1;
        }
        if bits > LSF_MAX_SLEN[p] {
            return true;
        }
        slen[p] = bits;
    }

    // The partition-table-0 scheme has no preflag field.
    gi.preflag = false;
    gi.slen = slen;
    gi.sfb_partition = partitions;
    gi.scalefac_compress = ((slen[0] * 5 + slen[1]) << 4) | (slen[2] << 2) | slen[3];
    gi.part2_length = partitions
        .iter()
        .zip(slen.iter())
        .map(|(&n, &s)| n as u32 * s)
        .sum();
    false
}

/// Post-quantization scalefactor storage optimization for one
/// granule-channel: wipe scalefactors of all-zero bands, fold even
/// scalefactor sets into `scalefac_scale`, and on the second MPEG-1
/// granule try SCFSI sharing with granule 0. `part2_3_length` shrinks
/// accordingly; quantized data is untouched.
pub fn best_scalefac_store(
    mpeg1: bool,
    sfb: &ScalefacBands,
    gr: usize,
    ch: usize,
    l3_enc: &[i32; GRANULE_SIZE],
    side_info: &mut SideInfo,
    scalefac: &mut [[Scalefac; MAX_CHANNELS]; MAX_GRANULES],
) {
    let mut recalc = false;
    {
        let gi = &side_info.granules[gr][ch];
        let sf = &mut scalefac[gr][ch];

        for band in 0..gi.sfb_lmax.min(SBPSY_L) {
            let (start, end) = (sfb.l[band], sfb.l[band + 1]);
            if sf.l[band] > 0 && l3_enc[start..end].iter().all(|&v| v == 0) {
                sf.l[band] = -2;
                recalc = true;
            }
        }
        if gi.block_type == BlockType::Short {
            for band in gi.sfb_smin..SBPSY_S {
                let width = sfb.s[band + 1] - sfb.s[band];
                for window in 0..3 {
                    let start = sfb.s[band] * 3 + width * window;
                    if sf.s[band][window] > 0
                        && l3_enc[start..start + width].iter().all(|&v| v == 0)
                    {
                        sf.s[band][window] = -2;
                        recalc = true;
                    }
                }
            }
        }
    }

    // All-even scalefactors halve into the coarser scalefac_scale step.
    {
        let gi = &mut side_info.granules[gr][ch];
        let sf = &mut scalefac[gr][ch];
        if gi.scalefac_scale == 0 && !gi.preflag {
            let mut or_all = 0i32;
            for band in 0..gi.sfb_lmax.min(SBPSY_L) {
                if sf.l[band] > 0 {
                    or_all |= sf.l[band];
                }
            }
            if gi.block_type == BlockType::Short {
                for band in gi.sfb_smin..SBPSY_S {
                    for window in 0..3 {
                        if sf.s[band][window] > 0 {
                            or_all |= sf.s[band][window];
                        }
                    }
                }
            }
            if or_all != 0 && or_all & 1 == 0 {
                for band in 0..gi.sfb_lmax.min(SBPSY_L) {
                    if sf.l[band] > 0 {
                        sf.l[band] >>= 1;
                    }
                }
                if gi.block_type == BlockType::Short {
                    for band in gi.sfb_smin..SBPSY_S {
                        for window in 0..3 {
                            if sf.s[band][window] > 0 {
                                sf.s[band][window] >>= 1;
                            }
                        }
                    }
                }
                gi.scalefac_scale = 1;
                recalc = true;
            }
        }
    }

    if recalc {
        let gi = &mut side_info.granules[gr][ch];
        let old_part2 = gi.part2_length;
        // Markers stay negative; the max scans ignore them.
        let err = if mpeg1 {
            scale_bitcount(&mut scalefac[gr][ch], gi)
        } else {
            scale_bitcount_lsf(&scalefac[gr][ch], gi)
        };
        debug_assert!(!err, "shrinking scalefactors cannot overflow storage");
        if !err {
            gi.part2_3_length = gi.part2_3_length - old_part2 + gi.part2_length;
        }
    }

    if mpeg1
        && gr == 1
        && side_info.granules[0][ch].block_type != BlockType::Short
        && side_info.granules[1][ch].block_type != BlockType::Short
        && !side_info.granules[1][ch].preflag
    {
        scfsi_calc(ch, side_info, scalefac);
    }

    // Markers have served their purpose; emit plain zeros.
    let sf = &mut scalefac[gr][ch];
    for v in sf.l.iter_mut() {
        if *v == -2 {
            *v = 0;
        }
    }
    for band in sf.s.iter_mut() {
        for v in band.iter_mut() {
            if *v == -2 {
                *v = 0;
            }
        }
    }
}

/// Try to share granule-1 scalefactor band classes with granule 0. Shared
/// bands are marked `-1` and excluded from the part-2 cost.
fn scfsi_calc(
    ch: usize,
    side_info: &mut SideInfo,
    scalefac: &mut [[Scalefac; MAX_CHANNELS]; MAX_GRANULES],
) {
    let mut any = false;
    for class in 0..4 {
        let (b0, b1) = (SCFSI_BAND[class], SCFSI_BAND[class + 1]);
        let share = (b0..b1).all(|band| {
            let s1 = scalefac[1][ch].l[band];
            s1 < 0 || s1 == scalefac[0][ch].l[band]
        });
        if share {
            side_info.scfsi[ch][class] = 1;
            for band in b0..b1 {
                scalefac[1][ch].l[band] = -1;
            }
            any = true;
        }
    }
    if !any {
        return;
    }

    // Re-cost granule 1 over the bands still transmitted. Wiped bands
    // (-2) are written as zeros and still count; shared bands (-1) do not.
    let sf = &scalefac[1][ch];
    let mut max1 = 0i32;
    let mut c1 = 0u32;
    for band in 0..11 {
        if sf.l[band] != -1 {
            c1 += 1;
            max1 = max1.max(sf.l[band]);
        }
    }
    let mut max2 = 0i32;
    let mut c2 = 0u32;
    for band in 11..SBPSY_L {
        if sf.l[band] != -1 {
            c2 += 1;
            max2 = max2.max(sf.l[band]);
        }
    }

    let gi = &mut side_info.granules[1][ch];
    let mut best_bits = u32::MAX;
    let mut best_k = 0usize;
    for k in 0..16 {
        if max1 < (1 << SLEN1_TAB[k]) && max2 < (1 << SLEN2_TAB[k]) {
            let bits = c1 * SLEN1_TAB[k] + c2 * SLEN2_TAB[k];
            if bits < best_bits {
                best_bits = bits;
                best_k = k;
            }
        }
    }
    debug_assert!(best_bits != u32::MAX);
    if best_bits < gi.part2_length {
        gi.part2_3_length = gi.part2_3_length - gi.part2_length + best_bits;
        gi.part2_length = best_bits;
        gi.scalefac_compress = best_k as u32;
        gi.slen[0] = SLEN1_TAB[best_k];
        gi.slen[1] = SLEN2_TAB[best_k];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::SFB_TABLES;

    #[test]
    fn zero_scalefactors_cost_nothing() {
        let mut sf = Scalefac::default();
        let mut gi = GranuleInfo::default();
        assert!(!scale_bitcount(&mut sf, &mut gi));
        assert_eq!(gi.part2_length, 0);
        assert_eq!(gi.scalefac_compress, 0);
    }

    #[test]
    fn long_block_cost_uses_the_compress_table() {
        let mut sf = Scalefac::default();
        sf.l[0] = 1; // needs slen1 >= 1
        let mut gi = GranuleInfo::default();
        assert!(!scale_bitcount(&mut sf, &mut gi));
        // cheapest option with slen1 = 1 is compress 5 (slen2 = 1): 21 bits
        assert_eq!(gi.scalefac_compress, 5);
        assert_eq!(gi.part2_length, 21);
    }

    #[test]
    fn preflag_absorbs_the_pre_emphasis_table() {
        let mut sf = Scalefac::default();
        for band in 11..SBPSY_L {
            sf.l[band] = PRETAB[band] + 1;
        }
        let mut gi = GranuleInfo::default();
        assert!(!scale_bitcount(&mut sf, &mut gi));
        assert!(gi.preflag);
        for band in 11..SBPSY_L {
            assert_eq!(sf.l[band], 1);
        }
    }

    #[test]
    fn oversized_scalefactors_are_rejected() {
        let mut sf = Scalefac::default();
        sf.l[0] = 16; // slen1 caps at 4 bits
        let mut gi = GranuleInfo::default();
        assert!(scale_bitcount(&mut sf, &mut gi));
    }

    #[test]
    fn lsf_partitions_cover_long_blocks() {
        let mut sf = Scalefac::default();
        sf.l[0] = 3;
        sf.l[20] = 1;
        let mut gi = GranuleInfo::default();
        assert!(!scale_bitcount_lsf(&sf, &mut gi));
        assert_eq!(gi.slen[0], 2);
        assert_eq!(gi.slen[3], 1);
        assert_eq!(gi.part2_length, 2 * 6 + 1 * 5);
        assert_eq!(gi.sfb_partition, [6, 5, 5, 5]);
        // compress round-trips through the ISO formula
        let c = gi.scalefac_compress;
        assert_eq!((c >> 4) / 5, 2);
        assert_eq!(c & 3, 1);
    }

    #[test]
    fn lsf_rejects_overflowing_partition() {
        let mut sf = Scalefac::default();
        sf.l[20] = 8; // partition 3 allows 3 bits max
        let mut gi = GranuleInfo::default();
        assert!(scale_bitcount_lsf(&sf, &mut gi));
    }

    #[test]
    fn scfsi_shares_identical_band_classes() {
        let sfb = &SFB_TABLES[0];
        let mut side_info = SideInfo::default();
        let mut scalefac: [[Scalefac; MAX_CHANNELS]; MAX_GRANULES] = Default::default();
        let l3_enc = [1i32; GRANULE_SIZE];

        for gr in 0..2 {
            // odd values in the lower bands only: no halving, no preflag
            for band in 0..11 {
                scalefac[gr][0].l[band] = 3;
            }
            let gi = &mut side_info.granules[gr][0];
            let mut sf = scalefac[gr][0].clone();
            scale_bitcount(&mut sf, gi);
            scalefac[gr][0] = sf;
            gi.part2_3_length = 400 + gi.part2_length;
        }

        best_scalefac_store(true, sfb, 1, 0, &l3_enc, &mut side_info, &mut scalefac);

        assert_eq!(side_info.scfsi[0], [1, 1, 1, 1]);
        // every band shared: granule 1 pays no scalefactor bits
        assert_eq!(side_info.granules[1][0].part2_length, 0);
        assert_eq!(side_info.granules[1][0].part2_3_length, 400);
    }

    #[test]
    fn zero_bands_are_wiped() {
        let sfb = &SFB_TABLES[0];
        let mut side_info = SideInfo::default();
        let mut scalefac: [[Scalefac; MAX_CHANNELS]; MAX_GRANULES] = Default::default();
        // only band 0 has data; its scalefactor survives, band 1's is wiped
        let mut l3_enc = [0i32; GRANULE_SIZE];
        l3_enc[0] = 3;
        scalefac[0][0].l[0] = 1;
        scalefac[0][0].l[1] = 1;
        {
            let gi = &mut side_info.granules[0][0];
            let mut sf = scalefac[0][0].clone();
            scale_bitcount(&mut sf, gi);
            scalefac[0][0] = sf;
            gi.part2_3_length = 100 + gi.part2_length;
        }

        best_scalefac_store(true, sfb, 0, 0, &l3_enc, &mut side_info, &mut scalefac);
        assert_eq!(scalefac[0][0].l[0], 1);
        assert_eq!(scalefac[0][0].l[1], 0);
    }
}
