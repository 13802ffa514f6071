//! Exact Huffman bit accounting for quantized spectra.
//!
//! `count_bits` is the single entry point the iteration loops use: it
//! quantizes `xrpow` at the candidate global gain, splits the 576 indices
//! into big-values / count1 / zero regions, picks code tables and returns
//! the exact number of bits the granule's main data would take. It never
//! touches `xrpow` or the scalefactors.
//!
//! `best_huffman_divide` re-searches the region split after quantization
//! has settled, which often shaves a few bits without changing any
//! coefficient.

use crate::tables::{ipow20, HuffmanTable, ScalefacBands, HUFFMAN_TABLES, SUBDV_TABLE, T32_LENGTHS};
use crate::types::{BlockType, GranuleInfo, GRANULE_SIZE, IXMAX_VAL, LARGE_BITS};

/// Quantize `xrpow` at the granule's current settings and count the exact
/// Huffman cost. Fills the region bookkeeping of `gi` (`big_values`,
/// `count1`, `count1bits`, `table_select`, `region0_count`,
/// `region1_count`, `count1table_select`) and writes the unsigned indices
/// into `ix`.
///
/// Returns [`LARGE_BITS`] when some coefficient exceeds the largest value
/// the escape tables can carry; the caller reacts by raising the gain.
pub fn count_bits(
    sfb: &ScalefacBands,
    ix: &mut [i32; GRANULE_SIZE],
    xrpow: &[f64; GRANULE_SIZE],
    gi: &mut GranuleInfo,
) -> i32 {
    let istep = ipow20(gi.global_gain);

    let mut ix_max = 0;
    for (out, &xp) in ix.iter_mut().zip(xrpow.iter()) {
        // 0.4054 compensates the bias of truncating x^(3/4) quantization.
        let v = (xp * istep + 0.4054) as i32;
        *out = v;
        if v > ix_max {
            ix_max = v;
        }
    }
    if ix_max > IXMAX_VAL {
        return LARGE_BITS;
    }

    calc_runlen(ix, gi);
    let mut bits = count1_bitcount(ix, gi);
    bits += bigv_bitcount(sfb, ix, gi);
    bits
}

/// Split the spectrum into the zero tail, the count1 quadruples and the
/// big-values pairs.
fn calc_runlen(ix: &[i32; GRANULE_SIZE], gi: &mut GranuleInfo) {
    let mut i = GRANULE_SIZE;
    while i > 1 && ix[i - 1] == 0 && ix[i - 2] == 0 {
        i -= 2;
    }

    gi.count1 = 0;
    while i > 3 && ix[i - 1] <= 1 && ix[i - 2] <= 1 && ix[i - 3] <= 1 && ix[i - 4] <= 1 {
        gi.count1 += 1;
        i -= 4;
    }

    gi.big_values = (i >> 1) as u32;
}

/// Cost of the count1 region under tables A and B; selects the cheaper one
/// and records it in `gi`.
fn count1_bitcount(ix: &[i32; GRANULE_SIZE], gi: &mut GranuleInfo) -> i32 {
    let begin = gi.big_values as usize * 2;
    let end = begin + gi.count1 as usize * 4;

    let mut sum_a = 0i32;
    let mut sum_b = 0i32;
    let mut i = begin;
    while i < end {
        let (v, w, x, y) = (ix[i], ix[i + 1], ix[i + 2], ix[i + 3]);
        let p = ((v << 3) | (w << 2) | (x << 1) | y) as usize;
        let signs = (v != 0) as i32 + (w != 0) as i32 + (x != 0) as i32 + (y != 0) as i32;
        sum_a += T32_LENGTHS[p] as i32 + signs;
        sum_b += 4 + signs;
        i += 4;
    }

    if sum_b < sum_a {
        gi.count1table_select = 1;
        gi.count1bits = sum_b as u32;
        sum_b
    } else {
        gi.count1table_select = 0;
        gi.count1bits = sum_a as u32;
        sum_a
    }
}

/// Divide the big-values region, choose a code table per subregion and sum
/// the cost.
fn bigv_bitcount(sfb: &ScalefacBands, ix: &[i32; GRANULE_SIZE], gi: &mut GranuleInfo) -> i32 {
    let big = gi.big_values as usize * 2;
    gi.table_select = [0; 3];

    if big == 0 {
        gi.region0_count = 0;
        gi.region1_count = 0;
        return 0;
    }

    let (a1, a2) = if gi.block_type == BlockType::Norm {
        let mut scfb_anz = 1;
        while sfb.l[scfb_anz] < big {
            scfb_anz += 1;
        }

        let mut r0 = SUBDV_TABLE[scfb_anz].0;
        while r0 >= 0 && sfb.l[(r0 + 1) as usize] > big {
            r0 -= 1;
        }
        if r0 < 0 {
            // big_values ends inside the very first bands; park the
            // preferred split beyond it so everything lands in region0.
            r0 = SUBDV_TABLE[scfb_anz].0;
        }
        let mut r1 = SUBDV_TABLE[scfb_anz].1;
        while r1 >= 0 && sfb.l[(r0 + r1 + 2) as usize] > big {
            r1 -= 1;
        }
        if r1 < 0 {
            r1 = SUBDV_TABLE[scfb_anz].1;
        }
        gi.region0_count = r0 as u32;
        gi.region1_count = r1 as u32;
        (
            sfb.l[(r0 + 1) as usize].min(big),
            sfb.l[(r0 + r1 + 2) as usize].min(big),
        )
    } else {
        // Window-switching granules carry a fixed division.
        gi.region0_count = 7;
        gi.region1_count = 13;
        (sfb.l[8].min(big), big)
    };

    let mut bits = 0;
    let (t0, b0) = choose_table(&ix[..a1]);
    gi.table_select[0] = t0;
    bits += b0;
    let (t1, b1) = choose_table(&ix[a1..a2]);
    gi.table_select[1] = t1;
    bits += b1;
    let (t2, b2) = choose_table(&ix[a2..big]);
    gi.table_select[2] = t2;
    bits += b2;
    bits
}

/// Candidate tables for a region whose largest magnitude fits without
/// escape coding.
fn no_esc_candidates(max: i32) -> &'static [u32] {
    match max {
        1 => &[1],
        2 => &[2, 3],
        3 => &[5, 6],
        4 | 5 => &[7, 8, 9],
        6 | 7 => &[10, 11, 12],
        _ => &[13, 15],
    }
}

/// Pick the cheapest Huffman table for one region. Returns `(table, bits)`;
/// table 0 encodes an empty or all-zero region at zero cost.
pub fn choose_table(region: &[i32]) -> (u32, i32) {
    let max = region.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return (0, 0);
    }

    if max <= 15 {
        let mut best = (0u32, LARGE_BITS);
        for &t in no_esc_candidates(max) {
            let bits = count_bit(region, t);
            if bits < best.1 {
                best = (t, bits);
            }
        }
        best
    } else {
        // Escape coding: the 16- and 24-family member with just enough
        // linbits each, then whichever is cheaper.
        let esc = max - 15;
        let t16 = (16..24).find(|&t| table(t).linmax >= esc).unwrap_or(23);
        let t24 = (24..32).find(|&t| table(t).linmax >= esc).unwrap_or(31);
        let bits16 = count_bit(region, t16);
        let bits24 = count_bit(region, t24);
        if bits24 < bits16 {
            (t24, bits24)
        } else {
            (t16, bits16)
        }
    }
}

fn table(t: u32) -> &'static HuffmanTable {
    HUFFMAN_TABLES[t as usize]
        .as_ref()
        .expect("reserved Huffman table selected")
}

/// Exact cost of a region under one table, sign bits included.
pub fn count_bit(region: &[i32], t: u32) -> i32 {
    if t == 0 {
        return 0;
    }
    let ht = table(t);
    let linbits = ht.linbits as i32;

    let mut sum = 0i32;
    let mut i = 0;
    while i < region.len() {
        let mut x = region[i];
        let mut y = region[i + 1];
        if linbits > 0 {
            if x > 14 {
                x = 15;
                sum += linbits;
            }
            if y > 14 {
                y = 15;
                sum += linbits;
            }
        }
        sum += ht.lengths[x as usize * ht.xlen + y as usize] as i32;
        sum += (region[i] != 0) as i32 + (region[i + 1] != 0) as i32;
        i += 2;
    }
    sum
}

/// Huffman cost of `gi`'s current region layout without requantizing.
/// Refreshes the table selections and count1 bookkeeping.
fn huffman_bit_count(sfb: &ScalefacBands, ix: &[i32; GRANULE_SIZE], gi: &mut GranuleInfo) -> i32 {
    count1_bitcount(ix, gi) + bigv_bitcount(sfb, ix, gi)
}

/// Search for a cheaper region0/region1 split of a long-block granule.
/// Returns true when `gi` was improved.
fn recalc_divide(sfb: &ScalefacBands, gi: &mut GranuleInfo, ix: &[i32; GRANULE_SIZE]) -> bool {
    let big = gi.big_values as usize * 2;
    if big == 0 {
        return false;
    }

    // Cheapest way to cover the first r0+r1+2 band boundaries with two
    // regions, for every possible combined width.
    let mut r01_bits = [LARGE_BITS; 23];
    let mut r01_div = [0usize; 23];
    let mut r0_tbl = [0u32; 23];
    let mut r1_tbl = [0u32; 23];

    for r0 in 0..16usize {
        let a1 = sfb.l[r0 + 1];
        if a1 >= big {
            break;
        }
        let (t0, bits0) = choose_table(&ix[..a1]);
        for r1 in 0..8usize {
            let a2 = sfb.l[r0 + r1 + 2];
            if a2 >= big {
                break;
            }
            let (t1, bits1) = choose_table(&ix[a1..a2]);
            let bits = bits0 + bits1;
            if bits < r01_bits[r0 + r1] {
                r01_bits[r0 + r1] = bits;
                r01_div[r0 + r1] = r0;
                r0_tbl[r0 + r1] = t0;
                r1_tbl[r0 + r1] = t1;
            }
        }
    }

    let mut best_huff = (gi.part2_3_length - gi.part2_length) as i32;
    let mut improved = false;
    for r2 in 2..23usize {
        let a2 = sfb.l[r2];
        if a2 >= big {
            break;
        }
        let mut bits = r01_bits[r2 - 2] + gi.count1bits as i32;
        if bits >= best_huff {
            continue;
        }
        let (t2, bits2) = choose_table(&ix[a2..big]);
        bits += bits2;
        if bits >= best_huff {
            continue;
        }
        gi.region0_count = r01_div[r2 - 2] as u32;
        gi.region1_count = (r2 - 2 - r01_div[r2 - 2]) as u32;
        gi.table_select[0] = r0_tbl[r2 - 2];
        gi.table_select[1] = r1_tbl[r2 - 2];
        gi.table_select[2] = t2;
        gi.part2_3_length = gi.part2_length + bits as u32;
        best_huff = bits;
        improved = true;
    }
    improved
}

/// Re-divide the Huffman regions of a finished granule and try to grow the
/// count1 region into qualifying big-values pairs. Quantized values are
/// left untouched; only the region bookkeeping and `part2_3_length` may
/// shrink. Running it again on its own output is a no-op.
pub fn best_huffman_divide(
    sfb: &ScalefacBands,
    mode_gr: usize,
    gi: &mut GranuleInfo,
    ix: &[i32; GRANULE_SIZE],
) {
    // LSF frames with short blocks keep the division chosen by count_bits.
    if gi.block_type == BlockType::Short && mode_gr == 1 {
        return;
    }

    loop {
        let mut moved = false;
        if gi.block_type == BlockType::Norm {
            moved |= recalc_divide(sfb, gi, ix);
        }

        // Move the trailing big-values quadruple into count1 when all four
        // magnitudes qualify and it pays off.
        let big = gi.big_values as usize * 2;
        if big >= 4
            && ix[big - 1] <= 1
            && ix[big - 2] <= 1
            && ix[big - 3] <= 1
            && ix[big - 4] <= 1
        {
            let mut cand = gi.clone();
            cand.big_values -= 2;
            cand.count1 += 1;
            let bits = huffman_bit_count(sfb, ix, &mut cand);
            if (bits as u32) < gi.part2_3_length - gi.part2_length {
                cand.part2_3_length = cand.part2_length + bits as u32;
                *gi = cand;
                moved = true;
            }
        }

        if !moved {
            break;
        }
    }
}
