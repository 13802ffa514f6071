//! Distortion accounting: allowed noise per scalefactor band, measured
//! quantization noise, and the candidate comparators used by the outer
//! loop.

use crate::tables::{pow20, pow43, ScalefacBands, PRETAB};
use crate::types::{
    AllowedDistortion, BlockType, Distortion, GranuleInfo, NoiseResult, PsyRatio, Scalefac,
    GRANULE_SIZE, SBMAX_L, SBMAX_S, SBPSY_L, SBPSY_S,
};

/// Absolute threshold of hearing folded into band energies, built once per
/// (version, samplerate).
#[derive(Debug, Clone)]
pub struct AthBands {
    pub l: [f64; SBMAX_L],
    pub s: [f64; SBMAX_S],
}

/// Classic threshold-in-quiet approximation, input in kHz, output in dB.
fn ath_db(f: f64) -> f64 {
    let f = f.max(0.01);
    3.640 * f.powf(-0.8) - 6.5 * (-0.6 * (f - 3.3) * (f - 3.3)).exp() + 0.001 * f.powi(4)
}

/// Band energy corresponding to an SPL figure, referenced to full-scale
/// 16-bit input sitting at 96 dB.
fn ath_energy(db: f64) -> f64 {
    10f64.powf(0.1 * (db - 96.0)) * (32768.0 * 32768.0)
}

impl AthBands {
    pub fn new(sfb: &ScalefacBands, samplerate: u32) -> Self {
        let mut out = AthBands {
            l: [0.0; SBMAX_L],
            s: [0.0; SBMAX_S],
        };
        // Quietest frequency of each band sets its floor.
        let long_hz_per_bin = samplerate as f64 / 2.0 / 576.0;
        for band in 0..SBMAX_L {
            let mut db = f64::INFINITY;
            for bin in sfb.l[band]..sfb.l[band + 1] {
                db = db.min(ath_db(bin as f64 * long_hz_per_bin / 1000.0));
            }
            out.l[band] = ath_energy(db);
        }
        let short_hz_per_bin = samplerate as f64 / 2.0 / 192.0;
        for band in 0..SBMAX_S {
            let mut db = f64::INFINITY;
            for bin in sfb.s[band]..sfb.s[band + 1] {
                db = db.min(ath_db(bin as f64 * short_hz_per_bin / 1000.0));
            }
            out.s[band] = ath_energy(db);
        }
        out
    }
}

/// Highest long band the noise loops visit for this granule.
fn noise_lmax(gi: &GranuleInfo, sfb21_extra: bool) -> usize {
    if gi.block_type == BlockType::Short && !gi.mixed_block_flag {
        0
    } else if gi.block_type != BlockType::Short && sfb21_extra {
        SBMAX_L
    } else {
        gi.sfb_lmax
    }
}

/// Highest short band (exclusive) the noise loops visit.
fn noise_smax(gi: &GranuleInfo, sfb21_extra: bool) -> usize {
    if gi.block_type != BlockType::Short {
        0 // no short windows; loops over an empty range
    } else if sfb21_extra {
        SBMAX_S
    } else {
        SBPSY_S
    }
}

/// Compute the allowed distortion per band from the psy-model ratios, with
/// the ATH as a floor. Returns the number of bands whose signal energy
/// exceeds the ATH; zero means the granule is analog silence.
pub fn calc_xmin(
    sfb: &ScalefacBands,
    ath: &AthBands,
    masking_lower: f64,
    xr: &[f64; GRANULE_SIZE],
    ratio: &PsyRatio,
    gi: &GranuleInfo,
    xmin: &mut AllowedDistortion,
    sfb21_extra: bool,
) -> u32 {
    let mut ath_over = 0;

    for band in 0..noise_lmax(gi, sfb21_extra) {
        let (start, end) = (sfb.l[band], sfb.l[band + 1]);
        let mut en0 = 0.0;
        for &v in &xr[start..end] {
            en0 += v * v;
        }
        if en0 > ath.l[band] {
            ath_over += 1;
        }
        let masked = if ratio.en_l[band] > 0.0 {
            en0 * ratio.thm_l[band] * masking_lower / ratio.en_l[band]
        } else {
            0.0
        };
        xmin.l[band] = masked.max(ath.l[band]);
    }

    if gi.block_type == BlockType::Short {
        for band in gi.sfb_smin..noise_smax(gi, sfb21_extra) {
            let width = sfb.s[band + 1] - sfb.s[band];
            for window in 0..3 {
                let start = sfb.s[band] * 3 + width * window;
                let mut en0 = 0.0;
                for &v in &xr[start..start + width] {
                    en0 += v * v;
                }
                if en0 > ath.s[band] {
                    ath_over += 1;
                }
                let masked = if ratio.en_s[band][window] > 0.0 {
                    en0 * ratio.thm_s[band][window] * masking_lower / ratio.en_s[band][window]
                } else {
                    0.0
                };
                xmin.s[band][window] = masked.max(ath.s[band]);
            }
        }
    }

    ath_over
}

/// Softplus penalty for the psychoacoustic comparator accumulator.
fn penalties(noise_db: f64) -> f64 {
    (1.0 + noise_db.exp()).ln()
}

/// Measure the quantization noise of `ix` against the allowed distortion.
/// Fills `distort` (noise/mask per band, row 0 long, rows 1..=3 short
/// windows) and returns the number of distorted bands alongside the dB
/// aggregates.
#[allow(clippy::too_many_arguments)]
pub fn calc_noise(
    sfb: &ScalefacBands,
    xr: &[f64; GRANULE_SIZE],
    ix: &[i32; GRANULE_SIZE],
    gi: &GranuleInfo,
    xmin: &AllowedDistortion,
    scalefac: &Scalefac,
    distort: &mut Distortion,
    res: &mut NoiseResult,
    sfb21_extra: bool,
) -> u32 {
    let mut over = 0u32;
    let mut over_noise = 0.0;
    let mut tot_noise = 0.0;
    let mut max_noise = -200.0f64;
    let mut klemm = 0.0;

    for band in 0..noise_lmax(gi, sfb21_extra) {
        let pre = if gi.preflag { PRETAB[band] } else { 0 };
        let sf = if band < SBPSY_L { scalefac.l[band].max(0) } else { 0 };
        let s = gi.global_gain - ((sf + pre) << (gi.scalefac_scale + 1));
        let step = pow20(s);

        let (start, end) = (sfb.l[band], sfb.l[band + 1]);
        let mut noise = 0.0;
        for i in start..end {
            let temp = xr[i].abs() - pow43(ix[i]) * step;
            noise += temp * temp;
        }
        let ratio = noise / xmin.l[band].max(1e-37);
        distort[0][band] = ratio;

        let db = 10.0 * ratio.max(1e-20).log10();
        tot_noise += db;
        max_noise = max_noise.max(db);
        if db > 0.0 {
            over += 1;
            over_noise += db;
        }
        klemm += penalties(db);
    }

    if gi.block_type == BlockType::Short {
        for band in gi.sfb_smin..noise_smax(gi, sfb21_extra) {
            let width = sfb.s[band + 1] - sfb.s[band];
            for window in 0..3 {
                let sf = if band < SBPSY_S {
                    scalefac.s[band][window].max(0)
                } else {
                    0
                };
                let s = gi.global_gain
                    - gi.subblock_gain[window] * 8
                    - (sf << (gi.scalefac_scale + 1));
                let step = pow20(s);

                let start = sfb.s[band] * 3 + width * window;
                let mut noise = 0.0;
                for i in start..start + width {
                    let temp = xr[i].abs() - pow43(ix[i]) * step;
                    noise += temp * temp;
                }
                let ratio = noise / xmin.s[band][window].max(1e-37);
                distort[window + 1][band] = ratio;

                let db = 10.0 * ratio.max(1e-20).log10();
                tot_noise += db;
                max_noise = max_noise.max(db);
                if db > 0.0 {
                    over += 1;
                    over_noise += db;
                }
                klemm += penalties(db);
            }
        }
    }

    res.over_count = over;
    res.over_noise = over_noise;
    res.tot_noise = tot_noise;
    res.max_noise = max_noise;
    res.klemm_noise = klemm;
    over
}

/// Candidate comparison strategy, selected by the `experimentalX`
/// configuration input. Mode 0 is the default lexicographic order; the
/// slack constants in the other modes are reproduced as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantComparator {
    mode: u8,
}

impl QuantComparator {
    pub fn from_mode(mode: u8) -> Self {
        debug_assert!(mode <= 8);
        Self { mode }
    }

    /// Does `calc` beat `best`?
    pub fn better(&self, calc: &NoiseResult, best: &NoiseResult) -> bool {
        match self.mode {
            0 => {
                calc.over_count < best.over_count
                    || (calc.over_count == best.over_count && calc.over_noise < best.over_noise)
                    || (calc.over_count == best.over_count
                        && calc.over_noise == best.over_noise
                        && calc.tot_noise < best.tot_noise)
            }
            1 => calc.max_noise < best.max_noise,
            2 => calc.tot_noise < best.tot_noise,
            3 => calc.tot_noise < best.tot_noise && calc.max_noise < best.max_noise + 2.0,
            4 => {
                (calc.max_noise <= 0.0 && best.max_noise > 2.0)
                    || (calc.max_noise <= 0.0
                        && best.max_noise < 0.0
                        && best.max_noise > calc.max_noise - 2.0
                        && calc.tot_noise < best.tot_noise)
                    || (calc.max_noise <= 0.0
                        && best.max_noise > 0.0
                        && best.max_noise > calc.max_noise - 2.0
                        && calc.tot_noise < best.tot_noise + best.over_noise)
                    || (calc.max_noise > 0.0
                        && best.max_noise > -0.5
                        && best.max_noise > calc.max_noise - 1.0
                        && calc.tot_noise + calc.over_noise
                            < best.tot_noise + best.over_noise)
                    || (calc.max_noise > 0.0
                        && best.max_noise > -1.0
                        && best.max_noise > calc.max_noise - 1.5
                        && calc.tot_noise + calc.over_noise + calc.over_noise
                            < best.tot_noise + best.over_noise + best.over_noise)
            }
            5 => {
                calc.over_noise < best.over_noise
                    || (calc.over_noise == best.over_noise && calc.tot_noise < best.tot_noise)
            }
            6 => {
                calc.over_noise < best.over_noise
                    || (calc.over_noise == best.over_noise
                        && (calc.max_noise < best.max_noise
                            || (calc.max_noise == best.max_noise
                                && calc.tot_noise <= best.tot_noise)))
            }
            7 => calc.over_count < best.over_count || calc.over_noise < best.over_noise,
            8 => calc.klemm_noise < best.klemm_noise,
            _ => unreachable!("comparator mode validated at init"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::SFB_TABLES;

    fn flat_ratio(level: f64) -> PsyRatio {
        let mut r = PsyRatio::default();
        for b in 0..SBMAX_L {
            r.en_l[b] = 1.0;
            r.thm_l[b] = level;
        }
        for b in 0..SBMAX_S {
            for w in 0..3 {
                r.en_s[b][w] = 1.0;
                r.thm_s[b][w] = level;
            }
        }
        r
    }

    #[test]
    fn silence_is_detected_as_below_ath() {
        let sfb = &SFB_TABLES[0];
        let ath = AthBands::new(sfb, 44100);
        let xr = [0.0; GRANULE_SIZE];
        let gi = GranuleInfo::default();
        let mut xmin = AllowedDistortion::default();
        let bands = calc_xmin(sfb, &ath, 1.0, &xr, &flat_ratio(0.1), &gi, &mut xmin, true);
        assert_eq!(bands, 0);
        // the floor is still the ATH, never zero
        assert!(xmin.l.iter().take(SBMAX_L).all(|&x| x > 0.0));
    }

    #[test]
    fn loud_spectrum_crosses_ath() {
        let sfb = &SFB_TABLES[0];
        let ath = AthBands::new(sfb, 44100);
        let mut xr = [0.0; GRANULE_SIZE];
        for v in xr.iter_mut().take(200) {
            *v = 1000.0;
        }
        let gi = GranuleInfo::default();
        let mut xmin = AllowedDistortion::default();
        let bands = calc_xmin(sfb, &ath, 1.0, &xr, &flat_ratio(0.1), &gi, &mut xmin, true);
        assert!(bands > 0);
    }

    #[test]
    fn perfect_quantization_is_not_distorted() {
        let sfb = &SFB_TABLES[0];
        let gi = GranuleInfo::default();
        let scalefac = Scalefac::default();
        // choose xr so that xr == dequant(ix) exactly at gain 210
        let mut xr = [0.0; GRANULE_SIZE];
        let mut ix = [0i32; GRANULE_SIZE];
        for i in 0..32 {
            ix[i] = 2;
            xr[i] = pow43(2); // step at gain 210 is 1.0
        }
        let mut xmin = AllowedDistortion::default();
        for b in 0..SBMAX_L {
            xmin.l[b] = 1.0;
        }
        let mut distort = [[0.0; SBMAX_L]; 4];
        let mut res = NoiseResult::default();
        let over = calc_noise(
            sfb, &xr, &ix, &gi, &xmin, &scalefac, &mut distort, &mut res, true,
        );
        assert_eq!(over, 0);
        assert!(res.max_noise <= 0.0);
    }

    #[test]
    fn default_comparator_orders_lexicographically() {
        let cmp = QuantComparator::from_mode(0);
        let mut a = NoiseResult::default();
        let mut b = NoiseResult::default();
        a.over_count = 1;
        b.over_count = 2;
        assert!(cmp.better(&a, &b));
        assert!(!cmp.better(&b, &a));

        b.over_count = 1;
        a.over_noise = 1.0;
        b.over_noise = 2.0;
        assert!(cmp.better(&a, &b));
    }

    #[test]
    fn comparator_mode4_prefers_clean_over_distorted() {
        let cmp = QuantComparator::from_mode(4);
        let clean = NoiseResult {
            over_count: 0,
            max_noise: -1.0,
            over_noise: 0.0,
            tot_noise: -50.0,
            klemm_noise: 0.0,
        };
        let distorted = NoiseResult {
            over_count: 3,
            max_noise: 4.0,
            over_noise: 9.0,
            tot_noise: -10.0,
            klemm_noise: 10.0,
        };
        assert!(cmp.better(&clean, &distorted));
    }
}
