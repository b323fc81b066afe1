//! Entropy analysis: choose the transform regime before crunching.
//!
//! One pass over the image accumulates residual histograms for every
//! candidate regime; the cheapest one becomes the crunch seed.

use alloc::vec;
use alloc::vec::Vec;

use super::histogram::bits_entropy_refine;
use super::utils::sub_pixels;
use crate::pixel::{bgra_alpha, bgra_blue, bgra_green, bgra_red};

/// Transform regime selected by the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyIx {
    /// No decorrelation.
    Direct,
    /// Predictor transform.
    Spatial,
    /// Subtract-green transform.
    SubGreen,
    /// Subtract-green then predictor.
    SpatialSubGreen,
    /// Color-indexing transform.
    Palette,
    /// Color indexing then predictor over the packed image.
    PaletteAndSpatial,
}

const HISTO_ALPHA: usize = 0;
const HISTO_ALPHA_PRED: usize = 1;
const HISTO_GREEN: usize = 2;
const HISTO_GREEN_PRED: usize = 3;
const HISTO_RED: usize = 4;
const HISTO_RED_PRED: usize = 5;
const HISTO_BLUE: usize = 6;
const HISTO_BLUE_PRED: usize = 7;
const HISTO_RED_SUB_GREEN: usize = 8;
const HISTO_RED_PRED_SUB_GREEN: usize = 9;
const HISTO_BLUE_SUB_GREEN: usize = 10;
const HISTO_BLUE_PRED_SUB_GREEN: usize = 11;
const HISTO_PALETTE: usize = 12;
const HISTO_TOTAL: usize = 13;

#[inline]
fn add_single(histos: &mut [Vec<u32>], pix: u32, a: usize, r: usize, g: usize, b: usize) {
    histos[a][bgra_alpha(pix) as usize] += 1;
    histos[r][bgra_red(pix) as usize] += 1;
    histos[g][bgra_green(pix) as usize] += 1;
    histos[b][bgra_blue(pix) as usize] += 1;
}

#[inline]
fn add_sub_green(histos: &mut [Vec<u32>], pix: u32, r: usize, b: usize) {
    let green = bgra_green(pix);
    histos[r][bgra_red(pix).wrapping_sub(green) as usize] += 1;
    histos[b][bgra_blue(pix).wrapping_sub(green) as usize] += 1;
}

/// Pick the cheapest regime and report whether its red and blue residual
/// populations are entirely zero (which disables the cross-color transform).
pub fn analyze_entropy(
    bgra: &[u32],
    width: usize,
    height: usize,
    use_palette: bool,
    palette_size: usize,
) -> (EntropyIx, bool) {
    if use_palette && palette_size <= 16 {
        // Small palettes bundle several pixels per code; nothing beats that.
        return (EntropyIx::Palette, true);
    }

    let mut histos: Vec<Vec<u32>> = (0..HISTO_TOTAL).map(|_| vec![0u32; 256]).collect();
    let mut last_pix = 0u32;
    for y in 0..height {
        for x in 0..width {
            let pix = bgra[y * width + x];
            let pix_diff = sub_pixels(pix, last_pix);
            last_pix = pix;
            // Runs and vertically repeated pixels carry no new information
            // for regime selection.
            if pix_diff == 0 || (y > 0 && pix == bgra[(y - 1) * width + x]) {
                continue;
            }
            add_single(
                &mut histos,
                pix,
                HISTO_ALPHA,
                HISTO_RED,
                HISTO_GREEN,
                HISTO_BLUE,
            );
            add_single(
                &mut histos,
                pix_diff,
                HISTO_ALPHA_PRED,
                HISTO_RED_PRED,
                HISTO_GREEN_PRED,
                HISTO_BLUE_PRED,
            );
            add_sub_green(&mut histos, pix, HISTO_RED_SUB_GREEN, HISTO_BLUE_SUB_GREEN);
            add_sub_green(
                &mut histos,
                pix_diff,
                HISTO_RED_PRED_SUB_GREEN,
                HISTO_BLUE_PRED_SUB_GREEN,
            );
            if use_palette {
                let hash = (pix.wrapping_mul(0x1e35a7bd) >> 24) as usize;
                histos[HISTO_PALETTE][hash] += 1;
            }
        }
    }

    let comp: Vec<f64> = histos.iter().map(|h| bits_entropy_refine(h)).collect();
    let modes: &[(EntropyIx, [usize; 4])] = &[
        (
            EntropyIx::Direct,
            [HISTO_ALPHA, HISTO_RED, HISTO_GREEN, HISTO_BLUE],
        ),
        (
            EntropyIx::Spatial,
            [HISTO_ALPHA_PRED, HISTO_RED_PRED, HISTO_GREEN_PRED, HISTO_BLUE_PRED],
        ),
        (
            EntropyIx::SubGreen,
            [HISTO_ALPHA, HISTO_RED_SUB_GREEN, HISTO_GREEN, HISTO_BLUE_SUB_GREEN],
        ),
        (
            EntropyIx::SpatialSubGreen,
            [
                HISTO_ALPHA_PRED,
                HISTO_RED_PRED_SUB_GREEN,
                HISTO_GREEN_PRED,
                HISTO_BLUE_PRED_SUB_GREEN,
            ],
        ),
    ];

    let mut best_ix = EntropyIx::Direct;
    let mut best_cost = f64::INFINITY;
    for (ix, planes) in modes {
        let cost: f64 = planes.iter().map(|&p| comp[p]).sum();
        if cost < best_cost {
            best_cost = cost;
            best_ix = *ix;
        }
    }
    if use_palette && comp[HISTO_PALETTE] < best_cost {
        best_ix = EntropyIx::Palette;
    }

    let (red_plane, blue_plane) = match best_ix {
        EntropyIx::Direct => (HISTO_RED, HISTO_BLUE),
        EntropyIx::Spatial => (HISTO_RED_PRED, HISTO_BLUE_PRED),
        EntropyIx::SubGreen => (HISTO_RED_SUB_GREEN, HISTO_BLUE_SUB_GREEN),
        EntropyIx::SpatialSubGreen => (HISTO_RED_PRED_SUB_GREEN, HISTO_BLUE_PRED_SUB_GREEN),
        EntropyIx::Palette | EntropyIx::PaletteAndSpatial => {
            return (best_ix, true);
        }
    };
    // A channel whose residual population is concentrated in a single bin
    // already codes for free; cross-color has nothing to remove there.
    let trivial_mass = |plane: usize| -> bool {
        histos[plane].iter().filter(|&&c| c > 0).count() <= 1
    };
    let red_and_blue_always_zero = trivial_mass(red_plane) && trivial_mass(blue_plane);
    (best_ix, red_and_blue_always_zero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::make_bgra;

    #[test]
    fn test_small_palette_short_circuits() {
        let bgra = vec![make_bgra(255, 0, 0, 0); 64];
        let (ix, rb_zero) = analyze_entropy(&bgra, 8, 8, true, 2);
        assert_eq!(ix, EntropyIx::Palette);
        assert!(rb_zero);
    }

    #[test]
    fn test_gradient_prefers_spatial_family() {
        // Smooth horizontal ramp: neighboring deltas are tiny, raw values
        // span the whole range.
        let mut bgra = Vec::new();
        for _ in 0..32 {
            for x in 0..256u32 {
                bgra.push(make_bgra(255, x as u8, x as u8, x as u8));
            }
        }
        let (ix, _) = analyze_entropy(&bgra, 256, 32, false, 0);
        assert!(
            matches!(ix, EntropyIx::Spatial | EntropyIx::SpatialSubGreen),
            "got {ix:?}"
        );
    }

    #[test]
    fn test_red_gradient_disables_cross_color() {
        // Red ramp along x: after prediction the red residual sits in a
        // single bin, so cross-color has nothing left to remove.
        let mut bgra = Vec::new();
        for _ in 0..4 {
            for x in 0..256u32 {
                bgra.push(make_bgra(255, x as u8, 0, 0));
            }
        }
        let (ix, rb_zero) = analyze_entropy(&bgra, 256, 4, false, 0);
        assert!(
            matches!(ix, EntropyIx::Spatial | EntropyIx::SpatialSubGreen),
            "got {ix:?}"
        );
        assert!(rb_zero);
    }

    #[test]
    fn test_grayscale_prefers_sub_green() {
        // Gray pixels: red and blue collapse to zero once green is
        // subtracted; raw channels are spread out.
        let mut bgra = Vec::new();
        for i in 0..1024u32 {
            let v = ((i * 37) % 256) as u8;
            bgra.push(make_bgra(255, v, v, v));
        }
        let (ix, rb_zero) = analyze_entropy(&bgra, 32, 32, false, 0);
        assert!(
            matches!(ix, EntropyIx::SubGreen | EntropyIx::SpatialSubGreen),
            "got {ix:?}"
        );
        assert!(rb_zero);
    }
}
