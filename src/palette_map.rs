//! 3-D RGB lookup map for O(1) nearest-palette-index queries.
//!
//! A fixed 5/6/5 grid over RGB space is seeded with the palette entries and
//! flood-filled outward in growing Chebyshev shells, first writer wins. After
//! construction every cell names a palette index, so quantizing an arbitrary
//! color is a single table read.

use alloc::vec;
use alloc::vec::Vec;

use crate::pixel::{bgra_blue, bgra_green, bgra_red};

const R_BITS: u32 = 5;
const G_BITS: u32 = 6;
const B_BITS: u32 = 5;
const R_VAL: usize = 1 << R_BITS;
const G_VAL: usize = 1 << G_BITS;
const B_VAL: usize = 1 << B_BITS;
/// Total cell count (65 536).
const MAP_LEN: usize = R_VAL * G_VAL * B_VAL;

#[inline]
fn cell_index(r: usize, g: usize, b: usize) -> usize {
    b * (R_VAL * G_VAL) + g * R_VAL + r
}

/// Immutable palette quantization table.
///
/// Construction is deterministic for a given palette; queries are O(1).
pub struct PaletteMap3D {
    matches: Vec<u8>,
    palette: Vec<u32>,
}

impl PaletteMap3D {
    /// Build the map for `palette` (1..=256 entries).
    pub fn new(palette: &[u32]) -> Self {
        debug_assert!(!palette.is_empty() && palette.len() <= 256);

        let mut matches = vec![0u8; MAP_LEN];
        let mut taken = vec![false; MAP_LEN];
        let mut same = [false; 256];
        let mut seeds: Vec<(i32, i32, i32)> = Vec::with_capacity(palette.len());

        let mut remaining = MAP_LEN;
        for (i, &color) in palette.iter().enumerate() {
            let r = (bgra_red(color) >> (8 - R_BITS)) as usize;
            let g = (bgra_green(color) >> (8 - G_BITS)) as usize;
            let b = (bgra_blue(color) >> (8 - B_BITS)) as usize;
            seeds.push((r as i32, g as i32, b as i32));
            let idx = cell_index(r, g, b);
            if !taken[idx] {
                taken[idx] = true;
                matches[idx] = i as u8;
                remaining -= 1;
            } else {
                // Cell already claimed by an earlier entry; this one has no
                // seed of its own and is skipped during flooding.
                same[i] = true;
            }
        }

        // Flood in growing Chebyshev shells until every cell is claimed.
        let mut sqstep = 1i32;
        while remaining > 0 {
            for (i, &(r0, g0, b0)) in seeds.iter().enumerate() {
                if same[i] {
                    continue;
                }
                remaining -= fill_shell(&mut matches, &mut taken, r0, g0, b0, sqstep, i as u8);
            }
            sqstep += 1;
            debug_assert!(sqstep <= G_VAL as i32 + 1);
        }

        Self {
            matches,
            palette: palette.to_vec(),
        }
    }

    /// Nearest palette index for `pix`, with the palette color it names.
    #[inline]
    pub fn get_match(&self, pix: u32) -> (u8, u32) {
        let r = (bgra_red(pix) >> (8 - R_BITS)) as usize;
        let g = (bgra_green(pix) >> (8 - G_BITS)) as usize;
        let b = (bgra_blue(pix) >> (8 - B_BITS)) as usize;
        let index = self.matches[cell_index(r, g, b)];
        (index, self.palette[index as usize])
    }

    /// The palette this map was built from.
    pub fn palette(&self) -> &[u32] {
        &self.palette
    }
}

/// Claim the unclaimed cells on the Chebyshev shell of radius `s` around
/// `(r0, g0, b0)`. Returns how many cells were newly claimed.
///
/// The shell is the union of the six cube faces: a B pair sweeping G x R, a
/// G pair sweeping B x R and an R pair sweeping B x G, each clamped to the
/// grid. Cells on face edges are visited more than once but claimed once.
fn fill_shell(
    matches: &mut [u8],
    taken: &mut [bool],
    r0: i32,
    g0: i32,
    b0: i32,
    s: i32,
    index: u8,
) -> usize {
    let rl = (r0 - s).max(0) as usize;
    let rh = ((r0 + s).min(R_VAL as i32 - 1)) as usize;
    let gl = (g0 - s).max(0) as usize;
    let gh = ((g0 + s).min(G_VAL as i32 - 1)) as usize;
    let bl = (b0 - s).max(0) as usize;
    let bh = ((b0 + s).min(B_VAL as i32 - 1)) as usize;

    let mut filled = 0usize;
    let mut try_set = |idx: usize| {
        debug_assert!(idx < MAP_LEN);
        if !taken[idx] {
            taken[idx] = true;
            matches[idx] = index;
            filled += 1;
        }
    };

    for b in [b0 - s, b0 + s] {
        if (0..B_VAL as i32).contains(&b) {
            for g in gl..=gh {
                for r in rl..=rh {
                    try_set(cell_index(r, g, b as usize));
                }
            }
        }
    }
    for g in [g0 - s, g0 + s] {
        if (0..G_VAL as i32).contains(&g) {
            for b in bl..=bh {
                for r in rl..=rh {
                    try_set(cell_index(r, g as usize, b));
                }
            }
        }
    }
    for r in [r0 - s, r0 + s] {
        if (0..R_VAL as i32).contains(&r) {
            for b in bl..=bh {
                for g in gl..=gh {
                    try_set(cell_index(r as usize, g, b));
                }
            }
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::make_bgra;

    #[test]
    fn test_every_cell_is_claimed() {
        let palette = [make_bgra(255, 10, 200, 40), make_bgra(255, 250, 5, 130)];
        let map = PaletteMap3D::new(&palette);
        // With two seeds, every cell must name one of the two entries.
        assert!(map.matches.iter().all(|&m| m < 2));
        assert_eq!(map.matches.len(), MAP_LEN);
    }

    #[test]
    fn test_palette_colors_map_to_themselves() {
        let palette: Vec<u32> = (0..16u32)
            .map(|i| make_bgra(255, (i * 16) as u8, (i * 13) as u8, (255 - i * 9) as u8))
            .collect();
        let map = PaletteMap3D::new(&palette);
        for (i, &color) in palette.iter().enumerate() {
            let (idx, matched) = map.get_match(color);
            assert_eq!(idx as usize, i, "palette color {i} lost its own cell");
            assert_eq!(matched, color);
        }
    }

    #[test]
    fn test_gray_ramp_midpoint() {
        // Sixteen grays 0x00, 0x11, ..., 0xFF; mid gray lands on entry 8.
        let palette: Vec<u32> = (0..16u32)
            .map(|i| make_bgra(255, (i * 0x11) as u8, (i * 0x11) as u8, (i * 0x11) as u8))
            .collect();
        let map = PaletteMap3D::new(&palette);
        let (idx, color) = map.get_match(make_bgra(255, 0x80, 0x80, 0x80));
        assert_eq!(idx, 8);
        assert_eq!(color, palette[8]);
    }

    #[test]
    fn test_single_entry_covers_everything() {
        let palette = [make_bgra(255, 77, 66, 55)];
        let map = PaletteMap3D::new(&palette);
        assert!(map.matches.iter().all(|&m| m == 0));
        let (idx, color) = map.get_match(make_bgra(255, 0, 0, 0));
        assert_eq!(idx, 0);
        assert_eq!(color, palette[0]);
    }

    #[test]
    fn test_duplicate_cell_entries_keep_first_claimant() {
        // Two colors in the same 5/6/5 cell: the first keeps the cell.
        let a = make_bgra(255, 8, 4, 8);
        let b = make_bgra(255, 9, 5, 9);
        let map = PaletteMap3D::new(&[a, b]);
        let (idx, _) = map.get_match(a);
        assert_eq!(idx, 0);
        let (idx, _) = map.get_match(b);
        assert_eq!(idx, 0, "second entry shares the first entry's cell");
    }

    #[test]
    fn test_queries_pick_nearby_seed() {
        let red = make_bgra(255, 255, 0, 0);
        let blue = make_bgra(255, 0, 0, 255);
        let map = PaletteMap3D::new(&[red, blue]);
        assert_eq!(map.get_match(make_bgra(255, 250, 10, 10)).0, 0);
        assert_eq!(map.get_match(make_bgra(255, 10, 10, 250)).0, 1);
    }
}
