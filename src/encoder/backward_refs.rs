//! Backward-reference streams: literals, copies and cache hits.
//!
//! Turns the pixel stream into `PixOrCopy` tokens under the Standard and RLE
//! strategies, rewrites literals through the color cache, and picks the cache
//! size by simulating every candidate size in one pass.

use alloc::vec::Vec;

use super::color_cache::ColorCache;
use super::hash_chain::HashChain;
use super::histogram::Histogram;

/// Shortest copy worth emitting.
pub const MIN_LENGTH: usize = 3;
/// Upper bound on color cache size selection.
pub const MAX_COLOR_CACHE_BITS: u32 = 10;

/// One token of the backward-reference stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixOrCopy {
    /// Literal BGRA pixel.
    Literal(u32),
    /// Color cache slot holding the pixel.
    CacheIdx(u16),
    /// Backward copy; `dist_code` is the 2D-locality distance code.
    Copy {
        /// Copied pixel count (1..=4095).
        len: u16,
        /// Plane-mapped distance code (1-based).
        dist_code: u32,
    },
}

impl PixOrCopy {
    /// Number of pixels this token reproduces.
    #[inline]
    pub fn length(&self) -> usize {
        match *self {
            PixOrCopy::Copy { len, .. } => len as usize,
            _ => 1,
        }
    }
}

/// Ordered token stream covering the whole image.
#[derive(Debug, Clone, Default)]
pub struct BackwardRefs {
    /// Tokens in scan order.
    pub tokens: Vec<PixOrCopy>,
}

impl BackwardRefs {
    /// Empty stream with room for `cap` tokens.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(cap),
        }
    }

    /// Iterate the tokens in scan order.
    pub fn iter(&self) -> impl Iterator<Item = &PixOrCopy> {
        self.tokens.iter()
    }

    /// Total pixels reproduced by the stream.
    pub fn pixel_count(&self) -> usize {
        self.tokens.iter().map(PixOrCopy::length).sum()
    }
}

/// 2D neighborhood offsets for distance codes 1..=120, in code order.
#[cfg(test)]
#[rustfmt::skip]
const DISTANCE_MAP: [(i8, i8); 120] = [
    (0, 1),  (1, 0),  (1, 1),  (-1, 1), (0, 2),  (2, 0),  (1, 2),  (-1, 2),
    (2, 1),  (-2, 1), (2, 2),  (-2, 2), (0, 3),  (3, 0),  (1, 3),  (-1, 3),
    (3, 1),  (-3, 1), (2, 3),  (-2, 3), (3, 2),  (-3, 2), (0, 4),  (4, 0),
    (1, 4),  (-1, 4), (4, 1),  (-4, 1), (3, 3),  (-3, 3), (2, 4),  (-2, 4),
    (4, 2),  (-4, 2), (0, 5),  (3, 4),  (-3, 4), (4, 3),  (-4, 3), (5, 0),
    (1, 5),  (-1, 5), (5, 1),  (-5, 1), (2, 5),  (-2, 5), (5, 2),  (-5, 2),
    (4, 4),  (-4, 4), (3, 5),  (-3, 5), (5, 3),  (-5, 3), (0, 6),  (6, 0),
    (1, 6),  (-1, 6), (6, 1),  (-6, 1), (2, 6),  (-2, 6), (6, 2),  (-6, 2),
    (4, 5),  (-4, 5), (5, 4),  (-5, 4), (3, 6),  (-3, 6), (6, 3),  (-6, 3),
    (0, 7),  (7, 0),  (1, 7),  (-1, 7), (5, 5),  (-5, 5), (7, 1),  (-7, 1),
    (4, 6),  (-4, 6), (6, 4),  (-6, 4), (2, 7),  (-2, 7), (7, 2),  (-7, 2),
    (3, 7),  (-3, 7), (7, 3),  (-7, 3), (5, 6),  (-5, 6), (6, 5),  (-6, 5),
    (8, 0),  (4, 7),  (-4, 7), (7, 4),  (-7, 4), (8, 1),  (8, 2),  (6, 6),
    (-6, 6), (8, 3),  (5, 7),  (-5, 7), (7, 5),  (-7, 5), (8, 4),  (6, 7),
    (-6, 7), (7, 6),  (-7, 6), (8, 5),  (7, 7),  (-7, 7), (8, 6),  (8, 7)
];

/// Reverse lookup: `(yoffset * 16 + 8 - xoffset)` to distance code.
#[rustfmt::skip]
const PLANE_TO_CODE_LUT: [u8; 128] = [
    96,  73,  55,  39,  23, 13, 5,  1,  255, 255, 255, 255, 255, 255, 255, 255,
    101, 78,  58,  42,  26, 16, 8,  2,  0,   3,   9,   17,  27,  43,  59,  79,
    102, 86,  62,  46,  32, 20, 10, 6,  4,   7,   11,  21,  33,  47,  63,  87,
    105, 90,  70,  52,  37, 28, 18, 14, 12,  15,  19,  29,  38,  53,  71,  91,
    110, 99,  82,  66,  48, 35, 30, 24, 22,  25,  31,  36,  49,  67,  83,  100,
    115, 108, 94,  76,  64, 50, 44, 40, 34,  41,  45,  51,  65,  77,  95,  109,
    118, 113, 103, 92,  80, 68, 60, 56, 54,  57,  61,  69,  81,  93,  104, 114,
    119, 116, 111, 106, 97, 88, 84, 74, 72,  75,  85,  89,  98,  107, 112, 117
];

/// Map a linear distance to its 2D-locality distance code.
pub fn distance_to_plane_code(xsize: usize, dist: usize) -> u32 {
    let yoffset = dist / xsize;
    let xoffset = dist - yoffset * xsize;
    if xoffset <= 8 && yoffset < 8 {
        u32::from(PLANE_TO_CODE_LUT[yoffset * 16 + 8 - xoffset]) + 1
    } else if xoffset > xsize.saturating_sub(8) && yoffset < 7 {
        u32::from(PLANE_TO_CODE_LUT[(yoffset + 1) * 16 + 8 + (xsize - xoffset)]) + 1
    } else {
        (dist + 120) as u32
    }
}

/// Inverse of [`distance_to_plane_code`].
#[cfg(test)]
pub fn plane_code_to_distance(xsize: usize, code: u32) -> usize {
    if code > 120 {
        (code - 120) as usize
    } else {
        let (xoff, yoff) = DISTANCE_MAP[(code - 1) as usize];
        let dist = xoff as i32 + yoff as i32 * xsize as i32;
        if dist < 1 {
            1
        } else {
            dist as usize
        }
    }
}

/// Standard strategy: longest hash-chain match at each position, literals
/// elsewhere. Produces a cache-free stream.
pub fn refs_standard(bgra: &[u32], width: usize, chain: &HashChain) -> BackwardRefs {
    let size = bgra.len();
    let mut refs = BackwardRefs::with_capacity(size / 2);
    let mut pos = 0usize;
    while pos < size {
        let (offset, len) = chain.find_copy(pos);
        if len >= MIN_LENGTH && offset > 0 {
            debug_assert!(offset <= pos);
            refs.tokens.push(PixOrCopy::Copy {
                len: len as u16,
                dist_code: distance_to_plane_code(width, offset),
            });
            pos += len;
        } else {
            refs.tokens.push(PixOrCopy::Literal(bgra[pos]));
            pos += 1;
        }
    }
    refs
}

/// RLE strategy: distance-1 runs only. Cheap and strong on flat regions.
pub fn refs_rle(bgra: &[u32], width: usize) -> BackwardRefs {
    let size = bgra.len();
    let mut refs = BackwardRefs::with_capacity(size / 4);
    if size == 0 {
        return refs;
    }
    let run_code = distance_to_plane_code(width, 1);
    let mut pos = 0usize;
    while pos < size {
        let pix = bgra[pos];
        if pos > 0 && pix == bgra[pos - 1] {
            let mut run = 1usize;
            while pos + run < size
                && bgra[pos + run] == pix
                && run < super::hash_chain::MAX_LENGTH
            {
                run += 1;
            }
            refs.tokens.push(PixOrCopy::Copy {
                len: run as u16,
                dist_code: run_code,
            });
            pos += run;
        } else {
            refs.tokens.push(PixOrCopy::Literal(pix));
            pos += 1;
        }
    }
    refs
}

/// Rewrite a cache-free stream through a color cache of `cache_bits`,
/// replacing literals by cache hits.
pub fn apply_color_cache(refs: &BackwardRefs, bgra: &[u32], cache_bits: u32) -> BackwardRefs {
    debug_assert!(cache_bits > 0);
    let mut cache = ColorCache::new(cache_bits);
    let mut out = BackwardRefs::with_capacity(refs.tokens.len());
    let mut pos = 0usize;
    for token in refs.iter() {
        match *token {
            PixOrCopy::Literal(pix) => {
                if let Some(idx) = cache.lookup(pix) {
                    out.tokens.push(PixOrCopy::CacheIdx(idx));
                } else {
                    out.tokens.push(PixOrCopy::Literal(pix));
                }
                cache.insert(pix);
                pos += 1;
            }
            PixOrCopy::Copy { len, dist_code } => {
                for k in 0..len as usize {
                    cache.insert(bgra[pos + k]);
                }
                out.tokens.push(PixOrCopy::Copy { len, dist_code });
                pos += len as usize;
            }
            PixOrCopy::CacheIdx(_) => unreachable!("input stream must be cache-free"),
        }
    }
    out
}

/// Pick the cache size in `0..=max_bits` minimizing the estimated stream
/// cost. Simulates all candidate caches in a single pass over `refs`.
pub fn best_cache_bits(refs: &BackwardRefs, bgra: &[u32], max_bits: u32) -> u32 {
    let max_bits = max_bits.min(MAX_COLOR_CACHE_BITS);
    if max_bits == 0 {
        return 0;
    }
    let mut histos: Vec<Histogram> = (0..=max_bits).map(Histogram::new).collect();
    let mut caches: Vec<ColorCache> = (1..=max_bits).map(ColorCache::new).collect();

    let mut pos = 0usize;
    for token in refs.iter() {
        match *token {
            PixOrCopy::Literal(pix) => {
                histos[0].add_literal(pix);
                for bits in 1..=max_bits {
                    let cache = &mut caches[(bits - 1) as usize];
                    if let Some(idx) = cache.lookup(pix) {
                        histos[bits as usize].add_cache_idx(idx);
                    } else {
                        histos[bits as usize].add_literal(pix);
                    }
                    cache.insert(pix);
                }
                pos += 1;
            }
            PixOrCopy::Copy { len, dist_code } => {
                for h in histos.iter_mut() {
                    h.add_copy(len, dist_code);
                }
                for k in 0..len as usize {
                    let pix = bgra[pos + k];
                    for cache in caches.iter_mut() {
                        cache.insert(pix);
                    }
                }
                pos += len as usize;
            }
            PixOrCopy::CacheIdx(_) => unreachable!("input stream must be cache-free"),
        }
    }

    let mut best_bits = 0u32;
    let mut best_cost = f64::INFINITY;
    for (bits, histo) in histos.iter().enumerate() {
        let cost = histo.estimate_bits();
        if cost < best_cost {
            best_cost = cost;
            best_bits = bits as u32;
        }
    }
    best_bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::api::Profile;

    #[test]
    fn test_distance_code_roundtrip() {
        let xsize = 100;
        for dist in 1..=200 {
            let code = distance_to_plane_code(xsize, dist);
            assert_eq!(plane_code_to_distance(xsize, code), dist, "dist {dist}");
        }
    }

    #[test]
    fn test_neighborhood_codes() {
        let xsize = 100;
        // Previous pixel is (1, 0) -> code 2; pixel above is (0, 1) -> code 1.
        assert_eq!(distance_to_plane_code(xsize, 1), 2);
        assert_eq!(distance_to_plane_code(xsize, xsize), 1);
    }

    #[test]
    fn test_refs_cover_every_pixel() {
        let mut pixels = Vec::new();
        for i in 0..400u32 {
            pixels.push(0xFF000000 | (i % 7) * 0x010203);
        }
        let chain = HashChain::new(&pixels, &Profile::default(), 20);
        let refs = refs_standard(&pixels, 20, &chain);
        assert_eq!(refs.pixel_count(), pixels.len());
        let rle = refs_rle(&pixels, 20);
        assert_eq!(rle.pixel_count(), pixels.len());
    }

    #[test]
    fn test_rle_collapses_solid_image() {
        let pixels = vec![0xFF00FF00u32; 64];
        let refs = refs_rle(&pixels, 8);
        assert_eq!(refs.tokens.len(), 2);
        assert_eq!(refs.tokens[0], PixOrCopy::Literal(0xFF00FF00));
        assert!(matches!(refs.tokens[1], PixOrCopy::Copy { len: 63, .. }));
    }

    #[test]
    fn test_copy_distances_stay_behind_position() {
        let mut pixels = Vec::new();
        for i in 0..256u32 {
            pixels.push(0xFF000000 | (i % 16) << 8);
        }
        let chain = HashChain::new(&pixels, &Profile::default(), 16);
        let refs = refs_standard(&pixels, 16, &chain);
        let mut pos = 0usize;
        for token in refs.iter() {
            if let PixOrCopy::Copy { dist_code, .. } = *token {
                let dist = super::plane_code_to_distance(16, dist_code);
                assert!(dist <= pos, "distance {dist} ahead of position {pos}");
            }
            pos += token.length();
        }
    }

    #[test]
    fn test_cache_rewrite_hits_repeated_colors() {
        // Alternating colors defeat RLE but are perfect cache fodder.
        let mut pixels = Vec::new();
        for i in 0..64 {
            pixels.push(if i % 2 == 0 { 0xFF112233 } else { 0xFF445566 });
        }
        // Force a literal-only stream to observe cache substitution.
        let refs = BackwardRefs {
            tokens: pixels.iter().map(|&p| PixOrCopy::Literal(p)).collect(),
        };
        let cached = apply_color_cache(&refs, &pixels, 4);
        let hits = cached
            .iter()
            .filter(|t| matches!(**t, PixOrCopy::CacheIdx(_)))
            .count();
        assert!(hits >= 60, "expected most literals to become cache hits");
        for token in cached.iter() {
            if let PixOrCopy::CacheIdx(idx) = *token {
                assert!((idx as usize) < (1 << 4));
            }
        }
    }

    #[test]
    fn test_best_cache_bits_prefers_cache_for_alternation() {
        let mut pixels = Vec::new();
        for i in 0..512 {
            pixels.push(match i % 3 {
                0 => 0xFF112233,
                1 => 0xFF445566,
                _ => 0xFF778899,
            });
        }
        let refs = BackwardRefs {
            tokens: pixels.iter().map(|&p| PixOrCopy::Literal(p)).collect(),
        };
        let bits = best_cache_bits(&refs, &pixels, MAX_COLOR_CACHE_BITS);
        assert!(bits > 0, "three-color alternation should want a cache");
    }
}
