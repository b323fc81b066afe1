//! Color cache for backward-reference coding.
//!
//! A hash-addressed ring of recently emitted pixels; a cache hit lets a
//! single symbol stand in for a full BGRA literal.

use alloc::vec;
use alloc::vec::Vec;

/// Cache hash multiplier. Must match the decoder exactly.
const COLOR_CACHE_MULT: u32 = 0x1e35a7bd;

/// Hash-addressed store of recently seen pixels.
#[derive(Debug, Clone)]
pub struct ColorCache {
    colors: Vec<u32>,
    hash_shift: u32,
}

impl ColorCache {
    /// New cache with `1 << bits` slots. `bits` must be in 1..=10.
    pub fn new(bits: u32) -> Self {
        debug_assert!((1..=10).contains(&bits));
        Self {
            colors: vec![0; 1usize << bits],
            hash_shift: 32 - bits,
        }
    }

    #[inline]
    fn hash(&self, bgra: u32) -> usize {
        (COLOR_CACHE_MULT.wrapping_mul(bgra) >> self.hash_shift) as usize
    }

    /// Record a pixel, evicting whatever shared its slot.
    #[inline]
    pub fn insert(&mut self, bgra: u32) {
        let idx = self.hash(bgra);
        self.colors[idx] = bgra;
    }

    /// Slot index of `bgra` if it is currently cached.
    #[inline]
    pub fn lookup(&self, bgra: u32) -> Option<u16> {
        let idx = self.hash(bgra);
        if self.colors[idx] == bgra {
            Some(idx as u16)
        } else {
            None
        }
    }
}
