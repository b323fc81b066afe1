//! Symbol histograms, entropy estimation and tile clustering.
//!
//! A histogram tracks the five symbol populations of one Huffman code group.
//! Tile histograms are clustered into meta-code groups: a stochastic pass
//! bounds the cluster count, then a greedy pass merges while a merge still
//! pays for itself.

use alloc::collections::BinaryHeap;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;

use super::backward_refs::{BackwardRefs, PixOrCopy};
use super::utils::{fast_log2, fast_slog2, prefix_encode, subsample_size};
use crate::pixel::{bgra_alpha, bgra_blue, bgra_green, bgra_red};

/// Literal alphabet base (green channel byte values).
pub const NUM_LITERAL_CODES: usize = 256;
/// Length prefix codes appended to the literal alphabet.
pub const NUM_LENGTH_CODES: usize = 24;
/// Distance prefix codes.
pub const NUM_DISTANCE_CODES: usize = 40;

/// Constant correction applied by the refined entropy estimator; stands in
/// for the per-table storage overhead the raw Shannon bound ignores.
const ESTIMATE_CORRECTION: f64 = 2.0;

/// Literal alphabet size for a given cache size.
#[inline]
pub const fn literal_alphabet_size(cache_bits: u32) -> usize {
    NUM_LITERAL_CODES + NUM_LENGTH_CODES + if cache_bits > 0 { 1 << cache_bits } else { 0 }
}

/// Symbol frequencies for one Huffman code group.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Green channel + length codes + cache indices.
    pub literal: Vec<u32>,
    /// Red channel.
    pub red: [u32; 256],
    /// Blue channel.
    pub blue: [u32; 256],
    /// Alpha channel.
    pub alpha: [u32; 256],
    /// Distance prefix codes.
    pub distance: [u32; NUM_DISTANCE_CODES],
    /// Raw extra bits carried by length/distance codes seen so far.
    extra_bits: u64,
    cache_bits: u32,
}

impl Histogram {
    /// Empty histogram sized for `cache_bits`.
    pub fn new(cache_bits: u32) -> Self {
        Self {
            literal: vec![0; literal_alphabet_size(cache_bits)],
            red: [0; 256],
            blue: [0; 256],
            alpha: [0; 256],
            distance: [0; NUM_DISTANCE_CODES],
            extra_bits: 0,
            cache_bits,
        }
    }

    /// Count a literal pixel on all four channels.
    #[inline]
    pub fn add_literal(&mut self, bgra: u32) {
        self.literal[bgra_green(bgra) as usize] += 1;
        self.red[bgra_red(bgra) as usize] += 1;
        self.blue[bgra_blue(bgra) as usize] += 1;
        self.alpha[bgra_alpha(bgra) as usize] += 1;
    }

    /// Count a cache reference.
    #[inline]
    pub fn add_cache_idx(&mut self, idx: u16) {
        let code = NUM_LITERAL_CODES + NUM_LENGTH_CODES + idx as usize;
        debug_assert!(code < self.literal.len());
        self.literal[code] += 1;
    }

    /// Count a copy's length and distance prefix codes.
    #[inline]
    pub fn add_copy(&mut self, len: u16, dist_code: u32) {
        let (len_code, len_extra, _) = prefix_encode(len as u32);
        let (dist_prefix, dist_extra, _) = prefix_encode(dist_code);
        self.literal[NUM_LITERAL_CODES + len_code as usize] += 1;
        self.distance[dist_prefix as usize] += 1;
        self.extra_bits += (len_extra + dist_extra) as u64;
    }

    /// Count one token.
    #[inline]
    pub fn add_token(&mut self, token: &PixOrCopy) {
        match *token {
            PixOrCopy::Literal(pix) => self.add_literal(pix),
            PixOrCopy::CacheIdx(idx) => self.add_cache_idx(idx),
            PixOrCopy::Copy { len, dist_code } => self.add_copy(len, dist_code),
        }
    }

    /// Accumulate a whole reference stream.
    pub fn from_refs(refs: &BackwardRefs, cache_bits: u32) -> Self {
        let mut h = Self::new(cache_bits);
        for token in refs.iter() {
            h.add_token(token);
        }
        h
    }

    /// Merge `other` into `self`.
    pub fn merge(&mut self, other: &Histogram) {
        debug_assert_eq!(self.cache_bits, other.cache_bits);
        for (a, b) in self.literal.iter_mut().zip(other.literal.iter()) {
            *a += b;
        }
        for i in 0..256 {
            self.red[i] += other.red[i];
            self.blue[i] += other.blue[i];
            self.alpha[i] += other.alpha[i];
        }
        for i in 0..NUM_DISTANCE_CODES {
            self.distance[i] += other.distance[i];
        }
        self.extra_bits += other.extra_bits;
    }

    /// Estimated bits to code this population, including raw extra bits.
    pub fn estimate_bits(&self) -> f64 {
        bits_entropy_refine(&self.literal)
            + bits_entropy_refine(&self.red)
            + bits_entropy_refine(&self.blue)
            + bits_entropy_refine(&self.alpha)
            + bits_entropy_refine(&self.distance)
            + self.extra_bits as f64
    }
}

/// Refined Shannon estimate of coding `counts` with an optimal prefix code.
///
/// Degenerate populations (at most one symbol) cost nothing; flat ones cost
/// exactly `log2(n)` per sample; anything else gets the Shannon bound rounded
/// up plus a constant correction.
pub fn bits_entropy_refine(counts: &[u32]) -> f64 {
    let mut total: u64 = 0;
    let mut nonzeros = 0usize;
    let mut sum_slog = 0.0f64;
    let mut first_nonzero = 0u32;
    let mut flat = true;
    for &c in counts {
        if c > 0 {
            if nonzeros == 0 {
                first_nonzero = c;
            } else if c != first_nonzero {
                flat = false;
            }
            nonzeros += 1;
            total += c as u64;
            sum_slog += fast_slog2(c);
        }
    }
    if nonzeros <= 1 {
        return 0.0;
    }
    if flat {
        return total as f64 * fast_log2(nonzeros as u32);
    }
    let shannon = total as f64 * libm::log2(total as f64) - sum_slog;
    libm::ceil(shannon) + ESTIMATE_CORRECTION
}

/// Clustered tile histograms plus the tile-to-group map.
#[derive(Debug)]
pub struct HistogramImage {
    /// One histogram per meta-code group.
    pub histograms: Vec<Histogram>,
    /// Group index per tile, row-major over the subsampled grid.
    pub symbols: Vec<u16>,
}

/// Stochastic probing above this cluster count keeps the greedy pass cheap.
const GREEDY_CLUSTER_LIMIT: usize = 256;

/// Park-Miller sequence; fixed seed keeps the output byte-identical.
struct Rng(u64);

impl Rng {
    fn next(&mut self, range: usize) -> usize {
        self.0 = (self.0 * 16807) % ((1 << 31) - 1);
        (self.0 as usize) % range
    }
}

/// Build per-tile histograms from `refs` and cluster them into meta groups.
///
/// A token is attributed to the tile containing its first pixel. `max_groups`
/// caps the result; merges above the cap are forced, below it they happen
/// only while they reduce the estimated cost.
pub fn build_histogram_image(
    refs: &BackwardRefs,
    width: usize,
    height: usize,
    histo_bits: u32,
    cache_bits: u32,
    max_groups: usize,
) -> HistogramImage {
    let tiles_x = if histo_bits > 0 {
        subsample_size(width as u32, histo_bits) as usize
    } else {
        1
    };
    let tiles_y = if histo_bits > 0 {
        subsample_size(height as u32, histo_bits) as usize
    } else {
        1
    };
    let num_tiles = tiles_x * tiles_y;

    let mut histos: Vec<Histogram> = (0..num_tiles).map(|_| Histogram::new(cache_bits)).collect();
    let mut x = 0usize;
    let mut y = 0usize;
    for token in refs.iter() {
        let tile = if histo_bits > 0 {
            (y >> histo_bits) * tiles_x + (x >> histo_bits)
        } else {
            0
        };
        histos[tile].add_token(token);
        x += token.length();
        while x >= width {
            x -= width;
            y += 1;
        }
    }

    cluster_histograms(histos, max_groups)
}

#[derive(PartialEq)]
struct MergeCand {
    savings: f64,
    combined_cost: f64,
    i: usize,
    j: usize,
    gen_i: u64,
    gen_j: u64,
}

impl Eq for MergeCand {}

impl Ord for MergeCand {
    fn cmp(&self, other: &Self) -> Ordering {
        self.savings
            .total_cmp(&other.savings)
            .then(other.i.cmp(&self.i))
            .then(other.j.cmp(&self.j))
    }
}

impl PartialOrd for MergeCand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn combined_cost(a: &Histogram, b: &Histogram) -> f64 {
    let mut merged = a.clone();
    merged.merge(b);
    merged.estimate_bits()
}

/// Greedy clustering with a stochastic reduction pass for large tile counts.
fn cluster_histograms(mut histos: Vec<Histogram>, max_groups: usize) -> HistogramImage {
    let n = histos.len();
    let mut alive: Vec<bool> = vec![true; n];
    let mut owner: Vec<usize> = (0..n).collect();
    let mut costs: Vec<f64> = histos.iter().map(Histogram::estimate_bits).collect();
    let mut gens: Vec<u64> = vec![0; n];
    let mut alive_count = n;

    let merge = |histos: &mut Vec<Histogram>,
                     costs: &mut Vec<f64>,
                     owner: &mut Vec<usize>,
                     alive: &mut Vec<bool>,
                     gens: &mut Vec<u64>,
                     i: usize,
                     j: usize,
                     new_cost: f64| {
        let absorbed = histos[j].clone();
        histos[i].merge(&absorbed);
        costs[i] = new_cost;
        alive[j] = false;
        gens[i] += 1;
        gens[j] += 1;
        for o in owner.iter_mut() {
            if *o == j {
                *o = i;
            }
        }
    };

    // Stochastic reduction: probe random pairs and fold the best one until
    // the cluster count is tractable for the exhaustive pass.
    let mut rng = Rng(1);
    while alive_count > GREEDY_CLUSTER_LIMIT {
        let ids: Vec<usize> = (0..n).filter(|&k| alive[k]).collect();
        let probes = (ids.len() / 2).max(8);
        let mut best: Option<(f64, f64, usize, usize)> = None;
        for _ in 0..probes {
            let a_pos = rng.next(ids.len());
            let mut b_pos = rng.next(ids.len());
            if a_pos == b_pos {
                b_pos = (b_pos + 1) % ids.len();
            }
            let (a, b) = (ids[a_pos], ids[b_pos]);
            let (i, j) = if a < b { (a, b) } else { (b, a) };
            let cost = combined_cost(&histos[i], &histos[j]);
            let savings = costs[i] + costs[j] - cost;
            if best.as_ref().is_none_or(|bst| savings > bst.0) {
                best = Some((savings, cost, i, j));
            }
        }
        if let Some((_, cost, i, j)) = best {
            merge(&mut histos, &mut costs, &mut owner, &mut alive, &mut gens, i, j, cost);
            alive_count -= 1;
        }
    }

    // Exhaustive greedy pass with a lazy heap of merge candidates.
    let ids: Vec<usize> = (0..n).filter(|&k| alive[k]).collect();
    let mut heap: BinaryHeap<MergeCand> = BinaryHeap::new();
    for (a, &i) in ids.iter().enumerate() {
        for &j in ids.iter().skip(a + 1) {
            let cost = combined_cost(&histos[i], &histos[j]);
            heap.push(MergeCand {
                savings: costs[i] + costs[j] - cost,
                combined_cost: cost,
                i,
                j,
                gen_i: gens[i],
                gen_j: gens[j],
            });
        }
    }

    while alive_count > 1 {
        let cand = match heap.pop() {
            Some(c) => c,
            None => break,
        };
        if !alive[cand.i] || !alive[cand.j] || gens[cand.i] != cand.gen_i || gens[cand.j] != cand.gen_j {
            continue;
        }
        if cand.savings <= 0.0 && alive_count <= max_groups {
            break;
        }
        merge(
            &mut histos,
            &mut costs,
            &mut owner,
            &mut alive,
            &mut gens,
            cand.i,
            cand.j,
            cand.combined_cost,
        );
        alive_count -= 1;
        for k in 0..n {
            if k == cand.i || !alive[k] {
                continue;
            }
            let (i, j) = if k < cand.i { (k, cand.i) } else { (cand.i, k) };
            let cost = combined_cost(&histos[i], &histos[j]);
            heap.push(MergeCand {
                savings: costs[i] + costs[j] - cost,
                combined_cost: cost,
                i,
                j,
                gen_i: gens[i],
                gen_j: gens[j],
            });
        }
    }

    // Compact the surviving clusters into contiguous group indices.
    let mut remap: Vec<u16> = vec![u16::MAX; n];
    let mut groups: Vec<Histogram> = Vec::new();
    for (k, h) in histos.into_iter().enumerate() {
        if alive[k] {
            remap[k] = groups.len() as u16;
            groups.push(h);
        }
    }
    let symbols: Vec<u16> = owner.iter().map(|&o| remap[o]).collect();
    debug_assert!(symbols.iter().all(|&s| s != u16::MAX));

    HistogramImage {
        histograms: groups,
        symbols,
    }
}
