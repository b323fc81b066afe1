//! Cost-model backward references (the Box strategy).
//!
//! A preliminary Standard pass seeds per-symbol bit estimates; a dynamic
//! program then re-decides literal/copy boundaries against those estimates.
//! Candidate copy lengths are restricted to prefix-code boundaries, which is
//! where the cost function actually changes.

use alloc::vec;
use alloc::vec::Vec;

use super::backward_refs::{distance_to_plane_code, BackwardRefs, PixOrCopy, MIN_LENGTH};
use super::hash_chain::HashChain;
use super::histogram::{Histogram, NUM_LITERAL_CODES};
use super::utils::{fast_log2, prefix_encode};
use crate::pixel::{bgra_alpha, bgra_blue, bgra_green, bgra_red};

/// First length/distance value of each prefix code.
const PREFIX_STARTS: [usize; 24] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073,
];

/// Per-symbol bit estimates derived from a histogram population.
fn counts_to_bit_estimates(counts: &[u32]) -> Vec<f64> {
    let total: u64 = counts.iter().map(|&c| c as u64).sum();
    let nonzeros = counts.iter().filter(|&&c| c > 0).count();
    if nonzeros <= 1 {
        return vec![0.0; counts.len()];
    }
    let log_total = libm::log2(total as f64);
    counts
        .iter()
        .map(|&c| (log_total - fast_log2(c)).max(0.0))
        .collect()
}

struct CostModel {
    literal: Vec<f64>,
    red: Vec<f64>,
    blue: Vec<f64>,
    alpha: Vec<f64>,
    distance: Vec<f64>,
}

impl CostModel {
    fn build(seed: &BackwardRefs) -> Self {
        let histo = Histogram::from_refs(seed, 0);
        Self {
            literal: counts_to_bit_estimates(&histo.literal),
            red: counts_to_bit_estimates(&histo.red),
            blue: counts_to_bit_estimates(&histo.blue),
            alpha: counts_to_bit_estimates(&histo.alpha),
            distance: counts_to_bit_estimates(&histo.distance),
        }
    }

    #[inline]
    fn literal_cost(&self, bgra: u32) -> f64 {
        self.alpha[bgra_alpha(bgra) as usize]
            + self.red[bgra_red(bgra) as usize]
            + self.literal[bgra_green(bgra) as usize]
            + self.blue[bgra_blue(bgra) as usize]
    }

    #[inline]
    fn length_cost(&self, len: usize) -> f64 {
        let (code, extra, _) = prefix_encode(len as u32);
        self.literal[NUM_LITERAL_CODES + code as usize] + extra as f64
    }

    #[inline]
    fn distance_cost(&self, dist_code: u32) -> f64 {
        let (code, extra, _) = prefix_encode(dist_code);
        self.distance[code as usize] + extra as f64
    }
}

/// Re-derive the token stream by shortest-path over estimated bit costs.
pub fn refs_box(bgra: &[u32], width: usize, chain: &HashChain, seed: &BackwardRefs) -> BackwardRefs {
    let n = bgra.len();
    if n == 0 {
        return BackwardRefs::default();
    }
    let model = CostModel::build(seed);

    let mut cost = vec![f64::INFINITY; n + 1];
    let mut from_len = vec![0u32; n + 1];
    let mut from_dist = vec![0u32; n + 1];
    cost[0] = 0.0;

    for i in 0..n {
        let base = cost[i];
        debug_assert!(base.is_finite());

        let lit = base + model.literal_cost(bgra[i]);
        if lit < cost[i + 1] {
            cost[i + 1] = lit;
            from_len[i + 1] = 1;
            from_dist[i + 1] = 0;
        }

        let (offset, max_len) = chain.find_copy(i);
        if offset > 0 && max_len >= MIN_LENGTH {
            let dist_code = distance_to_plane_code(width, offset);
            let copy_base = base + model.distance_cost(dist_code);
            let mut relax = |l: usize| {
                let c = copy_base + model.length_cost(l);
                if c < cost[i + l] {
                    cost[i + l] = c;
                    from_len[i + l] = l as u32;
                    from_dist[i + l] = dist_code;
                }
            };
            relax(max_len);
            for &start in PREFIX_STARTS.iter() {
                if start < MIN_LENGTH {
                    continue;
                }
                if start >= max_len {
                    break;
                }
                relax(start);
            }
        }
    }

    // Backtrack and reverse into scan order.
    let mut tokens_rev: Vec<PixOrCopy> = Vec::new();
    let mut pos = n;
    while pos > 0 {
        let l = from_len[pos] as usize;
        debug_assert!(l >= 1);
        if l == 1 && from_dist[pos] == 0 {
            tokens_rev.push(PixOrCopy::Literal(bgra[pos - 1]));
        } else {
            tokens_rev.push(PixOrCopy::Copy {
                len: l as u16,
                dist_code: from_dist[pos],
            });
        }
        pos -= l;
    }
    tokens_rev.reverse();
    BackwardRefs { tokens: tokens_rev }
}
