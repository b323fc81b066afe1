//! Crunch driver: transform signalling, speculative encoding, stream choice.
//!
//! Every crunch configuration is encoded into its own clone of the header
//! sink; only the smallest finished stream survives. Transform order in the
//! stream is color-indexing, subtract-green, predictor, cross-color, so the
//! decoder can undo them LIFO.

use alloc::vec::Vec;

use super::api::{EncodeError, Profile};
use super::backward_refs::{
    apply_color_cache, best_cache_bits, refs_rle, refs_standard, BackwardRefs, PixOrCopy,
    MAX_COLOR_CACHE_BITS,
};
use super::bitsink::BitSink;
use super::cost_model::refs_box;
use super::entropy::{analyze_entropy, EntropyIx};
use super::hash_chain::HashChain;
use super::histogram::{build_histogram_image, Histogram, NUM_LENGTH_CODES, NUM_LITERAL_CODES};
use super::huffman::{build_code_lengths, build_codes, store_huffman_code, HuffmanCode};
use super::palette::{apply_palette, find_palette, Palette};
use super::transforms::{
    apply_cross_color_transform, apply_predictor_transform, apply_subtract_green,
};
use super::utils::{bits_log2_floor, prefix_encode, sub_pixels, subsample_size};
use crate::pixel::{bgra_alpha, bgra_blue, bgra_green, bgra_red, make_bgra};

/// Transform type codes as they appear in the stream.
const TRANSFORM_PREDICTOR: u32 = 0;
const TRANSFORM_CROSS_COLOR: u32 = 1;
const TRANSFORM_SUBTRACT_GREEN: u32 = 2;
const TRANSFORM_COLOR_INDEXING: u32 = 3;

/// Cap on the entropy-image tile count.
const MAX_HUFF_IMAGE_SIZE: usize = 2600;
const MIN_HUFFMAN_BITS: u32 = 2;
const MAX_HUFFMAN_BITS: u32 = 9;
const MIN_TRANSFORM_BITS: u32 = 2;
const MAX_TRANSFORM_BITS: u32 = 8;
/// Cap on predictor/cross-color sub-image size.
const MAX_TRANSFORM_IMAGE_SIZE: usize = 1 << 14;

/// Raise `bits` until the subsampled image fits `image_size_max`, then lower
/// it while the grid stays a single cell.
fn clamp_bits(
    width: usize,
    height: usize,
    bits: u32,
    min_bits: u32,
    max_bits: u32,
    image_size_max: usize,
) -> u32 {
    let grid = |bits: u32| {
        subsample_size(width as u32, bits) as usize * subsample_size(height as u32, bits) as usize
    };
    let mut bits = bits.clamp(min_bits, max_bits);
    while bits < max_bits && grid(bits) > image_size_max {
        bits += 1;
    }
    while bits > min_bits && grid(bits - 1) == 1 {
        bits -= 1;
    }
    bits
}

/// Tile size bits for the entropy image, method-dependent.
fn get_histo_bits(width: usize, height: usize, method: u8) -> u32 {
    let histo_bits = (7i32 - method as i32).clamp(MIN_HUFFMAN_BITS as i32, MAX_HUFFMAN_BITS as i32);
    clamp_bits(
        width,
        height,
        histo_bits as u32,
        MIN_HUFFMAN_BITS,
        MAX_HUFFMAN_BITS,
        MAX_HUFF_IMAGE_SIZE,
    )
}

/// Tile size bits for the predictor and cross-color transforms.
fn get_transform_bits(method: u8, histo_bits: u32) -> u32 {
    let max_transform_bits = if method < 4 {
        6
    } else if method > 4 {
        4
    } else {
        5
    };
    histo_bits.min(max_transform_bits)
}

/// One LZ77 evaluation within a crunch configuration.
#[derive(Debug, Clone, Copy)]
struct SubConfig {
    /// Use the cost-model (Box) token stream instead of Standard/RLE.
    lz77_box: bool,
    /// Also evaluate the cache-free stream and keep the cheaper one.
    do_not_cache: bool,
}

/// A speculative encoding plan.
#[derive(Debug, Clone)]
struct CrunchConfig {
    entropy_ix: EntropyIx,
    subs: Vec<SubConfig>,
}

/// Fan out the crunch configurations for this profile and analysis result.
fn crunch_configs(
    profile: &Profile,
    entropy_ix: EntropyIx,
    palette: Option<&Palette>,
) -> Vec<CrunchConfig> {
    let subs = if palette.is_some_and(|p| p.len() <= 16) {
        alloc::vec![
            SubConfig {
                lz77_box: false,
                do_not_cache: false,
            },
            SubConfig {
                lz77_box: true,
                do_not_cache: true,
            },
        ]
    } else {
        alloc::vec![SubConfig {
            lz77_box: false,
            do_not_cache: false,
        }]
    };

    let mut configs = Vec::new();
    if profile.method == 6 && profile.quality == 100 {
        // Exhaustive sweep over every applicable regime.
        let mut modes = alloc::vec![
            EntropyIx::Direct,
            EntropyIx::Spatial,
            EntropyIx::SubGreen,
            EntropyIx::SpatialSubGreen,
        ];
        if palette.is_some() {
            modes.push(EntropyIx::Palette);
            modes.push(EntropyIx::PaletteAndSpatial);
        }
        for entropy_ix in modes {
            configs.push(CrunchConfig {
                entropy_ix,
                subs: subs.clone(),
            });
        }
    } else {
        configs.push(CrunchConfig {
            entropy_ix,
            subs: subs.clone(),
        });
        // When the palette won the analysis, also try it combined with the
        // predictor over the packed image.
        if profile.quality >= 75 && palette.is_some() && entropy_ix == EntropyIx::Palette {
            configs.push(CrunchConfig {
                entropy_ix: EntropyIx::PaletteAndSpatial,
                subs,
            });
        }
    }
    configs
}

/// Encode the VP8L bit stream (everything after the signature byte).
///
/// Returns the finished sink of the winning crunch iteration.
pub(crate) fn encode_stream(
    bgra: &[u32],
    width: usize,
    height: usize,
    has_alpha: bool,
    profile: &Profile,
    stop: &dyn enough::Stop,
) -> Result<BitSink, EncodeError> {
    let mut header = BitSink::with_capacity(width * height / 2 + 64);
    header.put_bits((width - 1) as u32, 14);
    header.put_bits((height - 1) as u32, 14);
    header.put_bit(has_alpha);
    header.put_bits(0, 3); // version

    let palette = find_palette(bgra);
    let (entropy_ix, red_and_blue_always_zero) = analyze_entropy(
        bgra,
        width,
        height,
        palette.is_some(),
        palette.as_ref().map_or(0, Palette::len),
    );
    let histo_bits = get_histo_bits(width, height, profile.method);
    let transform_bits = clamp_bits(
        width,
        height,
        get_transform_bits(profile.method, histo_bits),
        MIN_TRANSFORM_BITS,
        MAX_TRANSFORM_BITS,
        MAX_TRANSFORM_IMAGE_SIZE,
    );

    let mut best: Option<BitSink> = None;
    let mut bw = header.clone();
    for config in crunch_configs(profile, entropy_ix, palette.as_ref()) {
        for sub in &config.subs {
            stop.check()?;
            bw.reset_to(&header);
            encode_with_config(
                &mut bw,
                bgra,
                width,
                height,
                profile,
                config.entropy_ix,
                red_and_blue_always_zero,
                *sub,
                palette.as_ref(),
                histo_bits,
                transform_bits,
            );
            bw.finish();
            if best
                .as_ref()
                .is_none_or(|b| bw.num_bytes() < b.num_bytes())
            {
                best = Some(bw.clone());
            }
        }
    }
    Ok(best.expect("crunch fan-out always yields at least one stream"))
}

/// Apply one configuration's transforms, signal them, and code the image.
#[allow(clippy::too_many_arguments)]
fn encode_with_config(
    bw: &mut BitSink,
    bgra: &[u32],
    width: usize,
    height: usize,
    profile: &Profile,
    entropy_ix: EntropyIx,
    red_and_blue_always_zero: bool,
    sub: SubConfig,
    palette: Option<&Palette>,
    histo_bits: u32,
    transform_bits: u32,
) {
    let use_palette = matches!(entropy_ix, EntropyIx::Palette | EntropyIx::PaletteAndSpatial);
    let use_subtract_green =
        matches!(entropy_ix, EntropyIx::SubGreen | EntropyIx::SpatialSubGreen);
    let use_predictor = matches!(
        entropy_ix,
        EntropyIx::Spatial | EntropyIx::SpatialSubGreen | EntropyIx::PaletteAndSpatial
    );

    let mut work: Vec<u32>;
    let mut cur_width = width;
    let mut cache_bits_max = MAX_COLOR_CACHE_BITS;

    match palette.filter(|_| use_palette) {
        Some(pal) => {
            bw.put_bit(true);
            bw.put_bits(TRANSFORM_COLOR_INDEXING, 2);
            bw.put_bits((pal.len() - 1) as u32, 8);
            write_palette(bw, &pal.colors, profile);
            let (packed, packed_width) = apply_palette(bgra, width, height, pal);
            work = packed;
            cur_width = packed_width;
            cache_bits_max = bits_log2_floor(pal.len() as u32) + 1;
        }
        None => work = bgra.to_vec(),
    }

    if use_subtract_green && !use_palette {
        bw.put_bit(true);
        bw.put_bits(TRANSFORM_SUBTRACT_GREEN, 2);
        apply_subtract_green(&mut work);
    }

    if use_predictor {
        bw.put_bit(true);
        bw.put_bits(TRANSFORM_PREDICTOR, 2);
        bw.put_bits(transform_bits - 2, 3);
        let data = apply_predictor_transform(&mut work, cur_width, height, transform_bits);
        let tw = subsample_size(cur_width as u32, transform_bits) as usize;
        let th = subsample_size(height as u32, transform_bits) as usize;
        encode_image_no_huffman(bw, &data, tw, th, profile);
    }

    if use_predictor && !red_and_blue_always_zero && !use_palette {
        bw.put_bit(true);
        bw.put_bits(TRANSFORM_CROSS_COLOR, 2);
        bw.put_bits(transform_bits - 2, 3);
        let data = apply_cross_color_transform(&mut work, cur_width, height, transform_bits);
        let tw = subsample_size(cur_width as u32, transform_bits) as usize;
        let th = subsample_size(height as u32, transform_bits) as usize;
        encode_image_no_huffman(bw, &data, tw, th, profile);
    }

    bw.put_bit(false); // no more transforms

    encode_image(
        bw,
        &work,
        cur_width,
        height,
        cache_bits_max,
        histo_bits,
        profile,
        sub,
    );
}

/// Differentially code the palette and store it as a one-row image.
fn write_palette(bw: &mut BitSink, colors: &[u32], profile: &Profile) {
    let mut deltas = Vec::with_capacity(colors.len());
    let mut prev = 0u32;
    for &color in colors {
        deltas.push(sub_pixels(color, prev));
        prev = color;
    }
    encode_image_no_huffman(bw, &deltas, deltas.len(), 1, profile);
}

/// Canonical codes plus emission metadata for one symbol population.
struct TableCodes {
    lengths: Vec<u8>,
    codes: Vec<HuffmanCode>,
    /// At most one used symbol: the decoder assigns it a zero-bit code.
    trivial: bool,
}

impl TableCodes {
    fn build(freqs: &[u32]) -> Self {
        let lengths = build_code_lengths(freqs, super::huffman::MAX_CODE_LENGTH);
        let codes = build_codes(&lengths);
        let trivial = lengths.iter().filter(|&&l| l > 0).count() <= 1;
        Self {
            lengths,
            codes,
            trivial,
        }
    }

    #[inline]
    fn emit(&self, bw: &mut BitSink, symbol: usize) {
        if !self.trivial {
            let c = self.codes[symbol];
            bw.put_bits(c.code as u32, c.length as u32);
        }
    }
}

/// The five code tables of one meta group.
struct CodeGroup {
    literal: TableCodes,
    red: TableCodes,
    blue: TableCodes,
    alpha: TableCodes,
    distance: TableCodes,
}

impl CodeGroup {
    fn build(histo: &Histogram) -> Self {
        Self {
            literal: TableCodes::build(&histo.literal),
            red: TableCodes::build(&histo.red),
            blue: TableCodes::build(&histo.blue),
            alpha: TableCodes::build(&histo.alpha),
            distance: TableCodes::build(&histo.distance),
        }
    }

    fn store(&self, bw: &mut BitSink) {
        store_huffman_code(bw, &self.literal.lengths);
        store_huffman_code(bw, &self.red.lengths);
        store_huffman_code(bw, &self.blue.lengths);
        store_huffman_code(bw, &self.alpha.lengths);
        store_huffman_code(bw, &self.distance.lengths);
    }
}

/// Emit the token stream, selecting the code group per tile when meta coding
/// is active.
fn write_tokens(
    bw: &mut BitSink,
    refs: &BackwardRefs,
    width: usize,
    histo_bits: u32,
    meta: Option<(&[u16], usize)>,
    groups: &[CodeGroup],
) {
    let mut x = 0usize;
    let mut y = 0usize;
    for token in refs.iter() {
        let group = match meta {
            Some((symbols, tiles_x)) => {
                let tile = (y >> histo_bits) * tiles_x + (x >> histo_bits);
                &groups[symbols[tile] as usize]
            }
            None => &groups[0],
        };
        match *token {
            PixOrCopy::Literal(pix) => {
                group.literal.emit(bw, bgra_green(pix) as usize);
                group.red.emit(bw, bgra_red(pix) as usize);
                group.blue.emit(bw, bgra_blue(pix) as usize);
                group.alpha.emit(bw, bgra_alpha(pix) as usize);
            }
            PixOrCopy::CacheIdx(idx) => {
                group
                    .literal
                    .emit(bw, NUM_LITERAL_CODES + NUM_LENGTH_CODES + idx as usize);
            }
            PixOrCopy::Copy { len, dist_code } => {
                let (len_code, len_extra_count, len_extra) = prefix_encode(len as u32);
                group.literal.emit(bw, NUM_LITERAL_CODES + len_code as usize);
                if len_extra_count > 0 {
                    bw.put_bits(len_extra, len_extra_count);
                }
                let (dist_prefix, dist_extra_count, dist_extra) = prefix_encode(dist_code);
                group.distance.emit(bw, dist_prefix as usize);
                if dist_extra_count > 0 {
                    bw.put_bits(dist_extra, dist_extra_count);
                }
            }
        }
        x += token.length();
        while x >= width {
            x -= width;
            y += 1;
        }
    }
}

/// Entropy-coded image for sub-images: no color cache, a single code group.
fn encode_image_no_huffman(
    bw: &mut BitSink,
    bgra: &[u32],
    width: usize,
    height: usize,
    profile: &Profile,
) {
    debug_assert_eq!(bgra.len(), width * height);
    let chain = HashChain::new(bgra, profile, width);
    let std_refs = refs_standard(bgra, width, &chain);
    let rle_refs = refs_rle(bgra, width);
    let std_histo = Histogram::from_refs(&std_refs, 0);
    let rle_histo = Histogram::from_refs(&rle_refs, 0);
    let (refs, histo) = if rle_histo.estimate_bits() < std_histo.estimate_bits() {
        (rle_refs, rle_histo)
    } else {
        (std_refs, std_histo)
    };

    bw.put_bit(false); // no color cache
    let group = CodeGroup::build(&histo);
    group.store(bw);
    write_tokens(bw, &refs, width, 0, None, core::slice::from_ref(&group));
}

/// Spatially-coded main image: cache decision, meta groups, trees, tokens.
#[allow(clippy::too_many_arguments)]
fn encode_image(
    bw: &mut BitSink,
    bgra: &[u32],
    width: usize,
    height: usize,
    cache_bits_max: u32,
    histo_bits: u32,
    profile: &Profile,
    sub: SubConfig,
) {
    let chain = HashChain::new(bgra, profile, width);

    let base = if sub.lz77_box {
        let seed = refs_standard(bgra, width, &chain);
        refs_box(bgra, width, &chain, &seed)
    } else {
        let std_refs = refs_standard(bgra, width, &chain);
        let rle_refs = refs_rle(bgra, width);
        let std_cost = Histogram::from_refs(&std_refs, 0).estimate_bits();
        let rle_cost = Histogram::from_refs(&rle_refs, 0).estimate_bits();
        if rle_cost < std_cost {
            rle_refs
        } else {
            std_refs
        }
    };
    debug_assert_eq!(base.pixel_count(), width * height);

    let mut cache_bits = best_cache_bits(&base, bgra, cache_bits_max);
    if sub.do_not_cache && cache_bits > 0 {
        let cached_cost =
            Histogram::from_refs(&apply_color_cache(&base, bgra, cache_bits), cache_bits)
                .estimate_bits();
        let plain_cost = Histogram::from_refs(&base, 0).estimate_bits();
        if plain_cost <= cached_cost {
            cache_bits = 0;
        }
    }
    let refs = if cache_bits > 0 {
        apply_color_cache(&base, bgra, cache_bits)
    } else {
        base
    };

    if cache_bits > 0 {
        bw.put_bit(true);
        bw.put_bits(cache_bits, 4);
    } else {
        bw.put_bit(false);
    }

    let image = build_histogram_image(
        &refs,
        width,
        height,
        histo_bits,
        cache_bits,
        profile.max_histo_groups(),
    );

    let meta = if image.histograms.len() > 1 {
        bw.put_bit(true);
        bw.put_bits(histo_bits - 2, 3);
        let tiles_x = subsample_size(width as u32, histo_bits) as usize;
        let tiles_y = subsample_size(height as u32, histo_bits) as usize;
        let sym_pixels: Vec<u32> = image
            .symbols
            .iter()
            .map(|&s| make_bgra(0, (s >> 8) as u8, (s & 0xff) as u8, 0))
            .collect();
        encode_image_no_huffman(bw, &sym_pixels, tiles_x, tiles_y, profile);
        Some((image.symbols.as_slice(), tiles_x))
    } else {
        bw.put_bit(false);
        None
    };

    let groups: Vec<CodeGroup> = image.histograms.iter().map(CodeGroup::build).collect();
    for group in &groups {
        group.store(bw);
    }
    write_tokens(bw, &refs, width, histo_bits, meta, &groups);
}
