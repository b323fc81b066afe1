//! Decorrelating transforms: subtract-green, spatial prediction, cross-color.
//!
//! All transforms mutate the pixel buffer in place and must mirror the
//! decoder's inverse arithmetic exactly; prediction runs in reverse scan
//! order so neighbor reads still see the values the decoder will have
//! reconstructed.

use alloc::vec;
use alloc::vec::Vec;

use super::utils::subsample_size;
use crate::pixel::{bgra_alpha, bgra_blue, bgra_green, bgra_red, make_bgra};

/// The 14 spatial predictor modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PredictorMode {
    Black = 0,
    Left = 1,
    Top = 2,
    TopRight = 3,
    TopLeft = 4,
    AvgAvgLtrT = 5,
    AvgLTl = 6,
    AvgLT = 7,
    AvgTlT = 8,
    AvgTTr = 9,
    AvgAvgLTlAvgTTr = 10,
    Select = 11,
    ClampAddSubtractFull = 12,
    ClampAddSubtractHalf = 13,
}

impl PredictorMode {
    /// All modes, in code order.
    pub const fn all() -> [PredictorMode; 14] {
        use PredictorMode::*;
        [
            Black, Left, Top, TopRight, TopLeft, AvgAvgLtrT, AvgLTl, AvgLT, AvgTlT, AvgTTr,
            AvgAvgLTlAvgTTr, Select, ClampAddSubtractFull, ClampAddSubtractHalf,
        ]
    }

    const fn from_u8(val: u8) -> Self {
        use PredictorMode::*;
        match val {
            0 => Black,
            1 => Left,
            2 => Top,
            3 => TopRight,
            4 => TopLeft,
            5 => AvgAvgLtrT,
            6 => AvgLTl,
            7 => AvgLT,
            8 => AvgTlT,
            9 => AvgTTr,
            10 => AvgAvgLTlAvgTTr,
            11 => Select,
            12 => ClampAddSubtractFull,
            _ => ClampAddSubtractHalf,
        }
    }
}

/// Subtract the green channel from red and blue, in place.
pub fn apply_subtract_green(pixels: &mut [u32]) {
    for pixel in pixels.iter_mut() {
        let g = bgra_green(*pixel);
        let r = bgra_red(*pixel).wrapping_sub(g);
        let b = bgra_blue(*pixel).wrapping_sub(g);
        *pixel = make_bgra(bgra_alpha(*pixel), r, g, b);
    }
}

#[inline]
fn average2(a: u32, b: u32) -> u32 {
    let aa = (bgra_alpha(a) as u16 + bgra_alpha(b) as u16) / 2;
    let ar = (bgra_red(a) as u16 + bgra_red(b) as u16) / 2;
    let ag = (bgra_green(a) as u16 + bgra_green(b) as u16) / 2;
    let ab = (bgra_blue(a) as u16 + bgra_blue(b) as u16) / 2;
    make_bgra(aa as u8, ar as u8, ag as u8, ab as u8)
}

/// Gradient selector; ties pick `top`, matching the decoder.
#[inline]
fn select(left: u32, top: u32, top_left: u32) -> u32 {
    let sum_abs = |p: u32, q: u32| -> u16 {
        (bgra_alpha(p) as i16 - bgra_alpha(q) as i16).unsigned_abs()
            + (bgra_red(p) as i16 - bgra_red(q) as i16).unsigned_abs()
            + (bgra_green(p) as i16 - bgra_green(q) as i16).unsigned_abs()
            + (bgra_blue(p) as i16 - bgra_blue(q) as i16).unsigned_abs()
    };
    let predict_left = sum_abs(top, top_left);
    let predict_top = sum_abs(left, top_left);
    if predict_left < predict_top {
        left
    } else {
        top
    }
}

#[inline]
fn clamp_add_subtract_full(left: u32, top: u32, top_left: u32) -> u32 {
    let comp = |l: u8, t: u8, tl: u8| -> u8 {
        (l as i16 + t as i16 - tl as i16).clamp(0, 255) as u8
    };
    make_bgra(
        comp(bgra_alpha(left), bgra_alpha(top), bgra_alpha(top_left)),
        comp(bgra_red(left), bgra_red(top), bgra_red(top_left)),
        comp(bgra_green(left), bgra_green(top), bgra_green(top_left)),
        comp(bgra_blue(left), bgra_blue(top), bgra_blue(top_left)),
    )
}

#[inline]
fn clamp_add_subtract_half(left: u32, top: u32, top_left: u32) -> u32 {
    let comp = |l: u8, t: u8, tl: u8| -> u8 {
        let avg = (l as i16 + t as i16) / 2;
        (avg + (avg - tl as i16) / 2).clamp(0, 255) as u8
    };
    make_bgra(
        comp(bgra_alpha(left), bgra_alpha(top), bgra_alpha(top_left)),
        comp(bgra_red(left), bgra_red(top), bgra_red(top_left)),
        comp(bgra_green(left), bgra_green(top), bgra_green(top_left)),
        comp(bgra_blue(left), bgra_blue(top), bgra_blue(top_left)),
    )
}

/// Predict one pixel from its causal neighbors under `mode`.
#[inline]
fn predict(mode: PredictorMode, left: u32, top: u32, top_left: u32, top_right: u32) -> u32 {
    use PredictorMode::*;
    match mode {
        Black => 0xff000000,
        Left => left,
        Top => top,
        TopRight => top_right,
        TopLeft => top_left,
        AvgAvgLtrT => average2(average2(left, top_right), top),
        AvgLTl => average2(left, top_left),
        AvgLT => average2(left, top),
        AvgTlT => average2(top_left, top),
        AvgTTr => average2(top, top_right),
        AvgAvgLTlAvgTTr => average2(average2(left, top_left), average2(top, top_right)),
        Select => select(left, top, top_left),
        ClampAddSubtractFull => clamp_add_subtract_full(left, top, top_left),
        ClampAddSubtractHalf => clamp_add_subtract_half(left, top, top_left),
    }
}

/// Per-channel wrapping `pixel - prediction`.
#[inline]
fn residual(pixel: u32, pred: u32) -> u32 {
    super::utils::sub_pixels(pixel, pred)
}

/// Causal neighbors of `(x, y)`; `y > 0`, `x > 0`.
///
/// At the right edge, top-right reads the first pixel of the current row,
/// which is the value the decoder has reconstructed at that memory offset.
#[inline]
fn neighbors(pixels: &[u32], width: usize, x: usize, y: usize) -> (u32, u32, u32, u32) {
    let left = pixels[y * width + x - 1];
    let top = pixels[(y - 1) * width + x];
    let top_left = pixels[(y - 1) * width + x - 1];
    let top_right = if x + 1 < width {
        pixels[(y - 1) * width + x + 1]
    } else {
        pixels[y * width]
    };
    (left, top, top_left, top_right)
}

/// Pick the mode with the smallest summed absolute residual over the tile's
/// interior pixels. Border pixels use fixed predictors and do not vote.
fn choose_best_predictor(
    pixels: &[u32],
    width: usize,
    height: usize,
    tx: usize,
    ty: usize,
    tile_size: usize,
) -> PredictorMode {
    let x_start = (tx * tile_size).max(1);
    let y_start = (ty * tile_size).max(1);
    let x_end = (tx * tile_size + tile_size).min(width);
    let y_end = (ty * tile_size + tile_size).min(height);
    if x_start >= x_end || y_start >= y_end {
        return PredictorMode::Top;
    }

    let mut best_mode = PredictorMode::Top;
    let mut best_score = u64::MAX;
    for mode in PredictorMode::all() {
        let mut score = 0u64;
        for y in y_start..y_end {
            for x in x_start..x_end {
                let (left, top, top_left, top_right) = neighbors(pixels, width, x, y);
                let pred = predict(mode, left, top, top_left, top_right);
                let res = residual(pixels[y * width + x], pred);
                score += abs_residual(bgra_alpha(res)) as u64
                    + abs_residual(bgra_red(res)) as u64
                    + abs_residual(bgra_green(res)) as u64
                    + abs_residual(bgra_blue(res)) as u64;
            }
        }
        if score < best_score {
            best_score = score;
            best_mode = mode;
        }
    }
    best_mode
}

/// Wrapped magnitude of a residual byte.
#[inline]
fn abs_residual(v: u8) -> u16 {
    (v as u16).min(256 - v as u16)
}

/// Apply the predictor transform in place.
///
/// Returns the mode sub-image: one pixel per tile with the mode in the green
/// channel. Border rules match the decoder: the corner predicts black, the
/// first row predicts left, the first column predicts top.
pub fn apply_predictor_transform(
    pixels: &mut [u32],
    width: usize,
    height: usize,
    pred_bits: u32,
) -> Vec<u32> {
    let tile_size = 1usize << pred_bits;
    let tiles_x = subsample_size(width as u32, pred_bits) as usize;
    let tiles_y = subsample_size(height as u32, pred_bits) as usize;

    let mut modes = vec![0u32; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mode = choose_best_predictor(pixels, width, height, tx, ty, tile_size);
            modes[ty * tiles_x + tx] = make_bgra(0xff, 0, mode as u8, 0);
        }
    }

    for y in (0..height).rev() {
        for x in (0..width).rev() {
            let pred = if x == 0 && y == 0 {
                0xff000000
            } else if y == 0 {
                pixels[x - 1]
            } else if x == 0 {
                pixels[(y - 1) * width]
            } else {
                let tile = (y >> pred_bits) * tiles_x + (x >> pred_bits);
                let mode = PredictorMode::from_u8(bgra_green(modes[tile]));
                let (left, top, top_left, top_right) = neighbors(pixels, width, x, y);
                predict(mode, left, top, top_left, top_right)
            };
            pixels[y * width + x] = residual(pixels[y * width + x], pred);
        }
    }
    modes
}

/// Signed multipliers of the cross-color transform, stored as raw bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Multipliers {
    green_to_red: u8,
    green_to_blue: u8,
    red_to_blue: u8,
}

/// Fixed-point contribution of multiplier `t` applied to channel byte `c`.
#[inline]
fn color_transform_delta(t: u8, c: u8) -> i32 {
    ((t as i8 as i32) * (c as i8 as i32)) >> 5
}

#[inline]
fn transform_red(green_to_red: u8, pix: u32) -> u8 {
    (bgra_red(pix) as i32 - color_transform_delta(green_to_red, bgra_green(pix))) as u8
}

#[inline]
fn transform_blue(green_to_blue: u8, red_to_blue: u8, pix: u32) -> u8 {
    (bgra_blue(pix) as i32
        - color_transform_delta(green_to_blue, bgra_green(pix))
        - color_transform_delta(red_to_blue, bgra_red(pix))) as u8
}

/// Halving-step search: refine one multiplier against an error functional.
fn search_multiplier(mut err: impl FnMut(u8) -> u64) -> u8 {
    let mut best = 0i32;
    let mut best_err = err(0);
    let mut delta = 32i32;
    while delta >= 1 {
        for cand in [best - delta, best + delta] {
            let byte = (cand & 0xff) as u8;
            let e = err(byte);
            if e < best_err {
                best_err = e;
                best = cand;
            }
        }
        delta >>= 1;
    }
    (best & 0xff) as u8
}

fn tile_bounds(
    width: usize,
    height: usize,
    tx: usize,
    ty: usize,
    tile_size: usize,
) -> (usize, usize, usize, usize) {
    let x_start = tx * tile_size;
    let y_start = ty * tile_size;
    (
        x_start,
        y_start,
        (x_start + tile_size).min(width),
        (y_start + tile_size).min(height),
    )
}

/// Apply the cross-color transform in place.
///
/// Returns the multiplier sub-image: `0xff << 24 | r2b << 16 | g2b << 8 |
/// g2r` per tile.
pub fn apply_cross_color_transform(
    pixels: &mut [u32],
    width: usize,
    height: usize,
    cc_bits: u32,
) -> Vec<u32> {
    let tile_size = 1usize << cc_bits;
    let tiles_x = subsample_size(width as u32, cc_bits) as usize;
    let tiles_y = subsample_size(height as u32, cc_bits) as usize;
    let mut data = vec![0u32; tiles_x * tiles_y];

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, y0, x1, y1) = tile_bounds(width, height, tx, ty, tile_size);

            let green_to_red = search_multiplier(|t| {
                let mut e = 0u64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        e += abs_residual(transform_red(t, pixels[y * width + x])) as u64;
                    }
                }
                e
            });
            let green_to_blue = search_multiplier(|t| {
                let mut e = 0u64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        e += abs_residual(transform_blue(t, 0, pixels[y * width + x])) as u64;
                    }
                }
                e
            });
            let red_to_blue = search_multiplier(|t| {
                let mut e = 0u64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        e += abs_residual(transform_blue(green_to_blue, t, pixels[y * width + x]))
                            as u64;
                    }
                }
                e
            });

            let m = Multipliers {
                green_to_red,
                green_to_blue,
                red_to_blue,
            };
            data[ty * tiles_x + tx] = 0xff000000
                | (m.red_to_blue as u32) << 16
                | (m.green_to_blue as u32) << 8
                | m.green_to_red as u32;

            for y in y0..y1 {
                for x in x0..x1 {
                    let pix = pixels[y * width + x];
                    let new_red = transform_red(m.green_to_red, pix);
                    let new_blue = transform_blue(m.green_to_blue, m.red_to_blue, pix);
                    pixels[y * width + x] =
                        make_bgra(bgra_alpha(pix), new_red, bgra_green(pix), new_blue);
                }
            }
        }
    }
    data
}
