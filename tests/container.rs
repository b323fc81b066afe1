//! Container-level tests over the full encoding pipeline.
//!
//! There is no decoder in this crate, so these tests verify the emitted
//! RIFF/WebP framing and the VP8L header fields bit by bit, plus the
//! structural properties the format guarantees.

use zenvp8l::{encode, encode_into, EncodeError, PixelLayout, Profile, Unstoppable};

/// LSB-first bit reader over the VP8L payload (after the 0x2f signature).
struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read(&mut self, n: u32) -> u32 {
        let mut v = 0u32;
        for i in 0..n {
            let byte = self.bytes[self.pos / 8];
            v |= (((byte >> (self.pos % 8)) & 1) as u32) << i;
            self.pos += 1;
        }
        v
    }
}

fn le32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn encode_rgb(pixels: &[u8], w: u32, h: u32) -> Vec<u8> {
    encode(
        pixels,
        w,
        h,
        PixelLayout::Rgb8,
        &Profile::default(),
        &Unstoppable,
    )
    .expect("encoding failed")
}

/// Checks the RIFF framing invariants and returns the VP8L payload.
fn check_container(webp: &[u8], expected_w: u32, expected_h: u32) -> Vec<u8> {
    assert_eq!(&webp[0..4], b"RIFF");
    assert_eq!(&webp[8..12], b"WEBP");
    assert_eq!(&webp[12..16], b"VP8L");
    assert_eq!(webp[20], 0x2f, "VP8L signature byte");

    let riff_size = le32(&webp[4..8]) as usize;
    let vp8l_size = le32(&webp[16..20]) as usize;
    let pad = vp8l_size & 1;
    assert_eq!(riff_size, 4 + 8 + vp8l_size + pad);
    assert_eq!(webp.len(), 8 + riff_size);
    assert_eq!(webp.len() % 2, 0, "file length must be even");
    // vp8l_size counts the signature byte plus the stream bytes.
    assert_eq!(vp8l_size, 1 + (webp.len() - 21 - pad));

    let payload = webp[21..21 + vp8l_size - 1].to_vec();
    let mut r = BitReader::new(&payload);
    assert_eq!(r.read(14) + 1, expected_w);
    assert_eq!(r.read(14) + 1, expected_h);
    assert_eq!(r.read(1), 0, "alpha hint for RGB input");
    assert_eq!(r.read(3), 0, "VP8L version");
    payload
}

#[test]
fn single_red_pixel() {
    let webp = encode_rgb(&[255, 0, 0], 1, 1);
    let payload = check_container(&webp, 1, 1);
    let mut r = BitReader::new(&payload);
    r.read(32);
    // A single color always palettizes: one transform, color indexing,
    // palette size 1.
    assert_eq!(r.read(1), 1);
    assert_eq!(r.read(2), 3);
    assert_eq!(r.read(8), 0);
}

#[test]
fn solid_green_64x64_is_under_100_bytes() {
    let pixels: Vec<u8> = [0u8, 255, 0].repeat(64 * 64);
    let webp = encode_rgb(&pixels, 64, 64);
    check_container(&webp, 64, 64);
    assert!(webp.len() < 100, "solid image produced {} bytes", webp.len());
}

#[test]
fn checkerboard_palettizes_two_colors() {
    let mut pixels = Vec::with_capacity(8 * 8 * 3);
    for i in 0..64 {
        let v = if (i % 8 + i / 8) % 2 == 0 { 0u8 } else { 255 };
        pixels.extend_from_slice(&[v, v, v]);
    }
    let webp = encode_rgb(&pixels, 8, 8);
    let payload = check_container(&webp, 8, 8);
    let mut r = BitReader::new(&payload);
    r.read(32);
    assert_eq!(r.read(1), 1, "transform present");
    assert_eq!(r.read(2), 3, "color indexing");
    assert_eq!(r.read(8), 1, "palette size - 1");
}

#[test]
fn gradient_row_signals_predictor() {
    let mut pixels = Vec::with_capacity(256 * 3);
    for x in 0..256u32 {
        pixels.extend_from_slice(&[x as u8, 0, 0]);
    }
    let webp = encode_rgb(&pixels, 256, 1);
    let payload = check_container(&webp, 256, 1);
    let mut r = BitReader::new(&payload);
    r.read(32);
    assert_eq!(r.read(1), 1, "transform present");
    assert_eq!(r.read(2), 0, "predictor transform");
}

#[test]
fn noise_image_roundtrips_structurally() {
    // Deterministic xorshift noise, more than 256 distinct colors.
    let mut state = 0x2545F491u32;
    let mut pixels = Vec::with_capacity(32 * 32 * 3);
    for _ in 0..32 * 32 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        pixels.extend_from_slice(&[state as u8, (state >> 8) as u8, (state >> 16) as u8]);
    }
    let webp = encode_rgb(&pixels, 32, 32);
    let payload = check_container(&webp, 32, 32);
    let mut r = BitReader::new(&payload);
    r.read(32);
    if r.read(1) == 1 {
        assert_ne!(r.read(2), 3, "noise must not use the palette transform");
    }
}

#[test]
fn rgba_input_sets_alpha_hint() {
    let pixels: Vec<u8> = [10u8, 20, 30, 128].repeat(16);
    let webp = encode(
        &pixels,
        4,
        4,
        PixelLayout::Rgba8,
        &Profile::default(),
        &Unstoppable,
    )
    .unwrap();
    let mut r = BitReader::new(&webp[21..]);
    r.read(28);
    assert_eq!(r.read(1), 1, "alpha hint for RGBA input");
}

#[test]
fn output_is_deterministic() {
    let mut pixels = Vec::with_capacity(48 * 48 * 3);
    for i in 0..48 * 48u32 {
        pixels.extend_from_slice(&[(i % 251) as u8, (i % 83) as u8, (i % 7 * 31) as u8]);
    }
    let a = encode_rgb(&pixels, 48, 48);
    let b = encode_rgb(&pixels, 48, 48);
    assert_eq!(a, b);
}

#[test]
fn encode_into_matches_encode() {
    let pixels: Vec<u8> = [1u8, 2, 3].repeat(25);
    let direct = encode_rgb(&pixels, 5, 5);
    let mut sink = Vec::new();
    encode_into(
        &pixels,
        5,
        5,
        PixelLayout::Rgb8,
        &Profile::default(),
        &Unstoppable,
        &mut sink,
    )
    .unwrap();
    assert_eq!(direct, sink);
}

#[test]
fn wide_and_tall_strips_encode() {
    let wide: Vec<u8> = [7u8, 7, 7].repeat(300);
    check_container(&encode_rgb(&wide, 300, 1), 300, 1);
    let tall: Vec<u8> = [7u8, 7, 7].repeat(300);
    check_container(&encode_rgb(&tall, 1, 300), 1, 300);
}

#[test]
fn larger_textured_image_encodes() {
    // Mixed texture: flat regions, gradients and a repeating pattern, large
    // enough to exercise meta-Huffman tiling.
    let w = 96usize;
    let h = 96usize;
    let mut pixels = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = if y < h / 3 {
                (40u8, 90u8, 160u8)
            } else if y < 2 * h / 3 {
                (x as u8, (x / 2) as u8, (255 - x) as u8)
            } else {
                (((x ^ y) & 0xff) as u8, ((x * 3) & 0xff) as u8, ((y * 5) & 0xff) as u8)
            };
            pixels.extend_from_slice(&[r, g, b]);
        }
    }
    let webp = encode_rgb(&pixels, w as u32, h as u32);
    check_container(&webp, w as u32, h as u32);
    // Sanity: structured content should beat raw size comfortably.
    assert!(webp.len() < w * h * 3 / 2);
}

#[test]
fn invalid_inputs_are_rejected() {
    let profile = Profile::default();
    assert!(matches!(
        encode(&[], 0, 4, PixelLayout::Rgb8, &profile, &Unstoppable),
        Err(EncodeError::InvalidDimensions)
    ));
    assert!(matches!(
        encode(&[0; 11], 2, 2, PixelLayout::Rgb8, &profile, &Unstoppable),
        Err(EncodeError::InvalidBufferSize(_))
    ));
}
