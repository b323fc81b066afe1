//! Lossless WebP (VP8L) encoding.
//!
//! Copyright (C) 2026 Imazen LLC
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU Affero General Public License as published
//! by the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! For commercial licensing inquiries: support@imazen.io
//!
//! This crate compresses BGRA rasters into RIFF/WebP files using the VP8L
//! lossless format: entropy analysis picks a transform regime, LZ77 backward
//! references and per-tile Huffman codes do the heavy lifting, and several
//! crunch configurations are encoded speculatively with the smallest stream
//! kept.
//!
//! # Encoding
//!
//! ```rust
//! use zenvp8l::{encode, PixelLayout, Profile, Unstoppable};
//!
//! let rgb = vec![0u8; 4 * 4 * 3]; // 4x4 black image
//! let webp = encode(&rgb, 4, 4, PixelLayout::Rgb8, &Profile::default(), &Unstoppable)?;
//! assert_eq!(&webp[0..4], b"RIFF");
//! # Ok::<(), zenvp8l::EncodeError>(())
//! ```
//!
//! # Palette quantization
//!
//! [`PaletteMap3D`] maps arbitrary colors to their nearest palette index in
//! O(1), for callers preparing palettized input:
//!
//! ```rust
//! use zenvp8l::PaletteMap3D;
//!
//! let palette = [0xff000000u32, 0xffffffffu32];
//! let map = PaletteMap3D::new(&palette);
//! let (index, color) = map.get_match(0xff202020);
//! assert_eq!((index, color), (0, 0xff000000));
//! ```
//!
//! # no_std Support
//!
//! Everything works in `no_std` environments (requires `alloc`); the `std`
//! feature (default) only adds the `std::io::Write` sink adapter.
//!
//! # Cancellation
//!
//! Encoding takes an [`enough::Stop`] token and checks it between crunch
//! sub-configurations; pass [`Unstoppable`] when cancellation is not needed.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

pub mod encoder;
/// 3-D palette lookup for O(1) nearest-index quantization queries.
pub mod palette_map;
/// Packed BGRA pixel helpers and input layouts.
pub mod pixel;
mod riff;
/// Byte sinks receiving the finished container.
pub mod sink;

pub use encoder::{encode, encode_into, EncodeError, Profile, MAX_DIMENSION};
pub use palette_map::PaletteMap3D;
pub use pixel::PixelLayout;
pub use sink::ByteSink;
#[cfg(feature = "std")]
pub use sink::IoSink;

// Cancellation token types, re-exported for caller convenience.
pub use enough::{Stop, StopReason, Unstoppable};
