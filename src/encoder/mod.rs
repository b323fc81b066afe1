//! Lossless (VP8L) encoding pipeline.
//!
//! Leaf-first: bit sink and shared helpers, then Huffman construction, the
//! LZ77 machinery, histograms and transforms, with the crunch driver in
//! [`encode`] tying the stages together.

pub mod api;
mod backward_refs;
pub(crate) mod bitsink;
mod color_cache;
mod cost_model;
mod encode;
mod entropy;
mod hash_chain;
mod histogram;
mod huffman;
mod palette;
mod transforms;
mod utils;

pub use api::{encode, encode_into, EncodeError, Profile, MAX_DIMENSION};
