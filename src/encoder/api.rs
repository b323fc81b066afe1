//! Public encoding surface: errors, profile and entry points.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use thiserror::Error;

use crate::pixel::PixelLayout;
use crate::riff;
use crate::sink::ByteSink;

/// Largest width or height the format can express.
pub const MAX_DIMENSION: u32 = 16384;

/// Error that can occur during encoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// An IO error from the output sink.
    #[cfg(feature = "std")]
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Width or height is zero or exceeds [`MAX_DIMENSION`].
    #[error("Invalid dimensions")]
    InvalidDimensions,

    /// The input buffer does not match `width * height * bytes_per_pixel`.
    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(String),

    /// Encoding was cancelled via a [`enough::Stop`] token.
    #[error("Encoding cancelled: {0}")]
    Cancelled(enough::StopReason),
}

impl From<enough::StopReason> for EncodeError {
    fn from(reason: enough::StopReason) -> Self {
        Self::Cancelled(reason)
    }
}

/// Speed/size trade-off knobs.
///
/// The encoder is tuned for the default `quality = 75`, `method = 4`
/// profile; other values change search effort and the crunch fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    /// Quality 0-100.
    pub quality: u8,
    /// Method 0-6.
    pub method: u8,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            quality: 75,
            method: 4,
        }
    }
}

impl Profile {
    /// Hash-chain traversal budget per position.
    pub fn max_chain_iters(&self) -> usize {
        8 + (self.quality as usize * self.quality as usize) / 128
    }

    /// Match-search window, narrowed at lower qualities.
    pub fn window_size(&self, width: usize) -> usize {
        let max = if self.quality > 75 {
            super::hash_chain::WINDOW_SIZE
        } else if self.quality > 50 {
            width << 8
        } else if self.quality > 25 {
            width << 6
        } else {
            width << 4
        };
        max.min(super::hash_chain::WINDOW_SIZE)
    }

    /// Meta-Huffman group budget for tile clustering.
    pub(crate) fn max_histo_groups(&self) -> usize {
        if self.quality > 90 {
            256
        } else if self.quality > 75 {
            64
        } else if self.quality > 50 {
            16
        } else {
            4
        }
    }
}

/// Encode `pixels` as a complete RIFF/WebP lossless file.
pub fn encode(
    pixels: &[u8],
    width: u32,
    height: u32,
    layout: PixelLayout,
    profile: &Profile,
    stop: &dyn enough::Stop,
) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    encode_into(pixels, width, height, layout, profile, stop, &mut out)?;
    Ok(out)
}

/// Encode `pixels` and append the RIFF/WebP file to `sink`.
///
/// On failure the sink may retain bytes written before the error; it is not
/// rewound.
pub fn encode_into<S: ByteSink>(
    pixels: &[u8],
    width: u32,
    height: u32,
    layout: PixelLayout,
    profile: &Profile,
    stop: &dyn enough::Stop,
    sink: &mut S,
) -> Result<(), EncodeError> {
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(EncodeError::InvalidDimensions);
    }
    let w = width as usize;
    let h = height as usize;
    let bpp = layout.bytes_per_pixel();
    let expected = w * h * bpp;
    if pixels.len() != expected {
        return Err(EncodeError::InvalidBufferSize(format!(
            "expected {} bytes, got {}",
            expected,
            pixels.len()
        )));
    }

    let bgra: Vec<u32> = pixels
        .chunks_exact(bpp)
        .map(|sample| layout.to_bgra32(sample))
        .collect();

    let stream = super::encode::encode_stream(&bgra, w, h, layout.has_alpha(), profile, stop)?;
    riff::write_container(sink, &stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_dimensions() {
        let profile = Profile::default();
        assert!(matches!(
            encode(&[], 0, 1, PixelLayout::Rgb8, &profile, &enough::Unstoppable),
            Err(EncodeError::InvalidDimensions)
        ));
        assert!(matches!(
            encode(&[], 20000, 1, PixelLayout::Rgb8, &profile, &enough::Unstoppable),
            Err(EncodeError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_rejects_short_buffer() {
        let profile = Profile::default();
        let result = encode(&[0u8; 5], 2, 2, PixelLayout::Rgb8, &profile, &enough::Unstoppable);
        assert!(matches!(result, Err(EncodeError::InvalidBufferSize(_))));
    }

    #[test]
    fn test_profile_budgets_scale_with_quality() {
        let fast = Profile {
            quality: 20,
            method: 4,
        };
        let slow = Profile {
            quality: 100,
            method: 6,
        };
        assert!(fast.max_chain_iters() < slow.max_chain_iters());
        assert!(fast.window_size(1000) < slow.window_size(1000));
        assert!(fast.max_histo_groups() < slow.max_histo_groups());
    }
}
