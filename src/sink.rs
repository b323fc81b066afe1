//! Append-only byte sinks receiving the finished container.

use alloc::vec::Vec;

use crate::encoder::EncodeError;

/// Append-only output target for the RIFF container.
pub trait ByteSink {
    /// Append `data`; a failure aborts the encode and is surfaced unchanged.
    fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError>;
}

impl ByteSink for Vec<u8> {
    #[inline]
    fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Adapter wrapping any [`std::io::Write`] as a [`ByteSink`].
#[cfg(feature = "std")]
pub struct IoSink<W: std::io::Write>(
    /// The wrapped writer.
    pub W,
);

#[cfg(feature = "std")]
impl<W: std::io::Write> ByteSink for IoSink<W> {
    #[inline]
    fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        self.0.write_all(data)?;
        Ok(())
    }
}
