//! RIFF/WebP container framing around the VP8L payload.

use byteorder_lite::{ByteOrder, LittleEndian};

use crate::encoder::bitsink::BitSink;
use crate::encoder::EncodeError;
use crate::sink::ByteSink;

/// VP8L chunk signature byte.
pub const VP8L_MAGIC_BYTE: u8 = 0x2f;

/// Frame a finished VP8L bit stream and write the whole file to `sink`.
///
/// The chunk size counts the signature byte; odd-sized chunks get a single
/// zero pad so the file length stays even. `stream` must be finished.
pub fn write_container<S: ByteSink>(sink: &mut S, stream: &BitSink) -> Result<(), EncodeError> {
    let vp8l_size = 1 + stream.num_bytes();
    let pad = vp8l_size & 1;
    let riff_size = 4 + 8 + vp8l_size + pad;

    let mut header = [0u8; 21];
    header[0..4].copy_from_slice(b"RIFF");
    LittleEndian::write_u32(&mut header[4..8], riff_size as u32);
    header[8..12].copy_from_slice(b"WEBP");
    header[12..16].copy_from_slice(b"VP8L");
    LittleEndian::write_u32(&mut header[16..20], vp8l_size as u32);
    header[20] = VP8L_MAGIC_BYTE;

    sink.write_all(&header)?;
    stream.write_to(sink)?;
    if pad == 1 {
        sink.write_all(&[0])?;
    }
    Ok(())
}
