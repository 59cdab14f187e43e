//! Header probing for variable-length receives.
//!
//! A transport that must size its destination buffer before reading a
//! message pulls the fixed-size tag-length prefix first, then the header
//! remainder, and learns the total frame length from it without running
//! a full decoder. This mirrors the typed-buffer convention that every
//! message starts with one top-level frame header.

use crate::error::{BlobError, Result};
use crate::header::{header_len, parse_header, LengthMode, MAX_TAG_LEN};

/// Size of the fixed prefix a transport reads first: the `tag_len` word.
pub const PREFIX_LEN: usize = 4;

/// Bytes remaining in the header once the 4-byte prefix is in hand.
pub fn rest_len(mode: LengthMode, prefix: [u8; PREFIX_LEN]) -> Result<usize> {
    let tag_len = u32::from_ne_bytes(prefix) as usize;
    if tag_len > MAX_TAG_LEN {
        return Err(BlobError::TagTooLong {
            len: tag_len,
            max: MAX_TAG_LEN,
        });
    }
    Ok(header_len(mode, tag_len) - PREFIX_LEN)
}

/// Total frame length (header included) from a complete header.
pub fn total_len(mode: LengthMode, head: &[u8]) -> Result<u64> {
    Ok(parse_header(mode, head)?.byte_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{BlobWriter, MemSink};

    #[test]
    fn probe_recovers_total_length() {
        for mode in [LengthMode::Natural, LengthMode::Padded8] {
            let mut writer = BlobWriter::new(MemSink::default(), mode);
            writer.put_start("vis.chunk", 2).unwrap();
            writer.put(123i64).unwrap();
            writer.put_slice(&[1.0f32, 2.0, 3.0]).unwrap();
            writer.put_end().unwrap();
            let bytes = writer.into_sink().into_bytes();

            let mut prefix = [0u8; PREFIX_LEN];
            prefix.copy_from_slice(&bytes[..PREFIX_LEN]);
            let rest = rest_len(mode, prefix).unwrap();
            let total = total_len(mode, &bytes[..PREFIX_LEN + rest]).unwrap();
            assert_eq!(total, bytes.len() as u64);
        }
    }

    #[test]
    fn probe_rejects_garbage_prefix() {
        let prefix = (u32::MAX).to_ne_bytes();
        assert!(matches!(
            rest_len(LengthMode::Natural, prefix),
            Err(BlobError::TagTooLong { .. })
        ));
    }
}
