use crate::error::{BlobError, Result};

/// Maximum type tag length in bytes.
pub const MAX_TAG_LEN: usize = 256;

/// Width and padding of the `byte_length` header field.
///
/// Fixed once per stream instance; both ends must agree out-of-band, the
/// mode is not encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthMode {
    /// `byte_length` is a u32 and the header is packed.
    ///
    /// ```text
    /// ┌──────────────┬────────────┬──────────┬──────────────┐
    /// │ tag_len (4B) │ tag bytes  │ ver (4B) │ length (4B)  │
    /// └──────────────┴────────────┴──────────┴──────────────┘
    /// ```
    #[default]
    Natural,
    /// `byte_length` widens to u64 and the header pads with zero bytes to
    /// the next 8-byte multiple, so every header is 8-aligned.
    Padded8,
}

/// Total header size for a tag of `tag_len` bytes under `mode`.
///
/// `byte_length` covers this header (padding included) plus the body.
pub fn header_len(mode: LengthMode, tag_len: usize) -> usize {
    match mode {
        LengthMode::Natural => 4 + tag_len + 4 + 4,
        LengthMode::Padded8 => (4 + tag_len + 4 + 8).next_multiple_of(8),
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub tag: String,
    pub version: i32,
    /// Total frame length, header included.
    pub byte_length: u64,
    /// Bytes the header itself occupies.
    pub header_len: usize,
}

/// Parse a frame header from the front of `data`.
pub fn parse_header(mode: LengthMode, data: &[u8]) -> Result<FrameHeader> {
    let tag_len = read_u32(data, 0)? as usize;
    if tag_len > MAX_TAG_LEN {
        return Err(BlobError::TagTooLong {
            len: tag_len,
            max: MAX_TAG_LEN,
        });
    }

    let header_len = header_len(mode, tag_len);
    if data.len() < header_len {
        return Err(BlobError::Truncated {
            needed: header_len,
            available: data.len(),
        });
    }

    let tag = std::str::from_utf8(&data[4..4 + tag_len])
        .map_err(|_| BlobError::InvalidString)?
        .to_string();
    let version = read_u32(data, 4 + tag_len)? as i32;
    let length_at = 4 + tag_len + 4;
    let byte_length = match mode {
        LengthMode::Natural => u64::from(read_u32(data, length_at)?),
        LengthMode::Padded8 => read_u64(data, length_at)?,
    };

    Ok(FrameHeader {
        tag,
        version,
        byte_length,
        header_len,
    })
}

pub(crate) fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    let end = at + 4;
    if data.len() < end {
        return Err(BlobError::Truncated {
            needed: end,
            available: data.len(),
        });
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[at..end]);
    Ok(u32::from_ne_bytes(raw))
}

pub(crate) fn read_u64(data: &[u8], at: usize) -> Result<u64> {
    let end = at + 8;
    if data.len() < end {
        return Err(BlobError::Truncated {
            needed: end,
            available: data.len(),
        });
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[at..end]);
    Ok(u64::from_ne_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_header_len_is_packed() {
        assert_eq!(header_len(LengthMode::Natural, 0), 12);
        assert_eq!(header_len(LengthMode::Natural, 7), 19);
    }

    #[test]
    fn padded8_header_len_is_8_aligned() {
        for tag_len in 0..64 {
            let len = header_len(LengthMode::Padded8, tag_len);
            assert_eq!(len % 8, 0, "tag_len {tag_len} gave header_len {len}");
            assert!(len >= 16 + tag_len);
        }
    }

    #[test]
    fn parse_rejects_oversized_tag() {
        let mut data = Vec::new();
        data.extend_from_slice(&(4096u32).to_ne_bytes());
        data.extend_from_slice(&[0u8; 32]);
        let err = parse_header(LengthMode::Natural, &data).unwrap_err();
        assert!(matches!(err, BlobError::TagTooLong { len: 4096, .. }));
    }

    #[test]
    fn parse_rejects_truncated_header() {
        let mut data = Vec::new();
        data.extend_from_slice(&(8u32).to_ne_bytes());
        data.extend_from_slice(b"too-shor");
        let err = parse_header(LengthMode::Natural, &data).unwrap_err();
        assert!(matches!(err, BlobError::Truncated { .. }));
    }
}
