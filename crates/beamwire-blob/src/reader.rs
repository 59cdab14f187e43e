use crate::error::{BlobError, Result};
use crate::header::{parse_header, read_u32, LengthMode};
use crate::value::BlobScalar;

struct OpenFrame {
    start: usize,
    end: usize,
}

/// Decodes nested, versioned frames from a byte slice.
///
/// The dual of [`BlobWriter`](crate::writer::BlobWriter): `get_start`
/// checks the type tag, `get_end` enforces the declared length, typed
/// `get`s mirror the typed `put`s.
pub struct BlobReader<'a> {
    data: &'a [u8],
    pos: usize,
    mode: LengthMode,
    stack: Vec<OpenFrame>,
}

impl<'a> BlobReader<'a> {
    /// Create a reader. `mode` must match the writer's.
    pub fn new(data: &'a [u8], mode: LengthMode) -> Self {
        Self {
            data,
            pos: 0,
            mode,
            stack: Vec::new(),
        }
    }

    /// Current position in the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the innermost frame boundary (or input end).
    pub fn remaining(&self) -> usize {
        self.limit() - self.pos
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn limit(&self) -> usize {
        self.stack.last().map_or(self.data.len(), |frame| frame.end)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(BlobError::Truncated {
            needed: usize::MAX,
            available: self.limit(),
        })?;
        if end > self.limit() {
            return Err(BlobError::Truncated {
                needed: end,
                available: self.limit(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Open the next frame, checking its tag. Returns the frame version.
    pub fn get_start(&mut self, expected_tag: &str) -> Result<i32> {
        let head = parse_header(self.mode, &self.data[self.pos..])?;
        if head.tag != expected_tag {
            return Err(BlobError::TypeMismatch {
                expected: expected_tag.to_string(),
                found: head.tag,
            });
        }

        let end = self
            .pos
            .checked_add(head.byte_length as usize)
            .filter(|&end| head.byte_length >= head.header_len as u64 && end <= self.limit())
            .ok_or(BlobError::LengthMismatch {
                declared: head.byte_length,
                consumed: (self.limit() - self.pos) as u64,
            })?;

        self.stack.push(OpenFrame {
            start: self.pos,
            end,
        });
        self.pos += head.header_len;
        Ok(head.version)
    }

    /// Peek the next frame's tag without consuming anything.
    pub fn peek_tag(&self) -> Result<String> {
        Ok(parse_header(self.mode, &self.data[self.pos..])?.tag)
    }

    /// Close the innermost frame. Unread trailing content is skipped, so the
    /// consumed byte count always matches the declared frame length; returns
    /// that length.
    pub fn get_end(&mut self) -> Result<u64> {
        let frame = self.stack.pop().ok_or(BlobError::UnbalancedNesting)?;
        if self.pos > frame.end {
            return Err(BlobError::LengthMismatch {
                declared: (frame.end - frame.start) as u64,
                consumed: (self.pos - frame.start) as u64,
            });
        }
        self.pos = frame.end;
        Ok((frame.end - frame.start) as u64)
    }

    /// Read one scalar at native width.
    pub fn get<T: BlobScalar>(&mut self) -> Result<T> {
        let raw = self.take(T::WIDTH)?;
        Ok(T::from_ne(raw))
    }

    /// Read a count-prefixed homogeneous sequence.
    pub fn get_slice<T: BlobScalar>(&mut self) -> Result<Vec<T>> {
        let count = self.get_count()?;
        let need = count.checked_mul(T::WIDTH).ok_or(BlobError::Truncated {
            needed: usize::MAX,
            available: self.remaining(),
        })?;
        if need > self.remaining() {
            return Err(BlobError::Truncated {
                needed: self.pos + need,
                available: self.limit(),
            });
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.get::<T>()?);
        }
        Ok(values)
    }

    /// Read a count-prefixed, bit-packed boolean sequence.
    pub fn get_bools(&mut self) -> Result<Vec<bool>> {
        let count = self.get_count()?;
        let packed = self.take(count.div_ceil(8))?;
        Ok((0..count)
            .map(|i| packed[i / 8] & (1 << (i % 8)) != 0)
            .collect())
    }

    /// Read a count-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> Result<String> {
        let count = self.get_count()?;
        let raw = self.take(count)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| BlobError::InvalidString)
    }

    /// Borrow `n` raw bytes and advance past them: the read-side dual of
    /// the writer's `reserve`.
    pub fn get_space(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Skip to the next multiple of `n` bytes, measured from the start of the
    /// outermost open frame. Returns the number of filler bytes skipped.
    pub fn align(&mut self, n: usize) -> Result<usize> {
        let base = self.stack.first().map_or(0, |frame| frame.start);
        let offset = self.pos - base;
        let filler = offset.next_multiple_of(n.max(1)) - offset;
        self.take(filler)?;
        Ok(filler)
    }

    fn get_count(&mut self) -> Result<usize> {
        let raw = self.take(4)?;
        Ok(read_u32(raw, 0)? as usize)
    }
}
