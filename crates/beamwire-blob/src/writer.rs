use std::io::{ErrorKind, Write};

use bytes::{Bytes, BytesMut};

use crate::error::{BlobError, Result};
use crate::header::{header_len, LengthMode, MAX_TAG_LEN};
use crate::value::{BlobScalar, MAX_SCALAR_WIDTH};

/// Byte sink a [`BlobWriter`] encodes into.
///
/// A seekable sink supports patching already-written bytes, which the
/// writer needs to fill in frame lengths after the fact. Forward-only
/// sinks work too, but only via the precomputed-length encode path
/// ([`BlobWriter::put_start_sized`]).
pub trait BlobSink {
    /// Append bytes to the stream.
    fn push(&mut self, bytes: &[u8]) -> Result<()>;

    /// Bytes written since the sink was created.
    fn position(&self) -> u64;

    /// Whether [`BlobSink::patch`] is available.
    fn seekable(&self) -> bool;

    /// Overwrite previously written bytes at `pos`.
    fn patch(&mut self, pos: u64, bytes: &[u8]) -> Result<()>;
}

/// In-memory seekable sink.
#[derive(Debug, Default)]
pub struct MemSink {
    buf: BytesMut,
}

impl MemSink {
    /// Create a sink with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// The encoded bytes so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the sink and freeze the encoded bytes.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl BlobSink for MemSink {
    fn push(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    fn seekable(&self) -> bool {
        true
    }

    fn patch(&mut self, pos: u64, bytes: &[u8]) -> Result<()> {
        let start = pos as usize;
        let end = start + bytes.len();
        if end > self.buf.len() {
            return Err(BlobError::Truncated {
                needed: end,
                available: self.buf.len(),
            });
        }
        self.buf[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

/// Forward-only sink over any `Write` stream.
///
/// Cannot patch; frames must be encoded with [`BlobWriter::put_start_sized`].
#[derive(Debug)]
pub struct StreamSink<W> {
    inner: W,
    written: u64,
}

impl<W: Write> StreamSink<W> {
    /// Wrap a `Write` stream.
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(BlobError::Io(err)),
            }
        }
    }

    /// Consume the sink and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> BlobSink for StreamSink<W> {
    fn push(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => {
                    return Err(BlobError::Io(std::io::Error::new(
                        ErrorKind::WriteZero,
                        "sink refused further bytes",
                    )))
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(BlobError::Io(err)),
            }
        }
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.written
    }

    fn seekable(&self) -> bool {
        false
    }

    fn patch(&mut self, _pos: u64, _bytes: &[u8]) -> Result<()> {
        Err(BlobError::Unsupported("length patch"))
    }
}

struct PendingFrame {
    start: u64,
    length_pos: u64,
    /// Precomputed total for the sized encode path; verified at `put_end`.
    sized_total: Option<u64>,
}

/// Encodes nested, versioned frames into a [`BlobSink`].
///
/// Every `put_start` must be balanced by a `put_end`; the nesting stack must
/// be empty when encoding completes.
pub struct BlobWriter<S> {
    sink: S,
    mode: LengthMode,
    stack: Vec<PendingFrame>,
}

impl<S: BlobSink> BlobWriter<S> {
    /// Create a writer. `mode` fixes the length-header width for the whole
    /// stream instance.
    pub fn new(sink: S, mode: LengthMode) -> Self {
        Self {
            sink,
            mode,
            stack: Vec::new(),
        }
    }

    /// The stream's length-header mode.
    pub fn mode(&self) -> LengthMode {
        self.mode
    }

    /// Current stream position in bytes.
    pub fn position(&self) -> u64 {
        self.sink.position()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open a frame: tag, version, and a length placeholder patched by the
    /// matching [`put_end`](Self::put_end). Returns the new nesting depth.
    ///
    /// Needs a seekable sink; on forward-only sinks use
    /// [`put_start_sized`](Self::put_start_sized).
    pub fn put_start(&mut self, tag: &str, version: i32) -> Result<usize> {
        if !self.sink.seekable() {
            return Err(BlobError::Unsupported(
                "put_start length patch; use put_start_sized",
            ));
        }
        self.write_header(tag, version, 0, None)?;
        Ok(self.stack.len())
    }

    /// Open a frame whose body length is known up front. The header is
    /// written complete, so this works on forward-only sinks; `put_end`
    /// verifies the promise instead of patching.
    pub fn put_start_sized(&mut self, tag: &str, version: i32, body_len: u64) -> Result<usize> {
        let total = header_len(self.mode, tag.len()) as u64 + body_len;
        self.write_header(tag, version, total, Some(total))?;
        Ok(self.stack.len())
    }

    fn write_header(
        &mut self,
        tag: &str,
        version: i32,
        byte_length: u64,
        sized_total: Option<u64>,
    ) -> Result<()> {
        if tag.len() > MAX_TAG_LEN {
            return Err(BlobError::TagTooLong {
                len: tag.len(),
                max: MAX_TAG_LEN,
            });
        }

        let start = self.sink.position();
        self.sink.push(&(tag.len() as u32).to_ne_bytes())?;
        self.sink.push(tag.as_bytes())?;
        self.sink.push(&version.to_ne_bytes())?;
        let length_pos = self.sink.position();
        match self.mode {
            LengthMode::Natural => self.sink.push(&(byte_length as u32).to_ne_bytes())?,
            LengthMode::Padded8 => {
                self.sink.push(&byte_length.to_ne_bytes())?;
                let written = (self.sink.position() - start) as usize;
                let padded = header_len(self.mode, tag.len());
                self.sink.push(&[0u8; 8][..padded - written])?;
            }
        }

        self.stack.push(PendingFrame {
            start,
            length_pos,
            sized_total,
        });
        Ok(())
    }

    /// Close the innermost frame, patch (or verify) its length, and return
    /// the frame's total byte length including its header.
    pub fn put_end(&mut self) -> Result<u64> {
        let frame = self.stack.pop().ok_or(BlobError::UnbalancedNesting)?;
        let total = self.sink.position() - frame.start;

        if let Some(promised) = frame.sized_total {
            if total != promised {
                return Err(BlobError::LengthMismatch {
                    declared: promised,
                    consumed: total,
                });
            }
            return Ok(total);
        }

        match self.mode {
            LengthMode::Natural => {
                let total32 = u32::try_from(total).map_err(|_| BlobError::LengthMismatch {
                    declared: u64::from(u32::MAX),
                    consumed: total,
                })?;
                self.sink.patch(frame.length_pos, &total32.to_ne_bytes())?;
            }
            LengthMode::Padded8 => {
                self.sink.patch(frame.length_pos, &total.to_ne_bytes())?;
            }
        }
        Ok(total)
    }

    /// Write one scalar at native width.
    pub fn put<T: BlobScalar>(&mut self, value: T) -> Result<()> {
        let mut tmp = [0u8; MAX_SCALAR_WIDTH];
        value.copy_ne(&mut tmp[..T::WIDTH]);
        self.sink.push(&tmp[..T::WIDTH])
    }

    /// Append raw bytes whose layout the caller owns (no count prefix).
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.push(bytes)
    }

    /// Write a count-prefixed homogeneous sequence.
    pub fn put_slice<T: BlobScalar>(&mut self, values: &[T]) -> Result<()> {
        self.sink.push(&(values.len() as u32).to_ne_bytes())?;
        for value in values {
            self.put(*value)?;
        }
        Ok(())
    }

    /// Write a count-prefixed, bit-packed boolean sequence
    /// (ceil(count / 8) bytes, LSB-first within each byte).
    pub fn put_bools(&mut self, values: &[bool]) -> Result<()> {
        self.sink.push(&(values.len() as u32).to_ne_bytes())?;
        let mut packed = vec![0u8; values.len().div_ceil(8)];
        for (i, set) in values.iter().enumerate() {
            if *set {
                packed[i / 8] |= 1 << (i % 8);
            }
        }
        self.sink.push(&packed)
    }

    /// Write a count-prefixed UTF-8 string.
    pub fn put_string(&mut self, value: &str) -> Result<()> {
        self.sink.push(&(value.len() as u32).to_ne_bytes())?;
        self.sink.push(value.as_bytes())
    }

    /// Pad with zero filler to the next multiple of `n` bytes, measured from
    /// the start of the outermost open frame. Returns the filler byte count.
    pub fn align(&mut self, n: usize) -> Result<usize> {
        if !self.sink.seekable() {
            return Err(BlobError::Unsupported("align"));
        }
        let base = self.stack.first().map_or(0, |frame| frame.start);
        let offset = (self.sink.position() - base) as usize;
        let filler = offset.next_multiple_of(n.max(1)) - offset;
        if filler > 0 {
            self.sink.push(&vec![0u8; filler])?;
        }
        Ok(filler)
    }

    /// Write `n` placeholder bytes and return their stream position for a
    /// later [`patch`](Self::patch).
    pub fn reserve(&mut self, n: usize) -> Result<u64> {
        if !self.sink.seekable() {
            return Err(BlobError::Unsupported("reserve"));
        }
        let pos = self.sink.position();
        self.sink.push(&vec![0u8; n])?;
        Ok(pos)
    }

    /// Patch previously reserved bytes in place.
    pub fn patch(&mut self, pos: u64, bytes: &[u8]) -> Result<()> {
        self.sink.patch(pos, bytes)
    }

    /// Finish encoding: the nesting stack must be balanced.
    pub fn finish(self) -> Result<S> {
        if !self.stack.is_empty() {
            return Err(BlobError::UnbalancedNesting);
        }
        Ok(self.sink)
    }

    /// Hand back the sink without a balance check.
    pub fn into_sink(self) -> S {
        self.sink
    }
}
