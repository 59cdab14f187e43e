use bytes::{Bytes, BytesMut};
use tracing::debug;

use beamwire_blob::{BlobReader, BlobWriter, LengthMode, MemSink};

use crate::error::{Result, SchemaError};
use crate::field::{FieldValue, Multiplicity, PrimitiveKind};
use crate::schema::{compute_offsets, field_size, Schema};

/// What the last `deserialize` learned about the extra sub-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraStatus {
    /// No extra has ever arrived, or the sender cleared it.
    Absent,
    /// The sender omitted retransmission; the previous content stands.
    Unchanged,
    /// Fresh extra content arrived with this message.
    New,
}

/// A materialized message: schema, backing byte buffer, typed accessors,
/// and an optional independently-versioned trailing "extra" sub-record.
///
/// The backing storage is exclusively owned; it grows only by whole-buffer
/// replacement (`resize_variable_field`), never by in-place insertion.
/// Accessors take `&self`/`&mut self`, so handles obtained before a resize
/// cannot outlive it; the generation counter backs the same rule for
/// callers working with raw offsets.
pub struct MessageBuffer {
    schema: Schema,
    mode: LengthMode,
    counts: Vec<u32>,
    offsets: Vec<usize>,
    body_len: usize,
    buf: BytesMut,
    generation: u64,
    extra: Option<Bytes>,
    extra_version: i32,
    pending_extra: PendingExtra,
    last_rx_extra: ExtraStatus,
}

/// What the next `serialize` must emit for the extra sub-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingExtra {
    Nothing,
    Content,
    Clear,
}

impl MessageBuffer {
    /// Allocate the backing buffer for `schema` with the default
    /// (`Natural`) length-header mode.
    pub fn materialize(schema: Schema) -> Self {
        Self::materialize_with_mode(schema, LengthMode::Natural)
    }

    /// Allocate the backing buffer; `mode` must match the peer's.
    pub fn materialize_with_mode(schema: Schema, mode: LengthMode) -> Self {
        let counts = schema.initial_counts();
        let (offsets, body_len) = compute_offsets(schema.fields(), &counts);
        let mut buffer = Self {
            schema,
            mode,
            counts,
            offsets,
            body_len,
            buf: BytesMut::zeroed(body_len),
            generation: 0,
            extra: None,
            extra_version: 0,
            pending_extra: PendingExtra::Nothing,
            last_rx_extra: ExtraStatus::Absent,
        };
        buffer.write_count_words();
        buffer
    }

    /// The schema this buffer was materialized from.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The stream's length-header mode.
    pub fn mode(&self) -> LengthMode {
        self.mode
    }

    /// Bumped on every layout change; raw offsets from an older generation
    /// must not be used.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current element count of a field.
    pub fn count(&self, name: &str) -> Result<u32> {
        Ok(self.counts[self.idx(name)?])
    }

    /// Byte offset of a field in the backing buffer, valid for the current
    /// generation only.
    pub fn offset_of(&self, name: &str) -> Result<usize> {
        Ok(self.offsets[self.idx(name)?])
    }

    /// The raw body bytes (fixed fields only, no frame header, no extra).
    pub fn body(&self) -> &[u8] {
        &self.buf
    }

    // ---- typed accessors -------------------------------------------------

    /// Read a scalar field.
    pub fn get<T: FieldValue>(&self, name: &str) -> Result<T> {
        let i = self.idx(name)?;
        self.check_scalar::<T>(i, name)?;
        Ok(T::from_ne(&self.buf[self.offsets[i]..self.offsets[i] + T::WIDTH]))
    }

    /// Write a scalar field.
    pub fn set<T: FieldValue>(&mut self, name: &str, value: T) -> Result<()> {
        let i = self.idx(name)?;
        self.check_scalar::<T>(i, name)?;
        let at = self.offsets[i];
        value.copy_ne(&mut self.buf[at..at + T::WIDTH]);
        Ok(())
    }

    /// Read a sequence field into a vector.
    pub fn get_vec<T: FieldValue>(&self, name: &str) -> Result<Vec<T>> {
        let i = self.idx(name)?;
        self.check_sequence::<T>(i, name)?;
        let count = self.counts[i] as usize;
        let mut at = self.offsets[i] + 4;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(T::from_ne(&self.buf[at..at + T::WIDTH]));
            at += T::WIDTH;
        }
        Ok(values)
    }

    /// Write a sequence field. Fixed fields demand an exact-length slice;
    /// variable fields resize to fit.
    pub fn set_slice<T: FieldValue>(&mut self, name: &str, values: &[T]) -> Result<()> {
        let i = self.idx(name)?;
        self.check_sequence::<T>(i, name)?;
        self.fit_count(i, name, values.len())?;

        let mut at = self.offsets[i];
        self.buf[at..at + 4].copy_from_slice(&(values.len() as u32).to_ne_bytes());
        at += 4;
        for value in values {
            value.copy_ne(&mut self.buf[at..at + T::WIDTH]);
            at += T::WIDTH;
        }
        Ok(())
    }

    /// Read a bit-packed boolean sequence field.
    pub fn get_bools(&self, name: &str) -> Result<Vec<bool>> {
        let i = self.idx(name)?;
        self.check_bool_seq(i, name)?;
        let count = self.counts[i] as usize;
        let packed = &self.buf[self.offsets[i] + 4..];
        Ok((0..count)
            .map(|bit| packed[bit / 8] & (1 << (bit % 8)) != 0)
            .collect())
    }

    /// Write a bit-packed boolean sequence field.
    pub fn set_bools(&mut self, name: &str, values: &[bool]) -> Result<()> {
        let i = self.idx(name)?;
        self.check_bool_seq(i, name)?;
        self.fit_count(i, name, values.len())?;

        let at = self.offsets[i];
        self.buf[at..at + 4].copy_from_slice(&(values.len() as u32).to_ne_bytes());
        let packed = &mut self.buf[at + 4..at + 4 + values.len().div_ceil(8)];
        packed.fill(0);
        for (bit, set) in values.iter().enumerate() {
            if *set {
                packed[bit / 8] |= 1 << (bit % 8);
            }
        }
        Ok(())
    }

    /// Read a string field.
    pub fn get_string(&self, name: &str) -> Result<String> {
        let i = self.idx(name)?;
        self.check_string(i, name)?;
        let at = self.offsets[i];
        let len = u32::from_ne_bytes(self.buf[at..at + 4].try_into().unwrap()) as usize;
        let capacity = self.counts[i] as usize;
        if len > capacity {
            return Err(SchemaError::ValueOverflow {
                field: name.to_string(),
                len,
                capacity,
            });
        }
        std::str::from_utf8(&self.buf[at + 4..at + 4 + len])
            .map(str::to_string)
            .map_err(|_| SchemaError::Blob(beamwire_blob::BlobError::InvalidString))
    }

    /// Write a string field. Fixed fields bound the byte length by their
    /// capacity; variable fields resize so capacity equals the length.
    pub fn set_string(&mut self, name: &str, value: &str) -> Result<()> {
        let i = self.idx(name)?;
        self.check_string(i, name)?;

        let len = value.len();
        match self.schema.fields()[i].multiplicity {
            Multiplicity::Fixed(capacity) => {
                if len > capacity as usize {
                    return Err(SchemaError::ValueOverflow {
                        field: name.to_string(),
                        len,
                        capacity: capacity as usize,
                    });
                }
            }
            Multiplicity::Variable { .. } => {
                if len as u32 != self.counts[i] {
                    self.resize_variable_field(name, len as u32)?;
                }
            }
        }

        let i = self.idx(name)?;
        let at = self.offsets[i];
        let capacity = self.counts[i] as usize;
        self.buf[at..at + 4].copy_from_slice(&(len as u32).to_ne_bytes());
        self.buf[at + 4..at + 4 + len].copy_from_slice(value.as_bytes());
        self.buf[at + 4 + len..at + 4 + capacity].fill(0);
        Ok(())
    }

    // ---- resizing --------------------------------------------------------

    /// Replace the backing buffer with one sized for `new_count` elements of
    /// the named variable field. Fixed fields and preserved elements keep
    /// their values; offsets of fields after the resized one shift. Bumps
    /// the generation, invalidating previously obtained raw offsets.
    pub fn resize_variable_field(&mut self, name: &str, new_count: u32) -> Result<()> {
        let i = self.idx(name)?;
        let field = &self.schema.fields()[i];
        if !matches!(field.multiplicity, Multiplicity::Variable { .. }) {
            return Err(SchemaError::FixedFieldResize(name.to_string()));
        }
        if new_count == self.counts[i] {
            return Ok(());
        }

        let mut new_counts = self.counts.clone();
        new_counts[i] = new_count;
        let (new_offsets, new_body_len) = compute_offsets(self.schema.fields(), &new_counts);
        let mut new_buf = BytesMut::zeroed(new_body_len);

        // Prefix fields keep their offsets.
        new_buf[..self.offsets[i]].copy_from_slice(&self.buf[..self.offsets[i]]);

        // The resized field: fresh count word, preserved data prefix. For a
        // string the stored length clamps to the new capacity.
        let old_size = field_size(field, self.counts[i]);
        let new_size = field_size(field, new_count);
        let at = self.offsets[i];
        let stored_count = match field.kind {
            PrimitiveKind::String => {
                let old_len =
                    u32::from_ne_bytes(self.buf[at..at + 4].try_into().unwrap());
                old_len.min(new_count)
            }
            _ => new_count,
        };
        new_buf[at..at + 4].copy_from_slice(&stored_count.to_ne_bytes());
        let keep = old_size.min(new_size) - 4;
        new_buf[at + 4..at + 4 + keep].copy_from_slice(&self.buf[at + 4..at + 4 + keep]);

        // Suffix fields move as one block per field.
        for j in i + 1..self.schema.fields().len() {
            let size = field_size(&self.schema.fields()[j], self.counts[j]);
            new_buf[new_offsets[j]..new_offsets[j] + size]
                .copy_from_slice(&self.buf[self.offsets[j]..self.offsets[j] + size]);
        }

        debug!(
            field = name,
            old_count = self.counts[i],
            new_count,
            "resized variable field"
        );
        self.counts = new_counts;
        self.offsets = new_offsets;
        self.body_len = new_body_len;
        self.buf = new_buf;
        self.generation += 1;
        Ok(())
    }

    // ---- extra sub-record ------------------------------------------------

    /// Build (or rebuild) the extra sub-record. The closure writes the
    /// content through a blob writer whose frames must balance. Content
    /// identical to the current extra is a no-op; changed content bumps the
    /// extra version and is transmitted with the next `serialize`.
    pub fn set_extra(
        &mut self,
        fill: impl FnOnce(&mut BlobWriter<MemSink>) -> beamwire_blob::Result<()>,
    ) -> Result<()> {
        let mut writer = BlobWriter::new(MemSink::default(), self.mode);
        fill(&mut writer)?;
        let bytes = writer.finish()?.into_bytes();

        if self.extra.as_ref() == Some(&bytes) {
            return Ok(());
        }
        self.extra = Some(bytes);
        self.extra_version += 1;
        self.pending_extra = PendingExtra::Content;
        Ok(())
    }

    /// Drop the extra sub-record; the next `serialize` tells the peer it is
    /// gone (as opposed to merely unchanged).
    pub fn clear_extra(&mut self) {
        if self.extra.take().is_some() {
            self.pending_extra = PendingExtra::Clear;
        }
    }

    /// Fresh extra content from the last `deserialize`, if any. `None`
    /// covers both "unchanged" and "absent"; `extra_status` tells them
    /// apart.
    pub fn extra(&self) -> Option<(i32, BlobReader<'_>)> {
        match self.last_rx_extra {
            ExtraStatus::New => self
                .extra
                .as_ref()
                .map(|bytes| (self.extra_version, BlobReader::new(bytes, self.mode))),
            _ => None,
        }
    }

    /// What the last `deserialize` learned about the extra sub-record.
    pub fn extra_status(&self) -> ExtraStatus {
        self.last_rx_extra
    }

    /// Version of the current extra content.
    pub fn extra_version(&self) -> i32 {
        self.extra_version
    }

    // ---- wire round-trip -------------------------------------------------

    /// Encode the whole buffer as one top-level frame (tag: schema name,
    /// version: schema fingerprint), with the extra sub-record appended as
    /// a second top-level frame when it changed since the last call.
    pub fn serialize(&mut self) -> Result<Bytes> {
        let mut writer = BlobWriter::new(
            MemSink::with_capacity(self.body_len + 64),
            self.mode,
        );
        writer.put_start(self.schema.name(), self.schema.fingerprint())?;
        writer.put_bytes(&self.buf)?;
        writer.put_end()?;

        match (self.pending_extra, self.extra.as_ref()) {
            (PendingExtra::Content, Some(content)) => {
                writer.put_start(&self.extra_tag(), self.extra_version)?;
                writer.put_bytes(content)?;
                writer.put_end()?;
            }
            (PendingExtra::Clear, _) => {
                writer.put_start(&self.extra_tag(), 0)?;
                writer.put_end()?;
            }
            _ => {}
        }
        self.pending_extra = PendingExtra::Nothing;

        Ok(writer.finish()?.into_bytes())
    }

    /// Decode one message into this buffer, adapting variable-field counts
    /// to the sender's. Fails fast on tag or fingerprint skew; a failure
    /// leaves the schema intact but the in-flight body must be discarded.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        let mut reader = BlobReader::new(bytes, self.mode);
        let wire_fingerprint = reader.get_start(self.schema.name())?;
        let ours = self.schema.fingerprint();
        if wire_fingerprint != ours {
            return Err(SchemaError::FingerprintSkew {
                ours,
                wire: wire_fingerprint,
            });
        }

        let mut new_counts = self.counts.clone();
        let mut new_buf = BytesMut::with_capacity(self.body_len);
        for (i, field) in self.schema.fields().iter().enumerate() {
            if !field.is_sequence() {
                new_buf.extend_from_slice(reader.get_space(field.kind.width())?);
                continue;
            }

            let count_raw = reader.get_space(4)?;
            let wire_count = u32::from_ne_bytes(count_raw.try_into().unwrap());
            match field.multiplicity {
                Multiplicity::Fixed(capacity) => {
                    let in_range = match field.kind {
                        // String count word is the current length.
                        PrimitiveKind::String => wire_count <= capacity,
                        _ => wire_count == capacity,
                    };
                    if !in_range {
                        return Err(SchemaError::ValueOverflow {
                            field: field.name.clone(),
                            len: wire_count as usize,
                            capacity: capacity as usize,
                        });
                    }
                }
                Multiplicity::Variable { .. } => new_counts[i] = wire_count,
            }

            let data_len = field_size(field, new_counts[i]) - 4;
            new_buf.extend_from_slice(&wire_count.to_ne_bytes());
            new_buf.extend_from_slice(reader.get_space(data_len)?);
        }
        reader.get_end()?;

        self.read_extra_frame(&mut reader, bytes.len())?;

        let (new_offsets, new_body_len) = compute_offsets(self.schema.fields(), &new_counts);
        debug_assert_eq!(new_body_len, new_buf.len());
        self.counts = new_counts;
        self.offsets = new_offsets;
        self.body_len = new_body_len;
        self.buf = new_buf;
        self.generation += 1;
        Ok(())
    }

    fn read_extra_frame(&mut self, reader: &mut BlobReader<'_>, total: usize) -> Result<()> {
        if reader.position() >= total {
            self.last_rx_extra = if self.extra.is_some() {
                ExtraStatus::Unchanged
            } else {
                ExtraStatus::Absent
            };
            return Ok(());
        }

        let version = reader.get_start(&self.extra_tag())?;
        let content = reader.get_space(reader.remaining())?;
        reader.get_end()?;

        if version == 0 && content.is_empty() {
            self.extra = None;
            self.last_rx_extra = ExtraStatus::Absent;
        } else {
            self.extra = Some(Bytes::copy_from_slice(content));
            self.extra_version = version;
            self.last_rx_extra = ExtraStatus::New;
        }
        Ok(())
    }

    // ---- helpers ---------------------------------------------------------

    fn extra_tag(&self) -> String {
        format!("{}.extra", self.schema.name())
    }

    fn idx(&self, name: &str) -> Result<usize> {
        self.schema
            .index_of(name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))
    }

    fn check_kind<T: FieldValue>(&self, i: usize, name: &str) -> Result<()> {
        let declared = self.schema.fields()[i].kind;
        if declared != T::KIND {
            return Err(SchemaError::TypeMismatch {
                field: name.to_string(),
                declared,
                requested: T::KIND,
            });
        }
        Ok(())
    }

    fn check_scalar<T: FieldValue>(&self, i: usize, name: &str) -> Result<()> {
        self.check_kind::<T>(i, name)?;
        if self.schema.fields()[i].is_sequence() {
            return Err(SchemaError::SequenceField(name.to_string()));
        }
        Ok(())
    }

    fn check_sequence<T: FieldValue>(&self, i: usize, name: &str) -> Result<()> {
        self.check_kind::<T>(i, name)?;
        let field = &self.schema.fields()[i];
        if !field.is_sequence() {
            return Err(SchemaError::ScalarField(name.to_string()));
        }
        if field.kind == PrimitiveKind::Bool {
            return Err(SchemaError::PackedBoolField(name.to_string()));
        }
        Ok(())
    }

    fn check_bool_seq(&self, i: usize, name: &str) -> Result<()> {
        let field = &self.schema.fields()[i];
        if field.kind != PrimitiveKind::Bool {
            return Err(SchemaError::TypeMismatch {
                field: name.to_string(),
                declared: field.kind,
                requested: PrimitiveKind::Bool,
            });
        }
        if !field.is_sequence() {
            return Err(SchemaError::ScalarField(name.to_string()));
        }
        Ok(())
    }

    fn check_string(&self, i: usize, name: &str) -> Result<()> {
        let declared = self.schema.fields()[i].kind;
        if declared != PrimitiveKind::String {
            return Err(SchemaError::TypeMismatch {
                field: name.to_string(),
                declared,
                requested: PrimitiveKind::String,
            });
        }
        Ok(())
    }

    /// Enforce (or adapt to) a sequence length: fixed fields demand an
    /// exact match, variable fields resize.
    fn fit_count(&mut self, i: usize, name: &str, len: usize) -> Result<()> {
        match self.schema.fields()[i].multiplicity {
            Multiplicity::Fixed(capacity) => {
                if len != capacity as usize {
                    return Err(SchemaError::ValueOverflow {
                        field: name.to_string(),
                        len,
                        capacity: capacity as usize,
                    });
                }
            }
            Multiplicity::Variable { .. } => {
                if len as u32 != self.counts[i] {
                    self.resize_variable_field(name, len as u32)?;
                }
            }
        }
        Ok(())
    }

    fn write_count_words(&mut self) {
        for (i, field) in self.schema.fields().iter().enumerate() {
            if !field.is_sequence() {
                continue;
            }
            // String count words hold the current length, which starts at 0.
            let count = match field.kind {
                PrimitiveKind::String => 0,
                _ => self.counts[i],
            };
            let at = self.offsets[i];
            self.buf[at..at + 4].copy_from_slice(&count.to_ne_bytes());
        }
    }
}
