use crate::field::PrimitiveKind;

/// Errors that can occur in schema definition and typed buffer access.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Two fields share a name.
    #[error("duplicate field name: {0}")]
    DuplicateFieldName(String),

    /// A variable-length field was never given a concrete size hint.
    #[error("variable multiplicity of field {0} is unresolved")]
    UnresolvedVariableMultiplicity(String),

    /// The named field is not in the schema.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// The accessor's type does not match the field descriptor.
    #[error("type mismatch on field {field} (declared {declared:?}, requested {requested:?})")]
    TypeMismatch {
        field: String,
        declared: PrimitiveKind,
        requested: PrimitiveKind,
    },

    /// A scalar accessor was used on a sequence field.
    #[error("field {0} is a sequence; use the sequence accessors")]
    SequenceField(String),

    /// A sequence accessor was used on a scalar field.
    #[error("field {0} is a scalar; use the scalar accessors")]
    ScalarField(String),

    /// Boolean sequences are bit-packed and have dedicated accessors.
    #[error("field {0} is a bit-packed boolean sequence; use get_bools/set_bools")]
    PackedBoolField(String),

    /// Only variable-multiplicity fields may be resized.
    #[error("field {0} has fixed multiplicity and cannot be resized")]
    FixedFieldResize(String),

    /// A value does not fit the field's declared capacity.
    #[error("value for field {field} does not fit ({len} > capacity {capacity})")]
    ValueOverflow {
        field: String,
        len: usize,
        capacity: usize,
    },

    /// Producer and consumer were built from different schema revisions.
    #[error("schema fingerprint skew (ours {ours:#010x}, wire {wire:#010x})")]
    FingerprintSkew { ours: i32, wire: i32 },

    /// Codec-level failure while (de)materializing the buffer.
    #[error("blob codec error: {0}")]
    Blob(#[from] beamwire_blob::BlobError),

    /// Schema interchange (de)serialization failure.
    #[error("schema interchange error: {0}")]
    Interchange(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
