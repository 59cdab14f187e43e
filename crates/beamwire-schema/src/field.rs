use beamwire_blob::BlobScalar;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// The primitive kinds a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Bool,
    Char,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    Complex32,
    Complex64,
    String,
}

impl PrimitiveKind {
    /// Width of one element in bytes. Strings are capacity-sized per byte;
    /// bools occupy one byte as scalars and pack 8-per-byte in sequences.
    pub fn width(self) -> usize {
        match self {
            Self::Bool | Self::Char | Self::String => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Uint64 | Self::Float64 | Self::Complex32 => 8,
            Self::Complex64 => 16,
        }
    }
}

/// Single-precision complex sample, re/im pair at native width.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Complex32 {
    pub re: f32,
    pub im: f32,
}

/// Double-precision complex sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

impl Complex32 {
    pub fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }
}

impl Complex64 {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

impl BlobScalar for Complex32 {
    const WIDTH: usize = 8;

    fn copy_ne(&self, out: &mut [u8]) {
        out.copy_from_slice(bytemuck::bytes_of(self));
    }

    fn from_ne(src: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(src)
    }
}

impl BlobScalar for Complex64 {
    const WIDTH: usize = 16;

    fn copy_ne(&self, out: &mut [u8]) {
        out.copy_from_slice(bytemuck::bytes_of(self));
    }

    fn from_ne(src: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(src)
    }
}

/// How many elements a field holds.
///
/// Fixed counts are part of the negotiated layout. A variable count must be
/// resolved to a concrete initial size before the first message; it can be
/// changed later through `MessageBuffer::resize_variable_field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    Fixed(u32),
    Variable { initial: Option<u32> },
}

/// One entry in a schema's ordered field list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: PrimitiveKind,
    pub multiplicity: Multiplicity,
}

impl FieldDescriptor {
    /// A single-element field.
    pub fn scalar(name: &str, kind: PrimitiveKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            multiplicity: Multiplicity::Fixed(1),
        }
    }

    /// A fixed-count sequence field (for strings: byte capacity).
    pub fn array(name: &str, kind: PrimitiveKind, count: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            multiplicity: Multiplicity::Fixed(count),
        }
    }

    /// A variable-count field with its initial size hint.
    pub fn variable(name: &str, kind: PrimitiveKind, initial: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            multiplicity: Multiplicity::Variable {
                initial: Some(initial),
            },
        }
    }

    /// Whether this field encodes as a count-prefixed sequence.
    ///
    /// Strings always do (the count word holds the current length);
    /// everything else does unless it is a fixed single element.
    pub fn is_sequence(&self) -> bool {
        matches!(self.kind, PrimitiveKind::String)
            || !matches!(self.multiplicity, Multiplicity::Fixed(1))
    }
}

/// A Rust type that can live in a schema field.
pub trait FieldValue: BlobScalar {
    const KIND: PrimitiveKind;
}

macro_rules! impl_field_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                const KIND: PrimitiveKind = PrimitiveKind::$kind;
            }
        )*
    };
}

impl_field_value!(
    bool => Bool,
    u8 => Char,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
    Complex32 => Complex32,
    Complex64 => Complex64,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_scalars_roundtrip_native_bytes() {
        let c = Complex32::new(1.5, -2.5);
        let mut raw = [0u8; 8];
        c.copy_ne(&mut raw);
        assert_eq!(Complex32::from_ne(&raw), c);

        let c = Complex64::new(f64::MIN_POSITIVE, 9.75);
        let mut raw = [0u8; 16];
        c.copy_ne(&mut raw);
        assert_eq!(Complex64::from_ne(&raw), c);
    }

    #[test]
    fn sequence_classification() {
        assert!(!FieldDescriptor::scalar("id", PrimitiveKind::Int32).is_sequence());
        assert!(FieldDescriptor::array("g", PrimitiveKind::Float64, 4).is_sequence());
        assert!(FieldDescriptor::variable("v", PrimitiveKind::Char, 8).is_sequence());
        // A string is a sequence even at capacity 1.
        assert!(FieldDescriptor::array("s", PrimitiveKind::String, 1).is_sequence());
    }

    #[test]
    fn descriptors_serialize_for_interchange() {
        let field = FieldDescriptor::variable("payload", PrimitiveKind::Char, 16);
        let json = serde_json::to_string(&field).unwrap();
        let back: FieldDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, field);
    }
}
