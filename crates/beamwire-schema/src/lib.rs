//! Typed message buffers for pipeline edges.
//!
//! A [`Schema`] is the fixed, ordered field layout of one message type,
//! negotiated between producer and consumer once, out-of-band; repeated
//! messages pay only for field values, never for field descriptions. A
//! [`MessageBuffer`] materializes a schema into a contiguous byte buffer
//! with typed accessors, an optional independently-versioned "extra"
//! sub-record for occasional payloads, and whole-buffer round-trips
//! through the blob codec.

pub mod buffer;
pub mod error;
pub mod field;
pub mod schema;

pub use buffer::{ExtraStatus, MessageBuffer};
pub use error::{Result, SchemaError};
pub use field::{Complex32, Complex64, FieldDescriptor, FieldValue, Multiplicity, PrimitiveKind};
pub use schema::Schema;
