//! Self-describing nested binary frames ("blobs") for pipeline messages.
//!
//! This is the wire encoding every processing stage speaks. Each frame
//! carries:
//! - A length-prefixed type tag naming the logical record type
//! - A 4-byte signed version
//! - A byte length covering the whole frame, header included
//!
//! Frames nest to arbitrary depth; the writer patches each frame's length
//! back into its header when the frame is closed. Multi-byte values are
//! native-endian; byte order is agreed between producer and consumer
//! out-of-band, never encoded on the wire.

pub mod error;
pub mod header;
pub mod probe;
pub mod reader;
pub mod value;
pub mod writer;

pub use error::{BlobError, Result};
pub use header::{header_len, LengthMode, MAX_TAG_LEN};
pub use reader::BlobReader;
pub use value::{BlobScalar, MAX_SCALAR_WIDTH};
pub use writer::{BlobSink, BlobWriter, MemSink, StreamSink};
