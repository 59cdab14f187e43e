//! Primitive value encoding.
//!
//! All scalars are written at native width in native byte order. Sequences
//! are count-prefixed; boolean sequences are bit-packed (see the writer).

/// Upper bound on [`BlobScalar::WIDTH`], sized for a complex64 pair.
pub const MAX_SCALAR_WIDTH: usize = 16;

/// A fixed-width primitive that can ride in a blob body.
///
/// Implementations must keep `WIDTH` at or below [`MAX_SCALAR_WIDTH`].
pub trait BlobScalar: Copy {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Write the native-endian encoding into `out` (exactly `WIDTH` bytes).
    fn copy_ne(&self, out: &mut [u8]);

    /// Decode from exactly `WIDTH` native-endian bytes.
    fn from_ne(src: &[u8]) -> Self;
}

macro_rules! impl_blob_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl BlobScalar for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn copy_ne(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_ne_bytes());
                }

                fn from_ne(src: &[u8]) -> Self {
                    <$ty>::from_ne_bytes(src.try_into().unwrap())
                }
            }
        )*
    };
}

impl_blob_scalar!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl BlobScalar for bool {
    const WIDTH: usize = 1;

    fn copy_ne(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn from_ne(src: &[u8]) -> Self {
        src[0] != 0
    }
}
