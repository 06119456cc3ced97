//! Primitive value encoding for typed memory access

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Byte order used by typed accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the host
    pub const NATIVE: ByteOrder = if cfg!(target_endian = "little") {
        ByteOrder::Little
    } else {
        ByteOrder::Big
    };

    pub fn reversed(self) -> Self {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::NATIVE
    }
}

/// A fixed-width value that can be stored in emulated memory
pub trait Primitive: Copy + Default + Send + 'static {
    /// Encoded width in bytes
    const WIDTH: usize;

    /// Decode from exactly `WIDTH` bytes
    fn read(src: &[u8], order: ByteOrder) -> Self;

    /// Encode into exactly `WIDTH` bytes
    fn write(self, dst: &mut [u8], order: ByteOrder);
}

macro_rules! impl_primitive {
    ($ty:ty, $get_le:ident, $get_be:ident, $put_le:ident, $put_be:ident) => {
        impl Primitive for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn read(mut src: &[u8], order: ByteOrder) -> Self {
                match order {
                    ByteOrder::Little => src.$get_le(),
                    ByteOrder::Big => src.$get_be(),
                }
            }

            fn write(self, mut dst: &mut [u8], order: ByteOrder) {
                match order {
                    ByteOrder::Little => dst.$put_le(self),
                    ByteOrder::Big => dst.$put_be(self),
                }
            }
        }
    };
}

impl_primitive!(i8, get_i8, get_i8, put_i8, put_i8);
impl_primitive!(i16, get_i16_le, get_i16, put_i16_le, put_i16);
impl_primitive!(u16, get_u16_le, get_u16, put_u16_le, put_u16);
impl_primitive!(i32, get_i32_le, get_i32, put_i32_le, put_i32);
impl_primitive!(f32, get_f32_le, get_f32, put_f32_le, put_f32);
impl_primitive!(i64, get_i64_le, get_i64, put_i64_le, put_i64);
impl_primitive!(f64, get_f64_le, get_f64, put_f64_le, put_f64);

impl Primitive for bool {
    const WIDTH: usize = 1;

    fn read(mut src: &[u8], _order: ByteOrder) -> Self {
        src.get_u8() != 0
    }

    fn write(self, mut dst: &mut [u8], _order: ByteOrder) {
        dst.put_u8(self as u8);
    }
}

/// Decode consecutive values into `out`. `src` holds `out.len() * T::WIDTH` bytes.
pub fn read_slice<T: Primitive>(src: &[u8], out: &mut [T], order: ByteOrder) {
    for (chunk, value) in src.chunks_exact(T::WIDTH).zip(out.iter_mut()) {
        *value = T::read(chunk, order);
    }
}

/// Encode `values` back to back into `dst`
pub fn write_slice<T: Primitive>(values: &[T], dst: &mut [u8], order: ByteOrder) {
    for (chunk, value) in dst.chunks_exact_mut(T::WIDTH).zip(values) {
        value.write(chunk, order);
    }
}
