//! Little-endian primitive decoding over byte slices.
//!
//! Everything in the metadata format is little-endian. [`CilIO`] abstracts over the integer
//! widths the format uses so that [`read_le_at`] and the cursor in
//! [`crate::file::reader::BinaryReader`] can decode any of them with one generic path.
//!
//! Index columns in the metadata tables are either 2 or 4 bytes wide depending on heap and
//! table sizes; [`read_le_at_dyn`] reads such a column and widens it to `u32`.

use crate::Result;

/// Fixed-width values that can be decoded from little-endian bytes.
pub trait CilIO: Sized {
    /// Byte array representation of the type
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Build the value from its little-endian representation
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_cilio {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_cilio! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
}

/// Read a `T` from the start of `data`
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a `T` at `offset` and advance `offset` past it
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value would extend past `data`
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Read a 2 or 4 byte index column at `offset`, widened to `u32`
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the column would extend past `data`
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}
