//! Converting to and from bytes
use crate::errors::{ConvResult, Error};
use std::io::Read;

/// Read the exact number of specified bytes from the file.
pub(crate) fn read_bytes_exact<T: Read>(buffer: T, n_bytes: usize) -> ConvResult<Box<[u8]>> {
    let mut bytes = Vec::with_capacity(n_bytes);
    let n_read = buffer.take(n_bytes as u64).read_to_end(&mut bytes)?;
    if n_read != n_bytes {
        Err(Error::IOError("Unexpected end of file.".into()))?;
    };

    Ok(bytes.into())
}

/// Change a collection of bytes into a f64.
pub(crate) fn bytes_to_f64(bytes: &[u8], little_endian: bool) -> ConvResult<f64> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::IOError("File is not correctly formatted".into()))?;
    if little_endian {
        Ok(f64::from_le_bytes(bytes))
    } else {
        Ok(f64::from_be_bytes(bytes))
    }
}

/// Change a collection of bytes into a vector of f64s.
pub(crate) fn bytes_to_f64_vec(bytes: &[u8], little_endian: bool) -> ConvResult<Box<[f64]>> {
    let byte_len = bytes.len();
    if byte_len % 8 != 0 {
        Err(Error::IOError("File is not correctly formatted".into()))?;
    }
    let res: Box<[f64]> = (0..byte_len / 8)
        .map(|idx| bytes_to_f64(&bytes[8 * idx..(8 + 8 * idx)], little_endian))
        .collect::<ConvResult<_>>()?;
    Ok(res)
}

/// Change a collection of bytes into a vector of i32s.
pub(crate) fn bytes_to_i32_vec(bytes: &[u8], little_endian: bool) -> ConvResult<Box<[i32]>> {
    let byte_len = bytes.len();
    if byte_len % 4 != 0 {
        Err(Error::IOError("File is not correctly formatted".into()))?;
    }
    let res: Box<[i32]> = (0..byte_len / 4)
        .map(|idx| bytes_to_i32(&bytes[4 * idx..(4 + 4 * idx)], little_endian))
        .collect::<ConvResult<_>>()?;
    Ok(res)
}

/// Change a collection of bytes into a i32.
pub(crate) fn bytes_to_i32(bytes: &[u8], little_endian: bool) -> ConvResult<i32> {
    let bytes: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::IOError("File is not correctly formatted".into()))?;
    if little_endian {
        Ok(i32::from_le_bytes(bytes))
    } else {
        Ok(i32::from_be_bytes(bytes))
    }
}

/// Change a collection of bytes into a String.
/// Trailing nulls and spaces are removed.
pub(crate) fn bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(|c| c == '\0' || c == ' ')
        .to_string()
}

/// Read a multiple contiguous f64s from the file.
pub(crate) fn read_f64_vec<T: Read>(
    buffer: T,
    n_floats: usize,
    little_endian: bool,
) -> ConvResult<Box<[f64]>> {
    let bytes = read_bytes_exact(buffer, 8 * n_floats)?;
    bytes_to_f64_vec(&bytes, little_endian)
}

/// Write a f64 into the destination slice, which must be exactly 8 bytes long.
pub(crate) fn f64_into_bytes(value: f64, dest: &mut [u8]) {
    dest.copy_from_slice(&value.to_le_bytes());
}

/// Write a i32 into the destination slice, which must be exactly 4 bytes long.
pub(crate) fn i32_into_bytes(value: i32, dest: &mut [u8]) {
    dest.copy_from_slice(&value.to_le_bytes());
}

/// Write a string into the destination slice, padding the remainder with `pad`.
/// Strings longer than the slice are truncated.
pub(crate) fn str_into_bytes(value: &str, dest: &mut [u8], pad: u8) {
    dest.fill(pad);
    let n = value.len().min(dest.len());
    dest[..n].copy_from_slice(&value.as_bytes()[..n]);
}
