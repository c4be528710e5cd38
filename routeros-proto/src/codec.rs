//! Word framing.
//!
//! Every word on the wire is prefixed with its length, encoded in one to five bytes
//! depending on its magnitude. The high bits of the first byte tell how many bytes
//! follow:
//!
//! | length range                | bytes | first byte  |
//! |-----------------------------|-------|-------------|
//! | `0x00 ..= 0x7F`             | 1     | `0xxxxxxx`  |
//! | `0x80 ..= 0x3FFF`           | 2     | `10xxxxxx`  |
//! | `0x4000 ..= 0x1F_FFFF`      | 3     | `110xxxxx`  |
//! | `0x20_0000 ..= 0xFFF_FFFF`  | 4     | `1110xxxx`  |
//! | `0x1000_0000 ..= u32::MAX`  | 5     | `11110000`  |
//!
//! First bytes `0xF8..=0xFF` are reserved.
//!
//! More details about the protocol can be found in the Mikrotik Wiki:
//! [Mikrotik API Protocol](https://wiki.mikrotik.com/wiki/Manual:API#Protocol)

use crate::error::{DecodeError, EncodeError};

/// Largest length that still fits the one byte form.
const MAX_1: u32 = 0x7F;
const MAX_2: u32 = 0x3FFF;
const MAX_3: u32 = 0x1F_FFFF;
const MAX_4: u32 = 0xFFF_FFFF;

/// Encodes `len` as a RouterOS length prefix.
///
/// # Errors
///
/// Returns [`EncodeError::TooLong`] if `len` exceeds `u32::MAX`.
pub fn encode_length(len: usize) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::with_capacity(5);
    write_length(&mut buf, len)?;
    Ok(buf)
}

/// Appends the length prefix for `len` to `buf`.
pub(crate) fn write_length(buf: &mut Vec<u8>, len: usize) -> Result<(), EncodeError> {
    let len = u32::try_from(len).map_err(|_| EncodeError::TooLong(len))?;
    match len {
        0..=MAX_1 => buf.push(len as u8),
        0x80..=MAX_2 => buf.extend_from_slice(&((len | 0x8000) as u16).to_be_bytes()),
        0x4000..=MAX_3 => buf.extend_from_slice(&(len | 0xC0_0000).to_be_bytes()[1..]),
        0x20_0000..=MAX_4 => buf.extend_from_slice(&(len | 0xE000_0000).to_be_bytes()),
        _ => {
            buf.push(0xF0);
            buf.extend_from_slice(&len.to_be_bytes());
        }
    }
    Ok(())
}

/// Decodes a length prefix from the start of `data`.
///
/// Returns the length and the number of prefix bytes it occupied.
///
/// # Errors
///
/// - [`DecodeError::Incomplete`] when `data` is shorter than the prefix announced by its first byte.
/// - [`DecodeError::Reserved`] when the first byte is `0xF8` or above.
pub fn decode_length(data: &[u8]) -> Result<(u32, usize), DecodeError> {
    let first = *data.first().ok_or(DecodeError::Incomplete { needed: 1 })?;

    let (size, mask) = if first & 0x80 == 0x00 {
        (1, 0x7F)
    } else if first & 0xC0 == 0x80 {
        (2, 0x3F)
    } else if first & 0xE0 == 0xC0 {
        (3, 0x1F)
    } else if first & 0xF0 == 0xE0 {
        (4, 0x0F)
    } else if first & 0xF8 == 0xF0 {
        // The five byte form carries the full 32 bits after the marker.
        (5, 0x00)
    } else {
        return Err(DecodeError::Reserved(first));
    };

    if data.len() < size {
        return Err(DecodeError::Incomplete {
            needed: size - data.len(),
        });
    }

    let len = data[1..size]
        .iter()
        .fold(u32::from(first & mask), |acc, b| (acc << 8) | u32::from(*b));

    Ok((len, size))
}

/// Frames a single word: its length prefix followed by its bytes.
///
/// # Errors
///
/// Returns [`EncodeError::TooLong`] if the word exceeds `u32::MAX` bytes.
pub fn encode_word(word: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::with_capacity(word.len() + 5);
    write_word(&mut buf, word)?;
    Ok(buf)
}

pub(crate) fn write_word(buf: &mut Vec<u8>, word: &[u8]) -> Result<(), EncodeError> {
    write_length(buf, word.len())?;
    buf.extend_from_slice(word);
    Ok(())
}

/// Decodes one framed word from the start of `data`.
///
/// Returns the word's bytes, borrowed from `data`, and the total number of bytes consumed
/// (prefix included).
///
/// # Errors
///
/// Same as [`decode_length`], plus [`DecodeError::Incomplete`] when the word body is truncated
/// and [`DecodeError::Reserved`] when the declared length does not fit in memory.
pub fn decode_word(data: &[u8]) -> Result<(&[u8], usize), DecodeError> {
    let (len, prefix) = decode_length(data)?;
    // Will never run on architectures where usize is < 32 bits so converting to usize is safe.
    // On 32-bit targets a length near u32::MAX cannot be addressed at all.
    let end = prefix
        .checked_add(len as usize)
        .ok_or(DecodeError::Reserved(data[0]))?;
    match data.get(prefix..end) {
        Some(word) => Ok((word, end)),
        None => Err(DecodeError::Incomplete {
            needed: end - data.len(),
        }),
    }
}
