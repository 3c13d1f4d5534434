//! Message key decoding.
//!
//! Upstream producers write keys as an unsigned 64-bit identifier in
//! little-endian byte order. Only the first eight bytes are significant.

use thiserror::Error;

pub const KEY_WIDTH: usize = 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecodeError {
    #[error("message key is {len} bytes, expected at least {KEY_WIDTH}")]
    TooShort { len: usize },
}

pub fn decode_key(key: &[u8]) -> Result<u64, KeyDecodeError> {
    let bytes: [u8; KEY_WIDTH] = key
        .get(..KEY_WIDTH)
        .and_then(|prefix| prefix.try_into().ok())
        .ok_or(KeyDecodeError::TooShort { len: key.len() })?;
    Ok(u64::from_le_bytes(bytes))
}
