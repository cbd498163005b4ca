//! Bounds-checked readers shared by the chunk parsers.
//!
//! Every reader takes a `what` label so error messages name the field that
//! failed, not just an offset.

use crate::error::DxbcError;

// Upper bound on NUL-terminated name lengths. Reflection names are short
// identifiers; anything longer indicates a bad offset.
const MAX_NAME_LEN: usize = 4096;

pub(crate) fn u32_le(bytes: &[u8], offset: usize, what: &str) -> Result<u32, DxbcError> {
    let end = offset
        .checked_add(4)
        .ok_or_else(|| DxbcError::invalid_chunk(format!("{what} offset overflows")))?;
    let slice = bytes.get(offset..end).ok_or_else(|| {
        DxbcError::invalid_chunk(format!(
            "need 4 bytes for {what} at {offset}..{end}, but chunk length is {}",
            bytes.len()
        ))
    })?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

pub(crate) fn u16_le(bytes: &[u8], offset: usize, what: &str) -> Result<u16, DxbcError> {
    let end = offset
        .checked_add(2)
        .ok_or_else(|| DxbcError::invalid_chunk(format!("{what} offset overflows")))?;
    let slice = bytes.get(offset..end).ok_or_else(|| {
        DxbcError::invalid_chunk(format!(
            "need 2 bytes for {what} at {offset}..{end}, but chunk length is {}",
            bytes.len()
        ))
    })?;
    Ok(u16::from_le_bytes([slice[0], slice[1]]))
}

pub(crate) fn byte(bytes: &[u8], offset: usize, what: &str) -> Result<u8, DxbcError> {
    bytes.get(offset).copied().ok_or_else(|| {
        DxbcError::invalid_chunk(format!(
            "need 1 byte for {what} at {offset}, but chunk length is {}",
            bytes.len()
        ))
    })
}

/// Reads a NUL-terminated UTF-8 string at `offset`.
pub(crate) fn cstring<'a>(bytes: &'a [u8], offset: usize, what: &str) -> Result<&'a str, DxbcError> {
    let tail = bytes.get(offset..).ok_or_else(|| {
        DxbcError::invalid_chunk(format!(
            "{what} offset {offset} is outside chunk length {}",
            bytes.len()
        ))
    })?;
    let scan = &tail[..tail.len().min(MAX_NAME_LEN)];
    let nul = scan.iter().position(|&b| b == 0).ok_or_else(|| {
        DxbcError::invalid_chunk(format!(
            "{what} at offset {offset} has no null terminator within {MAX_NAME_LEN} bytes"
        ))
    })?;
    core::str::from_utf8(&scan[..nul])
        .map_err(|_| DxbcError::invalid_chunk(format!("{what} at offset {offset} is not valid UTF-8")))
}
