//! Parsers for DXBC signature chunks (`ISGN`, `OSGN` and `ISG1`, `OSG1`).
//!
//! Signatures map shader inputs/outputs to registers and semantics. The
//! vertex input signature drives vertex-descriptor construction; the
//! fragment output signature drives attachment validation.

use crate::error::DxbcError;
use crate::fourcc::FourCC;
use crate::read;

const SIGNATURE_HEADER_LEN: usize = 8;
const ENTRY_LEN_LEGACY: usize = 24;
const ENTRY_LEN_EXTENDED: usize = 32;

/// A parsed signature chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureChunk {
    /// Signature parameters in record order.
    pub parameters: Vec<SignatureParameter>,
}

/// A single parameter of a shader signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParameter {
    /// Semantic name (e.g. `"POSITION"`, `"TEXCOORD"`).
    pub semantic_name: String,
    /// Semantic index (`1` for `TEXCOORD1`).
    pub semantic_index: u32,
    /// System value type (`D3D_NAME`), raw.
    pub system_value_type: u32,
    /// Register component type (`D3D_REGISTER_COMPONENT_TYPE`), raw.
    pub component_type: u32,
    /// Assigned register index.
    pub register: u32,
    /// Component presence mask.
    pub mask: u8,
    /// Read (inputs) or write (outputs) mask.
    pub read_write_mask: u8,
    /// Geometry-shader stream index; `0` in the legacy encoding.
    pub stream: u32,
}

/// Parses a signature chunk payload, inferring the entry layout.
pub fn parse_signature_chunk(bytes: &[u8]) -> Result<SignatureChunk, DxbcError> {
    parse_signature_chunk_impl(None, bytes)
}

/// Parses a signature chunk payload, using `fourcc` to pick the entry layout
/// (`*SG1` identifiers use the extended 32-byte records).
pub fn parse_signature_chunk_for_fourcc(
    fourcc: FourCC,
    bytes: &[u8],
) -> Result<SignatureChunk, DxbcError> {
    parse_signature_chunk_impl(Some(fourcc), bytes)
}

fn parse_signature_chunk_impl(
    fourcc: Option<FourCC>,
    bytes: &[u8],
) -> Result<SignatureChunk, DxbcError> {
    if bytes.len() < SIGNATURE_HEADER_LEN {
        return Err(DxbcError::invalid_chunk(format!(
            "signature chunk is truncated: need {SIGNATURE_HEADER_LEN} bytes for header, got {}",
            bytes.len()
        )));
    }

    let param_count = read::u32_le(bytes, 0, "param_count")? as usize;
    let param_offset = read::u32_le(bytes, 4, "param_offset")? as usize;

    if param_count == 0 {
        return Ok(SignatureChunk {
            parameters: Vec::new(),
        });
    }
    if param_offset < SIGNATURE_HEADER_LEN {
        return Err(DxbcError::invalid_chunk(format!(
            "param_offset {param_offset} points into signature header"
        )));
    }

    match fourcc {
        // An explicit chunk ID is authoritative: `*SG1` identifiers use the
        // extended 32-byte records, everything else the legacy 24-byte ones.
        Some(f) => {
            let entry_len = if f.0[3] == b'1' {
                ENTRY_LEN_EXTENDED
            } else {
                ENTRY_LEN_LEGACY
            };
            let parameters = parse_entries(bytes, param_count, param_offset, entry_len)?;
            Ok(SignatureChunk { parameters })
        }
        // Without an ID the layout pick is heuristic; retry once with the
        // other record size before giving up.
        None => {
            let entry_len = if detect_extended_layout(bytes, param_offset) {
                ENTRY_LEN_EXTENDED
            } else {
                ENTRY_LEN_LEGACY
            };
            match parse_entries(bytes, param_count, param_offset, entry_len) {
                Ok(parameters) => Ok(SignatureChunk { parameters }),
                Err(first) => {
                    let other = ENTRY_LEN_LEGACY + ENTRY_LEN_EXTENDED - entry_len;
                    parse_entries(bytes, param_count, param_offset, other)
                        .map(|parameters| SignatureChunk { parameters })
                        .map_err(|second| {
                            DxbcError::invalid_chunk(format!(
                                "failed to parse signature entries ({entry_len}-byte layout: {}; \
                                 {other}-byte layout: {})",
                                first.context(),
                                second.context()
                            ))
                        })
                }
            }
        }
    }
}

fn parse_entries(
    bytes: &[u8],
    param_count: usize,
    param_offset: usize,
    entry_len: usize,
) -> Result<Vec<SignatureParameter>, DxbcError> {
    let table_end = param_count
        .checked_mul(entry_len)
        .and_then(|len| param_offset.checked_add(len))
        .ok_or_else(|| DxbcError::invalid_chunk("signature table size overflows"))?;
    if table_end > bytes.len() {
        return Err(DxbcError::invalid_chunk(format!(
            "signature table at {param_offset}..{table_end} is outside chunk length {}",
            bytes.len()
        )));
    }

    let mut parameters = Vec::with_capacity(param_count);
    for i in 0..param_count {
        let entry = param_offset + i * entry_len;

        // The extended layout prepends a stream dword; the remaining fields
        // shift by 4.
        let (stream, base) = if entry_len == ENTRY_LEN_EXTENDED {
            (read::u32_le(bytes, entry, "stream")?, entry + 4)
        } else {
            (0, entry)
        };

        let name_offset = read::u32_le(bytes, base, "semantic_name_offset")? as usize;
        let semantic_index = read::u32_le(bytes, base + 4, "semantic_index")?;
        let system_value_type = read::u32_le(bytes, base + 8, "system_value_type")?;
        let component_type = read::u32_le(bytes, base + 12, "component_type")?;
        let register = read::u32_le(bytes, base + 16, "register")?;
        let mask = read::byte(bytes, base + 20, "mask")?;
        let read_write_mask = read::byte(bytes, base + 21, "read_write_mask")?;

        if (param_offset..table_end).contains(&name_offset) {
            return Err(DxbcError::invalid_chunk(format!(
                "entry {i} semantic_name_offset {name_offset} points into the signature table"
            )));
        }
        let semantic_name = read::cstring(bytes, name_offset, "semantic_name")
            .map_err(|e| DxbcError::invalid_chunk(format!("entry {i}: {}", e.context())))?;

        parameters.push(SignatureParameter {
            semantic_name: semantic_name.to_owned(),
            semantic_index,
            system_value_type,
            component_type,
            register,
            mask,
            read_write_mask,
            stream,
        });
    }
    Ok(parameters)
}

fn detect_extended_layout(bytes: &[u8], param_offset: usize) -> bool {
    // Heuristic for ambiguous chunk IDs: in the extended layout the first
    // dword of the first entry is the stream index, a tiny value. In the
    // legacy layout the same dword is a string-table offset, which for any
    // real shader lands well past the 8-byte header.
    let Some(end) = param_offset.checked_add(4) else {
        return false;
    };
    let Some(slice) = bytes.get(param_offset..end) else {
        return false;
    };
    u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]) <= 3
}
