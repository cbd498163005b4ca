//! Parser for DXBC resource definition chunks (`RDEF`).
//!
//! `RDEF` carries the shader's constant buffer layouts and its bound
//! resources (textures, samplers, constant buffers, UAVs), which the
//! translation layer needs to build and validate Metal argument tables.

use crate::error::DxbcError;
use crate::read;

const RDEF_HEADER_LEN: usize = 28;
const RESOURCE_BINDING_LEN: usize = 32;
const CONSTANT_BUFFER_LEN: usize = 24;
const VARIABLE_LEN_SM4: usize = 24;
const VARIABLE_LEN_SM5: usize = 40;

// Caps keep hostile count fields from driving huge allocations.
const MAX_TABLE_COUNT: u32 = 65536;

/// The kind of a bound shader resource (`D3D_SHADER_INPUT_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdefInputType {
    /// `cbuffer` constant buffer.
    ConstantBuffer,
    /// `tbuffer` texture buffer.
    TextureBuffer,
    /// Shader resource view (texture or typed buffer).
    Texture,
    /// Sampler state.
    Sampler,
    /// Read/write typed UAV.
    UavRwTyped,
    /// Structured buffer SRV.
    Structured,
    /// Read/write structured UAV.
    UavRwStructured,
    /// Raw byte-address buffer SRV.
    ByteAddress,
    /// Read/write byte-address UAV.
    UavRwByteAddress,
    /// Any other raw `D3D_SHADER_INPUT_TYPE` value.
    Other(u32),
}

impl RdefInputType {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => RdefInputType::ConstantBuffer,
            1 => RdefInputType::TextureBuffer,
            2 => RdefInputType::Texture,
            3 => RdefInputType::Sampler,
            4 => RdefInputType::UavRwTyped,
            5 => RdefInputType::Structured,
            6 => RdefInputType::UavRwStructured,
            7 => RdefInputType::ByteAddress,
            8 => RdefInputType::UavRwByteAddress,
            other => RdefInputType::Other(other),
        }
    }

    /// Returns `true` for unordered-access (read/write) resource kinds.
    pub fn is_uav(&self) -> bool {
        matches!(
            self,
            RdefInputType::UavRwTyped
                | RdefInputType::UavRwStructured
                | RdefInputType::UavRwByteAddress
        )
    }
}

/// A single resource-binding record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefResourceBinding {
    /// The resource name as written in HLSL.
    pub name: String,
    /// The resource kind.
    pub input_type: RdefInputType,
    /// First bind point (register index).
    pub bind_point: u32,
    /// Number of contiguous bind points (register array size).
    pub bind_count: u32,
}

/// A variable inside a constant buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefVariable {
    /// The variable name.
    pub name: String,
    /// Byte offset within the constant buffer.
    pub start_offset: u32,
    /// Declared byte size.
    pub size: u32,
    /// Raw `D3D_SHADER_VARIABLE_FLAGS`.
    pub flags: u32,
    /// First sampler slot referenced by this variable, if the shader model
    /// records sampler back-references (SM5 layout).
    pub start_sampler: Option<u32>,
    /// Number of sampler slots referenced, if recorded.
    pub sampler_size: Option<u32>,
}

/// A constant buffer and its member variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefConstantBuffer {
    /// The buffer name (`$Globals` for the implicit global buffer).
    pub name: String,
    /// Declared byte size of the whole buffer.
    pub size: u32,
    /// Member variables, in record order.
    pub variables: Vec<RdefVariable>,
}

/// A parsed `RDEF` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefChunk {
    /// Shader model major version from the target field.
    pub major_version: u8,
    /// Shader model minor version from the target field.
    pub minor_version: u8,
    /// Constant buffers in record order.
    pub constant_buffers: Vec<RdefConstantBuffer>,
    /// Bound resources in record order.
    pub resource_bindings: Vec<RdefResourceBinding>,
}

impl RdefChunk {
    /// Looks up a resource binding by name.
    pub fn find_resource(&self, name: &str) -> Option<&RdefResourceBinding> {
        self.resource_bindings.iter().find(|r| r.name == name)
    }

    /// Looks up a constant buffer by name.
    pub fn find_constant_buffer(&self, name: &str) -> Option<&RdefConstantBuffer> {
        self.constant_buffers.iter().find(|cb| cb.name == name)
    }
}

/// Parses an `RDEF` chunk payload.
pub fn parse_rdef_chunk(bytes: &[u8]) -> Result<RdefChunk, DxbcError> {
    if bytes.len() < RDEF_HEADER_LEN {
        return Err(DxbcError::invalid_chunk(format!(
            "RDEF chunk is truncated: need {RDEF_HEADER_LEN} bytes for header, got {}",
            bytes.len()
        )));
    }

    let cb_count = read::u32_le(bytes, 0, "constant_buffer_count")?;
    let cb_offset = read::u32_le(bytes, 4, "constant_buffer_offset")?;
    let binding_count = read::u32_le(bytes, 8, "resource_binding_count")?;
    let binding_offset = read::u32_le(bytes, 12, "resource_binding_offset")?;
    let target = read::u32_le(bytes, 16, "target_version")?;
    // Offsets 20..28 hold compile flags and the creator string offset,
    // neither of which matters for binding translation.

    let minor_version = (target & 0xFF) as u8;
    let major_version = ((target >> 8) & 0xFF) as u8;

    for (what, count) in [
        ("constant_buffer_count", cb_count),
        ("resource_binding_count", binding_count),
    ] {
        if count > MAX_TABLE_COUNT {
            return Err(DxbcError::invalid_chunk(format!(
                "{what} {count} exceeds maximum {MAX_TABLE_COUNT}"
            )));
        }
    }

    let variable_len = if major_version >= 5 {
        VARIABLE_LEN_SM5
    } else {
        VARIABLE_LEN_SM4
    };

    let resource_bindings = parse_resource_bindings(bytes, binding_count, binding_offset)?;
    let constant_buffers = parse_constant_buffers(bytes, cb_count, cb_offset, variable_len)?;

    Ok(RdefChunk {
        major_version,
        minor_version,
        constant_buffers,
        resource_bindings,
    })
}

fn parse_resource_bindings(
    bytes: &[u8],
    count: u32,
    offset: u32,
) -> Result<Vec<RdefResourceBinding>, DxbcError> {
    let mut bindings = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let record = table_record(bytes, offset, i, RESOURCE_BINDING_LEN, "resource binding")?;

        let name_offset = read::u32_le(bytes, record, "resource name_offset")?;
        let input_type = read::u32_le(bytes, record + 4, "resource input_type")?;
        // return type, view dimension, and sample count occupy 8..20.
        let bind_point = read::u32_le(bytes, record + 20, "resource bind_point")?;
        let bind_count = read::u32_le(bytes, record + 24, "resource bind_count")?;

        let name = read::cstring(bytes, name_offset as usize, "resource name")?.to_owned();

        bindings.push(RdefResourceBinding {
            name,
            input_type: RdefInputType::from_raw(input_type),
            bind_point,
            bind_count,
        });
    }
    Ok(bindings)
}

fn parse_constant_buffers(
    bytes: &[u8],
    count: u32,
    offset: u32,
    variable_len: usize,
) -> Result<Vec<RdefConstantBuffer>, DxbcError> {
    let mut buffers = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let record = table_record(bytes, offset, i, CONSTANT_BUFFER_LEN, "constant buffer")?;

        let name_offset = read::u32_le(bytes, record, "constant buffer name_offset")?;
        let var_count = read::u32_le(bytes, record + 4, "constant buffer variable_count")?;
        let var_offset = read::u32_le(bytes, record + 8, "constant buffer variable_offset")?;
        let size = read::u32_le(bytes, record + 12, "constant buffer size")?;

        if var_count > MAX_TABLE_COUNT {
            return Err(DxbcError::invalid_chunk(format!(
                "constant buffer {i} variable_count {var_count} exceeds maximum {MAX_TABLE_COUNT}"
            )));
        }

        let name = read::cstring(bytes, name_offset as usize, "constant buffer name")?.to_owned();

        let mut variables = Vec::with_capacity(var_count as usize);
        for v in 0..var_count as usize {
            let var_record = table_record(bytes, var_offset, v, variable_len, "variable")?;

            let var_name_offset = read::u32_le(bytes, var_record, "variable name_offset")?;
            let start_offset = read::u32_le(bytes, var_record + 4, "variable start_offset")?;
            let var_size = read::u32_le(bytes, var_record + 8, "variable size")?;
            let flags = read::u32_le(bytes, var_record + 12, "variable flags")?;

            let (start_sampler, sampler_size) = if variable_len == VARIABLE_LEN_SM5 {
                // SM5 appends texture/sampler back-references after the
                // type and default-value offsets.
                let start_sampler = read::u32_le(bytes, var_record + 32, "variable start_sampler")?;
                let sampler_size = read::u32_le(bytes, var_record + 36, "variable sampler_size")?;
                (Some(start_sampler), Some(sampler_size))
            } else {
                (None, None)
            };

            let var_name = read::cstring(bytes, var_name_offset as usize, "variable name")?;

            variables.push(RdefVariable {
                name: var_name.to_owned(),
                start_offset,
                size: var_size,
                flags,
                start_sampler,
                sampler_size,
            });
        }

        buffers.push(RdefConstantBuffer {
            name,
            size,
            variables,
        });
    }
    Ok(buffers)
}

/// Computes the validated start of record `index` in a table at `offset`.
fn table_record(
    bytes: &[u8],
    offset: u32,
    index: usize,
    record_len: usize,
    what: &str,
) -> Result<usize, DxbcError> {
    let start = (offset as usize)
        .checked_add(index.checked_mul(record_len).ok_or_else(|| {
            DxbcError::invalid_chunk(format!("{what} {index} offset overflows"))
        })?)
        .ok_or_else(|| DxbcError::invalid_chunk(format!("{what} {index} start overflows")))?;
    let end = start
        .checked_add(record_len)
        .ok_or_else(|| DxbcError::invalid_chunk(format!("{what} {index} end overflows")))?;
    if end > bytes.len() {
        return Err(DxbcError::invalid_chunk(format!(
            "{what} {index} at {start}..{end} is outside chunk length {}",
            bytes.len()
        )));
    }
    Ok(start)
}
