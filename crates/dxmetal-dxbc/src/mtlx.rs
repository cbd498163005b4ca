//! Parser for the Metal backend extension chunk (`MTLX`).
//!
//! The HLSL-to-MSL cross-compiler appends this trailer chunk to each shader
//! container. It carries what the runtime needs beyond stock reflection:
//! the combined texture/sampler map, import/export symbol tables, a hash of
//! the cross-compiler input, the generated MSL source, and for compute
//! shaders the thread-group dimensions baked into the kernel.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! u32 version
//! u32 stage              0 = vertex, 1 = fragment, 2 = compute
//! u32 sampler_count
//! u32 import_count
//! u32 export_count
//! u32 input_hash
//! u32 symbols_offset     start of the MSL source within the chunk
//! [u32 x 3]              thread-group dims; present only when stage == compute
//! sampler map            sampler_count x 12-byte records
//! imports                import_count x 12-byte records
//! exports                export_count x 12-byte records
//! msl source             NUL-terminated, at symbols_offset
//! ```
//!
//! The sub-table offsets are not stored; they accumulate from the header
//! end by `count x record stride`.

use crate::error::DxbcError;
use crate::read;

/// Chunk identifier of the Metal backend extension trailer.
pub const MTLX_FOURCC: crate::FourCC = crate::FourCC(*b"MTLX");

const MTLX_VERSION: u32 = 1;
const MTLX_HEADER_LEN: usize = 28;
const THREAD_GROUP_LEN: usize = 12;
const SAMPLER_RECORD_LEN: usize = 12;
const SYMBOL_RECORD_LEN: usize = 12;

const MAX_TABLE_COUNT: u32 = 65536;

/// The shader stage a trailer was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MtlxStage {
    /// Vertex function.
    Vertex,
    /// Fragment function.
    Fragment,
    /// Compute kernel.
    Compute,
}

/// Stage-dependent trailer payload.
///
/// Only compute trailers carry thread-group dimensions; graphics trailers
/// have no such field to misread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MtlxStageExt {
    /// Vertex or fragment trailer.
    Graphics,
    /// Compute trailer.
    Compute {
        /// Thread-group dimensions baked into the kernel by the
        /// cross-compiler. Dispatches must use exactly these.
        threads_per_group: [u32; 3],
    },
}

/// One entry of the combined texture/sampler map.
///
/// MSL has no separate sampler objects at the source level the way HLSL
/// does; the cross-compiler pairs each texture slot with the sampler slot
/// it is sampled through and names the combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtlxSamplerMapEntry {
    /// HLSL texture register.
    pub texture_slot: u32,
    /// HLSL sampler register.
    pub sampler_slot: u32,
    /// Name of the combined sampler in the generated MSL.
    pub name: String,
}

/// An imported or exported symbol of the generated MSL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtlxSymbol {
    /// Raw symbol type.
    pub symbol_type: u32,
    /// Symbol identifier.
    pub id: u32,
    /// Symbol value.
    pub value: u32,
}

/// A parsed `MTLX` trailer chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtlxChunk {
    /// The stage this trailer was generated for.
    pub stage: MtlxStage,
    /// Hash of the cross-compiler input, for cache keying.
    pub input_hash: u32,
    /// Combined texture/sampler map.
    pub samplers: Vec<MtlxSamplerMapEntry>,
    /// Imported symbols.
    pub imports: Vec<MtlxSymbol>,
    /// Exported symbols.
    pub exports: Vec<MtlxSymbol>,
    /// The generated MSL source.
    pub msl_source: String,
    /// Stage-dependent payload.
    pub ext: MtlxStageExt,
}

impl MtlxChunk {
    /// Returns the sampler map entry for `texture_slot`, if any.
    pub fn sampler_for_texture(&self, texture_slot: u32) -> Option<&MtlxSamplerMapEntry> {
        self.samplers.iter().find(|s| s.texture_slot == texture_slot)
    }

    /// Returns the compute thread-group dimensions, or `None` for graphics
    /// trailers.
    pub fn threads_per_group(&self) -> Option<[u32; 3]> {
        match self.ext {
            MtlxStageExt::Graphics => None,
            MtlxStageExt::Compute { threads_per_group } => Some(threads_per_group),
        }
    }
}

/// Parses an `MTLX` chunk payload.
pub fn parse_mtlx_chunk(bytes: &[u8]) -> Result<MtlxChunk, DxbcError> {
    if bytes.len() < MTLX_HEADER_LEN {
        return Err(DxbcError::invalid_chunk(format!(
            "MTLX chunk is truncated: need {MTLX_HEADER_LEN} bytes for header, got {}",
            bytes.len()
        )));
    }

    let version = read::u32_le(bytes, 0, "version")?;
    if version != MTLX_VERSION {
        return Err(DxbcError::invalid_chunk(format!(
            "unsupported MTLX version {version}, expected {MTLX_VERSION}"
        )));
    }

    let stage = match read::u32_le(bytes, 4, "stage")? {
        0 => MtlxStage::Vertex,
        1 => MtlxStage::Fragment,
        2 => MtlxStage::Compute,
        other => {
            return Err(DxbcError::invalid_chunk(format!(
                "unknown MTLX stage {other}"
            )))
        }
    };

    let sampler_count = read::u32_le(bytes, 8, "sampler_count")?;
    let import_count = read::u32_le(bytes, 12, "import_count")?;
    let export_count = read::u32_le(bytes, 16, "export_count")?;
    let input_hash = read::u32_le(bytes, 20, "input_hash")?;
    let symbols_offset = read::u32_le(bytes, 24, "symbols_offset")? as usize;

    for (what, count) in [
        ("sampler_count", sampler_count),
        ("import_count", import_count),
        ("export_count", export_count),
    ] {
        if count > MAX_TABLE_COUNT {
            return Err(DxbcError::invalid_chunk(format!(
                "{what} {count} exceeds maximum {MAX_TABLE_COUNT}"
            )));
        }
    }

    let (ext, mut cursor) = match stage {
        MtlxStage::Compute => {
            let x = read::u32_le(bytes, MTLX_HEADER_LEN, "thread_group_x")?;
            let y = read::u32_le(bytes, MTLX_HEADER_LEN + 4, "thread_group_y")?;
            let z = read::u32_le(bytes, MTLX_HEADER_LEN + 8, "thread_group_z")?;
            if x == 0 || y == 0 || z == 0 {
                return Err(DxbcError::invalid_chunk(format!(
                    "compute thread-group dimensions [{x}, {y}, {z}] must be non-zero"
                )));
            }
            (
                MtlxStageExt::Compute {
                    threads_per_group: [x, y, z],
                },
                MTLX_HEADER_LEN + THREAD_GROUP_LEN,
            )
        }
        MtlxStage::Vertex | MtlxStage::Fragment => (MtlxStageExt::Graphics, MTLX_HEADER_LEN),
    };

    // Sub-tables accumulate from the header end.
    let mut samplers = Vec::with_capacity(sampler_count as usize);
    for i in 0..sampler_count as usize {
        let record = sub_table_record(bytes, cursor, i, SAMPLER_RECORD_LEN, "sampler map entry")?;
        let texture_slot = read::u32_le(bytes, record, "sampler texture_slot")?;
        let sampler_slot = read::u32_le(bytes, record + 4, "sampler sampler_slot")?;
        let name_offset = read::u32_le(bytes, record + 8, "sampler name_offset")?;
        let name = read::cstring(bytes, name_offset as usize, "sampler name")?.to_owned();
        samplers.push(MtlxSamplerMapEntry {
            texture_slot,
            sampler_slot,
            name,
        });
    }
    cursor = advance_table(cursor, sampler_count as usize, SAMPLER_RECORD_LEN)?;

    let imports = parse_symbols(bytes, cursor, import_count as usize, "import")?;
    cursor = advance_table(cursor, import_count as usize, SYMBOL_RECORD_LEN)?;

    let exports = parse_symbols(bytes, cursor, export_count as usize, "export")?;
    cursor = advance_table(cursor, export_count as usize, SYMBOL_RECORD_LEN)?;

    if symbols_offset < cursor {
        return Err(DxbcError::invalid_chunk(format!(
            "symbols_offset {symbols_offset} points before the end of the sub-tables ({cursor})"
        )));
    }
    let msl_source = read_source(bytes, symbols_offset)?;

    Ok(MtlxChunk {
        stage,
        input_hash,
        samplers,
        imports,
        exports,
        msl_source,
        ext,
    })
}

fn parse_symbols(
    bytes: &[u8],
    table_start: usize,
    count: usize,
    what: &str,
) -> Result<Vec<MtlxSymbol>, DxbcError> {
    let mut symbols = Vec::with_capacity(count);
    for i in 0..count {
        let record = sub_table_record(bytes, table_start, i, SYMBOL_RECORD_LEN, what)?;
        symbols.push(MtlxSymbol {
            symbol_type: read::u32_le(bytes, record, "symbol type")?,
            id: read::u32_le(bytes, record + 4, "symbol id")?,
            value: read::u32_le(bytes, record + 8, "symbol value")?,
        });
    }
    Ok(symbols)
}

fn sub_table_record(
    bytes: &[u8],
    table_start: usize,
    index: usize,
    record_len: usize,
    what: &str,
) -> Result<usize, DxbcError> {
    let start = table_start
        .checked_add(index * record_len)
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

fn advance_table(start: usize, count: usize, record_len: usize) -> Result<usize, DxbcError> {
    count
        .checked_mul(record_len)
        .and_then(|len| start.checked_add(len))
        .ok_or_else(|| DxbcError::invalid_chunk("sub-table size overflows"))
}

fn read_source(bytes: &[u8], offset: usize) -> Result<String, DxbcError> {
    let tail = bytes.get(offset..).ok_or_else(|| {
        DxbcError::invalid_chunk(format!(
            "symbols_offset {offset} is outside chunk length {}",
            bytes.len()
        ))
    })?;
    let nul = tail.iter().position(|&b| b == 0).ok_or_else(|| {
        DxbcError::invalid_chunk(format!(
            "MSL source at offset {offset} is missing a null terminator"
        ))
    })?;
    core::str::from_utf8(&tail[..nul])
        .map(str::to_owned)
        .map_err(|_| {
            DxbcError::invalid_chunk(format!("MSL source at offset {offset} is not valid UTF-8"))
        })
}
