use crate::error::DxbcError;
use crate::fourcc::FourCC;
use core::fmt;
use core::ops::Range;

pub(crate) const DXBC_MAGIC: FourCC = FourCC(*b"DXBC");
// magic + checksum + reserved + total_size + chunk_count
pub(crate) const DXBC_HEADER_LEN: usize = 4 + 16 + 4 + 4 + 4;

// Hard cap on chunk count. Shader containers carry a handful of chunks; a
// hostile offset table must not buy megabytes of validation work.
const MAX_CHUNK_COUNT: u32 = 4096;

/// The fixed header of a `DXBC` container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DxbcHeader {
    /// Must be `DXBC`.
    pub magic: FourCC,
    /// MD5 checksum stored in the header. Not validated during parsing.
    pub checksum: [u8; 16],
    /// Declared total size of the container in bytes.
    pub total_size: u32,
    /// Number of entries in the chunk offset table.
    pub chunk_count: u32,
}

/// A single chunk within a parsed container.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct DxbcChunk<'a> {
    /// The chunk identifier (e.g. `RDEF`, `ISGN`, `MTLX`).
    pub fourcc: FourCC,
    /// Raw chunk payload, excluding the fourcc/size prefix.
    pub data: &'a [u8],
}

impl fmt::Debug for DxbcChunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DxbcChunk")
            .field("fourcc", &self.fourcc)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// A parsed `DXBC` container.
///
/// The input is treated as untrusted: every chunk offset and size is
/// validated against the declared `total_size` up front, so chunk access
/// after a successful parse cannot read out of bounds.
#[derive(Debug, Clone)]
pub struct DxbcFile<'a> {
    bytes: &'a [u8],
    header: DxbcHeader,
    // (fourcc, payload range within `bytes`), in file order.
    chunk_table: Vec<(FourCC, Range<usize>)>,
}

impl<'a> DxbcFile<'a> {
    /// Parses and validates a `DXBC` container.
    pub fn parse(bytes: &'a [u8]) -> Result<DxbcFile<'a>, DxbcError> {
        if bytes.len() < DXBC_HEADER_LEN {
            return Err(DxbcError::malformed_header(format!(
                "need at least {DXBC_HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let magic = FourCC([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != DXBC_MAGIC {
            return Err(DxbcError::malformed_header(format!(
                "bad magic {magic:?}, expected {DXBC_MAGIC:?}"
            )));
        }

        let mut checksum = [0u8; 16];
        checksum.copy_from_slice(&bytes[4..20]);

        // The reserved dword at offset 20 is ignored.
        let total_size = read_u32_le(bytes, 24, "total_size")?;
        let chunk_count = read_u32_le(bytes, 28, "chunk_count")?;

        if (total_size as usize) < DXBC_HEADER_LEN {
            return Err(DxbcError::malformed_header(format!(
                "total_size {total_size} is smaller than the fixed header ({DXBC_HEADER_LEN})"
            )));
        }
        if total_size as usize > bytes.len() {
            return Err(DxbcError::out_of_bounds(format!(
                "total_size {total_size} exceeds buffer length {}",
                bytes.len()
            )));
        }
        if chunk_count > MAX_CHUNK_COUNT {
            return Err(DxbcError::malformed_offsets(format!(
                "chunk_count {chunk_count} exceeds maximum {MAX_CHUNK_COUNT}"
            )));
        }

        let bytes = &bytes[..total_size as usize];

        let offset_table_len = (chunk_count as usize)
            .checked_mul(4)
            .ok_or_else(|| DxbcError::malformed_offsets("chunk_count overflows offset table"))?;
        let offset_table_end = DXBC_HEADER_LEN
            .checked_add(offset_table_len)
            .ok_or_else(|| DxbcError::malformed_offsets("offset table end overflows"))?;
        if offset_table_end > bytes.len() {
            return Err(DxbcError::malformed_offsets(format!(
                "chunk offset table ends at {offset_table_end}, but total_size is {}",
                bytes.len()
            )));
        }

        let mut chunk_table = Vec::with_capacity(chunk_count as usize);
        for i in 0..chunk_count as usize {
            let entry_pos = DXBC_HEADER_LEN + i * 4;
            let chunk_offset = read_u32_le(bytes, entry_pos, "chunk offset")? as usize;

            if chunk_offset < offset_table_end {
                return Err(DxbcError::malformed_offsets(format!(
                    "chunk {i} offset {chunk_offset} points into the header or offset table \
                     (need >= {offset_table_end})"
                )));
            }

            let data_start = chunk_offset.checked_add(8).ok_or_else(|| {
                DxbcError::malformed_offsets(format!(
                    "chunk {i} offset {chunk_offset} overflows when reading chunk header"
                ))
            })?;
            if data_start > bytes.len() {
                return Err(DxbcError::out_of_bounds(format!(
                    "chunk {i} header at {chunk_offset}..{data_start} is outside total_size {}",
                    bytes.len()
                )));
            }

            let fourcc = FourCC([
                bytes[chunk_offset],
                bytes[chunk_offset + 1],
                bytes[chunk_offset + 2],
                bytes[chunk_offset + 3],
            ]);
            let chunk_size = read_u32_le(bytes, chunk_offset + 4, "chunk size")? as usize;

            let data_end = data_start.checked_add(chunk_size).ok_or_else(|| {
                DxbcError::malformed_offsets(format!(
                    "chunk {i} ({fourcc}) size {chunk_size} overflows its data range"
                ))
            })?;
            if data_end > bytes.len() {
                return Err(DxbcError::out_of_bounds(format!(
                    "chunk {i} ({fourcc}) data at {data_start}..{data_end} is outside \
                     total_size {}",
                    bytes.len()
                )));
            }

            chunk_table.push((fourcc, data_start..data_end));
        }

        Ok(DxbcFile {
            bytes,
            header: DxbcHeader {
                magic,
                checksum,
                total_size,
                chunk_count,
            },
            chunk_table,
        })
    }

    /// Returns the parsed container header.
    pub fn header(&self) -> &DxbcHeader {
        &self.header
    }

    /// Returns the bytes covered by the container's declared `total_size`.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Iterates over all chunks in file order.
    pub fn chunks(&self) -> impl Iterator<Item = DxbcChunk<'a>> + '_ {
        let bytes = self.bytes;
        self.chunk_table.iter().map(move |(fourcc, range)| DxbcChunk {
            fourcc: *fourcc,
            data: &bytes[range.clone()],
        })
    }

    /// Returns the first chunk matching `fourcc`, if any.
    pub fn get_chunk(&self, fourcc: FourCC) -> Option<DxbcChunk<'a>> {
        self.chunks().find(|chunk| chunk.fourcc == fourcc)
    }

    /// Returns a human-readable summary of the container and its chunks.
    pub fn debug_summary(&self) -> String {
        use core::fmt::Write as _;

        let mut out = String::new();
        let _ = write!(
            &mut out,
            "{} total_size={} chunk_count={}",
            self.header.magic, self.header.total_size, self.header.chunk_count
        );
        for (idx, chunk) in self.chunks().enumerate() {
            let _ = write!(
                &mut out,
                "\n  [{idx:02}] {} {} bytes",
                chunk.fourcc,
                chunk.data.len()
            );
        }
        out
    }
}

pub(crate) fn read_u32_le(bytes: &[u8], offset: usize, what: &str) -> Result<u32, DxbcError> {
    let end = offset
        .checked_add(4)
        .ok_or_else(|| DxbcError::malformed_header(format!("{what} offset overflows")))?;
    let slice = bytes.get(offset..end).ok_or_else(|| {
        DxbcError::malformed_header(format!(
            "need 4 bytes for {what} at {offset}..{end}, but buffer length is {}",
            bytes.len()
        ))
    })?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
