//! Builders for synthetic shader containers.
//!
//! These produce structurally valid blobs for tests: correct chunk offset
//! tables, correct `total_size`, and string tables with backfilled name
//! offsets. The header checksum is left as zeros; parsing does not validate
//! it.

use crate::FourCC;

/// Builds a minimal `DXBC` container containing the provided chunks.
pub fn build_container(chunks: &[(FourCC, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();

    out.extend_from_slice(b"DXBC");
    out.extend_from_slice(&[0u8; 16]); // checksum, unset
    out.extend_from_slice(&1u32.to_le_bytes()); // reserved
    out.extend_from_slice(&0u32.to_le_bytes()); // total_size, backfilled below

    let chunk_count = u32::try_from(chunks.len()).expect("chunk_count does not fit in u32");
    out.extend_from_slice(&chunk_count.to_le_bytes());

    let offset_table_pos = out.len();
    out.resize(out.len() + 4 * chunks.len(), 0);

    for (i, (fourcc, data)) in chunks.iter().enumerate() {
        let offset = u32::try_from(out.len()).expect("chunk offset does not fit in u32");
        out[offset_table_pos + i * 4..offset_table_pos + i * 4 + 4]
            .copy_from_slice(&offset.to_le_bytes());

        let size = u32::try_from(data.len()).expect("chunk size does not fit in u32");
        out.extend_from_slice(&fourcc.0);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(data);
    }

    let total_size = u32::try_from(out.len()).expect("total_size does not fit in u32");
    out[24..28].copy_from_slice(&total_size.to_le_bytes());

    out
}

/// A constant buffer for [`build_rdef_chunk`].
pub struct CbSpec<'a> {
    /// Buffer name.
    pub name: &'a str,
    /// Declared byte size.
    pub size: u32,
    /// Member variables: `(name, start_offset, size)`.
    pub variables: &'a [(&'a str, u32, u32)],
}

/// A resource binding for [`build_rdef_chunk`].
pub struct ResSpec<'a> {
    /// Resource name.
    pub name: &'a str,
    /// Raw `D3D_SHADER_INPUT_TYPE` (0 = cbuffer, 2 = texture, 3 = sampler).
    pub input_type: u32,
    /// First register.
    pub bind_point: u32,
    /// Register count.
    pub bind_count: u32,
}

/// Builds an SM5-layout `RDEF` chunk payload.
pub fn build_rdef_chunk(constant_buffers: &[CbSpec<'_>], resources: &[ResSpec<'_>]) -> Vec<u8> {
    const HEADER_LEN: usize = 28;
    const CB_LEN: usize = 24;
    const RES_LEN: usize = 32;
    const VAR_LEN: usize = 40; // SM5 layout with sampler back-references

    let mut out = Vec::new();
    // (patch position, string) pairs resolved against the trailing string table.
    let mut strings: Vec<(usize, String)> = Vec::new();

    let cb_table = HEADER_LEN;
    let res_table = cb_table + constant_buffers.len() * CB_LEN;
    let mut var_table = res_table + resources.len() * RES_LEN;

    out.extend_from_slice(&(constant_buffers.len() as u32).to_le_bytes());
    out.extend_from_slice(&(cb_table as u32).to_le_bytes());
    out.extend_from_slice(&(resources.len() as u32).to_le_bytes());
    out.extend_from_slice(&(res_table as u32).to_le_bytes());
    out.extend_from_slice(&0x0500u32.to_le_bytes()); // target: SM 5.0
    out.extend_from_slice(&0u32.to_le_bytes()); // flags
    out.extend_from_slice(&0u32.to_le_bytes()); // creator offset, unused

    for cb in constant_buffers {
        strings.push((out.len(), cb.name.to_owned()));
        out.extend_from_slice(&0u32.to_le_bytes()); // name offset, backfilled
        out.extend_from_slice(&(cb.variables.len() as u32).to_le_bytes());
        out.extend_from_slice(&(var_table as u32).to_le_bytes());
        out.extend_from_slice(&cb.size.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // flags
        out.extend_from_slice(&0u32.to_le_bytes()); // type
        var_table += cb.variables.len() * VAR_LEN;
    }

    for res in resources {
        strings.push((out.len(), res.name.to_owned()));
        out.extend_from_slice(&0u32.to_le_bytes()); // name offset, backfilled
        out.extend_from_slice(&res.input_type.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // return type
        out.extend_from_slice(&0u32.to_le_bytes()); // view dimension
        out.extend_from_slice(&0u32.to_le_bytes()); // sample count
        out.extend_from_slice(&res.bind_point.to_le_bytes());
        out.extend_from_slice(&res.bind_count.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // flags
    }

    for cb in constant_buffers {
        for (name, start_offset, size) in cb.variables {
            strings.push((out.len(), (*name).to_owned()));
            out.extend_from_slice(&0u32.to_le_bytes()); // name offset, backfilled
            out.extend_from_slice(&start_offset.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&2u32.to_le_bytes()); // flags: used
            out.extend_from_slice(&0u32.to_le_bytes()); // type offset
            out.extend_from_slice(&0u32.to_le_bytes()); // default value offset
            out.extend_from_slice(&0u32.to_le_bytes()); // start texture
            out.extend_from_slice(&0u32.to_le_bytes()); // texture size
            out.extend_from_slice(&0u32.to_le_bytes()); // start sampler
            out.extend_from_slice(&0u32.to_le_bytes()); // sampler size
        }
    }

    backfill_strings(&mut out, &strings);
    out
}

/// A signature parameter for [`build_signature_chunk`]:
/// `(semantic_name, semantic_index, register, mask)`.
pub type SigParamSpec<'a> = (&'a str, u32, u32, u8);

/// Builds a signature chunk payload.
///
/// `extended` selects the 32-byte `*SG1` record layout; otherwise the
/// legacy 24-byte layout is used.
pub fn build_signature_chunk(params: &[SigParamSpec<'_>], extended: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut strings: Vec<(usize, String)> = Vec::new();

    out.extend_from_slice(&(params.len() as u32).to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes()); // param table follows the header

    for (name, semantic_index, register, mask) in params {
        if extended {
            out.extend_from_slice(&0u32.to_le_bytes()); // stream
        }
        strings.push((out.len(), (*name).to_owned()));
        out.extend_from_slice(&0u32.to_le_bytes()); // name offset, backfilled
        out.extend_from_slice(&semantic_index.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // system value type
        out.extend_from_slice(&3u32.to_le_bytes()); // component type: float32
        out.extend_from_slice(&register.to_le_bytes());
        out.push(*mask);
        out.push(*mask); // read/write mask
        out.extend_from_slice(&[0u8; 2]); // padding
        if extended {
            out.extend_from_slice(&0u32.to_le_bytes()); // min precision
        }
    }

    backfill_strings(&mut out, &strings);
    out
}

/// Parameters for [`build_mtlx_chunk`].
pub struct MtlxSpec<'a> {
    /// 0 = vertex, 1 = fragment, 2 = compute.
    pub stage: u32,
    /// Thread-group dims; written only when `stage` is compute.
    pub threads_per_group: [u32; 3],
    /// Sampler map entries: `(texture_slot, sampler_slot, name)`.
    pub samplers: &'a [(u32, u32, &'a str)],
    /// Hash of the cross-compiler input.
    pub input_hash: u32,
    /// Generated MSL source.
    pub msl_source: &'a str,
}

/// Builds an `MTLX` backend trailer chunk payload.
pub fn build_mtlx_chunk(spec: &MtlxSpec<'_>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut strings: Vec<(usize, String)> = Vec::new();

    out.extend_from_slice(&1u32.to_le_bytes()); // version
    out.extend_from_slice(&spec.stage.to_le_bytes());
    out.extend_from_slice(&(spec.samplers.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // import count
    out.extend_from_slice(&0u32.to_le_bytes()); // export count
    out.extend_from_slice(&spec.input_hash.to_le_bytes());
    let symbols_offset_pos = out.len();
    out.extend_from_slice(&0u32.to_le_bytes()); // symbols offset, backfilled

    if spec.stage == 2 {
        for dim in spec.threads_per_group {
            out.extend_from_slice(&dim.to_le_bytes());
        }
    }

    for (texture_slot, sampler_slot, name) in spec.samplers {
        out.extend_from_slice(&texture_slot.to_le_bytes());
        out.extend_from_slice(&sampler_slot.to_le_bytes());
        strings.push((out.len(), (*name).to_owned()));
        out.extend_from_slice(&0u32.to_le_bytes()); // name offset, backfilled
    }

    backfill_strings(&mut out, &strings);

    let symbols_offset = out.len() as u32;
    out[symbols_offset_pos..symbols_offset_pos + 4]
        .copy_from_slice(&symbols_offset.to_le_bytes());
    out.extend_from_slice(spec.msl_source.as_bytes());
    out.push(0);

    out
}

/// Appends a string table and patches the recorded name-offset fields.
fn backfill_strings(out: &mut Vec<u8>, strings: &[(usize, String)]) {
    for (patch_pos, s) in strings {
        let offset = out.len() as u32;
        out.extend_from_slice(s.as_bytes());
        out.push(0);
        out[*patch_pos..*patch_pos + 4].copy_from_slice(&offset.to_le_bytes());
    }
}
