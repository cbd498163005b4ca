use crate::mtlx::{parse_mtlx_chunk, MtlxStage, MtlxStageExt};
use crate::test_utils::{build_mtlx_chunk, MtlxSpec};
use crate::DxbcErrorKind;

fn fragment_spec() -> MtlxSpec<'static> {
    MtlxSpec {
        stage: 1,
        threads_per_group: [0; 3],
        samplers: &[(0, 0, "diffuseMap_diffuseSampler"), (1, 0, "normalMap_diffuseSampler")],
        input_hash: 0xDEAD_BEEF,
        msl_source: "fragment float4 ps_main() { return float4(1.0); }",
    }
}

#[test]
fn roundtrips_fragment_trailer() {
    let bytes = build_mtlx_chunk(&fragment_spec());
    let mtlx = parse_mtlx_chunk(&bytes).expect("fragment trailer should parse");

    assert_eq!(mtlx.stage, MtlxStage::Fragment);
    assert_eq!(mtlx.ext, MtlxStageExt::Graphics);
    assert_eq!(mtlx.threads_per_group(), None);
    assert_eq!(mtlx.input_hash, 0xDEAD_BEEF);
    assert_eq!(mtlx.msl_source, "fragment float4 ps_main() { return float4(1.0); }");

    assert_eq!(mtlx.samplers.len(), 2);
    let combined = mtlx.sampler_for_texture(1).expect("texture slot 1 should map");
    assert_eq!(combined.sampler_slot, 0);
    assert_eq!(combined.name, "normalMap_diffuseSampler");
    assert!(mtlx.sampler_for_texture(7).is_none());
}

#[test]
fn roundtrips_compute_trailer_with_thread_group_dims() {
    let bytes = build_mtlx_chunk(&MtlxSpec {
        stage: 2,
        threads_per_group: [8, 8, 1],
        samplers: &[],
        input_hash: 1,
        msl_source: "kernel void cs_main() {}",
    });
    let mtlx = parse_mtlx_chunk(&bytes).expect("compute trailer should parse");

    assert_eq!(mtlx.stage, MtlxStage::Compute);
    assert_eq!(mtlx.threads_per_group(), Some([8, 8, 1]));
}

#[test]
fn rejects_zero_thread_group_dimension() {
    let bytes = build_mtlx_chunk(&MtlxSpec {
        stage: 2,
        threads_per_group: [8, 0, 1],
        samplers: &[],
        input_hash: 0,
        msl_source: "",
    });
    let err = parse_mtlx_chunk(&bytes).expect_err("zero thread-group dim must fail");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}

#[test]
fn rejects_truncated_header() {
    let err = parse_mtlx_chunk(&[0u8; 16]).expect_err("16 bytes cannot hold a trailer header");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}

#[test]
fn rejects_unknown_version() {
    let mut bytes = build_mtlx_chunk(&fragment_spec());
    bytes[0..4].copy_from_slice(&9u32.to_le_bytes());
    let err = parse_mtlx_chunk(&bytes).expect_err("unknown version must fail");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}

#[test]
fn rejects_unknown_stage() {
    let mut bytes = build_mtlx_chunk(&fragment_spec());
    bytes[4..8].copy_from_slice(&7u32.to_le_bytes());
    let err = parse_mtlx_chunk(&bytes).expect_err("unknown stage must fail");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}

#[test]
fn rejects_symbols_offset_inside_sub_tables() {
    let mut bytes = build_mtlx_chunk(&fragment_spec());
    // symbols_offset lives at 24; point it at the sampler map.
    bytes[24..28].copy_from_slice(&28u32.to_le_bytes());
    let err = parse_mtlx_chunk(&bytes).expect_err("symbols offset into tables must fail");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}

#[test]
fn rejects_sampler_table_outside_chunk() {
    let mut bytes = build_mtlx_chunk(&fragment_spec());
    // sampler_count lives at 8.
    bytes[8..12].copy_from_slice(&1000u32.to_le_bytes());
    let err = parse_mtlx_chunk(&bytes).expect_err("oversized sampler table must fail");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}
