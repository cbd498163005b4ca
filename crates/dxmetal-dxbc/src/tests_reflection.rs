use crate::test_utils::{
    build_container, build_mtlx_chunk, build_rdef_chunk, build_signature_chunk, CbSpec, MtlxSpec,
    ResSpec,
};
use crate::{FourCC, MtlxStage, ShaderReflection};

fn vertex_blob(rdef_fourcc: FourCC, isgn_fourcc: FourCC, extended_sig: bool) -> Vec<u8> {
    let rdef = build_rdef_chunk(
        &[CbSpec {
            name: "PerView",
            size: 64,
            variables: &[("viewProj", 0, 64)],
        }],
        &[ResSpec {
            name: "PerView",
            input_type: 0,
            bind_point: 0,
            bind_count: 1,
        }],
    );
    let isgn = build_signature_chunk(
        &[("POSITION", 0, 0, 0b1111), ("TEXCOORD", 0, 1, 0b0011)],
        extended_sig,
    );
    let osgn = build_signature_chunk(&[("SV_Position", 0, 0, 0b1111)], false);
    let mtlx = build_mtlx_chunk(&MtlxSpec {
        stage: 0,
        threads_per_group: [0; 3],
        samplers: &[],
        input_hash: 42,
        msl_source: "vertex float4 vs_main() { return float4(0.0); }",
    });

    build_container(&[
        (rdef_fourcc, &rdef),
        (isgn_fourcc, &isgn),
        (FourCC(*b"OSGN"), &osgn),
        (FourCC(*b"MTLX"), &mtlx),
    ])
}

#[test]
fn parses_complete_vertex_container() {
    let blob = vertex_blob(FourCC(*b"RDEF"), FourCC(*b"ISGN"), false);
    let reflection = ShaderReflection::parse(&blob).expect("vertex blob should parse");

    assert_eq!(reflection.stage(), MtlxStage::Vertex);
    assert_eq!(reflection.rdef.constant_buffers.len(), 1);
    assert_eq!(reflection.rdef.constant_buffers[0].name, "PerView");
    assert_eq!(reflection.input_signature.parameters.len(), 2);
    assert_eq!(reflection.input_signature.parameters[1].semantic_name, "TEXCOORD");
    assert_eq!(reflection.output_signature.parameters.len(), 1);
    assert_eq!(reflection.mtlx.input_hash, 42);
}

#[test]
fn accepts_rd11_and_isg1_chunk_variants() {
    let blob = vertex_blob(FourCC(*b"RD11"), FourCC(*b"ISG1"), true);
    let reflection = ShaderReflection::parse(&blob).expect("variant chunk IDs should parse");

    assert_eq!(reflection.rdef.constant_buffers[0].name, "PerView");
    assert_eq!(reflection.input_signature.parameters.len(), 2);
    assert_eq!(reflection.input_signature.parameters[0].semantic_name, "POSITION");
}

#[test]
fn missing_signatures_parse_as_empty() {
    let rdef = build_rdef_chunk(&[], &[]);
    let mtlx = build_mtlx_chunk(&MtlxSpec {
        stage: 2,
        threads_per_group: [64, 1, 1],
        samplers: &[],
        input_hash: 0,
        msl_source: "kernel void cs_main() {}",
    });
    let blob = build_container(&[(FourCC(*b"RDEF"), &rdef), (FourCC(*b"MTLX"), &mtlx)]);

    let reflection = ShaderReflection::parse(&blob).expect("compute blob should parse");
    assert!(reflection.input_signature.parameters.is_empty());
    assert!(reflection.output_signature.parameters.is_empty());
    assert_eq!(reflection.mtlx.threads_per_group(), Some([64, 1, 1]));
}

#[test]
fn fails_without_rdef() {
    let mtlx = build_mtlx_chunk(&MtlxSpec {
        stage: 0,
        threads_per_group: [0; 3],
        samplers: &[],
        input_hash: 0,
        msl_source: "",
    });
    let blob = build_container(&[(FourCC(*b"MTLX"), &mtlx)]);
    let err = ShaderReflection::parse(&blob).expect_err("blob without RDEF must fail");
    assert!(err.context().contains("RDEF"));
}

#[test]
fn fails_without_mtlx_trailer() {
    let rdef = build_rdef_chunk(&[], &[]);
    let blob = build_container(&[(FourCC(*b"RDEF"), &rdef)]);
    let err = ShaderReflection::parse(&blob).expect_err("blob without MTLX must fail");
    assert!(err.context().contains("MTLX"));
}

#[test]
fn corrupt_chunk_fails_the_whole_parse() {
    let mut blob = vertex_blob(FourCC(*b"RDEF"), FourCC(*b"ISGN"), false);
    // Corrupt the RDEF constant-buffer count (the RDEF chunk payload starts
    // at 32 + 4 * 4 chunk offsets + 8-byte chunk header = 56).
    blob[56..60].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(ShaderReflection::parse(&blob).is_err());
}
