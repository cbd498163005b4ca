use crate::rdef::parse_rdef_chunk;
use crate::test_utils::{build_rdef_chunk, CbSpec, ResSpec};
use crate::{DxbcErrorKind, RdefInputType};

fn sample_chunk() -> Vec<u8> {
    build_rdef_chunk(
        &[
            CbSpec {
                name: "PerView",
                size: 192,
                variables: &[("viewProj", 0, 64), ("cameraPos", 64, 16)],
            },
            CbSpec {
                name: "PerDraw",
                size: 64,
                variables: &[("world", 0, 64)],
            },
        ],
        &[
            ResSpec {
                name: "PerView",
                input_type: 0,
                bind_point: 0,
                bind_count: 1,
            },
            ResSpec {
                name: "PerDraw",
                input_type: 0,
                bind_point: 1,
                bind_count: 1,
            },
            ResSpec {
                name: "diffuseMap",
                input_type: 2,
                bind_point: 0,
                bind_count: 1,
            },
            ResSpec {
                name: "diffuseSampler",
                input_type: 3,
                bind_point: 0,
                bind_count: 1,
            },
            ResSpec {
                name: "outputParticles",
                input_type: 6,
                bind_point: 0,
                bind_count: 1,
            },
        ],
    )
}

#[test]
fn roundtrips_constant_buffers_and_variables() {
    let rdef = parse_rdef_chunk(&sample_chunk()).expect("RDEF should parse");

    assert_eq!(rdef.major_version, 5);
    assert_eq!(rdef.constant_buffers.len(), 2);

    let per_view = &rdef.constant_buffers[0];
    assert_eq!(per_view.name, "PerView");
    assert_eq!(per_view.size, 192);
    assert_eq!(per_view.variables.len(), 2);
    assert_eq!(per_view.variables[0].name, "viewProj");
    assert_eq!(per_view.variables[0].start_offset, 0);
    assert_eq!(per_view.variables[0].size, 64);
    assert_eq!(per_view.variables[1].name, "cameraPos");
    assert_eq!(per_view.variables[1].start_offset, 64);
    // SM5 layout carries sampler back-references.
    assert_eq!(per_view.variables[0].start_sampler, Some(0));

    let per_draw = &rdef.constant_buffers[1];
    assert_eq!(per_draw.name, "PerDraw");
    assert_eq!(per_draw.variables.len(), 1);
    assert_eq!(per_draw.variables[0].name, "world");
}

#[test]
fn roundtrips_resource_bindings() {
    let rdef = parse_rdef_chunk(&sample_chunk()).expect("RDEF should parse");

    assert_eq!(rdef.resource_bindings.len(), 5);

    let tex = rdef.find_resource("diffuseMap").expect("missing diffuseMap");
    assert_eq!(tex.input_type, RdefInputType::Texture);
    assert_eq!(tex.bind_point, 0);

    let sampler = rdef
        .find_resource("diffuseSampler")
        .expect("missing diffuseSampler");
    assert_eq!(sampler.input_type, RdefInputType::Sampler);

    let uav = rdef
        .find_resource("outputParticles")
        .expect("missing outputParticles");
    assert_eq!(uav.input_type, RdefInputType::UavRwStructured);
    assert!(uav.input_type.is_uav());

    let cb = rdef.find_resource("PerDraw").expect("missing PerDraw");
    assert_eq!(cb.input_type, RdefInputType::ConstantBuffer);
    assert_eq!(cb.bind_point, 1);
    assert!(!cb.input_type.is_uav());
}

#[test]
fn empty_tables_parse() {
    let bytes = build_rdef_chunk(&[], &[]);
    let rdef = parse_rdef_chunk(&bytes).expect("empty RDEF should parse");
    assert!(rdef.constant_buffers.is_empty());
    assert!(rdef.resource_bindings.is_empty());
}

#[test]
fn rejects_truncated_header() {
    let err = parse_rdef_chunk(&[0u8; 12]).expect_err("12 bytes cannot hold an RDEF header");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}

#[test]
fn rejects_resource_table_outside_chunk() {
    let mut bytes = build_rdef_chunk(&[], &[]);
    // resource_binding_count at offset 8; the table would land past the end.
    bytes[8..12].copy_from_slice(&4u32.to_le_bytes());
    let err = parse_rdef_chunk(&bytes).expect_err("out-of-bounds table must fail");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}

#[test]
fn rejects_unterminated_name() {
    let mut bytes = build_rdef_chunk(
        &[],
        &[ResSpec {
            name: "t",
            input_type: 2,
            bind_point: 0,
            bind_count: 1,
        }],
    );
    // Drop the string table's trailing NUL.
    bytes.pop();
    let err = parse_rdef_chunk(&bytes).expect_err("unterminated name must fail");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}

#[test]
fn rejects_hostile_variable_count() {
    let mut bytes = build_rdef_chunk(
        &[CbSpec {
            name: "cb",
            size: 16,
            variables: &[("v", 0, 16)],
        }],
        &[],
    );
    // variable_count of the first constant buffer record (header is 28 bytes,
    // name offset is the first field of the record).
    bytes[32..36].copy_from_slice(&u32::MAX.to_le_bytes());
    let err = parse_rdef_chunk(&bytes).expect_err("hostile variable_count must fail");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}
