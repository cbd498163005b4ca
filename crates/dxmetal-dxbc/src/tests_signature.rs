use crate::signature::{parse_signature_chunk, parse_signature_chunk_for_fourcc};
use crate::test_utils::build_signature_chunk;
use crate::{DxbcErrorKind, FourCC};

const PARAMS: &[(&str, u32, u32, u8)] = &[
    ("POSITION", 0, 0, 0b1111),
    ("NORMAL", 0, 1, 0b0111),
    ("TEXCOORD", 0, 2, 0b0011),
    ("TEXCOORD", 1, 3, 0b0011),
];

#[test]
fn roundtrips_legacy_layout() {
    let bytes = build_signature_chunk(PARAMS, false);
    let sig = parse_signature_chunk_for_fourcc(FourCC(*b"ISGN"), &bytes)
        .expect("legacy signature should parse");

    assert_eq!(sig.parameters.len(), 4);
    assert_eq!(sig.parameters[0].semantic_name, "POSITION");
    assert_eq!(sig.parameters[0].register, 0);
    assert_eq!(sig.parameters[0].mask, 0b1111);
    assert_eq!(sig.parameters[3].semantic_name, "TEXCOORD");
    assert_eq!(sig.parameters[3].semantic_index, 1);
    assert_eq!(sig.parameters[3].register, 3);
    assert_eq!(sig.parameters[3].stream, 0);
}

#[test]
fn roundtrips_extended_layout() {
    let bytes = build_signature_chunk(PARAMS, true);
    let sig = parse_signature_chunk_for_fourcc(FourCC(*b"ISG1"), &bytes)
        .expect("extended signature should parse");

    assert_eq!(sig.parameters.len(), 4);
    assert_eq!(sig.parameters[1].semantic_name, "NORMAL");
    assert_eq!(sig.parameters[1].register, 1);
    assert_eq!(sig.parameters[1].mask, 0b0111);
}

#[test]
fn infers_layout_without_fourcc() {
    // The heuristic reads the first dword of the first entry: a stream index
    // in the extended layout, a string offset in the legacy one.
    let legacy = build_signature_chunk(PARAMS, false);
    let sig = parse_signature_chunk(&legacy).expect("legacy layout should be inferred");
    assert_eq!(sig.parameters.len(), 4);
    assert_eq!(sig.parameters[0].semantic_name, "POSITION");

    let extended = build_signature_chunk(PARAMS, true);
    let sig = parse_signature_chunk(&extended).expect("extended layout should be inferred");
    assert_eq!(sig.parameters.len(), 4);
    assert_eq!(sig.parameters[0].semantic_name, "POSITION");
}

#[test]
fn empty_signature_parses() {
    let bytes = build_signature_chunk(&[], false);
    let sig = parse_signature_chunk(&bytes).expect("empty signature should parse");
    assert!(sig.parameters.is_empty());
}

#[test]
fn rejects_truncated_header() {
    let err = parse_signature_chunk(&[0u8; 4]).expect_err("4 bytes cannot hold a header");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}

#[test]
fn rejects_table_outside_chunk() {
    let mut bytes = build_signature_chunk(PARAMS, false);
    bytes[0..4].copy_from_slice(&1000u32.to_le_bytes()); // param_count
    let err = parse_signature_chunk_for_fourcc(FourCC(*b"ISGN"), &bytes)
        .expect_err("oversized param_count must fail");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}

#[test]
fn rejects_name_offset_into_table() {
    let mut bytes = build_signature_chunk(&[("POSITION", 0, 0, 0b1111)], false);
    // First entry's name offset points back into the parameter table.
    bytes[8..12].copy_from_slice(&12u32.to_le_bytes());
    let err = parse_signature_chunk_for_fourcc(FourCC(*b"ISGN"), &bytes)
        .expect_err("name offset into table must fail");
    assert_eq!(err.kind(), DxbcErrorKind::InvalidChunk);
}
