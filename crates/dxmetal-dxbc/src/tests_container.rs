use crate::test_utils::build_container;
use crate::{DxbcErrorKind, DxbcFile, FourCC};

#[test]
fn parses_multi_chunk_container_in_file_order() {
    let a = [0xAAu8; 7];
    let b = [0xBBu8; 3];
    let bytes = build_container(&[(FourCC(*b"RDEF"), &a), (FourCC(*b"MTLX"), &b)]);

    let file = DxbcFile::parse(&bytes).expect("container should parse");
    assert_eq!(file.header().chunk_count, 2);

    let chunks: Vec<_> = file.chunks().collect();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].fourcc, FourCC(*b"RDEF"));
    assert_eq!(chunks[0].data, &a);
    assert_eq!(chunks[1].fourcc, FourCC(*b"MTLX"));
    assert_eq!(chunks[1].data, &b);

    assert!(file.get_chunk(FourCC(*b"MTLX")).is_some());
    assert!(file.get_chunk(FourCC(*b"ISGN")).is_none());
}

#[test]
fn rejects_truncated_header() {
    let err = DxbcFile::parse(b"DXBC").expect_err("4 bytes cannot be a container");
    assert_eq!(err.kind(), DxbcErrorKind::MalformedHeader);
}

#[test]
fn rejects_bad_magic() {
    let mut bytes = build_container(&[]);
    bytes[0..4].copy_from_slice(b"DXBX");
    let err = DxbcFile::parse(&bytes).expect_err("bad magic must fail");
    assert_eq!(err.kind(), DxbcErrorKind::MalformedHeader);
}

#[test]
fn rejects_total_size_beyond_buffer() {
    let mut bytes = build_container(&[]);
    // total_size lives at offset 24.
    bytes[24..28].copy_from_slice(&u32::MAX.to_le_bytes());
    let err = DxbcFile::parse(&bytes).expect_err("oversized total_size must fail");
    assert_eq!(err.kind(), DxbcErrorKind::OutOfBounds);
}

#[test]
fn rejects_chunk_offset_into_offset_table() {
    let payload = [0u8; 4];
    let mut bytes = build_container(&[(FourCC(*b"RDEF"), &payload)]);
    // The single offset table entry lives right after the 32-byte header.
    bytes[32..36].copy_from_slice(&8u32.to_le_bytes());
    let err = DxbcFile::parse(&bytes).expect_err("offset into header must fail");
    assert_eq!(err.kind(), DxbcErrorKind::MalformedOffsets);
}

#[test]
fn rejects_chunk_data_escaping_total_size() {
    let payload = [0u8; 4];
    let mut bytes = build_container(&[(FourCC(*b"RDEF"), &payload)]);
    // Chunk header: fourcc at 36, declared size at 40.
    bytes[40..44].copy_from_slice(&1024u32.to_le_bytes());
    let err = DxbcFile::parse(&bytes).expect_err("chunk data past total_size must fail");
    assert_eq!(err.kind(), DxbcErrorKind::OutOfBounds);
}

#[test]
fn trailing_bytes_beyond_total_size_are_ignored() {
    let payload = [0x11u8; 8];
    let mut bytes = build_container(&[(FourCC(*b"MTLX"), &payload)]);
    let declared = bytes.len();
    bytes.extend_from_slice(&[0xFF; 32]);

    let file = DxbcFile::parse(&bytes).expect("container with trailing bytes should parse");
    assert_eq!(file.bytes().len(), declared);
}

#[test]
fn debug_summary_lists_chunks() {
    let bytes = build_container(&[(FourCC(*b"RDEF"), &[0u8; 2]), (FourCC(*b"ISGN"), &[0u8; 5])]);
    let file = DxbcFile::parse(&bytes).expect("container should parse");
    let summary = file.debug_summary();
    assert!(summary.contains("chunk_count=2"));
    assert!(summary.contains("RDEF 2 bytes"));
    assert!(summary.contains("ISGN 5 bytes"));
}
