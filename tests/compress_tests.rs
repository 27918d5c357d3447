//! Block Compression Tests
//!
//! Tests for:
//! - Round trips at every level for empty, tiny, repetitive and noisy inputs
//! - Header inspection without decoding
//! - Rejection of truncated, foreign and oversized buffers

use loupe::loupe_core::LoupeError;
use loupe::loupe_core::compress::{
    MAX_DECOMPRESSED_SIZE, MAX_LEVEL, compress, decompress, decompressed_size,
};

fn noisy(len: usize) -> Vec<u8> {
    // xorshift, so the bytes do not compress
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

fn samples() -> Vec<Vec<u8>> {
    vec![
        Vec::new(),
        b"x".to_vec(),
        b"@group(0) @binding(0) var src: texture_2d<f32>;".repeat(40),
        vec![0u8; 64 * 1024],
        noisy(4096),
    ]
}

// ============================================================================
// Round Trips
// ============================================================================

#[test]
fn round_trip_at_every_level() {
    for input in samples() {
        for level in 0..=MAX_LEVEL {
            let packed = compress(&input, level).unwrap();
            assert_eq!(decompressed_size(&packed).unwrap(), input.len());
            assert_eq!(
                decompress(&packed).unwrap(),
                input,
                "level {level}, {} bytes",
                input.len()
            );
        }
    }
}

#[test]
fn repetitive_input_shrinks() {
    let input = vec![7u8; 64 * 1024];
    let packed = compress(&input, 1).unwrap();
    assert!(packed.len() < input.len() / 10, "packed to {} bytes", packed.len());
}

#[test]
fn nonzero_levels_share_one_encoding() {
    let input = vec![3u8; 4096];
    let baseline = compress(&input, 1).unwrap();
    for level in 2..=MAX_LEVEL {
        assert_eq!(compress(&input, level).unwrap(), baseline, "level {level}");
    }
}

#[test]
fn level_zero_stores_verbatim() {
    let input = noisy(256);
    let packed = compress(&input, 0).unwrap();
    assert!(packed.ends_with(&input));
}

#[test]
fn out_of_range_level_is_rejected() {
    assert!(matches!(compress(b"abc", -1), Err(LoupeError::Compression(_))));
    assert!(matches!(
        compress(b"abc", MAX_LEVEL + 1),
        Err(LoupeError::Compression(_))
    ));
}

// ============================================================================
// Corrupt Input
// ============================================================================

#[test]
fn empty_buffer_is_rejected() {
    assert!(matches!(decompress(&[]), Err(LoupeError::Decompression(_))));
}

#[test]
fn truncated_buffers_are_rejected() {
    let input = b"truncate me, truncate me, truncate me".repeat(20);
    for level in [0, 1] {
        let packed = compress(&input, level).unwrap();
        for cut in [3, 8, packed.len() / 2, packed.len() - 1] {
            assert!(
                decompress(&packed[..cut]).is_err(),
                "level {level}, cut at {cut}"
            );
        }
    }
}

#[test]
fn foreign_magic_is_rejected() {
    let mut packed = compress(b"hello", 1).unwrap();
    packed[0] = b'Z';
    assert!(matches!(decompress(&packed), Err(LoupeError::Decompression(_))));
}

#[test]
fn oversized_declared_length_is_rejected_before_allocation() {
    let mut packed = compress(b"hello", 0).unwrap();
    let declared = u32::try_from(MAX_DECOMPRESSED_SIZE + 1).unwrap();
    packed[5..9].copy_from_slice(&declared.to_le_bytes());
    assert!(matches!(
        decompressed_size(&packed),
        Err(LoupeError::Decompression(_))
    ));
    assert!(matches!(decompress(&packed), Err(LoupeError::Decompression(_))));
}

#[test]
fn inflated_declared_length_is_rejected() {
    let mut packed = compress(&[1u8; 512], 1).unwrap();
    packed[5..9].copy_from_slice(&(64 * 1024 * 1024u32).to_le_bytes());
    assert!(matches!(decompress(&packed), Err(LoupeError::Decompression(_))));
}
