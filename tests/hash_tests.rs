//! Content Hash Tests
//!
//! Known-answer vectors for `hash_data` across every input-length branch,
//! plus the field framing used for cache keys.

use loupe::loupe_core::{ContentHasher, hash_data};

#[test]
fn known_answer_vectors() {
    let cases: &[(&[u8], u64)] = &[
        (b"", 0x42bc_986d_c5ee_c4d3),
        (b"a", 0x6cf8_4e5a_2465_e867),
        (b"abc", 0xb480_8df2_2d44_ffcf),
        (b"magpie", 0x2cd1_3f3a_7021_3a5b),
        (b"0123456789abcdef", 0x461e_bd6f_5b59_dfa7),
        (
            b"The quick brown fox jumps over the lazy dog",
            0xd986_947f_b5be_3867,
        ),
    ];
    for (input, expected) in cases {
        assert_eq!(
            hash_data(input),
            *expected,
            "input {:?}",
            String::from_utf8_lossy(input)
        );
    }
}

#[test]
fn long_input_takes_the_block_path() {
    let input: Vec<u8> = (0..200u8).collect();
    assert_eq!(hash_data(&input), 0x80bb_dfe8_68d2_4c00);
}

#[test]
fn every_length_up_to_64_is_distinct() {
    let data: Vec<u8> = (0..64u8).map(|b| b.wrapping_mul(31)).collect();
    let mut seen = std::collections::HashSet::new();
    for len in 0..=data.len() {
        assert!(seen.insert(hash_data(&data[..len])), "collision at length {len}");
    }
}

#[test]
fn single_bit_flip_changes_hash() {
    let base = vec![0u8; 97];
    let reference = hash_data(&base);
    for byte in [0, 15, 16, 47, 48, 96] {
        let mut flipped = base.clone();
        flipped[byte] ^= 1;
        assert_ne!(hash_data(&flipped), reference, "flip at byte {byte}");
    }
}

#[test]
fn hash_is_deterministic() {
    let data = b"fullscreen.wgsl::main";
    assert_eq!(hash_data(data), hash_data(data));
}

#[test]
fn content_hasher_frames_fields() {
    let joined = ContentHasher::new().write_str("ab").write_str("c").finish();
    let split = ContentHasher::new().write_str("a").write_str("bc").finish();
    assert_ne!(joined, split);

    let same = ContentHasher::new().write_str("ab").write_str("c").finish();
    assert_eq!(joined, same);
}
