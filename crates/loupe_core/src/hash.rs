//! Fast non-cryptographic hashing.
//!
//! [`hash_data`] is a wyhash-style 64-bit hash with a fixed secret. It is
//! used to key cached shader binaries, so its output must stay stable across
//! runs and platforms: all multi-byte reads are little-endian.

const SECRET: [u64; 4] = [
    0xa076_1d64_78bd_642f,
    0xe703_7ed1_a0b4_28db,
    0x8ebc_6af0_9c88_c6e3,
    0x5899_65cc_7537_4cc3,
];

/// 64x64 -> 128 multiply, folded by xoring the halves.
#[inline]
fn mix(lhs: u64, rhs: u64) -> u64 {
    let product = u128::from(lhs) * u128::from(rhs);
    (product as u64) ^ ((product >> 64) as u64)
}

#[inline]
fn read8(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(buf)
}

#[inline]
fn read4(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[at..at + 4]);
    u64::from(u32::from_le_bytes(buf))
}

#[inline]
fn read3(data: &[u8]) -> u64 {
    let len = data.len();
    (u64::from(data[0]) << 16) | (u64::from(data[len >> 1]) << 8) | u64::from(data[len - 1])
}

/// Hashes `data` to a 64-bit value.
///
/// Deterministic for a given byte sequence; the empty input is valid.
#[must_use]
pub fn hash_data(data: &[u8]) -> u64 {
    let len = data.len();
    let mut seed = SECRET[0];

    let (a, b) = if len <= 16 {
        if len >= 4 {
            let quarter = (len >> 3) << 2;
            (
                (read4(data, 0) << 32) | read4(data, quarter),
                (read4(data, len - 4) << 32) | read4(data, len - 4 - quarter),
            )
        } else if len > 0 {
            (read3(data), 0)
        } else {
            (0, 0)
        }
    } else {
        let mut offset = 0;
        let mut remaining = len;

        if remaining > 48 {
            let mut see1 = seed;
            let mut see2 = seed;
            while remaining > 48 {
                seed = mix(read8(data, offset) ^ SECRET[1], read8(data, offset + 8) ^ seed);
                see1 = mix(read8(data, offset + 16) ^ SECRET[2], read8(data, offset + 24) ^ see1);
                see2 = mix(read8(data, offset + 32) ^ SECRET[3], read8(data, offset + 40) ^ see2);
                offset += 48;
                remaining -= 48;
            }
            seed ^= see1 ^ see2;
        }

        while remaining > 16 {
            seed = mix(read8(data, offset) ^ SECRET[1], read8(data, offset + 8) ^ seed);
            offset += 16;
            remaining -= 16;
        }

        // The tail reads may overlap bytes already consumed above.
        (read8(data, len - 16), read8(data, len - 8))
    };

    mix(SECRET[1] ^ len as u64, mix(a ^ SECRET[1], b ^ seed))
}

/// Builds a composite hash key from several fields.
///
/// Each field is written with a length prefix so that field boundaries are
/// part of the hashed bytes: `("ab", "c")` and `("a", "bc")` hash apart.
#[derive(Debug, Default, Clone)]
pub struct ContentHasher {
    buffer: Vec<u8>,
}

impl ContentHasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one length-delimited field.
    pub fn write_field(&mut self, field: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(&(field.len() as u64).to_le_bytes());
        self.buffer.extend_from_slice(field);
        self
    }

    pub fn write_str(&mut self, field: &str) -> &mut Self {
        self.write_field(field.as_bytes())
    }

    #[must_use]
    pub fn finish(&self) -> u64 {
        hash_data(&self.buffer)
    }
}
