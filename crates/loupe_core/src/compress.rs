//! Self-describing block compression.
//!
//! Compressed buffers carry a small header so that [`decompress`] can recover
//! the original size without any side channel:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | Magic `LPZ1` |
//! | 4 | 1 | Method (`0` stored, `1` LZ4 block) |
//! | 5 | 4 | Original length, little-endian `u32` |
//! | 9 | .. | Payload |
//!
//! The payload codec is LZ4 (`lz4_flex` block format). Level `0` stores the
//! input verbatim; any level in `1..=MAX_LEVEL` selects LZ4. `lz4_flex` has a
//! single block encoder, so every nonzero level yields identical output.

use crate::errors::{LoupeError, Result};

const MAGIC: [u8; 4] = *b"LPZ1";
const HEADER_LEN: usize = 9;

const METHOD_STORED: u8 = 0;
const METHOD_LZ4: u8 = 1;

/// Highest accepted compression level.
///
/// Levels only choose between stored (`0`) and LZ4 (`1..=MAX_LEVEL`). All
/// LZ4 levels produce byte-identical output and are accepted for callers that
/// pass a zlib-style level.
pub const MAX_LEVEL: i32 = 9;

/// Default level used for the shader cache.
pub const DEFAULT_LEVEL: i32 = 1;

/// Upper bound on a declared original size. Anything larger is treated as a
/// corrupt header rather than an allocation request.
pub const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

/// Worst-case LZ4 expansion: one literal-length byte can describe at most 255
/// output bytes per input byte.
const LZ4_MAX_RATIO: usize = 255;

/// Compresses `input` at `level`.
///
/// The output buffer is allocated for the worst case up front and truncated
/// to the written length.
pub fn compress(input: &[u8], level: i32) -> Result<Vec<u8>> {
    if !(0..=MAX_LEVEL).contains(&level) {
        return Err(LoupeError::Compression(format!(
            "compression level {level} outside 0..={MAX_LEVEL}"
        )));
    }
    let original_len = u32::try_from(input.len()).map_err(|_| {
        LoupeError::Compression(format!("input of {} bytes is too large", input.len()))
    })?;

    // Empty input is always stored; an LZ4 block for it would still carry a token.
    if level == 0 || input.is_empty() {
        let mut output = Vec::with_capacity(HEADER_LEN + input.len());
        write_header(&mut output, METHOD_STORED, original_len);
        output.extend_from_slice(input);
        return Ok(output);
    }

    let bound = lz4_flex::block::get_maximum_output_size(input.len());
    let mut output = Vec::with_capacity(HEADER_LEN + bound);
    write_header(&mut output, METHOD_LZ4, original_len);
    output.resize(HEADER_LEN + bound, 0);

    let written = lz4_flex::block::compress_into(input, &mut output[HEADER_LEN..])
        .map_err(|e| LoupeError::Compression(e.to_string()))?;
    output.truncate(HEADER_LEN + written);
    Ok(output)
}

/// Reads the original size from a compressed buffer's header.
pub fn decompressed_size(input: &[u8]) -> Result<usize> {
    Header::parse(input).map(|h| h.original_len)
}

/// Restores the bytes passed to [`compress`].
///
/// The declared size is checked against [`MAX_DECOMPRESSED_SIZE`] and against
/// what the payload could possibly expand to before anything is allocated.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    let header = Header::parse(input)?;
    let payload = &input[HEADER_LEN..];

    match header.method {
        METHOD_STORED => {
            if payload.len() != header.original_len {
                return Err(LoupeError::Decompression(format!(
                    "stored payload is {} bytes, header declares {}",
                    payload.len(),
                    header.original_len
                )));
            }
            Ok(payload.to_vec())
        }
        METHOD_LZ4 => {
            if header.original_len > payload.len().saturating_mul(LZ4_MAX_RATIO) {
                return Err(LoupeError::Decompression(format!(
                    "declared size {} cannot come from a {}-byte payload",
                    header.original_len,
                    payload.len()
                )));
            }
            let mut output = vec![0u8; header.original_len];
            let written = lz4_flex::block::decompress_into(payload, &mut output)
                .map_err(|e| LoupeError::Decompression(e.to_string()))?;
            if written != header.original_len {
                return Err(LoupeError::Decompression(format!(
                    "decoded {written} bytes, header declares {}",
                    header.original_len
                )));
            }
            Ok(output)
        }
        other => Err(LoupeError::Decompression(format!(
            "unknown compression method {other}"
        ))),
    }
}

fn write_header(output: &mut Vec<u8>, method: u8, original_len: u32) {
    output.extend_from_slice(&MAGIC);
    output.push(method);
    output.extend_from_slice(&original_len.to_le_bytes());
}

struct Header {
    method: u8,
    original_len: usize,
}

impl Header {
    fn parse(input: &[u8]) -> Result<Self> {
        if input.len() < HEADER_LEN {
            return Err(LoupeError::Decompression(format!(
                "input of {} bytes is shorter than the header",
                input.len()
            )));
        }
        if input[..4] != MAGIC {
            return Err(LoupeError::Decompression("bad magic".to_string()));
        }
        let method = input[4];
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&input[5..HEADER_LEN]);
        let original_len = u32::from_le_bytes(len_bytes) as usize;

        if original_len > MAX_DECOMPRESSED_SIZE {
            return Err(LoupeError::Decompression(format!(
                "declared size {original_len} exceeds limit {MAX_DECOMPRESSED_SIZE}"
            )));
        }
        Ok(Self {
            method,
            original_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let out = compress(b"hello", 0).unwrap();
        assert_eq!(&out[..4], b"LPZ1");
        assert_eq!(out[4], METHOD_STORED);
        assert_eq!(&out[5..9], &5u32.to_le_bytes());
        assert_eq!(&out[9..], b"hello");
    }

    #[test]
    fn test_lz4_method_tag() {
        let out = compress(&[7u8; 1000], 5).unwrap();
        assert_eq!(out[4], METHOD_LZ4);
        assert!(out.len() < 1000);
    }

    #[test]
    fn test_rejects_out_of_range_levels() {
        assert!(matches!(compress(b"x", -1), Err(LoupeError::Compression(_))));
        assert!(matches!(
            compress(b"x", MAX_LEVEL + 1),
            Err(LoupeError::Compression(_))
        ));
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let mut out = compress(b"abc", 0).unwrap();
        out[4] = 42;
        assert!(matches!(decompress(&out), Err(LoupeError::Decompression(_))));
    }
}
