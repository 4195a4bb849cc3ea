//! zlib helpers for Leap binary frames.
//!
//! The server sends binary WebSocket frames as zlib-compressed JSON and text
//! frames as plain JSON. Inflation goes through `miniz_oxide` (pure Rust).

/// Maximum size a single frame may inflate to (64 MiB).
pub const MAX_INFLATED_FRAME_BYTES: usize = 64 << 20;

/// Check if data starts with a valid zlib header.
///
/// CM must be 8 (deflate) and the CMF/FLG pair must be a multiple of 31.
#[inline]
pub fn is_zlib(data: &[u8]) -> bool {
    data.len() >= 2
        && data[0] & 0x0f == 0x08
        && (u16::from(data[0]) << 8 | u16::from(data[1])) % 31 == 0
}

/// Inflate zlib data, refusing output larger than `limit` bytes.
pub fn inflate_zlib_with_limit(data: &[u8], limit: usize) -> Result<Vec<u8>, DecompressError> {
    if data.len() < 2 {
        return Err(DecompressError::TooShort);
    }
    if !is_zlib(data) {
        return Err(DecompressError::NotZlib);
    }

    miniz_oxide::inflate::decompress_to_vec_zlib_with_limit(data, limit).map_err(|e| {
        match e.status {
            miniz_oxide::inflate::TINFLStatus::HasMoreOutput => DecompressError::TooLarge,
            _ => DecompressError::DecompressFailed,
        }
    })
}

/// Inflate zlib data with the default frame size limit.
pub fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>, DecompressError> {
    inflate_zlib_with_limit(data, MAX_INFLATED_FRAME_BYTES)
}

/// Compress data into the zlib format the server uses for binary frames.
pub fn deflate_zlib(data: &[u8]) -> Vec<u8> {
    miniz_oxide::deflate::compress_to_vec_zlib(data, 6)
}

/// Decompression error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressError {
    /// Data is too short to be valid zlib
    TooShort,
    /// Data doesn't start with a zlib header
    NotZlib,
    /// Output exceeds the size limit
    TooLarge,
    /// Decompression failed
    DecompressFailed,
}

impl std::fmt::Display for DecompressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort => write!(f, "Data too short for zlib"),
            Self::NotZlib => write!(f, "Not zlib compressed"),
            Self::TooLarge => write!(f, "Inflated frame exceeds size limit"),
            Self::DecompressFailed => write!(f, "Decompression failed"),
        }
    }
}

impl std::error::Error for DecompressError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_zlib() {
        assert!(is_zlib(&[0x78, 0x9c]));
        assert!(is_zlib(&[0x78, 0x01]));
        assert!(is_zlib(&[0x78, 0xda]));
        assert!(!is_zlib(&[0x1f, 0x8b]));
        assert!(!is_zlib(&[0x78]));
        assert!(!is_zlib(&[]));
    }

    #[test]
    fn test_inflate_deflated_payload() {
        let json = br#"{"op":1,"d":{"heartbeat_interval":45000}}"#;
        let compressed = deflate_zlib(json);
        assert!(is_zlib(&compressed));
        assert_eq!(inflate_zlib(&compressed).unwrap(), json.to_vec());
    }

    #[test]
    fn test_inflate_rejects_plain_json() {
        assert_eq!(inflate_zlib(br#"{"op":3}"#), Err(DecompressError::NotZlib));
        assert_eq!(inflate_zlib(b"{"), Err(DecompressError::TooShort));
    }

    #[test]
    fn test_inflate_truncated_stream_fails() {
        let compressed = deflate_zlib(&[b'a'; 4096]);
        let truncated = &compressed[..compressed.len() / 2];
        assert_eq!(inflate_zlib(truncated), Err(DecompressError::DecompressFailed));
    }

    #[test]
    fn test_inflate_respects_limit() {
        let compressed = deflate_zlib(&[b'x'; 10_000]);
        assert_eq!(
            inflate_zlib_with_limit(&compressed, 1_000),
            Err(DecompressError::TooLarge)
        );
    }
}
