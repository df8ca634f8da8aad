//! Whole-stream compression for delta and snapshot files.

use crate::error::{Result, StateStoreError};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

/// Compression applied to a store file's body, selected by configuration
/// and recorded in the file header so readers never guess.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionCodec {
    None,
    #[default]
    Lz4,
}

impl CompressionCodec {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            CompressionCodec::None => 0,
            CompressionCodec::Lz4 => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(CompressionCodec::None),
            1 => Ok(CompressionCodec::Lz4),
            other => Err(StateStoreError::InvalidFormat(format!(
                "unknown compression codec byte: {}",
                other
            ))),
        }
    }

    pub(crate) fn compress(self, body: &[u8]) -> Vec<u8> {
        match self {
            CompressionCodec::None => body.to_vec(),
            CompressionCodec::Lz4 => compress_prepend_size(body),
        }
    }

    pub(crate) fn decompress(self, bytes: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionCodec::None => Ok(bytes.to_vec()),
            CompressionCodec::Lz4 => decompress_size_prepended(bytes)
                .map_err(|e| StateStoreError::CorruptData(format!("lz4 decompression: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_both_codecs() {
        let body = b"some store file body, repeated: some store file body".to_vec();
        for codec in [CompressionCodec::None, CompressionCodec::Lz4] {
            let packed = codec.compress(&body);
            assert_eq!(codec.decompress(&packed).unwrap(), body);
        }
    }

    #[test]
    fn test_unknown_codec_byte() {
        assert!(CompressionCodec::from_byte(9).is_err());
    }

    #[test]
    fn test_corrupt_lz4_stream() {
        let result = CompressionCodec::Lz4.decompress(&[0xFF, 0xFF, 0xFF, 0xFF, 1, 2]);
        assert!(matches!(result, Err(StateStoreError::CorruptData(_))));
    }
}
