//! gzip framing used on both the request and response path. Policy about
//! *when* to apply it (content type, `Accept-Encoding`) lives with the
//! caller; this module only frames bytes.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::WireError;

pub fn compress(body: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

pub fn decompress(body: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let original = b"the quick brown fox jumps over the lazy dog".to_vec();
        let compressed = compress(&original).unwrap();
        let restored = decompress(&compressed).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn round_trips_empty_body() {
        let compressed = compress(b"").unwrap();
        let restored = decompress(&compressed).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn decompress_rejects_non_gzip_input() {
        assert!(decompress(b"not gzip data").is_err());
    }
}
