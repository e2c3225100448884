//! HMAC-SHA256 request/response signing. Header name is `HashSHA256`,
//! value is lowercase hex. An empty header means verification is skipped,
//! not that it fails.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const HEADER_NAME: &str = "HashSHA256";

type HmacSha256 = Hmac<Sha256>;

/// Computes `hex(HMAC-SHA256(body, key))`.
pub fn sign(body: &[u8], key: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Accepts iff `header` decodes to the same bytes as `sign(body, key)`.
/// Constant-time at the MAC-comparison layer via `hmac::Mac::verify_slice`.
pub fn verify(body: &[u8], key: &[u8], header: &str) -> bool {
    let Ok(expected) = hex::decode(header.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_matching_signature() {
        let key = b"secret";
        let body = b"payload bytes";
        let signature = sign(body, key);
        assert!(verify(body, key, &signature));
    }

    #[test]
    fn verify_rejects_wrong_signature() {
        let key = b"secret";
        let body = b"payload bytes";
        assert!(!verify(body, key, "0000000000000000000000000000000000000000000000000000000000000000"));
    }

    #[test]
    fn verify_rejects_non_hex_header() {
        assert!(!verify(b"body", b"key", "not hex"));
    }
}
