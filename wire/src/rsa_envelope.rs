//! Hybrid-in-name-only RSA envelope: PKCS#1 v1.5 applied directly to the
//! (already-gzipped) request body, with PEM headers `RSA PUBLIC KEY` /
//! `RSA PRIVATE KEY`. A message longer than `key_size/8 - 11` bytes cannot
//! be encrypted this way; callers must fall back to sending the plaintext
//! unencrypted (the documented fragility, not fixed here).

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::WireError;

pub fn load_public_key(pem: &str) -> Result<RsaPublicKey, WireError> {
    RsaPublicKey::from_pkcs1_pem(pem).map_err(|error| WireError::Crypto(error.to_string()))
}

pub fn load_private_key(pem: &str) -> Result<RsaPrivateKey, WireError> {
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|error| WireError::Crypto(error.to_string()))
}

/// Largest plaintext a given key can encrypt under PKCS#1 v1.5.
pub fn max_plaintext_len(key: &RsaPublicKey) -> usize {
    use rsa::traits::PublicKeyParts;
    key.size().saturating_sub(11)
}

pub fn encrypt(key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut rng = rand::thread_rng();
    key.encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)
        .map_err(|error| WireError::Crypto(error.to_string()))
}

pub fn decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, WireError> {
    key.decrypt(Pkcs1v15Encrypt, ciphertext)
        .map_err(|error| WireError::Crypto(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
    use rsa::RsaPrivateKey;

    fn test_keypair() -> (RsaPrivateKey, RsaPublicKey) {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public = RsaPublicKey::from(&private);
        (private, public)
    }

    #[test]
    fn round_trips_small_payload() {
        let (private, public) = test_keypair();
        let plaintext = b"short payload";
        let ciphertext = encrypt(&public, plaintext).unwrap();
        let decrypted = decrypt(&private, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn rejects_payload_past_key_size_limit() {
        let (_, public) = test_keypair();
        let max_len = max_plaintext_len(&public);
        let oversized = vec![0u8; max_len + 1];
        assert!(encrypt(&public, &oversized).is_err());
    }

    #[test]
    fn pem_headers_round_trip() {
        let (private, public) = test_keypair();
        let private_pem = private.to_pkcs1_pem(Default::default()).unwrap();
        let public_pem = public.to_pkcs1_pem(Default::default()).unwrap();
        assert!(private_pem.contains("RSA PRIVATE KEY"));
        assert!(public_pem.contains("RSA PUBLIC KEY"));

        let reloaded_private = load_private_key(&private_pem).unwrap();
        let reloaded_public = load_public_key(&public_pem).unwrap();
        let ciphertext = encrypt(&reloaded_public, b"hello").unwrap();
        assert_eq!(decrypt(&reloaded_private, &ciphertext).unwrap(), b"hello");
    }
}
