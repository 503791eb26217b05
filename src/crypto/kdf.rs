//! Password to key derivation
//!
//! Uses OpenSSL's `EVP_BytesToKey` with MD5 and a single iteration, which is
//! what shadowsocks-family servers expect.

use crate::error::CryptoError;
use md5::{Digest, Md5};
use zeroize::Zeroizing;

/// Derive `key_len` bytes of key material from `password`
pub fn evp_bytes_to_key(password: &str, key_len: usize) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::InitializationFailure(
            "password must not be empty".to_string(),
        ));
    }
    if key_len == 0 {
        return Err(CryptoError::InitializationFailure(
            "key length must be non-zero".to_string(),
        ));
    }

    let mut key = Zeroizing::new(Vec::with_capacity(key_len + 16));
    let mut prev: Vec<u8> = Vec::new();
    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password.as_bytes());
        prev = hasher.finalize().to_vec();
        key.extend_from_slice(&prev);
    }
    key.truncate(key_len);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // md5("foobar")
        let key = evp_bytes_to_key("foobar", 16).unwrap();
        assert_eq!(
            key.as_slice(),
            &[
                0x38, 0x58, 0xf6, 0x22, 0x30, 0xac, 0x3c, 0x91, 0x5f, 0x30, 0x0c, 0x66, 0x43,
                0x12, 0xc6, 0x3f
            ]
        );
    }

    #[test]
    fn test_lengths_and_prefix_stability() {
        let short = evp_bytes_to_key("password", 16).unwrap();
        let long = evp_bytes_to_key("password", 32).unwrap();
        let odd = evp_bytes_to_key("password", 24).unwrap();
        assert_eq!(short.len(), 16);
        assert_eq!(long.len(), 32);
        assert_eq!(odd.len(), 24);
        assert_eq!(&long[..16], short.as_slice());
        assert_eq!(&long[..24], odd.as_slice());
    }

    #[test]
    fn test_different_passwords_differ() {
        let a = evp_bytes_to_key("alpha", 32).unwrap();
        let b = evp_bytes_to_key("beta", 32).unwrap();
        assert_ne!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(matches!(
            evp_bytes_to_key("", 32),
            Err(CryptoError::InitializationFailure(_))
        ));
    }
}
