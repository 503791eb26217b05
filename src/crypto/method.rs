//! Cipher method catalogue
//!
//! Each method fixes its key size and IV size; neither is configurable.

use crate::error::CryptoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authentication tag appended by every supported method
pub const TAG_SIZE: usize = 16;

/// Supported cipher methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CipherMethod {
    /// AES-128, 16-byte IV
    Aes128Cfb,
    /// AES-192, 16-byte IV
    Aes192Cfb,
    /// AES-256, 16-byte IV
    Aes256Cfb,
    /// AES-128-GCM, 12-byte nonce
    Aes128Gcm,
    /// AES-256-GCM, 12-byte nonce
    Aes256Gcm,
    /// ChaCha20 with the original 8-byte nonce
    ChaCha20,
    /// ChaCha20 with the IETF 12-byte nonce
    ChaCha20Ietf,
    /// Declared only; no implementation backs it
    Rc4Md5,
    /// Declared only; no implementation backs it
    Salsa20,
}

impl CipherMethod {
    /// Every method the catalogue knows about
    pub const ALL: [CipherMethod; 9] = [
        CipherMethod::Aes128Cfb,
        CipherMethod::Aes192Cfb,
        CipherMethod::Aes256Cfb,
        CipherMethod::Aes128Gcm,
        CipherMethod::Aes256Gcm,
        CipherMethod::ChaCha20,
        CipherMethod::ChaCha20Ietf,
        CipherMethod::Rc4Md5,
        CipherMethod::Salsa20,
    ];

    /// Canonical method name
    pub fn name(self) -> &'static str {
        match self {
            CipherMethod::Aes128Cfb => "aes-128-cfb",
            CipherMethod::Aes192Cfb => "aes-192-cfb",
            CipherMethod::Aes256Cfb => "aes-256-cfb",
            CipherMethod::Aes128Gcm => "aes-128-gcm",
            CipherMethod::Aes256Gcm => "aes-256-gcm",
            CipherMethod::ChaCha20 => "chacha20",
            CipherMethod::ChaCha20Ietf => "chacha20-ietf",
            CipherMethod::Rc4Md5 => "rc4-md5",
            CipherMethod::Salsa20 => "salsa20",
        }
    }

    /// Key length in bytes
    pub fn key_size(self) -> usize {
        match self {
            CipherMethod::Aes128Cfb | CipherMethod::Aes128Gcm | CipherMethod::Rc4Md5 => 16,
            CipherMethod::Aes192Cfb => 24,
            CipherMethod::Aes256Cfb
            | CipherMethod::Aes256Gcm
            | CipherMethod::ChaCha20
            | CipherMethod::ChaCha20Ietf
            | CipherMethod::Salsa20 => 32,
        }
    }

    /// IV / nonce length in bytes
    pub fn iv_size(self) -> usize {
        match self {
            CipherMethod::Aes128Cfb
            | CipherMethod::Aes192Cfb
            | CipherMethod::Aes256Cfb
            | CipherMethod::Rc4Md5 => 16,
            CipherMethod::Aes128Gcm | CipherMethod::Aes256Gcm | CipherMethod::ChaCha20Ietf => 12,
            CipherMethod::ChaCha20 | CipherMethod::Salsa20 => 8,
        }
    }

    /// Tag length in bytes
    pub fn tag_size(self) -> usize {
        TAG_SIZE
    }

    /// Smallest valid per-message ciphertext (`iv || tag`)
    pub fn min_message_len(self) -> usize {
        self.iv_size() + self.tag_size()
    }

    /// Whether a cipher implementation backs this method
    pub fn is_implemented(self) -> bool {
        !matches!(self, CipherMethod::Rc4Md5 | CipherMethod::Salsa20)
    }

    /// Fail with `UnimplementedMethod` for stubbed methods
    pub fn ensure_implemented(self) -> Result<(), CryptoError> {
        if self.is_implemented() {
            Ok(())
        } else {
            Err(CryptoError::UnimplementedMethod(self.name().to_string()))
        }
    }
}

impl fmt::Display for CipherMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aes-128-cfb" => Ok(CipherMethod::Aes128Cfb),
            "aes-192-cfb" => Ok(CipherMethod::Aes192Cfb),
            "aes-256-cfb" => Ok(CipherMethod::Aes256Cfb),
            "aes-128-gcm" => Ok(CipherMethod::Aes128Gcm),
            "aes-256-gcm" => Ok(CipherMethod::Aes256Gcm),
            "chacha20" => Ok(CipherMethod::ChaCha20),
            "chacha20-ietf" | "chacha20-ietf-poly1305" => Ok(CipherMethod::ChaCha20Ietf),
            "rc4-md5" => Ok(CipherMethod::Rc4Md5),
            "salsa20" => Ok(CipherMethod::Salsa20),
            other => Err(format!("Unknown cipher method: {}", other)),
        }
    }
}

impl TryFrom<String> for CipherMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CipherMethod> for String {
    fn from(method: CipherMethod) -> Self {
        method.name().to_string()
    }
}
