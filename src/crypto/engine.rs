//! Cipher engine
//!
//! Seals and opens byte buffers for the configured [`CipherMethod`]. Two IV
//! disciplines are supported:
//!
//! - **Per-message** (no session id): a fresh random IV is generated for every
//!   call and prefixed to the output, `iv || ciphertext || tag`.
//! - **Session** (session id given): one IV is generated on first use, cached
//!   under the session id and reused for every later message of that session.
//!   The IV is not written to the output, `ciphertext || tag`.
//!
//! Session IVs live until [`CipherEngine::end_session`] is called for that id
//! (or the whole cache is cleared).

use super::kdf::evp_bytes_to_key;
use super::method::CipherMethod;
use crate::error::CryptoError;
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

type Aes128Gcm16 = AesGcm<Aes128, U16>;
type Aes192Gcm16 = AesGcm<Aes192, U16>;
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Nonce length ChaCha20-Poly1305 expects
const CHACHA_NONCE_SIZE: usize = 12;

/// Keyed AEAD instance for one method
#[allow(clippy::large_enum_variant)]
enum Sealer {
    Aes128Wide(Aes128Gcm16),
    Aes192Wide(Aes192Gcm16),
    Aes256Wide(Aes256Gcm16),
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
    ChaCha(ChaCha20Poly1305),
}

fn init_failure<E: fmt::Display>(err: E) -> CryptoError {
    CryptoError::InitializationFailure(err.to_string())
}

impl Sealer {
    fn new(method: CipherMethod, key: &[u8]) -> Result<Self, CryptoError> {
        method.ensure_implemented()?;
        let sealer = match method {
            CipherMethod::Aes128Cfb => {
                Sealer::Aes128Wide(Aes128Gcm16::new_from_slice(key).map_err(init_failure)?)
            }
            CipherMethod::Aes192Cfb => {
                Sealer::Aes192Wide(Aes192Gcm16::new_from_slice(key).map_err(init_failure)?)
            }
            CipherMethod::Aes256Cfb => {
                Sealer::Aes256Wide(Aes256Gcm16::new_from_slice(key).map_err(init_failure)?)
            }
            CipherMethod::Aes128Gcm => {
                Sealer::Aes128(Aes128Gcm::new_from_slice(key).map_err(init_failure)?)
            }
            CipherMethod::Aes256Gcm => {
                Sealer::Aes256(Aes256Gcm::new_from_slice(key).map_err(init_failure)?)
            }
            CipherMethod::ChaCha20 | CipherMethod::ChaCha20Ietf => {
                Sealer::ChaCha(ChaCha20Poly1305::new_from_slice(key).map_err(init_failure)?)
            }
            CipherMethod::Rc4Md5 | CipherMethod::Salsa20 => {
                return Err(CryptoError::UnimplementedMethod(method.name().to_string()))
            }
        };
        Ok(sealer)
    }

    fn seal(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sealed = match self {
            Sealer::Aes128Wide(c) => c.encrypt(GenericArray::from_slice(iv), plaintext),
            Sealer::Aes192Wide(c) => c.encrypt(GenericArray::from_slice(iv), plaintext),
            Sealer::Aes256Wide(c) => c.encrypt(GenericArray::from_slice(iv), plaintext),
            Sealer::Aes128(c) => c.encrypt(GenericArray::from_slice(iv), plaintext),
            Sealer::Aes256(c) => c.encrypt(GenericArray::from_slice(iv), plaintext),
            Sealer::ChaCha(c) => {
                let nonce = chacha_nonce(iv);
                c.encrypt(GenericArray::from_slice(&nonce), plaintext)
            }
        };
        sealed.map_err(|_| CryptoError::EncryptionFailure)
    }

    fn open(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let opened = match self {
            Sealer::Aes128Wide(c) => c.decrypt(GenericArray::from_slice(iv), ciphertext),
            Sealer::Aes192Wide(c) => c.decrypt(GenericArray::from_slice(iv), ciphertext),
            Sealer::Aes256Wide(c) => c.decrypt(GenericArray::from_slice(iv), ciphertext),
            Sealer::Aes128(c) => c.decrypt(GenericArray::from_slice(iv), ciphertext),
            Sealer::Aes256(c) => c.decrypt(GenericArray::from_slice(iv), ciphertext),
            Sealer::ChaCha(c) => {
                let nonce = chacha_nonce(iv);
                c.decrypt(GenericArray::from_slice(&nonce), ciphertext)
            }
        };
        opened.map_err(|_| CryptoError::AuthenticationFailure)
    }
}

/// Left-pad an 8-byte original ChaCha20 IV to the 12-byte IETF nonce
fn chacha_nonce(iv: &[u8]) -> [u8; CHACHA_NONCE_SIZE] {
    let mut nonce = [0u8; CHACHA_NONCE_SIZE];
    nonce[CHACHA_NONCE_SIZE - iv.len()..].copy_from_slice(iv);
    nonce
}

/// Password-keyed cipher bound to one [`CipherMethod`]
pub struct CipherEngine {
    method: CipherMethod,
    sealer: Sealer,
    sessions: Mutex<HashMap<String, Vec<u8>>>,
}

impl fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherEngine")
            .field("method", &self.method)
            .field("sessions", &self.session_count())
            .finish()
    }
}

impl CipherEngine {
    /// Derive a key from `password` and build the cipher for `method`
    pub fn new(password: &str, method: CipherMethod) -> Result<Self, CryptoError> {
        method.ensure_implemented()?;
        let key = evp_bytes_to_key(password, method.key_size())?;
        let sealer = Sealer::new(method, &key)?;
        Ok(CipherEngine {
            method,
            sealer,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// The configured method
    pub fn method(&self) -> CipherMethod {
        self.method
    }

    /// Encrypt `plaintext`
    ///
    /// Without a session the output is `iv || ciphertext || tag`; with a
    /// session it is `ciphertext || tag` under the session's cached IV.
    pub fn encrypt(&self, plaintext: &[u8], session: Option<&str>) -> Result<Vec<u8>, CryptoError> {
        match session {
            None => {
                let iv = self.random_iv();
                let sealed = self.sealer.seal(&iv, plaintext)?;
                let mut out = Vec::with_capacity(iv.len() + sealed.len());
                out.extend_from_slice(&iv);
                out.extend_from_slice(&sealed);
                Ok(out)
            }
            Some(id) => {
                let iv = self.session_iv_or_create(id);
                self.sealer.seal(&iv, plaintext)
            }
        }
    }

    /// Decrypt `data`
    ///
    /// Without a session the IV is read from the first `iv_size` bytes. With a
    /// session whose IV is cached, `data` starts directly with ciphertext; on a
    /// cache miss the IV is read from the prefix and cached for the session.
    pub fn decrypt(&self, data: &[u8], session: Option<&str>) -> Result<Vec<u8>, CryptoError> {
        if let Some(id) = session {
            if let Some(iv) = self.session_iv(id) {
                let tag = self.method.tag_size();
                if data.len() < tag {
                    return Err(CryptoError::InvalidInputSize {
                        expected: tag,
                        actual: data.len(),
                    });
                }
                return self.sealer.open(&iv, data);
            }
        }

        let iv_size = self.method.iv_size();
        let min = self.method.min_message_len();
        if data.len() < min {
            return Err(CryptoError::InvalidInputSize {
                expected: min,
                actual: data.len(),
            });
        }
        let (iv, ciphertext) = data.split_at(iv_size);
        let plaintext = self.sealer.open(iv, ciphertext)?;
        if let Some(id) = session {
            self.open_session(id, iv)?;
        }
        Ok(plaintext)
    }

    /// Cached IV for a session, if one has been established
    pub fn session_iv(&self, session: &str) -> Option<Vec<u8>> {
        self.sessions().get(session).cloned()
    }

    /// Install an IV received from the peer for `session`
    ///
    /// An IV already cached for the session is kept; it is never regenerated
    /// or replaced while the session lives.
    pub fn open_session(&self, session: &str, iv: &[u8]) -> Result<(), CryptoError> {
        let expected = self.method.iv_size();
        if iv.len() != expected {
            return Err(CryptoError::InvalidIv {
                expected,
                actual: iv.len(),
            });
        }
        self.sessions()
            .entry(session.to_string())
            .or_insert_with(|| iv.to_vec());
        Ok(())
    }

    /// Drop the cached IV of one session. Returns whether it existed.
    pub fn end_session(&self, session: &str) -> bool {
        let removed = self.sessions().remove(session).is_some();
        if removed {
            trace!("Cipher session {} ended", session);
        }
        removed
    }

    /// Drop every cached session IV
    ///
    /// Any session still in flight will start over with a new IV on its next
    /// encrypt; prefer [`end_session`](Self::end_session).
    pub fn clear_cache(&self) {
        self.sessions().clear();
    }

    /// Number of sessions with a cached IV
    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    fn session_iv_or_create(&self, session: &str) -> Vec<u8> {
        let mut sessions = self.sessions();
        if let Some(iv) = sessions.get(session) {
            return iv.clone();
        }
        let iv = self.random_iv();
        sessions.insert(session.to_string(), iv.clone());
        trace!("Cipher session {} established", session);
        iv
    }

    fn random_iv(&self) -> Vec<u8> {
        let mut iv = vec![0u8; self.method.iv_size()];
        rand::thread_rng().fill_bytes(&mut iv);
        iv
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
