//! Cipher engine for the relay leg
//!
//! Derives a key from the profile password and seals/opens relay traffic
//! with the configured [`CipherMethod`].

mod engine;
mod kdf;
mod method;

pub use engine::CipherEngine;
pub use kdf::evp_bytes_to_key;
pub use method::{CipherMethod, TAG_SIZE};
