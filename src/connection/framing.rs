//! Length-prefixed framing for the encrypted relay leg
//!
//! ```text
//! [session iv, once per direction in session mode]
//! +---------+--------------------------------------+
//! | LEN u16 | sealed (cipher engine output, LEN)   |
//! +---------+--------------------------------------+
//! ```

use crate::crypto::CipherEngine;
use crate::error::Result;
use bytes::{Buf, BytesMut};

/// Largest plaintext carried in a single frame
pub const MAX_CHUNK_SIZE: usize = 0x3FFF;

const LEN_PREFIX: usize = 2;

/// Encodes outgoing plaintext into sealed frames
#[derive(Debug)]
pub struct FrameEncoder {
    session: Option<String>,
    iv_sent: bool,
}

impl FrameEncoder {
    /// `session` selects session mode for this direction
    pub fn new(session: Option<String>) -> Self {
        FrameEncoder {
            session,
            iv_sent: false,
        }
    }

    /// Seal `plaintext` into one or more frames
    pub fn encode(&mut self, cipher: &CipherEngine, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(plaintext.len() + 64);

        for chunk in plaintext.chunks(MAX_CHUNK_SIZE) {
            let sealed = cipher.encrypt(chunk, self.session.as_deref())?;

            if let (Some(session), false) = (self.session.as_deref(), self.iv_sent) {
                if let Some(iv) = cipher.session_iv(session) {
                    out.extend_from_slice(&iv);
                }
                self.iv_sent = true;
            }

            out.extend_from_slice(&(sealed.len() as u16).to_be_bytes());
            out.extend_from_slice(&sealed);
        }

        Ok(out)
    }
}

/// Incrementally decodes incoming frames
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    session: Option<String>,
    awaiting_iv: bool,
}

impl FrameDecoder {
    pub fn new(session: Option<String>) -> Self {
        FrameDecoder {
            buf: BytesMut::with_capacity(MAX_CHUNK_SIZE + 64),
            awaiting_iv: session.is_some(),
            session,
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes received but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame's plaintext, or `None` until more bytes arrive
    pub fn next_frame(&mut self, cipher: &CipherEngine) -> Result<Option<Vec<u8>>> {
        if self.awaiting_iv {
            let iv_size = cipher.method().iv_size();
            if self.buf.len() < iv_size {
                return Ok(None);
            }
            let iv = self.buf.split_to(iv_size);
            if let Some(session) = self.session.as_deref() {
                cipher.open_session(session, &iv)?;
            }
            self.awaiting_iv = false;
        }

        if self.buf.len() < LEN_PREFIX {
            return Ok(None);
        }
        let len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
        if self.buf.len() < LEN_PREFIX + len {
            return Ok(None);
        }

        self.buf.advance(LEN_PREFIX);
        let sealed = self.buf.split_to(len);
        let plaintext = cipher.decrypt(&sealed, self.session.as_deref())?;
        Ok(Some(plaintext))
    }
}
