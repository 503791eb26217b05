//! Receive buffer for partially read protocol messages
//!
//! Bytes are appended at the back and drained from the front in FIFO order.
//! Parsers look at [`ReceiveBuffer::as_slice`] and only call
//! [`ReceiveBuffer::consume`] once a whole message is available.

use bytes::{Bytes, BytesMut};

/// Growable FIFO byte queue
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    inner: BytesMut,
}

impl ReceiveBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        ReceiveBuffer {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// Append freshly received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    /// Unconsumed bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Number of unconsumed bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether all bytes have been consumed
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop `n` bytes from the front. Consuming past the end empties the buffer.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.inner.len());
        let _ = self.inner.split_to(n);
    }

    /// Take every unconsumed byte, leaving the buffer empty
    pub fn take_all(&mut self) -> Bytes {
        self.inner.split().freeze()
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Mutable access for reads straight into the buffer
    pub fn inner_mut(&mut self) -> &mut BytesMut {
        &mut self.inner
    }
}
