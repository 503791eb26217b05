//! Client connections
//!
//! Negotiation state machine, upstream routing and the relay pumps that
//! move bytes once a connection is established.

mod context;
mod event;
mod framing;
mod proxy;
mod relay;
mod state;

pub use context::ConnectionContext;
pub use event::{ConnectionEvent, ConnectionId};
pub use framing::{FrameDecoder, FrameEncoder, MAX_CHUNK_SIZE};
pub use proxy::{ProxyConnection, Step};
pub use relay::{relay_encrypted, relay_plain, RelayContext};
pub use state::{ActivityClock, ConnectionState};
