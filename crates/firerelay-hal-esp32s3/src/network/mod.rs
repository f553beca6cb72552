//! HTTPS plumbing over the embassy-net stack.

mod transport;

pub use transport::{TlsTransport, TransportError};

pub const HTTPS_PORT: u16 = 443;
/// Per-operation socket timeout.
pub const SOCKET_TIMEOUT_MS: u64 = 1_000;
/// Responses larger than this are rejected.
pub const RESPONSE_MAX_BYTES: usize = 4096;

pub(crate) const SOCKET_RX_BYTES: usize = 4096;
pub(crate) const SOCKET_TX_BYTES: usize = 2048;
