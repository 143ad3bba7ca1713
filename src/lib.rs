//! Low-latency Deribit client core.
//!
//! One persistent secure WebSocket carries bidirectional JSON-RPC 2.0
//! traffic. Between the socket and application callbacks sits a decoupled
//! send/receive pipeline: lock-free SPSC queues hand frames across threads,
//! a dispatcher routes each inbound frame in O(1) to a per-request
//! continuation or per-channel subscription handler with zero-copy payload
//! views, a token bucket gates outbound admission, and the authentication
//! and paginated history protocols build on top.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod persist;
pub mod rate_limit;
pub mod receiver;
pub mod sender;
pub mod spsc;
#[cfg(test)]
pub(crate) mod testutil;
pub mod transport;
pub mod types;
