//! Persistent message-oriented connection to the remote service.

mod client;

pub use client::{Transport, TransportEvent, WsTransport, KEEPALIVE_INTERVAL};
