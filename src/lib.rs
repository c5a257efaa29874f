//! Client side of the WebSocket protocol (RFC 6455, version 13) over a plain
//! TCP stream. Performs the HTTP upgrade handshake, then reads and writes
//! framed messages until the connection terminates. No TLS, no extensions,
//! no subprotocols.
//!
//! [`WsClient::open`] connects, upgrades and spawns a background receiver
//! that drives the user callback. Sends may come from any thread, including
//! from inside the callback.

pub mod client;
pub mod connection;
pub mod frame;
pub mod http;
pub mod message;

pub use client::{WsCallback, WsClient, WsClientError, WsConfig};
pub use connection::{WsCloseReason, WsProtocolError};
pub use frame::{FrameDecodeError, FrameHeadParseError};
pub use http::HandshakeError;
pub use message::{WsEvent, WsMessageKind};
