//! Persistent HTTP/1.1 transport for a binary RPC protocol, plus a bounded
//! one-shot HTTP client for auxiliary fetches.
//!
//! Sans-IO, which means the crate never touches a socket or a clock itself.
//! Sockets, timers, credential storage and one-shot fetches are facilities of
//! the host application, expressed as the traits in [`host`]. The host's event
//! loop calls the `on_*` entry points of [`Transport`] and [`HttpClient`] when
//! a socket becomes readable/writable, a handshake completes or a timer fires.
//!
//! # Transport
//!
//! One long-lived encrypted socket carries request/response pairs, strictly one
//! at a time. Bytes are accumulated across arbitrary read boundaries, the
//! response head is parsed once complete, and the body is handed to the call's
//! continuation once `Content-Length` bytes have arrived.
//!
//! See the [`transport`] module for the state graph and an example, and the
//! [`client`] module for one-shot fetches.
//!
//! # In scope:
//!
//! * Request framing with either the standard header block or a session-affinity
//!   (`X-LS`) header
//! * Response heads split at any byte boundary
//! * `Content-Length` gated completion and keep-alive reuse
//! * Reconnect with a two-tier backoff
//! * Bounded concurrency for one-shot fetches
//!
//! # Out of scope:
//!
//! * Opening/closing sockets, TLS
//! * transfer-encoding: chunked, redirects, compression
//! * More than one request in flight per connection
//!
//! # The http crate
//!
//! Based on the [http crate](https://crates.io/crates/http) - a unified HTTP API for Rust.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![deny(missing_docs)]

#[macro_use]
extern crate log;

mod close_reason;
pub use close_reason::CloseReason;

mod error;
pub use error::Error;

pub mod host;

mod parser;
pub use parser::{try_parse_response_head, ResponseHead, MAX_RESPONSE_HEADERS};

mod util;

#[cfg(feature = "transport")]
pub mod transport;
#[cfg(feature = "transport")]
pub use transport::{Completion, ConnectionState, Transport, TransportConfig};

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub use client::{ClientConfig, Fetched, Flags, HttpClient};

/// Identity sent in `User-Agent` unless configured otherwise.
pub const DEFAULT_USER_AGENT: &str = "purple-line (LINE for libpurple/Pidgin)";

/// Application identity sent in `X-Line-Application` unless configured otherwise.
pub const DEFAULT_APPLICATION: &str = "DESKTOPWIN\t5.6.0.1625\tWINDOWS\t5.2.2-XP-x64";

// Re-export the basis for this library.
pub use http;
