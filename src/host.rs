//! Facilities provided by the host application.
//!
//! The crate does no I/O. Everything that touches the network, the clock or
//! persistent settings goes through these traits, and the host reports
//! readiness back by calling the `on_*` methods of the transport and client.

use std::fmt;
use std::io;
use std::time::Duration;

use http::Uri;

/// Key under which the access token is kept in the [`CredentialStore`].
pub const ACCESS_TOKEN_KEY: &str = "line-auth-token";

/// Which readiness event the transport wants to hear about next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Call `on_readable()` when there is data (or EOF) to read.
    Read,
    /// Call `on_writable()` when the socket can take more bytes.
    Write,
    /// No notifications wanted.
    Idle,
}

/// A non-blocking encrypted stream socket.
pub trait TlsSocket {
    /// Read available bytes.
    ///
    /// `Ok(0)` means EOF. No data available right now is signalled with
    /// [`io::ErrorKind::WouldBlock`].
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as many bytes as the socket takes without blocking.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Replace the current readiness registration.
    fn register(&mut self, interest: Interest);

    /// Close the socket. No further events must be delivered for it.
    fn close(&mut self);
}

/// Opens encrypted sockets.
pub trait Connector {
    /// Socket type produced by this connector.
    type Socket: TlsSocket;

    /// Begin connecting to `host:port`.
    ///
    /// The handshake completes asynchronously. The host reports the outcome via
    /// `Transport::on_connected()` or `Transport::on_connect_error()`.
    fn connect(&mut self, host: &str, port: u16) -> io::Result<Self::Socket>;
}

/// Handle of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Single-shot, cancelable timers.
pub trait Timer {
    /// Schedule a timer. When it fires, the host calls `Transport::on_reconnect_timer()`.
    fn schedule(&mut self, delay: Duration) -> TimerId;

    /// Cancel a timer that has not fired yet.
    fn cancel(&mut self, id: TimerId);
}

/// Credential storage, keyed by logical name.
///
/// Takes `&self` since the store is shared between the transport and the
/// client on the host's single event loop thread.
pub trait CredentialStore {
    /// Look up a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value.
    fn set(&self, key: &str, value: &str);

    /// Forget a value.
    fn remove(&self, key: &str);
}

/// Handle of a one-shot fetch started by a [`Fetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchId(pub u64);

/// A one-shot fetch as handed to the [`Fetcher`].
pub struct Fetch<'a> {
    /// Where to connect.
    pub uri: &'a Uri,
    /// The complete raw HTTP request, head and body.
    pub request: &'a [u8],
    /// Largest response the fetcher should accept.
    pub max_len: usize,
}

/// The host's one-shot HTTP fetch facility.
///
/// Each fetch uses its own connection. When it finishes the host calls
/// `HttpClient::on_fetch_complete()` with the raw response (head and body).
pub trait Fetcher {
    /// Start a fetch.
    fn start(&mut self, fetch: Fetch<'_>) -> io::Result<FetchId>;

    /// Cancel a running fetch. Its completion must not be reported.
    fn cancel(&mut self, id: FetchId);
}

impl fmt::Debug for Fetch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetch")
            .field("uri", self.uri)
            .field("request_len", &self.request.len())
            .field("max_len", &self.max_len)
            .finish()
    }
}
