/// Reasons for closing the persistent connection.
///
/// Used for diagnostics when the transport tears down its socket. Whether the
/// teardown is fatal to the session is decided separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The owner asked for it, for instance to switch endpoint.
    Requested,

    /// The server did not negotiate `Connection: keep-alive`.
    ///
    /// The next queued call goes out on a fresh connection.
    NotKeepAlive,

    /// EOF or a socket error while reading or writing.
    ConnectionLost,

    /// The response head could not be parsed.
    MalformedResponse,

    /// The TLS handshake failed.
    HandshakeFailed,

    /// Server answered `403`, the session is in use elsewhere.
    SessionSuperseded,

    /// A continuation reported a fatal error.
    CallFailed,
}

impl CloseReason {
    pub(crate) fn explain(&self) -> &'static str {
        match self {
            CloseReason::Requested => "close requested",
            CloseReason::NotKeepAlive => "server did not send Connection: keep-alive",
            CloseReason::ConnectionLost => "connection lost",
            CloseReason::MalformedResponse => "malformed response head",
            CloseReason::HandshakeFailed => "tls handshake failed",
            CloseReason::SessionSuperseded => "session superseded (403)",
            CloseReason::CallFailed => "call reported a fatal error",
        }
    }
}
