//! Persistent HTTP/1.1 transport
//!
//! One encrypted socket carries a queue of calls, strictly one at a time. The
//! transport owns the socket, the connection state, the outbound staging
//! buffer, the inbound accumulator and the framing. It never blocks: the host
//! event loop calls the `on_*` entry points when the socket is ready or the
//! reconnect timer fires.
//!
//! ```text
//!                  open()                 on_connected()
//!   ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//!   │ Disconnected │───▶│  Connecting  │───▶│  Connected   │
//!   └──────────────┘    └──────────────┘    └──────────────┘
//!          ▲                    │                   │
//!          │ on_reconnect_timer │ handshake failure │ connection lost
//!          │                    ▼                   │ with a call in flight
//!          │            ┌──────────────┐            │ and auto-reconnect
//!          └────────────│ Reconnecting │◀───────────┘
//!                       └──────────────┘
//! ```
//!
//! Every open and every close bumps the connection [epoch][Transport::epoch].
//! A continuation may close or reopen the connection. The transport compares
//! epochs after each continuation returns and stops driving a socket that is
//! no longer current.
//!
//! # Example
//!
//! ```
//! use std::io::{self, Write};
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! use talk_proto::host::*;
//! use talk_proto::http::Method;
//! use talk_proto::{Completion, ConnectionState, Transport, TransportConfig};
//!
//! # struct Socket;
//! # impl TlsSocket for Socket {
//! #     fn read(&mut self, _: &mut [u8]) -> io::Result<usize> { Err(io::ErrorKind::WouldBlock.into()) }
//! #     fn write(&mut self, buf: &[u8]) -> io::Result<usize> { Ok(buf.len()) }
//! #     fn register(&mut self, _: Interest) {}
//! #     fn close(&mut self) {}
//! # }
//! # struct Tls;
//! # impl Connector for Tls {
//! #     type Socket = Socket;
//! #     fn connect(&mut self, _: &str, _: u16) -> io::Result<Socket> { Ok(Socket) }
//! # }
//! # struct Clock;
//! # impl Timer for Clock {
//! #     fn schedule(&mut self, _: Duration) -> TimerId { TimerId(1) }
//! #     fn cancel(&mut self, _: TimerId) {}
//! # }
//! # struct Settings;
//! # impl CredentialStore for Settings {
//! #     fn get(&self, _: &str) -> Option<String> { None }
//! #     fn set(&self, _: &str, _: &str) {}
//! #     fn remove(&self, _: &str) {}
//! # }
//! let config = TransportConfig::new("rpc.example.test", 443);
//! let mut transport = Transport::new(config, Tls, Clock, Rc::new(Settings));
//!
//! // The dispatcher stages the serialized call...
//! transport.write_all(b"\x80\x01\x00\x01").unwrap();
//!
//! // ...and hands it over. The connection is opened on demand.
//! transport
//!     .request(Method::POST, "/S4", "application/x-thrift", |t, body| {
//!         assert_eq!(t.status_code(), Some(200));
//!         assert!(!body.is_empty());
//!         Completion::Done
//!     })
//!     .unwrap();
//!
//! assert_eq!(transport.state(), ConnectionState::Connecting);
//! assert_eq!(transport.queued(), 1);
//!
//! // The host reports the finished handshake, the request goes out.
//! transport.on_connected().unwrap();
//! assert!(transport.is_in_flight());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use http::{Method, StatusCode};

use crate::host::{
    Connector, CredentialStore, Interest, Timer, TimerId, TlsSocket, ACCESS_TOKEN_KEY,
};
use crate::parser::{try_parse_response_head, ResponseHead};
use crate::util::log_data;
use crate::{CloseReason, Error, DEFAULT_APPLICATION, DEFAULT_USER_AGENT};

use backoff::Backoff;
use framing::HeaderMode;

mod backoff;
mod framing;

#[cfg(test)]
mod test;

/// Size of a single read burst.
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Socket created, TLS handshake not finished.
    Connecting,
    /// Handshake done, calls can be sent.
    Connected,
    /// Waiting for the reconnect timer.
    Reconnecting,
}

/// What a continuation tells the transport after consuming a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The response was consumed. Continue with the next call.
    Done,
    /// The call failed, but the session is fine. Logged, then the queue
    /// keeps draining.
    Failed(String),
    /// The session cannot continue. The connection is closed and the error
    /// is returned to the host.
    Fatal(String),
    /// The server revoked this device's authorization. Like `Fatal`, and the
    /// stored access token is removed.
    Deauthorized(String),
}

/// Settings for a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) session_mode: bool,
    pub(crate) user_agent: String,
    pub(crate) application: String,
    pub(crate) reconnect_short: Duration,
    pub(crate) reconnect_long: Duration,
}

impl TransportConfig {
    /// Config for a connection to `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TransportConfig {
            host: host.into(),
            port,
            session_mode: false,
            user_agent: DEFAULT_USER_AGENT.into(),
            application: DEFAULT_APPLICATION.into(),
            reconnect_short: Duration::from_secs(10),
            reconnect_long: Duration::from_secs(60),
        }
    }

    /// Use the session-affinity header mode.
    ///
    /// Once the server handed out an `X-LS` token, requests carry only that
    /// token instead of the standard header block. Responses are treated as
    /// keep-alive unless the connection is lost.
    pub fn session_mode(mut self, enabled: bool) -> Self {
        self.session_mode = enabled;
        self
    }

    /// Override the `User-Agent`.
    pub fn user_agent(mut self, v: impl Into<String>) -> Self {
        self.user_agent = v.into();
        self
    }

    /// Override the `X-Line-Application` identity.
    pub fn application(mut self, v: impl Into<String>) -> Self {
        self.application = v.into();
        self
    }

    /// Set the two reconnect delays.
    ///
    /// `short` is used for the first reconnect after a failure, `long` for
    /// every further one until a handshake succeeds.
    pub fn reconnect_delays(mut self, short: Duration, long: Duration) -> Self {
        self.reconnect_short = short;
        self.reconnect_long = long;
        self
    }

    /// The host connected to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port connected to.
    pub fn port(&self) -> u16 {
        self.port
    }
}

type Continuation<N, T> = Box<dyn FnOnce(&mut Transport<N, T>, &[u8]) -> Completion>;

/// One call waiting to be sent, or awaiting its response.
struct PendingRequest<N: Connector, T: Timer> {
    method: Method,
    path: String,
    content_type: String,
    body: Vec<u8>,
    continuation: Continuation<N, T>,
}

/// The serialized request being written.
#[derive(Debug, Default)]
struct Outgoing {
    data: Vec<u8>,
    written: usize,
}

/// Persistent connection carrying RPC calls as HTTP/1.1 requests.
///
/// See the [module documentation][crate::transport].
pub struct Transport<N: Connector, T: Timer> {
    config: TransportConfig,
    connector: N,
    timer: T,
    credentials: Rc<dyn CredentialStore>,

    state: ConnectionState,
    socket: Option<N::Socket>,
    epoch: u64,
    auto_reconnect: bool,
    backoff: Backoff,
    reconnect_timer: Option<TimerId>,
    session_token: Option<String>,

    queue: VecDeque<PendingRequest<N, T>>,
    in_flight: bool,

    outbound: Vec<u8>,
    outgoing: Outgoing,

    inbound: Vec<u8>,
    // Head of the response being received, None until it is complete.
    response: Option<ResponseHead>,
    completed: Option<ResponseHead>,
}

impl<N: Connector, T: Timer> Transport<N, T> {
    /// Create a transport. No connection is made until [`open()`][Self::open]
    /// or the first [`request()`][Self::request].
    pub fn new(
        config: TransportConfig,
        connector: N,
        timer: T,
        credentials: Rc<dyn CredentialStore>,
    ) -> Self {
        let backoff = Backoff::new(config.reconnect_short, config.reconnect_long);

        Transport {
            config,
            connector,
            timer,
            credentials,
            state: ConnectionState::Disconnected,
            socket: None,
            epoch: 0,
            auto_reconnect: false,
            backoff,
            reconnect_timer: None,
            session_token: None,
            queue: VecDeque::new(),
            in_flight: false,
            outbound: Vec::new(),
            outgoing: Outgoing::default(),
            inbound: Vec::new(),
            response: None,
            completed: None,
        }
    }

    /// Start connecting.
    ///
    /// Does nothing unless disconnected. The handshake finishes when the host
    /// calls [`on_connected()`][Self::on_connected].
    pub fn open(&mut self) -> Result<(), Error> {
        if self.state != ConnectionState::Disconnected {
            return Ok(());
        }

        info!("Connecting to {}:{}", self.config.host, self.config.port);

        self.epoch += 1;
        self.in_flight = false;
        self.response = None;

        match self.connector.connect(&self.config.host, self.config.port) {
            Ok(socket) => {
                self.socket = Some(socket);
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            Err(e) => self.connect_failed(e.to_string()),
        }
    }

    /// Close the connection.
    ///
    /// Clears the session token and all partially received data. Queued calls
    /// are kept and go out again on the next connection. The continuation of a
    /// call in flight is not invoked for this connection.
    pub fn close(&mut self) {
        self.close_with(CloseReason::Requested);
    }

    /// Enqueue a call.
    ///
    /// The body is whatever was written to the outbound buffer (see the
    /// [`Write`](io::Write) impl) since the previous call. The buffer is empty
    /// afterwards. Opens the connection if needed.
    ///
    /// The continuation runs once the whole response has arrived. It gets the
    /// transport, to inspect [`status_code()`][Self::status_code] or issue
    /// further calls, and the response body.
    pub fn request<F>(
        &mut self,
        method: Method,
        path: &str,
        content_type: &str,
        continuation: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut Self, &[u8]) -> Completion + 'static,
    {
        let body = std::mem::take(&mut self.outbound);

        debug!("Queue {} {} ({} bytes)", method, path, body.len());

        self.queue.push_back(PendingRequest {
            method,
            path: path.to_string(),
            content_type: content_type.to_string(),
            body,
            continuation: Box::new(continuation),
        });

        self.send_next()
    }

    /// Enable or disable reconnecting after a lost connection.
    ///
    /// Only takes effect while disconnected, it applies to the next
    /// connection lifetime.
    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        if self.state == ConnectionState::Disconnected {
            self.auto_reconnect = enabled;
        }
    }

    /// Status code of the most recently completed response.
    pub fn status_code(&self) -> Option<u16> {
        self.completed.as_ref().map(|h| h.status.as_u16())
    }

    /// Content length of the most recently completed response.
    pub fn content_length(&self) -> Option<usize> {
        self.completed.as_ref().map(|h| h.content_length)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connection epoch, changed by every open and close.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of calls not yet completed, including the one in flight.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Tell if a request has been sent and its response not fully received.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Session-affinity token handed out by the server on this connection.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// The outbound staging buffer.
    pub fn outbound_mut(&mut self) -> &mut Vec<u8> {
        &mut self.outbound
    }

    /// The TLS handshake finished.
    pub fn on_connected(&mut self) -> Result<(), Error> {
        if self.state != ConnectionState::Connecting {
            return Ok(());
        }

        info!("Connected to {}:{}", self.config.host, self.config.port);

        self.state = ConnectionState::Connected;
        self.backoff.reset();

        self.send_next()
    }

    /// The TLS handshake failed.
    pub fn on_connect_error(&mut self, message: &str) -> Result<(), Error> {
        if self.state != ConnectionState::Connecting {
            return Ok(());
        }

        warn!("SSL error: {}", message);

        self.connect_failed(message.to_string())
    }

    /// The reconnect timer fired.
    pub fn on_reconnect_timer(&mut self) -> Result<(), Error> {
        if self.state != ConnectionState::Reconnecting {
            return Ok(());
        }

        self.reconnect_timer = None;
        self.state = ConnectionState::Disconnected;

        self.open()
    }

    /// The socket can take more bytes.
    pub fn on_writable(&mut self) -> Result<(), Error> {
        if self.state != ConnectionState::Connected || !self.in_flight {
            return Ok(());
        }

        self.write_out()
    }

    /// The socket has data, or EOF.
    ///
    /// Reads in bursts of [`READ_BUFFER_SIZE`] until the socket would block.
    /// Completed responses are dispatched to their continuations as they
    /// arrive.
    pub fn on_readable(&mut self) -> Result<(), Error> {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }

        let epoch = self.epoch;
        let mut any = false;
        let mut buf = [0_u8; READ_BUFFER_SIZE];

        loop {
            let Some(socket) = self.socket.as_mut() else {
                return Ok(());
            };

            let amount = match socket.read(&mut buf) {
                // EOF after data in this same event is picked up next time.
                Ok(0) if any => break,
                Ok(0) => {
                    info!("Connection lost");
                    return self.connection_lost(CloseReason::ConnectionLost);
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    info!("Read failed: {}", e);
                    return self.connection_lost(CloseReason::ConnectionLost);
                }
            };

            any = true;
            trace!("Read {} bytes", amount);

            self.inbound.extend_from_slice(&buf[..amount]);
            self.drive_response()?;

            if self.epoch != epoch {
                // The socket we were reading is gone.
                break;
            }
        }

        Ok(())
    }

    fn close_with(&mut self, reason: CloseReason) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        debug!("Close connection: {}", reason.explain());

        self.state = ConnectionState::Disconnected;

        if let Some(id) = self.reconnect_timer.take() {
            self.timer.cancel(id);
        }

        if let Some(mut socket) = self.socket.take() {
            socket.register(Interest::Idle);
            socket.close();
            self.epoch += 1;
        }

        self.session_token = None;
        self.in_flight = false;
        self.outgoing = Outgoing::default();
        self.inbound.clear();
        self.response = None;
    }

    fn connect_failed(&mut self, message: String) -> Result<(), Error> {
        self.close_with(CloseReason::HandshakeFailed);

        if self.auto_reconnect && !self.queue.is_empty() {
            self.schedule_reconnect();
            Ok(())
        } else {
            Err(Error::Connect(message))
        }
    }

    fn connection_lost(&mut self, reason: CloseReason) -> Result<(), Error> {
        let was_in_flight = self.in_flight;

        self.close_with(reason);

        if !was_in_flight {
            // Nobody is waiting on this connection.
            return Ok(());
        }

        if self.auto_reconnect {
            self.schedule_reconnect();
            Ok(())
        } else {
            Err(Error::ConnectionLost)
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay();

        info!("Reconnecting in {}s...", delay.as_secs());

        self.state = ConnectionState::Reconnecting;
        self.reconnect_timer = Some(self.timer.schedule(delay));
    }

    fn send_next(&mut self) -> Result<(), Error> {
        match self.state {
            ConnectionState::Disconnected => {
                if self.queue.is_empty() {
                    return Ok(());
                }
                return self.open();
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => return Ok(()),
            ConnectionState::Connected => {}
        }

        if self.in_flight {
            return Ok(());
        }

        let Some(next) = self.queue.front() else {
            // Idle keep-alive. Watch for the server closing on us.
            if let Some(socket) = self.socket.as_mut() {
                socket.register(Interest::Read);
            }
            return Ok(());
        };

        self.response = None;

        let access_token;
        let mode = match (&self.session_token, self.config.session_mode) {
            (Some(token), true) if !token.is_empty() => HeaderMode::Session(token),
            _ => {
                access_token = self
                    .credentials
                    .get(ACCESS_TOKEN_KEY)
                    .filter(|t| !t.is_empty());
                HeaderMode::Standard {
                    access_token: access_token.as_deref(),
                }
            }
        };

        let data = framing::write_request(
            &self.config,
            &next.method,
            &next.path,
            &next.content_type,
            &next.body,
            mode,
        );

        debug!("Send {} {} ({} bytes)", next.method, next.path, data.len());
        log_data(&data);

        self.outgoing = Outgoing { data, written: 0 };
        self.in_flight = true;

        if let Some(socket) = self.socket.as_mut() {
            socket.register(Interest::Write);
        }

        self.write_out()
    }

    fn write_out(&mut self) -> Result<(), Error> {
        let result = loop {
            let Some(socket) = self.socket.as_mut() else {
                return Ok(());
            };

            let pending = &self.outgoing.data[self.outgoing.written..];

            if pending.is_empty() {
                socket.register(Interest::Read);
                break Ok(());
            }

            match socket.write(pending) {
                Ok(0) => break Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => {
                    self.outgoing.written += n;
                    trace!(
                        "Wrote: {}, {} out of {}",
                        n,
                        self.outgoing.written,
                        self.outgoing.data.len()
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                info!("Write failed: {}", e);
                self.connection_lost(CloseReason::ConnectionLost)
            }
        }
    }

    /// Parse and dispatch whatever the accumulator holds.
    fn drive_response(&mut self) -> Result<(), Error> {
        let epoch = self.epoch;

        while self.epoch == epoch && self.state == ConnectionState::Connected {
            if !self.in_flight {
                if !self.inbound.is_empty() {
                    warn!("Discard {} unsolicited bytes", self.inbound.len());
                    self.inbound.clear();
                }
                return Ok(());
            }

            if self.response.is_none() {
                match try_parse_response_head(&self.inbound) {
                    Ok(Some((input_used, head))) => {
                        self.inbound.drain(..input_used);

                        if let Some(token) = &head.session_token {
                            self.session_token = Some(token.clone());
                        }

                        debug!(
                            "Response {} ({} bytes body)",
                            head.status, head.content_length
                        );

                        self.response = Some(head);
                    }
                    // Header terminator not here yet.
                    Ok(None) => return Ok(()),
                    Err(e) => {
                        warn!("Bad response: {}", e);
                        return self.connection_lost(CloseReason::MalformedResponse);
                    }
                }
            }

            let complete = matches!(
                &self.response,
                Some(head) if self.inbound.len() >= head.content_length
            );

            if !complete {
                return Ok(());
            }

            self.complete_response()?;
        }

        Ok(())
    }

    fn complete_response(&mut self) -> Result<(), Error> {
        let Some(head) = self.response.take() else {
            return Ok(());
        };

        let body: Vec<u8> = self.inbound.drain(..head.content_length).collect();
        let keep_alive = head.keep_alive || self.config.session_mode;
        let status = head.status;

        self.completed = Some(head);

        if status == StatusCode::FORBIDDEN {
            // The session was taken over by another client. Reconnecting
            // would fight it for the session.
            warn!("Session died");
            self.close_with(CloseReason::SessionSuperseded);
            return Err(Error::SessionDied);
        }

        let Some(call) = self.queue.pop_front() else {
            return Ok(());
        };

        let epoch = self.epoch;
        let completion = (call.continuation)(self, &body);

        match completion {
            Completion::Done => {}
            Completion::Failed(msg) => {
                warn!("{} {} failed: {}", call.method, call.path, msg);
            }
            Completion::Fatal(msg) => {
                error!("{} {} fatal: {}", call.method, call.path, msg);
                self.close_with(CloseReason::CallFailed);
                return Err(Error::CallFailed(msg));
            }
            Completion::Deauthorized(msg) => {
                error!("{} {} deauthorized: {}", call.method, call.path, msg);
                self.credentials.remove(ACCESS_TOKEN_KEY);
                self.close_with(CloseReason::CallFailed);
                return Err(Error::Deauthorized(msg));
            }
        }

        if self.epoch != epoch {
            debug!("Continuation replaced the connection");
            return Ok(());
        }

        self.in_flight = false;

        if !keep_alive {
            self.close_with(CloseReason::NotKeepAlive);
        }

        self.send_next()
    }
}

impl<N: Connector, T: Timer> io::Write for Transport<N, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<N: Connector, T: Timer> Drop for Transport<N, T> {
    fn drop(&mut self) {
        self.close_with(CloseReason::Requested);
    }
}

impl<N: Connector, T: Timer> fmt::Debug for Transport<N, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("queued", &self.queue.len())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}
