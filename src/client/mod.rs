//! Bounded one-shot HTTP client
//!
//! Auxiliary fetches (profile pictures, stickers, file transfers) do not go
//! over the persistent transport. Each one is a separate exchange on its own
//! connection, run by the host's one-shot fetch facility ([`Fetcher`]).
//!
//! The client keeps a FIFO queue and runs at most
//! [`max_in_flight`][ClientConfig::max_in_flight] fetches at a time. Fetches
//! start in submission order but may complete in any order. Dropping the
//! client cancels every running fetch without invoking its completion.
//!
//! # Example
//!
//! ```
//! use std::io;
//! use std::rc::Rc;
//!
//! use talk_proto::host::*;
//! use talk_proto::{ClientConfig, Flags, HttpClient};
//!
//! # struct Fetches(u64);
//! # impl Fetcher for Fetches {
//! #     fn start(&mut self, _: Fetch<'_>) -> io::Result<FetchId> { self.0 += 1; Ok(FetchId(self.0)) }
//! #     fn cancel(&mut self, _: FetchId) {}
//! # }
//! # struct Settings;
//! # impl CredentialStore for Settings {
//! #     fn get(&self, _: &str) -> Option<String> { Some("token".into()) }
//! #     fn set(&self, _: &str, _: &str) {}
//! #     fn remove(&self, _: &str) {}
//! # }
//! let mut client = HttpClient::new(ClientConfig::new(), Fetches(0), Rc::new(Settings));
//!
//! client.get(
//!     "https://os.example.test/profile/abc",
//!     Flags::AUTH | Flags::LARGE,
//!     |result| {
//!         let fetched = result.unwrap();
//!         assert_eq!(fetched.status, 200);
//!         assert_eq!(fetched.body, b"\x89PNG");
//!     },
//! );
//!
//! assert_eq!(client.in_flight(), 1);
//!
//! // Later, the host's fetch finishes.
//! client.on_fetch_complete(
//!     FetchId(1),
//!     Ok(&b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\r\n\x89PNG"[..]),
//! );
//!
//! assert_eq!(client.in_flight(), 0);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::rc::Rc;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use http::uri::Scheme;
use http::{Method, StatusCode, Uri};

use crate::host::{CredentialStore, Fetch, FetchId, Fetcher, ACCESS_TOKEN_KEY};
use crate::parser::split_response;
use crate::util::{log_data, AuthorityExt, RequestWriter};
use crate::{Error, DEFAULT_APPLICATION, DEFAULT_USER_AGENT};

#[cfg(test)]
mod test;

/// Settings for a [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) user_agent: String,
    pub(crate) application: String,
    pub(crate) max_in_flight: usize,
    pub(crate) max_len: usize,
    pub(crate) max_len_large: usize,
}

impl ClientConfig {
    /// Default settings.
    pub fn new() -> Self {
        ClientConfig {
            user_agent: DEFAULT_USER_AGENT.into(),
            application: DEFAULT_APPLICATION.into(),
            max_in_flight: 4,
            max_len: 512 * 1024,
            max_len_large: 100 * 1024 * 1024,
        }
    }

    /// Override the `User-Agent`.
    pub fn user_agent(mut self, v: impl Into<String>) -> Self {
        self.user_agent = v.into();
        self
    }

    /// Override the `X-Line-Application` identity sent with [`Flags::AUTH`].
    pub fn application(mut self, v: impl Into<String>) -> Self {
        self.application = v.into();
        self
    }

    /// Max number of fetches running at the same time.
    ///
    /// Clamped to at least 1.
    pub fn max_in_flight(mut self, v: usize) -> Self {
        self.max_in_flight = v.max(1);
        self
    }

    /// Response size ceilings, without and with [`Flags::LARGE`].
    pub fn max_len(mut self, default: usize, large: usize) -> Self {
        self.max_len = default;
        self.max_len_large = large;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for a single fetch.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    /// No options.
    pub const NONE: Flags = Flags(0);

    /// Send the application identity and the stored access token.
    pub const AUTH: Flags = Flags(1);

    /// Accept responses up to the large ceiling, for media.
    pub const LARGE: Flags = Flags(2);

    /// Tell if all options in `other` are set.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Flags::AUTH) {
            set.entry(&format_args!("AUTH"));
        }
        if self.contains(Flags::LARGE) {
            set.entry(&format_args!("LARGE"));
        }
        set.finish()
    }
}

/// A finished fetch.
///
/// The body borrows from the host's response buffer and is only valid for
/// the duration of the completion.
#[derive(Debug)]
pub struct Fetched<'a> {
    /// Response status.
    pub status: StatusCode,
    /// Everything after the response head.
    pub body: &'a [u8],
}

type Callback = Box<dyn FnOnce(Result<Fetched<'_>, Error>)>;

struct PendingFetch {
    url: String,
    flags: Flags,
    content_type: String,
    body: Vec<u8>,
    completion: Callback,
}

/// FIFO queue of one-shot fetches with bounded concurrency.
///
/// See the [module documentation][crate::client].
pub struct HttpClient<F: Fetcher> {
    config: ClientConfig,
    fetcher: F,
    credentials: Rc<dyn CredentialStore>,
    queue: VecDeque<PendingFetch>,
    running: Vec<(FetchId, Callback)>,
}

impl<F: Fetcher> HttpClient<F> {
    /// Create a client using `fetcher` for the actual exchanges.
    pub fn new(config: ClientConfig, fetcher: F, credentials: Rc<dyn CredentialStore>) -> Self {
        HttpClient {
            config,
            fetcher,
            credentials,
            queue: VecDeque::new(),
            running: Vec::new(),
        }
    }

    /// Enqueue a fetch.
    ///
    /// A non-empty `body` makes it a `POST`, otherwise a `GET`. An empty
    /// `content_type` sends no `Content-Type` header.
    ///
    /// The completion is invoked exactly once, unless the client is dropped
    /// first. It may be invoked before this function returns if the fetch
    /// cannot be started.
    pub fn request<C>(
        &mut self,
        url: &str,
        flags: Flags,
        content_type: &str,
        body: impl Into<Vec<u8>>,
        completion: C,
    ) where
        C: FnOnce(Result<Fetched<'_>, Error>) + 'static,
    {
        let body = body.into();

        debug!("Queue fetch {} {:?} ({} bytes)", url, flags, body.len());

        self.queue.push_back(PendingFetch {
            url: url.to_string(),
            flags,
            content_type: content_type.to_string(),
            body,
            completion: Box::new(completion),
        });

        self.execute_next();
    }

    /// Enqueue a `GET` without body.
    pub fn get<C>(&mut self, url: &str, flags: Flags, completion: C)
    where
        C: FnOnce(Result<Fetched<'_>, Error>) + 'static,
    {
        self.request(url, flags, "", Vec::new(), completion);
    }

    /// A fetch started by the [`Fetcher`] finished.
    ///
    /// `result` is the raw response, head and body, or the fetcher's error
    /// message. Completions for unknown or cancelled fetches are ignored.
    pub fn on_fetch_complete(&mut self, id: FetchId, result: Result<&[u8], &str>) {
        let Some(pos) = self.running.iter().position(|(i, _)| *i == id) else {
            debug!("Ignore completion of unknown fetch {:?}", id);
            return;
        };

        let (_, completion) = self.running.remove(pos);

        let outcome = result
            .map_err(|e| Error::Fetch(e.to_string()))
            .and_then(split_response);

        match outcome {
            Ok((status, body)) => {
                debug!("Fetch {:?} done: {} ({} bytes)", id, status, body.len());
                completion(Ok(Fetched { status, body }));
            }
            Err(e) => {
                error!("HTTP error: {}", e);
                completion(Err(e));
            }
        }

        self.execute_next();
    }

    /// Number of fetches running.
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    /// Number of fetches waiting for a free slot.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn execute_next(&mut self) {
        while self.running.len() < self.config.max_in_flight {
            let Some(pending) = self.queue.pop_front() else {
                break;
            };

            match self.start(&pending) {
                Ok(id) => {
                    trace!("Fetch {:?} started: {}", id, pending.url);
                    self.running.push((id, pending.completion));
                }
                Err(e) => {
                    error!("HTTP error: {}", e);
                    (pending.completion)(Err(e));
                }
            }
        }
    }

    fn start(&mut self, pending: &PendingFetch) -> Result<FetchId, Error> {
        let uri: Uri = pending
            .url
            .parse()
            .map_err(|e| Error::BadUrl(format!("{}: {}", pending.url, e)))?;

        let Some(authority) = uri.authority() else {
            return Err(Error::BadUrl(format!("{}: no host", pending.url)));
        };

        let port = uri.port_u16().unwrap_or_else(|| {
            if uri.scheme() == Some(&Scheme::HTTPS) {
                443
            } else {
                80
            }
        });

        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        let method = if pending.body.is_empty() {
            Method::GET
        } else {
            Method::POST
        };

        let mut w = RequestWriter::new(&method, path);

        w.header("Connection", "close");
        w.header("Host", format!("{}:{}", authority.host(), port));
        w.header("User-Agent", &self.config.user_agent);

        if authority.userinfo().is_some() {
            let user = authority.username().unwrap_or_default();
            let pass = authority.password().unwrap_or_default();
            let creds = BASE64_STANDARD.encode(format!("{}:{}", user, pass));
            w.header("Authorization", format!("Basic {}", creds));
        }

        if pending.flags.contains(Flags::AUTH) {
            let token = self.credentials.get(ACCESS_TOKEN_KEY).unwrap_or_default();
            w.header("X-Line-Application", &self.config.application);
            w.header("X-Line-Access", token);
        }

        if !pending.content_type.is_empty() {
            w.header("Content-Type", &pending.content_type);
        }

        let request = w.finish(&pending.body);

        let max_len = if pending.flags.contains(Flags::LARGE) {
            self.config.max_len_large
        } else {
            self.config.max_len
        };

        debug!("Fetch {} {} (max {} bytes)", method, uri, max_len);
        log_data(&request);

        self.fetcher
            .start(Fetch {
                uri: &uri,
                request: &request,
                max_len,
            })
            .map_err(|e| Error::Fetch(e.to_string()))
    }
}

impl<F: Fetcher> Drop for HttpClient<F> {
    fn drop(&mut self) {
        for (id, _) in self.running.drain(..) {
            debug!("Cancel fetch {:?}", id);
            self.fetcher.cancel(id);
        }
    }
}

impl<F: Fetcher> fmt::Debug for HttpClient<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("in_flight", &self.running.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}
