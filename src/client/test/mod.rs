use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use crate::host::{CredentialStore, Fetch, FetchId, Fetcher, ACCESS_TOKEN_KEY};

use super::{ClientConfig, Flags, HttpClient};


/// A fetch as the host saw it.
pub struct Started {
    pub id: FetchId,
    pub uri: String,
    pub request: String,
    pub max_len: usize,
}

#[derive(Default)]
pub struct MockFetcher {
    next_id: u64,
    started: Rc<RefCell<Vec<Started>>>,
    cancelled: Rc<RefCell<Vec<FetchId>>>,
    fail: Rc<Cell<bool>>,
}

impl Fetcher for MockFetcher {
    fn start(&mut self, fetch: Fetch<'_>) -> io::Result<FetchId> {
        if self.fail.get() {
            return Err(io::Error::new(io::ErrorKind::Other, "no network"));
        }

        self.next_id += 1;
        let id = FetchId(self.next_id);

        self.started.borrow_mut().push(Started {
            id,
            uri: fetch.uri.to_string(),
            request: String::from_utf8_lossy(fetch.request).to_string(),
            max_len: fetch.max_len,
        });

        Ok(id)
    }

    fn cancel(&mut self, id: FetchId) {
        self.cancelled.borrow_mut().push(id);
    }
}

#[derive(Default)]
pub struct MemoryCredentials(RefCell<HashMap<String, String>>);

impl CredentialStore for MemoryCredentials {
    fn get(&self, key: &str) -> Option<String> {
        self.0.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.0.borrow_mut().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.0.borrow_mut().remove(key);
    }
}

pub struct Scenario {
    pub client: HttpClient<MockFetcher>,
    pub started: Rc<RefCell<Vec<Started>>>,
    pub cancelled: Rc<RefCell<Vec<FetchId>>>,
    pub fail: Rc<Cell<bool>>,
    /// `"<url> <status> <body>"` or `"<url> error: <error>"` per completion.
    pub log: Rc<RefCell<Vec<String>>>,
}

impl Scenario {
    pub fn new(config: ClientConfig, access_token: Option<&str>) -> Scenario {
        let fetcher = MockFetcher::default();
        let started = fetcher.started.clone();
        let cancelled = fetcher.cancelled.clone();
        let fail = fetcher.fail.clone();

        let credentials = Rc::new(MemoryCredentials::default());
        if let Some(token) = access_token {
            credentials.set(ACCESS_TOKEN_KEY, token);
        }

        Scenario {
            client: HttpClient::new(config, fetcher, credentials),
            started,
            cancelled,
            fail,
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn basic() -> Scenario {
        let config = ClientConfig::new().user_agent("agent/1.0").application("APP");
        Scenario::new(config, None)
    }

    /// Queue a fetch logging into `self.log`.
    pub fn fetch(&mut self, url: &str, flags: Flags, content_type: &str, body: &[u8]) {
        let log = self.log.clone();
        let name = url.to_string();

        self.client
            .request(url, flags, content_type, body, move |result| {
                let line = match result {
                    Ok(f) => format!(
                        "{} {} {}",
                        name,
                        f.status.as_u16(),
                        String::from_utf8_lossy(f.body)
                    ),
                    Err(e) => format!("{} error: {}", name, e),
                };
                log.borrow_mut().push(line);
            });
    }

    pub fn get(&mut self, url: &str) {
        self.fetch(url, Flags::NONE, "", b"");
    }

    /// Raw request of the `n`th started fetch.
    pub fn request(&self, n: usize) -> String {
        self.started.borrow()[n].request.clone()
    }

    pub fn started_ids(&self) -> Vec<u64> {
        self.started.borrow().iter().map(|s| s.id.0).collect()
    }

    pub fn complete(&mut self, id: u64, status: u16, body: &str) {
        let raw = format!(
            "HTTP/1.1 {} X\r\nContent-Length: {}\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        self.client.on_fetch_complete(FetchId(id), Ok(raw.as_bytes()));
    }

    pub fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}
