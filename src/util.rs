use std::io::Write;

use http::Method;

/// Builds a raw HTTP/1.1 request: request line, headers, blank line, body.
pub(crate) struct RequestWriter {
    buf: Vec<u8>,
}

impl RequestWriter {
    pub fn new(method: &Method, path: &str) -> Self {
        let mut buf = Vec::with_capacity(256);
        // Writing to a Vec does not fail.
        let _ = write!(buf, "{} {} HTTP/1.1\r\n", method, path);
        RequestWriter { buf }
    }

    pub fn header(&mut self, name: &str, value: impl AsRef<[u8]>) {
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.extend_from_slice(b": ");
        self.buf.extend_from_slice(value.as_ref());
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Terminate the head and append the body.
    ///
    /// `Content-Length` is emitted iff the body is non-empty.
    pub fn finish(mut self, body: &[u8]) -> Vec<u8> {
        if !body.is_empty() {
            let _ = write!(self.buf, "Content-Length: {}\r\n", body.len());
        }
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(body);
        self.buf
    }
}

/// Credentials embedded in a URL authority, `user:pass@host`.
#[cfg(feature = "client")]
pub(crate) trait AuthorityExt {
    fn userinfo(&self) -> Option<&str>;
    fn username(&self) -> Option<&str>;
    fn password(&self) -> Option<&str>;
}

#[cfg(feature = "client")]
impl AuthorityExt for http::uri::Authority {
    fn userinfo(&self) -> Option<&str> {
        self.as_str().rsplit_once('@').map(|(u, _)| u)
    }

    fn username(&self) -> Option<&str> {
        self.userinfo()
            .map(|u| u.split_once(':').map_or(u, |(name, _)| name))
    }

    fn password(&self) -> Option<&str> {
        self.userinfo()
            .and_then(|u| u.split_once(':'))
            .map(|(_, pass)| pass)
    }
}

pub(crate) fn log_data(data: &[u8]) {
    if !log_enabled!(log::Level::Trace) {
        return;
    }

    for line in data.split(|c| *c == b'\n') {
        let line = String::from_utf8_lossy(line);
        trace!("{}", line.trim_end_matches('\r'));
    }
}
