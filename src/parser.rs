use std::str;

use http::{header, StatusCode};

use crate::util::log_data;
use crate::Error;

/// Max number of headers to parse from an HTTP response
pub const MAX_RESPONSE_HEADERS: usize = 128;

/// Session-affinity header, set by the server and echoed back in session mode.
pub(crate) const X_LS: &str = "x-ls";

/// The parts of a response head the transport acts upon.
///
/// All other headers are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status code from the status line.
    pub status: StatusCode,
    /// Declared `Content-Length`, 0 when absent.
    pub content_length: usize,
    /// Value of `X-LS`, if any.
    pub session_token: Option<String>,
    /// Whether the server sent `Connection: keep-alive`.
    pub keep_alive: bool,
}

/// Try parsing a response head from the start of `input`.
///
/// Returns `Ok(None)` until the header terminator has arrived. The input can
/// be cut anywhere, also in the middle of a header name or value. On success
/// the `usize` is how much of `input` the head occupied, i.e. where the body
/// starts.
pub fn try_parse_response_head(
    input: &[u8],
) -> Result<Option<(usize, ResponseHead)>, Error> {
    // ~3k for 100 headers
    let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
    let mut res = httparse::Response::new(&mut headers);

    let input_used = match res.parse(input)? {
        httparse::Status::Complete(v) => v,
        httparse::Status::Partial => return Ok(None),
    };

    log_data(&input[..input_used]);

    let code = res.code.unwrap_or_default();
    let status = StatusCode::from_u16(code)
        .map_err(|_| Error::HttpParseFail(format!("bad status code: {}", code)))?;

    let mut head = ResponseHead {
        status,
        content_length: 0,
        session_token: None,
        keep_alive: false,
    };

    for h in res.headers.iter() {
        if h.name.eq_ignore_ascii_case(header::CONTENT_LENGTH.as_str()) {
            head.content_length = str::from_utf8(h.value)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .ok_or(Error::BadContentLengthHeader)?;
        } else if h.name.eq_ignore_ascii_case(X_LS) {
            let token = str::from_utf8(h.value)
                .map_err(|_| Error::BadHeader(format!("{} is not a string", h.name)))?;
            head.session_token = Some(token.trim().to_string());
        } else if h.name.eq_ignore_ascii_case(header::CONNECTION.as_str()) {
            head.keep_alive = h.value.eq_ignore_ascii_case(b"keep-alive");
        }
    }

    Ok(Some((input_used, head)))
}

/// Split a complete raw response into status and body.
///
/// Used for one-shot fetches where the whole response is available at once.
/// The body is everything after the head, regardless of `Content-Length`.
pub(crate) fn split_response(raw: &[u8]) -> Result<(StatusCode, &[u8]), Error> {
    match try_parse_response_head(raw)? {
        Some((input_used, head)) => Ok((head.status, &raw[input_used..])),
        None => Err(Error::HttpParseFail("incomplete response head".into())),
    }
}
