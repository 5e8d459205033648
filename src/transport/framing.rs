use http::Method;

use crate::util::RequestWriter;

use super::TransportConfig;

/// Which header block a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderMode<'a> {
    /// Only the session-affinity token.
    Session(&'a str),
    /// The full block, with an access token if one is stored.
    Standard { access_token: Option<&'a str> },
}

/// Serialize one call as a contiguous HTTP/1.1 request.
///
/// ```text
/// POST /S4 HTTP/1.1\r\n
/// Connection: Keep-Alive\r\n
/// Content-Type: application/x-thrift\r\n
/// Host: rpc.example.test:443\r\n
/// User-Agent: ...\r\n
/// X-Line-Application: ...\r\n
/// X-Line-Access: ...\r\n
/// Content-Length: 4\r\n
/// \r\n
/// <body>
/// ```
pub(crate) fn write_request(
    config: &TransportConfig,
    method: &Method,
    path: &str,
    content_type: &str,
    body: &[u8],
    mode: HeaderMode<'_>,
) -> Vec<u8> {
    let mut w = RequestWriter::new(method, path);

    match mode {
        HeaderMode::Session(token) => {
            w.header("X-LS", token);
        }
        HeaderMode::Standard { access_token } => {
            w.header("Connection", "Keep-Alive");
            w.header("Content-Type", content_type);
            w.header("Host", format!("{}:{}", config.host, config.port));
            w.header("User-Agent", &config.user_agent);
            w.header("X-Line-Application", &config.application);

            if let Some(token) = access_token {
                w.header("X-Line-Access", token);
            }
        }
    }

    w.finish(body)
}
