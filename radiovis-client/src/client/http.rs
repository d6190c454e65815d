//! Minimal HTTP/1.1 request building and response framing.
//!
//! Responses are read until the server closes the connection; no
//! chunked or length-aware decoding is done.

use bytes::{Buf, Bytes, BytesMut};
use url::{Host, Url};

use radiovis_protocol::ProxySettings;

use crate::error::FetchError;

/// Default HTTP port; omitted from the Host header.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// End of the header block.
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Largest header block accepted before the blank line.
const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Where to connect and what to send for one GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    /// Host to open the TCP connection to (the proxy, when proxied).
    pub host: String,
    /// Port to open the TCP connection to.
    pub port: u16,
    /// Complete request text.
    pub request: String,
}

/// Build the GET for `url`.
///
/// Through a proxy the full URL is the request path and no Host header is
/// sent. Directly, the path is the absolute path plus query and the Host
/// header carries the port only when it is not 80.
pub fn build_request(
    url: &str,
    proxy: Option<&ProxySettings>,
    user_agent: &str,
) -> Result<RequestTarget, FetchError> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

    let (host, port, path, host_header) = match proxy {
        Some(proxy) => (proxy.host.clone(), proxy.port, url.to_string(), None),
        None => {
            if parsed.scheme() != "http" {
                return Err(FetchError::UnsupportedScheme(parsed.scheme().to_string()));
            }
            let host = match parsed.host() {
                Some(Host::Ipv6(addr)) => addr.to_string(),
                Some(host) => host.to_string(),
                None => return Err(FetchError::InvalidUrl(url.to_string())),
            };
            let port = parsed.port().unwrap_or(DEFAULT_HTTP_PORT);

            let mut path = parsed.path().to_string();
            if let Some(query) = parsed.query() {
                path.push('?');
                path.push_str(query);
            }

            let mut host_header = parsed.host_str().unwrap_or_default().to_string();
            if port != DEFAULT_HTTP_PORT {
                host_header.push_str(&format!(":{}", port));
            }

            (host, port, path, Some(host_header))
        }
    };

    let mut request = format!("GET {} HTTP/1.1\r\n", path);
    if let Some(host_header) = host_header {
        request.push_str(&format!("Host: {}\r\n", host_header));
    }
    request.push_str(&format!("User-Agent: {}\r\n", user_agent));
    request.push_str("Accept: */*\r\n");
    request.push_str("Connection: close\r\n");
    request.push_str("\r\n");

    Ok(RequestTarget {
        host,
        port,
        request,
    })
}

/// `CONNECT` request opening a tunnel to `host:port`.
pub fn connect_request(host: &str, port: u16, user_agent: &str) -> String {
    format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\nUser-Agent: {user_agent}\r\n\r\n"
    )
}

/// Framing state of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Looking for the blank line.
    AwaitingHeaders,
    /// Everything further is body.
    BufferingBody,
}

/// Splits a response into header and body across arbitrary read boundaries.
#[derive(Debug)]
pub struct ResponseFramer {
    state: FramerState,
    buf: BytesMut,
    header: Bytes,
    max_body_size: usize,
}

impl ResponseFramer {
    /// Create a framer that rejects bodies over `max_body_size` bytes.
    pub fn new(max_body_size: usize) -> Self {
        Self {
            state: FramerState::AwaitingHeaders,
            buf: BytesMut::with_capacity(4096),
            header: Bytes::new(),
            max_body_size,
        }
    }

    /// Current state.
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Feed bytes from one read.
    pub fn push(&mut self, data: &[u8]) -> Result<(), FetchError> {
        match self.state {
            FramerState::AwaitingHeaders => {
                // The marker may straddle the previous read.
                let search_from = self.buf.len().saturating_sub(HEADER_END.len() - 1);
                self.buf.extend_from_slice(data);

                let found = self.buf[search_from..]
                    .windows(HEADER_END.len())
                    .position(|w| w == HEADER_END);

                match found {
                    Some(pos) => {
                        let end = search_from + pos;
                        self.header = self.buf.split_to(end + 2).freeze();
                        self.buf.advance(2);
                        self.state = FramerState::BufferingBody;
                        self.check_body_size()
                    }
                    None if self.buf.len() > MAX_HEADER_SIZE => Err(FetchError::HeadersTooLarge),
                    None => Ok(()),
                }
            }
            FramerState::BufferingBody => {
                self.buf.extend_from_slice(data);
                self.check_body_size()
            }
        }
    }

    fn check_body_size(&self) -> Result<(), FetchError> {
        if self.buf.len() > self.max_body_size {
            Err(FetchError::BodyTooLarge(self.max_body_size))
        } else {
            Ok(())
        }
    }

    /// Header block including the status line, without the blank line.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Status code from the status line, once headers are complete.
    pub fn status_code(&self) -> Option<u16> {
        let line = self.header.split(|b| *b == b'\n').next()?;
        let line = std::str::from_utf8(line).ok()?;
        line.split_whitespace().nth(1)?.parse().ok()
    }

    /// Body bytes. Empty when the header block never completed.
    pub fn into_body(self) -> Bytes {
        match self.state {
            FramerState::BufferingBody => self.buf.freeze(),
            FramerState::AwaitingHeaders => Bytes::new(),
        }
    }

    /// Bytes buffered past the header so far.
    pub fn buffered(&self) -> &[u8] {
        match self.state {
            FramerState::BufferingBody => &self.buf,
            FramerState::AwaitingHeaders => &[],
        }
    }
}
