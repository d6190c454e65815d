//! Value types shared by the RadioVIS client components.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Default STOMP port for RadioVIS services.
pub const DEFAULT_STOMP_PORT: u16 = 61613;

/// Maximum STOMP frame size accepted from a server (1 MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// A RadioDNS application advertised through DNS SRV records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Display name, e.g. "RadioVIS".
    pub name: String,
    /// SRV query prefix, e.g. "_radiovis._tcp".
    pub record: String,
}

impl ServiceDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<String>, record: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record: record.into(),
        }
    }

    /// The RadioVIS service.
    pub fn radiovis() -> Self {
        Self::new("RadioVIS", "_radiovis._tcp")
    }
}

/// One resolved service location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Display name of the service this endpoint belongs to.
    pub name: String,
    /// The SRV query that produced this endpoint.
    pub query: String,
    /// Target host, without the trailing root label.
    pub target: String,
    /// TCP port.
    pub port: u16,
    /// SRV priority (lower is preferred).
    pub priority: u16,
    /// SRV weight among equal priorities.
    pub weight: u16,
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}:{} (priority {}, weight {})",
            self.name, self.target, self.port, self.priority, self.weight
        )
    }
}

/// Proxy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// HTTP proxy: absolute-URL requests, `CONNECT` tunnels for raw streams.
    #[default]
    Http,
}

/// Outbound proxy routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Proxy protocol.
    #[serde(default)]
    pub kind: ProxyKind,
    /// Proxy host.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

impl ProxySettings {
    /// Create HTTP proxy settings.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self {
            kind: ProxyKind::Http,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ProxySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A single image download, consumed once by the fetch engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute http URL.
    pub url: String,
    /// Proxy to route through, if any.
    pub proxy: Option<Arc<ProxySettings>>,
}

impl FetchRequest {
    /// Create a direct request.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            proxy: None,
        }
    }

    /// Route this request through a proxy.
    pub fn with_proxy(mut self, proxy: Option<Arc<ProxySettings>>) -> Self {
        self.proxy = proxy;
        self
    }
}

/// STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
    Connect,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }
}

impl TryFrom<&str> for Command {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, String> {
        match value {
            "CONNECT" => Ok(Command::Connect),
            "SEND" => Ok(Command::Send),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "DISCONNECT" => Ok(Command::Disconnect),
            "CONNECTED" => Ok(Command::Connected),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A STOMP frame. Header order is preserved as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header. STOMP 1.0 keeps the first occurrence.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Diagnostic rendering: the command, one `key: value` line per header,
    /// then the body if it is not empty.
    pub fn diagnostic_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.headers.len() + 2);
        lines.push(self.command.to_string());
        for (key, value) in &self.headers {
            lines.push(format!("{}: {}", key, value));
        }
        if !self.body.is_empty() {
            lines.push(self.body_text());
        }
        lines
    }
}

/// A RadioVIS SHOW message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Show {
    /// URL of the slide image.
    pub image_url: String,
    /// `link` header, if present.
    pub link_url: Option<String>,
    /// `trigger-time` header, if present, unparsed.
    pub trigger_time: Option<String>,
}

/// Events produced by a session client, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// STOMP session established.
    Connected,
    /// Connection closed, lost, or never established.
    Disconnected,
    /// Every inbound frame, before any typed event derived from it.
    RawFrame(Frame),
    /// A TEXT line.
    TextReceived(String),
    /// A SHOW line.
    ShowReceived(Show),
}
