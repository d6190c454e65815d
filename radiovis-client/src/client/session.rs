//! STOMP session with a RadioVIS broker.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use radiovis_protocol::{
    connect_frame, decode_frame, disconnect_frame, encode_frame, parse_message, send_frame,
    subscribe_frame, Command, Frame, ProxySettings, SessionEvent, DEFAULT_STOMP_PORT,
    LINK_HEADER, TRIGGER_TIME_HEADER,
};

use super::http::{connect_request, FramerState, ResponseFramer};
use super::{EventHandler, USER_AGENT};
use crate::error::SessionError;

/// Largest proxy reply accepted while opening a tunnel.
const MAX_TUNNEL_REPLY: usize = 64 * 1024;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Tunnel through this HTTP proxy with `CONNECT`.
    pub proxy: Option<Arc<ProxySettings>>,
    /// Subscribed after CONNECTED, when set.
    pub text_topic: Option<String>,
    /// Subscribed after CONNECTED, when set.
    pub image_topic: Option<String>,
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_STOMP_PORT,
            proxy: None,
            text_topic: None,
            image_topic: None,
            login: None,
            passcode: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

enum SessionCommand {
    Send(Frame),
    Disconnect,
}

/// One connection to a broker, run on its own thread.
///
/// Events arrive in wire order: for each inbound frame a
/// [`SessionEvent::RawFrame`] first, then any typed events derived from it.
/// [`SessionEvent::Disconnected`] is always the last event.
pub struct SessionClient {
    config: SessionConfig,
    state: Arc<Mutex<SessionState>>,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionClient {
    /// Start connecting in the background.
    pub fn start(config: SessionConfig, handler: EventHandler<SessionEvent>) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(SessionState::Connecting));

        let task_config = config.clone();
        let task_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name("radiovis-session".to_string())
            .spawn(move || {
                runtime.block_on(session_task(task_config, command_rx, handler, task_state));
            })?;

        Ok(Self {
            config,
            state,
            command_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Queue a raw frame. Returns false once the session has ended.
    pub fn send(&self, frame: Frame) -> bool {
        self.command_tx.send(SessionCommand::Send(frame)).is_ok()
    }

    /// Publish a TEXT message.
    pub fn send_text(&self, destination: &str, text: &str) -> bool {
        self.send(send_frame(destination, &[], format!("TEXT {}", text)))
    }

    /// Publish a SHOW message. `trigger_time` defaults to `NOW`.
    pub fn send_show(
        &self,
        destination: &str,
        image_url: &str,
        link: Option<&str>,
        trigger_time: Option<&str>,
    ) -> bool {
        let mut headers = vec![(TRIGGER_TIME_HEADER, trigger_time.unwrap_or("NOW"))];
        if let Some(link) = link {
            headers.push((LINK_HEADER, link));
        }
        self.send(send_frame(destination, &headers, format!("SHOW {}", image_url)))
    }

    /// Close the session and wait for its thread to exit.
    ///
    /// Must not be called from the session's own event handler.
    pub fn stop(&self) {
        let _ = self.command_tx.send(SessionCommand::Disconnect);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("Session worker panicked");
            }
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn session_task(
    config: SessionConfig,
    mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    handler: EventHandler<SessionEvent>,
    state: Arc<Mutex<SessionState>>,
) {
    info!("Connecting to {}:{}", config.host, config.port);

    match run_session(&config, &mut command_rx, &handler, &state).await {
        Ok(()) => info!("Session with {}:{} closed", config.host, config.port),
        Err(e) => warn!("Session with {}:{} ended: {}", config.host, config.port, e),
    }

    *state.lock() = SessionState::Disconnected;
    handler(SessionEvent::Disconnected);
}

async fn run_session(
    config: &SessionConfig,
    command_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
    handler: &EventHandler<SessionEvent>,
    state: &Mutex<SessionState>,
) -> Result<(), SessionError> {
    let (stream, leftover) = open_stream(config).await?;
    let (reader, writer) = stream.into_split();
    session_loop(config, command_rx, handler, state, reader, writer, leftover).await
}

/// Open the TCP stream, tunnelling through the proxy if configured.
///
/// Returns any bytes the proxy sent past its reply.
async fn open_stream(config: &SessionConfig) -> Result<(TcpStream, Bytes), SessionError> {
    let (host, port) = match &config.proxy {
        Some(proxy) => (proxy.host.as_str(), proxy.port),
        None => (config.host.as_str(), config.port),
    };
    let addr = format!("{}:{}", host, port);

    let mut stream = timeout(config.connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| SessionError::Timeout)?
        .map_err(|e| SessionError::Connect {
            addr: addr.clone(),
            source: e,
        })?;
    stream.set_nodelay(true)?;

    let leftover = match &config.proxy {
        Some(proxy) => {
            info!("Tunnelling through proxy {}", proxy);
            timeout(
                config.connect_timeout,
                open_tunnel(&mut stream, &config.host, config.port),
            )
            .await
            .map_err(|_| SessionError::Timeout)??
        }
        None => Bytes::new(),
    };

    debug!("Connected to {}", addr);
    Ok((stream, leftover))
}

/// Send `CONNECT host:port` and wait for a 2xx reply.
async fn open_tunnel<S>(stream: &mut S, host: &str, port: u16) -> Result<Bytes, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(connect_request(host, port, USER_AGENT).as_bytes())
        .await?;

    let mut framer = ResponseFramer::new(MAX_TUNNEL_REPLY);
    let mut chunk = [0u8; 1024];
    while framer.state() == FramerState::AwaitingHeaders {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(SessionError::Proxy(
                "connection closed during CONNECT".to_string(),
            ));
        }
        framer
            .push(&chunk[..n])
            .map_err(|e| SessionError::Proxy(e.to_string()))?;
    }

    match framer.status_code() {
        Some(code) if (200..300).contains(&code) => {
            Ok(Bytes::copy_from_slice(framer.buffered()))
        }
        Some(code) => Err(SessionError::Proxy(format!("CONNECT refused with {}", code))),
        None => Err(SessionError::Proxy("malformed CONNECT reply".to_string())),
    }
}

async fn session_loop<R, W>(
    config: &SessionConfig,
    command_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
    handler: &EventHandler<SessionEvent>,
    state: &Mutex<SessionState>,
    mut reader: R,
    mut writer: W,
    leftover: Bytes,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let connect = connect_frame(config.login.as_deref(), config.passcode.as_deref());
    writer.write_all(&encode_frame(&connect)).await?;

    let mut read_buf = BytesMut::with_capacity(8192);
    read_buf.extend_from_slice(&leftover);
    drain_frames(&mut read_buf, &mut writer, config, handler, state).await?;

    loop {
        tokio::select! {
            command = command_rx.recv() => match command {
                Some(SessionCommand::Send(frame)) => {
                    trace!("Sending {}", frame.command);
                    writer.write_all(&encode_frame(&frame)).await?;
                }
                Some(SessionCommand::Disconnect) | None => {
                    debug!("Disconnect requested");
                    let _ = writer.write_all(&encode_frame(&disconnect_frame())).await;
                    let _ = writer.shutdown().await;
                    return Ok(());
                }
            },

            result = reader.read_buf(&mut read_buf) => {
                if result? == 0 {
                    info!("Connection closed by server");
                    return Ok(());
                }
                drain_frames(&mut read_buf, &mut writer, config, handler, state).await?;
            }
        }
    }
}

/// Dispatch every complete frame in `read_buf`.
async fn drain_frames<W>(
    read_buf: &mut BytesMut,
    writer: &mut W,
    config: &SessionConfig,
    handler: &EventHandler<SessionEvent>,
    state: &Mutex<SessionState>,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = decode_frame(read_buf)? {
        trace!("Received {}", frame.command);
        handler(SessionEvent::RawFrame(frame.clone()));

        match frame.command {
            Command::Connected => {
                info!("STOMP session established");
                *state.lock() = SessionState::Connected;
                handler(SessionEvent::Connected);

                for topic in [&config.text_topic, &config.image_topic]
                    .into_iter()
                    .flatten()
                {
                    info!("Subscribing to {}", topic);
                    writer.write_all(&encode_frame(&subscribe_frame(topic))).await?;
                }
            }
            Command::Message => {
                for event in parse_message(&frame) {
                    handler(event);
                }
            }
            Command::Error => {
                warn!(
                    "Server error: {}",
                    frame.get_header("message").unwrap_or_default()
                );
            }
            other => debug!("Ignoring {} frame", other),
        }
    }

    Ok(())
}
