//! Slideshow image fetch engine.
//!
//! A single worker performs at most one HTTP GET at a time. Requests that
//! arrive while a fetch is in flight are coalesced according to
//! [`CoalescePolicy`]; with the default policy they are discarded, so a
//! burst of SHOW messages never opens more than one connection.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use radiovis_protocol::FetchRequest;

use super::http::{build_request, FramerState, ResponseFramer};
use super::{EventHandler, USER_AGENT};
use crate::error::FetchError;

/// Bytes read from the socket per call.
const READ_CHUNK: usize = 2048;

/// What happens to requests that arrive while a fetch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoalescePolicy {
    /// Discard them.
    #[default]
    DropWhileBusy,
    /// Keep only the newest and fetch it once the current fetch ends.
    KeepLatest,
}

/// Fetch engine configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Deadline for the TCP connect; `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Deadline for the whole exchange; `None` waits indefinitely.
    pub response_timeout: Option<Duration>,
    pub max_body_size: usize,
    pub policy: CoalescePolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            connect_timeout: Some(Duration::from_secs(10)),
            response_timeout: Some(Duration::from_secs(30)),
            max_body_size: 8 * 1024 * 1024,
            policy: CoalescePolicy::default(),
        }
    }
}

/// Progress of the in-flight fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Connecting,
    AwaitingHeaders,
    BufferingBody,
}

/// Outcome of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// Connection closed; `data` is the body, possibly empty.
    Completed { url: String, data: Bytes },
    /// The fetch failed before the connection closed cleanly.
    Failed { url: String, error: String },
    /// Coalesced away without being fetched.
    Discarded { url: String },
}

enum FetchCommand {
    Fetch(FetchRequest),
    Stop,
}

/// Background image fetcher.
pub struct FetchEngine {
    command_tx: mpsc::UnboundedSender<FetchCommand>,
    state: Arc<Mutex<FetchState>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FetchEngine {
    /// Spawn the worker thread.
    pub fn start(config: FetchConfig, handler: EventHandler<FetchEvent>) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(FetchState::Idle));

        let worker_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name("radiovis-fetch".to_string())
            .spawn(move || {
                runtime.block_on(fetch_loop(config, command_rx, handler, worker_state));
                debug!("Fetch worker exited");
            })?;

        Ok(Self {
            command_tx,
            state,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a fetch. Never blocks.
    pub fn request(&self, request: FetchRequest) {
        if let Err(mpsc::error::SendError(FetchCommand::Fetch(request))) =
            self.command_tx.send(FetchCommand::Fetch(request))
        {
            warn!("Fetch engine stopped, dropping {}", request.url);
        }
    }

    /// Current progress.
    pub fn state(&self) -> FetchState {
        *self.state.lock()
    }

    /// Abandon any in-flight fetch and wait for the worker to exit.
    pub fn stop(&self) {
        let _ = self.command_tx.send(FetchCommand::Stop);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("Fetch worker panicked");
            }
        }
    }
}

impl Drop for FetchEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn fetch_loop(
    config: FetchConfig,
    mut command_rx: mpsc::UnboundedReceiver<FetchCommand>,
    handler: EventHandler<FetchEvent>,
    state: Arc<Mutex<FetchState>>,
) {
    let mut pending: Option<FetchRequest> = None;

    loop {
        let request = match pending.take() {
            Some(request) => request,
            None => match command_rx.recv().await {
                Some(FetchCommand::Fetch(request)) => request,
                Some(FetchCommand::Stop) | None => break,
            },
        };

        info!("Requesting {}", request.url);
        let outcome = {
            let fetch = fetch_one(&request, &config, &state);
            tokio::pin!(fetch);

            loop {
                tokio::select! {
                    biased;

                    result = &mut fetch => break Some(result),

                    command = command_rx.recv() => match command {
                        Some(FetchCommand::Fetch(next)) => match config.policy {
                            CoalescePolicy::DropWhileBusy => {
                                info!("Busy, discarding {}", next.url);
                                handler(FetchEvent::Discarded { url: next.url });
                            }
                            CoalescePolicy::KeepLatest => {
                                if let Some(replaced) = pending.replace(next) {
                                    info!("Busy, discarding {}", replaced.url);
                                    handler(FetchEvent::Discarded { url: replaced.url });
                                }
                            }
                        },
                        Some(FetchCommand::Stop) | None => break None,
                    },
                }
            }
        };

        *state.lock() = FetchState::Idle;

        match outcome {
            Some(Ok(data)) => {
                info!("Fetched {} ({} bytes)", request.url, data.len());
                handler(FetchEvent::Completed {
                    url: request.url,
                    data,
                });
            }
            Some(Err(e)) => {
                warn!("Fetch of {} failed: {}", request.url, e);
                handler(FetchEvent::Failed {
                    url: request.url,
                    error: e.to_string(),
                });
            }
            None => {
                info!("Stopping with fetch of {} in flight", request.url);
                if let Some(queued) = pending.take() {
                    info!("Discarding queued {}", queued.url);
                    handler(FetchEvent::Discarded { url: queued.url });
                }
                break;
            }
        }
    }

    *state.lock() = FetchState::Idle;
}

async fn fetch_one(
    request: &FetchRequest,
    config: &FetchConfig,
    state: &Mutex<FetchState>,
) -> Result<Bytes, FetchError> {
    let target = build_request(&request.url, request.proxy.as_deref(), &config.user_agent)?;
    let addr = format!("{}:{}", target.host, target.port);

    let exchange = async {
        *state.lock() = FetchState::Connecting;
        debug!("Connecting to {}", addr);

        let connect = TcpStream::connect((target.host.as_str(), target.port));
        let connected = match config.connect_timeout {
            Some(limit) => timeout(limit, connect)
                .await
                .map_err(|_| FetchError::Timeout)?,
            None => connect.await,
        };
        let mut stream = connected.map_err(|e| FetchError::Connect {
            addr: addr.clone(),
            source: e,
        })?;

        stream.write_all(target.request.as_bytes()).await?;
        *state.lock() = FetchState::AwaitingHeaders;

        let mut framer = ResponseFramer::new(config.max_body_size);
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }

            let before = framer.state();
            framer.push(&chunk[..n])?;
            if before == FramerState::AwaitingHeaders
                && framer.state() == FramerState::BufferingBody
            {
                *state.lock() = FetchState::BufferingBody;
                match framer.status_code() {
                    Some(code) if (200..300).contains(&code) => debug!("HTTP {}", code),
                    Some(code) => warn!("HTTP {} for {}", code, request.url),
                    None => warn!("Malformed status line for {}", request.url),
                }
            }
        }

        if framer.state() == FramerState::AwaitingHeaders {
            warn!("Connection closed before end of headers for {}", request.url);
        }
        Ok::<_, FetchError>(framer.into_body())
    };

    match config.response_timeout {
        Some(limit) => timeout(limit, exchange)
            .await
            .map_err(|_| FetchError::Timeout)?,
        None => exchange.await,
    }
}
