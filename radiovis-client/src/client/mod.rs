//! Network clients: the STOMP session and the image fetch engine.
//!
//! Each client owns a dedicated thread running a current-thread tokio
//! runtime and reports back through an [`EventHandler`] callback invoked
//! on that thread.

use std::sync::Arc;

pub mod fetch;
pub mod http;
pub mod session;

pub use fetch::{CoalescePolicy, FetchConfig, FetchEngine, FetchEvent, FetchState};
pub use session::{SessionClient, SessionConfig, SessionState};

/// Callback receiving client events on the client's worker thread.
pub type EventHandler<E> = Arc<dyn Fn(E) + Send + Sync>;

/// User-Agent sent with HTTP requests.
pub const USER_AGENT: &str = concat!("RadioVISDemo/", env!("CARGO_PKG_VERSION"));
