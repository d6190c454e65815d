//! RadioVIS session client.
//!
//! Resolves a station's RadioDNS services, keeps one STOMP session to a
//! RadioVIS broker and downloads the slideshow images it announces.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use radiovis_client::{config, Coordinator, Observer};
//! use radiovis_protocol::{SessionEvent, StationIdentity};
//!
//! struct Print;
//!
//! impl Observer for Print {
//!     fn on_session_event(&self, event: &SessionEvent) {
//!         println!("{:?}", event);
//!     }
//! }
//!
//! let coordinator = Coordinator::new(config::load_from_env()).unwrap();
//! coordinator.add_observer(Arc::new(Print));
//!
//! let station = StationIdentity::drm("DRM Station", "abcdef").unwrap();
//! if let (Some(_), endpoints) = coordinator.resolve(&station) {
//!     if let Some(endpoint) = endpoints.first() {
//!         coordinator.connect(endpoint, &station, false).unwrap();
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use client::{
    CoalescePolicy, EventHandler, FetchConfig, FetchEngine, FetchEvent, FetchState,
    SessionClient, SessionConfig, SessionState,
};
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, Observer, ObserverId};
pub use error::{FetchError, SessionError};
pub use resolver::{DnsBackend, HickoryBackend, LocalAliases, NameResolver, SrvRecord};
