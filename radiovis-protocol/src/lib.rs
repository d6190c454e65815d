//! Protocol definitions for the RadioVIS session client.
//!
//! This crate has no I/O. It provides:
//!
//! - [`StationIdentity`]: validated broadcast identifiers and the RadioDNS
//!   hostname / RadioVIS topic derived from them
//! - [`codec`]: STOMP 1.0 frame encoding and incremental decoding
//! - [`message`]: TEXT / SHOW extraction from MESSAGE frames
//! - shared value types ([`ServiceEndpoint`], [`ProxySettings`],
//!   [`FetchRequest`], [`SessionEvent`]) and the error taxonomy
//!
//! # Example
//!
//! ```rust
//! use radiovis_protocol::{DabFields, StationIdentity, TopicKind};
//!
//! let station = StationIdentity::dab(
//!     "BBC Radio 1",
//!     DabFields { ecc: "ce1", eid: "ce15", sid: "c221", scids: "0", ..Default::default() },
//! )
//! .unwrap();
//!
//! assert_eq!(station.hostname(), "0.c221.ce15.ce1.dab.radiodns.org");
//! assert_eq!(station.topic(TopicKind::Text), "/topic/dab/ce1/ce15/c221/0/text");
//! ```
//!
//! ```rust
//! use bytes::BytesMut;
//! use radiovis_protocol::{decode_frame, parse_message, SessionEvent};
//!
//! let mut buf = BytesMut::from(&b"MESSAGE\ndestination:/topic/drm/abcdef/text\n\nTEXT Hello\0"[..]);
//! let frame = decode_frame(&mut buf).unwrap().unwrap();
//! assert_eq!(parse_message(&frame), vec![SessionEvent::TextReceived("Hello".to_string())]);
//! ```

pub mod codec;
pub mod error;
pub mod message;
pub mod station;
pub mod types;

pub use codec::{
    connect_frame, decode_frame, disconnect_frame, encode_frame, send_frame, subscribe_frame,
};
pub use error::{ProtocolError, ResolutionFailure, ValidationError};
pub use message::{parse_message, TriggerTime, LINK_HEADER, TRIGGER_TIME_HEADER};
pub use station::{
    BroadcastParams, BroadcastSystem, DabFields, FmFields, StationIdentity, TopicKind,
    DEFAULT_DOMAIN,
};
pub use types::{
    Command, FetchRequest, Frame, ProxyKind, ProxySettings, ServiceDescriptor, ServiceEndpoint,
    SessionEvent, Show, DEFAULT_STOMP_PORT, MAX_FRAME_SIZE,
};
