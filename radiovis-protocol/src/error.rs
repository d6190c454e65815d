//! Error types for station identity validation, DNS resolution and the
//! STOMP wire protocol.

use thiserror::Error;

/// Station identifier validation errors.
///
/// Raised only while constructing a [`StationIdentity`](crate::StationIdentity);
/// a constructed identity never fails afterwards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field does not match its fixed hexadecimal or numeric format.
    #[error("Invalid {0}")]
    InvalidField(&'static str),

    /// A required field (or one of a required alternative) is absent.
    #[error("Missing {0}")]
    MissingField(&'static str),

    /// Two field groups that cannot be combined were both supplied.
    #[error("{0} and {1} are mutually exclusive")]
    MutuallyExclusive(&'static str, &'static str),

    /// Only one half of a paired field group was supplied.
    #[error("Both {0} and {1} must be specified")]
    IncompletePair(&'static str, &'static str),
}

/// Reasons a DNS query produced no usable answer.
///
/// These are routine: a station may simply not publish a service. Callers
/// of the name resolver only ever see an empty result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionFailure {
    /// The name exists but has no records of the requested type.
    #[error("No answer")]
    NoAnswer,

    /// The name does not exist.
    #[error("Non-existent domain")]
    NxDomain,

    /// Network or protocol level failure.
    #[error("DNS error: {0}")]
    Other(String),
}

/// STOMP framing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Command line is not a known STOMP verb.
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    /// A header line has no ':' separator.
    #[error("Malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Frame exceeds the maximum accepted size.
    #[error("Frame too large: {0} bytes (max: {1})")]
    FrameTooLarge(usize, usize),

    /// `content-length` header is not a number.
    #[error("Invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// Body declared by `content-length` is not NUL terminated.
    #[error("Missing frame terminator")]
    MissingTerminator,

    /// Command or headers are not valid UTF-8.
    #[error("Failed to decode frame: {0}")]
    DecodeError(String),
}
