//! RadioVIS TEXT and SHOW message parsing.

use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Command, Frame, SessionEvent, Show};

static TEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^TEXT\s+(.*)$").unwrap());
static SHOW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^SHOW\s+(.*)$").unwrap());

/// SHOW header carrying the slide's click-through URL.
pub const LINK_HEADER: &str = "link";

/// SHOW header carrying the display time.
pub const TRIGGER_TIME_HEADER: &str = "trigger-time";

/// Extract TEXT and SHOW events from a MESSAGE frame body.
///
/// Each line is trimmed; lines that are neither TEXT nor SHOW are ignored.
/// Non-MESSAGE frames yield nothing.
pub fn parse_message(frame: &Frame) -> Vec<SessionEvent> {
    if frame.command != Command::Message {
        return Vec::new();
    }

    let body = frame.body_text();
    let mut events = Vec::new();

    for line in body.split('\n') {
        let line = line.trim();

        if let Some(caps) = TEXT_RE.captures(line) {
            events.push(SessionEvent::TextReceived(caps[1].to_string()));
        } else if let Some(caps) = SHOW_RE.captures(line) {
            events.push(SessionEvent::ShowReceived(Show {
                image_url: caps[1].to_string(),
                link_url: frame.get_header(LINK_HEADER).map(str::to_string),
                trigger_time: frame.get_header(TRIGGER_TIME_HEADER).map(str::to_string),
            }));
        }
    }

    events
}

/// When a slide should be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTime {
    /// Immediately.
    Now,
    /// At the given instant.
    At(DateTime<FixedOffset>),
}

impl Show {
    /// Interpret the `trigger-time` header.
    ///
    /// A missing header means "now". Returns `None` when the header holds
    /// neither `NOW` nor an RFC 3339 timestamp.
    pub fn trigger(&self) -> Option<TriggerTime> {
        match self.trigger_time.as_deref().map(str::trim) {
            None => Some(TriggerTime::Now),
            Some(value) if value.eq_ignore_ascii_case("NOW") => Some(TriggerTime::Now),
            Some(value) => DateTime::parse_from_rfc3339(value).ok().map(TriggerTime::At),
        }
    }
}
