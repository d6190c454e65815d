//! Observers printing session events and saving slides.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;

use bytes::Bytes;
use log::{error, info, warn};
use parking_lot::Mutex;

use radiovis_client::{FetchEvent, Observer};
use radiovis_protocol::{SessionEvent, TriggerTime};

/// Prints events to stdout and writes fetched images to a directory.
pub struct ConsoleObserver {
    output_dir: Option<PathBuf>,
    show_frames: bool,
    saved: AtomicU64,
}

impl ConsoleObserver {
    pub fn new(output_dir: Option<PathBuf>, show_frames: bool) -> Self {
        Self {
            output_dir,
            show_frames,
            saved: AtomicU64::new(0),
        }
    }
}

impl Observer for ConsoleObserver {
    fn on_session_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Connected => println!("* connected"),
            SessionEvent::Disconnected => println!("* disconnected"),
            SessionEvent::RawFrame(frame) => {
                if self.show_frames {
                    for line in frame.diagnostic_lines() {
                        println!("  | {}", line);
                    }
                }
            }
            SessionEvent::TextReceived(text) => println!("TEXT {}", text),
            SessionEvent::ShowReceived(show) => {
                let when = match show.trigger() {
                    Some(TriggerTime::Now) => "now".to_string(),
                    Some(TriggerTime::At(at)) => at.to_rfc3339(),
                    None => format!("unparsable {:?}", show.trigger_time),
                };
                match &show.link_url {
                    Some(link) => println!("SHOW {} at {} (link {})", show.image_url, when, link),
                    None => println!("SHOW {} at {}", show.image_url, when),
                }
            }
        }
    }

    fn on_image(&self, url: &str, data: &Bytes) {
        println!("IMAGE {} ({} bytes)", url, data.len());

        let Some(dir) = &self.output_dir else {
            return;
        };
        let sequence = self.saved.fetch_add(1, Ordering::Relaxed) + 1;
        let path = dir.join(image_file_name(url, sequence));
        match fs::write(&path, data) {
            Ok(()) => info!("Saved {}", path.display()),
            Err(e) => error!("Failed to save {}: {}", path.display(), e),
        }
    }

    fn on_fetch_event(&self, event: &FetchEvent) {
        if let FetchEvent::Failed { url, error } = event {
            warn!("Could not fetch {}: {}", url, error);
        }
    }
}

/// Session milestones and interrupts, for the main thread to wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Connected,
    Disconnected,
    Interrupted,
}

/// Forwards connect/disconnect into a channel.
pub struct StatusObserver(Mutex<mpsc::Sender<Status>>);

impl StatusObserver {
    pub fn new(tx: mpsc::Sender<Status>) -> Self {
        Self(Mutex::new(tx))
    }
}

impl Observer for StatusObserver {
    fn on_session_event(&self, event: &SessionEvent) {
        let status = match event {
            SessionEvent::Connected => Status::Connected,
            SessionEvent::Disconnected => Status::Disconnected,
            _ => return,
        };
        let _ = self.0.lock().send(status);
    }
}

/// `NNNN-<last path segment>`, restricted to a safe character set.
pub fn image_file_name(url: &str, sequence: u64) -> String {
    let path = url.split(&['?', '#'][..]).next().unwrap_or_default();
    let last = path
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("image");

    let clean: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{:04}-{}", sequence, clean)
}
