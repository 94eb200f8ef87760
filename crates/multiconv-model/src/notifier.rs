//! Message-key based progress and error reporting.
//!
//! The codecs never format user-facing text. They emit a message key and its
//! parameters; the caller decides how to render or translate them.

use std::fmt::Display;
use std::sync::Mutex;

/// Message keys emitted by the readers and writers.
pub mod keys {
    pub const ANALYZING: &str = "detect.analyzing";
    pub const DETECTED: &str = "detect.detected";
    pub const FILE_FAILED: &str = "detect.file_failed";
    pub const SOURCE_SKIPPED_NO_ZONES: &str = "detect.source_without_zones";
    pub const SAMPLE_MISSING: &str = "detect.sample_missing";
    pub const ENCRYPTED: &str = "detect.encrypted";
    pub const UNSUPPORTED_VERSION: &str = "detect.unsupported_version";
    pub const UNUSED_OPCODES: &str = "detect.unused_opcodes";
    pub const PRESET_FAILED: &str = "detect.preset_failed";
    pub const CANCELLED: &str = "detect.cancelled";

    pub const CREATING: &str = "create.creating";
    pub const STEREO_SPLIT: &str = "create.stereo_split";
    pub const LAYER_LIMIT: &str = "create.layer_limit";
    pub const KEYGROUP_LIMIT: &str = "create.keygroup_limit";
    pub const LAYER_OVERLAP: &str = "create.layer_overlap";
    pub const LOOPS_TRUNCATED: &str = "create.loops_truncated";
    pub const SAMPLE_CONVERTED: &str = "create.sample_converted";
}

/// Receiver of progress and error messages.
pub trait Notifier: Send + Sync {
    /// Report progress or a warning.
    fn log(&self, key: &str, args: &[&dyn Display]);

    /// Report an error that caused something to be skipped.
    fn log_error(&self, key: &str, args: &[&dyn Display]);
}

fn render(key: &str, args: &[&dyn Display]) -> String {
    if args.is_empty() {
        key.to_string()
    } else {
        let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        format!("{} [{}]", key, rendered.join(", "))
    }
}

/// Forwards messages to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn log(&self, key: &str, args: &[&dyn Display]) {
        log::info!("{}", render(key, args));
    }

    fn log_error(&self, key: &str, args: &[&dyn Display]) {
        log::error!("{}", render(key, args));
    }
}

/// One recorded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub is_error: bool,
    pub key: String,
    pub args: Vec<String>,
}

/// Records every message, also forwarding it to the log.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<Message>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<Message> {
        self.messages().into_iter().filter(|m| m.is_error).collect()
    }

    /// True if a message with `key` was recorded.
    pub fn contains(&self, key: &str) -> bool {
        self.messages().iter().any(|m| m.key == key)
    }

    fn push(&self, is_error: bool, key: &str, args: &[&dyn Display]) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(Message {
                is_error,
                key: key.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            });
        }
    }
}

impl Notifier for CollectingNotifier {
    fn log(&self, key: &str, args: &[&dyn Display]) {
        LogNotifier.log(key, args);
        self.push(false, key, args);
    }

    fn log_error(&self, key: &str, args: &[&dyn Display]) {
        LogNotifier.log_error(key, args);
        self.push(true, key, args);
    }
}
