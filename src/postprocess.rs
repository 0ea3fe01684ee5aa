//! Optional per-message postprocessing.
//!
//! A postprocessor runs inside the worker that parsed the message, so its
//! cost is spread across threads; results travel with the message through
//! the ordered pipeline.

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::message::LogMessage;

/// Structured data attached to a message by a postprocessor.
pub type PostprocessResult = serde_json::Value;

/// Runs over each accepted message inside a worker.
pub trait MessagePostprocessor: Send {
    fn postprocess(&mut self, message: &LogMessage) -> Option<PostprocessResult>;
}

/// Creates one postprocessor per worker thread.
pub trait PostprocessorFactory: Send + Sync {
    fn create_postprocessor(&self) -> Box<dyn MessagePostprocessor>;
}

static LEVEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(TRACE|DEBUG|INFO|WARN|WARNING|ERROR|FATAL|CRITICAL)\b").unwrap()
});

/// Built-in postprocessor: extracts a timestamp and severity level from the
/// message text into an order-preserving JSON object.
#[derive(Debug, Clone, Default)]
pub struct FieldsPostprocessor;

impl FieldsPostprocessor {
    fn extract_timestamp(text: &str) -> Option<DateTime<Utc>> {
        let head = text.split_whitespace().next()?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(head) {
            return Some(ts.with_timezone(&Utc));
        }
        // "YYYY-MM-DD HH:MM:SS[.frac]" split across the first two tokens
        let mut tokens = text.split_whitespace();
        let date = tokens.next()?;
        let time = tokens.next()?;
        let joined = format!("{date} {time}");
        if let Ok(naive) = NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        None
    }
}

impl MessagePostprocessor for FieldsPostprocessor {
    fn postprocess(&mut self, message: &LogMessage) -> Option<PostprocessResult> {
        let mut fields: IndexMap<&str, serde_json::Value> = IndexMap::new();
        fields.insert("pos", json!(message.position));
        if let Some(ts) = Self::extract_timestamp(&message.text) {
            fields.insert("ts", json!(ts.to_rfc3339()));
        }
        if let Some(level) = LEVEL.find(&message.text) {
            let level = match level.as_str() {
                "WARNING" => "WARN",
                "CRITICAL" => "FATAL",
                other => other,
            };
            fields.insert("level", json!(level));
        }
        serde_json::to_value(fields).ok()
    }
}

impl PostprocessorFactory for FieldsPostprocessor {
    fn create_postprocessor(&self) -> Box<dyn MessagePostprocessor> {
        Box::new(self.clone())
    }
}
