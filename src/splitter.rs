//! Message splitting: turning one chunk's byte window into discrete
//! messages.
//!
//! A splitter session is bracketed by `begin_session`/`end_session` and is
//! invoked once per chunk per worker. The built-in splitter recognizes
//! message headers with a byte-oriented regex; chunk windows can split
//! UTF-8 sequences at their edges, so matching runs on bytes and message
//! text is recovered lossily.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::ops::Range;

use crate::message::{LogMessage, ReadDirection, TextWindow};

/// Splits a byte window into messages. Implementations hold per-session
/// state; one splitter instance is exclusively owned by one worker.
pub trait LogMediaSplitter: Send {
    /// Begin a splitting session over `window`. `start_position` is the
    /// chunk's scan origin: forward sessions emit messages whose header is
    /// at or after it, backward sessions emit messages strictly before it.
    fn begin_session(
        &mut self,
        window: TextWindow,
        range: Range<u64>,
        start_position: u64,
        direction: ReadDirection,
    ) -> Result<()>;

    /// The next message in session order, or `None` when the session is
    /// exhausted or only malformed trailing data remains.
    fn next_message(&mut self) -> Option<LogMessage>;

    /// End the session, handing the window buffer back for reuse.
    fn end_session(&mut self) -> Vec<u8>;
}

/// Creates one splitter per worker thread.
pub trait SplitterFactory: Send + Sync {
    fn create_splitter(&self) -> Box<dyn LogMediaSplitter>;
}

static LINE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^").unwrap());

/// A log format described by a message-header pattern. Doubles as the
/// splitter factory: each worker gets its own clone of the compiled regex.
#[derive(Debug, Clone)]
pub struct HeaderFormat {
    header: Regex,
}

impl HeaderFormat {
    pub fn new(pattern: &str) -> Result<Self> {
        let header = Regex::new(pattern)
            .with_context(|| format!("invalid message header pattern '{pattern}'"))?;
        Ok(Self { header })
    }

    /// The default format: every line starts a message.
    pub fn line_starts() -> Self {
        Self {
            header: LINE_START.clone(),
        }
    }
}

impl SplitterFactory for HeaderFormat {
    fn create_splitter(&self) -> Box<dyn LogMediaSplitter> {
        Box::new(RegexHeaderSplitter::new(self.header.clone()))
    }
}

struct SplitSession {
    window: TextWindow,
    range: Range<u64>,
    direction: ReadDirection,
    /// Absolute header positions found in the window, ascending.
    headers: Vec<u64>,
    /// Forward: next index to emit. Backward: one past the next index.
    idx: usize,
}

/// Splitter that recognizes message headers with a regex. The window start
/// is treated as a line start; headers before the session's scan origin are
/// skipped, which filters out the spurious match a window beginning
/// mid-message would otherwise produce.
pub struct RegexHeaderSplitter {
    header: Regex,
    session: Option<SplitSession>,
}

impl RegexHeaderSplitter {
    pub fn new(header: Regex) -> Self {
        Self {
            header,
            session: None,
        }
    }

    fn make_message(&self, session: &SplitSession, start: u64, end: u64) -> LogMessage {
        let rel = (start - session.window.base) as usize;
        let rel_end = (end - session.window.base) as usize;
        let text = String::from_utf8_lossy(&session.window.bytes[rel..rel_end])
            .trim_end_matches(['\n', '\r'])
            .to_string();
        LogMessage {
            position: start,
            end_position: end,
            text,
        }
    }
}

impl LogMediaSplitter for RegexHeaderSplitter {
    fn begin_session(
        &mut self,
        window: TextWindow,
        range: Range<u64>,
        start_position: u64,
        direction: ReadDirection,
    ) -> Result<()> {
        let window_end = window.end();
        let headers: Vec<u64> = self
            .header
            .find_iter(&window.bytes)
            .map(|m| window.base + m.start() as u64)
            .filter(|&pos| pos < window_end)
            .collect();
        let idx = headers.partition_point(|&h| h < start_position);
        self.session = Some(SplitSession {
            window,
            range,
            direction,
            headers,
            idx,
        });
        Ok(())
    }

    fn next_message(&mut self) -> Option<LogMessage> {
        let session = self.session.as_ref()?;
        let (start, next_idx) = match session.direction {
            ReadDirection::Forward => {
                if session.idx >= session.headers.len() {
                    return None;
                }
                (session.headers[session.idx], session.idx + 1)
            }
            ReadDirection::Backward => {
                if session.idx == 0 {
                    return None;
                }
                (session.headers[session.idx - 1], session.idx - 1)
            }
        };
        // The message runs to the following header, clipped to the session
        // range; an unterminated final message runs to the window end.
        let following = session.headers.partition_point(|&h| h <= start);
        let end = session
            .headers
            .get(following)
            .copied()
            .unwrap_or_else(|| session.window.end())
            .min(session.range.end)
            .max(start);
        let message = self.make_message(session, start, end);
        if let Some(session) = self.session.as_mut() {
            session.idx = next_idx;
        }
        Some(message)
    }

    fn end_session(&mut self) -> Vec<u8> {
        self.session
            .take()
            .map(|s| s.window.bytes)
            .unwrap_or_default()
    }
}
