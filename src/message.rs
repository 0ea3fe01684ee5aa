use serde::Serialize;

/// Direction a parsing session reads the media in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirection {
    /// From the start position onward.
    Forward,
    /// Tail-style, from the start position backward.
    Backward,
}

/// Text encoding of the log media. Chunk boundaries can split a multi-byte
/// character, so the chunk generator pads chunk windows with
/// `max_bytes_per_char() - 1` overlap bytes where needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    Ascii,
    #[default]
    Utf8,
    Utf16Le,
}

impl TextEncoding {
    pub fn max_bytes_per_char(self) -> usize {
        match self {
            TextEncoding::Ascii => 1,
            TextEncoding::Utf8 => 4,
            TextEncoding::Utf16Le => 2,
        }
    }

    /// Bytes of context needed before a chunk boundary to resolve a
    /// character that straddles it.
    pub fn overlap_bytes(self) -> usize {
        self.max_bytes_per_char() - 1
    }
}

/// One structured message extracted from the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogMessage {
    /// Absolute stream offset of the message header.
    pub position: u64,
    /// Absolute stream offset just past the message body.
    pub end_position: u64,
    /// Message text with the trailing line terminator stripped.
    pub text: String,
}

/// One chunk's reassembled logical byte window, carrying the absolute
/// stream offset of its first byte so positions inside the window map back
/// to stream positions without any padding prefix.
#[derive(Debug, Default)]
pub struct TextWindow {
    pub base: u64,
    pub bytes: Vec<u8>,
}

impl TextWindow {
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    /// Absolute stream offset just past the window.
    pub fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_bytes_per_encoding() {
        assert_eq!(TextEncoding::Ascii.overlap_bytes(), 0);
        assert_eq!(TextEncoding::Utf8.overlap_bytes(), 3);
        assert_eq!(TextEncoding::Utf16Le.overlap_bytes(), 1);
    }

    #[test]
    fn test_window_end() {
        let window = TextWindow::new(10, b"abc".to_vec());
        assert_eq!(window.end(), 13);
    }
}
