// Command-line interface definitions for the logsaw binary.

use clap::Parser;
use std::path::PathBuf;

use logsaw::TextEncoding;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default)]
pub enum EncodingArg {
    Ascii,
    #[default]
    Utf8,
    Utf16le,
}

impl From<EncodingArg> for TextEncoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Ascii => TextEncoding::Ascii,
            EncodingArg::Utf8 => TextEncoding::Utf8,
            EncodingArg::Utf16le => TextEncoding::Utf16Le,
        }
    }
}

/// Parse a log file in parallel while preserving message order.
#[derive(Parser, Debug)]
#[command(name = "logsaw", version, about)]
pub struct Cli {
    /// Log file to parse
    pub file: PathBuf,

    /// Read backward from the end (newest messages first)
    #[arg(long)]
    pub tail: bool,

    /// Worker threads; 1 selects the single-threaded strategy
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Regex matching the start of a message header (default: every line)
    #[arg(long, value_name = "PATTERN")]
    pub header_regex: Option<String>,

    /// Emit messages as JSON Lines with extracted fields
    #[arg(long)]
    pub jsonl: bool,

    /// Start byte offset of the parse range
    #[arg(long, value_name = "OFFSET")]
    pub from: Option<u64>,

    /// End byte offset of the parse range
    #[arg(long, value_name = "OFFSET")]
    pub to: Option<u64>,

    /// Chunk size per worker in bytes
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Text encoding of the log media
    #[arg(long, value_enum, default_value_t = EncodingArg::Utf8)]
    pub encoding: EncodingArg,
}
