//! logsaw: a parallel, direction-aware log-stream parsing engine.
//!
//! Converts a raw byte-oriented log media stream into an ordered sequence
//! of structured log messages. Large files are split into aligned,
//! overlap-padded chunks processed by multiple worker threads; results are
//! delivered to the consumer in strict document order, forward (from a
//! start position onward) or backward (tail-style, from an end position
//! backward).

mod cancel;
mod media;
mod message;
mod parallel;
mod pool;
mod postprocess;
mod splitter;
mod strategy;

pub use cancel::CancelToken;
pub use media::{FileMedia, LogMedia, MemoryMedia};
pub use message::{LogMessage, ReadDirection, TextEncoding, TextWindow};
pub use pool::{BufferPool, OutputItem, OutputPool, PooledBuf, PooledOutput};
pub use postprocess::{
    FieldsPostprocessor, MessagePostprocessor, PostprocessResult, PostprocessorFactory,
};
pub use splitter::{HeaderFormat, LogMediaSplitter, RegexHeaderSplitter, SplitterFactory};
pub use strategy::{
    CreateParams, MultiThreadedStrategy, ParsingStrategy, PoolStats, ReadResult,
    SingleThreadedStrategy, StrategyConfig,
};
