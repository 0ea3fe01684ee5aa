//! Parsing strategies: the public read/lifecycle contract shared by the
//! single-threaded baseline and the multi-threaded engine.

mod multi;
mod single;

pub use multi::MultiThreadedStrategy;
pub use single::SingleThreadedStrategy;

use anyhow::{ensure, Result};
use std::ops::Range;

use crate::cancel::CancelToken;
use crate::message::{LogMessage, ReadDirection};
use crate::postprocess::PostprocessResult;

/// One pulled result: the message and whatever the session's postprocessor
/// attached to it.
pub type ReadResult = (LogMessage, Option<PostprocessResult>);

/// Session parameters handed to [`ParsingStrategy::parser_created`].
#[derive(Debug, Clone)]
pub struct CreateParams {
    /// Logical `[begin, end)` byte range of the parse.
    pub range: Range<u64>,
    /// Where reading starts: scans upward from here going forward, downward
    /// going backward.
    pub start_position: u64,
    pub direction: ReadDirection,
    pub cancel: CancelToken,
}

impl CreateParams {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.range.start <= self.range.end,
            "invalid parse range {}..{}",
            self.range.start,
            self.range.end
        );
        ensure!(
            (self.range.start..=self.range.end).contains(&self.start_position),
            "start position {} outside parse range {}..{}",
            self.start_position,
            self.range.start,
            self.range.end
        );
        Ok(())
    }
}

/// The uniform parsing contract.
///
/// Lifecycle: `parser_created` attaches a session, the first
/// `read_next_and_postprocess` starts reading, `None` marks exhaustion (and
/// stays `None` on repeated calls), and `parser_destroyed` releases session
/// resources. A destroyed strategy accepts `parser_created` again and
/// starts a clean new session.
pub trait ParsingStrategy {
    /// One-time hook before reading starts.
    fn parser_created(&mut self, params: CreateParams) -> Result<()>;

    /// Pulls the next result in session order, or `None` at end of stream.
    /// Calling without an attached session is a usage error.
    fn read_next_and_postprocess(&mut self) -> Result<Option<ReadResult>>;

    /// Releases session resources. Both pools are cleared unconditionally,
    /// even when winding the pipeline down fails; such a failure is
    /// returned after cleanup.
    fn parser_destroyed(&mut self) -> Result<()>;
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StrategyState {
    NotStarted,
    Attached,
    Running,
    Exhausted,
    Destroyed,
}

/// Sizing knobs for chunking, worker count, and pooling.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// The media's minimum I/O granularity; chunk boundaries align to it.
    pub alignment_block_size: usize,
    /// Chunk size handed to each worker. Defaults to twice the alignment
    /// block and is never smaller than one block.
    pub bytes_to_parse_per_thread: usize,
    pub num_workers: usize,
    /// Buffers each pool retains for reuse.
    pub max_pooled_buffers: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            alignment_block_size: 32 * 1024,
            bytes_to_parse_per_thread: 64 * 1024,
            num_workers: num_cpus::get(),
            max_pooled_buffers: 16,
        }
    }
}

impl StrategyConfig {
    /// Clamps the configuration to its invariants: a positive block size,
    /// a chunk size that is a whole multiple of it, and at least one
    /// worker.
    pub(crate) fn normalized(&self) -> StrategyConfig {
        let block = self.alignment_block_size.max(1);
        let per_thread = self.bytes_to_parse_per_thread.max(block);
        let per_thread = per_thread.div_ceil(block) * block;
        StrategyConfig {
            alignment_block_size: block,
            bytes_to_parse_per_thread: per_thread,
            num_workers: self.num_workers.max(1),
            max_pooled_buffers: self.max_pooled_buffers.max(1),
        }
    }
}

/// Point-in-time pool usage, for leak checks and introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub outstanding_byte_buffers: usize,
    pub pooled_byte_buffers: usize,
    pub outstanding_output_buffers: usize,
    pub pooled_output_buffers: usize,
}

pub(crate) fn build_generator<M: crate::media::LogMedia + 'static>(
    media: &std::sync::Arc<std::sync::Mutex<M>>,
    params: &CreateParams,
    config: &StrategyConfig,
    encoding: crate::message::TextEncoding,
    byte_pool: &crate::pool::BufferPool,
    output_pool: &crate::pool::OutputPool,
) -> Box<dyn crate::parallel::chunks::ChunkGenerator> {
    use crate::parallel::chunks::{BackwardChunkGenerator, ForwardChunkGenerator};

    let chunk_size = config.bytes_to_parse_per_thread as u64;
    match params.direction {
        ReadDirection::Forward => Box::new(ForwardChunkGenerator::new(
            std::sync::Arc::clone(media),
            params.range.clone(),
            params.start_position,
            chunk_size,
            encoding,
            byte_pool.clone(),
            output_pool.clone(),
            params.cancel.clone(),
        )),
        ReadDirection::Backward => Box::new(BackwardChunkGenerator::new(
            std::sync::Arc::clone(media),
            params.range.clone(),
            params.start_position,
            chunk_size,
            encoding,
            byte_pool.clone(),
            output_pool.clone(),
            params.cancel.clone(),
        )),
    }
}
