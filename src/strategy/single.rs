//! Single-threaded baseline strategy.
//!
//! Shares the chunk generator and per-chunk processing with the
//! multi-threaded engine but runs them inline on the caller's thread, so
//! its output is the reference ordering the parallel strategy must match.

use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::media::LogMedia;
use crate::message::TextEncoding;
use crate::parallel::chunks::ChunkGenerator;
use crate::parallel::worker::{process_piece, ThreadLocalData, WorkerShared};
use crate::pool::{BufferPool, OutputPool};
use crate::postprocess::PostprocessorFactory;
use crate::splitter::SplitterFactory;

use super::{build_generator, CreateParams, ParsingStrategy, PoolStats, ReadResult};
use super::{StrategyConfig, StrategyState};

struct SingleSession {
    generator: Box<dyn ChunkGenerator>,
    tld: ThreadLocalData,
    shared: Arc<WorkerShared>,
    ready: VecDeque<ReadResult>,
}

pub struct SingleThreadedStrategy<M: LogMedia + 'static> {
    media: Arc<Mutex<M>>,
    splitters: Arc<dyn SplitterFactory>,
    postprocessors: Option<Arc<dyn PostprocessorFactory>>,
    config: StrategyConfig,
    encoding: TextEncoding,
    byte_pool: BufferPool,
    output_pool: OutputPool,
    state: StrategyState,
    params: Option<CreateParams>,
    session: Option<SingleSession>,
}

impl<M: LogMedia + 'static> SingleThreadedStrategy<M> {
    pub fn new(media: M, splitters: Arc<dyn SplitterFactory>) -> Self {
        let config = StrategyConfig::default().normalized();
        let byte_pool = BufferPool::new(config.bytes_to_parse_per_thread, config.max_pooled_buffers);
        let output_pool = OutputPool::new(config.max_pooled_buffers);
        Self {
            media: Arc::new(Mutex::new(media)),
            splitters,
            postprocessors: None,
            config,
            encoding: TextEncoding::default(),
            byte_pool,
            output_pool,
            state: StrategyState::NotStarted,
            params: None,
            session: None,
        }
    }

    pub fn with_config(mut self, config: StrategyConfig) -> Self {
        self.config = config.normalized();
        self.byte_pool = BufferPool::new(
            self.config.bytes_to_parse_per_thread,
            self.config.max_pooled_buffers,
        );
        self.output_pool = OutputPool::new(self.config.max_pooled_buffers);
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_postprocessor(mut self, factory: Arc<dyn PostprocessorFactory>) -> Self {
        self.postprocessors = Some(factory);
        self
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            outstanding_byte_buffers: self.byte_pool.outstanding(),
            pooled_byte_buffers: self.byte_pool.pooled(),
            outstanding_output_buffers: self.output_pool.outstanding(),
            pooled_output_buffers: self.output_pool.pooled(),
        }
    }

    fn start_session(&mut self) -> Result<()> {
        let params = match &self.params {
            Some(params) => params.clone(),
            None => bail!("not attached to a parser"),
        };
        let shared = Arc::new(WorkerShared {
            splitters: Arc::clone(&self.splitters),
            postprocessors: self.postprocessors.clone(),
            range: params.range.clone(),
            direction: params.direction,
            cancel: params.cancel.clone(),
        });
        let generator = build_generator(
            &self.media,
            &params,
            &self.config,
            self.encoding,
            &self.byte_pool,
            &self.output_pool,
        );
        let tld = ThreadLocalData::new(0, &shared);
        self.session = Some(SingleSession {
            generator,
            tld,
            shared,
            ready: VecDeque::new(),
        });
        Ok(())
    }
}

impl<M: LogMedia + 'static> ParsingStrategy for SingleThreadedStrategy<M> {
    fn parser_created(&mut self, params: CreateParams) -> Result<()> {
        match self.state {
            StrategyState::NotStarted | StrategyState::Destroyed => {}
            _ => bail!("parser already attached"),
        }
        params.validate()?;
        self.params = Some(params);
        self.state = StrategyState::Attached;
        Ok(())
    }

    fn read_next_and_postprocess(&mut self) -> Result<Option<ReadResult>> {
        match self.state {
            StrategyState::NotStarted => bail!("not attached to a parser"),
            StrategyState::Destroyed => bail!("parser already destroyed"),
            StrategyState::Attached => {
                self.start_session()?;
                self.state = StrategyState::Running;
            }
            StrategyState::Running => {}
            StrategyState::Exhausted => return Ok(None),
        }
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => bail!("not attached to a parser"),
        };
        loop {
            if let Some(item) = session.ready.pop_front() {
                return Ok(Some(item));
            }
            match session.generator.next_piece()? {
                Some(mut piece) => {
                    process_piece(&mut piece, &mut session.tld, &session.shared)?;
                    session.ready.extend(piece.output.drain(..));
                    // Dropping the piece returns its output buffer and
                    // releases its buffer references.
                }
                None => {
                    self.state = StrategyState::Exhausted;
                    self.session = None;
                    return Ok(None);
                }
            }
        }
    }

    fn parser_destroyed(&mut self) -> Result<()> {
        self.session = None;
        self.params = None;
        self.byte_pool.clear();
        self.output_pool.clear();
        self.state = StrategyState::Destroyed;
        Ok(())
    }
}
