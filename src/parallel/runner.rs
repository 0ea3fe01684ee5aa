//! The driving pipeline: a generator thread feeding worker threads over
//! bounded channels, with in-order hand-off to the single consumer.
//!
//! Pieces are processed concurrently and may finish out of order; the
//! consumer-side poll re-orders them by id so delivery follows generation
//! order. Bounded channels bound the number of in-flight pieces and
//! therefore the pools' outstanding buffers.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::cancel::CancelToken;

use super::chunks::{ChunkGenerator, PieceOfWork};
use super::worker::{worker_thread, WorkerShared};

fn generator_thread(
    mut generator: Box<dyn ChunkGenerator>,
    work_sender: Sender<PieceOfWork>,
    cancel: CancelToken,
) -> Result<()> {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match generator.next_piece()? {
            Some(piece) => {
                if work_sender.send(piece).is_err() {
                    break;
                }
            }
            None => break,
        }
    }
    Ok(())
}

/// Owns the session's threads and restores generation order on the consumer
/// side.
pub(crate) struct PipelineRunner {
    result_receiver: Option<Receiver<PieceOfWork>>,
    pending: HashMap<u64, PieceOfWork>,
    next_expected_id: u64,
    cancel: CancelToken,
    generator_handle: Option<JoinHandle<Result<()>>>,
    worker_handles: Vec<JoinHandle<Result<()>>>,
}

impl PipelineRunner {
    pub(crate) fn spawn(
        generator: Box<dyn ChunkGenerator>,
        shared: Arc<WorkerShared>,
        num_workers: usize,
    ) -> Self {
        let num_workers = num_workers.max(1);
        let (work_sender, work_receiver) = bounded(num_workers * 2);
        let (result_sender, result_receiver) = bounded(num_workers * 4);
        let cancel = shared.cancel.clone();

        let generator_handle = {
            let cancel = cancel.clone();
            thread::spawn(move || generator_thread(generator, work_sender, cancel))
        };

        let mut worker_handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let work_receiver = work_receiver.clone();
            let result_sender = result_sender.clone();
            let shared = Arc::clone(&shared);
            worker_handles.push(thread::spawn(move || {
                worker_thread(worker_id, work_receiver, result_sender, shared)
            }));
        }
        // The threads hold the only remaining senders/receivers; channels
        // close as they retire.
        drop(result_sender);
        drop(work_receiver);

        Self {
            result_receiver: Some(result_receiver),
            pending: HashMap::new(),
            next_expected_id: 0,
            cancel,
            generator_handle: Some(generator_handle),
            worker_handles,
        }
    }

    /// The next finished piece in generation order, or `None` once the
    /// pipeline is exhausted. Errors raised on the generator or worker
    /// threads surface here after the channels close.
    pub(crate) fn read_and_process_next_piece(&mut self) -> Result<Option<PieceOfWork>> {
        if let Some(piece) = self.pending.remove(&self.next_expected_id) {
            self.next_expected_id += 1;
            return Ok(Some(piece));
        }
        let Some(receiver) = self.result_receiver.as_ref() else {
            return Ok(None);
        };
        while let Ok(piece) = receiver.recv() {
            if piece.id == self.next_expected_id {
                self.next_expected_id += 1;
                return Ok(Some(piece));
            }
            self.pending.insert(piece.id, piece);
        }
        // Channel closed. A gap in `pending` can only remain after an error
        // or cancellation; drop the stragglers and surface thread failures.
        self.result_receiver = None;
        self.pending.clear();
        self.join_threads()?;
        Ok(None)
    }

    /// Winds the session down: signals cancellation, releases undelivered
    /// pieces, and joins the threads. Thread failures are tolerated in the
    /// sense that every thread is still joined; the first failure is
    /// returned once teardown is complete.
    pub(crate) fn shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();
        self.pending.clear();
        // Dropping the receiver unblocks workers mid-send; the generator
        // then fails its own send and stops.
        self.result_receiver = None;
        self.join_threads()
    }

    fn join_threads(&mut self) -> Result<()> {
        let mut first_err: Option<anyhow::Error> = None;
        if let Some(handle) = self.generator_handle.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                Err(_) => {
                    first_err.get_or_insert(anyhow!("chunk generator thread panicked"));
                }
            }
        }
        for (idx, handle) in self.worker_handles.drain(..).enumerate() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                Err(_) => {
                    first_err.get_or_insert(anyhow!("worker thread {idx} panicked"));
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for PipelineRunner {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MemoryMedia;
    use crate::message::{ReadDirection, TextEncoding};
    use crate::parallel::chunks::ForwardChunkGenerator;
    use crate::pool::{BufferPool, OutputPool};
    use crate::splitter::HeaderFormat;
    use std::sync::Mutex;

    fn spawn_runner(data: &[u8], chunk_size: u64, workers: usize) -> (PipelineRunner, BufferPool) {
        let len = data.len() as u64;
        let media = Arc::new(Mutex::new(MemoryMedia::new(data.to_vec())));
        let byte_pool = BufferPool::new(chunk_size as usize, 16);
        let cancel = CancelToken::new();
        let generator = Box::new(ForwardChunkGenerator::new(
            media,
            0..len,
            0,
            chunk_size,
            TextEncoding::Ascii,
            byte_pool.clone(),
            OutputPool::new(16),
            cancel.clone(),
        ));
        let shared = Arc::new(WorkerShared {
            splitters: Arc::new(HeaderFormat::line_starts()),
            postprocessors: None,
            range: 0..len,
            direction: ReadDirection::Forward,
            cancel,
        });
        (PipelineRunner::spawn(generator, shared, workers), byte_pool)
    }

    #[test]
    fn test_pieces_delivered_in_generation_order() {
        let data: Vec<u8> = b"a0\nb1\nc2\nd3\ne4\nf5\ng6\nh7\n".to_vec();
        let (mut runner, _pool) = spawn_runner(&data, 4, 4);
        let mut ids = Vec::new();
        while let Some(piece) = runner.read_and_process_next_piece().unwrap() {
            ids.push(piece.id);
        }
        assert_eq!(ids, (0..6).collect::<Vec<u64>>());
    }

    #[test]
    fn test_shutdown_mid_stream_releases_buffers() {
        let data: Vec<u8> = std::iter::repeat(b"x\n".as_slice())
            .take(64)
            .flatten()
            .copied()
            .collect();
        let (mut runner, pool) = spawn_runner(&data, 4, 2);
        let first = runner.read_and_process_next_piece().unwrap().unwrap();
        drop(first);
        runner.shutdown().unwrap();
        assert_eq!(pool.outstanding(), 0);
    }
}
