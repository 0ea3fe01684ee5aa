//! Per-worker chunk processing.
//!
//! Each worker owns a [`ThreadLocalData`] for the session's lifetime: a
//! private splitter, an optional postprocessor, and a reusable window
//! buffer for the chunk's reassembled byte view. Workers pull pieces from
//! the work channel, process them independently, and push them to the
//! result channel; ordering is restored downstream.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use std::ops::Range;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::message::{ReadDirection, TextWindow};
use crate::postprocess::PostprocessorFactory;
use crate::splitter::SplitterFactory;

use super::chunks::PieceOfWork;

/// Session-wide parameters shared read-only by all workers.
pub(crate) struct WorkerShared {
    pub splitters: Arc<dyn SplitterFactory>,
    pub postprocessors: Option<Arc<dyn PostprocessorFactory>>,
    pub range: Range<u64>,
    pub direction: ReadDirection,
    pub cancel: CancelToken,
}

/// State created once per worker and dropped when the worker retires.
pub(crate) struct ThreadLocalData {
    pub id: usize,
    pub splitter: Box<dyn crate::splitter::LogMediaSplitter>,
    /// Reusable backing storage for the chunk's concatenated byte window.
    pub window: Vec<u8>,
    pub postprocessor: Option<Box<dyn crate::postprocess::MessagePostprocessor>>,
}

impl ThreadLocalData {
    pub(crate) fn new(id: usize, shared: &WorkerShared) -> Self {
        Self {
            id,
            splitter: shared.splitters.create_splitter(),
            window: Vec::new(),
            postprocessor: shared
                .postprocessors
                .as_ref()
                .map(|f| f.create_postprocessor()),
        }
    }
}

/// Reassembles one piece's logical byte window, runs the splitter over it,
/// and fills the piece's output buffer with messages bounded by its
/// hand-off position.
pub(crate) fn process_piece(
    piece: &mut PieceOfWork,
    tld: &mut ThreadLocalData,
    shared: &WorkerShared,
) -> Result<()> {
    let mut window = std::mem::take(&mut tld.window);
    window.clear();

    let mut base = piece.data.position();
    if let Some(prev) = &piece.prev {
        debug_assert_eq!(prev.end(), piece.data.position());
        base = prev.position();
        window.extend_from_slice(prev.bytes());
    }
    window.extend_from_slice(piece.data.bytes());
    if let Some(next) = &piece.next {
        debug_assert_eq!(piece.data.end(), next.position());
        window.extend_from_slice(next.bytes());
    }

    tld.splitter.begin_session(
        TextWindow::new(base, window),
        shared.range.clone(),
        piece.start_text_position,
        shared.direction,
    )?;
    loop {
        if shared.cancel.is_cancelled() {
            break;
        }
        // A `None` here is either exhaustion or malformed trailing data;
        // both truncate the chunk's production without raising.
        let Some(message) = tld.splitter.next_message() else {
            break;
        };
        let in_bounds = match shared.direction {
            ReadDirection::Forward => message.position < piece.stop_text_position,
            ReadDirection::Backward => message.position >= piece.stop_text_position,
        };
        if !in_bounds {
            // The message crosses the hand-off bound; the neighboring chunk
            // produces it instead.
            break;
        }
        let extra = tld
            .postprocessor
            .as_mut()
            .and_then(|p| p.postprocess(&message));
        piece.output.push((message, extra));
    }
    tld.window = tld.splitter.end_session();
    Ok(())
}

/// Worker thread body: creates its thread-local state, processes pieces
/// until the work channel closes, and retires.
pub(crate) fn worker_thread(
    worker_id: usize,
    work_receiver: Receiver<PieceOfWork>,
    result_sender: Sender<PieceOfWork>,
    shared: Arc<WorkerShared>,
) -> Result<()> {
    let mut tld = ThreadLocalData::new(worker_id, &shared);
    while let Ok(mut piece) = work_receiver.recv() {
        let piece_id = piece.id;
        if let Err(err) = process_piece(&mut piece, &mut tld, &shared) {
            // Stop the generator so the session winds down instead of
            // accumulating pieces the consumer can never order past.
            shared.cancel.cancel();
            return Err(err)
                .with_context(|| format!("worker {} failed on piece {}", tld.id, piece_id));
        }
        if result_sender.send(piece).is_err() {
            break;
        }
    }
    Ok(())
}
