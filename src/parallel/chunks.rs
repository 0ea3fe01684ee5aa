//! Chunk generation: turning the media stream into aligned, overlap-padded
//! pieces of work.
//!
//! Chunk boundaries lie on an absolute grid of `chunk_size` bytes (itself a
//! multiple of the media's alignment block). Messages never align to chunk
//! boundaries, so adjacent pieces share buffers: a piece's `prev`/`next`
//! hold the neighboring chunk's own buffer, and the buffer returns to its
//! pool when the last holder drops. Generators are one step behind: a piece
//! is yielded only after its trailing neighbor's bytes have been read.

use anyhow::Result;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cancel::CancelToken;
use crate::media::LogMedia;
use crate::message::TextEncoding;
use crate::pool::{BufferPool, OutputPool, PooledBuf, PooledOutput};

/// Raw bytes read from one stream location. Cloning shares the underlying
/// pooled buffer.
#[derive(Clone)]
pub(crate) struct StreamData {
    position: u64,
    buf: Arc<PooledBuf>,
    len: usize,
}

impl StreamData {
    pub(crate) fn new(position: u64, buf: PooledBuf, len: usize) -> Self {
        debug_assert!(len <= buf.len());
        Self {
            position,
            buf: Arc::new(buf),
            len,
        }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Absolute stream offset just past the valid bytes.
    pub(crate) fn end(&self) -> u64 {
        self.position + self.len as u64
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    #[cfg(test)]
    pub(crate) fn shares_buffer_with(&self, other: &StreamData) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf)
    }
}

/// One aligned byte-range unit of work. Created by a generator, filled by a
/// worker, consumed and released by the strategy's enumerator.
pub(crate) struct PieceOfWork {
    pub id: u64,
    /// The lower neighbor's bytes (or the leading overlap read), if any.
    pub prev: Option<StreamData>,
    /// This chunk's own bytes.
    pub data: StreamData,
    /// The upper neighbor's bytes, if any.
    pub next: Option<StreamData>,
    /// Scan origin: lower bound going forward, upper bound going backward.
    pub start_text_position: u64,
    /// Hand-off bound: messages crossing it belong to the neighboring chunk.
    pub stop_text_position: u64,
    pub output: PooledOutput,
}

/// Lazily produces pieces in strict logical order.
pub(crate) trait ChunkGenerator: Send {
    fn next_piece(&mut self) -> Result<Option<PieceOfWork>>;
}

fn lock_media<M: LogMedia>(media: &Arc<Mutex<M>>) -> MutexGuard<'_, M> {
    match media.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Reads up to `max_len` bytes at `position` into a pooled buffer. Returns
/// `None` on a zero-byte read; the borrowed buffer goes back to the pool
/// unused.
fn read_stream_data<M: LogMedia>(
    media: &Arc<Mutex<M>>,
    pool: &BufferPool,
    position: u64,
    max_len: usize,
) -> Result<Option<StreamData>> {
    let mut buf = pool.borrow();
    let want = max_len.min(buf.len());
    let n = lock_media(media).read_at(position, &mut buf[..want])?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(StreamData::new(position, buf, n)))
}

/// Reads the `max_bytes_per_char - 1` bytes just before `position` so the
/// splitter can resolve a character straddling the first chunk boundary.
fn read_leading_overlap<M: LogMedia>(
    media: &Arc<Mutex<M>>,
    pool: &BufferPool,
    position: u64,
    encoding: TextEncoding,
) -> Result<Option<StreamData>> {
    // Buffers sized below the overlap width would otherwise shift the read
    // away from `position` and leave a gap before the chunk.
    let overlap = (encoding.overlap_bytes() as u64)
        .min(position)
        .min(pool.buf_size() as u64);
    if overlap == 0 {
        return Ok(None);
    }
    read_stream_data(media, pool, position - overlap, overlap as usize)
}

pub(crate) struct ForwardChunkGenerator<M: LogMedia> {
    media: Arc<Mutex<M>>,
    range: Range<u64>,
    start_position: u64,
    chunk_size: u64,
    encoding: TextEncoding,
    byte_pool: BufferPool,
    output_pool: OutputPool,
    cancel: CancelToken,
    /// Begin offset of the next grid cell to read.
    cursor: u64,
    next_id: u64,
    /// Previously read chunk, shared into the next piece's `prev`.
    last_data: Option<StreamData>,
    /// Piece awaiting its `next` neighbor before hand-off.
    pending: Option<PieceOfWork>,
    done: bool,
}

impl<M: LogMedia> ForwardChunkGenerator<M> {
    pub(crate) fn new(
        media: Arc<Mutex<M>>,
        range: Range<u64>,
        start_position: u64,
        chunk_size: u64,
        encoding: TextEncoding,
        byte_pool: BufferPool,
        output_pool: OutputPool,
        cancel: CancelToken,
    ) -> Self {
        let cursor = (start_position / chunk_size) * chunk_size;
        Self {
            media,
            range,
            start_position,
            chunk_size,
            encoding,
            byte_pool,
            output_pool,
            cancel,
            cursor,
            next_id: 0,
            last_data: None,
            pending: None,
            done: false,
        }
    }

    fn finish(&mut self) -> Option<PieceOfWork> {
        self.done = true;
        self.last_data = None;
        self.pending.take()
    }
}

impl<M: LogMedia> ChunkGenerator for ForwardChunkGenerator<M> {
    fn next_piece(&mut self) -> Result<Option<PieceOfWork>> {
        if self.done {
            return Ok(self.pending.take());
        }
        loop {
            if self.cancel.is_cancelled() || self.cursor >= self.range.end {
                return Ok(self.finish());
            }
            let cell_begin = self.cursor;
            let want = (self.range.end - cell_begin).min(self.chunk_size) as usize;
            let Some(data) = read_stream_data(&self.media, &self.byte_pool, cell_begin, want)?
            else {
                return Ok(self.finish());
            };

            let prev = match self.last_data.take() {
                Some(neighbor) => Some(neighbor),
                None => {
                    read_leading_overlap(&self.media, &self.byte_pool, cell_begin, self.encoding)?
                }
            };
            let start_text_position = if self.next_id == 0 {
                self.start_position
            } else {
                cell_begin
            };
            let piece = PieceOfWork {
                id: self.next_id,
                prev,
                data: data.clone(),
                next: None,
                start_text_position,
                stop_text_position: (cell_begin + self.chunk_size).min(self.range.end),
                output: self.output_pool.borrow(),
            };
            self.next_id += 1;
            self.cursor = cell_begin + self.chunk_size;

            let ready = match self.pending.take() {
                Some(mut earlier) => {
                    earlier.next = Some(data.clone());
                    Some(earlier)
                }
                None => None,
            };
            self.last_data = Some(data);
            self.pending = Some(piece);
            if ready.is_some() {
                return Ok(ready);
            }
        }
    }
}

pub(crate) struct BackwardChunkGenerator<M: LogMedia> {
    media: Arc<Mutex<M>>,
    range: Range<u64>,
    start_position: u64,
    chunk_size: u64,
    encoding: TextEncoding,
    byte_pool: BufferPool,
    output_pool: OutputPool,
    cancel: CancelToken,
    /// Begin offset of the next grid cell to read, moving downward.
    cursor: u64,
    /// Begin offset of the lowest grid cell in range.
    low_cell: u64,
    next_id: u64,
    /// Previously read (upper) chunk, shared into the next piece's `next`.
    last_data: Option<StreamData>,
    /// Piece awaiting its `prev` neighbor before hand-off.
    pending: Option<PieceOfWork>,
    done: bool,
    exhausted_cells: bool,
}

impl<M: LogMedia> BackwardChunkGenerator<M> {
    pub(crate) fn new(
        media: Arc<Mutex<M>>,
        range: Range<u64>,
        start_position: u64,
        chunk_size: u64,
        encoding: TextEncoding,
        byte_pool: BufferPool,
        output_pool: OutputPool,
        cancel: CancelToken,
    ) -> Self {
        let low_cell = (range.start / chunk_size) * chunk_size;
        let (cursor, exhausted_cells) = if start_position > range.start {
            (((start_position - 1) / chunk_size) * chunk_size, false)
        } else {
            (low_cell, true)
        };
        Self {
            media,
            range,
            start_position,
            chunk_size,
            encoding,
            byte_pool,
            output_pool,
            cancel,
            cursor,
            low_cell,
            next_id: 0,
            last_data: None,
            pending: None,
            done: false,
            exhausted_cells,
        }
    }

    fn finish(&mut self) -> Option<PieceOfWork> {
        self.done = true;
        self.last_data = None;
        self.pending.take()
    }
}

impl<M: LogMedia> ChunkGenerator for BackwardChunkGenerator<M> {
    fn next_piece(&mut self) -> Result<Option<PieceOfWork>> {
        if self.done {
            return Ok(self.pending.take());
        }
        loop {
            if self.cancel.is_cancelled() || self.exhausted_cells {
                return Ok(self.finish());
            }
            let cell_begin = self.cursor;
            let want = (self.range.end - cell_begin).min(self.chunk_size) as usize;
            let Some(data) = read_stream_data(&self.media, &self.byte_pool, cell_begin, want)?
            else {
                return Ok(self.finish());
            };

            let start_text_position = if self.next_id == 0 {
                self.start_position
            } else {
                (cell_begin + self.chunk_size).min(self.range.end)
            };
            let piece = PieceOfWork {
                id: self.next_id,
                prev: None,
                data: data.clone(),
                next: self.last_data.take(),
                start_text_position,
                stop_text_position: cell_begin.max(self.range.start),
                output: self.output_pool.borrow(),
            };
            self.next_id += 1;

            let ready = match self.pending.take() {
                Some(mut earlier) => {
                    earlier.prev = Some(data.clone());
                    Some(earlier)
                }
                None => None,
            };
            self.last_data = Some(data);
            self.pending = Some(piece);

            if cell_begin <= self.low_cell {
                // Lowest cell reached: the pending piece's lower context is
                // the logical-origin overlap, not another chunk.
                if let Some(lowest) = self.pending.as_mut() {
                    lowest.prev = read_leading_overlap(
                        &self.media,
                        &self.byte_pool,
                        cell_begin,
                        self.encoding,
                    )?;
                }
                self.exhausted_cells = true;
            } else {
                self.cursor = cell_begin - self.chunk_size;
            }
            if ready.is_some() {
                return Ok(ready);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MemoryMedia;

    fn generator_parts(len: usize, chunk_size: u64) -> (Arc<Mutex<MemoryMedia>>, BufferPool, OutputPool) {
        let data: Vec<u8> = (0..len as u8).collect();
        (
            Arc::new(Mutex::new(MemoryMedia::new(data))),
            BufferPool::new(chunk_size as usize, 8),
            OutputPool::new(8),
        )
    }

    fn drain(generator: &mut impl ChunkGenerator) -> Vec<PieceOfWork> {
        let mut pieces = Vec::new();
        while let Some(piece) = generator.next_piece().unwrap() {
            pieces.push(piece);
        }
        pieces
    }

    #[test]
    fn test_forward_pieces_cover_range_in_order() {
        let (media, bytes, outputs) = generator_parts(10, 4);
        let mut generator = ForwardChunkGenerator::new(
            media,
            0..10,
            0,
            4,
            TextEncoding::Ascii,
            bytes,
            outputs,
            CancelToken::new(),
        );
        let pieces = drain(&mut generator);
        assert_eq!(pieces.len(), 3);
        let bounds: Vec<_> = pieces
            .iter()
            .map(|p| (p.id, p.data.position(), p.data.end(), p.stop_text_position))
            .collect();
        assert_eq!(bounds, [(0, 0, 4, 4), (1, 4, 8, 8), (2, 8, 10, 10)]);
        assert_eq!(pieces[0].start_text_position, 0);
        assert_eq!(pieces[1].start_text_position, 4);
    }

    #[test]
    fn test_forward_neighbors_share_buffers() {
        let (media, bytes, outputs) = generator_parts(10, 4);
        let mut generator = ForwardChunkGenerator::new(
            media,
            0..10,
            0,
            4,
            TextEncoding::Ascii,
            bytes,
            outputs,
            CancelToken::new(),
        );
        let pieces = drain(&mut generator);
        assert!(pieces[0].prev.is_none());
        let next0 = pieces[0].next.as_ref().unwrap();
        assert!(next0.shares_buffer_with(&pieces[1].data));
        let prev1 = pieces[1].prev.as_ref().unwrap();
        assert!(prev1.shares_buffer_with(&pieces[0].data));
        assert!(pieces[2].next.is_none());
    }

    #[test]
    fn test_forward_leading_overlap_for_multibyte_start() {
        let (media, bytes, outputs) = generator_parts(16, 4);
        let mut generator = ForwardChunkGenerator::new(
            media,
            4..16,
            4,
            4,
            TextEncoding::Utf8,
            bytes,
            outputs,
            CancelToken::new(),
        );
        let pieces = drain(&mut generator);
        let overlap = pieces[0].prev.as_ref().unwrap();
        assert_eq!(overlap.position(), 1);
        assert_eq!(overlap.len(), 3);
        assert_eq!(overlap.bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_forward_no_overlap_for_single_byte_encoding() {
        let (media, bytes, outputs) = generator_parts(16, 4);
        let mut generator = ForwardChunkGenerator::new(
            media,
            4..16,
            4,
            4,
            TextEncoding::Ascii,
            bytes,
            outputs,
            CancelToken::new(),
        );
        let pieces = drain(&mut generator);
        assert!(pieces[0].prev.is_none());
    }

    #[test]
    fn test_empty_media_generates_no_pieces() {
        let (media, bytes, outputs) = generator_parts(0, 4);
        let pool_probe = bytes.clone();
        let mut generator = ForwardChunkGenerator::new(
            media,
            0..0,
            0,
            4,
            TextEncoding::Utf8,
            bytes,
            outputs,
            CancelToken::new(),
        );
        assert!(drain(&mut generator).is_empty());
        assert_eq!(pool_probe.outstanding(), 0);
    }

    #[test]
    fn test_zero_byte_read_returns_buffer_unused() {
        // Media shorter than the requested range
        let (media, bytes, outputs) = generator_parts(6, 4);
        let pool_probe = bytes.clone();
        let mut generator = ForwardChunkGenerator::new(
            media,
            0..12,
            0,
            4,
            TextEncoding::Ascii,
            bytes,
            outputs,
            CancelToken::new(),
        );
        let pieces = drain(&mut generator);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[1].data.end(), 6);
        drop(pieces);
        drop(generator);
        assert_eq!(pool_probe.outstanding(), 0);
    }

    #[test]
    fn test_cancel_stops_generation() {
        let (media, bytes, outputs) = generator_parts(16, 4);
        let cancel = CancelToken::new();
        let mut generator = ForwardChunkGenerator::new(
            media,
            0..16,
            0,
            4,
            TextEncoding::Ascii,
            bytes,
            outputs,
            cancel.clone(),
        );
        assert!(generator.next_piece().unwrap().is_some());
        cancel.cancel();
        // The pending piece flushes, then generation stops
        assert!(generator.next_piece().unwrap().is_some());
        assert!(generator.next_piece().unwrap().is_none());
    }

    #[test]
    fn test_backward_pieces_walk_down_in_order() {
        let (media, bytes, outputs) = generator_parts(10, 4);
        let mut generator = BackwardChunkGenerator::new(
            media,
            0..10,
            10,
            4,
            TextEncoding::Ascii,
            bytes,
            outputs,
            CancelToken::new(),
        );
        let pieces = drain(&mut generator);
        assert_eq!(pieces.len(), 3);
        let bounds: Vec<_> = pieces
            .iter()
            .map(|p| (p.id, p.data.position(), p.start_text_position, p.stop_text_position))
            .collect();
        assert_eq!(bounds, [(0, 8, 10, 8), (1, 4, 8, 4), (2, 0, 4, 0)]);
    }

    #[test]
    fn test_backward_neighbors_share_buffers() {
        let (media, bytes, outputs) = generator_parts(10, 4);
        let mut generator = BackwardChunkGenerator::new(
            media,
            0..10,
            10,
            4,
            TextEncoding::Ascii,
            bytes,
            outputs,
            CancelToken::new(),
        );
        let pieces = drain(&mut generator);
        assert!(pieces[0].next.is_none());
        let prev0 = pieces[0].prev.as_ref().unwrap();
        assert!(prev0.shares_buffer_with(&pieces[1].data));
        let next1 = pieces[1].next.as_ref().unwrap();
        assert!(next1.shares_buffer_with(&pieces[0].data));
        assert!(pieces[2].prev.is_none());
    }

    #[test]
    fn test_backward_origin_overlap_for_multibyte_range() {
        let (media, bytes, outputs) = generator_parts(16, 4);
        let mut generator = BackwardChunkGenerator::new(
            media,
            4..16,
            16,
            4,
            TextEncoding::Utf8,
            bytes,
            outputs,
            CancelToken::new(),
        );
        let pieces = drain(&mut generator);
        let lowest = pieces.last().unwrap();
        assert_eq!(lowest.data.position(), 4);
        let overlap = lowest.prev.as_ref().unwrap();
        assert_eq!(overlap.position(), 1);
        assert_eq!(overlap.len(), 3);
    }

    #[test]
    fn test_backward_empty_range_generates_no_pieces() {
        let (media, bytes, outputs) = generator_parts(10, 4);
        let mut generator = BackwardChunkGenerator::new(
            media,
            5..10,
            5,
            4,
            TextEncoding::Ascii,
            bytes,
            outputs,
            CancelToken::new(),
        );
        assert!(drain(&mut generator).is_empty());
    }
}
