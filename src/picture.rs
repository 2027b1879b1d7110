//! Picture output model and output queue (SPEC_FULL.md §3 "Picture", §5
//! "Output queue: mutex-protected ring", §6 "Picture output").
//!
//! Grounded on the teacher's plane/stride conventions (`sequence.rs`'s
//! `ColorConfig`) generalized to an owned, ref-counted picture the output
//! queue can hand to callers independent of decode-thread lifetime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::sequence::{ChromaSamplePosition, ColorPrimaries, MatrixCoefficients, TransferCharacteristics};

/// Per-picture color/geometry parameters carried alongside pixel data.
#[derive(Debug, Clone, Copy)]
pub struct PictureParams {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub subsampling_x: bool,
    pub subsampling_y: bool,
    pub mono_chrome: bool,
    pub color_primaries: ColorPrimaries,
    pub transfer_characteristics: TransferCharacteristics,
    pub matrix_coefficients: MatrixCoefficients,
    pub chroma_sample_position: ChromaSamplePosition,
    pub full_range: bool,
}

/// Monotone row-progress counters a picture exposes to waiting workers
/// (SPEC_FULL.md §5 "Row-progress contract"). Block-level advances after
/// pass-1 parsing of a superblock row; pixel-level advances after pass-2
/// reconstruction + filtering of that row.
#[derive(Debug, Default)]
pub struct RowProgress {
    block_level: AtomicU64,
    pixel_level: AtomicU64,
}

impl RowProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_row(&self) -> u64 {
        self.block_level.load(Ordering::Acquire)
    }

    pub fn pixel_row(&self) -> u64 {
        self.pixel_level.load(Ordering::Acquire)
    }

    pub fn advance_block_row(&self, row: u64) {
        self.block_level.fetch_max(row, Ordering::AcqRel);
    }

    pub fn advance_pixel_row(&self, row: u64) {
        self.pixel_level.fetch_max(row, Ordering::AcqRel);
    }
}

/// A decoded picture: three planes of samples (10-bit occupies the low 10
/// bits of each 16-bit component, upper bits zeroed), their strides in
/// bytes, presentation-order `poc`, and the progress counters readers of
/// *this* picture as a motion-compensation reference wait on.
pub struct Picture {
    pub data: [Vec<u8>; 3],
    pub stride: [usize; 2],
    pub params: PictureParams,
    pub poc: u64,
    pub progress: RowProgress,
    pub flushed: bool,
}

impl Picture {
    pub fn new(data: [Vec<u8>; 3], stride: [usize; 2], params: PictureParams, poc: u64) -> Self {
        Self {
            data,
            stride,
            params,
            poc,
            progress: RowProgress::new(),
            flushed: false,
        }
    }
}

/// Mutex-protected ring buffer delivering pictures in submission order
/// regardless of decode completion order (SPEC_FULL.md §5).
pub struct OutputQueue {
    inner: Mutex<VecDeque<Arc<Picture>>>,
    ready: Condvar,
    capacity: usize,
}

impl OutputQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Pushes a finished picture, blocking the producing frame worker while
    /// the ring is at `capacity` (backpressure per `max_frame_delay`).
    pub fn push(&self, picture: Arc<Picture>) {
        let mut guard = self.inner.lock().unwrap();
        while guard.len() >= self.capacity {
            guard = self.ready.wait(guard).unwrap();
        }
        guard.push_back(picture);
        self.ready.notify_all();
    }

    /// Pops the oldest picture, blocking until one is available.
    pub fn pop_blocking(&self) -> Arc<Picture> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(pic) = guard.pop_front() {
                self.ready.notify_all();
                return pic;
            }
            guard = self.ready.wait(guard).unwrap();
        }
    }

    /// Non-blocking pop; `None` if the ring is currently empty.
    pub fn try_pop(&self) -> Option<Arc<Picture>> {
        let mut guard = self.inner.lock().unwrap();
        let pic = guard.pop_front();
        if pic.is_some() {
            self.ready.notify_all();
        }
        pic
    }

    /// Flush: drains the ring and marks any future push as invalidated by
    /// the caller of this (the pipeline stops submitting after calling this).
    pub fn flush(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.clear();
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> PictureParams {
        PictureParams {
            width: 64,
            height: 64,
            bit_depth: 8,
            subsampling_x: true,
            subsampling_y: true,
            mono_chrome: false,
            color_primaries: ColorPrimaries::Unspecified,
            transfer_characteristics: TransferCharacteristics::Unspecified,
            matrix_coefficients: MatrixCoefficients::Unspecified,
            chroma_sample_position: ChromaSamplePosition::Unknown,
            full_range: false,
        }
    }

    #[test]
    fn test_row_progress_monotone() {
        let p = RowProgress::new();
        p.advance_block_row(3);
        p.advance_block_row(1); // must not regress
        assert_eq!(p.block_row(), 3);
    }

    #[test]
    fn test_output_queue_fifo_order() {
        let q = OutputQueue::new(4);
        for poc in 0..3 {
            let pic = Arc::new(Picture::new([vec![], vec![], vec![]], [0, 0], test_params(), poc));
            q.push(pic);
        }
        assert_eq!(q.pop_blocking().poc, 0);
        assert_eq!(q.pop_blocking().poc, 1);
        assert_eq!(q.pop_blocking().poc, 2);
    }

    #[test]
    fn test_flush_drains_queue() {
        let q = OutputQueue::new(4);
        q.push(Arc::new(Picture::new([vec![], vec![], vec![]], [0, 0], test_params(), 0)));
        q.flush();
        assert!(q.is_empty());
        assert!(q.try_pop().is_none());
    }
}
