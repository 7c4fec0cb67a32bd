//! Thread-safe FIFO carrying frames between a producer and a consumer
//! thread.
//!
//! Built on crossbeam channels: the writer session uses an unbounded queue
//! (`add_frame` must never block the producer); the reader session may cap
//! the queue depth so decode-ahead cannot outrun the consumer by more than
//! a fixed number of frames.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};

/// Unbounded or bounded FIFO with non-blocking drain.
///
/// Both ends live in one struct so a session can hand clones to its worker
/// thread while keeping pop/drain access for itself.
#[derive(Debug, Clone)]
pub struct FrameQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> FrameQueue<T> {
    /// Create an unbounded queue.
    pub fn unbounded() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Create a queue holding at most `depth` items; `0` means unbounded.
    pub fn with_depth(depth: usize) -> Self {
        if depth == 0 {
            return Self::unbounded();
        }
        let (tx, rx) = bounded(depth);
        Self { tx, rx }
    }

    /// Push an item, blocking if the queue is bounded and full.
    ///
    /// Returns `false` if the queue has been disconnected.
    pub fn push(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }

    /// Push without blocking; hands the item back when the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) | Err(TrySendError::Disconnected(item)) => Err(item),
        }
    }

    /// Pop one item, blocking until one is available.
    ///
    /// Returns `None` if the queue has been disconnected.
    pub fn pop(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Pop one item without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Discard everything currently queued.
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Number of items currently waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
