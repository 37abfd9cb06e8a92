use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use arc_swap::ArcSwapOption;

/// Encoded frame ready to serve. Constructed once by the pipeline and never
/// mutated afterwards; request handlers share it behind an `Arc`.
pub(crate) struct EncodedFrame {
    pub(crate) payload: Vec<u8>,
    pub(crate) content_type: &'static str,
    pub(crate) timestamp_ms: i64,
    pub(crate) sequence: u64,
}

/// Single-item store holding the most recently published frame.
///
/// Publishing swaps an `Arc` pointer, so a concurrent reader observes either
/// the previous frame or the new one, never a partial write. The writer is
/// never blocked by readers; a superseded frame is reclaimed once the last
/// in-flight response drops its handle. Frames produced between two reads are
/// silently discarded: latest wins.
#[derive(Default)]
pub(crate) struct FrameSlot {
    current: ArcSwapOption<EncodedFrame>,
    version: AtomicU64,
}

impl FrameSlot {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            version: AtomicU64::new(0),
        }
    }

    /// Replace the stored frame and advance the publish counter.
    pub(crate) fn publish(&self, frame: EncodedFrame) {
        self.current.store(Some(Arc::new(frame)));
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Latest published frame, or `None` before the first publish.
    pub(crate) fn read(&self) -> Option<Arc<EncodedFrame>> {
        self.current.load_full()
    }

    /// Number of completed publishes.
    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}
