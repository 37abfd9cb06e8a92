//! Processing seam between capture and encode.
//!
//! The pipeline applies exactly one transform per cycle. Implementations are
//! pure raw-frame to raw-frame functions and share no mutable state with the
//! pipeline; a failure skips the cycle and is retried on the next frame.

use anyhow::Result;

use frame_ingest::RawFrame;

pub(crate) trait FrameTransform: Send {
    fn apply(&self, frame: RawFrame) -> Result<RawFrame>;
}

/// Passthrough used when processing is disabled: the raw feed is served as-is.
pub(crate) struct Identity;

impl FrameTransform for Identity {
    fn apply(&self, frame: RawFrame) -> Result<RawFrame> {
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use frame_ingest::PixelFormat;

    use super::*;

    #[test]
    fn identity_preserves_frame_bytes() {
        let frame = RawFrame {
            data: vec![1, 2, 3, 4, 5, 6],
            width: 2,
            height: 1,
            timestamp_ms: 42,
            format: PixelFormat::Bgr8,
        };
        let out = Identity.apply(frame).expect("identity transform");
        assert_eq!(out.data, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(out.timestamp_ms, 42);
    }
}
