//! Frame acquisition primitives for the feed pipeline.
//!
//! A capture backend implements [`CaptureSource`] and hands raw frames to the
//! pipeline one at a time. Sources own their device handle exclusively and
//! release it when dropped, so stopping the pipeline deterministically closes
//! the camera. There is no buffering here beyond the single frame in flight.

use anyhow::Error;
use thiserror::Error;

mod synthetic;

pub use synthetic::SyntheticSource;

/// Raw frame captured from a video source.
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub format: PixelFormat,
}

impl RawFrame {
    /// Byte length `data` must have for the frame's geometry and format.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Bgr8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source closed or revoked")]
    Disconnected,
    #[error(transparent)]
    Transient(#[from] Error),
}

impl CaptureError {
    /// Terminal errors mean the source cannot produce further frames and the
    /// pipeline must stop rather than retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureError::Open { .. } | CaptureError::Disconnected
        )
    }
}

/// A video source the pipeline polls for frames.
///
/// `next_frame` blocks at the source's natural cadence and returns either a
/// fully formed frame or a [`CaptureError`]. Transient errors are retried by
/// the caller; terminal ones stop the pipeline. Release/close happens on drop.
pub trait CaptureSource: Send {
    fn next_frame(&mut self) -> Result<RawFrame, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_strides() {
        assert_eq!(PixelFormat::Gray8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Bgr8.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgba8.bytes_per_pixel(), 4);
    }

    #[test]
    fn terminal_classification() {
        assert!(CaptureError::Open { uri: "/dev/video0".into() }.is_terminal());
        assert!(CaptureError::Disconnected.is_terminal());
        assert!(!CaptureError::Transient(anyhow::anyhow!("glitch")).is_terminal());
    }
}
