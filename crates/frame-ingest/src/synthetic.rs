//! Deterministic test-pattern source standing in for camera hardware.

use std::{
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;

use crate::{CaptureError, CaptureSource, PixelFormat, RawFrame};

/// Generates a moving BGR gradient at a fixed frame rate.
///
/// The pattern shifts one pixel per frame so successive captures differ, which
/// keeps polling viewers honest about whether they are seeing fresh frames.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    interval: Duration,
    last_frame: Option<Instant>,
    tick: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            interval: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            last_frame: None,
            tick: 0,
        }
    }

    fn pace(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            let deadline = last + self.interval;
            if deadline > now {
                thread::sleep(deadline - now);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl CaptureSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<RawFrame, CaptureError> {
        self.pace();

        let shift = self.tick as u8;
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                let b = (x as u8).wrapping_add(shift);
                let g = y as u8;
                let r = ((x ^ y) as u8).wrapping_sub(shift);
                data.extend_from_slice(&[b, g, r]);
            }
        }
        self.tick = self.tick.wrapping_add(1);

        Ok(RawFrame {
            data,
            width: self.width,
            height: self.height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: PixelFormat::Bgr8,
        })
    }
}
