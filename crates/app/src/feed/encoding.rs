//! JPEG encoding for the serving path.
//!
//! The encoder turns a raw frame into the transport payload stored in the
//! frame slot. A grayscale path mirrors the single-channel frames the web
//! viewer expects when processing is enabled; the color path repacks BGR or
//! RGBA capture data as RGB before encoding.

use anyhow::{Context, Result, bail};
use image::{GrayImage, RgbImage, codecs::jpeg::JpegEncoder};

use frame_ingest::{PixelFormat, RawFrame};

pub(crate) const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Encodes raw frames into JPEG payloads for the frame server.
pub(crate) struct FrameEncoder {
    quality: u8,
    grayscale: bool,
}

impl FrameEncoder {
    pub(crate) fn new(quality: u8, grayscale: bool) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            grayscale,
        }
    }

    pub(crate) fn encode(&self, frame: &RawFrame) -> Result<Vec<u8>> {
        if frame.data.len() != frame.expected_len() {
            bail!(
                "frame data is {} bytes, expected {} for {}x{} {:?}",
                frame.data.len(),
                frame.expected_len(),
                frame.width,
                frame.height,
                frame.format
            );
        }

        let mut payload = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut payload, self.quality);
        if self.grayscale || frame.format == PixelFormat::Gray8 {
            let img = GrayImage::from_raw(frame.width, frame.height, to_luma(frame))
                .context("luma buffer does not match frame geometry")?;
            encoder
                .encode_image(&img)
                .context("JPEG encode failed (grayscale)")?;
        } else {
            let img = RgbImage::from_raw(frame.width, frame.height, to_rgb(frame))
                .context("rgb buffer does not match frame geometry")?;
            encoder
                .encode_image(&img)
                .context("JPEG encode failed (color)")?;
        }
        Ok(payload)
    }
}

/// Repack capture data as tightly packed RGB.
fn to_rgb(frame: &RawFrame) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
    match frame.format {
        PixelFormat::Bgr8 => {
            for px in frame.data.chunks_exact(3) {
                rgb.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        PixelFormat::Rgba8 => {
            for px in frame.data.chunks_exact(4) {
                rgb.extend_from_slice(&[px[0], px[1], px[2]]);
            }
        }
        PixelFormat::Gray8 => {
            for &v in &frame.data {
                rgb.extend_from_slice(&[v, v, v]);
            }
        }
    }
    rgb
}

/// Integer BT.601 luma approximation.
fn to_luma(frame: &RawFrame) -> Vec<u8> {
    let luma =
        |r: u8, g: u8, b: u8| ((77 * u32::from(r) + 150 * u32::from(g) + 29 * u32::from(b)) >> 8) as u8;
    match frame.format {
        PixelFormat::Gray8 => frame.data.clone(),
        PixelFormat::Bgr8 => frame
            .data
            .chunks_exact(3)
            .map(|px| luma(px[2], px[1], px[0]))
            .collect(),
        PixelFormat::Rgba8 => frame
            .data
            .chunks_exact(4)
            .map(|px| luma(px[0], px[1], px[2]))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgr_frame(width: u32, height: u32) -> RawFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, (x + y) as u8]);
            }
        }
        RawFrame {
            data,
            width,
            height,
            timestamp_ms: 0,
            format: PixelFormat::Bgr8,
        }
    }

    #[test]
    fn encodes_gray_frame_to_jpeg() {
        let frame = RawFrame {
            data: vec![0, 64, 128, 255],
            width: 2,
            height: 2,
            timestamp_ms: 0,
            format: PixelFormat::Gray8,
        };
        let jpeg = FrameEncoder::new(80, false).encode(&frame).expect("encode");
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn encodes_color_frame_to_jpeg() {
        let jpeg = FrameEncoder::new(85, false)
            .encode(&bgr_frame(4, 4))
            .expect("encode");
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn grayscale_flag_downmixes_color_input() {
        let jpeg = FrameEncoder::new(85, true)
            .encode(&bgr_frame(4, 4))
            .expect("encode");
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn rejects_frame_with_short_buffer() {
        let frame = RawFrame {
            data: vec![0; 5],
            width: 2,
            height: 2,
            timestamp_ms: 0,
            format: PixelFormat::Bgr8,
        };
        assert!(FrameEncoder::new(85, false).encode(&frame).is_err());
    }
}
