//! Frame payloads
//!
//! A sampled still frame and its compressed upload form. Encoding uses a
//! reduced JPEG quality factor to keep per-tick uploads small.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::error::MonitorError;

/// One still frame rendered off the live feed, tightly packed RGB8
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    /// Flat single-intensity frame, used by synthetic feeds
    pub fn solid(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            rgb: vec![value; (width * height * 3) as usize],
        }
    }

    /// Compress into the upload payload at the given quality factor
    pub fn encode_jpeg(&self, quality: u8) -> Result<EncodedFrame, MonitorError> {
        let expected = (self.width as usize) * (self.height as usize) * 3;
        if self.rgb.len() != expected {
            return Err(MonitorError::Encode(format!(
                "buffer is {} bytes, expected {} for {}x{} rgb8",
                self.rgb.len(),
                expected,
                self.width,
                self.height
            )));
        }

        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder
            .encode(&self.rgb, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| MonitorError::Encode(e.to_string()))?;

        Ok(EncodedFrame { jpeg: buf })
    }
}

/// Compressed image payload sent to the detection service
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
