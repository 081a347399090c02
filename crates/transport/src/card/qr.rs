//! QR encoding.

use std::io::Cursor;

use image::{ImageFormat, Luma};
use qrcode::QrCode;

use crate::error::{Error, Result};

/// Turns a payload string into PNG bytes. Swappable so tests can record
/// payloads without rasterizing anything.
pub trait QrEncoder: Send + Sync {
    fn encode_png(&self, payload: &str) -> Result<Vec<u8>>;
}

/// Black-on-white PNG with a four-module quiet zone.
#[derive(Debug, Clone, Copy)]
pub struct PngQrEncoder {
    /// Pixels per module.
    pub module_size: u32,
}

impl Default for PngQrEncoder {
    fn default() -> Self {
        Self { module_size: 10 }
    }
}

impl QrEncoder for PngQrEncoder {
    fn encode_png(&self, payload: &str) -> Result<Vec<u8>> {
        let code = QrCode::new(payload.as_bytes()).map_err(|e| Error::QrEncode {
            message: e.to_string(),
        })?;

        let bitmap = code
            .render::<Luma<u8>>()
            .quiet_zone(true)
            .module_dimensions(self.module_size, self.module_size)
            .build();

        let mut png = Vec::new();
        bitmap
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| Error::QrEncode {
                message: e.to_string(),
            })?;
        Ok(png)
    }
}
