//! WebP encoder settings.

use std::collections::HashMap;

use super::error::EncoderError;
use super::magick::{parse_bool_option, parse_u32_option};

/// Validated WebP options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebpSettings {
    /// 0..=100, default 80. Ignored by the codec when lossless.
    pub quality: u32,
    /// Lossless encoding, default false.
    pub lossless: bool,
    /// cwebp compression method, 0..=6.
    pub method: Option<u32>,
}

impl Default for WebpSettings {
    fn default() -> Self {
        Self {
            quality: 80,
            lossless: false,
            method: None,
        }
    }
}

impl WebpSettings {
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, EncoderError> {
        let defaults = Self::default();
        Ok(Self {
            quality: parse_u32_option(settings, "quality", 0, 100)?.unwrap_or(defaults.quality),
            lossless: parse_bool_option(settings, "lossless")?.unwrap_or(defaults.lossless),
            method: parse_u32_option(settings, "method", 0, 6)?,
        })
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-quality".to_string(), self.quality.to_string()];
        if self.lossless {
            args.extend(["-define".to_string(), "webp:lossless=true".to_string()]);
        }
        if let Some(method) = self.method {
            args.extend(["-define".to_string(), format!("webp:method={}", method)]);
        }
        args
    }
}
