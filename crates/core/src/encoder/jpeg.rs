//! JPEG encoder settings.

use std::collections::HashMap;

use super::error::EncoderError;
use super::magick::{parse_bool_option, parse_u32_option};

/// Validated JPEG options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegSettings {
    /// 0..=100, default 80.
    pub quality: u32,
    /// Progressive (interlaced) encoding, default true.
    pub progressive: bool,
    /// Drop metadata profiles, default true.
    pub strip: bool,
    /// Extra Huffman-table optimization pass, default false.
    pub optimize: bool,
}

impl Default for JpegSettings {
    fn default() -> Self {
        Self {
            quality: 80,
            progressive: true,
            strip: true,
            optimize: false,
        }
    }
}

impl JpegSettings {
    /// Parse the job's free-form settings map; unknown keys are
    /// ignored, known keys with bad values are errors.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, EncoderError> {
        let defaults = Self::default();
        Ok(Self {
            quality: parse_u32_option(settings, "quality", 0, 100)?.unwrap_or(defaults.quality),
            progressive: parse_bool_option(settings, "progressive")?
                .unwrap_or(defaults.progressive),
            strip: parse_bool_option(settings, "strip")?.unwrap_or(defaults.strip),
            optimize: parse_bool_option(settings, "optimize")?.unwrap_or(defaults.optimize),
        })
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-quality".to_string(), self.quality.to_string()];
        if self.progressive {
            args.extend(["-interlace".to_string(), "Plane".to_string()]);
        }
        if self.strip {
            args.push("-strip".to_string());
        }
        if self.optimize {
            args.extend(["-define".to_string(), "jpeg:optimize-coding=true".to_string()]);
        }
        args
    }
}
