//! AVIF encoder settings.

use std::collections::HashMap;

use super::error::EncoderError;
use super::magick::parse_u32_option;

/// Validated AVIF options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvifSettings {
    /// 0..=100, default 50. AVIF stays visually good well below the
    /// quality numbers JPEG needs.
    pub quality: u32,
    /// Encoder effort (speed/size trade-off), 0..=10.
    pub effort: Option<u32>,
}

impl Default for AvifSettings {
    fn default() -> Self {
        Self {
            quality: 50,
            effort: None,
        }
    }
}

impl AvifSettings {
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, EncoderError> {
        let defaults = Self::default();
        Ok(Self {
            quality: parse_u32_option(settings, "quality", 0, 100)?.unwrap_or(defaults.quality),
            effort: parse_u32_option(settings, "effort", 0, 10)?,
        })
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-quality".to_string(), self.quality.to_string()];
        if let Some(effort) = self.effort {
            args.extend(["-define".to_string(), format!("heic:speed={}", 10 - effort.min(10))]);
        }
        args
    }
}
