use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::VARIANT_KEY_PREFIX;
use crate::models::format::{OutputFormat, TargetFormat};

/// One entry of the rendition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub name: String,
    /// Upper bound for the longer edge of the rendition
    pub max_dimension: u32,
    pub target_format: TargetFormat,
    /// Encoder quality, 1-100
    pub quality: u8,
}

impl VariantSpec {
    pub fn new(
        name: impl Into<String>,
        max_dimension: u32,
        target_format: TargetFormat,
        quality: u8,
    ) -> Self {
        Self {
            name: name.into(),
            max_dimension,
            target_format,
            quality,
        }
    }

    /// Parse `name:max_dimension:format:quality`, e.g. `thumbnail:160:webp:80`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 4 {
            return Err(format!(
                "Invalid variant '{}': expected name:max_dimension:format:quality",
                s
            ));
        }
        let name = parts[0].trim();
        if name.is_empty() {
            return Err(format!("Invalid variant '{}': empty name", s));
        }
        let max_dimension = parts[1]
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("Invalid variant '{}': bad max_dimension: {}", s, e))?;
        let target_format = TargetFormat::parse(parts[2])?;
        let quality = parts[3]
            .trim()
            .parse::<u8>()
            .map_err(|e| format!("Invalid variant '{}': bad quality: {}", s, e))?;
        Ok(Self::new(name, max_dimension, target_format, quality))
    }

    /// Parse a comma-separated rendition table.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, String> {
        s.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// One encoded rendition. Never written to storage by the pipeline itself.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedVariant {
    pub spec_name: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: usize,
    pub format: OutputFormat,
    #[serde(skip)]
    pub encoded_bytes: Bytes,
}

impl GeneratedVariant {
    pub fn new(
        spec_name: impl Into<String>,
        width: u32,
        height: u32,
        format: OutputFormat,
        encoded_bytes: Bytes,
    ) -> Self {
        Self {
            spec_name: spec_name.into(),
            width,
            height,
            byte_size: encoded_bytes.len(),
            format,
            encoded_bytes,
        }
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    /// Storage key suggestion: `images/{upload_id}/{spec_name}.{ext}`
    pub fn suggested_key(&self, upload_id: Uuid) -> String {
        format!(
            "{}/{}/{}.{}",
            VARIANT_KEY_PREFIX,
            upload_id,
            self.spec_name,
            self.format.extension()
        )
    }
}
