//! Configuration types for batch conversion.
//!
//! Every struct rejects unknown keys on deserialization so that a typo in a
//! configuration file surfaces as an error instead of being silently ignored.

use crate::error::{ConversionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Smallest and largest GIF quantizer sampling interval.
pub const GIF_SAMPLE_INTERVAL_RANGE: std::ops::RangeInclusive<i32> = 1..=30;

/// Default GIF quantizer sampling interval.
pub const DEFAULT_GIF_SAMPLE_INTERVAL: i32 = 5;

/// Output formats the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpg,
    Jpeg,
    Png,
    Webp,
    Gif,
    Pdf,
}

impl OutputFormat {
    /// All formats in presentation order.
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Jpg,
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Webp,
        OutputFormat::Gif,
        OutputFormat::Pdf,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Gif => "gif",
            OutputFormat::Pdf => "pdf",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    /// Whether this output is a paginated document rather than a raster image.
    pub fn is_document(&self) -> bool {
        matches!(self, OutputFormat::Pdf)
    }

    pub fn default_mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpg | OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Pdf => "application/pdf",
        }
    }

    pub fn default_label(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "JPG",
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::Webp => "WebP",
            OutputFormat::Gif => "GIF",
            OutputFormat::Pdf => "PDF",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How PDF output is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Every page of every source goes into one document.
    #[default]
    Merged,
    /// Each source page becomes its own document.
    Separate,
}

impl MergeMode {
    /// Anything other than `separate` means `merged`.
    pub fn from_key(key: &str) -> Self {
        if key.trim().eq_ignore_ascii_case("separate") {
            MergeMode::Separate
        } else {
            MergeMode::Merged
        }
    }
}

/// Accepted input images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InputConfig {
    /// Declared media types accepted as images.
    pub mime_types: Vec<String>,

    /// Filename extensions accepted as images, without the leading dot.
    pub extensions: Vec<String>,

    /// Human-readable description appended to unsupported-format warnings.
    pub description: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            mime_types: ["image/png", "image/jpeg", "image/pjpeg", "image/webp", "image/gif"]
                .into_iter()
                .map(String::from)
                .collect(),
            extensions: ["png", "jpg", "jpeg", "webp", "gif"]
                .into_iter()
                .map(String::from)
                .collect(),
            description: Some("Supports PNG, JPG, JPEG, WebP, and GIF files.".to_string()),
        }
    }
}

/// Per-format output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDescriptor {
    /// Label used in status messages, e.g. `"PNG"`.
    pub label: String,

    /// Media type of the produced bytes.
    pub mime_type: String,

    /// File extension without the leading dot.
    pub file_extension: String,

    /// WebP quality to use instead of the preset's hint; other formats ignore it.
    #[serde(default)]
    pub quality_override: Option<f32>,

    /// Keep transparency instead of flattening onto white.
    #[serde(default)]
    pub preserve_alpha: bool,

    /// GIF quantizer sampling interval (1 = best, 30 = fastest).
    #[serde(default)]
    pub gif_sample_interval: Option<i32>,

    /// Base name of the ZIP bundle.
    #[serde(default)]
    pub archive_name: Option<String>,

    /// Base name of the ZIP bundle for merged PDF output.
    #[serde(default)]
    pub archive_name_merged: Option<String>,

    /// Base name of the ZIP bundle for separate PDF output.
    #[serde(default)]
    pub archive_name_separate: Option<String>,
}

impl OutputDescriptor {
    /// Stock descriptor for a format.
    pub fn for_format(format: OutputFormat) -> Self {
        Self {
            label: format.default_label().to_string(),
            mime_type: format.default_mime_type().to_string(),
            file_extension: format.key().to_string(),
            quality_override: None,
            preserve_alpha: false,
            gif_sample_interval: None,
            archive_name: None,
            archive_name_merged: None,
            archive_name_separate: None,
        }
    }

    /// Keep transparency in the encoded output.
    pub fn preserve_alpha(mut self, enabled: bool) -> Self {
        self.preserve_alpha = enabled;
        self
    }

    /// Set a lossy quality overriding the preset's hint.
    pub fn quality_override(mut self, quality: f32) -> Self {
        self.quality_override = Some(quality);
        self
    }

    /// Set the GIF sampling interval.
    pub fn gif_sample_interval(mut self, interval: i32) -> Self {
        self.gif_sample_interval = Some(interval);
        self
    }

    /// Extension with any leading dot removed.
    pub fn extension(&self) -> &str {
        self.file_extension.trim_start_matches('.')
    }

    pub fn sample_interval(&self) -> i32 {
        self.gif_sample_interval
            .unwrap_or(DEFAULT_GIF_SAMPLE_INTERVAL)
    }

    fn validate(&self, format: OutputFormat) -> Result<()> {
        if self.extension().is_empty() {
            return Err(ConversionError::InvalidConfig(format!(
                "outputs.{}.file_extension must not be empty",
                format
            )));
        }
        if let Some(q) = self.quality_override {
            if !(0.0..=1.0).contains(&q) {
                return Err(ConversionError::InvalidConfig(format!(
                    "outputs.{}.quality_override must be between 0 and 1",
                    format
                )));
            }
        }
        if let Some(interval) = self.gif_sample_interval {
            if !GIF_SAMPLE_INTERVAL_RANGE.contains(&interval) {
                return Err(ConversionError::InvalidConfig(format!(
                    "outputs.{}.gif_sample_interval must be between 1 and 30",
                    format
                )));
            }
        }
        Ok(())
    }
}

/// Combined configuration for the converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConverterConfig {
    /// Job slug used for archive and file naming.
    pub slug: String,

    /// Accepted image inputs.
    pub input: InputConfig,

    /// Descriptor for every configurable output format.
    pub outputs: BTreeMap<OutputFormat, OutputDescriptor>,

    /// Formats offered to the user, in order.
    pub available_outputs: Vec<OutputFormat>,

    /// Format selected when nothing else was chosen.
    pub default_output: OutputFormat,

    /// Accept PDF files as input.
    pub allow_document_input: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            slug: "converter".to_string(),
            input: InputConfig::default(),
            outputs: OutputFormat::ALL
                .into_iter()
                .map(|f| (f, OutputDescriptor::for_format(f)))
                .collect(),
            available_outputs: OutputFormat::ALL.to_vec(),
            default_output: OutputFormat::Jpg,
            allow_document_input: false,
        }
    }
}

impl ConverterConfig {
    /// Create a config offering a single output format.
    pub fn for_output(format: OutputFormat) -> Self {
        Self {
            available_outputs: vec![format],
            default_output: format,
            ..Default::default()
        }
    }

    /// Parse a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Set the job slug.
    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    /// Enable PDF input.
    pub fn allow_document_input(mut self, enabled: bool) -> Self {
        self.allow_document_input = enabled;
        self
    }

    /// Replace the descriptor of a format.
    pub fn with_output(mut self, format: OutputFormat, descriptor: OutputDescriptor) -> Self {
        self.outputs.insert(format, descriptor);
        self
    }

    /// Descriptor for a format, falling back to the stock one.
    pub fn descriptor(&self, format: OutputFormat) -> OutputDescriptor {
        self.outputs
            .get(&format)
            .cloned()
            .unwrap_or_else(|| OutputDescriptor::for_format(format))
    }

    /// Resolve a requested output to one that is offered.
    pub fn resolve_output(&self, requested: OutputFormat) -> OutputFormat {
        if self.available_outputs.contains(&requested) {
            requested
        } else {
            self.available_outputs
                .first()
                .copied()
                .unwrap_or(self.default_output)
        }
    }

    /// Validate the entire configuration.
    pub fn validate(&self) -> Result<()> {
        if self.available_outputs.is_empty() {
            return Err(ConversionError::InvalidConfig(
                "available_outputs must list at least one format".to_string(),
            ));
        }
        if !self.available_outputs.contains(&self.default_output) {
            return Err(ConversionError::InvalidConfig(format!(
                "default_output '{}' is not in available_outputs",
                self.default_output
            )));
        }
        for format in &self.available_outputs {
            let descriptor = self.outputs.get(format).ok_or_else(|| {
                ConversionError::InvalidConfig(format!(
                    "available output '{}' has no entry in outputs",
                    format
                ))
            })?;
            descriptor.validate(*format)?;
        }
        if self
            .input
            .extensions
            .iter()
            .any(|e| e.trim_start_matches('.').is_empty())
        {
            return Err(ConversionError::InvalidConfig(
                "input.extensions must not contain empty entries".to_string(),
            ));
        }
        Ok(())
    }
}
