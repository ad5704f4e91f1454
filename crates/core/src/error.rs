//! Error types for batch conversion.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// An optional runtime feature that must be checked before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Page extraction for PDF input.
    DocumentReader,
    /// Any GIF encoding strategy.
    Gif,
    /// PDF output composition.
    DocumentComposer,
    /// ZIP bundling for multi-file delivery.
    Archive,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::DocumentReader => "PDF reader",
            Capability::Gif => "GIF",
            Capability::DocumentComposer => "PDF generator",
            Capability::Archive => "ZIP archive",
        };
        f.write_str(name)
    }
}

/// Main error type for the batch-convert library.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Input matches neither the image nor the document rules.
    #[error("Unsupported input file: {name}")]
    UnsupportedInput { name: String },

    /// A capability the run depends on is not available.
    #[error("no {0} capability available")]
    MissingCapability(Capability),

    /// The PDF could not be opened.
    #[error("Failed to load document '{name}': {message}")]
    DocumentLoad { name: String, message: String },

    /// Pdfium library error.
    #[error("Pdfium error: {0}")]
    PdfiumError(String),

    /// A single page failed to rasterize.
    #[error("Failed to render page {page}: {message}")]
    PageRender { page: usize, message: String },

    /// Image bytes could not be decoded by any strategy.
    #[error("Failed to decode image '{name}': {message}")]
    ImageDecode { name: String, message: String },

    /// Encoding a bitmap into the output format failed.
    #[error("{format} encoding failed: {message}")]
    EncodeFailed { format: String, message: String },

    /// Building the output PDF failed.
    #[error("PDF composition failed: {0}")]
    ComposeFailed(String),

    /// Building the ZIP bundle failed.
    #[error("Archive creation failed: {0}")]
    ArchiveFailed(String),

    /// Writing an artifact to disk failed.
    #[error("Failed to write output '{path}': {message}")]
    OutputWrite { path: PathBuf, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Generic I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    /// Whether this error ends the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ConversionError::DocumentLoad { .. }
                | ConversionError::PdfiumError(_)
                | ConversionError::PageRender { .. }
                | ConversionError::ImageDecode { .. }
                | ConversionError::EncodeFailed { .. }
        )
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, ConversionError>;
