//! Input classification: decides whether a source file is an accepted image,
//! an accepted PDF, or neither.

use crate::config::InputConfig;
use crate::error::{ConversionError, Result};
use std::path::Path;
use std::sync::Arc;

/// Extensions recognised as paginated documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf"];

/// Media type recognised as a paginated document.
pub const DOCUMENT_MIME_TYPE: &str = "application/pdf";

/// Check if a file extension identifies a paginated document.
pub fn is_document_extension(ext: &str) -> bool {
    DOCUMENT_EXTENSIONS
        .iter()
        .any(|&e| e.eq_ignore_ascii_case(ext))
}

/// A user-supplied file before classification.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Display name, usually the filename on disk.
    pub name: String,
    /// Declared media type, empty when unknown.
    pub mime_type: String,
    /// Raw file contents.
    pub data: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, declaring its media type from the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let mime_type = mime_from_name(&name).unwrap_or_default().to_string();
        Ok(Self::new(name, mime_type, data))
    }

    /// Lower-cased extension of the display name.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Guess a media type from a filename.
pub fn mime_from_name(name: &str) -> Option<&'static str> {
    let ext = extension_of(name)?;
    let mime = match ext.as_str() {
        "pdf" => DOCUMENT_MIME_TYPE,
        "png" => "image/png",
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        _ => return None,
    };
    Some(mime)
}

/// Kind of an accepted source item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Image,
    Document,
}

/// Outcome of classifying one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Accepted(InputKind),
    /// A PDF, but no page-extraction capability is available.
    SkippedNoReader,
    Unsupported,
}

/// Pure predicate over the input rules.
#[derive(Debug, Clone)]
pub struct Classifier {
    mime_types: Vec<String>,
    extensions: Vec<String>,
    allow_documents: bool,
    reader_available: bool,
}

impl Classifier {
    pub fn new(input: &InputConfig, allow_documents: bool, reader_available: bool) -> Self {
        Self {
            mime_types: input
                .mime_types
                .iter()
                .filter(|m| !m.is_empty())
                .map(|m| m.to_ascii_lowercase())
                .collect(),
            extensions: input
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            allow_documents,
            reader_available,
        }
    }

    /// Whether the file declares itself a PDF by media type or extension.
    pub fn is_document(&self, file: &SourceFile) -> bool {
        file.mime_type.eq_ignore_ascii_case(DOCUMENT_MIME_TYPE)
            || file.extension().is_some_and(|e| is_document_extension(&e))
    }

    /// Whether the file is an accepted image.
    pub fn is_image(&self, file: &SourceFile) -> bool {
        if self.is_document(file) {
            return false;
        }
        let mime = file.mime_type.to_ascii_lowercase();
        let type_match = self.mime_types.iter().any(|m| *m == mime);
        let ext_match = file
            .extension()
            .is_some_and(|e| self.extensions.iter().any(|allowed| *allowed == e));
        let fallback =
            self.mime_types.is_empty() && self.extensions.is_empty() && mime.starts_with("image/");
        type_match || ext_match || fallback
    }

    pub fn classify(&self, file: &SourceFile) -> Classification {
        if self.allow_documents && self.is_document(file) {
            if self.reader_available {
                Classification::Accepted(InputKind::Document)
            } else {
                Classification::SkippedNoReader
            }
        } else if self.is_image(file) {
            Classification::Accepted(InputKind::Image)
        } else {
            Classification::Unsupported
        }
    }

    /// Classify, turning rejections into errors.
    pub fn accept(&self, file: &SourceFile) -> Result<InputKind> {
        match self.classify(file) {
            Classification::Accepted(kind) => Ok(kind),
            Classification::SkippedNoReader => Err(ConversionError::MissingCapability(
                crate::error::Capability::DocumentReader,
            )),
            Classification::Unsupported => Err(ConversionError::UnsupportedInput {
                name: file.name.clone(),
            }),
        }
    }
}
