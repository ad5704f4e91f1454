//! Optional runtime features checked before a run starts.

use crate::config::OutputFormat;
use crate::error::{Capability, ConversionError, Result};
use image::ImageFormat;

/// Which optional encoders and writers are usable.
///
/// [`Capabilities::detect`] reflects what this build can do; tests and
/// embedders may switch features off to exercise the fallback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// GIF output through the `image` crate's encoder.
    pub native_gif: bool,
    /// GIF output through the quantizing `gif` encoder.
    pub gif_library: bool,
    /// PDF output.
    pub document_composer: bool,
    /// ZIP bundling.
    pub archive: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            native_gif: ImageFormat::Gif.writing_enabled(),
            gif_library: true,
            document_composer: true,
            archive: true,
        }
    }

    /// Everything switched off.
    pub fn none() -> Self {
        Self {
            native_gif: false,
            gif_library: false,
            document_composer: false,
            archive: false,
        }
    }

    pub fn gif(&self) -> bool {
        self.native_gif || self.gif_library
    }

    /// Fail if producing `format` needs something that is not available.
    pub fn require_output(&self, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Gif if !self.gif() => {
                Err(ConversionError::MissingCapability(Capability::Gif))
            }
            OutputFormat::Pdf if !self.document_composer => Err(
                ConversionError::MissingCapability(Capability::DocumentComposer),
            ),
            _ => Ok(()),
        }
    }
}
