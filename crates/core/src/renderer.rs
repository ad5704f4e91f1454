//! Bitmap rendering: PDF pages via pdfium (Google's PDF engine) and whole
//! images via the `image` crate.
//!
//! Both paths return a [`Bitmap`] flattened onto opaque white unless the
//! caller asks to keep transparency.

use crate::classify::SourceFile;
use crate::error::{ConversionError, Result};
use crate::fallback::{first_done, Attempt};
use image::{DynamicImage, ImageFormat, RgbaImage};
use pdfium_render::prelude::*;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Background used when flattening transparency.
pub const WHITE: (u8, u8, u8) = (255, 255, 255);

/// A rendered page or decoded image.
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub pixels: RgbaImage,
    /// Whether transparency was preserved.
    pub alpha: bool,
}

impl Bitmap {
    /// Wrap an image, flattening it onto white unless `preserve_alpha`.
    pub fn new(pixels: RgbaImage, preserve_alpha: bool) -> Self {
        let pixels = if preserve_alpha {
            pixels
        } else {
            apply_background(pixels, WHITE)
        };
        Self {
            pixels,
            alpha: preserve_alpha,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_landscape(&self) -> bool {
        self.width() >= self.height()
    }
}

/// Apply background color to transparent areas.
pub fn apply_background(mut image: RgbaImage, (r, g, b): (u8, u8, u8)) -> RgbaImage {
    for pixel in image.pixels_mut() {
        let alpha = pixel[3] as f32 / 255.0;
        if alpha < 1.0 {
            // Blend with background
            let inv_alpha = 1.0 - alpha;
            pixel[0] = ((pixel[0] as f32 * alpha) + (r as f32 * inv_alpha)).round() as u8;
            pixel[1] = ((pixel[1] as f32 * alpha) + (g as f32 * inv_alpha)).round() as u8;
            pixel[2] = ((pixel[2] as f32 * alpha) + (b as f32 * inv_alpha)).round() as u8;
            pixel[3] = 255;
        }
    }
    image
}

/// Opens paginated documents.
pub trait DocumentReader {
    /// Decode a document once; pages are rendered from the returned handle.
    fn open(&self, name: &str, data: &[u8]) -> Result<Box<dyn PageSource>>;
}

/// A decoded document.
///
/// Handles are not shared across threads; pages are rendered one at a time
/// by the conversion flow that owns the queue entry.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Rasterize a 1-based page at `scale` pixels per PDF point.
    fn render_page(&self, page: usize, scale: f32) -> Result<RgbaImage>;
}

/// Render one document page as an opaque bitmap.
pub fn render_document_page(source: &dyn PageSource, page: usize, scale: f32) -> Result<Bitmap> {
    let pixels = source.render_page(page, scale)?;
    Ok(Bitmap::new(pixels, false))
}

/// [`DocumentReader`] backed by the pdfium library.
pub struct PdfiumReader {
    pdfium: &'static Pdfium,
}

/// Process-wide pdfium binding, or the reason it could not be loaded.
static PDFIUM: OnceLock<std::result::Result<Pdfium, String>> = OnceLock::new();

fn load_pdfium() -> std::result::Result<Pdfium, String> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/usr/lib"))
        })
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/usr/local/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| format!("Failed to load pdfium library: {}", e))?;
    info!("pdfium bound, PDF input available");
    Ok(Pdfium::new(bindings))
}

impl PdfiumReader {
    /// Bind the pdfium library.
    ///
    /// Tries `./`, `/usr/lib`, `/usr/local/lib`, then the system library.
    /// The first call loads the library for the whole process; later calls
    /// share that instance, or repeat the first failure.
    pub fn bind() -> Result<Self> {
        match PDFIUM.get_or_init(load_pdfium) {
            Ok(pdfium) => Ok(Self { pdfium }),
            Err(message) => Err(ConversionError::PdfiumError(message.clone())),
        }
    }

    /// Bind pdfium if possible, logging why not otherwise.
    pub fn try_bind() -> Option<Self> {
        match Self::bind() {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!("PDF input disabled: {}", e);
                None
            }
        }
    }
}

impl DocumentReader for PdfiumReader {
    fn open(&self, name: &str, data: &[u8]) -> Result<Box<dyn PageSource>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(data.to_vec(), None)
            .map_err(|e| ConversionError::DocumentLoad {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        debug!("Opened {} with {} pages", name, document.pages().len());
        Ok(Box::new(PdfiumDocument { document }))
    }
}

struct PdfiumDocument {
    document: PdfDocument<'static>,
}

impl PageSource for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&self, page: usize, scale: f32) -> Result<RgbaImage> {
        if page == 0 || page > self.page_count() {
            return Err(ConversionError::PageRender {
                page,
                message: format!("document has {} pages", self.page_count()),
            });
        }
        let pdf_page = self
            .document
            .pages()
            .get((page - 1) as u16)
            .map_err(|e| ConversionError::PageRender {
                page,
                message: e.to_string(),
            })?;

        let info = PageInfo {
            page_number: page,
            width_points: pdf_page.width().value,
            height_points: pdf_page.height().value,
        };
        let (width, height) = info.pixels_at_scale(scale);

        let render_config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .rotate_if_landscape(PdfPageRenderRotation::None, false);

        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| ConversionError::PageRender {
                page,
                message: e.to_string(),
            })?;

        Ok(bitmap.as_image().into_rgba8())
    }
}

/// Information about a single PDF page.
#[derive(Debug, Clone)]
pub struct PageInfo {
    /// Page number (1-indexed).
    pub page_number: usize,
    /// Width in PDF points (1/72 inch).
    pub width_points: f32,
    /// Height in PDF points (1/72 inch).
    pub height_points: f32,
}

impl PageInfo {
    /// Pixel size at a scale, never smaller than 1x1.
    pub fn pixels_at_scale(&self, scale: f32) -> (u32, u32) {
        let width = (self.width_points * scale).floor().max(1.0) as u32;
        let height = (self.height_points * scale).floor().max(1.0) as u32;
        (width, height)
    }
}

/// Ways of decoding an image file, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Format sniffed from the leading bytes.
    Sniffed,
    /// Format taken from the declared media type or extension.
    Declared,
}

impl DecodeStrategy {
    pub const CHAIN: [DecodeStrategy; 2] = [DecodeStrategy::Sniffed, DecodeStrategy::Declared];

    fn decode(&self, file: &SourceFile) -> Attempt<DynamicImage> {
        match self {
            DecodeStrategy::Sniffed => match image::load_from_memory(&file.data) {
                Ok(img) => Attempt::Done(img),
                Err(e) => Attempt::Unavailable(format!("sniffed decode: {}", e)),
            },
            DecodeStrategy::Declared => {
                let format = ImageFormat::from_mime_type(&file.mime_type)
                    .or_else(|| file.extension().and_then(ImageFormat::from_extension));
                match format {
                    Some(format) => match image::load_from_memory_with_format(&file.data, format) {
                        Ok(img) => Attempt::Done(img),
                        Err(e) => Attempt::Unavailable(format!("{:?} decode: {}", format, e)),
                    },
                    None => Attempt::Unavailable("no declared image format".to_string()),
                }
            }
        }
    }
}

/// Decode a whole image file, trying each [`DecodeStrategy`] in turn.
pub fn decode_image(file: &SourceFile, preserve_alpha: bool) -> Result<Bitmap> {
    let decoded = first_done(DecodeStrategy::CHAIN, |strategy| {
        let attempt = strategy.decode(file);
        if !attempt.is_done() {
            debug!("{:?} decode of {} failed, trying next", strategy, file.name);
        }
        attempt
    });
    match decoded {
        Attempt::Done(img) => Ok(Bitmap::new(img.into_rgba8(), preserve_alpha)),
        Attempt::Unavailable(reason) => Err(ConversionError::ImageDecode {
            name: file.name.clone(),
            message: reason,
        }),
        Attempt::Cancelled => Err(ConversionError::ImageDecode {
            name: file.name.clone(),
            message: "decode cancelled".to_string(),
        }),
    }
}
