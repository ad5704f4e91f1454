//! PDF output: bitmaps become full-bleed JPEG pages.
//!
//! Pages are always embedded as DCT-compressed images at the preset's
//! quality, whatever the source format was. Each page is sized to its image
//! (one pixel maps to 0.75 pt), so a page is landscape exactly when the
//! image is at least as wide as it is tall.

use crate::encoder::encode_jpeg;
use crate::error::{ConversionError, Result};
use crate::renderer::{apply_background, Bitmap, WHITE};
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// PDF points per CSS pixel.
const POINTS_PER_PIXEL: f32 = 0.75;

/// One page's embedded image.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    /// Encode a bitmap as the JPEG payload of a page.
    pub fn from_bitmap(bitmap: &Bitmap, quality: u8) -> Result<Self> {
        let pixels = if bitmap.alpha {
            apply_background(bitmap.pixels.clone(), WHITE)
        } else {
            bitmap.pixels.clone()
        };
        let rgb = DynamicImage::ImageRgba8(pixels).into_rgb8();
        let jpeg = encode_jpeg(&rgb, quality).map_err(ConversionError::ComposeFailed)?;
        Ok(Self {
            jpeg,
            width: bitmap.width().max(1),
            height: bitmap.height().max(1),
        })
    }

    pub fn is_landscape(&self) -> bool {
        self.width >= self.height
    }

    /// Page size in points.
    pub fn media_box(&self) -> (f32, f32) {
        (
            self.width as f32 * POINTS_PER_PIXEL,
            self.height as f32 * POINTS_PER_PIXEL,
        )
    }
}

/// Accumulates pages into one PDF document.
pub struct DocumentComposer {
    document: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for DocumentComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentComposer {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Build a one-page document.
    pub fn single_page(page: &PageImage) -> Result<Vec<u8>> {
        let mut composer = Self::new();
        composer.append_page(page)?;
        composer.finish()
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kids.is_empty()
    }

    /// Add a page after the existing ones.
    pub fn append_page(&mut self, page: &PageImage) -> Result<()> {
        let (width, height) = page.media_box();

        let mut image_dict = Dictionary::new();
        image_dict.set("Type", Object::Name(b"XObject".to_vec()));
        image_dict.set("Subtype", Object::Name(b"Image".to_vec()));
        image_dict.set("Width", Object::Integer(page.width as i64));
        image_dict.set("Height", Object::Integer(page.height as i64));
        image_dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
        image_dict.set("BitsPerComponent", Object::Integer(8));
        image_dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        let mut image_stream = Stream::new(image_dict, page.jpeg.clone());
        image_stream.allows_compression = false;
        let image_id = self.document.add_object(image_stream);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(width),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(height),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_bytes = content
            .encode()
            .map_err(|e| ConversionError::ComposeFailed(format!("page content: {}", e)))?;
        let content_id = self
            .document
            .add_object(Stream::new(Dictionary::new(), content_bytes));

        let mut xobjects = Dictionary::new();
        xobjects.set("Im0", Object::Reference(image_id));
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        let mut page_dict = Dictionary::new();
        page_dict.set("Type", Object::Name(b"Page".to_vec()));
        page_dict.set("Parent", Object::Reference(self.pages_id));
        page_dict.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width),
                Object::Real(height),
            ]),
        );
        page_dict.set("Resources", Object::Dictionary(resources));
        page_dict.set("Contents", Object::Reference(content_id));
        let page_id = self.document.add_object(page_dict);

        self.kids.push(Object::Reference(page_id));
        debug!(
            "Appended page {} ({}x{} px, {})",
            self.kids.len(),
            page.width,
            page.height,
            if page.is_landscape() { "landscape" } else { "portrait" }
        );
        Ok(())
    }

    /// Serialize the document.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.kids.is_empty() {
            return Err(ConversionError::ComposeFailed(
                "document has no pages".to_string(),
            ));
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(self.kids.len() as i64));
        pages.set("Kids", Object::Array(std::mem::take(&mut self.kids)));
        self.document
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(self.pages_id));
        let catalog_id = self.document.add_object(catalog);
        self.document.trailer.set("Root", Object::Reference(catalog_id));

        self.document.compress();

        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|e| ConversionError::ComposeFailed(format!("save: {}", e)))?;
        Ok(output)
    }
}
