//! Format encoding: bitmap to the byte payload of a raster output format.

use crate::capabilities::Capabilities;
use crate::config::{OutputDescriptor, OutputFormat};
use crate::error::{Capability, ConversionError, Result};
use crate::fallback::{first_done, Attempt};
use crate::quality::{jpeg_quality, QualityPreset};
use crate::renderer::{apply_background, Bitmap, WHITE};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Everything the encoder needs to know about the requested output.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeTarget {
    pub format: OutputFormat,
    pub label: String,
    /// Lossy quality in `[0, 1]`.
    pub quality: f32,
    pub gif_sample_interval: i32,
}

impl EncodeTarget {
    /// The descriptor's quality override only applies to WebP; every other
    /// lossy format follows the preset.
    pub fn new(format: OutputFormat, descriptor: &OutputDescriptor, preset: &QualityPreset) -> Self {
        let quality = match (format, descriptor.quality_override) {
            (OutputFormat::Webp, Some(q)) => q,
            _ => preset.encoder_quality,
        };
        Self {
            format,
            label: descriptor.label.clone(),
            quality,
            gif_sample_interval: descriptor.sample_interval(),
        }
    }
}

/// Raster encoding strategies, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RasterStrategy {
    /// Format-specific encoder honouring quality and alpha settings.
    Dedicated,
    /// `DynamicImage::write_to` with default settings.
    Generic,
}

/// GIF encoding strategies in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GifStrategy {
    /// The `image` crate's GIF encoder.
    Native,
    /// Single-frame assembly with the `gif` crate's NeuQuant quantizer.
    Library,
}

/// Turns bitmaps into encoded files.
#[derive(Debug, Clone)]
pub struct FormatEncoder {
    capabilities: Capabilities,
}

impl FormatEncoder {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Encode a bitmap into a raster format.
    pub fn encode(&self, bitmap: &Bitmap, target: &EncodeTarget) -> Result<Vec<u8>> {
        match target.format {
            OutputFormat::Gif => self.encode_gif(bitmap, target),
            OutputFormat::Pdf => Err(ConversionError::EncodeFailed {
                format: target.label.clone(),
                message: "PDF pages are built by the document composer".to_string(),
            }),
            _ => encode_raster(bitmap, target),
        }
    }

    fn encode_gif(&self, bitmap: &Bitmap, target: &EncodeTarget) -> Result<Vec<u8>> {
        let chain = [GifStrategy::Native, GifStrategy::Library];
        let outcome = first_done(chain, |strategy| {
            let attempt = self.try_gif(strategy, bitmap, target.gif_sample_interval);
            if let Attempt::Unavailable(reason) = &attempt {
                debug!("{:?} GIF encoding unavailable: {}", strategy, reason);
            }
            attempt
        });
        match outcome {
            Attempt::Done(bytes) => Ok(bytes),
            _ if !self.capabilities.gif() => {
                Err(ConversionError::MissingCapability(Capability::Gif))
            }
            Attempt::Unavailable(reason) => Err(ConversionError::EncodeFailed {
                format: target.label.clone(),
                message: reason,
            }),
            Attempt::Cancelled => Err(ConversionError::EncodeFailed {
                format: target.label.clone(),
                message: "cancelled".to_string(),
            }),
        }
    }

    fn try_gif(&self, strategy: GifStrategy, bitmap: &Bitmap, sample_interval: i32) -> Attempt<Vec<u8>> {
        match strategy {
            GifStrategy::Native if !self.capabilities.native_gif => {
                Attempt::Unavailable("native GIF encoder not available".to_string())
            }
            GifStrategy::Native => match write_generic(&bitmap.pixels, ImageFormat::Gif) {
                Ok(bytes) => Attempt::Done(bytes),
                Err(e) => Attempt::Unavailable(e),
            },
            GifStrategy::Library if !self.capabilities.gif_library => {
                Attempt::Unavailable("GIF library not available".to_string())
            }
            GifStrategy::Library => match encode_gif_quantized(&bitmap.pixels, sample_interval) {
                Ok(bytes) => Attempt::Done(bytes),
                Err(e) => Attempt::Unavailable(e),
            },
        }
    }
}

fn encode_raster(bitmap: &Bitmap, target: &EncodeTarget) -> Result<Vec<u8>> {
    let chain = [RasterStrategy::Dedicated, RasterStrategy::Generic];
    let outcome = first_done(chain, |strategy| {
        let result = match strategy {
            RasterStrategy::Dedicated => encode_dedicated(bitmap, target),
            RasterStrategy::Generic => image_format(target.format)
                .ok_or_else(|| format!("no image format for {}", target.format))
                .and_then(|format| write_generic(&bitmap.pixels, format)),
        };
        match result {
            Ok(bytes) => Attempt::Done(bytes),
            Err(reason) => {
                debug!("{:?} {} encoding failed: {}", strategy, target.label, reason);
                Attempt::Unavailable(reason)
            }
        }
    });
    match outcome {
        Attempt::Done(bytes) => Ok(bytes),
        Attempt::Unavailable(message) => Err(ConversionError::EncodeFailed {
            format: target.label.clone(),
            message,
        }),
        Attempt::Cancelled => Err(ConversionError::EncodeFailed {
            format: target.label.clone(),
            message: "cancelled".to_string(),
        }),
    }
}

fn image_format(format: OutputFormat) -> Option<ImageFormat> {
    match format {
        OutputFormat::Jpg | OutputFormat::Jpeg => Some(ImageFormat::Jpeg),
        OutputFormat::Png => Some(ImageFormat::Png),
        OutputFormat::Webp => Some(ImageFormat::WebP),
        OutputFormat::Gif => Some(ImageFormat::Gif),
        OutputFormat::Pdf => None,
    }
}

fn encode_dedicated(bitmap: &Bitmap, target: &EncodeTarget) -> std::result::Result<Vec<u8>, String> {
    match target.format {
        OutputFormat::Jpg | OutputFormat::Jpeg => {
            encode_jpeg(&opaque_rgb(bitmap), jpeg_quality(target.quality))
        }
        OutputFormat::Png => encode_png(bitmap),
        OutputFormat::Webp => encode_webp(bitmap, target.quality),
        OutputFormat::Gif | OutputFormat::Pdf => {
            Err(format!("no dedicated encoder for {}", target.format))
        }
    }
}

/// Drop the alpha channel, flattening onto white first if it was kept.
fn opaque_rgb(bitmap: &Bitmap) -> RgbImage {
    if bitmap.alpha {
        DynamicImage::ImageRgba8(apply_background(bitmap.pixels.clone(), WHITE)).into_rgb8()
    } else {
        DynamicImage::ImageRgba8(bitmap.pixels.clone()).into_rgb8()
    }
}

/// Lossy WebP at a `[0, 1]` quality; alpha is kept when the bitmap has it.
pub fn encode_webp(bitmap: &Bitmap, quality: f32) -> std::result::Result<Vec<u8>, String> {
    let (w, h) = (bitmap.width(), bitmap.height());
    let quality = (quality.clamp(0.0, 1.0) * 100.0).max(1.0);
    let encoded = if bitmap.alpha {
        webp::Encoder::from_rgba(bitmap.pixels.as_raw(), w, h).encode_simple(false, quality)
    } else {
        let rgb = opaque_rgb(bitmap);
        webp::Encoder::from_rgb(rgb.as_raw(), w, h).encode_simple(false, quality)
    };
    encoded
        .map(|memory| memory.to_vec())
        .map_err(|e| format!("WebP encoding failed: {:?}", e))
}

/// Encode RGB pixels as baseline JPEG at a 1..=100 quality.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> std::result::Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| format!("Failed to write JPEG data: {}", e))?;
    Ok(buffer)
}

/// PNG encoding with the `png` crate for control over color type and compression.
fn encode_png(bitmap: &Bitmap) -> std::result::Result<Vec<u8>, String> {
    let mut buffer = Cursor::new(Vec::new());

    let (color, data) = if bitmap.alpha {
        (png::ColorType::Rgba, bitmap.pixels.as_raw().clone())
    } else {
        (png::ColorType::Rgb, opaque_rgb(bitmap).into_raw())
    };

    let mut encoder = png::Encoder::new(&mut buffer, bitmap.width(), bitmap.height());
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Fast); // Use fast compression for throughput

    let mut writer = encoder
        .write_header()
        .map_err(|e| format!("Failed to write PNG header: {}", e))?;

    writer
        .write_image_data(&data)
        .map_err(|e| format!("Failed to write PNG data: {}", e))?;

    drop(writer);

    Ok(buffer.into_inner())
}

fn write_generic(image: &RgbaImage, format: ImageFormat) -> std::result::Result<Vec<u8>, String> {
    let mut buffer = Cursor::new(Vec::new());
    let dynamic = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.clone()).into_rgb8())
    } else {
        DynamicImage::ImageRgba8(image.clone())
    };
    dynamic
        .write_to(&mut buffer, format)
        .map_err(|e| format!("{:?} encoder: {}", format, e))?;
    Ok(buffer.into_inner())
}

/// Assemble a single-frame GIF, quantizing with the given sampling interval.
fn encode_gif_quantized(image: &RgbaImage, sample_interval: i32) -> std::result::Result<Vec<u8>, String> {
    let width = u16::try_from(image.width())
        .map_err(|_| format!("width {} exceeds GIF limit", image.width()))?;
    let height = u16::try_from(image.height())
        .map_err(|_| format!("height {} exceeds GIF limit", image.height()))?;
    let speed = sample_interval.clamp(1, 30);

    let mut pixels = image.as_raw().clone();
    let frame = gif::Frame::from_rgba_speed(width, height, &mut pixels, speed);

    let mut buffer = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut buffer, width, height, &[])
            .map_err(|e| format!("Failed to start GIF: {}", e))?;
        encoder
            .write_frame(&frame)
            .map_err(|e| format!("Failed to write GIF frame: {}", e))?;
    }
    Ok(buffer)
}
