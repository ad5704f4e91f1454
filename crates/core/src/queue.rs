//! The file queue: entries waiting for the next conversion run.

use crate::classify::{Classification, Classifier, InputKind, SourceFile};
use crate::encoder::encode_jpeg;
use crate::error::{ConversionError, Result};
use crate::renderer::{decode_image, render_document_page, Bitmap, DocumentReader, PageSource};
use crate::status::{self, StatusSink, Tone};
use image::DynamicImage;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest edge of an image thumbnail, in pixels.
const THUMBNAIL_EDGE: u32 = 320;
/// Render scale for the first page of a document preview.
const DOCUMENT_PREVIEW_SCALE: f32 = 1.1;
/// JPEG quality of thumbnails.
const THUMBNAIL_QUALITY: u8 = 75;

/// A preview image on disk, deleted when dropped.
#[derive(Debug)]
pub struct Thumbnail {
    file: NamedTempFile,
    pub width: u32,
    pub height: u32,
}

impl Thumbnail {
    fn from_bitmap(bitmap: &Bitmap) -> Result<Self> {
        let rgb = DynamicImage::ImageRgba8(bitmap.pixels.clone()).into_rgb8();
        let jpeg = encode_jpeg(&rgb, THUMBNAIL_QUALITY).map_err(|message| {
            ConversionError::EncodeFailed {
                format: "thumbnail".to_string(),
                message,
            }
        })?;
        let mut file = tempfile::Builder::new()
            .prefix("batch-convert-thumb-")
            .suffix(".jpg")
            .tempfile()?;
        file.write_all(&jpeg)?;
        file.flush()?;
        Ok(Self {
            file,
            width: rgb.width(),
            height: rgb.height(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// One queued source item.
pub struct FileEntry {
    pub id: Uuid,
    pub kind: InputKind,
    pub source: SourceFile,
    /// Display name.
    pub name: String,
    /// `Some(1)` for images; `None` for documents until they are opened.
    pub page_count: Option<usize>,
    pub thumbnail: Option<Thumbnail>,
    /// Pixel size, images only.
    pub dimensions: Option<(u32, u32)>,
    document: Option<Box<dyn PageSource>>,
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("page_count", &self.page_count)
            .field("thumbnail", &self.thumbnail)
            .field("dimensions", &self.dimensions)
            .field("document_open", &self.document.is_some())
            .finish()
    }
}

impl FileEntry {
    pub fn new(source: SourceFile, kind: InputKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: source.name.clone(),
            page_count: match kind {
                InputKind::Image => Some(1),
                InputKind::Document => None,
            },
            source,
            thumbnail: None,
            dimensions: None,
            document: None,
        }
    }

    /// First characters of the id, used when a name sanitizes to nothing.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string().chars().take(7).collect()
    }

    /// Work units this entry contributes to progress.
    pub fn work_units(&self) -> usize {
        self.page_count.unwrap_or(0).max(1)
    }

    /// Decode the document once and keep the handle on the entry.
    pub fn open_document(&mut self, reader: &dyn DocumentReader) -> Result<&dyn PageSource> {
        let document = match self.document.take() {
            Some(document) => document,
            None => {
                debug!("Opening document {}", self.name);
                reader.open(&self.name, &self.source.data)?
            }
        };
        self.page_count = Some(document.page_count());
        Ok(&**self.document.insert(document))
    }

    /// Replace the thumbnail; the previous file is removed.
    pub fn set_thumbnail(&mut self, thumbnail: Thumbnail) {
        self.thumbnail = Some(thumbnail);
    }

    /// Resolve page count, dimensions and thumbnail.
    pub fn prepare_preview(&mut self, reader: Option<&dyn DocumentReader>) -> Result<()> {
        let preview = match self.kind {
            InputKind::Image => {
                let bitmap = decode_image(&self.source, false)?;
                self.dimensions = Some((bitmap.width(), bitmap.height()));
                let (w, h) = fit_within(bitmap.width(), bitmap.height(), THUMBNAIL_EDGE);
                Bitmap::new(image::imageops::thumbnail(&bitmap.pixels, w, h), false)
            }
            InputKind::Document => {
                let reader = reader.ok_or(ConversionError::MissingCapability(
                    crate::error::Capability::DocumentReader,
                ))?;
                let document = self.open_document(reader)?;
                render_document_page(document, 1, DOCUMENT_PREVIEW_SCALE)?
            }
        };
        self.set_thumbnail(Thumbnail::from_bitmap(&preview)?);
        Ok(())
    }
}

/// Largest size with the same aspect ratio whose longest edge is at most `edge`.
fn fit_within(width: u32, height: u32, edge: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= edge {
        return (width.max(1), height.max(1));
    }
    let ratio = edge as f64 / longest as f64;
    (
        ((width as f64 * ratio).round() as u32).max(1),
        ((height as f64 * ratio).round() as u32).max(1),
    )
}

/// What happened to a batch of added files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeReport {
    pub added: usize,
    /// Documents skipped because no reader is available.
    pub skipped_documents: Vec<String>,
    pub unsupported: Vec<String>,
    /// Accepted files whose preview could not be produced.
    pub failed: Vec<String>,
}

impl IntakeReport {
    /// Post the summary status for this batch.
    pub fn announce(&self, sink: &dyn StatusSink, action: &str, description: Option<&str>) {
        if self.added > 0 {
            let mut parts = vec![status::files_ready(action)];
            if !self.skipped_documents.is_empty() {
                parts.push(status::skipped_documents(self.skipped_documents.len()));
            }
            if !self.unsupported.is_empty() {
                parts.push(status::skipped_unsupported(self.unsupported.len()));
            }
            let tone = if parts.len() > 1 { Tone::Warn } else { Tone::Success };
            sink.status(&parts.join(" "), tone);
        } else if !self.skipped_documents.is_empty() {
            sink.status(status::MISSING_PDF_READER, Tone::Error);
        } else if !self.unsupported.is_empty() {
            sink.status(&status::unsupported_files(&self.unsupported, description), Tone::Warn);
        } else {
            sink.status(status::NO_VALID_FILES, Tone::Info);
        }
    }
}

/// Files and page counts currently queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionSummary {
    pub files: usize,
    pub items: usize,
}

impl fmt::Display for SelectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}, {} {}",
            self.files,
            if self.files == 1 { "file" } else { "files" },
            self.items,
            if self.items == 1 { "image" } else { "images" }
        )
    }
}

/// Ordered queue of entries. Mutated only between runs.
#[derive(Debug, Default)]
pub struct FileQueue {
    entries: Vec<FileEntry>,
}

impl FileQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify files and queue the accepted ones with their previews.
    pub fn add_files(
        &mut self,
        files: Vec<SourceFile>,
        classifier: &Classifier,
        reader: Option<&dyn DocumentReader>,
        sink: &dyn StatusSink,
    ) -> IntakeReport {
        let mut report = IntakeReport::default();
        for file in files {
            let kind = match classifier.classify(&file) {
                Classification::Accepted(kind) => kind,
                Classification::SkippedNoReader => {
                    report.skipped_documents.push(file.name);
                    continue;
                }
                Classification::Unsupported => {
                    report.unsupported.push(file.name);
                    continue;
                }
            };
            let mut entry = FileEntry::new(file, kind);
            match entry.prepare_preview(reader) {
                Ok(()) => {
                    debug!(
                        "Queued {} ({:?}, {:?} pages)",
                        entry.name, entry.kind, entry.page_count
                    );
                    self.entries.push(entry);
                    report.added += 1;
                }
                Err(e) => {
                    warn!("Cannot process {} for preview: {}", entry.name, e);
                    sink.status(&status::could_not_process(&entry.name), Tone::Error);
                    report.failed.push(entry.name);
                }
            }
        }
        report
    }

    /// Append an already prepared entry.
    pub fn push(&mut self, entry: FileEntry) {
        self.entries.push(entry);
    }

    /// Remove one entry, releasing its thumbnail.
    pub fn remove(&mut self, id: Uuid, sink: &dyn StatusSink) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            sink.status(status::FILE_REMOVED, Tone::Info);
        }
        removed
    }

    /// Drop entries by id without reporting.
    pub fn remove_all(&mut self, ids: &[Uuid]) {
        self.entries.retain(|e| !ids.contains(&e.id));
    }

    pub fn clear(&mut self, sink: &dyn StatusSink) {
        self.entries.clear();
        sink.status(status::LIST_CLEARED, Tone::Info);
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut FileEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of work units, falling back to the entry count when that is zero.
    pub fn total_work_units(&self) -> usize {
        let sum: usize = self.entries.iter().map(FileEntry::work_units).sum();
        if sum == 0 {
            self.entries.len()
        } else {
            sum
        }
    }

    pub fn summary(&self) -> SelectionSummary {
        SelectionSummary {
            files: self.entries.len(),
            items: self.entries.iter().map(FileEntry::work_units).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputConfig;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, Tone)>>);

    impl StatusSink for Recorder {
        fn emit(&self, event: status::StatusEvent) {
            if let status::StatusEvent::Status { text, tone } = event {
                self.0.lock().unwrap().push((text, tone));
            }
        }
    }

    impl Recorder {
        fn last(&self) -> (String, Tone) {
            self.0.lock().unwrap().last().cloned().unwrap()
        }
    }

    fn png(name: &str, w: u32, h: u32) -> SourceFile {
        let img = RgbaImage::from_pixel(w, h, Rgba([9, 9, 9, 255]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        SourceFile::new(name, "image/png", buf.into_inner())
    }

    fn classifier(allow_documents: bool, reader: bool) -> Classifier {
        Classifier::new(&InputConfig::default(), allow_documents, reader)
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(100, 50, 320), (100, 50));
        assert_eq!(fit_within(1000, 500, 320), (320, 160));
        assert_eq!(fit_within(10, 4000, 320), (1, 320));
    }

    #[test]
    fn test_add_images_builds_previews() {
        let sink = Recorder::default();
        let mut queue = FileQueue::new();
        let report = queue.add_files(
            vec![png("a.png", 800, 400), png("b.png", 4, 4)],
            &classifier(false, false),
            None,
            &sink,
        );
        assert_eq!(report.added, 2);
        let first = &queue.entries()[0];
        assert_eq!(first.dimensions, Some((800, 400)));
        assert_eq!(first.page_count, Some(1));
        let thumb = first.thumbnail.as_ref().unwrap();
        assert_eq!((thumb.width, thumb.height), (320, 160));
        assert!(thumb.path().exists());

        report.announce(&sink, "Convert to JPG", None);
        assert_eq!(
            sink.last(),
            ("Files are ready, click \"Convert to JPG\".".to_string(), Tone::Success)
        );
    }

    #[test]
    fn test_thumbnail_released_on_remove() {
        let sink = Recorder::default();
        let mut queue = FileQueue::new();
        queue.add_files(vec![png("a.png", 4, 4)], &classifier(false, false), None, &sink);
        let id = queue.entries()[0].id;
        let path = queue.entries()[0].thumbnail.as_ref().unwrap().path().to_path_buf();
        assert!(queue.remove(id, &sink));
        assert!(!path.exists());
        assert_eq!(sink.last().0, status::FILE_REMOVED);
        assert!(!queue.remove(id, &sink));
    }

    #[test]
    fn test_clear_releases_everything() {
        let sink = Recorder::default();
        let mut queue = FileQueue::new();
        queue.add_files(
            vec![png("a.png", 4, 4), png("b.png", 4, 4)],
            &classifier(false, false),
            None,
            &sink,
        );
        let paths: Vec<_> = queue
            .entries()
            .iter()
            .map(|e| e.thumbnail.as_ref().unwrap().path().to_path_buf())
            .collect();
        queue.clear(&sink);
        assert!(queue.is_empty());
        assert!(paths.iter().all(|p| !p.exists()));
        assert_eq!(sink.last(), (status::LIST_CLEARED.to_string(), Tone::Info));
    }

    #[test]
    fn test_broken_image_is_dropped_with_message() {
        let sink = Recorder::default();
        let mut queue = FileQueue::new();
        let broken = SourceFile::new("bad.png", "image/png", b"nope".to_vec());
        let report = queue.add_files(vec![broken], &classifier(false, false), None, &sink);
        assert_eq!(report.added, 0);
        assert_eq!(report.failed, vec!["bad.png".to_string()]);
        assert!(queue.is_empty());
        assert_eq!(
            sink.last(),
            ("Could not process file bad.png.".to_string(), Tone::Error)
        );
    }

    #[test]
    fn test_intake_report_messages() {
        let sink = Recorder::default();
        let mut queue = FileQueue::new();
        let files = vec![
            png("a.png", 2, 2),
            SourceFile::new("doc.pdf", "application/pdf", b"%PDF".to_vec()),
            SourceFile::new("notes.txt", "text/plain", b"x".to_vec()),
        ];
        let report = queue.add_files(files, &classifier(true, false), None, &sink);
        assert_eq!(report.skipped_documents, vec!["doc.pdf".to_string()]);
        assert_eq!(report.unsupported, vec!["notes.txt".to_string()]);
        report.announce(&sink, "Go", None);
        let (text, tone) = sink.last();
        assert_eq!(tone, Tone::Warn);
        assert_eq!(
            text,
            "Files are ready, click \"Go\". Skipped 1 PDF file(s) because the reader is missing. Skipped 1 unsupported file(s)."
        );

        let only_docs = IntakeReport {
            skipped_documents: vec!["x.pdf".into()],
            ..Default::default()
        };
        only_docs.announce(&sink, "Go", None);
        assert_eq!(sink.last(), (status::MISSING_PDF_READER.to_string(), Tone::Error));

        IntakeReport::default().announce(&sink, "Go", None);
        assert_eq!(sink.last(), (status::NO_VALID_FILES.to_string(), Tone::Info));
    }

    #[test]
    fn test_work_units_and_summary() {
        let mut queue = FileQueue::new();
        let mut doc = FileEntry::new(
            SourceFile::new("d.pdf", "application/pdf", Vec::<u8>::new()),
            InputKind::Document,
        );
        assert_eq!(doc.work_units(), 1);
        doc.page_count = Some(3);
        queue.push(doc);
        queue.push(FileEntry::new(png("a.png", 1, 1), InputKind::Image));
        assert_eq!(queue.total_work_units(), 4);
        assert_eq!(queue.summary().to_string(), "2 files, 4 images");

        let single = SelectionSummary { files: 1, items: 1 };
        assert_eq!(single.to_string(), "1 file, 1 image");
    }

    #[test]
    fn test_short_id() {
        let entry = FileEntry::new(png("a.png", 1, 1), InputKind::Image);
        assert_eq!(entry.short_id().len(), 7);
    }
}
