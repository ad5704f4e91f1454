//! End-to-end runs of the conversion pipeline.
//!
//! PDF input goes through a stub reader so these tests do not need the
//! pdfium library.
//!
//! Run with: cargo test --package batch-convert-core --test pipeline_tests

use batch_convert_core::{
    status, Attempt, Capabilities, Capability, ConversionError, Converter, ConverterConfig,
    DocumentReader, OutputFormat, PageSource, RunOutcome, SaveDialog, SourceFile, StatusEvent,
    StatusSink, Tone,
};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ========== Test collaborators ==========

/// Records every status event.
#[derive(Default)]
struct Recorder(Mutex<Vec<StatusEvent>>);

impl StatusSink for Recorder {
    fn emit(&self, event: StatusEvent) {
        self.0.lock().unwrap().push(event);
    }
}

impl Recorder {
    fn statuses(&self) -> Vec<(String, Tone)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                StatusEvent::Status { text, tone } => Some((text.clone(), *tone)),
                StatusEvent::Progress(_) => None,
            })
            .collect()
    }

    fn last_status(&self) -> (String, Tone) {
        self.statuses().last().cloned().unwrap()
    }

    fn progress(&self) -> Vec<u8> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                StatusEvent::Progress(p) => Some(*p),
                StatusEvent::Status { .. } => None,
            })
            .collect()
    }
}

/// Dialog with fixed answers.
struct Scripted {
    file: Attempt<PathBuf>,
    directory: Attempt<PathBuf>,
}

impl SaveDialog for Scripted {
    fn pick_file(&self, _suggested_name: &str, _mime_type: &str) -> Attempt<PathBuf> {
        self.file.clone()
    }

    fn pick_directory(&self) -> Attempt<PathBuf> {
        self.directory.clone()
    }
}

fn unavailable() -> Attempt<PathBuf> {
    Attempt::Unavailable("not offered".to_string())
}

/// Reader whose documents have a page count encoded in the file contents.
struct StubReader;

struct StubDocument {
    pages: usize,
}

impl DocumentReader for StubReader {
    fn open(&self, name: &str, data: &[u8]) -> batch_convert_core::Result<Box<dyn PageSource>> {
        let text = String::from_utf8_lossy(data);
        let pages = text
            .strip_prefix("%PDF-stub ")
            .and_then(|n| n.trim().parse().ok())
            .ok_or_else(|| ConversionError::DocumentLoad {
                name: name.to_string(),
                message: "not a stub document".to_string(),
            })?;
        Ok(Box::new(StubDocument { pages }))
    }
}

impl PageSource for StubDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn render_page(&self, page: usize, scale: f32) -> batch_convert_core::Result<RgbaImage> {
        let w = (12.0 * scale).round() as u32;
        let h = (16.0 * scale).round() as u32;
        Ok(RgbaImage::from_pixel(w, h, Rgba([(page * 40) as u8, 0, 0, 255])))
    }
}

// ========== Fixtures ==========

fn png_file(name: &str, w: u32, h: u32) -> SourceFile {
    let mut img = RgbaImage::new(w, h);
    for (x, y, p) in img.enumerate_pixels_mut() {
        *p = Rgba([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8, 255]);
    }
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    SourceFile::new(name, "image/png", buf.into_inner())
}

fn pdf_file(name: &str, pages: usize) -> SourceFile {
    SourceFile::new(
        name,
        "application/pdf",
        format!("%PDF-stub {}", pages).into_bytes(),
    )
}

struct Harness {
    converter: Converter,
    sink: Arc<Recorder>,
    downloads: PathBuf,
    _tmp: TempDir,
}

fn harness(config: ConverterConfig, dialog: Scripted, capabilities: Capabilities) -> (Harness, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let downloads = tmp.path().join("downloads");
    let chosen = tmp.path().join("chosen");
    let sink = Arc::new(Recorder::default());
    let dialog = Scripted {
        file: match dialog.file {
            Attempt::Done(name) => Attempt::Done(chosen.join(name)),
            other => other,
        },
        directory: match dialog.directory {
            Attempt::Done(_) => Attempt::Done(chosen.clone()),
            other => other,
        },
    };
    let converter = Converter::builder()
        .config(config.allow_document_input(true))
        .capabilities(capabilities)
        .document_reader(StubReader)
        .dialog(Arc::new(dialog))
        .downloads_dir(&downloads)
        .status_sink(sink.clone())
        .build()
        .unwrap();
    (
        Harness {
            converter,
            sink,
            downloads,
            _tmp: tmp,
        },
        chosen,
    )
}

fn directory_dialog() -> Scripted {
    Scripted {
        file: unavailable(),
        directory: Attempt::Done(PathBuf::new()),
    }
}

fn no_dialog() -> Scripted {
    Scripted {
        file: unavailable(),
        directory: unavailable(),
    }
}

fn files_under(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries {
            let entry = entry.unwrap();
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().unwrap().is_dir() {
                names.extend(
                    files_under(&entry.path())
                        .into_iter()
                        .map(|n| format!("{}/{}", name, n)),
                );
            } else {
                names.push(name);
            }
        }
    }
    names.sort();
    names
}

// ========== Raster output tests ==========

#[tokio::test]
async fn test_document_pages_become_numbered_files() {
    let (mut h, chosen) = harness(
        ConverterConfig::default(),
        directory_dialog(),
        Capabilities::detect(),
    );
    h.converter.set_output_format(OutputFormat::Png);
    h.converter.add_files(vec![pdf_file("Doc.pdf", 3)]);
    assert_eq!(h.converter.queue().entries()[0].page_count, Some(3));

    let outcome = h.converter.run().await.unwrap();
    match outcome {
        RunOutcome::Delivered { artifacts, .. } => assert_eq!(artifacts, 3),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(
        files_under(&chosen),
        vec![
            "converter-png/doc-page-001.png",
            "converter-png/doc-page-002.png",
            "converter-png/doc-page-003.png",
        ]
    );
    let first = image::open(chosen.join("converter-png/doc-page-001.png")).unwrap();
    // 12x16 pt at 150 dpi
    assert_eq!((first.width(), first.height()), (25, 33));
}

#[tokio::test]
async fn test_separate_artifact_count_matches_work_units() {
    let (mut h, chosen) = harness(
        ConverterConfig::default(),
        directory_dialog(),
        Capabilities::detect(),
    );
    h.converter.set_output_format(OutputFormat::Webp);
    h.converter.add_files(vec![
        png_file("a.png", 8, 8),
        pdf_file("b.pdf", 2),
        png_file("c.png", 5, 9),
        pdf_file("d.pdf", 1),
    ]);
    let expected = h.converter.stats().work_units;
    assert_eq!(expected, 5);

    let outcome = h.converter.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Delivered { artifacts: 5, .. }));
    assert_eq!(
        files_under(&chosen),
        vec![
            "converter-webp/a.webp",
            "converter-webp/b-page-001.webp",
            "converter-webp/b-page-002.webp",
            "converter-webp/c.webp",
            "converter-webp/d.webp",
        ]
    );
}

#[tokio::test]
async fn test_colliding_names_get_numeric_suffixes() {
    let (mut h, chosen) = harness(
        ConverterConfig::default(),
        directory_dialog(),
        Capabilities::detect(),
    );
    h.converter.add_files(vec![
        png_file("Photo.png", 4, 4),
        png_file("photo.webp", 4, 4),
        png_file("PHOTO.gif", 4, 4),
    ]);
    h.converter.run().await.unwrap();
    assert_eq!(
        files_under(&chosen),
        vec![
            "converter-jpg/photo-2.jpg",
            "converter-jpg/photo-3.jpg",
            "converter-jpg/photo.jpg",
        ]
    );
}

#[tokio::test]
async fn test_generated_suffix_does_not_clash_with_literal_name() {
    let (mut h, _) = harness(ConverterConfig::default(), no_dialog(), Capabilities::detect());
    h.converter.set_output_format(OutputFormat::Png);
    h.converter.add_files(vec![
        png_file("a.png", 4, 4),
        png_file("a.png", 5, 5),
        png_file("a-2.png", 6, 6),
    ]);
    let outcome = h.converter.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Delivered { artifacts: 3, .. }));
    assert_eq!(h.sink.last_status().1, Tone::Success);

    let downloads = files_under(&h.downloads);
    assert_eq!(downloads.len(), 1);
    let file = std::fs::File::open(h.downloads.join(&downloads[0])).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entries: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            "converter-png/a-2-2.png",
            "converter-png/a-2.png",
            "converter-png/a.png",
        ]
    );
}

#[tokio::test]
async fn test_single_artifact_downloads_when_dialog_unavailable() {
    let (mut h, _) = harness(ConverterConfig::default(), no_dialog(), Capabilities::detect());
    h.converter.add_files(vec![png_file("Ảnh Đẹp.png", 6, 6)]);
    let outcome = h.converter.run().await.unwrap();
    let RunOutcome::Delivered { paths, summary, .. } = outcome else {
        panic!("expected delivery");
    };
    assert_eq!(paths, vec![h.downloads.join("anh-đep.jpg")]);
    assert_eq!(
        summary,
        "Done. File \"anh-đep.jpg\" downloaded. Check your downloads folder to open the file."
    );
    assert_eq!(h.sink.last_status(), (summary, Tone::Success));
}

#[tokio::test]
async fn test_many_artifacts_bundle_into_zip() {
    let (mut h, _) = harness(ConverterConfig::default(), no_dialog(), Capabilities::detect());
    h.converter.set_output_format(OutputFormat::Png);
    h.converter
        .add_files(vec![png_file("a.png", 4, 4), pdf_file("b.pdf", 2)]);
    h.converter.run().await.unwrap();

    let downloads = files_under(&h.downloads);
    assert_eq!(downloads.len(), 1);
    assert!(downloads[0].starts_with("converter-png-") && downloads[0].ends_with(".zip"));

    let file = std::fs::File::open(h.downloads.join(&downloads[0])).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entries: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            "converter-png/a.png",
            "converter-png/b-page-001.png",
            "converter-png/b-page-002.png",
        ]
    );
}

// ========== PDF output tests ==========

fn media_boxes(bytes: &[u8]) -> Vec<(f32, f32)> {
    let doc = lopdf::Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let mb = doc
                .get_dictionary(*id)
                .unwrap()
                .get(b"MediaBox")
                .unwrap()
                .as_array()
                .unwrap()
                .clone();
            (mb[2].as_float().unwrap(), mb[3].as_float().unwrap())
        })
        .collect()
}

#[tokio::test]
async fn test_merged_pdf_keeps_enqueue_order() {
    let (mut h, _) = harness(ConverterConfig::default(), no_dialog(), Capabilities::detect());
    h.converter.set_output_format(OutputFormat::Pdf);
    h.converter.set_merge_mode("merged");
    h.converter
        .add_files(vec![png_file("wide.png", 40, 20), png_file("tall.png", 20, 40)]);

    let outcome = h.converter.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Delivered { artifacts: 1, .. }));
    assert!(h
        .sink
        .statuses()
        .iter()
        .any(|(text, _)| text == status::MERGING_PDF));

    let bytes = std::fs::read(h.downloads.join("converter-2-files.pdf")).unwrap();
    assert_eq!(media_boxes(&bytes), vec![(30.0, 15.0), (15.0, 30.0)]);
}

#[tokio::test]
async fn test_merged_pdf_of_one_source_uses_its_name() {
    let (mut h, chosen) = harness(
        ConverterConfig::default(),
        Scripted {
            file: Attempt::Done(PathBuf::from("picked.pdf")),
            directory: unavailable(),
        },
        Capabilities::detect(),
    );
    h.converter.set_output_format(OutputFormat::Pdf);
    h.converter.add_files(vec![pdf_file("Quarterly Report.pdf", 3)]);
    let outcome = h.converter.run().await.unwrap();
    let RunOutcome::Delivered { summary, .. } = outcome else {
        panic!("expected delivery");
    };
    assert!(summary.contains("\"quarterly-report.pdf\""));
    let bytes = std::fs::read(chosen.join("picked.pdf")).unwrap();
    assert_eq!(media_boxes(&bytes).len(), 3);
}

#[tokio::test]
async fn test_separate_pdf_one_document_per_page() {
    let (mut h, chosen) = harness(
        ConverterConfig::default(),
        directory_dialog(),
        Capabilities::detect(),
    );
    h.converter.set_output_format(OutputFormat::Pdf);
    h.converter.set_merge_mode("separate");
    h.converter
        .add_files(vec![png_file("a.png", 10, 10), pdf_file("b.pdf", 2)]);
    let outcome = h.converter.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Delivered { artifacts: 3, .. }));
    let files = files_under(&chosen);
    assert_eq!(
        files,
        vec![
            "converter-pdf/a.pdf",
            "converter-pdf/b-page-001.pdf",
            "converter-pdf/b-page-002.pdf",
        ]
    );
    for file in files {
        let bytes = std::fs::read(chosen.join(file)).unwrap();
        assert_eq!(media_boxes(&bytes).len(), 1);
    }
}

/// PDF pages embed a lossy JPEG even when the source was a lossless PNG.
#[tokio::test]
async fn test_pdf_pages_are_embedded_as_jpeg() {
    let (mut h, _) = harness(ConverterConfig::default(), no_dialog(), Capabilities::detect());
    h.converter.set_output_format(OutputFormat::Pdf);
    h.converter.add_files(vec![png_file("detail.png", 16, 16)]);
    h.converter.run().await.unwrap();

    let bytes = std::fs::read(h.downloads.join("detail.pdf")).unwrap();
    let doc = lopdf::Document::load_mem(&bytes).unwrap();
    let filters: Vec<Vec<u8>> = doc
        .objects
        .values()
        .filter_map(|obj| match obj {
            lopdf::Object::Stream(s)
                if s.dict.get(b"Subtype").and_then(|o| o.as_name()).ok()
                    == Some(&b"Image"[..]) =>
            {
                s.dict
                    .get(b"Filter")
                    .and_then(|f| f.as_name())
                    .ok()
                    .map(|n| n.to_vec())
            }
            _ => None,
        })
        .collect();
    assert_eq!(filters, vec![b"DCTDecode".to_vec()]);
}

// ========== Failure handling tests ==========

#[tokio::test]
async fn test_gif_without_encoders_aborts_before_processing() {
    let caps = Capabilities {
        native_gif: false,
        gif_library: false,
        ..Capabilities::detect()
    };
    let (mut h, chosen) = harness(ConverterConfig::default(), directory_dialog(), caps);
    h.converter.set_output_format(OutputFormat::Gif);
    h.converter.add_files(vec![png_file("a.png", 4, 4), png_file("b.png", 4, 4)]);

    let err = h.converter.run().await.unwrap_err();
    assert!(matches!(err, ConversionError::MissingCapability(Capability::Gif)));
    assert_eq!(err.to_string(), "no GIF capability available");
    assert_eq!(
        h.sink.last_status(),
        (status::MISSING_GIF_ENCODER.to_string(), Tone::Error)
    );
    assert!(h.sink.progress().is_empty());
    assert!(files_under(&chosen).is_empty());
    assert!(files_under(&h.downloads).is_empty());
    assert_eq!(h.converter.queue().len(), 2);
    assert!(!h.converter.state().active);
}

#[tokio::test]
async fn test_gif_library_fallback_is_used() {
    let caps = Capabilities {
        native_gif: false,
        ..Capabilities::detect()
    };
    let (mut h, _) = harness(ConverterConfig::default(), no_dialog(), caps);
    h.converter.set_output_format(OutputFormat::Gif);
    h.converter.add_files(vec![png_file("a.png", 9, 7)]);
    h.converter.run().await.unwrap();
    let bytes = std::fs::read(h.downloads.join("a.gif")).unwrap();
    assert_eq!(&bytes[0..3], b"GIF");
}

#[tokio::test]
async fn test_directory_cancel_delivers_nothing() {
    let (mut h, chosen) = harness(
        ConverterConfig::default(),
        Scripted {
            file: unavailable(),
            directory: Attempt::Cancelled,
        },
        Capabilities::detect(),
    );
    h.converter
        .add_files(vec![png_file("a.png", 4, 4), png_file("b.png", 4, 4)]);
    let outcome = h.converter.run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(
        h.sink.last_status(),
        (status::SAVE_CANCELED.to_string(), Tone::Info)
    );
    assert!(files_under(&chosen).is_empty());
    assert!(files_under(&h.downloads).is_empty());
}

#[tokio::test]
async fn test_single_file_cancel_delivers_nothing() {
    let (mut h, _) = harness(
        ConverterConfig::default(),
        Scripted {
            file: Attempt::Cancelled,
            directory: unavailable(),
        },
        Capabilities::detect(),
    );
    h.converter.add_files(vec![png_file("a.png", 4, 4)]);
    assert_eq!(h.converter.run().await.unwrap(), RunOutcome::Cancelled);
    assert!(files_under(&h.downloads).is_empty());
}

struct FailingReader;

struct FailingDocument;

impl DocumentReader for FailingReader {
    fn open(&self, _name: &str, _data: &[u8]) -> batch_convert_core::Result<Box<dyn PageSource>> {
        Ok(Box::new(FailingDocument))
    }
}

impl PageSource for FailingDocument {
    fn page_count(&self) -> usize {
        2
    }

    fn render_page(&self, page: usize, _scale: f32) -> batch_convert_core::Result<RgbaImage> {
        if page == 2 {
            Err(ConversionError::PageRender {
                page,
                message: "broken page".to_string(),
            })
        } else {
            Ok(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])))
        }
    }
}

#[tokio::test]
async fn test_render_failure_drops_whole_item() {
    let tmp = TempDir::new().unwrap();
    let chosen = tmp.path().join("chosen");
    let sink = Arc::new(Recorder::default());
    let mut converter = Converter::builder()
        .config(ConverterConfig::for_output(OutputFormat::Png).allow_document_input(true))
        .document_reader(FailingReader)
        .dialog(Arc::new(Scripted {
            file: unavailable(),
            directory: Attempt::Done(chosen.clone()),
        }))
        .downloads_dir(tmp.path().join("downloads"))
        .status_sink(sink.clone())
        .build()
        .unwrap();
    converter.add_files(vec![
        png_file("good.png", 4, 4),
        pdf_file("broken.pdf", 2),
        png_file("also-good.png", 4, 4),
    ]);
    assert_eq!(converter.queue().len(), 3);

    let outcome = converter.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Delivered { artifacts: 2, .. }));
    assert_eq!(
        files_under(&chosen),
        vec!["converter-png/also-good.png", "converter-png/good.png"]
    );
    assert!(sink
        .statuses()
        .contains(&("Could not process file broken.pdf.".to_string(), Tone::Error)));
    let remaining: Vec<&str> = converter
        .queue()
        .entries()
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(remaining, vec!["good.png", "also-good.png"]);
}

#[tokio::test]
async fn test_failed_item_does_not_consume_a_name() {
    let tmp = TempDir::new().unwrap();
    let chosen = tmp.path().join("chosen");
    let mut converter = Converter::builder()
        .config(ConverterConfig::for_output(OutputFormat::Png).allow_document_input(true))
        .document_reader(FailingReader)
        .dialog(Arc::new(Scripted {
            file: unavailable(),
            directory: Attempt::Done(chosen.clone()),
        }))
        .downloads_dir(tmp.path().join("downloads"))
        .status_sink(Arc::new(Recorder::default()))
        .build()
        .unwrap();
    converter.add_files(vec![
        png_file("scan.png", 4, 4),
        pdf_file("scan.pdf", 2),
        png_file("scan.png", 4, 4),
    ]);
    converter.run().await.unwrap();
    assert_eq!(
        files_under(&chosen),
        vec!["converter-png/scan-2.png", "converter-png/scan.png"]
    );
}

#[tokio::test]
async fn test_merged_pdf_drops_document_with_failing_page() {
    let tmp = TempDir::new().unwrap();
    let downloads = tmp.path().join("downloads");
    let sink = Arc::new(Recorder::default());
    let mut converter = Converter::builder()
        .config(ConverterConfig::for_output(OutputFormat::Pdf).allow_document_input(true))
        .document_reader(FailingReader)
        .dialog(Arc::new(no_dialog()))
        .downloads_dir(&downloads)
        .status_sink(sink.clone())
        .build()
        .unwrap();
    converter.set_merge_mode("merged");
    converter.add_files(vec![
        png_file("first.png", 8, 8),
        pdf_file("broken.pdf", 2),
        png_file("last.png", 8, 8),
    ]);

    let outcome = converter.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Delivered { artifacts: 1, .. }));
    assert!(sink
        .statuses()
        .contains(&("Could not process file broken.pdf.".to_string(), Tone::Error)));
    assert_eq!(files_under(&downloads), vec!["converter-2-files.pdf"]);
    let bytes = std::fs::read(downloads.join("converter-2-files.pdf")).unwrap();
    let doc = lopdf::Document::load_mem(&bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
}

#[tokio::test]
async fn test_nothing_converted_reports_empty() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(Recorder::default());
    let mut converter = Converter::builder()
        .config(ConverterConfig::for_output(OutputFormat::Png).allow_document_input(true))
        .document_reader(FailingReader)
        .dialog(Arc::new(no_dialog()))
        .downloads_dir(tmp.path())
        .status_sink(sink.clone())
        .build()
        .unwrap();
    converter.add_files(vec![pdf_file("broken.pdf", 2)]);
    assert_eq!(converter.run().await.unwrap(), RunOutcome::Empty);
    assert_eq!(
        sink.last_status(),
        (status::NOTHING_CONVERTED.to_string(), Tone::Warn)
    );
    assert!(converter.queue().is_empty());
}

#[tokio::test]
async fn test_delivery_failure_reports_conversion_error() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let sink = Arc::new(Recorder::default());
    let mut converter = Converter::builder()
        .without_document_reader()
        .dialog(Arc::new(no_dialog()))
        .downloads_dir(&blocker)
        .status_sink(sink.clone())
        .build()
        .unwrap();
    converter.add_files(vec![png_file("a.png", 4, 4)]);
    assert!(converter.run().await.is_err());
    assert_eq!(
        sink.last_status(),
        (status::CONVERSION_ERROR.to_string(), Tone::Error)
    );
    assert!(!converter.state().active);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_stops_long_task_notices() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let sink = Arc::new(Recorder::default());
    let mut converter = Converter::builder()
        .without_document_reader()
        .dialog(Arc::new(no_dialog()))
        .downloads_dir(&blocker)
        .status_sink(sink.clone())
        .build()
        .unwrap();
    converter.set_quality("ultra");
    converter.add_files(vec![png_file("a.png", 4, 4)]);
    assert!(converter.run().await.is_err());
    let after_run = sink.statuses();

    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    assert_eq!(sink.statuses(), after_run);
    assert!(!after_run
        .iter()
        .any(|(text, _)| text.contains("please keep waiting")));
    assert_eq!(
        sink.last_status(),
        (status::CONVERSION_ERROR.to_string(), Tone::Error)
    );
}

// ========== Progress tests ==========

#[tokio::test]
async fn test_progress_is_monotonic_and_reaches_100() {
    let (mut h, _) = harness(
        ConverterConfig::default(),
        directory_dialog(),
        Capabilities::detect(),
    );
    h.converter
        .add_files(vec![pdf_file("a.pdf", 4), png_file("b.png", 3, 3), pdf_file("c.pdf", 2)]);
    h.converter.run().await.unwrap();

    let progress = h.sink.progress();
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));
    assert_eq!(progress.len(), 1 + 7);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| *p <= 100));
}

#[tokio::test]
async fn test_status_flow_of_a_run() {
    let (mut h, _) = harness(ConverterConfig::default(), no_dialog(), Capabilities::detect());
    h.converter.set_output_format(OutputFormat::Png);
    h.converter.set_quality("ultra");
    h.converter.add_files(vec![png_file("a.png", 3, 3)]);
    h.converter.run().await.unwrap();

    let statuses = h.sink.statuses();
    let texts: Vec<&str> = statuses.iter().map(|(t, _)| t.as_str()).collect();
    let start = texts
        .iter()
        .position(|t| *t == "Starting export to PNG.")
        .unwrap();
    assert_eq!(statuses[start].1, Tone::Warn);
    assert_eq!(texts[start + 1], "Processing \"a.png\" to PNG…");
    assert_eq!(statuses.last().unwrap().1, Tone::Success);
}

// ========== Intake tests ==========

#[tokio::test]
async fn test_unsupported_files_are_reported() {
    let (mut h, _) = harness(ConverterConfig::default(), no_dialog(), Capabilities::detect());
    let report = h.converter.add_files(vec![
        SourceFile::new("a.txt", "text/plain", b"x".to_vec()),
        SourceFile::new("b.doc", "application/msword", b"x".to_vec()),
    ]);
    assert_eq!(report.added, 0);
    assert_eq!(
        h.sink.last_status(),
        (
            "Could not add 2 files (\"a.txt\", \"b.doc\") because the format is unsupported. Supports PNG, JPG, JPEG, WebP, and GIF files.".to_string(),
            Tone::Warn
        )
    );
    assert_eq!(h.converter.run().await.unwrap(), RunOutcome::Ignored);
}

#[tokio::test]
async fn test_documents_skipped_without_reader() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(Recorder::default());
    let mut converter = Converter::builder()
        .config(ConverterConfig::default().allow_document_input(true))
        .without_document_reader()
        .downloads_dir(tmp.path())
        .status_sink(sink.clone())
        .build()
        .unwrap();
    let report = converter.add_files(vec![pdf_file("a.pdf", 1), png_file("b.png", 2, 2)]);
    assert_eq!(report.added, 1);
    assert_eq!(report.skipped_documents, vec!["a.pdf".to_string()]);
    assert_eq!(sink.last_status().1, Tone::Warn);
    assert_eq!(converter.selection_summary().to_string(), "1 file, 1 image");
}
