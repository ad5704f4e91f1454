//! Run orchestration: queue intake, the per-item conversion loop and delivery.
//!
//! A [`Converter`] owns the file queue, the pipeline state and every
//! collaborator of a run. One run occupies it completely; items are
//! processed strictly in queue order, pages strictly in page order.

use crate::capabilities::Capabilities;
use crate::classify::{Classifier, InputKind, SourceFile};
use crate::composer::{DocumentComposer, PageImage};
use crate::config::{ConverterConfig, MergeMode, OutputDescriptor, OutputFormat};
use crate::dispatcher::{Delivery, DownloadFolder, NoDialog, OutputArtifact, OutputDispatcher, SaveDialog};
use crate::encoder::{EncodeTarget, FormatEncoder};
use crate::error::{Capability, ConversionError, Result};
use crate::naming::{page_suffix, sanitize_name, strip_extension, NameResolver};
use crate::progress::{LongTaskMonitor, ProgressTracker};
use crate::quality::{QualityLevel, QualityPreset, Tone};
use crate::queue::{FileEntry, FileQueue, IntakeReport, SelectionSummary};
use crate::renderer::{decode_image, render_document_page, Bitmap, DocumentReader, PdfiumReader};
use crate::status::{self, StatusSink, TracingSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Selections and the run flag, kept explicitly instead of as ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineState {
    /// A run is in progress; new triggers are ignored.
    pub active: bool,
    pub output_format: OutputFormat,
    pub quality: QualityLevel,
    /// Only consulted for PDF output.
    pub merge_mode: MergeMode,
}

/// Parameters of one run, frozen when it starts.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Queue entries in enqueue order.
    pub entries: Vec<Uuid>,
    pub output_format: OutputFormat,
    pub preset: &'static QualityPreset,
    /// `Some` only for PDF output.
    pub merge_mode: Option<MergeMode>,
}

impl ConversionJob {
    pub fn is_merged(&self) -> bool {
        self.merge_mode == Some(MergeMode::Merged)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// A run was already active or the queue was empty.
    Ignored,
    /// The user declined a save dialog; nothing was delivered.
    Cancelled,
    /// Every item failed, nothing to deliver.
    Empty,
    Delivered {
        /// Number of artifacts produced.
        artifacts: usize,
        /// Where they were written (one ZIP when bundled).
        paths: Vec<PathBuf>,
        summary: String,
    },
}

/// What one queue entry produced.
enum ItemOutput {
    /// Encoded files as `(page suffix, bytes)`.
    Files(Vec<(String, Vec<u8>)>),
    /// Pages for the merged document.
    Pages(Vec<PageImage>),
}

/// Tagged result of one item.
enum ItemResult {
    Converted(ItemOutput),
    /// Nothing to convert, e.g. a document without pages.
    Skipped,
    Failed(ConversionError),
}

/// Per-run settings shared by every item.
struct ItemContext<'a> {
    reader: Option<&'a dyn DocumentReader>,
    encoder: &'a FormatEncoder,
    target: &'a EncodeTarget,
    preset: &'static QualityPreset,
    preserve_alpha: bool,
    exporting_pdf: bool,
    merged: bool,
}

/// Batch converter.
pub struct Converter {
    config: ConverterConfig,
    state: PipelineState,
    queue: FileQueue,
    reader: Option<Box<dyn DocumentReader>>,
    encoder: FormatEncoder,
    dispatcher: OutputDispatcher,
    sink: Arc<dyn StatusSink>,
}

impl Converter {
    /// Create a converter with the default collaborators: pdfium when
    /// document input is enabled, no save dialog, and downloads into the
    /// current directory.
    pub fn new(config: ConverterConfig) -> Result<Self> {
        ConverterBuilder::new().config(config).build()
    }

    pub fn builder() -> ConverterBuilder {
        ConverterBuilder::new()
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn queue(&self) -> &FileQueue {
        &self.queue
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.encoder.capabilities()
    }

    pub fn has_document_reader(&self) -> bool {
        self.reader.is_some()
    }

    /// Label of the convert action, quoted in the ready message.
    pub fn action_label(&self) -> String {
        format!("Convert to {}", self.config.descriptor(self.state.output_format).label)
    }

    // ---- queue ----

    /// Classify and queue files, then post the intake summary.
    pub fn add_files(&mut self, files: Vec<SourceFile>) -> IntakeReport {
        if files.is_empty() {
            return IntakeReport::default();
        }
        self.sink.status(status::LOADING_PREVIEWS, Tone::Info);
        let classifier = Classifier::new(
            &self.config.input,
            self.config.allow_document_input,
            self.reader.is_some(),
        );
        let report = self.queue.add_files(
            files,
            &classifier,
            self.reader.as_deref(),
            self.sink.as_ref(),
        );
        let action = self.action_label();
        report.announce(
            self.sink.as_ref(),
            &action,
            self.config.input.description.as_deref(),
        );
        report
    }

    pub fn remove_file(&mut self, id: Uuid) -> bool {
        self.queue.remove(id, self.sink.as_ref())
    }

    pub fn clear_files(&mut self) {
        self.queue.clear(self.sink.as_ref());
    }

    pub fn selection_summary(&self) -> SelectionSummary {
        self.queue.summary()
    }

    // ---- selections ----

    /// Select a quality preset by key and announce it.
    pub fn set_quality(&mut self, key: &str) -> QualityLevel {
        let level = QualityLevel::from_key(key);
        self.state.quality = level;
        let preset = level.preset();
        self.sink.status(preset.message, preset.tone);
        level
    }

    /// Select an output format; unavailable ones fall back to the first offered.
    pub fn set_output_format(&mut self, format: OutputFormat) -> OutputFormat {
        let resolved = self.config.resolve_output(format);
        if resolved != format {
            debug!("Output {} not offered, using {}", format, resolved);
        }
        self.state.output_format = resolved;
        resolved
    }

    /// Select the PDF mode; anything but `separate` means merged.
    pub fn set_merge_mode(&mut self, key: &str) -> MergeMode {
        self.state.merge_mode = MergeMode::from_key(key);
        self.state.merge_mode
    }

    /// Freeze the current selections and queue order.
    pub fn snapshot_job(&self) -> ConversionJob {
        ConversionJob {
            entries: self.queue.ids(),
            output_format: self.state.output_format,
            preset: self.state.quality.preset(),
            merge_mode: self
                .state
                .output_format
                .is_document()
                .then_some(self.state.merge_mode),
        }
    }

    // ---- run ----

    /// Convert the queued files and deliver the results.
    ///
    /// Per-item failures drop the item and the run continues. Missing
    /// capabilities, delivery failures and unexpected errors end the run
    /// and are returned after the status channel has been updated.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        if self.state.active {
            debug!("Run requested while another is active");
            return Ok(RunOutcome::Ignored);
        }
        if self.queue.is_empty() {
            debug!("Run requested with an empty queue");
            return Ok(RunOutcome::Ignored);
        }

        let job = self.snapshot_job();
        if let Err(e) = self.preflight(&job) {
            error!("Cannot start conversion: {}", e);
            self.sink.status(preflight_message(&e), Tone::Error);
            return Err(e);
        }

        info!(
            "Starting conversion of {} files to {} ({} preset{})",
            job.entries.len(),
            job.output_format,
            job.preset.level.key(),
            job.merge_mode
                .map(|m| format!(", {:?}", m).to_lowercase())
                .unwrap_or_default()
        );
        let start = Instant::now();
        self.state.active = true;
        let monitor = LongTaskMonitor::start(job.preset, Arc::clone(&self.sink));

        let result = self.execute(&job).await;

        monitor.cancel();
        self.state.active = false;

        match result {
            Ok(outcome) => {
                info!("Conversion finished in {:?}: {:?}", start.elapsed(), outcome_kind(&outcome));
                Ok(outcome)
            }
            Err(e) => {
                error!("Conversion failed after {:?}: {}", start.elapsed(), e);
                let message = match &e {
                    ConversionError::MissingCapability(_) => preflight_message(&e),
                    _ => status::CONVERSION_ERROR,
                };
                self.sink.status(message, Tone::Error);
                Err(e)
            }
        }
    }

    /// Fail before any processing if the job cannot be completed.
    fn preflight(&self, job: &ConversionJob) -> Result<()> {
        let capabilities = self.encoder.capabilities();
        capabilities.require_output(job.output_format)?;
        if !capabilities.archive {
            return Err(ConversionError::MissingCapability(Capability::Archive));
        }
        let needs_reader = self
            .queue
            .entries()
            .iter()
            .any(|e| e.kind == InputKind::Document);
        if needs_reader && self.reader.is_none() {
            return Err(ConversionError::MissingCapability(Capability::DocumentReader));
        }
        Ok(())
    }

    async fn execute(&mut self, job: &ConversionJob) -> Result<RunOutcome> {
        let descriptor = self.config.descriptor(job.output_format);
        let preset = job.preset;
        let tone = preset.run_tone();
        let exporting_pdf = job.output_format.is_document();

        let start_message = match job.merge_mode {
            Some(MergeMode::Merged) => status::MERGING_PDF.to_string(),
            Some(MergeMode::Separate) => status::SEPARATE_PDF.to_string(),
            None => status::starting_export(&descriptor.label),
        };
        self.sink.status(&start_message, tone);

        let total: usize = self
            .queue
            .entries()
            .iter()
            .filter(|e| job.entries.contains(&e.id))
            .map(FileEntry::work_units)
            .sum();
        let mut progress = ProgressTracker::new(if total == 0 { job.entries.len() } else { total });
        self.sink.progress(0);

        let target = EncodeTarget::new(job.output_format, &descriptor, preset);
        let ctx = ItemContext {
            reader: self.reader.as_deref(),
            encoder: &self.encoder,
            target: &target,
            preset,
            preserve_alpha: descriptor.preserve_alpha && !exporting_pdf,
            exporting_pdf,
            merged: job.is_merged(),
        };
        let extension = if exporting_pdf {
            "pdf".to_string()
        } else {
            descriptor.extension().to_string()
        };

        let mut names = NameResolver::new(&self.config.slug, job.output_format.key());
        let mut artifacts = Vec::new();
        let mut composer = ctx.merged.then(DocumentComposer::new);
        let mut merged_sources: Vec<(String, String)> = Vec::new();
        let mut failed = Vec::new();
        let sink = self.sink.as_ref();

        for id in &job.entries {
            let Some(entry) = self.queue.get_mut(*id) else {
                continue;
            };
            sink.status(&status::processing(&entry.name, &descriptor.label), tone);

            match convert_entry(entry, &ctx, &mut progress, sink).await {
                ItemResult::Converted(ItemOutput::Files(files)) => {
                    let base = NameResolver::base_name(&entry.name, &entry.short_id());
                    let suffixes: Vec<&str> = files.iter().map(|(s, _)| s.as_str()).collect();
                    let filenames = names.reserve(&base, &suffixes, &extension);
                    for ((_, bytes), filename) in files.into_iter().zip(filenames) {
                        let (archive_path, filename) = names.archive_path(&filename);
                        artifacts.push(OutputArtifact {
                            archive_path,
                            filename,
                            bytes,
                            format: job.output_format,
                            mime_type: descriptor.mime_type.clone(),
                        });
                    }
                }
                ItemResult::Converted(ItemOutput::Pages(pages)) => {
                    if let Some(composer) = composer.as_mut() {
                        for page in &pages {
                            composer.append_page(page)?;
                        }
                    }
                    merged_sources.push((entry.name.clone(), entry.short_id()));
                }
                ItemResult::Skipped => {
                    debug!("Nothing to convert in {}", entry.name);
                }
                ItemResult::Failed(e) if e.is_fatal() => return Err(e),
                ItemResult::Failed(e) => {
                    warn!("Dropping {}: {}", entry.name, e);
                    sink.status(&status::could_not_process(&entry.name), Tone::Error);
                    failed.push(*id);
                }
            }
        }

        if !failed.is_empty() {
            self.queue.remove_all(&failed);
        }

        if let Some(composer) = composer.filter(|c| !c.is_empty()) {
            let page_count = composer.page_count();
            let bytes = composer.finish()?;
            let filename = names.reserve_one(&merged_filename(&self.config.slug, &merged_sources));
            debug!("Merged {} pages into {}", page_count, filename);
            let (archive_path, filename) = names.archive_path(&filename);
            artifacts.push(OutputArtifact {
                archive_path,
                filename,
                bytes,
                format: job.output_format,
                mime_type: descriptor.mime_type.clone(),
            });
        }

        if artifacts.is_empty() {
            sink.status(status::NOTHING_CONVERTED, Tone::Warn);
            return Ok(RunOutcome::Empty);
        }

        tokio::task::yield_now().await;
        let count = artifacts.len();
        let archive_base = archive_base(&descriptor, job, names.archive_root());
        match self.dispatcher.deliver(artifacts, &archive_base, sink).await? {
            Delivery::Cancelled => Ok(RunOutcome::Cancelled),
            Delivery::Delivered { paths, summary } => Ok(RunOutcome::Delivered {
                artifacts: count,
                paths,
                summary,
            }),
        }
    }
}

/// Convert one entry, buffering its output until every page succeeded.
async fn convert_entry(
    entry: &mut FileEntry,
    ctx: &ItemContext<'_>,
    progress: &mut ProgressTracker,
    sink: &dyn StatusSink,
) -> ItemResult {
    match convert_entry_pages(entry, ctx, progress, sink).await {
        Ok(Some(output)) => ItemResult::Converted(output),
        Ok(None) => ItemResult::Skipped,
        Err(e) => ItemResult::Failed(e),
    }
}

async fn convert_entry_pages(
    entry: &mut FileEntry,
    ctx: &ItemContext<'_>,
    progress: &mut ProgressTracker,
    sink: &dyn StatusSink,
) -> Result<Option<ItemOutput>> {
    let mut files = Vec::new();
    let mut pages = Vec::new();

    match entry.kind {
        InputKind::Document => {
            let reader = ctx
                .reader
                .ok_or(ConversionError::MissingCapability(Capability::DocumentReader))?;
            let document = entry.open_document(reader)?;
            tokio::task::yield_now().await;

            let page_count = document.page_count();
            if page_count == 0 {
                return Ok(None);
            }
            for page in 1..=page_count {
                let bitmap = render_document_page(document, page, ctx.preset.scale())?;
                tokio::task::yield_now().await;
                encode_bitmap(&bitmap, page_suffix(page, page_count), ctx, &mut files, &mut pages)?;
                tokio::task::yield_now().await;
                progress.advance(sink);
            }
        }
        InputKind::Image => {
            let bitmap = decode_image(&entry.source, ctx.preserve_alpha)?;
            tokio::task::yield_now().await;
            encode_bitmap(&bitmap, String::new(), ctx, &mut files, &mut pages)?;
            tokio::task::yield_now().await;
            progress.advance(sink);
        }
    }

    Ok(Some(if ctx.merged {
        ItemOutput::Pages(pages)
    } else {
        ItemOutput::Files(files)
    }))
}

fn encode_bitmap(
    bitmap: &Bitmap,
    suffix: String,
    ctx: &ItemContext<'_>,
    files: &mut Vec<(String, Vec<u8>)>,
    pages: &mut Vec<PageImage>,
) -> Result<()> {
    if ctx.exporting_pdf {
        let page = PageImage::from_bitmap(bitmap, ctx.preset.jpeg_quality())?;
        if ctx.merged {
            pages.push(page);
        } else {
            files.push((suffix, DocumentComposer::single_page(&page)?));
        }
    } else {
        files.push((suffix, ctx.encoder.encode(bitmap, ctx.target)?));
    }
    Ok(())
}

/// One source: `<name>.pdf`; several: `<slug>-<n>-files.pdf`.
fn merged_filename(slug: &str, sources: &[(String, String)]) -> String {
    match sources {
        [(name, short_id)] => {
            let base = sanitize_name(strip_extension(name));
            if base.is_empty() {
                format!("{}.pdf", NameResolver::base_name(name, short_id))
            } else {
                format!("{}.pdf", base)
            }
        }
        _ => {
            let slug = sanitize_name(slug);
            let slug = if slug.is_empty() { "merged".to_string() } else { slug };
            format!("{}-{}-files.pdf", slug, sources.len())
        }
    }
}

fn archive_base(descriptor: &OutputDescriptor, job: &ConversionJob, archive_root: &str) -> String {
    let configured = match job.merge_mode {
        Some(MergeMode::Merged) => descriptor.archive_name_merged.as_ref(),
        Some(MergeMode::Separate) => descriptor.archive_name_separate.as_ref(),
        None => descriptor.archive_name.as_ref(),
    };
    configured
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| archive_root.to_string())
}

fn preflight_message(error: &ConversionError) -> &'static str {
    match error {
        ConversionError::MissingCapability(Capability::Gif) => status::MISSING_GIF_ENCODER,
        ConversionError::MissingCapability(Capability::DocumentComposer) => {
            status::MISSING_PDF_GENERATOR
        }
        ConversionError::MissingCapability(Capability::Archive) => status::MISSING_ARCHIVE_LIBRARY,
        ConversionError::MissingCapability(Capability::DocumentReader) => status::MISSING_PDF_READER,
        _ => status::CONVERSION_ERROR,
    }
}

fn outcome_kind(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Ignored => "ignored",
        RunOutcome::Cancelled => "cancelled",
        RunOutcome::Empty => "empty",
        RunOutcome::Delivered { .. } => "delivered",
    }
}

/// Statistics about the converter's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConverterStats {
    /// Entries waiting for the next run.
    pub queued_files: usize,
    /// Work units of the next run.
    pub work_units: usize,
    pub document_reader: bool,
}

impl Converter {
    pub fn stats(&self) -> ConverterStats {
        ConverterStats {
            queued_files: self.queue.len(),
            work_units: self.queue.total_work_units(),
            document_reader: self.reader.is_some(),
        }
    }
}

/// Builder for creating a Converter with custom collaborators.
pub struct ConverterBuilder {
    config: ConverterConfig,
    capabilities: Capabilities,
    reader: Option<Option<Box<dyn DocumentReader>>>,
    dialog: Arc<dyn SaveDialog>,
    downloads: PathBuf,
    sink: Arc<dyn StatusSink>,
}

impl ConverterBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ConverterConfig::default(),
            capabilities: Capabilities::detect(),
            reader: None,
            dialog: Arc::new(NoDialog),
            downloads: PathBuf::from("."),
            sink: Arc::new(TracingSink),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: ConverterConfig) -> Self {
        self.config = config;
        self
    }

    /// Override detected capabilities.
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Use a specific document reader instead of binding pdfium.
    pub fn document_reader(mut self, reader: impl DocumentReader + 'static) -> Self {
        self.reader = Some(Some(Box::new(reader)));
        self
    }

    /// Run without any document reader.
    pub fn without_document_reader(mut self) -> Self {
        self.reader = Some(None);
        self
    }

    /// Set the save dialog.
    pub fn dialog(mut self, dialog: Arc<dyn SaveDialog>) -> Self {
        self.dialog = dialog;
        self
    }

    /// Set the fallback download folder.
    pub fn downloads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.downloads = dir.into();
        self
    }

    /// Set the status sink.
    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the converter.
    pub fn build(self) -> Result<Converter> {
        self.config.validate()?;

        let reader = match self.reader {
            Some(reader) => reader,
            None if self.config.allow_document_input => PdfiumReader::try_bind()
                .map(|r| Box::new(r) as Box<dyn DocumentReader>),
            None => None,
        };
        info!(
            "Initializing converter '{}' (document reader: {}, outputs: {:?})",
            self.config.slug,
            reader.is_some(),
            self.config.available_outputs
        );

        let state = PipelineState {
            active: false,
            output_format: self.config.resolve_output(self.config.default_output),
            quality: QualityLevel::default(),
            merge_mode: MergeMode::default(),
        };

        Ok(Converter {
            state,
            queue: FileQueue::new(),
            reader,
            encoder: FormatEncoder::new(self.capabilities),
            dispatcher: OutputDispatcher::new(
                self.dialog,
                DownloadFolder::new(self.downloads),
                self.capabilities,
            ),
            sink: self.sink,
            config: self.config,
        })
    }
}

impl Default for ConverterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
