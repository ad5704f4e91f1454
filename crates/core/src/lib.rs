//! # batch-convert-core
//!
//! Batch conversion of images and PDF pages into JPG, PNG, WebP, GIF or PDF.
//!
//! A run takes the queued files in order, turns every image and every PDF
//! page into a bitmap, encodes it (or adds it as a page of a PDF), names the
//! results and delivers them:
//!
//! - **pdfium** (Google's PDF engine) renders PDF pages
//! - **image**, **png** and **gif** encode raster output
//! - **lopdf** writes PDF output, one document or one per page
//! - **zip** bundles several files when no directory can be chosen
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_convert_core::{Converter, ConverterConfig, OutputFormat, SourceFile};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConverterConfig::for_output(OutputFormat::Png);
//!     let mut converter = Converter::builder()
//!         .config(config)
//!         .downloads_dir("./output")
//!         .build()?;
//!
//!     converter.add_files(vec![SourceFile::from_path(Path::new("photo.jpg"))?]);
//!     converter.set_quality("high");
//!     let outcome = converter.run().await?;
//!
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Status updates
//!
//! ```rust,no_run
//! use batch_convert_core::{Converter, StatusEvent};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<StatusEvent>();
//! let converter = Converter::builder().status_sink(Arc::new(tx)).build()?;
//! # drop(converter);
//! while let Ok(event) = rx.try_recv() {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod classify;
pub mod composer;
pub mod config;
pub mod converter;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod fallback;
pub mod naming;
pub mod progress;
pub mod quality;
pub mod queue;
pub mod renderer;
pub mod status;

// Re-export main types for convenience
pub use capabilities::Capabilities;
pub use classify::{Classification, Classifier, InputKind, SourceFile};
pub use composer::{DocumentComposer, PageImage};
pub use config::{ConverterConfig, InputConfig, MergeMode, OutputDescriptor, OutputFormat};
pub use converter::{
    ConversionJob, Converter, ConverterBuilder, ConverterStats, PipelineState, RunOutcome,
};
pub use dispatcher::{Delivery, DownloadFolder, NoDialog, OutputArtifact, OutputDispatcher, SaveDialog};
pub use encoder::{EncodeTarget, FormatEncoder};
pub use error::{Capability, ConversionError, Result};
pub use fallback::Attempt;
pub use naming::{sanitize_name, NameResolver};
pub use progress::{LongTaskMonitor, ProgressTracker};
pub use quality::{QualityLevel, QualityPreset, Tone};
pub use queue::{FileEntry, FileQueue, IntakeReport, SelectionSummary, Thumbnail};
pub use renderer::{Bitmap, DocumentReader, PageSource, PdfiumReader};
pub use status::{StatusEvent, StatusSink, TracingSink};

/// Initialize the library's logging.
/// Call this once at application startup if you want to see logs.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}

/// Like [`init_logging`], but with a filter used when `RUST_LOG` is unset.
pub fn init_logging_with_default(directives: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
