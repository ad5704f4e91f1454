//! Delivery of finished artifacts: save dialogs, downloads and ZIP bundles.

use crate::capabilities::Capabilities;
use crate::config::OutputFormat;
use crate::error::{Capability, ConversionError, Result};
use crate::fallback::Attempt;
use crate::status::{self, StatusSink, Tone};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One produced file.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputArtifact {
    /// `<archive root>/<filename>`, the entry path inside a bundle or
    /// chosen directory.
    pub archive_path: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub mime_type: String,
}

/// Interactive save targets.
///
/// Implementations report `Unavailable` when they cannot ask, and
/// `Cancelled` when the user declined.
pub trait SaveDialog: Send + Sync {
    fn pick_file(&self, suggested_name: &str, mime_type: &str) -> Attempt<PathBuf>;

    fn pick_directory(&self) -> Attempt<PathBuf>;
}

/// A dialog that is never available, so every delivery falls back to
/// downloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDialog;

impl SaveDialog for NoDialog {
    fn pick_file(&self, _suggested_name: &str, _mime_type: &str) -> Attempt<PathBuf> {
        Attempt::Unavailable("no save dialog".to_string())
    }

    fn pick_directory(&self) -> Attempt<PathBuf> {
        Attempt::Unavailable("no directory dialog".to_string())
    }
}

/// Fallback download target: files land in one folder without asking.
#[derive(Debug, Clone)]
pub struct DownloadFolder {
    dir: PathBuf,
}

impl DownloadFolder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` as `name`, adding ` (1)`, ` (2)`, ... if the name is taken.
    pub async fn save(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut target = self.dir.join(name);
        let mut n = 1;
        while tokio::fs::try_exists(&target).await? {
            let stem = Path::new(name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name);
            target = match Path::new(name).extension().and_then(|e| e.to_str()) {
                Some(ext) => self.dir.join(format!("{} ({}).{}", stem, n, ext)),
                None => self.dir.join(format!("{} ({})", stem, n)),
            };
            n += 1;
        }
        write_file(&target, bytes).await?;
        info!("Downloaded {}", target.display());
        Ok(target)
    }
}

/// How a run's artifacts ended up with the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Files written; `summary` is the status text that was posted.
    Delivered { paths: Vec<PathBuf>, summary: String },
    /// The user declined a save dialog; nothing was written.
    Cancelled,
}

/// Chooses between single-file save, directory save and ZIP download.
pub struct OutputDispatcher {
    dialog: Arc<dyn SaveDialog>,
    downloads: DownloadFolder,
    capabilities: Capabilities,
}

impl OutputDispatcher {
    pub fn new(dialog: Arc<dyn SaveDialog>, downloads: DownloadFolder, capabilities: Capabilities) -> Self {
        Self {
            dialog,
            downloads,
            capabilities,
        }
    }

    pub fn downloads(&self) -> &DownloadFolder {
        &self.downloads
    }

    /// Deliver every artifact. `archive_base` names the ZIP bundle if one
    /// is needed.
    pub async fn deliver(
        &self,
        artifacts: Vec<OutputArtifact>,
        archive_base: &str,
        sink: &dyn StatusSink,
    ) -> Result<Delivery> {
        let mut artifacts = artifacts;
        if artifacts.len() > 1 {
            return self.deliver_many(artifacts, archive_base, sink).await;
        }
        match artifacts.pop() {
            Some(artifact) => self.deliver_single(artifact, sink).await,
            None => Ok(Delivery::Delivered {
                paths: Vec::new(),
                summary: String::new(),
            }),
        }
    }

    async fn deliver_single(&self, artifact: OutputArtifact, sink: &dyn StatusSink) -> Result<Delivery> {
        let saved = match self.dialog.pick_file(&artifact.filename, &artifact.mime_type) {
            Attempt::Cancelled => return Ok(cancelled(sink)),
            Attempt::Done(path) => match write_file(&path, &artifact.bytes).await {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!("Save to {} failed, downloading instead: {}", path.display(), e);
                    None
                }
            },
            Attempt::Unavailable(reason) => {
                debug!("Save dialog unavailable: {}", reason);
                None
            }
        };

        let path = match saved {
            Some(path) => path,
            None => self.downloads.save(&artifact.filename, &artifact.bytes).await?,
        };
        let detail = format!("{} downloaded", status::describe_targets(&[&artifact.filename]));
        Ok(delivered(
            sink,
            vec![path],
            &detail,
            status::DOWNLOAD_HINT_BROWSER,
        ))
    }

    async fn deliver_many(
        &self,
        artifacts: Vec<OutputArtifact>,
        archive_base: &str,
        sink: &dyn StatusSink,
    ) -> Result<Delivery> {
        let names: Vec<&str> = artifacts.iter().map(|a| a.filename.as_str()).collect();

        match self.dialog.pick_directory() {
            Attempt::Cancelled => return Ok(cancelled(sink)),
            Attempt::Done(dir) => match write_tree(&dir, &artifacts).await {
                Ok(paths) => {
                    let detail = format!("{} saved", status::describe_targets(&names));
                    return Ok(delivered(sink, paths, &detail, status::DOWNLOAD_HINT_FOLDER));
                }
                Err(e) => warn!("Saving to {} failed, bundling instead: {}", dir.display(), e),
            },
            Attempt::Unavailable(reason) => debug!("Directory dialog unavailable: {}", reason),
        }

        if !self.capabilities.archive {
            return Err(ConversionError::MissingCapability(Capability::Archive));
        }
        let bundle = build_archive(&artifacts)?;
        let zip_name = archive_filename(archive_base);
        let path = self.downloads.save(&zip_name, &bundle).await?;
        let detail = format!(
            "ZIP \"{}\" downloaded ({})",
            zip_name,
            status::describe_targets(&names)
        );
        Ok(delivered(
            sink,
            vec![path],
            &detail,
            status::DOWNLOAD_HINT_BROWSER,
        ))
    }
}

fn cancelled(sink: &dyn StatusSink) -> Delivery {
    info!("Save canceled by user");
    sink.status(status::SAVE_CANCELED, Tone::Info);
    Delivery::Cancelled
}

fn delivered(sink: &dyn StatusSink, paths: Vec<PathBuf>, detail: &str, hint: &str) -> Delivery {
    let summary = status::download_announcement(detail, hint);
    sink.status(&summary, Tone::Success);
    Delivery::Delivered { paths, summary }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| output_error(parent, e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| output_error(path, e))
}

fn output_error(path: &Path, e: std::io::Error) -> ConversionError {
    ConversionError::OutputWrite {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Write each artifact at its archive path below `dir`.
async fn write_tree(dir: &Path, artifacts: &[OutputArtifact]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = dir.join(&artifact.archive_path);
        if let Err(e) = write_file(&path, &artifact.bytes).await {
            remove_partial(&paths).await;
            return Err(e);
        }
        paths.push(path);
    }
    info!("Saved {} files under {}", paths.len(), dir.display());
    Ok(paths)
}

/// Remove files from an interrupted directory write, then any parent left empty.
async fn remove_partial(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }
    for parent in paths.iter().filter_map(|p| p.parent()) {
        // Fails while the directory still holds anything else.
        let _ = tokio::fs::remove_dir(parent).await;
    }
}

/// Bundle artifacts into an in-memory ZIP, one entry per archive path.
pub fn build_archive(artifacts: &[OutputArtifact]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for artifact in artifacts {
        zip.start_file(artifact.archive_path.as_str(), options)
            .map_err(|e| ConversionError::ArchiveFailed(e.to_string()))?;
        zip.write_all(&artifact.bytes)
            .map_err(|e| ConversionError::ArchiveFailed(e.to_string()))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| ConversionError::ArchiveFailed(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// `<base>-<unix millis>.zip`
pub fn archive_filename(base: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{}-{}.zip", base, millis)
}
