//! Status channel: messages and progress reported back to the front end.

pub use crate::quality::Tone;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// One update on the status channel.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// Replaces the active status message.
    Status { text: String, tone: Tone },
    /// Progress percentage in `0..=100`.
    Progress(u8),
}

/// Receiver of status updates.
///
/// Implementations must be cheap; they are called from the conversion flow
/// and from long-task timers.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);

    fn status(&self, text: &str, tone: Tone) {
        debug!(%tone, "status: {}", text);
        self.emit(StatusEvent::Status {
            text: text.to_string(),
            tone,
        });
    }

    fn progress(&self, percent: u8) {
        self.emit(StatusEvent::Progress(percent.min(100)));
    }
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn emit(&self, event: StatusEvent) {
        match event {
            StatusEvent::Status { text, tone } => match tone {
                Tone::Warn | Tone::Error => warn!(%tone, "{}", text),
                Tone::Info | Tone::Success => info!(%tone, "{}", text),
            },
            StatusEvent::Progress(percent) => debug!("progress {}%", percent),
        }
    }
}

impl StatusSink for UnboundedSender<StatusEvent> {
    fn emit(&self, event: StatusEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(event);
    }
}

pub const LOADING_PREVIEWS: &str = "Loading files and generating previews…";
pub const LIST_CLEARED: &str = "File list cleared.";
pub const FILE_REMOVED: &str = "Removed the file from the list.";
pub const CHOOSE_SUPPORTED: &str = "Please choose supported file types.";
pub const MISSING_PDF_READER: &str = "Cannot add PDF because the PDF reader library is missing.";
pub const MISSING_PDF_GENERATOR: &str =
    "Missing PDF generator library. Please choose an image format.";
pub const MISSING_ARCHIVE_LIBRARY: &str = "Missing ZIP library. Multiple files cannot be bundled.";
pub const MISSING_GIF_ENCODER: &str = "No GIF encoder is available. Please choose another format.";
pub const NO_VALID_FILES: &str = "No valid files were added.";
pub const SAVE_CANCELED: &str = "Save canceled. No files were downloaded.";
pub const CONVERSION_ERROR: &str = "An error occurred during conversion. Please try again.";
pub const NOTHING_CONVERTED: &str = "No files could be converted.";
pub const MERGING_PDF: &str = "Merging everything into a single PDF.";
pub const SEPARATE_PDF: &str = "Exporting each item to a separate PDF.";
pub const DOWNLOAD_HINT_BROWSER: &str = "Check your downloads folder to open the file.";
pub const DOWNLOAD_HINT_FOLDER: &str = "Check the folder you selected to open the files.";

pub fn could_not_process(name: &str) -> String {
    format!("Could not process file {}.", name)
}

pub fn files_ready(action: &str) -> String {
    format!("Files are ready, click \"{}\".", action)
}

pub fn skipped_documents(count: usize) -> String {
    format!("Skipped {} PDF file(s) because the reader is missing.", count)
}

pub fn skipped_unsupported(count: usize) -> String {
    format!("Skipped {} unsupported file(s).", count)
}

pub fn starting_export(label: &str) -> String {
    format!("Starting export to {}.", label)
}

pub fn processing(name: &str, label: &str) -> String {
    format!("Processing \"{}\" to {}…", name, label)
}

/// Trim and collapse inner whitespace of a display name.
pub fn normalize_display_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Describe produced files, naming at most three.
///
/// `File "a"`, `Files "a" and "b"`, `Files "a", "b" and "c"`,
/// `Files "a", "b", "c" and 2 more`.
pub fn describe_targets<S: AsRef<str>>(names: &[S]) -> String {
    let quoted: Vec<String> = names
        .iter()
        .map(|n| normalize_display_name(n.as_ref()))
        .filter(|n| !n.is_empty())
        .map(|n| format!("\"{}\"", n))
        .collect();
    match quoted.len() {
        0 => String::new(),
        1 => format!("File {}", quoted[0]),
        2 => format!("Files {} and {}", quoted[0], quoted[1]),
        3 => format!("Files {}, {} and {}", quoted[0], quoted[1], quoted[2]),
        n => format!(
            "Files {}, {}, {} and {} more",
            quoted[0],
            quoted[1],
            quoted[2],
            n - 3
        ),
    }
}

/// `Done. <detail>. <hint>`
pub fn download_announcement(detail: &str, hint: &str) -> String {
    let trimmed = detail.trim().trim_end_matches('.');
    let sentence = if trimmed.is_empty() {
        "Done.".to_string()
    } else {
        format!("Done. {}.", trimmed)
    };
    if hint.is_empty() {
        sentence
    } else {
        format!("{} {}", sentence, hint)
    }
}

/// Batched warning for files whose format is not accepted.
pub fn unsupported_files(names: &[String], description: Option<&str>) -> String {
    const PREVIEW: usize = 3;
    let preview: Vec<String> = names
        .iter()
        .take(PREVIEW)
        .map(|n| normalize_display_name(n))
        .filter(|n| !n.is_empty())
        .map(|n| format!("\"{}\"", n))
        .collect();
    let listed = preview.join(", ");
    let extra = names.len().saturating_sub(preview.len());
    let detail = if names.len() == 1 {
        format!("file {}", listed)
    } else if extra > 0 {
        format!("{} files ({} and {} more)", names.len(), listed, extra)
    } else {
        format!("{} files ({})", names.len(), listed)
    };
    let reason = description.unwrap_or(CHOOSE_SUPPORTED);
    format!(
        "Could not add {} because the format is unsupported. {}",
        detail, reason
    )
}
