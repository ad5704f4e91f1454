use anyhow::{bail, Context, Result};
use batch_convert_core::{
    Attempt, Converter, ConverterConfig, OutputFormat, RunOutcome, SaveDialog, SourceFile,
    StatusEvent, StatusSink, Tone,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Convert images and PDF pages to JPG, PNG, WebP, GIF or PDF
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files to convert, in order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output format (jpg, png, webp, gif, pdf)
    #[arg(short, long, value_parser = parse_format)]
    format: Option<OutputFormat>,

    /// Quality preset (normal, high, ultra)
    #[arg(short, long, default_value = "normal")]
    quality: String,

    /// PDF output mode (merged, separate)
    #[arg(short, long, default_value = "merged")]
    mode: String,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Job slug used for archive and merged file names
    #[arg(long)]
    slug: Option<String>,

    /// Accept PDF files as input
    #[arg(long)]
    pdf_input: bool,

    /// Save a single result to this path
    #[arg(long)]
    save_as: Option<PathBuf>,

    /// Save several results into this directory
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,

    /// Folder used when no save target was given
    #[arg(short, long, default_value = ".")]
    downloads: PathBuf,

    /// Print progress updates
    #[arg(short, long)]
    verbose: bool,
}

fn parse_format(key: &str) -> std::result::Result<OutputFormat, String> {
    OutputFormat::from_key(key).ok_or_else(|| format!("unknown output format '{}'", key))
}

/// Save targets given on the command line stand in for the dialogs.
struct PresetDialog {
    file: Option<PathBuf>,
    directory: Option<PathBuf>,
}

impl SaveDialog for PresetDialog {
    fn pick_file(&self, suggested_name: &str, _mime_type: &str) -> Attempt<PathBuf> {
        match &self.file {
            Some(path) if path.is_dir() => Attempt::Done(path.join(suggested_name)),
            Some(path) => Attempt::Done(path.clone()),
            None => Attempt::Unavailable("no --save-as target".to_string()),
        }
    }

    fn pick_directory(&self) -> Attempt<PathBuf> {
        match &self.directory {
            Some(dir) => Attempt::Done(dir.clone()),
            None => Attempt::Unavailable("no --output-dir target".to_string()),
        }
    }
}

/// Prints status lines; progress only when verbose, in 10% steps.
struct ConsoleSink {
    verbose: bool,
    last_progress: AtomicU8,
}

impl StatusSink for ConsoleSink {
    fn emit(&self, event: StatusEvent) {
        match event {
            StatusEvent::Status { text, tone } => match tone {
                Tone::Warn | Tone::Error => eprintln!("[{}] {}", tone, text),
                Tone::Info | Tone::Success => println!("{}", text),
            },
            StatusEvent::Progress(percent) if self.verbose => {
                let step = percent / 10 * 10;
                if self.last_progress.swap(step, Ordering::Relaxed) != step {
                    println!("  {:>3}%", step);
                }
            }
            StatusEvent::Progress(_) => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "batch_convert_core=debug"
    } else {
        "batch_convert_core=warn"
    };
    batch_convert_core::init_logging_with_default(default_filter);

    let mut config = match &args.config {
        Some(path) => ConverterConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConverterConfig::default(),
    };
    if let Some(slug) = &args.slug {
        config = config.slug(slug.clone());
    }
    if args.pdf_input {
        config = config.allow_document_input(true);
    }

    let sink = Arc::new(ConsoleSink {
        verbose: args.verbose,
        last_progress: AtomicU8::new(0),
    });
    let dialog = Arc::new(PresetDialog {
        file: args.save_as.clone(),
        directory: args.output_dir.clone(),
    });

    let mut converter = Converter::builder()
        .config(config)
        .dialog(dialog)
        .downloads_dir(&args.downloads)
        .status_sink(sink)
        .build()
        .context("Failed to set up converter")?;

    if let Some(format) = args.format {
        let chosen = converter.set_output_format(format);
        if chosen != format {
            eprintln!("{} output is not offered, using {}", format, chosen);
        }
    }
    converter.set_quality(&args.quality);
    converter.set_merge_mode(&args.mode);

    let mut files = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let file = SourceFile::from_path(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }
    let report = converter.add_files(files);
    debug!("Intake: {:?}", report);

    if converter.queue().is_empty() {
        bail!("No valid files were added");
    }

    match converter.run().await? {
        RunOutcome::Delivered { paths, .. } => {
            for path in paths {
                println!("{}", path.display());
            }
            Ok(())
        }
        RunOutcome::Cancelled => Ok(()),
        RunOutcome::Empty => bail!("No files could be converted"),
        RunOutcome::Ignored => bail!("Nothing to convert"),
    }
}
