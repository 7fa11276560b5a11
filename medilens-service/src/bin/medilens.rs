//! Command-line front end: run the diagnostic pipeline on local images and save the reports.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use medilens_flow::{FlowRunner, ImageInput};
use medilens_service::{
    ReportFormat, ReportRenderer, ServiceConfig, create_flow_runner, logging::init_tracing,
};
use tracing::{error, info};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
const PREVIEW_CHARS: usize = 1200;

/// MediLens: multi-stage diagnostic reports for medical images.
#[derive(Parser, Debug)]
#[command(name = "medilens")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Image file, or a directory whose .png/.jpg/.jpeg files are processed in name order
    #[arg(short, long)]
    image: PathBuf,

    /// Clinical question to answer
    #[arg(short, long, default_value = "Are there any abnormalities?")]
    query: String,

    /// Retrieve reference context before reasoning
    #[arg(long)]
    use_context: bool,

    /// Directory the reports are written to
    #[arg(short, long, default_value = "reports")]
    output: PathBuf,

    /// Save a PDF instead of Markdown
    #[arg(long)]
    as_pdf: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!(failed, "some images could not be processed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns the number of images that failed
async fn run(cli: Cli) -> anyhow::Result<usize> {
    let config = ServiceConfig::from_env()?;
    let runner = create_flow_runner(&config).await?;
    let renderer = ReportRenderer::new(&cli.output);
    let format = if cli.as_pdf {
        ReportFormat::Pdf
    } else {
        ReportFormat::Markdown
    };

    let images = collect_images(&cli.image)?;
    info!(images = images.len(), output = %cli.output.display(), "processing images");

    let mut failed = 0;
    for path in &images {
        match diagnose_file(&runner, &renderer, path, &cli.query, cli.use_context, format).await {
            Ok(saved) => println!("Report saved to {}\n", saved.display()),
            Err(e) => {
                failed += 1;
                error!(image = %path.display(), "diagnosis failed: {:#}", e);
            }
        }
    }
    Ok(failed)
}

async fn diagnose_file(
    runner: &FlowRunner,
    renderer: &ReportRenderer,
    path: &Path,
    query: &str,
    use_context: bool,
    format: ReportFormat,
) -> anyhow::Result<PathBuf> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string);
    let image = ImageInput::from_bytes(bytes, filename.clone())?;

    println!("=== {} ===", path.display());
    let session = runner.run(image, query, use_context).await?;
    let report = session
        .report()
        .context("pipeline finished without a report")?;

    let markdown = report.to_markdown();
    println!("{}", preview(&markdown, PREVIEW_CHARS));

    Ok(renderer.save(report, filename.as_deref(), format).await?)
}

/// A single file, or every supported image in a directory sorted by name
fn collect_images(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = std::fs::read_dir(path)
        .with_context(|| format!("{} is neither a file nor a readable directory", path.display()))?;
    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    images.sort();

    if images.is_empty() {
        anyhow::bail!("no .png/.jpg/.jpeg images found in {}", path.display());
    }
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => format!("{}\n...", &text[..end]),
        None => text.to_string(),
    }
}
