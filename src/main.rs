mod compressor;
mod config;
mod error;
mod filename;
mod quality;
mod stats;
mod web;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use walkdir::WalkDir;

use crate::compressor::{CompressionBackend, Ghostscript};
use crate::config::AppConfig;
use crate::filename::{compressed_file_name, is_pdf_name};
use crate::quality::Quality;
use crate::stats::{human_size, SizeStats};

/// CLI options
#[derive(Parser, Debug)]
#[command(author, version, about = "Shrink PDFs with Ghostscript, from a web UI or the command line")]
struct Args {
    /// Launch web UI (default mode if no input provided)
    #[arg(long, action = ArgAction::SetTrue)]
    web: bool,

    /// Address the web server binds to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port for web server
    #[arg(long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Working directory for uploads and compressed files
    #[arg(long, env = "UPLOAD_FOLDER", default_value = "/tmp/pdf_uploads")]
    upload_folder: PathBuf,

    /// Directory suggested in the web form for saving results (defaults to ~/Downloads)
    #[arg(long, env = "DEFAULT_OUTPUT_PATH")]
    default_output_path: Option<PathBuf>,

    /// Largest accepted upload, in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value = "100")]
    max_upload_mb: usize,

    /// Don't open the browser when the web UI starts
    #[arg(long, action = ArgAction::SetTrue)]
    no_open: bool,

    /// Input PDFs or directories (CLI mode)
    inputs: Vec<PathBuf>,

    /// Output directory (defaults to same folder as each file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compression preset (CLI mode)
    #[arg(short, long, value_enum, default_value_t = Quality::Printer)]
    quality: Quality,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let backend: Arc<dyn CompressionBackend> = Arc::new(Ghostscript::new());

    // Auto-detect mode: web if no input provided or --web flag
    if args.web || args.inputs.is_empty() {
        let config = AppConfig::new(
            args.upload_folder.clone(),
            args.default_output_path.clone(),
            args.max_upload_mb,
        );
        return web::start_web_server(config, backend, &args.host, args.port, !args.no_open).await;
    }

    run_cli_mode(&args, backend.as_ref()).await
}

fn discover_files(input_path: &Path) -> Vec<PathBuf> {
    if input_path.is_file() {
        if input_path.to_str().is_some_and(is_pdf_name) {
            return vec![input_path.to_path_buf()];
        }
        return vec![];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(input_path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| p.to_str().is_some_and(is_pdf_name))
        // Skip our own output when a directory is compressed twice
        .filter(|p| {
            !p.file_stem()
                .and_then(OsStr::to_str)
                .is_some_and(|stem| stem.ends_with("_compressed"))
        })
        .collect();
    files.sort();
    files
}

fn build_output_path(src: &Path, output_dir: Option<&Path>) -> PathBuf {
    let name = src.file_name().and_then(OsStr::to_str).unwrap_or("output.pdf");
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| src.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(compressed_file_name(name))
}

async fn run_cli_mode(args: &Args, backend: &dyn CompressionBackend) -> Result<()> {
    let program = backend.locate()?;
    log::info!("🔧 Using {} at {}", backend.name(), program.display());

    for input in &args.inputs {
        if !input.exists() {
            return Err(anyhow!("Input path does not exist: {}", input.display()));
        }
    }

    let mut files: Vec<PathBuf> = args.inputs.iter().flat_map(|p| discover_files(p)).collect();
    files.sort();
    files.dedup();
    if files.is_empty() {
        eprintln!("No PDF files found.");
        return Ok(());
    }

    if let Some(out) = &args.output {
        tokio::fs::create_dir_all(out)
            .await
            .with_context(|| format!("cannot create {}", out.display()))?;
    }

    let mut total = SizeStats::new(0, 0);
    let mut processed = 0usize;

    for file in &files {
        let out_path = build_output_path(file, args.output.as_deref());
        let name = file.file_name().and_then(OsStr::to_str).unwrap_or("file");

        match compress_file(backend, file, &out_path, args.quality).await {
            Ok(stats) => {
                println!(
                    "{}: {} → {} (saved {} / {}%)",
                    name,
                    human_size(stats.original),
                    human_size(stats.compressed),
                    human_size(stats.original.saturating_sub(stats.compressed)),
                    stats.reduction()
                );
                total.original += stats.original;
                total.compressed += stats.compressed;
                processed += 1;
            }
            Err(e) => eprintln!("{}: failed ({})", file.display(), e),
        }
    }

    if processed > 0 {
        println!(
            "\nProcessed {} file(s): {} → {} (saved {} / {}%)",
            processed,
            human_size(total.original),
            human_size(total.compressed),
            human_size(total.original.saturating_sub(total.compressed)),
            total.reduction()
        );
    } else {
        eprintln!("No files compressed.");
    }

    Ok(())
}

async fn compress_file(
    backend: &dyn CompressionBackend,
    input: &Path,
    output: &Path,
    quality: Quality,
) -> Result<SizeStats> {
    backend.compress(input, output, quality).await?;
    let original = tokio::fs::metadata(input).await?.len();
    let compressed = tokio::fs::metadata(output).await?.len();
    Ok(SizeStats::new(original, compressed))
}
