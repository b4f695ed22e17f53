use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::quality::Quality;

pub const APP_NAME: &str = "📄 PDF Compressor";
pub const APP_SUBTITLE: &str = "Reduce your PDF file size with ease";
pub const QUALITY_RECOMMENDATION_LABEL: &str = "Printer quality";

/// Resolved settings shared by every request.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Working directory for uploads and compressed output.
    pub upload_folder: PathBuf,
    /// Where results are copied when the form leaves `output_path` untouched.
    pub default_output_path: PathBuf,
    pub max_upload_bytes: usize,
    pub default_quality: Quality,
}

impl AppConfig {
    pub fn new(
        upload_folder: PathBuf,
        default_output_path: Option<PathBuf>,
        max_upload_mb: usize,
    ) -> Self {
        Self {
            upload_folder,
            default_output_path: default_output_path.unwrap_or_else(downloads_dir),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            default_quality: Quality::default(),
        }
    }

    pub fn quality_hint(&self) -> String {
        format!(
            "<strong>{}</strong> is recommended for files under 20MB \
             when you want excellent quality with a smaller footprint.",
            QUALITY_RECOMMENDATION_LABEL
        )
    }

    /// Create the working directory if it does not exist yet.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.upload_folder)
            .await
            .with_context(|| format!("cannot create {}", self.upload_folder.display()))
    }
}

#[allow(deprecated)]
fn downloads_dir() -> PathBuf {
    std::env::home_dir()
        .map(|home| home.join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}
