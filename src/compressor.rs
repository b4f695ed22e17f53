use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{AppError, AppResult};
use crate::quality::Quality;

/// An external tool that rewrites a PDF into a smaller one.
///
/// Discovery and argument construction are separate so another executable
/// can be plugged in; `compress` runs the located program once and treats
/// a non-zero exit as failure.
#[async_trait]
pub trait CompressionBackend: Send + Sync {
    /// Tool name used in error messages.
    fn name(&self) -> &str;

    fn locate(&self) -> AppResult<PathBuf>;

    fn build_args(&self, input: &Path, output: &Path, quality: Quality) -> Vec<OsString>;

    async fn compress(&self, input: &Path, output: &Path, quality: Quality) -> AppResult<()> {
        let program = self.locate()?;
        let args = self.build_args(input, output, quality);
        log::debug!("🔧 Running {} {:?}", program.display(), args);

        let result = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| AppError::Spawn {
                tool: self.name().to_string(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(AppError::ToolFailed {
                tool: self.name().to_string(),
                stderr,
            });
        }

        Ok(())
    }
}

/// Ghostscript's `pdfwrite` device.
#[derive(Debug, Clone)]
pub struct Ghostscript {
    candidates: Vec<String>,
    search_path: Option<OsString>,
}

impl Ghostscript {
    pub const CANDIDATES: &'static [&'static str] = &["gs", "gswin64c", "gswin32c"];
    const COMPATIBILITY_LEVEL: &'static str = "1.4";
    const RESOLUTION_DPI: u32 = 150;

    pub fn new() -> Self {
        Self {
            candidates: Self::CANDIDATES.iter().map(|c| c.to_string()).collect(),
            search_path: None,
        }
    }

    /// Search `path` (same syntax as `PATH`) instead of the process `PATH`.
    pub fn with_search_path(path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(path.into()),
            ..Self::new()
        }
    }
}

impl Default for Ghostscript {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompressionBackend for Ghostscript {
    fn name(&self) -> &str {
        "Ghostscript"
    }

    fn locate(&self) -> AppResult<PathBuf> {
        let search_path = self
            .search_path
            .clone()
            .or_else(|| env::var_os("PATH"))
            .unwrap_or_default();

        self.candidates
            .iter()
            .find_map(|name| find_executable(name, &search_path))
            .ok_or_else(|| AppError::ToolMissing {
                tool: self.name().to_string(),
            })
    }

    fn build_args(&self, input: &Path, output: &Path, quality: Quality) -> Vec<OsString> {
        let mut output_flag = OsString::from("-sOutputFile=");
        output_flag.push(output);

        vec![
            "-sDEVICE=pdfwrite".into(),
            format!("-dCompatibilityLevel={}", Self::COMPATIBILITY_LEVEL).into(),
            format!("-dPDFSETTINGS=/{quality}").into(),
            "-dNOPAUSE".into(),
            "-dQUIET".into(),
            "-dBATCH".into(),
            "-dDetectDuplicateImages=true".into(),
            "-dCompressFonts=true".into(),
            format!("-r{}", Self::RESOLUTION_DPI).into(),
            output_flag,
            input.as_os_str().to_os_string(),
        ]
    }
}

fn find_executable(name: &str, search_path: &OsStr) -> Option<PathBuf> {
    env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| executable_names(name).into_iter().map(move |n| dir.join(n)))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn executable_names(name: &str) -> Vec<String> {
    vec![name.to_string(), format!("{name}.exe")]
}

#[cfg(not(windows))]
fn executable_names(name: &str) -> Vec<String> {
    vec![name.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
