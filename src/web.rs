use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use askama::Template;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path as UrlPath, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::multipart::{Multipart, MultipartRejection};
use serde::Serialize;
use tokio::net::TcpListener;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{cors::CorsLayer, services::ServeFile};

use crate::compressor::CompressionBackend;
use crate::config::{AppConfig, APP_NAME, APP_SUBTITLE};
use crate::error::{AppError, AppResult};
use crate::filename::{compressed_file_name, is_pdf_name, secure_filename};
use crate::quality::Quality;
use crate::stats::{human_size, SizeStats};

struct QualityOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

/// Upload form; values are HTML-escaped except the hint.
#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    app_name: &'static str,
    subtitle: &'static str,
    quality_options: Vec<QualityOption>,
    quality_hint: String,
    default_output_path: String,
}

impl IndexTemplate {
    fn new(config: &AppConfig) -> Self {
        Self {
            app_name: APP_NAME,
            subtitle: APP_SUBTITLE,
            quality_options: Quality::ALL
                .iter()
                .map(|q| QualityOption {
                    value: q.as_str(),
                    label: q.label(),
                    selected: *q == config.default_quality,
                })
                .collect(),
            quality_hint: config.quality_hint(),
            default_output_path: config.default_output_path.display().to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn CompressionBackend>,
}

impl AppState {
    pub fn new(config: AppConfig, backend: Arc<dyn CompressionBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompressionReport {
    pub success: bool,
    pub filename: String,
    pub original_size: String,
    pub compressed_size: String,
    pub reduction: String,
    pub saved: String,
    pub save_path: String,
    /// Preset actually used, after falling back for unknown values.
    pub quality: Quality,
}

impl CompressionReport {
    fn new(filename: String, stats: &SizeStats, save_path: &Path, quality: Quality) -> Self {
        Self {
            success: true,
            filename,
            original_size: stats.original_size(),
            compressed_size: stats.compressed_size(),
            reduction: stats.reduction(),
            saved: stats.saved(),
            save_path: save_path.display().to_string(),
            quality,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub success: bool,
    pub error: String,
}

impl ErrorReport {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CompressResponse {
    Success(CompressionReport),
    Failure(ErrorReport),
}

/// Raw multipart fields of a `/compress` request.
#[derive(Default)]
struct UploadForm {
    file: Option<(String, Bytes)>,
    quality: Option<String>,
    output_path: Option<String>,
}

/// A validated upload, ready to be written to the working directory.
struct PdfUpload {
    filename: String,
    bytes: Bytes,
}

impl PdfUpload {
    /// Nothing touches the disk before this passes.
    fn validate(file: Option<(String, Bytes)>) -> AppResult<Self> {
        let (client_name, bytes) = file.ok_or(AppError::NoFile)?;
        if client_name.is_empty() {
            return Err(AppError::NoFileSelected);
        }
        if !is_pdf_name(&client_name) {
            return Err(AppError::NotPdf);
        }
        let filename = secure_filename(&client_name);
        if !is_pdf_name(&filename) {
            return Err(AppError::InvalidFileName);
        }
        if bytes.is_empty() {
            return Err(AppError::EmptyFile);
        }
        Ok(Self { filename, bytes })
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(serve_index))
        .route("/compress", post(compress_api))
        .route("/download/:filename", get(download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

// Web server handlers
async fn serve_index(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    IndexTemplate::new(&state.config)
        .render()
        .map(Html)
        .map_err(|e| {
            log::error!("❌ Failed to render index page: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Business failures are reported in the JSON body; the status is always 200.
async fn compress_api(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<CompressResponse> {
    let result = match multipart {
        Ok(multipart) => handle_upload(&state, multipart).await,
        Err(rejection) => Err(AppError::BadRequest(rejection.to_string())),
    };

    match result {
        Ok(report) => Json(CompressResponse::Success(report)),
        Err(e) => {
            log::error!("❌ API: {}", e);
            Json(CompressResponse::Failure(ErrorReport::new(e.to_string())))
        }
    }
}

async fn read_form(mut multipart: Multipart) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await?;
                form.file = Some((filename, bytes));
            }
            "quality" => form.quality = Some(field.text().await?),
            "output_path" => form.output_path = Some(field.text().await?),
            _ => {}
        }
    }

    Ok(form)
}

async fn handle_upload(state: &AppState, multipart: Multipart) -> AppResult<CompressionReport> {
    let form = read_form(multipart).await?;
    let upload = PdfUpload::validate(form.file)?;
    let quality = Quality::from_form(form.quality.as_deref());

    // An absent field means "use the default"; an empty one means "don't copy".
    let destination = match form.output_path {
        Some(path) if path.trim().is_empty() => None,
        Some(path) => Some(PathBuf::from(path.trim())),
        None => Some(state.config.default_output_path.clone()),
    };

    compress_upload(state, upload, quality, destination.as_deref()).await
}

async fn compress_upload(
    state: &AppState,
    upload: PdfUpload,
    quality: Quality,
    destination: Option<&Path>,
) -> AppResult<CompressionReport> {
    let work_dir = &state.config.upload_folder;
    let input = work_dir.join(&upload.filename);
    tokio::fs::write(&input, &upload.bytes).await?;
    log::info!(
        "🔍 API: Processing {} ({}) at {} quality",
        upload.filename,
        human_size(upload.bytes.len() as u64),
        quality
    );

    let output_filename = compressed_file_name(&upload.filename);
    let temp_output = work_dir.join(&output_filename);

    let start_time = Instant::now();
    state.backend.compress(&input, &temp_output, quality).await?;
    let duration = start_time.elapsed();

    let stats = SizeStats::new(
        tokio::fs::metadata(&input).await?.len(),
        tokio::fs::metadata(&temp_output).await?.len(),
    );
    log::info!(
        "✅ API: Compressed {} in {:?} - {} -> {} ({}% reduction)",
        upload.filename,
        duration,
        human_size(stats.original),
        human_size(stats.compressed),
        stats.reduction()
    );

    let save_path = match destination {
        Some(dir) if is_dir(dir).await => {
            let final_path = dir.join(&output_filename);
            tokio::fs::copy(&temp_output, &final_path).await?;
            log::info!("📁 API: Saved copy to {}", final_path.display());
            final_path
        }
        Some(dir) => {
            log::warn!(
                "⚠️  API: Output directory {} does not exist, keeping result in working directory",
                dir.display()
            );
            temp_output
        }
        None => temp_output,
    };

    Ok(CompressionReport::new(output_filename, &stats, &save_path, quality))
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn download(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
    request: Request,
) -> Response {
    let safe_name = secure_filename(&filename);
    let path = state.config.upload_folder.join(&safe_name);

    let exists = !safe_name.is_empty()
        && tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
    if !exists {
        log::warn!("⚠️  Download requested for missing file {:?}", filename);
        return (StatusCode::NOT_FOUND, Json(ErrorReport::new("File not found"))).into_response();
    }

    let mut response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe_name)) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

pub async fn start_web_server(
    config: AppConfig,
    backend: Arc<dyn CompressionBackend>,
    host: &str,
    port: u16,
    open_browser: bool,
) -> Result<()> {
    config.prepare().await?;

    match backend.locate() {
        Ok(program) => log::info!("🔧 Using {} at {}", backend.name(), program.display()),
        Err(e) => log::warn!("⚠️  {}; compression requests will fail until it is installed", e),
    }

    let app = router(AppState::new(config, backend));

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow!("Failed to bind to {}: {}", addr, e))?;

    println!("\n{}", "=".repeat(60));
    println!("🚀 SlimPDF - PDF Compressor running at http://{}", addr);
    println!("⌨️  Press Ctrl+C to stop the server");
    println!("{}\n", "=".repeat(60));

    if open_browser {
        let url = format!("http://localhost:{}", port);
        if webbrowser::open(&url).is_err() {
            println!("💡 Open {} in your browser", url);
        }
    }

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow!("Server error: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::Request as HttpRequest;
    use serde_json::Value;
    use tempfile::TempDir;

    use crate::compressor::Ghostscript;
    use crate::compressor::testing::FakeBackend;

    const BOUNDARY: &str = "slimpdf-test-boundary";

    struct Harness {
        work: TempDir,
        app: Router,
    }

    fn harness(backend: Arc<dyn CompressionBackend>) -> Harness {
        harness_with_limit(backend, 100)
    }

    fn harness_with_limit(backend: Arc<dyn CompressionBackend>, max_upload_mb: usize) -> Harness {
        let work = tempfile::tempdir().unwrap();
        let config = AppConfig::new(
            work.path().to_path_buf(),
            Some(work.path().join("no-such-default")),
            max_upload_mb,
        );
        let app = router(AppState::new(config, backend));
        Harness { work, app }
    }

    enum Part<'a> {
        File(&'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(filename, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                             Content-Type: application/pdf\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_compress(app: &Router, parts: &[Part<'_>]) -> Value {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/compress")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn halving_a_ten_megabyte_pdf() {
        let h = harness(Arc::new(FakeBackend::producing(5_242_880)));
        let upload = vec![b'x'; 10_485_760];

        let json = post_compress(&h.app, &[Part::File("report.pdf", &upload)]).await;

        assert_eq!(json["success"], true);
        assert_eq!(json["filename"], "report_compressed.pdf");
        assert_eq!(json["original_size"], "10.00 MB");
        assert_eq!(json["compressed_size"], "5.00 MB");
        assert_eq!(json["reduction"], "50.00");
        assert_eq!(json["saved"], "5.00 MB");
        assert_eq!(
            json["save_path"],
            h.work.path().join("report_compressed.pdf").display().to_string()
        );
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_before_anything_is_written() {
        let h = harness(Arc::new(FakeBackend::producing(10)));

        let json = post_compress(&h.app, &[Part::File("notes.txt", b"hello")]).await;

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "File must be a PDF");
        assert!(files_in(h.work.path()).is_empty());
    }

    #[tokio::test]
    async fn missing_and_unnamed_files_are_reported() {
        let h = harness(Arc::new(FakeBackend::producing(10)));

        let json = post_compress(&h.app, &[Part::Text("quality", "ebook")]).await;
        assert_eq!(json["error"], "No file uploaded");

        let json = post_compress(&h.app, &[Part::File("", b"%PDF")]).await;
        assert_eq!(json["error"], "No file selected");

        let json = post_compress(&h.app, &[Part::File("empty.pdf", b"")]).await;
        assert_eq!(json["error"], "Uploaded file is empty");
    }

    #[tokio::test]
    async fn missing_tool_is_a_json_failure() {
        let bin = tempfile::tempdir().unwrap();
        let h = harness(Arc::new(Ghostscript::with_search_path(bin.path())));

        let json = post_compress(&h.app, &[Part::File("a.pdf", b"%PDF-1.4")]).await;

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Ghostscript not installed");
    }

    #[tokio::test]
    async fn tool_failure_includes_diagnostics() {
        let h = harness(Arc::new(FakeBackend::failing("Error: /syntaxerror in obj")));

        let json = post_compress(&h.app, &[Part::File("a.pdf", b"%PDF-1.4")]).await;

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "FakeTool error: Error: /syntaxerror in obj");
    }

    #[tokio::test]
    async fn missing_output_directory_keeps_result_in_working_directory() {
        let h = harness(Arc::new(FakeBackend::producing(4)));
        let missing = h.work.path().join("nowhere");

        let json = post_compress(
            &h.app,
            &[
                Part::File("a.pdf", b"%PDF-1.4 body"),
                Part::Text("output_path", &missing.display().to_string()),
            ],
        )
        .await;

        assert_eq!(json["success"], true);
        assert_eq!(
            json["save_path"],
            h.work.path().join("a_compressed.pdf").display().to_string()
        );
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn existing_output_directory_receives_a_copy() {
        let h = harness(Arc::new(FakeBackend::producing(4)));
        let out = tempfile::tempdir().unwrap();

        let json = post_compress(
            &h.app,
            &[
                Part::File("Quarterly Report.PDF", b"%PDF-1.4 body"),
                Part::Text("output_path", &out.path().display().to_string()),
            ],
        )
        .await;

        let expected = out.path().join("Quarterly_Report_compressed.pdf");
        assert_eq!(json["success"], true);
        assert_eq!(json["save_path"], expected.display().to_string());
        assert_eq!(std::fs::read(&expected).unwrap().len(), 4);
        assert!(h.work.path().join("Quarterly_Report_compressed.pdf").exists());
    }

    #[tokio::test]
    async fn quality_is_forwarded_with_printer_fallback() {
        let backend = Arc::new(FakeBackend::producing(1));
        let h = harness(backend.clone());

        let ebook =
            post_compress(&h.app, &[Part::Text("quality", "ebook"), Part::File("a.pdf", b"%PDF")]).await;
        let unknown =
            post_compress(&h.app, &[Part::Text("quality", "ultra"), Part::File("a.pdf", b"%PDF")]).await;
        let omitted = post_compress(&h.app, &[Part::File("a.pdf", b"%PDF")]).await;

        assert_eq!(ebook["quality"], "ebook");
        assert_eq!(unknown["quality"], "printer");
        assert_eq!(omitted["quality"], "printer");

        assert_eq!(
            *backend.seen.lock().unwrap(),
            [Quality::Ebook, Quality::Printer, Quality::Printer]
        );
    }

    #[tokio::test]
    async fn oversized_upload_is_a_json_failure() {
        let h = harness_with_limit(Arc::new(FakeBackend::producing(1)), 1);
        let upload = vec![b'x'; 2 * 1024 * 1024];

        let json = post_compress(&h.app, &[Part::File("big.pdf", &upload)]).await;

        assert_eq!(json["success"], false);
        assert!(files_in(h.work.path()).is_empty());
    }

    #[tokio::test]
    async fn non_multipart_request_is_a_json_failure() {
        let h = harness(Arc::new(FakeBackend::producing(1)));
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/compress")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn index_lists_presets_and_default_output() {
        let h = harness(Arc::new(FakeBackend::producing(1)));
        let request = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();

        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(html.contains(r#"<option value="printer" selected>"#));
        assert!(html.contains(r#"<option value="screen">"#));
        assert!(html.contains("no-such-default"));
        assert!(html.contains("Reduce your PDF file size with ease"));
        assert!(!html.contains("{{"));
        assert!(!html.contains("{%"));
    }

    #[tokio::test]
    async fn download_serves_attachment_from_working_directory() {
        let h = harness(Arc::new(FakeBackend::producing(1)));
        std::fs::write(h.work.path().join("a_compressed.pdf"), b"%PDF-small").unwrap();

        let request = HttpRequest::builder()
            .uri("/download/a_compressed.pdf")
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"a_compressed.pdf\""
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-small");
    }

    #[tokio::test]
    async fn download_cannot_escape_working_directory() {
        let h = harness(Arc::new(FakeBackend::producing(1)));

        let request = HttpRequest::builder()
            .uri("/download/..%2F..%2Fetc%2Fpasswd")
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn index_escapes_config_values_but_not_the_hint() {
        let config = AppConfig::new(
            PathBuf::from("/tmp/work"),
            Some(PathBuf::from("<b>out\"&x")),
            1,
        );

        let html = IndexTemplate::new(&config).render().unwrap();

        assert!(html.contains("&lt;b&gt;out&quot;&amp;x"));
        assert!(!html.contains("<b>out"));
        assert!(html.contains("<strong>Printer quality</strong>"));
    }
}
