use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::utils::resolve_within;

/// GET /download/:filename - 下载已完成的文件
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let path = resolve_within(&state.config.get_downloads_dir(), &filename).map_err(|e| {
        if matches!(e, AppError::PathSecurity(_)) {
            tracing::warn!("Rejected download path: {}", filename);
        }
        e
    })?;

    let file = tokio::fs::File::open(&path).await?;
    let size = file.metadata().await?.len();

    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.clone());
    let content_type = mime_guess::from_path(&path).first_or_octet_stream();
    let filename_encoded = urlencoding::encode(&display_name);
    // 非 ASCII 文件名只放在 filename* 里
    let ascii_name: String = display_name
        .chars()
        .map(|c| if c.is_ascii() && c != '"' { c } else { '_' })
        .collect();

    tracing::info!("Serving {} ({} bytes)", display_name, size);
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", ascii_name, filename_encoded),
        )
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}
