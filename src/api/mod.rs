pub mod downloads;
pub mod files;
pub mod progress;
pub mod server;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the HTTP router / 构建路由
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(server::health_check))
        .route("/youtube/download", post(downloads::start_video_download))
        .route("/youtube/status/:task_id", get(downloads::get_status))
        .route("/spotify/download", post(downloads::start_music_download))
        .route("/spotify/status/:task_id", get(downloads::get_status))
        // 通用入口，等同视频下载
        .route("/download", post(downloads::start_video_download))
        .route("/status/:task_id", get(downloads::get_status))
        .route("/download/:filename", get(files::download_file))
        .route("/ws/progress/:task_id", get(progress::progress_ws))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
