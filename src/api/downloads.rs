use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};

use crate::error::{AppError, Result};
use crate::requests::{FetchRequest, MusicRequest, VideoRequest};
use crate::state::AppState;
use crate::task::{StartedTask, TaskRecord};

/// POST /youtube/download, POST /download - 视频站点下载
pub async fn start_video_download(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<VideoRequest>, JsonRejection>,
) -> Result<Json<StartedTask>> {
    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let started = state.task_manager.start_task(FetchRequest::Video(req)).await?;
    Ok(Json(started))
}

/// POST /spotify/download - 音乐平台下载
pub async fn start_music_download(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<MusicRequest>, JsonRejection>,
) -> Result<Json<StartedTask>> {
    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let started = state.task_manager.start_task(FetchRequest::Music(req)).await?;
    Ok(Json(started))
}

/// GET /status/:task_id - 查询任务状态
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>> {
    state.task_manager.get_status(&task_id).map(Json)
}
