use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use axum_typed_multipart::TypedMultipart;
use log::info;

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::db::ImageRecord;
use crate::imdb::AddOutcome;
use crate::metrics;

/// 上传图片到数据库
#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = UploadResponse),
        (status = 400, body = MessageResponse),
        (status = 413, description = "单个文件超过 5MiB"),
    )
)]
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<UploadRequest>,
) -> Result<Json<UploadResponse>> {
    if data.images.is_empty() {
        return Err(AppError::bad_request("没有上传任何文件"));
    }
    if data.images.len() > MAX_UPLOAD_FILES {
        return Err(AppError::bad_request(format!("单次最多上传 {MAX_UPLOAD_FILES} 张图片")));
    }
    // 先检查所有文件，避免部分写入
    for file in &data.images {
        if !is_allowed_mime(file.metadata.content_type.as_deref()) {
            metrics::inc_upload("rejected");
            return Err(AppError::bad_request(format!(
                "不支持的文件类型: {}",
                file.metadata.content_type.as_deref().unwrap_or("unknown")
            )));
        }
    }

    let (mut added, mut duplicate) = (0, 0);
    let mut files = Vec::with_capacity(data.images.len());
    for file in data.images {
        let name = file.metadata.file_name.unwrap_or_default();
        let outcome = match state.db.add_image(&name, file.contents.to_vec()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::inc_upload("rejected");
                return Err(e.into());
            }
        };
        match &outcome {
            AddOutcome::Added(_) => {
                metrics::inc_upload("added");
                added += 1;
            }
            AddOutcome::Duplicate(_) => {
                metrics::inc_upload("duplicate");
                duplicate += 1;
            }
        }
        files.push(outcome.record().clone());
    }

    info!("上传完成: 新增 {added}, 重复 {duplicate}");
    Ok(Json(UploadResponse {
        message: "图片上传并处理成功".to_string(),
        added,
        duplicate,
        files,
    }))
}

/// 列出所有图片
#[utoipa::path(
    get,
    path = "/images",
    responses(
        (status = 200, body = Vec<ImageRecord>),
        (status = 404, body = MessageResponse),
    )
)]
pub async fn list_images_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ImageRecord>>> {
    let images = state.db.list_images().await?;
    if images.is_empty() {
        return Err(AppError::not_found("还没有上传任何图片"));
    }
    Ok(Json(images))
}

/// 获取单张图片的信息
#[utoipa::path(
    get,
    path = "/images/{id}",
    params(("id" = i64, Path, description = "图片 ID")),
    responses(
        (status = 200, body = ImageRecord),
        (status = 404, body = MessageResponse),
    )
)]
pub async fn get_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ImageRecord>> {
    Ok(Json(state.db.get_image(id).await?))
}

/// 与数据库中的所有图片比较
#[utoipa::path(
    post,
    path = "/image",
    request_body(content = CompareForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = CompareResponse),
        (status = 400, body = MessageResponse),
        (status = 413, description = "文件超过 5MiB"),
    )
)]
pub async fn compare_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<CompareRequest>,
) -> Result<Json<CompareResponse>> {
    let file = data.image.ok_or_else(|| AppError::bad_request("没有上传查询图片"))?;
    if !is_allowed_mime(file.metadata.content_type.as_deref()) {
        return Err(AppError::bad_request("不支持的文件类型"));
    }

    let start = Instant::now();
    info!("正在比较上传图片");
    let report = state.db.compare(file.contents.to_vec()).await?;

    Ok(Json(CompareResponse {
        time: start.elapsed().as_millis() as u64,
        total: report.total,
        excluded: report.excluded.len(),
        excluded_images: report.excluded,
        results: report.results.into_iter().map(CompareResult::from).collect(),
    }))
}

/// 删除图片
#[utoipa::path(
    delete,
    path = "/images/{id}",
    params(("id" = i64, Path, description = "图片 ID")),
    responses(
        (status = 200, body = MessageResponse),
        (status = 404, body = MessageResponse),
    )
)]
pub async fn delete_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let record = state.db.remove_image(id).await?;
    Ok(Json(MessageResponse::new(format!("图片已删除: {}", record.name))))
}
