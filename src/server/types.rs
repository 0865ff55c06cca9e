use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::ImageRecord;
use crate::imdb::{ExcludedImage, RankedImage};

/// 单次上传最多的图片数量
pub const MAX_UPLOAD_FILES: usize = 50;

/// 允许上传的图片类型
pub const ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

/// 上传请求参数
#[derive(TryFromMultipart)]
pub struct UploadRequest {
    #[form_data(limit = "5MiB")]
    pub images: Vec<FieldData<Bytes>>,
}

/// 上传表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct UploadForm {
    /// 上传的图片文件，最多 50 张，每张不超过 5MiB
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub images: Vec<String>,
}

/// 上传响应
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    /// 新增图片的数量
    pub added: usize,
    /// 内容重复而跳过的图片数量
    pub duplicate: usize,
    /// 每个上传文件对应的图片记录
    pub files: Vec<ImageRecord>,
}

/// 比较请求参数
#[derive(TryFromMultipart)]
pub struct CompareRequest {
    #[form_data(limit = "5MiB")]
    pub image: Option<FieldData<Bytes>>,
}

/// 比较表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct CompareForm {
    /// 查询图片，不超过 5MiB
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub image: String,
}

/// 单条比较结果
#[derive(Debug, Serialize, ToSchema)]
pub struct CompareResult {
    pub id: i64,
    pub name: String,
    /// 相似度，范围 0 到 1
    pub score: f64,
    /// 不同像素的数量
    pub diff_pixels: u64,
    /// 标准化图片的访问地址
    pub url: String,
}

impl From<RankedImage> for CompareResult {
    fn from(r: RankedImage) -> Self {
        Self {
            url: artifact_url(&r.artifact),
            id: r.id,
            name: r.name,
            score: r.score,
            diff_pixels: r.diff_pixels,
        }
    }
}

/// 比较响应
#[derive(Debug, Serialize, ToSchema)]
pub struct CompareResponse {
    /// 比较耗时，单位为毫秒
    pub time: u64,
    /// 候选图片总数
    pub total: usize,
    /// 被排除的图片数量
    pub excluded: usize,
    /// 被排除的图片及原因
    pub excluded_images: Vec<ExcludedImage>,
    /// 按相似度从高到低排序的结果
    pub results: Vec<CompareResult>,
}

/// 只包含提示信息的响应
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// 标准化图片的访问路径
pub fn artifact_url(key: &str) -> String {
    format!("/uploads/{key}.png")
}

/// 检查上传文件的类型
pub fn is_allowed_mime(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|t| ALLOWED_MIME_TYPES.contains(&t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_allowed_mime() {
        assert!(is_allowed_mime(Some("image/png")));
        assert!(is_allowed_mime(Some("image/gif")));
        assert!(!is_allowed_mime(Some("image/webp")));
        assert!(!is_allowed_mime(Some("text/plain")));
        assert!(!is_allowed_mime(None));
    }

    #[test]
    fn test_artifact_url() {
        assert_eq!(artifact_url("abc"), "/uploads/abc.png");
    }
}
