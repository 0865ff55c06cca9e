use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// 图片记录
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, ToSchema)]
pub struct ImageRecord {
    /// 图片 ID
    pub id: i64,
    /// 上传时的文件名
    pub name: String,
    /// 标准化图片文件的 key
    pub artifact: String,
    /// 原始文件的 blake3 哈希
    #[serde(skip)]
    pub hash: Vec<u8>,
    /// 最近一次比较得到的相似度，只是缓存，每次比较都会被覆盖
    pub last_score: f64,
    /// 创建时间，unix 时间戳
    pub created_at: i64,
    /// 更新时间，unix 时间戳
    pub updated_at: i64,
}
