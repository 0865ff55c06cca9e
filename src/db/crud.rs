use sqlx::{Executor, Result, Sqlite, SqlitePool};

use super::ImageRecord;
use crate::utils::unix_now;

/// 添加图片记录
pub async fn add_image<'c, E>(executor: E, name: &str, artifact: &str, hash: &[u8]) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let now = unix_now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO image (name, artifact, hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(artifact)
    .bind(hash)
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// 是否为唯一约束冲突
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(e) if e.is_unique_violation())
}

/// 根据 ID 获取图片记录
pub async fn get_image(executor: &SqlitePool, id: i64) -> Result<Option<ImageRecord>> {
    sqlx::query_as(
        r#"
        SELECT id, name, artifact, hash, last_score, created_at, updated_at
        FROM image WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// 根据哈希查找图片记录
pub async fn find_image_by_hash(executor: &SqlitePool, hash: &[u8]) -> Result<Option<ImageRecord>> {
    sqlx::query_as(
        r#"
        SELECT id, name, artifact, hash, last_score, created_at, updated_at
        FROM image WHERE hash = ? ORDER BY id ASC LIMIT 1
        "#,
    )
    .bind(hash)
    .fetch_optional(executor)
    .await
}

/// 按添加顺序获取所有图片记录
pub async fn list_images(executor: &SqlitePool) -> Result<Vec<ImageRecord>> {
    sqlx::query_as(
        r#"
        SELECT id, name, artifact, hash, last_score, created_at, updated_at
        FROM image ORDER BY id ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 写入最近一次比较的相似度缓存
///
/// 返回记录是否存在，比较过程中被删除的记录不会被重新创建
pub async fn cache_last_score(executor: &SqlitePool, id: i64, score: f64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE image SET last_score = ?, updated_at = ? WHERE id = ?
        "#,
    )
    .bind(score)
    .bind(unix_now())
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// 删除图片记录，返回记录是否存在
pub async fn delete_image(executor: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM image WHERE id = ?").bind(id).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}

/// 查询图片数量
pub async fn count_images(executor: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM image").fetch_one(executor).await
}
