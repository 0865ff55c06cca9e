use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::task::spawn_blocking;
use utoipa::ToSchema;

use crate::canonical::{ArtifactStore, CanonicalBuffer, Canonicalizer};
use crate::config::{CompareOptions, ConfDir};
use crate::db::{Database, ImageRecord, crud, init_db};
use crate::error::CompareError;
use crate::metrics;
use crate::rank::Ranker;
use crate::utils::sanitize_name;

pub struct IMDBBuilder {
    conf_dir: ConfDir,
    wal: bool,
    compare: CompareOptions,
}

impl IMDBBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self {
            conf_dir,
            wal: true,
            compare: CompareOptions::default(),
        }
    }

    /// 是否启用 WAL 模式
    pub fn wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }

    /// 比较参数
    pub fn compare(mut self, compare: CompareOptions) -> Self {
        self.compare = compare;
        self
    }

    pub async fn open(self) -> Result<IMDB> {
        if !self.conf_dir.path().exists() {
            std::fs::create_dir_all(self.conf_dir.path())?;
        }
        let db = init_db(self.conf_dir.database(), self.wal).await?;
        let artifacts = ArtifactStore::open(self.conf_dir.artifacts())?;
        let ranker = Ranker::new(self.compare.diff_options(), self.compare.workers)?;

        Ok(IMDB {
            db,
            artifacts,
            canonicalizer: Arc::new(Canonicalizer::default()),
            ranker: Arc::new(ranker),
        })
    }
}

/// 添加图片的结果
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "image", rename_all = "lowercase")]
pub enum AddOutcome {
    /// 新添加的图片
    Added(ImageRecord),
    /// 内容完全相同的图片已经存在
    Duplicate(ImageRecord),
}

impl AddOutcome {
    pub fn record(&self) -> &ImageRecord {
        match self {
            Self::Added(record) | Self::Duplicate(record) => record,
        }
    }
}

/// 带有图片信息的比较结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankedImage {
    pub id: i64,
    pub name: String,
    pub artifact: String,
    /// 相似度，范围 0 到 1
    pub score: f64,
    /// 不同像素的数量
    pub diff_pixels: u64,
}

/// 因错误未参与排序的图片
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExcludedImage {
    pub id: i64,
    pub name: String,
    /// 错误原因
    pub reason: String,
}

/// 一次比较的完整报告
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompareReport {
    /// 候选图片总数
    pub total: usize,
    /// 按相似度从高到低排序的结果
    pub results: Vec<RankedImage>,
    /// 被排除的图片
    pub excluded: Vec<ExcludedImage>,
}

pub struct IMDB {
    db: Database,
    artifacts: ArtifactStore,
    canonicalizer: Arc<Canonicalizer>,
    ranker: Arc<Ranker>,
}

impl IMDB {
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn ranker(&self) -> &Ranker {
        &self.ranker
    }

    /// 解码并标准化图片
    pub async fn canonicalize(&self, data: Vec<u8>) -> Result<CanonicalBuffer> {
        let canonicalizer = self.canonicalizer.clone();
        let buffer = spawn_blocking(move || canonicalizer.canonicalize_bytes(&data)).await??;
        Ok(buffer)
    }

    /// 添加图片，内容相同的图片只会保存一次
    pub async fn add_image(&self, name: &str, data: Vec<u8>) -> Result<AddOutcome> {
        let name = sanitize_name(name);
        let hash = blake3::hash(&data);
        if let Some(record) = crud::find_image_by_hash(&self.db, hash.as_bytes()).await? {
            debug!("图片已存在: {} -> {}", name, record.id);
            return Ok(AddOutcome::Duplicate(record));
        }

        let buffer = self.canonicalize(data).await?;
        let key = self.artifacts.generate_key();
        let artifacts = self.artifacts.clone();
        spawn_blocking({
            let key = key.clone();
            move || artifacts.write(&key, &buffer)
        })
        .await??;

        let id = match crud::add_image(&self.db, &name, &key, hash.as_bytes()).await {
            Ok(id) => id,
            Err(e) => {
                // 记录写入失败时不保留孤立的文件
                if let Err(e) = self.artifacts.remove(&key) {
                    warn!("删除标准化图片失败: {e}");
                }
                // 相同内容的图片被并发添加，以先写入的记录为准
                if crud::is_unique_violation(&e) {
                    if let Some(record) = crud::find_image_by_hash(&self.db, hash.as_bytes()).await? {
                        debug!("图片已被并发添加: {} -> {}", name, record.id);
                        return Ok(AddOutcome::Duplicate(record));
                    }
                }
                return Err(e.into());
            }
        };

        let record = crud::get_image(&self.db, id).await?.ok_or(CompareError::NotFound(id))?;
        info!("添加图片: {} -> {}", record.name, record.id);
        Ok(AddOutcome::Added(record))
    }

    pub async fn get_image(&self, id: i64) -> Result<ImageRecord> {
        Ok(crud::get_image(&self.db, id).await?.ok_or(CompareError::NotFound(id))?)
    }

    pub async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        Ok(crud::list_images(&self.db).await?)
    }

    pub async fn count_images(&self) -> Result<i64> {
        Ok(crud::count_images(&self.db).await?)
    }

    /// 将查询图片与数据库中的所有图片比较
    ///
    /// 查询图片无法解码时直接返回错误；单张候选图片出错只会使其被排除。
    /// 比较完成后会将相似度写入每张图片的 `last_score` 缓存。
    pub async fn compare(&self, data: Vec<u8>) -> Result<CompareReport> {
        let start = Instant::now();
        let query = self.canonicalize(data).await?;
        let report = self.compare_canonical(query).await?;
        let elapsed = start.elapsed();

        metrics::observe_compare(report.total, report.excluded.len(), elapsed.as_secs_f64());
        info!(
            "比较完成: {} 张候选图片, {} 张被排除, 耗时 {:.2}s",
            report.total,
            report.excluded.len(),
            elapsed.as_secs_f32()
        );

        Ok(report)
    }

    /// 使用已经标准化的查询图片进行比较
    pub async fn compare_canonical(&self, query: CanonicalBuffer) -> Result<CompareReport> {
        let records = crud::list_images(&self.db).await?;
        let candidates = records
            .iter()
            .map(|record| (record.id, self.artifacts.artifact(&record.artifact)))
            .collect::<Vec<_>>();

        let ranker = self.ranker.clone();
        let ranking = spawn_blocking(move || ranker.rank(&query, candidates)).await?;

        // records 按 id 升序排列
        let find = |id: i64| {
            let idx = records.binary_search_by_key(&id, |r| r.id).ok();
            idx.map(|idx| &records[idx])
        };

        let results = ranking
            .results
            .iter()
            .filter_map(|r| {
                find(r.id).map(|record| RankedImage {
                    id: record.id,
                    name: record.name.clone(),
                    artifact: record.artifact.clone(),
                    score: r.score,
                    diff_pixels: r.diff_pixels,
                })
            })
            .collect::<Vec<_>>();

        let excluded = ranking
            .excluded
            .iter()
            .filter_map(|e| {
                let record = find(e.id)?;
                warn!("排除图片 {} ({}): {}", record.id, record.name, e.error);
                Some(ExcludedImage {
                    id: record.id,
                    name: record.name.clone(),
                    reason: e.error.to_string(),
                })
            })
            .collect::<Vec<_>>();

        self.cache_scores(&results).await;

        Ok(CompareReport { total: ranking.total(), results, excluded })
    }

    /// 写入相似度缓存，每条记录独立更新
    async fn cache_scores(&self, results: &[RankedImage]) {
        let workers = self.ranker.workers();
        futures::stream::iter(results)
            .for_each_concurrent(workers, |r| async move {
                match crud::cache_last_score(&self.db, r.id, r.score).await {
                    Ok(true) => {}
                    Ok(false) => debug!("图片 {} 已被删除，跳过缓存写入", r.id),
                    Err(e) => warn!("写入图片 {} 的相似度缓存失败: {e}", r.id),
                }
            })
            .await;
    }

    /// 删除图片记录及其标准化图片文件
    pub async fn remove_image(&self, id: i64) -> Result<ImageRecord> {
        let record = self.get_image(id).await?;

        if !self.artifacts.remove(&record.artifact)? {
            warn!("标准化图片文件不存在: {}", self.artifacts.path(&record.artifact).display());
        }
        if !crud::delete_image(&self.db, id).await? {
            return Err(CompareError::NotFound(id).into());
        }

        info!("删除图片: {} ({})", record.id, record.name);
        Ok(record)
    }

    /// 清理失效数据：删除没有对应记录的文件，以及文件已经丢失的记录
    ///
    /// 返回 (删除的文件数量, 删除的记录数量)
    pub async fn clean(&self) -> Result<(usize, usize)> {
        let records = crud::list_images(&self.db).await?;
        let keys = self.artifacts.keys()?;

        let mut removed_files = 0;
        for key in &keys {
            if records.iter().all(|r| &r.artifact != key) {
                debug!("删除孤立文件: {}", key);
                self.artifacts.remove(key)?;
                removed_files += 1;
            }
        }

        let mut removed_records = 0;
        for record in &records {
            if keys.binary_search(&record.artifact).is_err() {
                debug!("删除文件丢失的记录: {} ({})", record.id, record.name);
                crud::delete_image(&self.db, record.id).await?;
                removed_records += 1;
            }
        }

        Ok((removed_files, removed_records))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn png(w: u32, h: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(w, h, Rgba(color));
        let mut data = Cursor::new(vec![]);
        image.write_to(&mut data, ImageFormat::Png).unwrap();
        data.into_inner()
    }

    async fn open(dir: &tempfile::TempDir) -> IMDB {
        let compare = CompareOptions { workers: 2, ..Default::default() };
        IMDBBuilder::new(ConfDir::new(dir.path())).compare(compare).open().await.unwrap()
    }

    #[tokio::test]
    async fn test_add_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir).await;

        let data = png(10, 10, [1, 2, 3, 255]);
        let first = db.add_image("a b.png", data.clone()).await.unwrap();
        let second = db.add_image("c.png", data).await.unwrap();

        assert!(matches!(first, AddOutcome::Added(_)));
        assert!(matches!(second, AddOutcome::Duplicate(_)));
        assert_eq!(first.record().id, second.record().id);
        assert_eq!(first.record().name, "a_b.png");
        assert_eq!(db.count_images().await.unwrap(), 1);
        assert!(db.artifacts().path(&first.record().artifact).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_add_duplicate_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir).await;

        let data = png(32, 32, [9, 8, 7, 255]);
        let (a, b) = tokio::join!(db.add_image("a.png", data.clone()), db.add_image("b.png", data));
        let (a, b) = (a.unwrap(), b.unwrap());

        let added = [&a, &b].iter().filter(|o| matches!(o, AddOutcome::Added(_))).count();
        assert_eq!(added, 1);
        assert_eq!(a.record().id, b.record().id);
        assert_eq!(db.count_images().await.unwrap(), 1);
        assert_eq!(db.artifacts().keys().unwrap(), vec![a.record().artifact.clone()]);
    }

    #[tokio::test]
    async fn test_add_invalid_image() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir).await;

        let err = db.add_image("x.png", b"garbage".to_vec()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CompareError>(), Some(CompareError::Decode(_))));
        assert_eq!(db.count_images().await.unwrap(), 0);
        assert!(db.artifacts().keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compare_updates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir).await;

        let white = db.add_image("white.png", png(20, 20, [255, 255, 255, 255])).await.unwrap();
        let black = db.add_image("black.png", png(20, 20, [0, 0, 0, 255])).await.unwrap();

        let report = db.compare(png(40, 40, [255, 255, 255, 255])).await.unwrap();
        assert_eq!(report.total, 2);
        assert!(report.excluded.is_empty());
        assert_eq!(report.results[0].id, white.record().id);
        assert_eq!(report.results[0].score, 1.0);
        assert_eq!(report.results[1].id, black.record().id);
        assert_eq!(report.results[1].score, 0.0);

        assert_eq!(db.get_image(white.record().id).await.unwrap().last_score, 1.0);
        assert_eq!(db.get_image(black.record().id).await.unwrap().last_score, 0.0);

        // 缓存只反映最近一次比较
        db.compare(png(40, 40, [0, 0, 0, 255])).await.unwrap();
        assert_eq!(db.get_image(white.record().id).await.unwrap().last_score, 0.0);
        assert_eq!(db.get_image(black.record().id).await.unwrap().last_score, 1.0);
    }

    #[tokio::test]
    async fn test_compare_invalid_query() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir).await;
        db.add_image("white.png", png(20, 20, [255, 255, 255, 255])).await.unwrap();

        let err = db.compare(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CompareError>(), Some(CompareError::Decode(_))));
    }

    #[tokio::test]
    async fn test_remove_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir).await;

        let a = db.add_image("a.png", png(8, 8, [255, 0, 0, 255])).await.unwrap();
        let b = db.add_image("b.png", png(8, 8, [0, 255, 0, 255])).await.unwrap();
        let (a, b) = (a.record().clone(), b.record().clone());

        let removed = db.remove_image(a.id).await.unwrap();
        assert_eq!(removed.id, a.id);
        assert!(!db.artifacts().path(&a.artifact).exists());
        let err = db.remove_image(a.id).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CompareError>(), Some(CompareError::NotFound(_))));

        // 删除后的图片不再参与比较
        let report = db.compare(png(8, 8, [255, 0, 0, 255])).await.unwrap();
        assert_eq!(report.total, 1);
        assert!(report.excluded.is_empty());
        assert_eq!(report.results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b.id]);

        // 文件丢失的记录和没有记录的文件都会被清理
        std::fs::remove_file(db.artifacts().path(&b.artifact)).unwrap();
        std::fs::write(db.artifacts().path("orphan"), b"x").unwrap();
        assert_eq!(db.clean().await.unwrap(), (1, 1));
        assert_eq!(db.count_images().await.unwrap(), 0);
        assert!(db.artifacts().keys().unwrap().is_empty());
    }
}
