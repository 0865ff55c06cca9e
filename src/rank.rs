//! 相似度排序
//!
//! 每个候选图片的比较互不相关，因此在固定大小的 rayon 线程池中并发执行。
//! 同一时刻最多只会有 `workers` 个候选图片被解码到内存中。

use std::borrow::Cow;

use log::{debug, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;

use crate::canonical::{CanonicalBuffer, StoredArtifact};
use crate::diff::{DiffOptions, diff};
use crate::error::{CompareError, Result};
use crate::score::score;

/// 可以提供标准化像素缓冲区的候选图片
pub trait CandidateSource {
    fn load(&self) -> Result<Cow<'_, CanonicalBuffer>>;
}

impl CandidateSource for CanonicalBuffer {
    fn load(&self) -> Result<Cow<'_, CanonicalBuffer>> {
        Ok(Cow::Borrowed(self))
    }
}

impl<T: CandidateSource + ?Sized> CandidateSource for &T {
    fn load(&self) -> Result<Cow<'_, CanonicalBuffer>> {
        (**self).load()
    }
}

impl CandidateSource for StoredArtifact {
    fn load(&self) -> Result<Cow<'_, CanonicalBuffer>> {
        self.read().map(Cow::Owned)
    }
}

/// 单个候选图片的比较结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult<K> {
    pub id: K,
    /// 相似度，范围 0 到 1
    pub score: f64,
    /// 不同像素的数量
    pub diff_pixels: u64,
}

/// 因为错误被排除的候选图片
#[derive(Debug)]
pub struct Excluded<K> {
    pub id: K,
    pub error: CompareError,
}

/// 一次查询的排序结果
#[derive(Debug)]
pub struct Ranking<K> {
    /// 按相似度从高到低排序，相似度相同时保持候选图片的输入顺序
    pub results: Vec<ComparisonResult<K>>,
    /// 按输入顺序排列
    pub excluded: Vec<Excluded<K>>,
}

impl<K> Ranking<K> {
    /// 参与比较的候选图片总数
    pub fn total(&self) -> usize {
        self.results.len() + self.excluded.len()
    }
}

pub struct Ranker {
    options: DiffOptions,
    pool: ThreadPool,
}

impl Ranker {
    /// 创建排序器，`workers` 为并发比较的线程数，0 表示使用 CPU 核心数
    pub fn new(options: DiffOptions, workers: usize) -> anyhow::Result<Self> {
        let workers = if workers == 0 { num_cpus::get() } else { workers };
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("imcompare-rank-{i}"))
            .build()?;
        Ok(Self { options, pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// 将所有候选图片与查询图片比较，并按相似度排序
    ///
    /// 单个候选图片的错误只会导致该图片被排除，不会影响其他图片。
    pub fn rank<K, C>(&self, query: &CanonicalBuffer, candidates: Vec<(K, C)>) -> Ranking<K>
    where
        K: Send,
        C: CandidateSource + Send,
    {
        let options = &self.options;
        let outcomes: Vec<(K, Result<u64>)> = self.pool.install(|| {
            candidates
                .into_par_iter()
                .map(|(id, candidate)| {
                    let result = candidate.load().and_then(|buffer| diff(query, &buffer, options));
                    (id, result)
                })
                .collect()
        });

        let mut results = Vec::with_capacity(outcomes.len());
        let mut excluded = vec![];
        for (id, outcome) in outcomes {
            match outcome {
                Ok(diff_pixels) => {
                    let score = score(diff_pixels, query.width(), query.height());
                    results.push(ComparisonResult { id, score, diff_pixels });
                }
                Err(error) => excluded.push(Excluded { id, error }),
            }
        }

        // sort_by 是稳定排序，相同分数保持输入顺序
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!("比较完成: {} 张有效, {} 张被排除", results.len(), excluded.len());
        if !excluded.is_empty() {
            warn!("{} 张候选图片因错误被排除", excluded.len());
        }

        Ranking { results, excluded }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CHANNELS;

    fn filled(width: u32, height: u32, color: [u8; 4]) -> CanonicalBuffer {
        CanonicalBuffer::from_raw(width, height, color.repeat((width * height) as usize))
    }

    /// 左侧 `n` 列与查询图片不同
    fn with_columns(query: &CanonicalBuffer, n: u32, color: [u8; 4]) -> CanonicalBuffer {
        let mut data = query.as_bytes().to_vec();
        for y in 0..query.height() {
            for x in 0..n {
                let k = (y * query.width() + x) as usize * CHANNELS;
                data[k..k + CHANNELS].copy_from_slice(&color);
            }
        }
        CanonicalBuffer::from_raw(query.width(), query.height(), data)
    }

    fn ranker() -> Ranker {
        Ranker::new(DiffOptions::default(), 4).unwrap()
    }

    #[test]
    fn test_rank_sorted_descending() {
        let query = filled(10, 10, [255, 255, 255, 255]);
        let candidates = vec![
            (1, with_columns(&query, 5, [0, 0, 0, 255])),
            (2, query.clone()),
            (3, with_columns(&query, 8, [0, 0, 0, 255])),
            (4, with_columns(&query, 2, [0, 0, 0, 255])),
        ];

        let ranking = ranker().rank(&query, candidates);
        let ids = ranking.results.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 4, 1, 3]);
        assert_eq!(ranking.results[0].score, 1.0);
        assert_eq!(ranking.results[0].diff_pixels, 0);
        assert!(ranking.excluded.is_empty());
        assert!(ranking.results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_rank_stable_ties() {
        let query = filled(10, 10, [255, 255, 255, 255]);
        let half = with_columns(&query, 5, [0, 0, 0, 255]);
        let candidates = (0..32).map(|i| (i, half.clone())).collect::<Vec<_>>();

        let ranking = ranker().rank(&query, candidates);
        let ids = ranking.results.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, (0..32).collect::<Vec<_>>());
        assert!(ranking.results.iter().all(|r| r.score == 0.5));
    }

    #[test]
    fn test_rank_excludes_mismatched() {
        let query = filled(10, 10, [255, 255, 255, 255]);
        let corrupted = CanonicalBuffer::from_raw(10, 10, vec![255; 10 * 10 * CHANNELS - 1]);
        let candidates = vec![
            ("a", query.clone()),
            ("b", corrupted),
            ("c", filled(10, 9, [255, 255, 255, 255])),
            ("d", with_columns(&query, 1, [0, 0, 0, 255])),
        ];

        let ranking = ranker().rank(&query, candidates);
        let ids = ranking.results.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(ranking.excluded.len(), 2);
        assert_eq!(ranking.excluded[0].id, "b");
        assert_eq!(ranking.excluded[1].id, "c");
        assert!(
            ranking
                .excluded
                .iter()
                .all(|e| matches!(e.error, CompareError::DimensionMismatch { .. }))
        );
        assert_eq!(ranking.total(), 4);
    }

    #[test]
    fn test_rank_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let query = filled(4, 4, [1, 2, 3, 255]);
        let candidates = vec![(7, StoredArtifact::new(dir.path().join("missing.png")))];

        let ranking = ranker().rank(&query, candidates);
        assert!(ranking.results.is_empty());
        assert!(matches!(ranking.excluded[0].error, CompareError::StorageIo { .. }));
    }

    #[test]
    fn test_rank_borrowed_candidates() {
        let query = filled(4, 4, [1, 2, 3, 255]);
        let stored = [query.clone(), filled(4, 4, [200, 2, 3, 255])];
        let candidates = stored.iter().enumerate().collect::<Vec<_>>();

        let ranking = ranker().rank(&query, candidates);
        assert_eq!(ranking.results[0].id, 0);
        assert_eq!(ranking.results[1].score, 0.0);
    }

    #[test]
    fn test_rank_empty() {
        let query = filled(4, 4, [1, 2, 3, 255]);
        let ranking = ranker().rank(&query, Vec::<(i64, CanonicalBuffer)>::new());
        assert_eq!(ranking.total(), 0);
    }
}
