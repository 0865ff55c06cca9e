use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressIterator};
use log::info;
use regex::Regex;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use super::types::*;
use crate::IMDB;
use crate::imdb::AddOutcome;
use crate::utils::pb_style;

/// 添加结果统计
#[derive(Debug, Default, Clone, Copy)]
pub struct AddStats {
    pub added: usize,
    pub duplicate: usize,
    pub failed: usize,
}

pub fn task_scan(
    path: PathBuf,
    pb: ProgressBar,
    regex_suf: Regex,
) -> (JoinHandle<Result<()>>, Receiver<ImageData>) {
    let (tx, rx) = channel(num_cpus::get());
    let t = tokio::spawn(async move {
        if path.is_file() {
            pb.set_length(1);
            let data = tokio::fs::read(&path).await?;
            tx.send(ImageData { path: path.to_string_lossy().to_string(), data }).await?;
            Ok(())
        } else {
            scan_directory(path, tx, regex_suf, pb).await
        }
    });
    (t, rx)
}

pub fn task_add(
    mut lrx: Receiver<ImageData>,
    pb: ProgressBar,
    db: Arc<IMDB>,
) -> JoinHandle<Result<AddStats>> {
    tokio::spawn(async move {
        let mut stats = AddStats::default();
        let mut buffer = vec![];
        // NOTE: 每次最多取 cpu 数量的图片并发处理，标准化在阻塞线程池中进行
        while lrx.recv_many(&mut buffer, num_cpus::get()).await != 0 {
            let tasks = buffer.drain(..).map(|data| {
                let db = &db;
                async move {
                    let outcome = db.add_image(&data.path, data.data).await;
                    (data.path, outcome)
                }
            });
            for (path, outcome) in futures::future::join_all(tasks).await {
                match outcome {
                    Ok(AddOutcome::Added(record)) => {
                        stats.added += 1;
                        pb.set_message(format!("{} -> {}", path, record.id));
                    }
                    Ok(AddOutcome::Duplicate(record)) => {
                        stats.duplicate += 1;
                        pb.set_message(format!("跳过已添加图片: {} ({})", path, record.id));
                    }
                    Err(e) => {
                        stats.failed += 1;
                        pb.println(format!("添加图片失败: {}: {}", path, e));
                    }
                }
                pb.inc(1);
            }
        }
        Ok(stats)
    })
}

async fn scan_directory(
    path: impl AsRef<Path>,
    tx: Sender<ImageData>,
    regex_suf: Regex,
    pb: ProgressBar,
) -> Result<()> {
    info!("开始扫描目录: {}", path.as_ref().display());
    let pb2 = ProgressBar::no_length().with_style(pb_style());
    let entries = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .progress_with(pb2)
        .filter_map(|entry| {
            entry.ok().and_then(|entry| {
                let path = entry.path();
                if path.is_file() {
                    if let Some(ext) = path.extension() {
                        if regex_suf.is_match(&ext.to_string_lossy()) {
                            return Some(path.to_string_lossy().to_string());
                        }
                    }
                }
                None
            })
        })
        .collect::<Vec<_>>();
    info!("扫描完成，共 {} 张图片", entries.len());

    pb.set_length(entries.len() as u64);

    futures::stream::iter(entries)
        .for_each_concurrent(32, |entry| {
            let tx = tx.clone();
            let pb = pb.clone();
            async move {
                match tokio::fs::read(&entry).await {
                    Ok(data) => {
                        // 接收端已经退出时没有必要继续读取
                        let _ = tx.send(ImageData { path: entry, data }).await;
                    }
                    Err(e) => {
                        pb.println(format!("读取图片失败: {}: {}", entry, e));
                        pb.inc(1);
                    }
                }
            }
        })
        .await;

    Ok(())
}
