use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use indicatif::ProgressBar;
use regex::Regex;
use tasks::*;

mod tasks;
mod types;

use crate::IMDBBuilder;
use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// 图片所在目录，也可以是单张图片
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,gif")]
    pub suffix: String,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let re_suf = format!("^(?i)({})$", self.suffix.replace(',', "|"));
        let re_suf = Regex::new(&re_suf)?;

        let db = Arc::new(IMDBBuilder::new(opts.conf_dir.clone()).open().await?);

        let pb = ProgressBar::no_length().with_style(pb_style());

        let (t1, rx) = task_scan(self.path.clone(), pb.clone(), re_suf);
        let t2 = task_add(rx, pb.clone(), db);

        // 等待所有任务完成
        let (r1, r2) = tokio::try_join!(t1, t2)?;
        r1?;
        let stats = r2?;

        pb.finish_with_message(format!(
            "图片添加完成: 新增 {}, 重复 {}, 失败 {}",
            stats.added, stats.duplicate, stats.failed
        ));

        Ok(())
    }
}
