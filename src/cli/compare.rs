use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::warn;

use crate::IMDBBuilder;
use crate::cli::SubCommandExtend;
use crate::config::{CompareOptions, Opts};
use crate::imdb::CompareReport;

#[derive(Parser, Debug, Clone)]
pub struct CompareCommand {
    #[command(flatten)]
    pub compare: CompareOptions,
    /// 查询图片路径
    pub image: String,
    /// 最多输出的结果数量，0 表示全部输出
    #[arg(short = 'n', long, default_value_t = 10)]
    pub count: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for CompareCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let data = tokio::fs::read(&self.image).await?;
        let db = IMDBBuilder::new(opts.conf_dir.clone()).compare(self.compare.clone()).open().await?;

        let mut report = db.compare(data).await?;
        if self.count != 0 {
            report.results.truncate(self.count);
        }

        print_report(&report, self.output_format)
    }
}

fn print_report(report: &CompareReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?)
        }
        OutputFormat::Table => {
            for r in &report.results {
                println!("{:.4}\t{}\t{}\t{}", r.score, r.diff_pixels, r.id, r.name);
            }
            if !report.excluded.is_empty() {
                warn!("{} 张图片因错误被排除", report.excluded.len());
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}
