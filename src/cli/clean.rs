use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::{IMDBBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct CleanCommand {}

impl SubCommandExtend for CleanCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = IMDBBuilder::new(opts.conf_dir.clone()).wal(false).open().await?;
        info!("清理失效数据中……");
        let (files, records) = db.clean().await?;
        info!("清理完成: 删除 {files} 个文件, {records} 条记录");
        Ok(())
    }
}
