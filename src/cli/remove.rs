use anyhow::Result;
use clap::Parser;
use log::error;

use crate::cli::SubCommandExtend;
use crate::{CompareError, IMDBBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct RemoveCommand {
    /// 需要删除的图片 ID
    #[arg(required = true)]
    pub ids: Vec<i64>,
}

impl SubCommandExtend for RemoveCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = IMDBBuilder::new(opts.conf_dir.clone()).open().await?;

        let mut missing = 0;
        for &id in &self.ids {
            match db.remove_image(id).await {
                Ok(record) => println!("{}\t{}", record.id, record.name),
                Err(e) => match e.downcast_ref::<CompareError>() {
                    Some(CompareError::NotFound(_)) => {
                        error!("{e}");
                        missing += 1;
                    }
                    _ => return Err(e),
                },
            }
        }

        if missing > 0 {
            anyhow::bail!("{missing} 张图片不存在");
        }
        Ok(())
    }
}
