use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::cli::compare::OutputFormat;
use crate::{IMDBBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for ListCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = IMDBBuilder::new(opts.conf_dir.clone()).open().await?;
        let images = db.list_images().await?;

        match self.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&images)?),
            OutputFormat::Table => {
                for image in &images {
                    println!(
                        "{}\t{}\t{:.4}\t{}",
                        image.id,
                        image.name,
                        image.last_score,
                        db.artifacts().path(&image.artifact).display()
                    );
                }
            }
        }
        Ok(())
    }
}
