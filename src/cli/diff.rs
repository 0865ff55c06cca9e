use anyhow::{Context, Result};
use clap::Parser;
use image::RgbaImage;
use tokio::task::spawn_blocking;

use crate::Canonicalizer;
use crate::cli::SubCommandExtend;
use crate::config::{CompareOptions, Opts};
use crate::diff::diff_into;
use crate::score::score;

#[derive(Parser, Debug, Clone)]
pub struct DiffCommand {
    #[command(flatten)]
    pub compare: CompareOptions,
    /// 第一张图片路径
    pub image1: String,
    /// 第二张图片路径
    pub image2: String,
    /// 将差异图保存到文件
    pub output: Option<String>,
}

impl SubCommandExtend for DiffCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let data1 = tokio::fs::read(&self.image1).await?;
        let data2 = tokio::fs::read(&self.image2).await?;
        let options = self.compare.diff_options();
        let output = self.output.clone();

        spawn_blocking(move || -> Result<()> {
            let canonicalizer = Canonicalizer::default();
            let a = canonicalizer.canonicalize_bytes(&data1)?;
            let b = canonicalizer.canonicalize_bytes(&data2)?;

            let mut out = output.as_ref().map(|_| vec![0; a.len()]);
            let diff_pixels = diff_into(&a, &b, &options, out.as_deref_mut())?;
            println!("{}\t{:.4}", diff_pixels, score(diff_pixels, a.width(), a.height()));

            if let (Some(path), Some(out)) = (output, out) {
                let image = RgbaImage::from_raw(a.width(), a.height(), out)
                    .context("差异图尺寸错误")?;
                image.save(&path).with_context(|| format!("保存差异图失败: {path}"))?;
            }
            Ok(())
        })
        .await?
    }
}
