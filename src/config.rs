use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::diff::{DiffMetric, DiffOptions};

static CONF_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "", "imcompare")
        .map(|dirs| dirs.config_dir().to_string_lossy().to_string())
        .unwrap_or_else(|| ".imcompare".to_string())
});

fn default_config_dir() -> &'static str {
    CONF_DIR.as_str()
}

#[derive(Parser, Debug, Clone)]
pub struct CompareOptions {
    /// 像素容差，范围从 0 到 1，越大越宽松
    ///
    /// 0.1 适合同一张图片重新编码后的比较，0.3 对色彩偏移更宽容
    #[arg(short, long, value_name = "T", default_value_t = 0.1, value_parser = parse_tolerance)]
    pub tolerance: f64,
    /// 像素差异的计算方式
    #[arg(long, value_enum, default_value_t = DiffMetric::Yiq)]
    pub metric: DiffMetric,
    /// 将抗锯齿边缘的像素也计入差异
    #[arg(long)]
    pub include_aa: bool,
    /// 并发比较的线程数，默认为 CPU 核心数
    #[arg(short, long, value_name = "N", default_value_t = num_cpus::get())]
    pub workers: usize,
}

impl CompareOptions {
    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions::new(self.tolerance).metric(self.metric).include_aa(self.include_aa)
    }
}

impl Default for CompareOptions {
    fn default() -> Self {
        let diff = DiffOptions::default();
        Self {
            tolerance: diff.threshold,
            metric: diff.metric,
            include_aa: diff.include_aa,
            workers: num_cpus::get(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imcompare", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imcompare 配置文件目录
    #[arg(short, long, global = true, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 添加图片到数据库
    Add(AddCommand),
    /// 与数据库中的所有图片比较，按相似度排序
    Compare(CompareCommand),
    /// 比较两张图片
    Diff(DiffCommand),
    /// 列出数据库中的图片
    List(ListCommand),
    /// 从数据库中删除图片
    Remove(RemoveCommand),
    /// 清理失效的记录和标准化图片文件
    Clean(CleanCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("imcompare.db")
    }

    /// 返回标准化图片的存储目录
    pub fn artifacts(&self) -> PathBuf {
        self.path.join("canonical")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

fn parse_tolerance(s: &str) -> Result<f64, String> {
    let t: f64 = s.parse().map_err(|e| format!("无效的容差 {s}: {e}"))?;
    if !(0.0..=1.0).contains(&t) {
        return Err(format!("容差必须在 0 到 1 之间: {s}"));
    }
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tolerance() {
        assert_eq!(parse_tolerance("0.3"), Ok(0.3));
        assert_eq!(parse_tolerance("0"), Ok(0.));
        assert!(parse_tolerance("1.5").is_err());
        assert!(parse_tolerance("-0.1").is_err());
        assert!(parse_tolerance("NaN").is_err());
        assert!(parse_tolerance("abc").is_err());
    }

    #[test]
    fn test_conf_dir_paths() {
        let conf_dir: ConfDir = "/tmp/imcompare".parse().unwrap();
        assert_eq!(conf_dir.database(), PathBuf::from("/tmp/imcompare/imcompare.db"));
        assert_eq!(conf_dir.artifacts(), PathBuf::from("/tmp/imcompare/canonical"));
    }

    #[test]
    fn test_parse_opts() {
        let opts = Opts::parse_from(["imcompare", "-c", "/tmp/x", "compare", "a.png", "-t", "0.3"]);
        assert_eq!(opts.conf_dir.path(), Path::new("/tmp/x"));
        match opts.subcmd {
            SubCommand::Compare(cmd) => {
                assert_eq!(cmd.image, "a.png");
                assert_eq!(cmd.compare.tolerance, 0.3);
                assert_eq!(cmd.compare.metric, DiffMetric::Yiq);
            }
            _ => panic!("unexpected subcommand"),
        }
    }
}
