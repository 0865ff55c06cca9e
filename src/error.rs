use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// 图片比较流程中的错误分类
///
/// 单个候选图片的错误（解码、尺寸不一致、读写失败）只会让该候选被排除，
/// 不会中断整个排序过程；查询图片本身解码失败则会让整个请求失败。
#[derive(Error, Debug)]
pub enum CompareError {
    /// 输入不是受支持的图片格式，或者图片已损坏
    #[error("无法解码图片: {0}")]
    Decode(#[from] image::ImageError),

    /// 两个像素缓冲区的尺寸不一致
    #[error("像素缓冲区尺寸不一致: 期望 {expected} 字节，实际 {actual} 字节")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 标准化图片文件读写失败
    #[error("读写文件失败 {}: {source}", path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 图片记录不存在
    #[error("图片不存在: {0}")]
    NotFound(i64),
}

impl CompareError {
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StorageIo { path: path.into(), source }
    }

    /// 是否属于调用方输入错误
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

pub type Result<T, E = CompareError> = std::result::Result<T, E>;
