//! 图片标准化
//!
//! 任意尺寸的图片会被等比缩放到固定画布内（contain 语义），剩余区域用固定颜色填充，
//! 最终得到固定尺寸、固定 RGBA 通道顺序的像素缓冲区，任意两个缓冲区都可以直接逐像素比较。

use std::fmt;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use log::debug;
use rand::distr::{Alphanumeric, SampleString};

use crate::error::{CompareError, Result};

/// 标准画布宽度
pub const CANONICAL_WIDTH: u32 = 500;
/// 标准画布高度
pub const CANONICAL_HEIGHT: u32 = 500;
/// 每个像素的通道数（RGBA）
pub const CHANNELS: usize = 4;

/// 标准化后的像素缓冲区
#[derive(Clone, PartialEq, Eq)]
pub struct CanonicalBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl CanonicalBuffer {
    /// 直接使用原始数据构造缓冲区
    ///
    /// NOTE: 此处不检查 `data` 的长度，尺寸是否一致由比较时负责检查
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height, data: image.into_raw() }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// 按宽高计算出的字节长度
    pub fn expected_len(&self) -> usize {
        self.pixel_count() * CHANNELS
    }

    /// 缓冲区长度是否与宽高匹配
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.expected_len()
    }

    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

impl fmt::Debug for CanonicalBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

/// 图片标准化器
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    width: u32,
    height: u32,
    fill: Rgba<u8>,
    filter: FilterType,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new(CANONICAL_WIDTH, CANONICAL_HEIGHT)
    }
}

impl Canonicalizer {
    /// 创建指定画布尺寸的标准化器，默认使用不透明黑色填充、Lanczos3 插值
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, fill: Rgba([0, 0, 0, 255]), filter: FilterType::Lanczos3 }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 将图片缩放并居中放置到画布上
    pub fn canonicalize(&self, image: &DynamicImage) -> CanonicalBuffer {
        let rgba = image.to_rgba8();
        let (ow, oh) = rgba.dimensions();
        let (w, h) = fit_within(ow, oh, self.width, self.height);

        let resized = if (w, h) == (ow, oh) {
            rgba
        } else {
            imageops::resize(&rgba, w, h, self.filter)
        };

        let mut canvas = RgbaImage::from_pixel(self.width, self.height, self.fill);
        let x = (self.width - w) / 2;
        let y = (self.height - h) / 2;
        imageops::replace(&mut canvas, &resized, x as i64, y as i64);

        debug!("标准化图片: {}x{} -> {}x{} @ ({}, {})", ow, oh, w, h, x, y);

        CanonicalBuffer::from_image(canvas)
    }

    /// 解码图片字节流并标准化
    pub fn canonicalize_bytes(&self, data: &[u8]) -> Result<CanonicalBuffer> {
        let image = image::load_from_memory(data)?;
        Ok(self.canonicalize(&image))
    }
}

/// 计算等比缩放后能够放入 `max_w x max_h` 的最大尺寸
///
/// 小图会被放大，结果至少为 1x1 且不会超过画布。
pub fn fit_within(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if w == 0 || h == 0 {
        return (max_w.max(1), max_h.max(1));
    }
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let nw = ((w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let nh = ((h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (nw, nh)
}

/// 磁盘上的单个标准化图片文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact(PathBuf);

impl StoredArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// 读取并解码标准化图片
    pub fn read(&self) -> Result<CanonicalBuffer> {
        let data = fs::read(&self.0).map_err(|e| CompareError::storage(&self.0, e))?;
        let image = image::load_from_memory_with_format(&data, ImageFormat::Png)?;
        Ok(CanonicalBuffer::from_image(image.to_rgba8()))
    }
}

/// 标准化图片的存储目录
///
/// 文件名由随机生成的 key 决定，与图片原始文件名无关，避免同名上传互相覆盖。
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// 打开存储目录，不存在则创建
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CompareError::storage(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 返回 key 对应的文件路径
    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.png"))
    }

    pub fn artifact(&self, key: &str) -> StoredArtifact {
        StoredArtifact::new(self.path(key))
    }

    /// 生成一个尚未被占用的 key
    pub fn generate_key(&self) -> String {
        loop {
            let key = Alphanumeric.sample_string(&mut rand::rng(), 24);
            if !self.path(&key).exists() {
                return key;
            }
        }
    }

    /// 以 PNG 格式无损保存缓冲区
    ///
    /// 先写入临时文件再重命名，读取方不会看到写了一半的文件。
    pub fn write(&self, key: &str, buffer: &CanonicalBuffer) -> Result<PathBuf> {
        let path = self.path(key);
        let image = buffer.to_image().ok_or(CompareError::DimensionMismatch {
            expected: buffer.expected_len(),
            actual: buffer.len(),
        })?;

        let mut encoded = Cursor::new(Vec::new());
        image
            .write_to(&mut encoded, ImageFormat::Png)
            .map_err(|e| CompareError::storage(&path, io::Error::other(e)))?;

        let tmp = path.with_extension("png.tmp");
        let written = fs::write(&tmp, encoded.into_inner())
            .map_err(|e| CompareError::storage(&tmp, e))
            .and_then(|()| fs::rename(&tmp, &path).map_err(|e| CompareError::storage(&path, e)));
        if written.is_err() {
            // 写入失败时不留下临时文件
            let _ = fs::remove_file(&tmp);
        }
        written.map(|()| path)
    }

    pub fn read(&self, key: &str) -> Result<CanonicalBuffer> {
        self.artifact(key).read()
    }

    /// 删除文件，返回文件是否存在
    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CompareError::storage(path, e)),
        }
    }

    /// 列出目录中所有标准化图片的 key
    pub fn keys(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CompareError::storage(&self.dir, e))?;
        let mut keys = vec![];
        for entry in entries {
            let path = entry.map_err(|e| CompareError::storage(&self.dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                if let Some(stem) = path.file_stem() {
                    keys.push(stem.to_string_lossy().to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
