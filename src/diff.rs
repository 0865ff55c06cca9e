//! 逐像素差异计算
//!
//! 默认在 YIQ 色彩空间中按亮度加权计算两个像素的距离，超过阈值即视为不同，
//! 同时会识别抗锯齿边缘的像素并默认不计入差异，这样重新编码或重新保存的图片不会被判为完全不同。

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::canonical::{CHANNELS, CanonicalBuffer};
use crate::error::{CompareError, Result};

/// YIQ 空间中两个像素的最大可能距离
const MAX_YIQ_DELTA: f64 = 35215.;

/// 像素距离的计算方式
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiffMetric {
    /// YIQ 亮度加权距离
    #[default]
    Yiq,
    /// 各通道差值的最大值
    Channel,
}

/// 差异计算参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffOptions {
    /// 容差，范围 0 到 1，越大越宽松
    pub threshold: f64,
    pub metric: DiffMetric,
    /// 是否将抗锯齿像素计入差异
    pub include_aa: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self { threshold: 0.1, metric: DiffMetric::Yiq, include_aa: false }
    }
}

impl DiffOptions {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, ..Default::default() }
    }

    pub fn metric(mut self, metric: DiffMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn include_aa(mut self, include_aa: bool) -> Self {
        self.include_aa = include_aa;
        self
    }

    fn is_different(&self, a: &[u8], b: &[u8], k: usize) -> bool {
        // 非法阈值按 0 处理，退化为严格比较
        let threshold = if self.threshold.is_nan() { 0. } else { self.threshold.clamp(0., 1.) };
        match self.metric {
            DiffMetric::Yiq => {
                color_delta(a, b, k, k, false).abs() > MAX_YIQ_DELTA * threshold * threshold
            }
            DiffMetric::Channel => {
                let max = (0..CHANNELS)
                    .map(|c| a[k + c].abs_diff(b[k + c]))
                    .max()
                    .unwrap_or_default();
                max as f64 > threshold * 255.
            }
        }
    }
}

/// 差异图中各类像素的颜色
const DIFF_COLOR: [u8; 4] = [255, 0, 0, 255];
const AA_COLOR: [u8; 4] = [255, 255, 0, 255];
/// 相同像素在差异图中的淡化程度
const FADE_ALPHA: f64 = 0.1;

/// 计算两个缓冲区中不同像素的数量
pub fn diff(a: &CanonicalBuffer, b: &CanonicalBuffer, options: &DiffOptions) -> Result<u64> {
    diff_into(a, b, options, None)
}

/// 计算不同像素的数量，并可选地将差异图写入 `output`
///
/// `output` 的长度必须与输入缓冲区相同。
pub fn diff_into(
    a: &CanonicalBuffer,
    b: &CanonicalBuffer,
    options: &DiffOptions,
    mut output: Option<&mut [u8]>,
) -> Result<u64> {
    check_dimensions(a, b)?;
    if let Some(out) = &output {
        if out.len() != a.len() {
            return Err(CompareError::DimensionMismatch { expected: a.len(), actual: out.len() });
        }
    }

    let (width, height) = (a.width() as usize, a.height() as usize);
    let (img1, img2) = (a.as_bytes(), b.as_bytes());

    // 完全相同时直接返回
    if img1 == img2 {
        if let Some(out) = output.as_deref_mut() {
            for k in (0..img1.len()).step_by(CHANNELS) {
                draw_gray_pixel(img1, k, out);
            }
        }
        return Ok(0);
    }

    let mut count = 0;
    for y in 0..height {
        for x in 0..width {
            let k = (y * width + x) * CHANNELS;
            if !options.is_different(img1, img2, k) {
                if let Some(out) = output.as_deref_mut() {
                    draw_gray_pixel(img1, k, out);
                }
                continue;
            }

            let aa = !options.include_aa
                && (antialiased(img1, x, y, width, height, img2)
                    || antialiased(img2, x, y, width, height, img1));
            if aa {
                if let Some(out) = output.as_deref_mut() {
                    out[k..k + CHANNELS].copy_from_slice(&AA_COLOR);
                }
            } else {
                if let Some(out) = output.as_deref_mut() {
                    out[k..k + CHANNELS].copy_from_slice(&DIFF_COLOR);
                }
                count += 1;
            }
        }
    }

    Ok(count)
}

fn check_dimensions(a: &CanonicalBuffer, b: &CanonicalBuffer) -> Result<()> {
    if !a.is_well_formed() {
        return Err(CompareError::DimensionMismatch { expected: a.expected_len(), actual: a.len() });
    }
    if (a.width(), a.height()) != (b.width(), b.height()) || a.len() != b.len() {
        return Err(CompareError::DimensionMismatch { expected: a.len(), actual: b.len() });
    }
    Ok(())
}

/// 判断 (x1, y1) 处的像素是否为抗锯齿像素
///
/// 在 3x3 邻域内寻找亮度最低和最高的像素，如果它们在两张图中都处于大片同色区域，
/// 那么当前像素就是两种颜色之间的过渡。
fn antialiased(img: &[u8], x1: usize, y1: usize, width: usize, height: usize, img2: &[u8]) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let k = (y1 * width + x1) * CHANNELS;

    let mut zeroes = usize::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);
    let mut min = 0.;
    let mut max = 0.;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (0, 0, 0, 0);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let delta = color_delta(img, img, k, (y * width + x) * CHANNELS, true);
            if delta == 0. {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                (min_x, min_y) = (x, y);
            } else if delta > max {
                max = delta;
                (max_x, max_y) = (x, y);
            }
        }
    }

    if min == 0. || max == 0. {
        return false;
    }

    (has_many_siblings(img, min_x, min_y, width, height)
        && has_many_siblings(img2, min_x, min_y, width, height))
        || (has_many_siblings(img, max_x, max_y, width, height)
            && has_many_siblings(img2, max_x, max_y, width, height))
}

/// 判断像素周围是否有 3 个以上颜色完全相同的像素
fn has_many_siblings(img: &[u8], x1: usize, y1: usize, width: usize, height: usize) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let k = (y1 * width + x1) * CHANNELS;

    let mut zeroes = usize::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let m = (y * width + x) * CHANNELS;
            if img[k..k + CHANNELS] == img[m..m + CHANNELS] {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }

    false
}

/// 计算两个像素在 YIQ 空间中的平方距离
///
/// 返回值的符号表示亮度变化方向：第一个像素更亮时为负。
/// `y_only` 为真时只返回亮度差。
fn color_delta(img1: &[u8], img2: &[u8], k: usize, m: usize, y_only: bool) -> f64 {
    let p1 = &img1[k..k + CHANNELS];
    let p2 = &img2[m..m + CHANNELS];
    if p1 == p2 {
        return 0.;
    }

    let (r1, g1, b1) = blend_white(p1);
    let (r2, g2, b2) = blend_white(p2);

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;

    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;

    if y1 > y2 { -delta } else { delta }
}

/// 半透明像素与白色背景混合
fn blend_white(p: &[u8]) -> (f64, f64, f64) {
    let (r, g, b, a) = (p[0] as f64, p[1] as f64, p[2] as f64, p[3]);
    if a == 255 {
        return (r, g, b);
    }
    let a = a as f64 / 255.;
    (blend(r, a), blend(g, a), blend(b, a))
}

fn blend(c: f64, a: f64) -> f64 {
    255. + (c - 255.) * a
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

fn draw_gray_pixel(img: &[u8], k: usize, output: &mut [u8]) {
    let (r, g, b) = (img[k] as f64, img[k + 1] as f64, img[k + 2] as f64);
    let alpha = FADE_ALPHA * img[k + 3] as f64 / 255.;
    let val = blend(rgb2y(r, g, b), alpha).round().clamp(0., 255.) as u8;
    output[k..k + CHANNELS].copy_from_slice(&[val, val, val, 255]);
}
