/// 将不同像素数量换算为 0 到 1 之间的相似度
///
/// 结果会被限制在 [0, 1] 内，即使差异数量因为异常数据超过了像素总数。
pub fn score(diff_pixels: u64, width: u32, height: u32) -> f64 {
    let total = width as u64 * height as u64;
    if total == 0 {
        return 0.;
    }
    (1. - diff_pixels as f64 / total as f64).clamp(0., 1.)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounds() {
        assert_eq!(score(0, 500, 500), 1.0);
        assert_eq!(score(500 * 500, 500, 500), 0.0);
    }

    #[test]
    fn test_score_partial() {
        assert_eq!(score(25, 10, 10), 0.75);
        assert_eq!(score(1, 2, 2), 0.75);
    }

    #[test]
    fn test_score_clamped() {
        assert_eq!(score(1000, 10, 10), 0.0);
        assert_eq!(score(0, 0, 500), 0.0);
    }
}
