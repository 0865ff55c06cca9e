use std::sync::LazyLock;

use prometheus::*;

static METRIC_COMPARE_COUNT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("im_compare_count", "count of the compare requests").unwrap()
});

static METRIC_COMPARE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "im_compare_duration",
        "duration of the compare pass in seconds",
        &["candidates"]
    )
    .unwrap()
});

static METRIC_EXCLUDED_COUNT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "im_compare_excluded_count",
        "count of the candidates excluded by errors"
    )
    .unwrap()
});

static METRIC_UPLOAD_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("im_upload_count", "count of the uploaded images", &["status"])
        .unwrap()
});

/// 记录一次比较
pub fn observe_compare(candidates: usize, excluded: usize, duration: f64) {
    METRIC_COMPARE_COUNT.inc();
    METRIC_COMPARE_DURATION.with_label_values(&[to_fixed_count(candidates)]).observe(duration);
    METRIC_EXCLUDED_COUNT.inc_by(excluded as u64);
}

/// 记录一次上传，`status` 为 added / duplicate / rejected
pub fn inc_upload(status: &str) {
    METRIC_UPLOAD_COUNT.with_label_values(&[status]).inc();
}

/// 将候选图片数量调整到几个固定区间
fn to_fixed_count(count: usize) -> &'static str {
    match count {
        0..=10 => "10",
        11..=100 => "100",
        101..=1000 => "1000",
        1001..=10000 => "10000",
        _ => "10000+",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_fixed_count() {
        assert_eq!(to_fixed_count(0), "10");
        assert_eq!(to_fixed_count(11), "100");
        assert_eq!(to_fixed_count(1000), "1000");
        assert_eq!(to_fixed_count(12345), "10000+");
    }
}
