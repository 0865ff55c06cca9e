use std::time::{SystemTime, UNIX_EPOCH};

use indicatif::ProgressStyle;

/// 当前 unix 时间戳，单位为秒
pub fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or_default()
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("invalid progress template")
        .progress_chars("#>-")
}

/// 清理上传的文件名：去掉目录部分，并将空白字符替换为下划线
pub fn sanitize_name(name: &str) -> String {
    let name = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let name = name.split_whitespace().collect::<Vec<_>>().join("_");
    if name.is_empty() { "unnamed".to_string() } else { name }
}
