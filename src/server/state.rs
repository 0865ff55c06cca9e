use std::sync::Arc;

use crate::IMDB;

/// 应用状态
pub struct AppState {
    /// 图片数据库
    pub db: IMDB,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(db: IMDB) -> Arc<Self> {
        Arc::new(AppState { db })
    }
}
