use std::sync::Arc;

use crate::IMDB;
use crate::cli::server::ServerCommand;

/// 应用状态
pub struct AppState {
    /// 数据库连接
    pub db: IMDB,
    /// 鉴权 token
    pub token: String,
    /// 是否拒绝修改请求
    pub read_only: bool,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(db: IMDB, opts: ServerCommand) -> Arc<Self> {
        Arc::new(AppState { db, token: opts.token, read_only: opts.read_only })
    }
}
