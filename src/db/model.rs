use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// 图片记录，不含特征向量
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, ToSchema)]
pub struct ImageRecord {
    /// 图片 ID，首次插入时分配，永不复用
    pub id: i64,
    /// 图片绝对路径
    pub path: String,
    /// 图片 blake3 哈希
    pub file_hash: String,
    /// 文件大小
    pub size_bytes: i64,
    /// 文件修改时间，单位为秒
    pub mtime: f64,
    /// 所属聚类，None 表示不属于任何重复组
    pub cluster_id: Option<i64>,
    /// 是否已人工审核
    pub reviewed: bool,
    /// 是否标记为删除
    pub to_delete: bool,
    pub created_at: String,
    /// 最近一次（重新）索引的时间
    pub updated_at: String,
}

/// 文件指纹记录
#[derive(Debug, Clone, FromRow)]
pub struct FingerprintRecord {
    pub path: String,
    pub mtime: f64,
    pub size_bytes: i64,
}

/// 特征向量记录
#[derive(Debug, Clone, FromRow)]
pub struct EmbeddingRecord {
    /// 图片 ID
    pub id: i64,
    /// 小端序 f32 数组
    pub embedding: Vec<u8>,
}

/// 聚类及其图片数量
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, ToSchema)]
pub struct ClusterSizeRecord {
    pub cluster_id: i64,
    pub count: i64,
}

/// 待写入的图片
#[derive(Debug, Clone)]
pub struct NewImage {
    pub path: String,
    pub file_hash: String,
    pub size_bytes: i64,
    pub mtime: f64,
    pub embedding: Vec<f32>,
}
