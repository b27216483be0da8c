/// 存储层的数据完整性错误
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 特征向量维度与数据库不一致
    #[error("特征向量维度不匹配: 期望 {expected}，实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// 特征模型与数据库中记录的模型不一致
    #[error("特征模型不一致: 数据库使用 {stored}，当前为 {current}")]
    ModelMismatch { stored: String, current: String },
    /// 数据库尚未绑定特征模型
    #[error("数据库尚未绑定特征模型")]
    ModelUnbound,
    #[error("图片不存在: {0}")]
    ImageNotFound(i64),
    #[error("聚类不存在或为空: {0}")]
    ClusterNotFound(i64),
    /// 图片不属于指定聚类
    #[error("图片 {image_id} 不属于聚类 {cluster_id}")]
    NotInCluster { cluster_id: i64, image_id: i64 },
    /// 路径已被其他记录占用
    #[error("路径已存在: {0}")]
    PathConflict(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
