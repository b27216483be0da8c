use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 修改图片标记的参数，未填写的标记保持不变
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateImageRequest {
    pub reviewed: Option<bool>,
    pub to_delete: Option<bool>,
}

/// 重置审核状态的结果
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResetResponse {
    /// 受影响的图片数量
    pub updated: u64,
}
