use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use log::info;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::db::{self, ClusterSizeRecord, ImageRecord};

/// 返回聚类中的图片，聚类不存在时返回 404
async fn cluster_or_404(state: &AppState, cluster_id: i64) -> Result<Json<Vec<ImageRecord>>> {
    let images = state.db.cluster_images(cluster_id).await?;
    if images.is_empty() {
        return Err(db::Error::ClusterNotFound(cluster_id).into());
    }
    Ok(Json(images))
}

/// 列出所有未审核的聚类
#[utoipa::path(
    get,
    path = "/clusters",
    responses(
        (status = 200, body = Vec<ClusterSizeRecord>),
    )
)]
pub async fn list_clusters_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ClusterSizeRecord>>> {
    Ok(Json(state.db.pending_cluster_sizes().await?))
}

/// 按 ID 顺序列出聚类中的图片
#[utoipa::path(
    get,
    path = "/clusters/{cluster_id}",
    params(("cluster_id" = i64, Path, description = "聚类 ID")),
    responses(
        (status = 200, body = Vec<ImageRecord>),
        (status = 404, description = "聚类不存在"),
    )
)]
pub async fn get_cluster_handler(
    State(state): State<Arc<AppState>>,
    Path(cluster_id): Path<i64>,
) -> Result<Json<Vec<ImageRecord>>> {
    cluster_or_404(&state, cluster_id).await
}

/// 保留 ID 最小的图片，其余标记为删除
#[utoipa::path(
    post,
    path = "/clusters/{cluster_id}/keep-first",
    params(("cluster_id" = i64, Path, description = "聚类 ID")),
    responses(
        (status = 200, body = Vec<ImageRecord>),
    )
)]
pub async fn keep_first_handler(
    State(state): State<Arc<AppState>>,
    Path(cluster_id): Path<i64>,
) -> Result<Json<Vec<ImageRecord>>> {
    state.db.keep_first(cluster_id).await?;
    cluster_or_404(&state, cluster_id).await
}

/// 只保留指定图片
#[utoipa::path(
    post,
    path = "/clusters/{cluster_id}/keep/{image_id}",
    params(
        ("cluster_id" = i64, Path, description = "聚类 ID"),
        ("image_id" = i64, Path, description = "要保留的图片 ID"),
    ),
    responses(
        (status = 200, body = Vec<ImageRecord>),
    )
)]
pub async fn keep_only_handler(
    State(state): State<Arc<AppState>>,
    Path((cluster_id, image_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<ImageRecord>>> {
    state.db.keep_only(cluster_id, image_id).await?;
    cluster_or_404(&state, cluster_id).await
}

/// 标记为已审核，不删除任何图片
#[utoipa::path(
    post,
    path = "/clusters/{cluster_id}/ignore",
    params(("cluster_id" = i64, Path, description = "聚类 ID")),
    responses(
        (status = 200, body = Vec<ImageRecord>),
    )
)]
pub async fn ignore_handler(
    State(state): State<Arc<AppState>>,
    Path(cluster_id): Path<i64>,
) -> Result<Json<Vec<ImageRecord>>> {
    state.db.ignore(cluster_id).await?;
    cluster_or_404(&state, cluster_id).await
}

/// 将聚类中的所有图片标记为删除
#[utoipa::path(
    post,
    path = "/clusters/{cluster_id}/delete-all",
    params(("cluster_id" = i64, Path, description = "聚类 ID")),
    responses(
        (status = 200, body = Vec<ImageRecord>),
    )
)]
pub async fn delete_all_handler(
    State(state): State<Arc<AppState>>,
    Path(cluster_id): Path<i64>,
) -> Result<Json<Vec<ImageRecord>>> {
    state.db.delete_all(cluster_id).await?;
    cluster_or_404(&state, cluster_id).await
}

/// 获取单张图片
#[utoipa::path(
    get,
    path = "/images/{image_id}",
    params(("image_id" = i64, Path, description = "图片 ID")),
    responses(
        (status = 200, body = ImageRecord),
        (status = 404, description = "图片不存在"),
    )
)]
pub async fn get_image_handler(
    State(state): State<Arc<AppState>>,
    Path(image_id): Path<i64>,
) -> Result<Json<ImageRecord>> {
    match state.db.get_image(image_id).await? {
        Some(image) => Ok(Json(image)),
        None => Err(db::Error::ImageNotFound(image_id).into()),
    }
}

/// 修改图片的审核与删除标记
#[utoipa::path(
    patch,
    path = "/images/{image_id}",
    params(("image_id" = i64, Path, description = "图片 ID")),
    request_body = UpdateImageRequest,
    responses(
        (status = 200, body = ImageRecord),
        (status = 404, description = "图片不存在"),
    )
)]
pub async fn update_image_handler(
    State(state): State<Arc<AppState>>,
    Path(image_id): Path<i64>,
    Json(data): Json<UpdateImageRequest>,
) -> Result<Json<ImageRecord>> {
    let image = state.db.update_flags(image_id, data.reviewed, data.to_delete).await?;
    Ok(Json(image))
}

/// 重置全部审核状态
#[utoipa::path(
    post,
    path = "/reset",
    responses(
        (status = 200, body = ResetResponse),
    )
)]
pub async fn reset_handler(State(state): State<Arc<AppState>>) -> Result<Json<ResetResponse>> {
    let updated = state.db.revert_all().await?;
    info!("通过 API 重置审核状态");
    Ok(Json(ResetResponse { updated }))
}
