mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum_auth::AuthBearer;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;
pub use self::types::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::list_clusters_handler,
        api::get_cluster_handler,
        api::keep_first_handler,
        api::keep_only_handler,
        api::ignore_handler,
        api::delete_all_handler,
        api::get_image_handler,
        api::update_image_handler,
        api::reset_handler,
    ),
    components(schemas(
        crate::db::ImageRecord,
        crate::db::ClusterSizeRecord,
        types::UpdateImageRequest,
        types::ResetResponse,
    ))
)]
pub struct ApiDoc;

/// 校验 token，只读模式下拒绝非 GET 请求
async fn auth(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if token != state.token {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if state.read_only && request.method() != Method::GET {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(request).await)
}

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/clusters", get(api::list_clusters_handler))
        .route("/clusters/{cluster_id}", get(api::get_cluster_handler))
        .route("/clusters/{cluster_id}/keep-first", post(api::keep_first_handler))
        .route("/clusters/{cluster_id}/keep/{image_id}", post(api::keep_only_handler))
        .route("/clusters/{cluster_id}/ignore", post(api::ignore_handler))
        .route("/clusters/{cluster_id}/delete-all", post(api::delete_all_handler))
        .route("/images/{image_id}", get(api::get_image_handler).patch(api::update_image_handler))
        .route("/reset", post(api::reset_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth));

    Router::new()
        .merge(api)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // 请求体只包含少量 JSON：64K
        .layer(RequestBodyLimitLayer::new(1024 * 64))
        .with_state(state)
}
