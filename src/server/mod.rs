mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;
pub use self::types::{MAX_UPLOAD_FILES, artifact_url};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::upload_handler,
        api::list_images_handler,
        api::get_image_handler,
        api::compare_handler,
        api::delete_image_handler,
    ),
    components(schemas(
        types::UploadForm,
        types::UploadResponse,
        types::CompareForm,
        types::CompareResponse,
        types::CompareResult,
        types::MessageResponse,
        crate::db::ImageRecord,
        crate::imdb::ExcludedImage,
    )),
    servers((url = "/api"))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let uploads = ServeDir::new(state.db.artifacts().dir());
    let api = Router::new()
        .route("/upload", post(api::upload_handler))
        .route("/images", get(api::list_images_handler))
        .route("/images/{id}", get(api::get_image_handler).delete(api::delete_image_handler))
        .route("/image", post(api::compare_handler));

    Router::new()
        .nest("/api", api)
        .nest_service("/uploads", uploads)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：单个文件 5M，最多 50 个文件
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 5 * MAX_UPLOAD_FILES + 1024 * 1024))
        .with_state(state)
}
