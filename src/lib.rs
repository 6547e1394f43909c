pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::ReportsConfig;
use crate::services::report_service::ReportService;
use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Clinic Reports API",
        description = "Upload, list and delete medical reports.\n\n\
            Owner identity is taken from the request as supplied by the client and is not \
            authenticated: anyone who knows an owner's identity can list that owner's reports, \
            and anyone who knows a report id can delete it. Deploy behind an authenticating proxy."
    ),
    paths(
        api::handlers::reports::upload_report,
        api::handlers::reports::list_reports,
        api::handlers::reports::delete_report,
        api::handlers::reports::download_report,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::reports::UploadResponse,
            api::handlers::reports::MessageResponse,
            api::handlers::health::HealthResponse,
            models::ReportListing,
        )
    ),
    tags(
        (name = "reports", description = "Report upload, listing and deletion"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub report_service: Arc<ReportService>,
    pub config: ReportsConfig,
}

fn cors_layer(config: &ReportsConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(origins))
}

pub fn create_app(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.config.uploads_dir);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/upload-report",
            post(api::handlers::reports::upload_report),
        )
        .route(
            "/api/get-my-reports",
            get(api::handlers::reports::list_reports),
        )
        .route(
            "/api/delete-report/:id",
            delete(api::handlers::reports::delete_report),
        )
        .route(
            "/api/reports/:id/download",
            get(api::handlers::reports::download_report),
        )
        .nest_service(&state.config.public_uploads_path, uploads)
        .layer(cors_layer(&state.config))
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.body_limit(),
        ))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
