use std::path::Path;

use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config::{cors_allow_origin, static_dir};
use crate::routes;
use crate::state::AppState;

pub(crate) fn build_app(state: AppState) -> Router {
    let static_assets = Router::new()
        .fallback_service(
            ServeDir::new(static_dir())
                .precompressed_br()
                .precompressed_gzip(),
        )
        .layer(middleware::from_fn(set_static_cache_control));

    let mut api = Router::new()
        .route(
            "/api/owners/{owner_id}/visits",
            get(routes::visits::list_visited),
        )
        .route(
            "/api/owners/{owner_id}/visits/toggle",
            post(routes::visits::toggle_visit),
        )
        .route(
            "/api/visits/{visit_id}/notes",
            put(routes::visits::save_notes),
        )
        .route(
            "/api/visits/{visit_id}/photos",
            get(routes::photos::list_preview).post(routes::photos::add_photo),
        )
        .route(
            "/api/photos/{photo_id}",
            axum::routing::patch(routes::photos::update_photo)
                .delete(routes::photos::delete_photo),
        )
        .route("/api/health", get(routes::api::health))
        .route("/api/metrics", get(routes::api::metrics));

    if let Some(origin) = cors_allow_origin() {
        api = api.layer(cors_layer(origin));
    }

    api.layer(CompressionLayer::new())
        .fallback_service(static_assets)
        .with_state(state)
}

fn cors_layer(origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE])
}

async fn set_static_cache_control(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let mut response = next.run(request).await;

    if response.status().is_success()
        && let Some(cache_control) = cache_control_for_path(&path)
    {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(cache_control),
        );
    }

    response
}

fn cache_control_for_path(path: &str) -> Option<&'static str> {
    if is_hashed_bundle_asset(path) {
        return Some("public, max-age=31536000, immutable");
    }

    // The vector map and pin/card imagery change rarely but are not hashed.
    if path.starts_with("/assets/") || path.starts_with("/fonts/") {
        return Some("public, max-age=86400");
    }

    None
}

fn is_hashed_bundle_asset(path: &str) -> bool {
    let Some(ext) = Path::new(path).extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    if !matches!(ext, "wasm" | "js" | "css") {
        return false;
    }

    let Some(filename) = Path::new(path).file_name().and_then(|name| name.to_str()) else {
        return false;
    };

    filename
        .split(['-', '_', '.'])
        .any(|segment| segment.len() >= 8 && segment.chars().all(|c| c.is_ascii_hexdigit()))
}
