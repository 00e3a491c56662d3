use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::app::api::{ApiError, ManuscriptService, page_status, render_page};

#[derive(Clone)]
pub struct AppState {
    pub service: ManuscriptService,
    /// Public base URL used for sitemap entries.
    pub site_url: String,
}

pub fn router(state: AppState, db_dir: &std::path::Path) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/sitemap.xml", get(sitemap))
        .route("/api/manuscript", get(home_manuscript))
        .route("/api/manuscript/", get(home_manuscript))
        .route("/api/manuscript/*id", get(manuscript))
        .route("/api/complete_audio/*id", get(complete_audio))
        .nest_service("/db", ServeDir::new(db_dir))
        .fallback(article_page)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(err: ApiError) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(?err, "request failed");
    } else {
        tracing::debug!(%err, %status, "request refused");
    }
    (status, err.to_string()).into_response()
}

async fn home_manuscript(State(state): State<AppState>) -> Response {
    request_json(&state, "").await
}

async fn manuscript(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    request_json(&state, &id).await
}

async fn request_json(state: &AppState, id: &str) -> Response {
    match state.service.request_manuscript(id, None).await {
        Ok(manuscript) => Json(manuscript).into_response(),
        Err(err) => error_response(err),
    }
}

async fn complete_audio(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.complete_audio(&id).await {
        Ok(url) => Json(serde_json::json!({ "url": url })).into_response(),
        Err(err) => error_response(err),
    }
}

async fn sitemap(State(state): State<AppState>) -> Response {
    match state.service.sitemap(&state.site_url).await {
        Ok(xml) => ([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml).into_response(),
        Err(err) => error_response(err),
    }
}

async fn article_page(State(state): State<AppState>, uri: Uri) -> Response {
    let raw = uri.path().trim_start_matches('/');
    let Ok(id) = percent_encoding::percent_decode_str(raw).decode_utf8() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match state.service.request_manuscript(&id, None).await {
        Ok(manuscript) => {
            (page_status(Some(&manuscript)), Html(render_page(Some(&manuscript)))).into_response()
        }
        Err(err) => error_response(err),
    }
}
