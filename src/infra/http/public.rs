use std::{io::ErrorKind, sync::Arc};

use axum::{
    Router,
    extract::State,
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use bytes::Bytes;
use time::format_description::well_known::Rfc2822;
use tokio::fs;
use tracing::{error, warn};

use crate::{
    application::wall::{SVG_ARTIFACT, JSON_ARTIFACT, WallService},
    infra::raster::{RasterConverter, RasterFormat},
    presentation::views::{IndexTemplate, render_template_response},
};

use super::middleware::log_responses;

const SVG_CONTENT_TYPE: &str = "image/svg+xml";
const NO_CACHE: &str = "no-cache, max-age=0";

const PLACEHOLDER_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="800" height="100">
  <text x="50%" y="50%" text-anchor="middle" dominant-baseline="middle">No sponsor wall generated yet</text>
</svg>"#;

#[derive(Clone)]
pub struct HttpState {
    pub wall: Arc<WallService>,
    pub raster: Arc<RasterConverter>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/sponsors.svg", get(sponsors_svg))
        .route("/sponsors.json", get(sponsors_json))
        .route("/sponsors.png", get(sponsors_png))
        .route("/sponsors.jpg", get(sponsors_jpeg))
        .route("/refresh", get(refresh).post(refresh))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn index(State(state): State<HttpState>) -> Response {
    let svg = fs::read_to_string(state.wall.artifact_path(SVG_ARTIFACT))
        .await
        .unwrap_or_else(|_| PLACEHOLDER_SVG.to_string());

    let last_updated = match state.wall.last_built().await {
        Some(at) => at
            .format(&Rfc2822)
            .unwrap_or_else(|_| "unknown".to_string()),
        None => "never".to_string(),
    };

    render_template_response(IndexTemplate { svg, last_updated }, StatusCode::OK)
}

async fn sponsors_svg(State(state): State<HttpState>) -> Response {
    if let Err(response) = freshen(&state).await {
        return response;
    }
    serve_artifact(&state, SVG_ARTIFACT, SVG_CONTENT_TYPE).await
}

async fn sponsors_json(State(state): State<HttpState>) -> Response {
    if let Err(response) = freshen(&state).await {
        return response;
    }
    serve_artifact(&state, JSON_ARTIFACT, "application/json").await
}

async fn sponsors_png(State(state): State<HttpState>) -> Response {
    serve_raster(state, RasterFormat::Png).await
}

async fn sponsors_jpeg(State(state): State<HttpState>) -> Response {
    serve_raster(state, RasterFormat::Jpeg).await
}

/// On-demand refresh: always runs the full pipeline. A failure is reported
/// to the caller while the previously built artifacts remain in service.
async fn refresh(State(state): State<HttpState>) -> Response {
    match state.wall.rebuild().await {
        Ok(()) => Redirect::to("/").into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to refresh sponsor data: {err}"),
        )
            .into_response(),
    }
}

/// Bring the build up to date before serving. When a refresh fails but a
/// previous build exists, degrade to the stale artifacts instead of failing
/// the request.
async fn freshen(state: &HttpState) -> Result<(), Response> {
    if let Err(err) = state.wall.ensure_fresh().await {
        if state.wall.last_built().await.is_some() {
            warn!(
                target: "mecenate::http",
                error = %err,
                "refresh failed; serving previous artifacts"
            );
            return Ok(());
        }
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            format!("sponsor data unavailable: {err}"),
        )
            .into_response());
    }
    Ok(())
}

async fn serve_artifact(state: &HttpState, name: &str, content_type: &'static str) -> Response {
    let path = state.wall.artifact_path(name);
    match fs::read(&path).await {
        Ok(data) => (
            [(CONTENT_TYPE, content_type), (CACHE_CONTROL, NO_CACHE)],
            Bytes::from(data),
        )
            .into_response(),
        Err(err) if err.kind() == ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!(
                target: "mecenate::http",
                path = %path.display(),
                error = %err,
                "failed to read artifact"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn serve_raster(state: HttpState, format: RasterFormat) -> Response {
    if let Err(response) = freshen(&state).await {
        return response;
    }

    let svg_path = state.wall.artifact_path(SVG_ARTIFACT);
    if fs::metadata(&svg_path).await.is_err() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let out_path = state.wall.artifact_path(format.file_name());
    if fs::metadata(&out_path).await.is_err() {
        if let Err(err) = state.raster.convert(&svg_path, &out_path, format).await {
            error!(
                target: "mecenate::http",
                error = %err,
                "raster conversion failed"
            );
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("raster conversion failed: {err}"),
            )
                .into_response();
        }
    }

    serve_artifact(&state, format.file_name(), format.content_type()).await
}
