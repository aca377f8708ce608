//! HTTP routes: tile content, availability subtrees and static assets.
//!
//! Request paths follow the pre-exported tileset layout, so a live server
//! and an exported directory are interchangeable to the client:
//! `content/{z}__{x}_{y}.vctr` and `subtrees/{z}.{x}.{y}.subtree`, each
//! with an optional leading dataset segment.

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use citytiles::codec::{encode_subtree, encode_tile, AttributeColumns, Cartographic, Rectangle};
use citytiles::TileAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::state::AppState;

/// Levels per availability subtree served to clients.
pub const SUBTREE_DEPTH: u8 = 3;

pub fn build_router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.static_root);

    Router::new()
        .route("/content/:file", get(content_default))
        .route("/content/:dataset/:file", get(content_for_dataset))
        .route("/subtrees/:file", get(subtree_default))
        .route("/subtrees/:dataset/:file", get(subtree_for_dataset))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Parse a content file name of the form `{z}__{x}_{y}.vctr`.
pub fn parse_content_name(file: &str) -> Option<TileAddr> {
    let name = file.strip_suffix(".vctr")?;
    let (z, rest) = name.split_once("__")?;
    let (x, y) = rest.split_once('_')?;
    tile_addr(z, x, y)
}

/// Parse a subtree file name of the form `{z}.{x}.{y}.subtree`.
pub fn parse_subtree_name(file: &str) -> Option<TileAddr> {
    let name = file.strip_suffix(".subtree")?;
    let mut parts = name.split('.');
    let (z, x, y) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    tile_addr(z, x, y)
}

fn tile_addr(z: &str, x: &str, y: &str) -> Option<TileAddr> {
    let z: u8 = z.parse().ok()?;
    let x: u32 = x.parse().ok()?;
    let y: u32 = y.parse().ok()?;
    if z > 30 || x >= 1 << z || y >= 1 << z {
        return None;
    }
    Some(TileAddr::new(x, y, z))
}

async fn content_default(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Response {
    serve_content(&state, None, &file)
}

async fn content_for_dataset(
    State(state): State<Arc<AppState>>,
    Path((dataset, file)): Path<(String, String)>,
) -> Response {
    serve_content(&state, Some(&dataset), &file)
}

async fn subtree_default(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Response {
    serve_subtree(&state, None, &file)
}

async fn subtree_for_dataset(
    State(state): State<Arc<AppState>>,
    Path((dataset, file)): Path<(String, String)>,
) -> Response {
    serve_subtree(&state, Some(&dataset), &file)
}

/// Encode the requested content tile. An address whose path was never
/// grown still yields a valid (empty) tile, so additive-refinement clients
/// can probe freely.
fn serve_content(state: &AppState, dataset: Option<&str>, file: &str) -> Response {
    let Some(dataset) = state.dataset(dataset) else {
        return not_found(file);
    };
    let Some(addr) = parse_content_name(file) else {
        return not_found(file);
    };

    let mut points = Vec::new();
    dataset.tree.collect_points_for_tile(addr, &mut points);
    debug!("content {addr}: {} points", points.len());

    let rectangle = Rectangle::from_rect(&addr.bounds());
    let positions: Vec<Cartographic> = points
        .iter()
        .map(|p| Cartographic::from_degrees(p.longitude(), p.latitude(), f64::from(p.elevation)))
        .collect();
    let mut columns = AttributeColumns::new();
    columns.push("title", points.iter().map(|p| p.name.clone()));

    match encode_tile(&rectangle, &positions, &columns) {
        Ok(payload) => octet_stream(payload),
        Err(e) => {
            error!("encoding tile {addr}: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn serve_subtree(state: &AppState, dataset: Option<&str>, file: &str) -> Response {
    let Some(dataset) = state.dataset(dataset) else {
        return not_found(file);
    };
    let Some(addr) = parse_subtree_name(file) else {
        return not_found(file);
    };

    debug!("get {}.{}.{} subtree", addr.z, addr.x, addr.y);
    if dataset.tree.find_node(addr).is_none() {
        return not_found(file);
    }

    match encode_subtree(&dataset.tree, addr, SUBTREE_DEPTH) {
        Ok(payload) => octet_stream(payload),
        Err(e) => {
            error!("encoding subtree {addr}: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn not_found(file: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Body::from(format!("File {file} not found!")),
    )
        .into_response()
}

fn octet_stream(payload: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/octet-stream")], payload).into_response()
}
