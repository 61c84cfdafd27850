use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use hexatlas_engine::{grid, hex, map, paint, paths, tiles::LinkIndex, Engine};
use hexatlas_protocol::api::{
    CreateMapRequest, EyedropperRequest, LinksRequest, MapSummary, PaintRequest, PaintResponse,
    PaintTarget, RenameMapRequest, ResizeRequest, ResizeResponse, SessionStatus,
};
use hexatlas_protocol::{BrushState, Hex, LinkKind, Map, Path as MapPath, Point, TileData};
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub mod config;
pub mod session;

pub use config::{Cli, Config};
use session::{blocking, Sessions};


/// Error half of every handler: status plus a message for the user.
pub type ApiError = (StatusCode, String);

pub(crate) fn internal(e: anyhow::Error) -> ApiError {
    tracing::error!(error = %format!("{e:#}"), "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

pub(crate) fn not_found(msg: impl Into<String>) -> ApiError {
    (StatusCode::NOT_FOUND, msg.into())
}

fn bad_request(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub sessions: Sessions,
}

impl AppState {
    pub fn new(engine: Engine, debounce: std::time::Duration) -> Self {
        Self {
            sessions: Sessions::new(engine.clone(), debounce),
            engine,
        }
    }
}

type SharedState = State<Arc<AppState>>;

pub fn build_router(state: AppState) -> Router {
    build_router_shared(Arc::new(state))
}

fn build_router_shared(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/maps", get(api_maps_list).post(api_maps_create))
        .route(
            "/api/maps/{id}",
            get(api_map_get).put(api_map_replace).delete(api_map_delete),
        )
        .route("/api/maps/{id}/name", patch(api_map_rename))
        .route("/api/maps/{id}/resize", post(api_map_resize))
        .route("/api/maps/{id}/brush", get(api_brush_get).put(api_brush_set))
        .route("/api/maps/{id}/paint", post(api_map_paint))
        .route("/api/maps/{id}/eyedropper", post(api_map_eyedropper))
        .route("/api/maps/{id}/tiles/{key}", put(api_tile_replace))
        .route("/api/maps/{id}/tiles/{key}/links/{kind}", put(api_tile_links))
        .route("/api/maps/{id}/links", get(api_map_links))
        .route("/api/maps/{id}/paths", post(api_path_create))
        .route(
            "/api/maps/{id}/paths/{path_id}",
            put(api_path_replace).delete(api_path_delete),
        )
        .route("/api/maps/{id}/paths/{path_id}/points", post(api_path_append))
        .route(
            "/api/maps/{id}/paths/{path_id}/points/last",
            delete(api_path_pop),
        )
        .route("/api/maps/{id}/status", get(api_map_status))
        .route("/api/maps/{id}/flush", post(api_map_flush))
        .with_state(state)
        // Local security: allow only loopback + Tailscale by default.
        .layer(middleware::from_fn(ip_allowlist))
        // Never use `Access-Control-Allow-Origin: *` here; any website open in
        // the browser could then read or overwrite the user's world.
        .layer(local_only_cors())
}

async fn health() -> &'static str {
    "ok"
}

async fn api_maps_list(State(state): SharedState) -> Result<Json<Vec<MapSummary>>, ApiError> {
    let engine = state.engine.clone();
    let maps = blocking(move || engine.list_map_summaries())
        .await
        .map_err(internal)?;
    Ok(Json(maps))
}

/// Malformed bodies are the client's fault: 400 rather than axum's 422.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))
}

async fn api_maps_create(
    State(state): SharedState,
    payload: Result<Json<CreateMapRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Map>), ApiError> {
    let input = json_body(payload)?;
    let shape = grid::shape_from_request(input.shape).map_err(bad_request)?;
    let new_map = map::new_map(&input.name, shape).map_err(bad_request)?;
    let engine = state.engine.clone();
    let stored = new_map.clone();
    let id = blocking(move || engine.create_map(&stored))
        .await
        .map_err(internal)?;
    let created = new_map.with_id(id);
    tracing::info!(map_id = %created.id, shape = created.shape.name(), tiles = created.tiles.len(), "map created");
    state.sessions.insert(created.clone()).await;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn api_map_get(
    State(state): SharedState,
    Path(id): Path<String>,
) -> Result<Json<Map>, ApiError> {
    let m = state.sessions.read(&id, |s| s.map.clone()).await?;
    Ok(Json(m))
}

async fn api_map_replace(
    State(state): SharedState,
    Path(id): Path<String>,
    Json(input): Json<Map>,
) -> Result<Json<Map>, ApiError> {
    if input.id != id {
        return Err(bad_request(format!(
            "map id {} does not match path id {id}",
            input.id
        )));
    }
    map::validate(&input).map_err(bad_request)?;
    state
        .sessions
        .edit(&id, |s| {
            s.map = input;
            Ok(s.map.clone())
        })
        .await
        .map(Json)
}

async fn api_map_delete(
    State(state): SharedState,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.sessions.delete(&id).await.map_err(internal)?;
    if !deleted {
        return Err(not_found(format!("map not found: {id}")));
    }
    tracing::info!(map_id = %id, "map deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn api_map_rename(
    State(state): SharedState,
    Path(id): Path<String>,
    Json(input): Json<RenameMapRequest>,
) -> Result<Json<Map>, ApiError> {
    state
        .sessions
        .edit(&id, |s| {
            s.map = map::renamed(&s.map, &input.name).map_err(bad_request)?;
            Ok(s.map.clone())
        })
        .await
        .map(Json)
}

async fn api_map_resize(
    State(state): SharedState,
    Path(id): Path<String>,
    payload: Result<Json<ResizeRequest>, JsonRejection>,
) -> Result<Json<ResizeResponse>, ApiError> {
    let shape = grid::shape_from_request(json_body(payload)?.shape).map_err(bad_request)?;
    state
        .sessions
        .edit(&id, |s| {
            let (next, outcome) = map::resized(&s.map, shape).map_err(bad_request)?;
            if outcome.dropped_with_data > 0 {
                tracing::info!(
                    map_id = %next.id,
                    dropped = outcome.dropped,
                    dropped_with_data = outcome.dropped_with_data,
                    "resize discarded painted or linked tiles"
                );
            }
            s.map = next;
            Ok(ResizeResponse {
                map: s.map.clone(),
                dropped: outcome.dropped,
                dropped_with_data: outcome.dropped_with_data,
            })
        })
        .await
        .map(Json)
}

async fn api_brush_get(
    State(state): SharedState,
    Path(id): Path<String>,
) -> Result<Json<BrushState>, ApiError> {
    let b = state.sessions.read(&id, |s| s.brush.clone()).await?;
    Ok(Json(b))
}

async fn api_brush_set(
    State(state): SharedState,
    Path(id): Path<String>,
    Json(brush): Json<BrushState>,
) -> Result<Json<BrushState>, ApiError> {
    state
        .sessions
        .edit(&id, |s| {
            s.brush = brush;
            Ok(s.brush.clone())
        })
        .await
        .map(Json)
}

fn resolve_target(target: &PaintTarget) -> Result<Hex, ApiError> {
    match *target {
        PaintTarget::Hex { hex } => Ok(hex),
        PaintTarget::Pixel { point, size } => {
            if !(size.is_finite() && size > 0.0) {
                return Err(bad_request(format!("hex size must be positive, got {size}")));
            }
            Ok(hex::pixel_to_hex(point, size))
        }
    }
}

async fn api_map_paint(
    State(state): SharedState,
    Path(id): Path<String>,
    Json(input): Json<PaintRequest>,
) -> Result<Json<PaintResponse>, ApiError> {
    let target = resolve_target(&input.target)?;
    state
        .sessions
        .edit(&id, |s| {
            if let Some(brush) = input.brush {
                s.brush = brush;
            }
            let next = map::painted(&s.map, target, &s.brush);
            let changed = paint::changed_count(&s.map.tiles, &next.tiles);
            s.map = next;
            Ok(PaintResponse {
                map: s.map.clone(),
                brush: s.brush.clone(),
                changed,
            })
        })
        .await
        .map(Json)
}

async fn api_map_eyedropper(
    State(state): SharedState,
    Path(id): Path<String>,
    Json(input): Json<EyedropperRequest>,
) -> Result<Json<BrushState>, ApiError> {
    let target = resolve_target(&input.target)?;
    state
        .sessions
        .edit(&id, |s| {
            s.brush = paint::eyedropper(&s.map.tiles, target, &s.brush);
            Ok(s.brush.clone())
        })
        .await
        .map(Json)
}

fn parse_key(key: &str) -> Result<Hex, ApiError> {
    key.parse::<Hex>().map_err(bad_request)
}

async fn api_tile_replace(
    State(state): SharedState,
    Path((id, key)): Path<(String, String)>,
    Json(data): Json<TileData>,
) -> Result<Json<Map>, ApiError> {
    let hex = parse_key(&key)?;
    state
        .sessions
        .edit(&id, |s| {
            if !grid::contains(&s.map.shape, hex) {
                return Err(not_found(format!("no tile at {hex}")));
            }
            s.map = map::with_tile_data(&s.map, hex, data);
            Ok(s.map.clone())
        })
        .await
        .map(Json)
}

async fn api_tile_links(
    State(state): SharedState,
    Path((id, key, kind)): Path<(String, String, LinkKind)>,
    Json(input): Json<LinksRequest>,
) -> Result<Json<Map>, ApiError> {
    let hex = parse_key(&key)?;
    state
        .sessions
        .edit(&id, |s| {
            if !grid::contains(&s.map.shape, hex) {
                return Err(not_found(format!("no tile at {hex}")));
            }
            s.map = map::with_links(&s.map, hex, kind, input.ids);
            Ok(s.map.clone())
        })
        .await
        .map(Json)
}

async fn api_map_links(
    State(state): SharedState,
    Path(id): Path<String>,
) -> Result<Json<LinkIndex>, ApiError> {
    let index = state
        .sessions
        .read(&id, |s| LinkIndex::build(&s.map.tiles))
        .await?;
    Ok(Json(index))
}

async fn api_path_create(
    State(state): SharedState,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<MapPath>), ApiError> {
    state
        .sessions
        .edit(&id, |s| {
            let (next, path_id) = map::with_new_path(&s.map);
            s.map = next;
            paths::find_path(&s.map.paths, &path_id)
                .cloned()
                .map(|p| (StatusCode::CREATED, Json(p)))
                .ok_or_else(|| internal(anyhow::anyhow!("created path {path_id} vanished")))
        })
        .await
}

fn path_or_404(m: &Map, path_id: &str) -> Result<MapPath, ApiError> {
    paths::find_path(&m.paths, path_id)
        .cloned()
        .ok_or_else(|| not_found(format!("path not found: {path_id}")))
}

async fn api_path_replace(
    State(state): SharedState,
    Path((id, path_id)): Path<(String, String)>,
    Json(mut input): Json<MapPath>,
) -> Result<Json<MapPath>, ApiError> {
    input.id = path_id.clone();
    state
        .sessions
        .edit(&id, |s| {
            path_or_404(&s.map, &path_id)?;
            s.map = map::with_paths(&s.map, paths::update_path(&s.map.paths, input));
            path_or_404(&s.map, &path_id).map(Json)
        })
        .await
}

async fn api_path_delete(
    State(state): SharedState,
    Path((id, path_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .edit(&id, |s| {
            path_or_404(&s.map, &path_id)?;
            s.map = map::with_paths(&s.map, paths::delete_path(&s.map.paths, &path_id));
            Ok(StatusCode::NO_CONTENT)
        })
        .await
}

async fn api_path_append(
    State(state): SharedState,
    Path((id, path_id)): Path<(String, String)>,
    Json(point): Json<Point>,
) -> Result<Json<MapPath>, ApiError> {
    if !(point.x.is_finite() && point.y.is_finite()) {
        return Err(bad_request("point coordinates must be finite"));
    }
    state
        .sessions
        .edit(&id, |s| {
            path_or_404(&s.map, &path_id)?;
            s.map = map::with_point(&s.map, &path_id, point);
            path_or_404(&s.map, &path_id).map(Json)
        })
        .await
}

async fn api_path_pop(
    State(state): SharedState,
    Path((id, path_id)): Path<(String, String)>,
) -> Result<Json<MapPath>, ApiError> {
    state
        .sessions
        .edit(&id, |s| {
            path_or_404(&s.map, &path_id)?;
            s.map = map::without_last_point(&s.map, &path_id);
            path_or_404(&s.map, &path_id).map(Json)
        })
        .await
}

async fn api_map_status(
    State(state): SharedState,
    Path(id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    let status = state.sessions.read(&id, |s| s.status()).await?;
    Ok(Json(status))
}

async fn api_map_flush(
    State(state): SharedState,
    Path(id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    state.sessions.read(&id, |_| ()).await?;
    state.sessions.persist_latest(&id).await.map_err(internal)?;
    let status = state.sessions.read(&id, |s| s.status()).await?;
    Ok(Json(status))
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    serve_listener(listener, config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

/// Serves until `shutdown` resolves, then writes any unsaved edits.
pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    config: Config,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let state = Arc::new(AppState::new(
        Engine::new(config.db_path.clone()),
        config.debounce(),
    ));
    let app = build_router_shared(state.clone());
    let addr = listener.local_addr()?;
    tracing::info!(%addr, db = %config.db_path.display(), "hexatlas server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    state.sessions.flush_all().await;
    tracing::info!("hexatlas server stopped");
    Ok(addr)
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ip = peer.ip();
    if is_allowed_peer_ip(ip) {
        return next.run(req).await;
    }
    tracing::warn!(%ip, "rejected non-local peer");
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    // Tailscale CGNAT range (100.64.0.0/10).
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            // 100.64.0.0 - 100.127.255.255
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(_v6) => false,
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::header;
    use axum::http::HeaderValue;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_local_origin(origin)
        }))
}

fn is_allowed_local_origin(origin: &axum::http::HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };

    // Dev server and local reverse proxies.
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // Origin is just scheme://host[:port]
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}
