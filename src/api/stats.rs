use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    aggregation::StatsEngine,
    backend::PrometheusClient,
    config::StatsConfig,
    metrics::{self, RequestTimer},
    models::{MetricSeries, StatsResponse},
    query::MetricCatalog,
    scope::Scope,
    window::{TimeWindow, WindowParams},
    Result,
    StatsError,
};

#[derive(Clone)]
pub struct StatsState {
    pub engine: StatsEngine,
}

type QueryPairs = Query<Vec<(String, String)>>;

pub fn stats_router(state: StatsState) -> Router {
    Router::new()
        .route("/v1/stats", get(global_stats))
        .route("/v1/statistics", get(global_stats))
        .route("/v1/apps/:app/stats", get(app_stats))
        .route("/v1/apps/:app/statistics", get(app_stats))
        .route("/v1/apps/:app/routes/:route/stats", get(route_stats))
        .route("/v1/apps/:app/routes/:route/statistics", get(route_stats))
        .route("/metrics", get(self_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn global_stats(
    State(state): State<StatsState>,
    Query(pairs): QueryPairs,
) -> Result<Json<StatsResponse>> {
    serve_stats(&state, Scope::resolve(None, None), &pairs).await
}

async fn app_stats(
    State(state): State<StatsState>,
    Path(app): Path<String>,
    Query(pairs): QueryPairs,
) -> Result<Json<StatsResponse>> {
    serve_stats(&state, Scope::resolve(Some(&app), None), &pairs).await
}

async fn route_stats(
    State(state): State<StatsState>,
    Path((app, route)): Path<(String, String)>,
    Query(pairs): QueryPairs,
) -> Result<Json<StatsResponse>> {
    let route = route_path(&route);
    serve_stats(&state, Scope::resolve(Some(&app), Some(&route)), &pairs).await
}

async fn self_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// Route labels carry the route path, which always starts with `/`.
fn route_path(route: &str) -> String {
    format!("/{}", route.trim_start_matches('/'))
}

async fn serve_stats(
    state: &StatsState,
    scope: Scope,
    pairs: &[(String, String)],
) -> Result<Json<StatsResponse>> {
    let _timer = RequestTimer::new(scope.kind());
    info!("Getting statistics for {}", scope);

    match collect_stats(state, &scope, pairs).await {
        Ok(data) => Ok(Json(StatsResponse::success(data))),
        Err(e) => {
            warn!("Statistics request for {} failed: {}", scope, e);
            metrics::record_request_error(e.kind());
            Err(e)
        }
    }
}

async fn collect_stats(
    state: &StatsState,
    scope: &Scope,
    pairs: &[(String, String)],
) -> Result<MetricSeries> {
    let params = WindowParams::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let window = TimeWindow::resolve(&params)?;
    state.engine.aggregate(scope, &window).await
}

pub async fn start_stats_node(config: StatsConfig) -> Result<()> {
    let client = PrometheusClient::new(&config.prom_host, config.prom_port)?;
    info!("Using metrics backend at {}", client.base_url());

    let engine = StatsEngine::new(Arc::new(client), MetricCatalog::default());
    let app = stats_router(StatsState { engine });

    let addr = config.listen_addr();
    info!("Starting statistics API on {}", addr);

    let listener = TcpListener::bind(addr.as_str()).await.map_err(|e| {
        StatsError::Internal(format!("Failed to bind to address: {}", e))
    })?;

    axum::serve(listener, app).await.map_err(|e| {
        StatsError::Internal(format!("Server error: {}", e))
    })?;

    Ok(())
}
