//! HTTP request handlers.

use super::AppState;
use crate::db::{
    response_history, DbError, MonitorChanges, MonitorView, NewMonitor, DEFAULT_HISTORY_LIMIT,
};
use crate::live::LiveUpdate;
use crate::stats::SnapshotSource;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use chrono::Utc;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::{Stream, StreamExt};

const MAX_HISTORY_LIMIT: usize = 1000;

fn db_error_response(e: DbError) -> Response {
    match e {
        DbError::NotFound => (StatusCode::NOT_FOUND, "Monitor not found").into_response(),
        e => {
            tracing::error!("Database error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| s.trim().is_empty())
}

// ============================================================================
// API: Monitors
// ============================================================================

pub async fn handle_list_monitors(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_monitors() {
        Ok(monitors) => {
            let now = Utc::now();
            let views: Vec<MonitorView> =
                monitors.into_iter().map(|m| MonitorView::new(m, now)).collect();
            Json(views).into_response()
        }
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_get_monitor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.get_monitor(id) {
        Ok(monitor) => Json(MonitorView::new(monitor, Utc::now())).into_response(),
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_create_monitor(
    State(state): State<AppState>,
    Json(req): Json<NewMonitor>,
) -> impl IntoResponse {
    let req = NewMonitor {
        name: req.name.trim().to_string(),
        url: req.url.trim().to_string(),
        ..req
    };
    if req.name.is_empty() || req.url.is_empty() {
        return (StatusCode::BAD_REQUEST, "Name and URL are required").into_response();
    }

    match state.store.create_monitor(&req) {
        Ok(monitor) => {
            tracing::info!("Created monitor {} ({}) for {}", monitor.id, monitor.name, monitor.url);
            // First probe runs right away instead of waiting for the next sweep
            state.scheduler.submit(monitor.id);
            state.debouncer.trigger();
            (StatusCode::CREATED, Json(MonitorView::new(monitor, Utc::now()))).into_response()
        }
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_update_monitor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<MonitorChanges>,
) -> impl IntoResponse {
    if is_blank(&changes.name) || is_blank(&changes.url) {
        return (StatusCode::BAD_REQUEST, "Name and URL cannot be empty").into_response();
    }
    if changes.check_interval.is_some_and(|secs| secs <= 0) {
        return (StatusCode::BAD_REQUEST, "Check interval must be positive").into_response();
    }

    match state.store.update_monitor(id, &changes) {
        Ok(monitor) => {
            let view = MonitorView::new(monitor, Utc::now());
            state.broadcaster.publish(&LiveUpdate::MonitorUpdate(view.clone()));
            state.debouncer.trigger();
            Json(view).into_response()
        }
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_delete_monitor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.delete_monitor(id) {
        Ok(()) => {
            tracing::info!("Deleted monitor {}", id);
            state.broadcaster.publish(&LiveUpdate::MonitorDeleted { id });
            state.debouncer.trigger();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => db_error_response(e),
    }
}

// ============================================================================
// API: History and stats
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn handle_monitor_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    if let Err(e) = state.store.get_monitor(id) {
        return db_error_response(e);
    }

    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    match response_history(state.store.as_ref(), id, limit) {
        Ok(records) => Json(records).into_response(),
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.stats.snapshot() {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => db_error_response(e),
    }
}

// ============================================================================
// Live events
// ============================================================================

/// Server-Sent Events stream of live updates.
///
/// Each connection is a new observer. The current stats are sent first so a
/// fresh dashboard does not wait for the next change. The subscription is
/// dropped with the response body, which unsubscribes the observer.
pub async fn handle_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.broadcaster.subscribe(format!("{:016x}", rand::random::<u64>()));
    tracing::info!(
        "Events: Observer {} connected ({} total)",
        subscription.id(),
        state.broadcaster.observer_count()
    );

    let snapshot = match state.stats.snapshot() {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!(
                "Events: Failed to compute stats for {}, sending last published: {}",
                subscription.id(),
                e
            );
            state.debouncer.last_published()
        }
    };
    let initial = snapshot.and_then(|s| serde_json::to_string(&LiveUpdate::StatsUpdate(s)).ok());

    let initial =
        tokio_stream::iter(initial).map(|msg| Ok::<_, Infallible>(Event::default().data(msg)));
    let updates = subscription.map(|msg| Ok::<_, Infallible>(Event::default().data(&*msg)));

    Sse::new(initial.chain(updates)).keep_alive(KeepAlive::default())
}
