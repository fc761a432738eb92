use std::fmt::Write as _;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::state::{AppState, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "visits": state.store.visit_count(),
        "photos": state.store.photo_count(),
        "max_photos_per_visit": state.max_photos_per_visit,
        "observability": {
            "toggle_requests_total": observability.toggle_requests_total,
            "visits_added_total": observability.visits_added_total,
            "visits_removed_total": observability.visits_removed_total,
            "preview_requests_total": observability.preview_requests_total,
            "photo_writes_total": observability.photo_writes_total,
            "notes_saves_total": observability.notes_saves_total,
            "rejected_requests_total": observability.rejected_requests_total,
        }
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = render_prometheus_metrics(
        state.store.visit_count(),
        state.store.photo_count(),
        state.observability.snapshot(),
    );

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn write_metric(body: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(body, "# HELP {name} {help}");
    let _ = writeln!(body, "# TYPE {name} {kind}");
    let _ = writeln!(body, "{name} {value}");
}

fn render_prometheus_metrics(
    visit_count: usize,
    photo_count: usize,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    write_metric(
        &mut body,
        "visitmap_visits",
        "gauge",
        "Current number of stored visit records.",
        visit_count as u64,
    );
    write_metric(
        &mut body,
        "visitmap_photos",
        "gauge",
        "Current number of stored preview photos.",
        photo_count as u64,
    );
    write_metric(
        &mut body,
        "visitmap_toggle_requests_total",
        "counter",
        "Total visit toggle requests.",
        observability.toggle_requests_total,
    );
    write_metric(
        &mut body,
        "visitmap_visits_added_total",
        "counter",
        "Total toggle requests that left a region visited.",
        observability.visits_added_total,
    );
    write_metric(
        &mut body,
        "visitmap_visits_removed_total",
        "counter",
        "Total toggle requests that left a region unvisited.",
        observability.visits_removed_total,
    );
    write_metric(
        &mut body,
        "visitmap_preview_requests_total",
        "counter",
        "Total preview photo list requests.",
        observability.preview_requests_total,
    );
    write_metric(
        &mut body,
        "visitmap_photo_writes_total",
        "counter",
        "Total successful photo adds, edits and deletes.",
        observability.photo_writes_total,
    );
    write_metric(
        &mut body,
        "visitmap_notes_saves_total",
        "counter",
        "Total successful notes saves.",
        observability.notes_saves_total,
    );
    write_metric(
        &mut body,
        "visitmap_rejected_requests_total",
        "counter",
        "Total requests rejected by validation or store rules.",
        observability.rejected_requests_total,
    );
    body
}
