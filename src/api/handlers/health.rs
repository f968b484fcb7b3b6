// Copyright (c) BYD Profit Team
// SPDX-License-Identifier: Apache-2.0

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::api::AppState;
use crate::metrics;

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // The store is the only dependency worth probing.
    match state.store.users().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "message": "ledger API is running"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "message": format!("store unavailable: {}", e)
            })),
        ),
    }
}

/// Prometheus metrics in text exposition format.
pub async fn get_metrics() -> impl IntoResponse {
    metrics::gather()
}
