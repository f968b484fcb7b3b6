// Copyright (c) BYD Profit Team
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::routes::{resolve_actor, PaginationParams};
use crate::api::AppState;
use crate::error::{LedgerError, Result};

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub user_id: String,
    pub new_sponsor_id: String,
    pub reason: String,
}

pub async fn reassign_sponsor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ReassignRequest>,
) -> Result<Json<Value>> {
    let actor = resolve_actor(&state, &headers).await?;
    let chain = state
        .ledger
        .graph
        .reassign_sponsor(&actor, &req.user_id, &req.new_sponsor_id, &req.reason)
        .await?;
    Ok(Json(json!({
        "chain_levels": chain.len(),
        "chain": chain,
    })))
}

pub async fn get_referrals(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Value>> {
    let referrals = state.store.referrals().await?;
    Ok(Json(json!({
        "total": referrals.len(),
        "referrals": pagination.slice(&referrals),
    })))
}

pub async fn get_network_changes(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Value>> {
    let changes = state.store.network_changes().await?;
    Ok(Json(json!({
        "total": changes.len(),
        "changes": pagination.slice(&changes),
    })))
}

/// Recompute every balance from the ledger and repair drift.
pub async fn run_reconciliation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let actor = resolve_actor(&state, &headers).await?;
    if !actor.is_admin() {
        return Err(LedgerError::Unauthorized);
    }
    let report = state.ledger.reconciler.verify_and_repair().await?;
    Ok(Json(json!({ "report": report })))
}
