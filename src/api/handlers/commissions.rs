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
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct CommissionFilter {
    pub status: Option<String>,
    pub level: Option<i32>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn get_commissions(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CommissionFilter>,
) -> Result<Json<Value>> {
    let mut commissions = state.store.commissions().await?;
    if let Some(status) = &filter.status {
        commissions.retain(|c| &c.status == status);
    }
    if let Some(level) = filter.level {
        commissions.retain(|c| c.level == level);
    }

    let pagination = PaginationParams {
        limit: filter.limit,
        offset: filter.offset,
    };
    Ok(Json(json!({
        "total": commissions.len(),
        "commissions": pagination.slice(&commissions),
    })))
}

/// Admin catch-up: generate commissions for every completed deposit that has
/// none yet.
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let actor = resolve_actor(&state, &headers).await?;
    if !actor.is_admin() {
        return Err(crate::error::LedgerError::Unauthorized);
    }
    let summary = state.ledger.commissions.reconcile_pending().await?;
    Ok(Json(json!({ "summary": summary })))
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub commission_ids: Vec<String>,
}

pub async fn pay(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PayRequest>,
) -> Result<Json<Value>> {
    let actor = resolve_actor(&state, &headers).await?;
    let summary = state
        .ledger
        .commissions
        .pay(&actor, &req.commission_ids)
        .await?;
    Ok(Json(json!({ "summary": summary })))
}
