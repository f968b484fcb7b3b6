use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::routes::{resolve_actor, PaginationParams};
use crate::api::AppState;
use crate::error::{LedgerError, Result};
use crate::models::dividend::DIVIDEND_METHOD_MANUAL;

#[derive(Debug, Deserialize)]
pub struct DividendFilter {
    pub status: Option<String>,
    pub date: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn get_dividends(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DividendFilter>,
) -> Result<Json<Value>> {
    let mut dividends = state.store.dividends().await?;
    if let Some(status) = &filter.status {
        dividends.retain(|d| &d.status == status);
    }
    if let Some(date) = filter.date {
        dividends.retain(|d| d.dividend_date == date);
    }

    let pagination = PaginationParams {
        limit: filter.limit,
        offset: filter.offset,
    };
    Ok(Json(json!({
        "total": dividends.len(),
        "dividends": pagination.slice(&dividends),
    })))
}

/// Generate today's pending dividends (idempotent).
pub async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let actor = resolve_actor(&state, &headers).await?;
    if !actor.is_admin() {
        return Err(LedgerError::Unauthorized);
    }
    let today = state.ledger.clock.today();
    let generated = state.ledger.dividends.generate_daily(today).await?;
    Ok(Json(json!({ "generated": generated, "date": today })))
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub dividend_ids: Vec<String>,
    pub method: Option<String>,
}

pub async fn pay(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PayRequest>,
) -> Result<Json<Value>> {
    let actor = resolve_actor(&state, &headers).await?;
    let method = req.method.as_deref().unwrap_or(DIVIDEND_METHOD_MANUAL);
    let summary = state
        .ledger
        .dividends
        .pay(&actor, &req.dividend_ids, method)
        .await?;
    Ok(Json(json!({ "summary": summary })))
}
