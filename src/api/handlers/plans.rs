use axum::{extract::State, http::HeaderMap, Json};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

use crate::api::routes::resolve_actor;
use crate::api::AppState;
use crate::error::{LedgerError, Result};
use crate::models::new_id;
use crate::models::plan::InvestmentPlan;

pub async fn get_plans(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let plans = state.store.plans().await?;
    Ok(Json(json!({ "plans": plans })))
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub value: String,
    pub return_rate: String,
    pub return_period: i32,
    pub daily_profit: String,
    pub total_profit: String,
    pub is_active: Option<bool>,
}

fn decimal_field(raw: &str, field: &str) -> Result<BigDecimal> {
    BigDecimal::from_str(raw)
        .map_err(|_| LedgerError::Validation(format!("{} must be a decimal, got {}", field, raw)))
}

pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreatePlanRequest>,
) -> Result<Json<Value>> {
    let actor = resolve_actor(&state, &headers).await?;
    if !actor.is_admin() {
        return Err(LedgerError::Unauthorized);
    }

    let now = state.ledger.clock.now();
    let plan = InvestmentPlan {
        id: new_id(),
        code: req.code,
        name: req.name,
        description: req.description.unwrap_or_default(),
        value: decimal_field(&req.value, "value")?,
        return_rate: decimal_field(&req.return_rate, "return_rate")?,
        return_period: req.return_period,
        daily_profit: decimal_field(&req.daily_profit, "daily_profit")?,
        total_profit: decimal_field(&req.total_profit, "total_profit")?,
        is_active: req.is_active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    let plan = state.store.insert_plan(plan).await?;
    Ok(Json(json!({ "plan": plan })))
}
