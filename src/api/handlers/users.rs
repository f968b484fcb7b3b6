use axum::{
    extract::{Path, Query, State},
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

use crate::api::routes::PaginationParams;
use crate::api::AppState;
use crate::error::{LedgerError, Result};
use crate::models::transaction::PAYMENT_METHOD_PIX;

fn parse_amount(raw: &str) -> Result<BigDecimal> {
    BigDecimal::from_str(raw)
        .map_err(|_| LedgerError::Validation(format!("{} is not a valid amount", raw)))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub referred_by: Option<String>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<Value>> {
    let user = state
        .ledger
        .accounts
        .register(&req.name, &req.email, req.referred_by.as_deref())
        .await?;
    Ok(Json(json!({ "user": user })))
}

pub async fn get_users(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Value>> {
    let users = state.store.users().await?;
    Ok(Json(json!({
        "total": users.len(),
        "users": pagination.slice(&users),
    })))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let user = state
        .store
        .user(&id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("user", id))?;
    Ok(Json(json!({ "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Admin profile update. Balance and earnings are not editable here; they
/// move through the payout paths only.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: axum::http::HeaderMap,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<Value>> {
    let actor = crate::api::routes::resolve_actor(&state, &headers).await?;
    if !actor.is_admin() {
        return Err(LedgerError::Unauthorized);
    }
    let update = crate::models::user::UserUpdate {
        name: req.name,
        email: req.email,
        role: req.role,
        updated_at: Some(state.ledger.clock.now()),
    };
    let user = state.store.update_user(&id, update).await?;
    Ok(Json(json!({ "user": user })))
}

/// Full transaction ledger, admin view.
pub async fn get_transactions(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Value>> {
    let actor = crate::api::routes::resolve_actor(&state, &headers).await?;
    if !actor.is_admin() {
        return Err(LedgerError::Unauthorized);
    }
    let transactions = state.store.transactions().await?;
    Ok(Json(json!({
        "total": transactions.len(),
        "transactions": pagination.slice(&transactions),
    })))
}

pub async fn get_user_transactions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Value>> {
    state
        .store
        .user(&id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("user", id.clone()))?;
    let transactions = state.store.transactions_for(&id).await?;
    Ok(Json(json!({
        "total": transactions.len(),
        "transactions": pagination.slice(&transactions),
    })))
}

pub async fn get_user_downline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    state
        .store
        .user(&id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("user", id.clone()))?;
    let downline = state.ledger.graph.downline(&id).await?;
    let mut members: Vec<String> = downline.into_iter().collect();
    members.sort();
    Ok(Json(json!({
        "count": members.len(),
        "members": members,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: String,
    pub payment_method: Option<String>,
}

pub async fn deposit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<Value>> {
    let amount = parse_amount(&req.amount)?;
    let method = req.payment_method.as_deref().unwrap_or(PAYMENT_METHOD_PIX);
    let (tx, commissions) = state.ledger.accounts.deposit(&id, amount, method).await?;
    Ok(Json(json!({
        "transaction": tx,
        "commissions_created": commissions.len(),
        "commissions": commissions,
    })))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: String,
}

pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<Value>> {
    let amount = parse_amount(&req.amount)?;
    let tx = state.ledger.accounts.withdraw(&id, amount).await?;
    Ok(Json(json!({ "transaction": tx })))
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub amount: String,
    pub tx_type: String,
    pub description: String,
    pub reference_id: Option<String>,
}

/// Admin balance adjustment. Runs through the payout processor so the credit
/// lands in the ledger like every other balance increase.
pub async fn credit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: axum::http::HeaderMap,
    Json(req): Json<CreditRequest>,
) -> Result<Json<Value>> {
    let actor = crate::api::routes::resolve_actor(&state, &headers).await?;
    if !actor.is_admin() {
        return Err(LedgerError::Unauthorized);
    }
    let amount = parse_amount(&req.amount)?;
    let tx = state
        .ledger
        .payouts
        .credit_user(
            &id,
            amount,
            &req.tx_type,
            req.description,
            crate::models::transaction::PAYMENT_METHOD_BALANCE,
            req.reference_id,
        )
        .await?;
    Ok(Json(json!({ "transaction": tx })))
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub plan_code: String,
}

pub async fn purchase_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<Value>> {
    let tx = state.ledger.accounts.purchase_plan(&id, &req.plan_code).await?;
    Ok(Json(json!({ "transaction": tx })))
}
