use axum::http::HeaderMap;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::AppState;
use crate::error::{LedgerError, Result};
use crate::models::user::Actor;

/// Resolve the acting user from the `x-actor-id` header. The identity
/// provider in front of this service is trusted to have authenticated the
/// id; the ledger only needs id and role.
pub async fn resolve_actor(state: &Arc<AppState>, headers: &HeaderMap) -> Result<Actor> {
    let id = headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .ok_or(LedgerError::Unauthorized)?;
    let user = state
        .store
        .user(id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("user", id.to_string()))?;
    Ok(Actor { id: user.id, role: user.role })
}

/// Pagination parameters
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: Some(50),
            offset: Some(0),
        }
    }
}

/// Standard pagination implementation
impl PaginationParams {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(50).min(200)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset())
            .take(self.limit())
            .cloned()
            .collect()
    }
}
