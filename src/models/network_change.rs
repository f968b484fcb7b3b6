use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::network_changes;

/// Audit record for a sponsor reassignment.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = network_changes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NetworkChange {
    pub id: String,
    pub user_id: String,
    pub old_sponsor_id: Option<String>,
    pub new_sponsor_id: String,
    pub admin_id: String,
    pub reason: String,
    pub old_network_path: String,
    pub new_network_path: String,
    pub created_at: DateTime<Utc>,
}
