pub mod commission;
pub mod dividend;
pub mod network_change;
pub mod plan;
pub mod referral;
pub mod transaction;
pub mod user;

/// Generate a fresh row id. Referral codes, not ids, are the public handle,
/// so ids only need to be unique and opaque.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
