pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod scheduler;
pub mod schema;
pub mod store;

#[macro_use]
extern crate diesel;
