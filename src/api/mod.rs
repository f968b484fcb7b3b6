mod handlers;
mod routes;

use crate::config::Config;
use crate::ledger::Ledger;
use crate::store::Store;
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every handler.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub ledger: Arc<Ledger>,
}

/// Start the API server
pub async fn start_api_server(store: Arc<dyn Store>, ledger: Arc<Ledger>) -> Result<()> {
    let config = Config::get();

    // Set up CORS
    let cors = if config.api.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::permissive()
    };

    let state = Arc::new(AppState { store, ledger });

    // Create router with all routes
    let app = Router::new()
        // General routes
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::get_metrics))
        // User and account routes
        .route("/api/users", post(handlers::users::register).get(handlers::users::get_users))
        .route("/api/users/:id", get(handlers::users::get_user).patch(handlers::users::update_user))
        .route("/api/users/:id/transactions", get(handlers::users::get_user_transactions))
        .route("/api/users/:id/downline", get(handlers::users::get_user_downline))
        .route("/api/users/:id/deposit", post(handlers::users::deposit))
        .route("/api/users/:id/credit", post(handlers::users::credit))
        .route("/api/users/:id/withdraw", post(handlers::users::withdraw))
        .route("/api/users/:id/investments", post(handlers::users::purchase_plan))
        .route("/api/transactions", get(handlers::users::get_transactions))
        // Plan routes
        .route("/api/plans", get(handlers::plans::get_plans).post(handlers::plans::create_plan))
        // Commission routes
        .route("/api/commissions", get(handlers::commissions::get_commissions))
        .route("/api/commissions/reconcile", post(handlers::commissions::reconcile))
        .route("/api/commissions/pay", post(handlers::commissions::pay))
        // Dividend routes
        .route("/api/dividends", get(handlers::dividends::get_dividends))
        .route("/api/dividends/generate", post(handlers::dividends::generate))
        .route("/api/dividends/pay", post(handlers::dividends::pay))
        // Network routes
        .route("/api/network/reassign", post(handlers::network::reassign_sponsor))
        .route("/api/network/referrals", get(handlers::network::get_referrals))
        .route("/api/network/changes", get(handlers::network::get_network_changes))
        // Reconciliation
        .route("/api/reconciliation/run", post(handlers::network::run_reconciliation))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Get bind address
    let addr = format!("{}:{}", config.api.host, config.api.port).parse::<SocketAddr>()?;

    // Start server
    info!("Starting API server on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
