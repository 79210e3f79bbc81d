pub mod config;
pub mod error;
pub mod state;
pub mod auth;
pub mod db;
pub mod models;
pub mod routes;
pub mod executors;
pub mod outbox;
pub mod worker;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::OutboxStore;
use crate::executors::email::EmailExecutor;
use crate::executors::github::GithubIssueExecutor;
use crate::executors::ExecutorRegistry;
use crate::outbox::Processor;
use crate::state::{AppState, SharedState};

/// Register an executor for every integration that has credentials configured.
pub fn build_executors(config: &Config) -> ExecutorRegistry {
    let mut executors = ExecutorRegistry::new();

    if let Some(github) = &config.github {
        match GithubIssueExecutor::new(github) {
            Ok(executor) => {
                tracing::info!("GitHub issue executor configured");
                executors.register(Arc::new(executor));
            }
            Err(e) => tracing::warn!("GitHub issue executor not available: {e}"),
        }
    }

    if let Some(smtp) = &config.smtp {
        match EmailExecutor::new(smtp) {
            Ok(executor) => {
                tracing::info!("Email executor configured");
                executors.register(Arc::new(executor));
            }
            Err(e) => tracing::warn!("Email executor not available: {e}"),
        }
    }

    if executors.action_types().is_empty() {
        tracing::warn!("No executors configured; every enqueue will be rejected");
    }

    executors
}

pub fn build_app(
    store: Arc<dyn OutboxStore>,
    executors: ExecutorRegistry,
    config: Config,
) -> (Router, SharedState) {
    let processor = Arc::new(Processor::new(store, executors, config.outbox.clone()));

    let state: SharedState = Arc::new(AppState { config, processor });

    let app = Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("x-content-type-options"),
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("cache-control"),
                    HeaderValue::from_static("no-store"),
                )),
        )
        .with_state(state.clone());

    (app, state)
}

async fn health() -> &'static str {
    "ok"
}
