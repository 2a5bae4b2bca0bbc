//! Application setup: router, middleware stack and shared state.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::middleware::require_api_key;
use super::routes;
use crate::api::ApiHandler;
use crate::data::DataStore;
use crate::provisioning::Provisioner;

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<ApiHandler>,
    pub api_key: Arc<String>,
}

pub fn build_app(pool: PgPool, provisioner: Arc<dyn Provisioner>, api_key: String) -> Router {
    let store = DataStore::new(pool);
    let state = AppState {
        api: Arc::new(ApiHandler::new(store, provisioner)),
        api_key: Arc::new(api_key),
    };

    // Registration endpoints - called by the CLI tool
    let registration = Router::new()
        .route("/projects", get(routes::list_projects))
        .route(
            "/projects/:project_name",
            put(routes::create_project)
                .get(routes::get_project)
                .delete(routes::request_project_deletion),
        )
        .route(
            "/projects/:project_name/versions",
            post(routes::create_project_version).get(routes::list_project_versions),
        )
        .route(
            "/projects/:project_name/versions/:version_ref",
            get(routes::get_project_version),
        );

    // Invocation endpoints - called by invokers, including nested calls
    let invocations = Router::new()
        .route(
            "/projects/:project_name/versions/:version_ref/functions/:function_name/invocations",
            post(routes::create_invocation).get(routes::list_invocations),
        )
        .route(
            "/projects/:project_name/versions/:version_ref/functions/:function_name/invocations/:invocation_id",
            get(routes::get_invocation),
        )
        .route(
            "/projects/:project_name/versions/:version_ref/functions/:function_name/invocations/:invocation_id/cancel",
            put(routes::cancel_invocation),
        );

    // Execution endpoints - called by workers
    let executions = Router::new()
        .route(
            "/projects/:project_name/versions/:version_ref/functions/:function_name/invocations/:invocation_id/executions/:execution_id",
            get(routes::get_execution),
        )
        .route(
            "/projects/:project_name/versions/:version_ref/functions/:function_name/invocations/:invocation_id/executions/:execution_id/start",
            put(routes::start_execution),
        )
        .route(
            "/projects/:project_name/versions/:version_ref/functions/:function_name/invocations/:invocation_id/executions/:execution_id/update",
            put(routes::update_execution),
        )
        .route(
            "/projects/:project_name/versions/:version_ref/functions/:function_name/invocations/:invocation_id/executions/:execution_id/finish",
            put(routes::finish_execution),
        )
        .route(
            "/projects/:project_name/versions/:version_ref/functions/:function_name/invocations/:invocation_id/executions/:execution_id/logs",
            get(routes::get_execution_logs),
        );

    let authenticated = registration
        .merge(invocations)
        .merge(executions)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/", get(routes::health_check))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
