//! Builds the `axum::Router` and runs it to completion.

use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::logging::{get_tracing_layer, logging_middleware};
use crate::openapi::ApiDoc;
use crate::routes;
use crate::state::AppState;

pub struct Server {
    state: AppState,
    bind_addr: String,
}

impl Server {
    pub fn new(state: AppState, bind_addr: String) -> Self {
        Self { state, bind_addr }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health::health))
            .route("/agents/:id/task", post(routes::agents::dispatch_task))
            .route("/agents/:id/runs", get(routes::agents::list_runs))
            .route("/runs/:id/cancel", post(routes::runs::cancel_run))
            .route("/threads/:id/messages", post(routes::threads::post_message))
            .route("/workflow-executions/:id/start", post(routes::workflows::start_execution))
            .route("/workflow-executions/:id/cancel", post(routes::workflows::cancel_execution))
            .route("/triggers/:id/events", post(routes::triggers::ingest_event))
            .route("/ws", get(routes::ws::ws_handler))
            .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
            .layer(axum::middleware::from_fn(logging_middleware))
            .layer(get_tracing_layer())
            .with_state(self.state.clone())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.bind_addr.clone();
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "listening");
        axum::serve(listener, router).await?;
        Ok(())
    }
}
