//! OpenAPI specification, generated from route handlers and schema types
//! via `utoipa`. Served as JSON at `/api-doc/openapi.json` and as Swagger
//! UI at `/docs` (SPEC_FULL.md §6).

use utoipa::OpenApi;

use crate::types::*;

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "Agent Automation Platform API",
        description = "REST and WebSocket surface for dispatching agent runs, driving workflow \
                        executions, and receiving real-time progress over topic subscriptions.",
        version = "1.0.0"
    ),
    paths(
        crate::routes::agents::dispatch_task,
        crate::routes::agents::list_runs,
        crate::routes::runs::cancel_run,
        crate::routes::threads::post_message,
        crate::routes::workflows::start_execution,
        crate::routes::workflows::cancel_execution,
        crate::routes::triggers::ingest_event,
        crate::routes::health::health,
    ),
    components(schemas(
        TaskRequest,
        TaskResponse,
        ThreadMessageRequest,
        RunSummary,
        RunListResponse,
        ExecutionResponse,
        HealthResponse,
        ErrorBody,
        zerg_common::ExecutionStatus,
        zerg_common::RunStatus,
        zerg_common::RunTrigger,
    )),
    tags(
        (name = "agents", description = "Manual run dispatch and run history"),
        (name = "threads", description = "Chat-thread message dispatch"),
        (name = "workflows", description = "Workflow execution control"),
        (name = "triggers", description = "Webhook trigger ingress"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;
