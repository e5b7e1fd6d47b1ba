use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use crm_automation_shared::{TriggerType, WorkflowExecution, WorkflowRule, WorkflowRuleInput};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::jobs::ScheduleRun;
use crate::services::{AuditAction, AuditEntryBuilder};
use crate::validation::{clamp_limit, validate_rule_input};
use crate::AppState;

pub const ACTOR_HEADER: &str = "x-actor-id";
const DEFAULT_EXECUTION_LIMIT: i64 = 50;
const MAX_EXECUTION_LIMIT: i64 = 500;
const DEFAULT_RUN_LIMIT: i64 = 20;
const MAX_RUN_LIMIT: i64 = 100;
const RESOURCE_TYPE: &str = "workflow_rule";

#[derive(Debug, Deserialize)]
pub struct RuleListQuery {
    #[serde(default)]
    pub enabled_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionQuery {
    pub workflow_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RunLogQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetEnabled {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub trigger: TriggerType,
    #[serde(default = "empty_payload")]
    pub payload: Value,
}

fn empty_payload() -> Value {
    json!({})
}

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_rules).post(create_rule))
        .route("/executions", get(list_executions))
        .route("/trigger", post(trigger_workflows))
        .route("/schedules/runs", get(list_schedule_runs))
        .route("/:id", get(get_rule).put(update_rule).delete(delete_rule))
        .route("/:id/enabled", patch(set_rule_enabled))
}

/// Reads the acting user from `x-actor-id`; absent means a system caller.
fn actor_id(headers: &HeaderMap) -> ApiResult<Option<Uuid>> {
    match headers.get(ACTOR_HEADER) {
        None => Ok(None),
        Some(raw) => raw
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("{} must be a UUID", ACTOR_HEADER))),
    }
}

fn audit(state: &AppState, action: AuditAction, actor: Option<Uuid>, rule: &WorkflowRule) {
    state.audit.record(
        AuditEntryBuilder::new(action, RESOURCE_TYPE)
            .actor(actor)
            .resource(rule.id, Some(rule.name.clone()))
            .metadata_json(json!({
                "trigger": rule.trigger,
                "enabled": rule.enabled,
                "priority": rule.priority,
            })),
    );
}

async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RuleListQuery>,
) -> ApiResult<Json<Vec<WorkflowRule>>> {
    let rules = state.engine.rules().list(params.enabled_only).await?;
    Ok(Json(rules))
}

async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowRule>> {
    state
        .engine
        .rules()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Workflow rule {}", id)))
}

async fn create_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<WorkflowRuleInput>,
) -> ApiResult<(StatusCode, Json<WorkflowRule>)> {
    let actor = actor_id(&headers)?;
    let input = validate_rule_input(input)?;

    let rule = state.engine.rules().create(input, actor).await?;
    info!("Created workflow rule '{}' ({})", rule.name, rule.id);
    audit(&state, AuditAction::Create, actor, &rule);

    Ok((StatusCode::CREATED, Json(rule)))
}

async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<WorkflowRuleInput>,
) -> ApiResult<Json<WorkflowRule>> {
    let actor = actor_id(&headers)?;
    let input = validate_rule_input(input)?;

    let rule = state.engine.rules().update(id, input).await?;
    info!("Updated workflow rule '{}' ({})", rule.name, rule.id);
    audit(&state, AuditAction::Update, actor, &rule);

    Ok(Json(rule))
}

async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let actor = actor_id(&headers)?;
    let rule = state
        .engine
        .rules()
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Workflow rule {}", id)))?;

    state.engine.rules().delete(id).await?;
    info!("Deleted workflow rule '{}' ({})", rule.name, rule.id);
    audit(&state, AuditAction::Delete, actor, &rule);

    Ok(StatusCode::NO_CONTENT)
}

async fn set_rule_enabled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<SetEnabled>,
) -> ApiResult<Json<WorkflowRule>> {
    let actor = actor_id(&headers)?;
    let rule = state.engine.rules().set_enabled(id, body.enabled).await?;

    let action = if rule.enabled {
        AuditAction::Enable
    } else {
        AuditAction::Disable
    };
    audit(&state, action, actor, &rule);

    Ok(Json(rule))
}

async fn list_executions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExecutionQuery>,
) -> ApiResult<Json<Vec<WorkflowExecution>>> {
    let limit = clamp_limit(params.limit, DEFAULT_EXECUTION_LIMIT, MAX_EXECUTION_LIMIT);
    let executions = state
        .engine
        .executions()
        .list(params.workflow_id, limit)
        .await?;
    Ok(Json(executions))
}

async fn trigger_workflows(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriggerRequest>,
) -> ApiResult<Json<Vec<WorkflowExecution>>> {
    info!("Manual firing of trigger {}", request.trigger);
    let executions = state
        .engine
        .process_workflow_trigger(request.trigger, request.payload)
        .await?;
    Ok(Json(executions))
}

async fn list_schedule_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunLogQuery>,
) -> Json<Vec<ScheduleRun>> {
    let limit = clamp_limit(params.limit, DEFAULT_RUN_LIMIT, MAX_RUN_LIMIT) as usize;
    Json(state.schedule_runs.recent(limit).await)
}
