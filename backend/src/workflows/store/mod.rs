// Workflow Stores - Rule persistence and the execution recorder

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_automation_shared::{
    ExecutionStatus, TriggerType, WorkflowActionExecution, WorkflowExecution, WorkflowRule,
    WorkflowRuleInput,
};
use uuid::Uuid;

pub mod cache;
pub mod memory;
pub mod postgres;

pub use cache::CachedRuleStore;
pub use memory::{MemoryExecutionStore, MemoryRuleStore};
pub use postgres::{PgExecutionStore, PgRuleStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Execution {id} is {from} and cannot move to {to}")]
    InvalidTransition {
        id: Uuid,
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Partial update applied to an execution record
#[derive(Debug, Clone)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub actions_executed: Option<Vec<WorkflowActionExecution>>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
}

impl From<&WorkflowExecution> for ExecutionUpdate {
    fn from(execution: &WorkflowExecution) -> Self {
        Self {
            status: execution.status,
            actions_executed: Some(execution.actions_executed.clone()),
            error: execution.error.clone(),
            completed_at: execution.completed_at,
            duration: execution.duration,
        }
    }
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn create(&self, input: WorkflowRuleInput, created_by: Option<Uuid>) -> StoreResult<WorkflowRule>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<WorkflowRule>>;
    /// Full replace of the editable fields; stamps `updated_at`.
    async fn update(&self, id: Uuid, input: WorkflowRuleInput) -> StoreResult<WorkflowRule>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> StoreResult<WorkflowRule>;
    /// Priority descending, creation order on ties.
    async fn list(&self, enabled_only: bool) -> StoreResult<Vec<WorkflowRule>>;
    /// Enabled rules for `trigger`, same ordering as `list`.
    async fn list_for_trigger(&self, trigger: TriggerType) -> StoreResult<Vec<WorkflowRule>>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create(&self, execution: &WorkflowExecution) -> StoreResult<()>;
    async fn update(&self, id: Uuid, update: ExecutionUpdate) -> StoreResult<()>;
    /// Most recent first.
    async fn list(&self, workflow_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<WorkflowExecution>>;
}

pub(crate) fn rule_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound(format!("Workflow rule {}", id))
}

pub(crate) fn execution_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound(format!("Workflow execution {}", id))
}
