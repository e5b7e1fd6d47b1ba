// Postgres-backed rule and execution stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_automation_shared::{
    ExecutionStatus, TriggerType, WorkflowExecution, WorkflowRule, WorkflowRuleInput,
};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{
    ExecutionStore, ExecutionUpdate, RuleStore, StoreError, StoreResult, execution_not_found,
    rule_not_found,
};

/// `seq` breaks ties between rules stamped in the same microsecond
const RULE_ORDER: &str = "priority DESC, created_at ASC, seq ASC";
const RULE_COLUMNS: &str = "id, name, description, trigger_type, trigger_config, conditions, \
     actions, enabled, priority, created_by, created_at, updated_at";

const EXECUTION_COLUMNS: &str = "id, workflow_id, workflow_name, trigger_type, trigger_data, \
     conditions_met, actions_executed, status, error, started_at, completed_at, duration_ms";

#[derive(Debug, FromRow)]
struct RuleRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    trigger_type: String,
    trigger_config: Value,
    conditions: Value,
    actions: Value,
    enabled: bool,
    priority: i32,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for WorkflowRule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let trigger: TriggerType = row
            .trigger_type
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("rule {}: {}", row.id, e)))?;
        let trigger_config = match row.trigger_config {
            Value::Object(map) => map,
            Value::Null => Default::default(),
            other => {
                return Err(StoreError::Corrupt(format!(
                    "rule {}: trigger_config is not an object: {}",
                    row.id, other
                )))
            }
        };

        Ok(WorkflowRule {
            id: row.id,
            name: row.name,
            description: row.description,
            trigger,
            trigger_config,
            conditions: serde_json::from_value(row.conditions)?,
            actions: serde_json::from_value(row.actions)?,
            enabled: row.enabled,
            priority: row.priority,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ExecutionRow {
    id: Uuid,
    workflow_id: Uuid,
    workflow_name: String,
    trigger_type: String,
    trigger_data: Value,
    conditions_met: bool,
    actions_executed: Value,
    status: String,
    error: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |e: crm_automation_shared::ParseEnumError| {
            StoreError::Corrupt(format!("execution {}: {}", id, e))
        };
        Ok(WorkflowExecution {
            id: row.id,
            workflow_id: row.workflow_id,
            workflow_name: row.workflow_name,
            trigger: row.trigger_type.parse().map_err(corrupt)?,
            trigger_data: row.trigger_data,
            conditions_met: row.conditions_met,
            actions_executed: serde_json::from_value(row.actions_executed)?,
            status: row.status.parse().map_err(corrupt)?,
            error: row.error,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration: row.duration_ms,
        })
    }
}

fn collect_rules(rows: Vec<RuleRow>) -> StoreResult<Vec<WorkflowRule>> {
    rows.into_iter().map(WorkflowRule::try_from).collect()
}

#[derive(Clone)]
pub struct PgRuleStore {
    pool: PgPool,
}

impl PgRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleStore for PgRuleStore {
    async fn create(&self, input: WorkflowRuleInput, created_by: Option<Uuid>) -> StoreResult<WorkflowRule> {
        let rule = WorkflowRule::from_input(input, created_by);

        sqlx::query(
            r#"
            INSERT INTO workflow_rules (
                id, name, description, trigger_type, trigger_config, conditions,
                actions, enabled, priority, created_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.trigger.as_str())
        .bind(Value::Object(rule.trigger_config.clone()))
        .bind(serde_json::to_value(&rule.conditions)?)
        .bind(serde_json::to_value(&rule.actions)?)
        .bind(rule.enabled)
        .bind(rule.priority)
        .bind(rule.created_by)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(rule)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<WorkflowRule>> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {} FROM workflow_rules WHERE id = $1",
            RULE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowRule::try_from).transpose()
    }

    async fn update(&self, id: Uuid, input: WorkflowRuleInput) -> StoreResult<WorkflowRule> {
        let mut rule = self.get(id).await?.ok_or_else(|| rule_not_found(id))?;
        rule.apply(input);

        let result = sqlx::query(
            r#"
            UPDATE workflow_rules
            SET name = $2, description = $3, trigger_type = $4, trigger_config = $5,
                conditions = $6, actions = $7, enabled = $8, priority = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.trigger.as_str())
        .bind(Value::Object(rule.trigger_config.clone()))
        .bind(serde_json::to_value(&rule.conditions)?)
        .bind(serde_json::to_value(&rule.actions)?)
        .bind(rule.enabled)
        .bind(rule.priority)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(rule_not_found(id));
        }
        Ok(rule)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM workflow_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(rule_not_found(id));
        }
        Ok(())
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> StoreResult<WorkflowRule> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "UPDATE workflow_rules SET enabled = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            RULE_COLUMNS
        ))
        .bind(id)
        .bind(enabled)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| rule_not_found(id))?;

        WorkflowRule::try_from(row)
    }

    async fn list(&self, enabled_only: bool) -> StoreResult<Vec<WorkflowRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {} FROM workflow_rules WHERE ($1 = FALSE OR enabled = TRUE) \
             ORDER BY {}",
            RULE_COLUMNS, RULE_ORDER
        ))
        .bind(enabled_only)
        .fetch_all(&self.pool)
        .await?;

        collect_rules(rows)
    }

    async fn list_for_trigger(&self, trigger: TriggerType) -> StoreResult<Vec<WorkflowRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {} FROM workflow_rules WHERE trigger_type = $1 AND enabled = TRUE \
             ORDER BY {}",
            RULE_COLUMNS, RULE_ORDER
        ))
        .bind(trigger.as_str())
        .fetch_all(&self.pool)
        .await?;

        collect_rules(rows)
    }
}

#[derive(Clone)]
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn create(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                id, workflow_id, workflow_name, trigger_type, trigger_data, conditions_met,
                actions_executed, status, error, started_at, completed_at, duration_ms
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(execution.id)
        .bind(execution.workflow_id)
        .bind(&execution.workflow_name)
        .bind(execution.trigger.as_str())
        .bind(&execution.trigger_data)
        .bind(execution.conditions_met)
        .bind(serde_json::to_value(&execution.actions_executed)?)
        .bind(execution.status.as_str())
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.duration)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, id: Uuid, update: ExecutionUpdate) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM workflow_executions WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let (current,) = current.ok_or_else(|| execution_not_found(id))?;
        let from: ExecutionStatus = current
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("execution {}: {}", id, e)))?;

        if from != update.status && !from.can_transition_to(update.status) {
            return Err(StoreError::InvalidTransition {
                id,
                from,
                to: update.status,
            });
        }

        let actions = update
            .actions_executed
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2,
                actions_executed = COALESCE($3, actions_executed),
                error = COALESCE($4, error),
                completed_at = COALESCE($5, completed_at),
                duration_ms = COALESCE($6, duration_ms)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(actions)
        .bind(&update.error)
        .bind(update.completed_at)
        .bind(update.duration)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, workflow_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {} FROM workflow_executions \
             WHERE ($1::uuid IS NULL OR workflow_id = $1) \
             ORDER BY started_at DESC LIMIT $2",
            EXECUTION_COLUMNS
        ))
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkflowExecution::try_from).collect()
    }
}
