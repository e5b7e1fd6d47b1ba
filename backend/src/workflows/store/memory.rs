// In-process stores, used by tests and by embedders without Postgres

use async_trait::async_trait;
use crm_automation_shared::{TriggerType, WorkflowExecution, WorkflowRule, WorkflowRuleInput};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    ExecutionStore, ExecutionUpdate, RuleStore, StoreError, StoreResult, execution_not_found,
    rule_not_found,
};

/// Rules kept in creation order so a stable sort breaks priority ties.
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<WorkflowRule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_priority(mut rules: Vec<WorkflowRule>) -> Vec<WorkflowRule> {
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    rules
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn create(&self, input: WorkflowRuleInput, created_by: Option<Uuid>) -> StoreResult<WorkflowRule> {
        let rule = WorkflowRule::from_input(input, created_by);
        self.rules.write().await.push(rule.clone());
        Ok(rule)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<WorkflowRule>> {
        Ok(self.rules.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn update(&self, id: Uuid, input: WorkflowRuleInput) -> StoreResult<WorkflowRule> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| rule_not_found(id))?;
        rule.apply(input);
        Ok(rule.clone())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() == before {
            return Err(rule_not_found(id));
        }
        Ok(())
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> StoreResult<WorkflowRule> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| rule_not_found(id))?;
        rule.enabled = enabled;
        rule.updated_at = chrono::Utc::now();
        Ok(rule.clone())
    }

    async fn list(&self, enabled_only: bool) -> StoreResult<Vec<WorkflowRule>> {
        let rules = self.rules.read().await;
        Ok(by_priority(
            rules
                .iter()
                .filter(|r| !enabled_only || r.enabled)
                .cloned()
                .collect(),
        ))
    }

    async fn list_for_trigger(&self, trigger: TriggerType) -> StoreResult<Vec<WorkflowRule>> {
        let rules = self.rules.read().await;
        Ok(by_priority(
            rules
                .iter()
                .filter(|r| r.enabled && r.trigger == trigger)
                .cloned()
                .collect(),
        ))
    }
}

#[derive(Default)]
pub struct MemoryExecutionStore {
    executions: RwLock<Vec<WorkflowExecution>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded execution in insertion order.
    pub async fn all(&self) -> Vec<WorkflowExecution> {
        self.executions.read().await.clone()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn create(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        self.executions.write().await.push(execution.clone());
        Ok(())
    }

    async fn update(&self, id: Uuid, update: ExecutionUpdate) -> StoreResult<()> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| execution_not_found(id))?;

        if execution.status != update.status && !execution.status.can_transition_to(update.status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: execution.status,
                to: update.status,
            });
        }

        execution.status = update.status;
        if let Some(actions) = update.actions_executed {
            execution.actions_executed = actions;
        }
        if update.error.is_some() {
            execution.error = update.error;
        }
        if update.completed_at.is_some() {
            execution.completed_at = update.completed_at;
        }
        if update.duration.is_some() {
            execution.duration = update.duration;
        }
        Ok(())
    }

    async fn list(&self, workflow_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<WorkflowExecution>> {
        let executions = self.executions.read().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(executions
            .iter()
            .rev()
            .filter(|e| workflow_id.map_or(true, |id| e.workflow_id == id))
            .take(limit)
            .cloned()
            .collect())
    }
}
