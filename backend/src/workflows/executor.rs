// Workflow Executor - Runs a rule's actions in order with per-action isolation

use chrono::Utc;
use crm_automation_shared::{ExecutionStatus, WorkflowActionExecution, WorkflowRule};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::actions::{ActionError, WorkflowAction};
use super::handlers::ActionHandlers;

pub struct WorkflowExecutor {
    handlers: ActionHandlers,
    action_timeout: Option<Duration>,
}

impl WorkflowExecutor {
    pub fn new(handlers: ActionHandlers) -> Self {
        Self {
            handlers,
            action_timeout: None,
        }
    }

    /// Bound each collaborator-backed handler call. Neither `delay` actions nor
    /// the per-action `delay` setting count against it.
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    /// Execute every action of `rule` in order. A failed action is recorded
    /// and the next one still runs.
    pub async fn execute_workflow_actions(
        &self,
        rule: &WorkflowRule,
        payload: &Value,
    ) -> Vec<WorkflowActionExecution> {
        let mut outcomes = Vec::with_capacity(rule.actions.len());

        for (index, config) in rule.actions.iter().enumerate() {
            let mut record = WorkflowActionExecution::pending(config);
            record.status = ExecutionStatus::Running;
            record.executed_at = Utc::now();
            let start = Instant::now();

            if let Some(delay) = config.delay.filter(|d| *d > 0) {
                info!("Delaying action {} of '{}' by {}s", index, rule.name, delay);
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let outcome = match WorkflowAction::parse(config) {
                Ok(action) => self.run(&action, payload).await,
                Err(e) => Err(e),
            };
            let elapsed = start.elapsed().as_millis() as i64;
            record.duration = Some(elapsed);

            match outcome {
                Ok(result) => {
                    info!(
                        "Action {} ({}) of '{}' completed in {}ms",
                        index, config.action_type, rule.name, elapsed
                    );
                    record.status = ExecutionStatus::Completed;
                    record.result = Some(result);
                }
                Err(e) => {
                    warn!(
                        "Action {} ({}) of '{}' failed: {}",
                        index, config.action_type, rule.name, e
                    );
                    record.status = ExecutionStatus::Failed;
                    record.error = Some(e.to_string());
                }
            }

            outcomes.push(record);
        }

        outcomes
    }

    async fn run(&self, action: &WorkflowAction, payload: &Value) -> Result<Value, ActionError> {
        // Delay actions are never bounded
        let limit = match action {
            WorkflowAction::Delay(_) => None,
            _ => self.action_timeout,
        };

        match limit {
            Some(limit) => tokio::time::timeout(limit, self.handlers.handle(action, payload))
                .await
                .map_err(|_| ActionError::TimedOut(limit.as_secs()))?,
            None => self.handlers.handle(action, payload).await,
        }
    }
}
