// Workflow Engine - Matches trigger firings against rules and records executions

use crm_automation_shared::{TriggerType, WorkflowExecution, WorkflowRule};
use futures::future::join_all;
use serde_json::Value;
use std::any::Any;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, error, info};

use super::conditions::evaluate_conditions;
use super::executor::WorkflowExecutor;
use super::store::{ExecutionStore, ExecutionUpdate, RuleStore, StoreError};
use super::triggers::TriggerEvent;
use crate::services::ErrorReporter;

/// How the rules matched by one trigger firing are run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// One rule at a time in priority order; a delayed action holds back later rules.
    #[default]
    Sequential,
    /// One task per rule; actions inside a rule stay ordered.
    Concurrent,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            other => Err(format!("unknown dispatch mode: {}", other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to load rules for trigger {trigger}")]
    RuleLookup {
        trigger: TriggerType,
        #[source]
        source: StoreError,
    },
    #[error("Failed to record execution of '{rule}'")]
    Recording {
        rule: String,
        #[source]
        source: StoreError,
    },
    #[error("Rule task for '{rule}' did not finish: {message}")]
    Dispatch { rule: String, message: String },
}

#[derive(Clone)]
pub struct WorkflowEngine {
    rules: Arc<dyn RuleStore>,
    executions: Arc<dyn ExecutionStore>,
    executor: Arc<WorkflowExecutor>,
    reporter: Arc<dyn ErrorReporter>,
    dispatch_mode: DispatchMode,
}

impl WorkflowEngine {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        executions: Arc<dyn ExecutionStore>,
        executor: WorkflowExecutor,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            rules,
            executions,
            executor: Arc::new(executor),
            reporter,
            dispatch_mode: DispatchMode::default(),
        }
    }

    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    pub fn rules(&self) -> &Arc<dyn RuleStore> {
        &self.rules
    }

    pub fn executions(&self) -> &Arc<dyn ExecutionStore> {
        &self.executions
    }

    pub async fn process_event(&self, event: &TriggerEvent) -> Result<Vec<WorkflowExecution>, EngineError> {
        debug!(
            "Processing event {} ({}) from {:?}",
            event.event_id, event.trigger_type, event.source
        );
        self.process_workflow_trigger(event.trigger_type, event.payload.clone())
            .await
    }

    /// Run every enabled rule for `trigger` against `payload`, returning one
    /// execution per rule in priority order.
    pub async fn process_workflow_trigger(
        &self,
        trigger: TriggerType,
        payload: Value,
    ) -> Result<Vec<WorkflowExecution>, EngineError> {
        let rules = self
            .rules
            .list_for_trigger(trigger)
            .await
            .map_err(|source| self.report(EngineError::RuleLookup { trigger, source }))?;

        info!("Trigger {} matched {} enabled rules", trigger, rules.len());

        match self.dispatch_mode {
            DispatchMode::Sequential => {
                let mut executions = Vec::with_capacity(rules.len());
                for rule in rules {
                    executions.push(self.process_rule(rule, &payload).await?);
                }
                Ok(executions)
            }
            DispatchMode::Concurrent => self.dispatch_concurrently(rules, payload).await,
        }
    }

    async fn dispatch_concurrently(
        &self,
        rules: Vec<WorkflowRule>,
        payload: Value,
    ) -> Result<Vec<WorkflowExecution>, EngineError> {
        let payload = Arc::new(payload);
        let (names, handles): (Vec<String>, Vec<_>) = rules
            .into_iter()
            .map(|rule| {
                let engine = self.clone();
                let payload = Arc::clone(&payload);
                let name = rule.name.clone();
                let handle = tokio::spawn(async move { engine.process_rule(rule, &payload).await });
                (name, handle)
            })
            .unzip();

        // Every task is awaited before the first error surfaces
        let outcomes: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, name)| match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(self.report(EngineError::Dispatch {
                    rule: name,
                    message: join_error_message(e),
                })),
            })
            .collect();
        outcomes.into_iter().collect()
    }

    async fn process_rule(&self, rule: WorkflowRule, payload: &Value) -> Result<WorkflowExecution, EngineError> {
        if !evaluate_conditions(&rule.conditions, payload) {
            info!("Skipping rule '{}': conditions not met", rule.name);
            let execution = WorkflowExecution::skipped(&rule, payload.clone());
            self.executions
                .create(&execution)
                .await
                .map_err(|source| self.recording_failed(&rule, source))?;
            return Ok(execution);
        }

        let mut execution = WorkflowExecution::running(&rule, payload.clone());
        self.executions
            .create(&execution)
            .await
            .map_err(|source| self.recording_failed(&rule, source))?;

        info!(
            "Executing rule '{}' (priority {}, {} actions)",
            rule.name,
            rule.priority,
            rule.actions.len()
        );

        let executor = Arc::clone(&self.executor);
        let task_rule = rule.clone();
        let task_payload = payload.clone();
        let outcome = tokio::spawn(async move {
            executor
                .execute_workflow_actions(&task_rule, &task_payload)
                .await
        })
        .await;

        match outcome {
            Ok(actions) => execution.complete(actions),
            Err(e) => {
                let message = join_error_message(e);
                error!("Rule '{}' aborted: {}", rule.name, message);
                execution.fail(message);
            }
        }

        self.executions
            .update(execution.id, ExecutionUpdate::from(&execution))
            .await
            .map_err(|source| self.recording_failed(&rule, source))?;

        info!(
            "Rule '{}' finished as {} in {}ms",
            rule.name,
            execution.status,
            execution.duration.unwrap_or_default()
        );
        Ok(execution)
    }

    fn recording_failed(&self, rule: &WorkflowRule, source: StoreError) -> EngineError {
        self.report(EngineError::Recording {
            rule: rule.name.clone(),
            source,
        })
    }

    fn report(&self, err: EngineError) -> EngineError {
        self.reporter.report("workflow trigger processing", &err);
        err
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        err.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "action sequence panicked".to_string()
    }
}
