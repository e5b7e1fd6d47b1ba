// Workflow Scheduler - Fires schedule_based triggers from cron expressions

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ScheduleSpec;
use crate::workflows::{TriggerEvent, WorkflowEngine};

const MAX_RUN_LOGS: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Invalid schedule '{name}': {message}")]
    ConfigError { name: String, message: String },
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// One firing of a named schedule
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleRun {
    pub id: Uuid,
    pub schedule: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: JobStatus,
    pub rules_evaluated: usize,
    pub error: Option<String>,
}

/// Bounded, newest-last log of schedule firings, shared with the HTTP layer
#[derive(Clone, Default)]
pub struct ScheduleRunLog {
    runs: Arc<RwLock<Vec<ScheduleRun>>>,
}

impl ScheduleRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent first, at most `limit` entries.
    pub async fn recent(&self, limit: usize) -> Vec<ScheduleRun> {
        self.runs.read().await.iter().rev().take(limit).cloned().collect()
    }

    async fn push(&self, run: ScheduleRun) {
        let mut runs = self.runs.write().await;
        runs.push(run);
        if runs.len() > MAX_RUN_LOGS {
            let excess = runs.len() - MAX_RUN_LOGS;
            runs.drain(..excess);
        }
    }
}

pub struct WorkflowScheduler {
    scheduler: JobScheduler,
    engine: WorkflowEngine,
    schedules: Vec<ScheduleSpec>,
    runs: ScheduleRunLog,
}

impl WorkflowScheduler {
    pub async fn new(engine: WorkflowEngine, schedules: Vec<ScheduleSpec>) -> JobResult<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            engine,
            schedules,
            runs: ScheduleRunLog::new(),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        if self.schedules.is_empty() {
            info!("No workflow schedules configured");
            return Ok(());
        }

        for spec in &self.schedules {
            self.schedule(spec).await?;
        }

        self.scheduler.start().await?;
        info!("Workflow scheduler started with {} schedules", self.schedules.len());
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down workflow scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    pub fn run_log(&self) -> ScheduleRunLog {
        self.runs.clone()
    }

    async fn schedule(&self, spec: &ScheduleSpec) -> JobResult<()> {
        let engine = self.engine.clone();
        let runs = self.runs.clone();
        let name = spec.name.clone();

        let job = Job::new_async(spec.cron.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            let runs = runs.clone();
            let name = name.clone();

            Box::pin(async move {
                fire_schedule(&engine, &name, &runs).await;
            })
        })
        .map_err(|e| JobError::ConfigError {
            name: spec.name.clone(),
            message: e.to_string(),
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled '{}' with cron '{}'", spec.name, spec.cron);
        Ok(())
    }
}

/// Fire `schedule_based` for one named schedule and keep a bounded run log.
pub async fn fire_schedule(engine: &WorkflowEngine, name: &str, runs: &ScheduleRunLog) {
    let started_at = Utc::now();
    let event = TriggerEvent::scheduled(name);
    info!("Schedule '{}' fired", name);

    let (status, rules_evaluated, error) = match engine.process_event(&event).await {
        Ok(executions) => (JobStatus::Completed, executions.len(), None),
        Err(e) => {
            error!("Schedule '{}' failed: {}", name, e);
            (JobStatus::Failed, 0, Some(e.to_string()))
        }
    };

    runs.push(ScheduleRun {
        id: event.event_id,
        schedule: name.to_string(),
        started_at,
        completed_at: Utc::now(),
        status,
        rules_evaluated,
        error,
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::TracingErrorReporter;
    use crate::workflows::collaborators::{MockCommunicationService, MockCrmService, MockTaskService};
    use crate::workflows::{
        ActionHandlers, MemoryExecutionStore, MemoryRuleStore, RuleStore, WorkflowExecutor,
    };
    use crm_automation_shared::{
        ActionType, ConditionOperator, ExecutionStatus, TriggerType, WorkflowActionConfig,
        WorkflowCondition, WorkflowRuleInput,
    };
    use serde_json::json;

    async fn engine_with_digest_rule() -> (WorkflowEngine, Arc<MemoryExecutionStore>) {
        let rules = Arc::new(MemoryRuleStore::new());
        rules
            .create(
                WorkflowRuleInput {
                    name: "Morning digest".to_string(),
                    description: None,
                    trigger: TriggerType::ScheduleBased,
                    trigger_config: Default::default(),
                    conditions: vec![WorkflowCondition::new(
                        "schedule",
                        ConditionOperator::Equals,
                        json!("daily-digest"),
                    )],
                    actions: vec![WorkflowActionConfig::new(ActionType::Delay, json!({"seconds": 0}))],
                    enabled: true,
                    priority: 0,
                },
                None,
            )
            .await
            .unwrap();

        let executions = Arc::new(MemoryExecutionStore::new());
        let handlers = ActionHandlers::new(
            Arc::new(MockCommunicationService::new()),
            Arc::new(MockTaskService::new()),
            Arc::new(MockCrmService::new()),
            reqwest::Client::new(),
        );
        let engine = WorkflowEngine::new(
            rules,
            executions.clone(),
            WorkflowExecutor::new(handlers),
            Arc::new(TracingErrorReporter),
        );
        (engine, executions)
    }

    #[tokio::test]
    async fn test_fire_schedule_runs_matching_rules() {
        let (engine, executions) = engine_with_digest_rule().await;
        let runs = ScheduleRunLog::new();

        fire_schedule(&engine, "daily-digest", &runs).await;
        fire_schedule(&engine, "weekly-report", &runs).await;

        let recorded = executions.all().await;
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].status, ExecutionStatus::Completed);
        assert_eq!(recorded[0].trigger_data["schedule"], "daily-digest");
        assert_eq!(recorded[1].status, ExecutionStatus::Skipped);

        let runs = runs.recent(10).await;
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].schedule, "weekly-report");
        assert!(runs.iter().all(|r| r.status == JobStatus::Completed));
    }

    #[tokio::test]
    async fn test_invalid_cron_is_config_error() {
        let (engine, _) = engine_with_digest_rule().await;
        let scheduler = WorkflowScheduler::new(
            engine,
            vec![ScheduleSpec {
                name: "broken".to_string(),
                cron: "every tuesday".to_string(),
            }],
        )
        .await
        .unwrap();

        let err = scheduler.start().await.unwrap_err();
        assert!(matches!(err, JobError::ConfigError { ref name, .. } if name == "broken"));
    }

    #[tokio::test]
    async fn test_run_log_is_bounded() {
        let (engine, _) = engine_with_digest_rule().await;
        let runs = ScheduleRunLog::new();

        for _ in 0..MAX_RUN_LOGS + 5 {
            fire_schedule(&engine, "hourly-sync", &runs).await;
        }

        assert_eq!(runs.recent(usize::MAX).await.len(), MAX_RUN_LOGS);
        assert_eq!(runs.recent(3).await.len(), 3);
    }
}
