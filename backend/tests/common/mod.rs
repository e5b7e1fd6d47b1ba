// Common test utilities that are shared across integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use crm_automation_backend::jobs::ScheduleRunLog;
use crm_automation_backend::services::{AuditLogger, TracingAuditSink, TracingErrorReporter};
use crm_automation_backend::workflows::{
    ActionHandlers, CommunicationService, CrmService, EmailMessage, MemoryExecutionStore,
    MemoryRuleStore, ServiceError, ServiceResult, SmsMessage, TaskService, WorkflowEngine,
    WorkflowExecutor,
};
use crm_automation_backend::AppState;
use crm_automation_shared::{ClientNote, Communication, CreateTask, Task};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

/// Records every collaborator call so tests can assert on effects.
#[derive(Default)]
pub struct RecordingCollaborators {
    pub emails: Mutex<Vec<EmailMessage>>,
    pub sms: Mutex<Vec<SmsMessage>>,
    pub tasks: Mutex<Vec<CreateTask>>,
    pub crm_calls: Mutex<Vec<(String, String, Value)>>,
}

impl RecordingCollaborators {
    fn crm(&self, op: &str, client_id: &str, detail: Value) -> ServiceResult<Value> {
        if client_id == "missing" {
            return Err(ServiceError::NotFound(format!("Client {}", client_id)));
        }
        self.crm_calls
            .lock()
            .unwrap()
            .push((op.to_string(), client_id.to_string(), detail.clone()));
        Ok(json!({ "client_id": client_id, "op": op, "detail": detail }))
    }
}

#[async_trait]
impl CommunicationService for RecordingCollaborators {
    async fn send_email(&self, message: EmailMessage) -> ServiceResult<Communication> {
        let communication = Communication {
            id: Uuid::new_v4(),
            channel: "email".to_string(),
            recipient: message.to.clone(),
            subject: Some(message.subject.clone()),
            body: message.body.clone(),
            template_id: message.template_id.clone(),
            client_id: message.client_id.as_deref().and_then(|c| Uuid::parse_str(c).ok()),
            status: "sent".to_string(),
            sent_at: Utc::now(),
        };
        self.emails.lock().unwrap().push(message);
        Ok(communication)
    }

    async fn send_sms(&self, message: SmsMessage) -> ServiceResult<Communication> {
        let communication = Communication {
            id: Uuid::new_v4(),
            channel: "sms".to_string(),
            recipient: message.to.clone(),
            subject: None,
            body: message.message.clone(),
            template_id: None,
            client_id: None,
            status: "sent".to_string(),
            sent_at: Utc::now(),
        };
        self.sms.lock().unwrap().push(message);
        Ok(communication)
    }
}

#[async_trait]
impl TaskService for RecordingCollaborators {
    async fn create_task(&self, task: CreateTask) -> ServiceResult<Task> {
        let created = Task {
            id: Uuid::new_v4(),
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority.clone(),
            client_id: task.client_id.as_deref().and_then(|c| Uuid::parse_str(c).ok()),
            due_date: task.due_date,
            status: "open".to_string(),
            created_at: Utc::now(),
        };
        self.tasks.lock().unwrap().push(task);
        Ok(created)
    }
}

#[async_trait]
impl CrmService for RecordingCollaborators {
    async fn add_tag(&self, client_id: &str, tag: &str) -> ServiceResult<Value> {
        self.crm("add_tag", client_id, json!(tag))
    }

    async fn remove_tag(&self, client_id: &str, tag: &str) -> ServiceResult<Value> {
        self.crm("remove_tag", client_id, json!(tag))
    }

    async fn assign_segment(&self, client_id: &str, segment_id: &str) -> ServiceResult<Value> {
        self.crm("assign_segment", client_id, json!(segment_id))
    }

    async fn update_field(&self, client_id: &str, field: &str, value: Value) -> ServiceResult<Value> {
        self.crm("update_field", client_id, json!({ field: value }))
    }

    async fn assign_user(&self, client_id: &str, user_id: &str) -> ServiceResult<Value> {
        self.crm("assign_user", client_id, json!(user_id))
    }

    async fn create_note(&self, client_id: &str, content: &str) -> ServiceResult<ClientNote> {
        self.crm("create_note", client_id, json!(content))?;
        Ok(ClientNote {
            id: Uuid::new_v4(),
            client_id: Uuid::parse_str(client_id).unwrap_or_else(|_| Uuid::nil()),
            content: content.to_string(),
            created_by_system: true,
            created_at: Utc::now(),
        })
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub collaborators: Arc<RecordingCollaborators>,
    pub executions: Arc<MemoryExecutionStore>,
}

/// Engine and router state on in-process stores with recording collaborators.
pub fn test_app() -> TestApp {
    init_test_logging();

    let collaborators = Arc::new(RecordingCollaborators::default());
    let executions = Arc::new(MemoryExecutionStore::new());
    let handlers = ActionHandlers::new(
        collaborators.clone(),
        collaborators.clone(),
        collaborators.clone(),
        reqwest::Client::new(),
    );
    let engine = WorkflowEngine::new(
        Arc::new(MemoryRuleStore::new()),
        executions.clone(),
        WorkflowExecutor::new(handlers),
        Arc::new(TracingErrorReporter),
    );

    TestApp {
        state: Arc::new(AppState {
            engine,
            audit: AuditLogger::new(Arc::new(TracingAuditSink)),
            schedule_runs: ScheduleRunLog::new(),
            db_pool: None,
        }),
        collaborators,
        executions,
    }
}
