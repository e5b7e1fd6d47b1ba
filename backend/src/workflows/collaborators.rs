// Collaborators - External services that action handlers delegate to

use async_trait::async_trait;
use crm_automation_shared::{ClientNote, Communication, CreateTask, Task};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub template_id: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsMessage {
    pub to: String,
    pub message: String,
    pub client_id: Option<String>,
}

/// Email and SMS delivery; each send returns the persisted communication record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommunicationService: Send + Sync {
    async fn send_email(&self, message: EmailMessage) -> ServiceResult<Communication>;
    async fn send_sms(&self, message: SmsMessage) -> ServiceResult<Communication>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, task: CreateTask) -> ServiceResult<Task>;
}

/// Narrow mutations against client records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrmService: Send + Sync {
    async fn add_tag(&self, client_id: &str, tag: &str) -> ServiceResult<Value>;
    async fn remove_tag(&self, client_id: &str, tag: &str) -> ServiceResult<Value>;
    async fn assign_segment(&self, client_id: &str, segment_id: &str) -> ServiceResult<Value>;
    async fn update_field(&self, client_id: &str, field: &str, value: Value) -> ServiceResult<Value>;
    async fn assign_user(&self, client_id: &str, user_id: &str) -> ServiceResult<Value>;
    async fn create_note(&self, client_id: &str, content: &str) -> ServiceResult<ClientNote>;
}
