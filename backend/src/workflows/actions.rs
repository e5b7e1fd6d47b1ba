// Workflow Actions - Typed action payloads parsed from stored configs

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use crm_automation_shared::{ActionType, WorkflowActionConfig};

use super::collaborators::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),
    #[error("Invalid parameters for {action}: {message}")]
    InvalidParameters { action: ActionType, message: String },
    #[error("{action} requires '{param}' (not found in params or trigger payload)")]
    MissingParameter {
        action: ActionType,
        param: &'static str,
    },
    #[error("Webhook returned HTTP {status}: {body}")]
    WebhookStatus { status: u16, body: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("Action timed out after {0}s")]
    TimedOut(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendEmailParams {
    pub to: Option<String>,
    pub subject: String,
    pub body: String,
    pub template_id: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendSmsParams {
    pub to: Option<String>,
    pub message: String,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskParams {
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_task_priority")]
    pub priority: String,
    pub client_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    /// Relative alternative to `due_date`
    pub due_in_days: Option<i64>,
}

fn default_task_priority() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignSegmentParams {
    pub segment_id: String,
    pub client_id: Option<String>,
}

/// Shared by add_tag and remove_tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagParams {
    pub tag: String,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateNoteParams {
    pub content: String,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFieldParams {
    pub field: String,
    pub value: Value,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignUserParams {
    pub user_id: String,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookParams {
    pub url: String,
    #[serde(default = "default_webhook_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Map<String, Value>,
    /// Defaults to the trigger payload when absent
    pub body: Option<Value>,
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

const WEBHOOK_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Bound on relative task due dates, in either direction
pub const MAX_DUE_IN_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayParams {
    pub seconds: u64,
}

/// One variant per action kind; dispatch over it is exhaustive.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowAction {
    SendEmail(SendEmailParams),
    SendSms(SendSmsParams),
    CreateTask(CreateTaskParams),
    AssignSegment(AssignSegmentParams),
    AddTag(TagParams),
    RemoveTag(TagParams),
    CreateNote(CreateNoteParams),
    UpdateField(UpdateFieldParams),
    AssignUser(AssignUserParams),
    Webhook(WebhookParams),
    Delay(DelayParams),
}

impl WorkflowAction {
    /// Parse and validate a stored action config.
    pub fn parse(config: &WorkflowActionConfig) -> Result<Self, ActionError> {
        let kind: ActionType = config
            .action_type
            .parse()
            .map_err(|_| ActionError::UnknownActionType(config.action_type.clone()))?;
        let params = Value::Object(config.params.clone());

        let action = match kind {
            ActionType::SendEmail => Self::SendEmail(decode(kind, params)?),
            ActionType::SendSms => Self::SendSms(decode(kind, params)?),
            ActionType::CreateTask => Self::CreateTask(decode(kind, params)?),
            ActionType::AssignSegment => Self::AssignSegment(decode(kind, params)?),
            ActionType::AddTag => Self::AddTag(decode(kind, params)?),
            ActionType::RemoveTag => Self::RemoveTag(decode(kind, params)?),
            ActionType::CreateNote => Self::CreateNote(decode(kind, params)?),
            ActionType::UpdateField => Self::UpdateField(decode(kind, params)?),
            ActionType::AssignUser => Self::AssignUser(decode(kind, params)?),
            ActionType::Webhook => Self::Webhook(decode(kind, params)?),
            ActionType::Delay => Self::Delay(decode(kind, params)?),
        };

        action.validate()?;
        Ok(action)
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Self::SendEmail(_) => ActionType::SendEmail,
            Self::SendSms(_) => ActionType::SendSms,
            Self::CreateTask(_) => ActionType::CreateTask,
            Self::AssignSegment(_) => ActionType::AssignSegment,
            Self::AddTag(_) => ActionType::AddTag,
            Self::RemoveTag(_) => ActionType::RemoveTag,
            Self::CreateNote(_) => ActionType::CreateNote,
            Self::UpdateField(_) => ActionType::UpdateField,
            Self::AssignUser(_) => ActionType::AssignUser,
            Self::Webhook(_) => ActionType::Webhook,
            Self::Delay(_) => ActionType::Delay,
        }
    }

    fn validate(&self) -> Result<(), ActionError> {
        let kind = self.action_type();
        match self {
            Self::SendEmail(p) => {
                require(kind, "subject", &p.subject)?;
                require(kind, "body", &p.body)
            }
            Self::SendSms(p) => require(kind, "message", &p.message),
            Self::CreateTask(p) => {
                require(kind, "title", &p.title)?;
                match p.due_in_days {
                    Some(days) if !(-MAX_DUE_IN_DAYS..=MAX_DUE_IN_DAYS).contains(&days) => Err(ActionError::InvalidParameters {
                        action: kind,
                        message: format!("due_in_days must be within ±{} days", MAX_DUE_IN_DAYS),
                    }),
                    _ => Ok(()),
                }
            }
            Self::AssignSegment(p) => require(kind, "segment_id", &p.segment_id),
            Self::AddTag(p) | Self::RemoveTag(p) => require(kind, "tag", &p.tag),
            Self::CreateNote(p) => require(kind, "content", &p.content),
            Self::UpdateField(p) => require(kind, "field", &p.field),
            Self::AssignUser(p) => require(kind, "user_id", &p.user_id),
            Self::Webhook(p) => {
                require(kind, "url", &p.url)?;
                if !WEBHOOK_METHODS.contains(&p.method.to_uppercase().as_str()) {
                    return Err(ActionError::InvalidParameters {
                        action: kind,
                        message: format!("unsupported HTTP method '{}'", p.method),
                    });
                }
                Ok(())
            }
            Self::Delay(_) => Ok(()),
        }
    }
}

fn decode<T: DeserializeOwned>(kind: ActionType, params: Value) -> Result<T, ActionError> {
    serde_json::from_value(params).map_err(|e| ActionError::InvalidParameters {
        action: kind,
        message: e.to_string(),
    })
}

fn require(kind: ActionType, param: &'static str, value: &str) -> Result<(), ActionError> {
    if value.trim().is_empty() {
        return Err(ActionError::MissingParameter { action: kind, param });
    }
    Ok(())
}
