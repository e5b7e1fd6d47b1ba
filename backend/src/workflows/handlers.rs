// Action Handlers - One handler per action kind, delegating to collaborators

use chrono::{DateTime, TimeDelta, Utc};
use crm_automation_shared::{ActionType, CreateTask};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::actions::{
    ActionError, AssignSegmentParams, AssignUserParams, CreateNoteParams, CreateTaskParams,
    SendEmailParams, SendSmsParams, TagParams, UpdateFieldParams, WebhookParams, WorkflowAction,
};
use super::collaborators::{CommunicationService, CrmService, EmailMessage, SmsMessage, TaskService};
use super::variables::{replace_variables, replace_variables_in_value, value_to_string};

type HandlerResult = Result<Value, ActionError>;

/// Static dispatch table from action variant to its effect
#[derive(Clone)]
pub struct ActionHandlers {
    communications: Arc<dyn CommunicationService>,
    tasks: Arc<dyn TaskService>,
    crm: Arc<dyn CrmService>,
    http: reqwest::Client,
}

impl ActionHandlers {
    pub fn new(
        communications: Arc<dyn CommunicationService>,
        tasks: Arc<dyn TaskService>,
        crm: Arc<dyn CrmService>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            communications,
            tasks,
            crm,
            http,
        }
    }

    /// Build the outbound HTTP client used by webhook actions.
    pub fn webhook_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(timeout).build()
    }

    pub async fn handle(&self, action: &WorkflowAction, payload: &Value) -> HandlerResult {
        match action {
            WorkflowAction::SendEmail(p) => self.send_email(p, payload).await,
            WorkflowAction::SendSms(p) => self.send_sms(p, payload).await,
            WorkflowAction::CreateTask(p) => self.create_task(p, payload).await,
            WorkflowAction::AssignSegment(p) => self.assign_segment(p, payload).await,
            WorkflowAction::AddTag(p) => self.add_tag(p, payload).await,
            WorkflowAction::RemoveTag(p) => self.remove_tag(p, payload).await,
            WorkflowAction::CreateNote(p) => self.create_note(p, payload).await,
            WorkflowAction::UpdateField(p) => self.update_field(p, payload).await,
            WorkflowAction::AssignUser(p) => self.assign_user(p, payload).await,
            WorkflowAction::Webhook(p) => self.webhook(p, payload).await,
            WorkflowAction::Delay(p) => {
                tokio::time::sleep(Duration::from_secs(p.seconds)).await;
                Ok(json!({ "waited_seconds": p.seconds }))
            }
        }
    }

    // ===== Communication =====

    async fn send_email(&self, params: &SendEmailParams, payload: &Value) -> HandlerResult {
        let to = subject_or_fallback(&params.to, payload, "email")
            .ok_or(missing(ActionType::SendEmail, "to"))?;

        let message = EmailMessage {
            to: replace_variables(&to, payload),
            subject: replace_variables(&params.subject, payload),
            body: replace_variables(&params.body, payload),
            template_id: params.template_id.clone(),
            client_id: subject_or_fallback(&params.client_id, payload, "client_id"),
        };

        info!("Sending workflow email to {}", message.to);
        let communication = self.communications.send_email(message).await?;
        Ok(serde_json::to_value(communication).unwrap_or(Value::Null))
    }

    async fn send_sms(&self, params: &SendSmsParams, payload: &Value) -> HandlerResult {
        let to = subject_or_fallback(&params.to, payload, "phone")
            .ok_or(missing(ActionType::SendSms, "to"))?;

        let message = SmsMessage {
            to: replace_variables(&to, payload),
            message: replace_variables(&params.message, payload),
            client_id: subject_or_fallback(&params.client_id, payload, "client_id"),
        };

        info!("Sending workflow SMS to {}", message.to);
        let communication = self.communications.send_sms(message).await?;
        Ok(serde_json::to_value(communication).unwrap_or(Value::Null))
    }

    // ===== Tasks =====

    async fn create_task(&self, params: &CreateTaskParams, payload: &Value) -> HandlerResult {
        let due_date = match (params.due_date, params.due_in_days) {
            (Some(date), _) => Some(date),
            (None, Some(days)) => Some(relative_due_date(days)?),
            (None, None) => None,
        };

        let task = CreateTask {
            title: replace_variables(&params.title, payload),
            description: params
                .description
                .as_deref()
                .map(|d| replace_variables(d, payload)),
            priority: params.priority.clone(),
            client_id: subject_or_fallback(&params.client_id, payload, "client_id"),
            due_date,
        };

        let created = self.tasks.create_task(task).await?;
        Ok(serde_json::to_value(created).unwrap_or(Value::Null))
    }

    // ===== CRM mutations =====

    async fn assign_segment(&self, params: &AssignSegmentParams, payload: &Value) -> HandlerResult {
        let client_id = require_client(ActionType::AssignSegment, &params.client_id, payload)?;
        let segment_id = replace_variables(&params.segment_id, payload);
        Ok(self.crm.assign_segment(&client_id, &segment_id).await?)
    }

    async fn add_tag(&self, params: &TagParams, payload: &Value) -> HandlerResult {
        let client_id = require_client(ActionType::AddTag, &params.client_id, payload)?;
        let tag = replace_variables(&params.tag, payload);
        Ok(self.crm.add_tag(&client_id, &tag).await?)
    }

    async fn remove_tag(&self, params: &TagParams, payload: &Value) -> HandlerResult {
        let client_id = require_client(ActionType::RemoveTag, &params.client_id, payload)?;
        let tag = replace_variables(&params.tag, payload);
        Ok(self.crm.remove_tag(&client_id, &tag).await?)
    }

    async fn create_note(&self, params: &CreateNoteParams, payload: &Value) -> HandlerResult {
        let client_id = require_client(ActionType::CreateNote, &params.client_id, payload)?;
        let content = replace_variables(&params.content, payload);
        let note = self.crm.create_note(&client_id, &content).await?;
        Ok(serde_json::to_value(note).unwrap_or(Value::Null))
    }

    async fn update_field(&self, params: &UpdateFieldParams, payload: &Value) -> HandlerResult {
        let client_id = require_client(ActionType::UpdateField, &params.client_id, payload)?;
        let value = replace_variables_in_value(&params.value, payload);
        Ok(self.crm.update_field(&client_id, &params.field, value).await?)
    }

    async fn assign_user(&self, params: &AssignUserParams, payload: &Value) -> HandlerResult {
        let client_id = require_client(ActionType::AssignUser, &params.client_id, payload)?;
        let user_id = replace_variables(&params.user_id, payload);
        Ok(self.crm.assign_user(&client_id, &user_id).await?)
    }

    // ===== Webhook egress =====

    async fn webhook(&self, params: &WebhookParams, payload: &Value) -> HandlerResult {
        let url = replace_variables(&params.url, payload);
        let method = reqwest::Method::from_bytes(params.method.to_uppercase().as_bytes())
            .map_err(|_| ActionError::InvalidParameters {
                action: ActionType::Webhook,
                message: format!("unsupported HTTP method '{}'", params.method),
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in &params.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| invalid_header(key, e))?;
            let rendered = replace_variables(&value_to_string(value), payload);
            let value = HeaderValue::from_str(&rendered).map_err(|e| invalid_header(key, e))?;
            headers.insert(name, value);
        }

        let body = replace_variables_in_value(params.body.as_ref().unwrap_or(payload), payload);
        let body = serde_json::to_vec(&body).map_err(|e| ActionError::InvalidParameters {
            action: ActionType::Webhook,
            message: e.to_string(),
        })?;

        debug!("Calling webhook {} {}", method, url);
        let response = self
            .http
            .request(method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ActionError::WebhookStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let response_body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(json!({
            "url": url,
            "status_code": status.as_u16(),
            "response": response_body
        }))
    }
}

/// Prefer the explicit param; otherwise read the payload's field of the same role.
fn subject_or_fallback(param: &Option<String>, payload: &Value, field: &str) -> Option<String> {
    param
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .or_else(|| match payload.get(field) {
            Some(Value::Null) | None => None,
            Some(v) => Some(value_to_string(v)).filter(|s| !s.trim().is_empty()),
        })
}

fn require_client(kind: ActionType, param: &Option<String>, payload: &Value) -> Result<String, ActionError> {
    subject_or_fallback(param, payload, "client_id")
        .map(|id| replace_variables(&id, payload))
        .ok_or(missing(kind, "client_id"))
}

fn relative_due_date(days: i64) -> Result<DateTime<Utc>, ActionError> {
    TimeDelta::try_days(days)
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .ok_or_else(|| ActionError::InvalidParameters {
            action: ActionType::CreateTask,
            message: format!("due_in_days {} is out of range", days),
        })
}

fn missing(action: ActionType, param: &'static str) -> ActionError {
    ActionError::MissingParameter { action, param }
}

fn invalid_header(key: &str, err: impl std::fmt::Display) -> ActionError {
    ActionError::InvalidParameters {
        action: ActionType::Webhook,
        message: format!("invalid header '{}': {}", key, err),
    }
}
