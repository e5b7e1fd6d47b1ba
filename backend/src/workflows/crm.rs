// CRM store - Client mutations and task creation backed by Postgres

use async_trait::async_trait;
use chrono::Utc;
use crm_automation_shared::{ClientNote, CreateTask, Task};
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use super::collaborators::{CrmService, ServiceError, ServiceResult, TaskService};

const TASK_PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];

fn parse_id(kind: &str, raw: &str) -> ServiceResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ServiceError::Validation(format!("invalid {} id '{}'", kind, raw)))
}

fn client_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Client {}", id))
}

#[derive(Clone)]
pub struct PgCrmService {
    pool: PgPool,
}

impl PgCrmService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CrmService for PgCrmService {
    async fn add_tag(&self, client_id: &str, tag: &str) -> ServiceResult<Value> {
        let id = parse_id("client", client_id)?;
        let tags: Option<(Vec<String>,)> = sqlx::query_as(
            r#"
            UPDATE clients
            SET tags = CASE WHEN $2 = ANY(tags) THEN tags ELSE array_append(tags, $2) END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING tags
            "#,
        )
        .bind(id)
        .bind(tag)
        .fetch_optional(&self.pool)
        .await?;

        let (tags,) = tags.ok_or_else(|| client_not_found(id))?;
        Ok(json!({ "client_id": id, "tag": tag, "tags": tags }))
    }

    async fn remove_tag(&self, client_id: &str, tag: &str) -> ServiceResult<Value> {
        let id = parse_id("client", client_id)?;
        let tags: Option<(Vec<String>,)> = sqlx::query_as(
            "UPDATE clients SET tags = array_remove(tags, $2), updated_at = NOW() WHERE id = $1 RETURNING tags",
        )
        .bind(id)
        .bind(tag)
        .fetch_optional(&self.pool)
        .await?;

        let (tags,) = tags.ok_or_else(|| client_not_found(id))?;
        Ok(json!({ "client_id": id, "tag": tag, "tags": tags }))
    }

    async fn assign_segment(&self, client_id: &str, segment_id: &str) -> ServiceResult<Value> {
        let id = parse_id("client", client_id)?;
        let segments: Option<(Vec<String>,)> = sqlx::query_as(
            r#"
            UPDATE clients
            SET segment_ids = CASE WHEN $2 = ANY(segment_ids) THEN segment_ids
                                   ELSE array_append(segment_ids, $2) END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING segment_ids
            "#,
        )
        .bind(id)
        .bind(segment_id)
        .fetch_optional(&self.pool)
        .await?;

        let (segments,) = segments.ok_or_else(|| client_not_found(id))?;
        Ok(json!({ "client_id": id, "segment_id": segment_id, "segment_ids": segments }))
    }

    /// Writes into the client's `custom_fields` document.
    async fn update_field(&self, client_id: &str, field: &str, value: Value) -> ServiceResult<Value> {
        let id = parse_id("client", client_id)?;
        if field.trim().is_empty() {
            return Err(ServiceError::Validation("field name must not be empty".to_string()));
        }

        let updated: Option<(Value,)> = sqlx::query_as(
            r#"
            UPDATE clients
            SET custom_fields = jsonb_set(COALESCE(custom_fields, '{}'::jsonb), ARRAY[$2::text], $3, true),
                updated_at = NOW()
            WHERE id = $1
            RETURNING custom_fields
            "#,
        )
        .bind(id)
        .bind(field)
        .bind(&value)
        .fetch_optional(&self.pool)
        .await?;

        let (custom_fields,) = updated.ok_or_else(|| client_not_found(id))?;
        Ok(json!({ "client_id": id, "field": field, "value": value, "custom_fields": custom_fields }))
    }

    async fn assign_user(&self, client_id: &str, user_id: &str) -> ServiceResult<Value> {
        let id = parse_id("client", client_id)?;
        let user = parse_id("user", user_id)?;

        let result = sqlx::query(
            "UPDATE clients SET assigned_user_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(user)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(client_not_found(id));
        }
        Ok(json!({ "client_id": id, "assigned_user_id": user }))
    }

    async fn create_note(&self, client_id: &str, content: &str) -> ServiceResult<ClientNote> {
        let id = parse_id("client", client_id)?;

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(client_not_found(id));
        }

        let note = sqlx::query_as::<_, ClientNote>(
            r#"
            INSERT INTO client_notes (id, client_id, content, created_by_system, created_at)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING id, client_id, content, created_by_system, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(content)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(note)
    }
}

#[derive(Clone)]
pub struct PgTaskService {
    pool: PgPool,
}

impl PgTaskService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskService for PgTaskService {
    async fn create_task(&self, task: CreateTask) -> ServiceResult<Task> {
        if !TASK_PRIORITIES.contains(&task.priority.as_str()) {
            return Err(ServiceError::Validation(format!(
                "task priority must be one of {}",
                TASK_PRIORITIES.join(", ")
            )));
        }
        let client_id = task
            .client_id
            .as_deref()
            .map(|raw| parse_id("client", raw))
            .transpose()?;

        let created = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, title, description, priority, client_id, due_date, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'open', $7)
            RETURNING id, title, description, priority, client_id, due_date, status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.priority)
        .bind(client_id)
        .bind(task.due_date)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }
}
