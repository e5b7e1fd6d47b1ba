use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Enable,
    Disable,
    Trigger,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Trigger => "trigger",
        }
    }
}

/// One "who did what, when" record
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub resource_name: Option<String>,
    pub metadata: Option<JsonValue>,
    pub occurred_at: DateTime<Utc>,
}

/// Builder for audit entries
pub struct AuditEntryBuilder {
    actor_id: Option<Uuid>,
    action: AuditAction,
    resource_type: String,
    resource_id: Option<Uuid>,
    resource_name: Option<String>,
    metadata: Option<JsonValue>,
}

impl AuditEntryBuilder {
    pub fn new(action: AuditAction, resource_type: impl Into<String>) -> Self {
        Self {
            actor_id: None,
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            resource_name: None,
            metadata: None,
        }
    }

    pub fn actor(mut self, id: Option<Uuid>) -> Self {
        self.actor_id = id;
        self
    }

    pub fn resource(mut self, id: Uuid, name: Option<String>) -> Self {
        self.resource_id = Some(id);
        self.resource_name = name;
        self
    }

    pub fn metadata<T: Serialize>(mut self, metadata: &T) -> Result<Self, serde_json::Error> {
        self.metadata = Some(serde_json::to_value(metadata)?);
        Ok(self)
    }

    pub fn metadata_json(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn build(self) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            actor_id: self.actor_id,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            resource_name: self.resource_name,
            metadata: self.metadata,
            occurred_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, entry: &AuditEntry) -> AuditResult<()>;
}

pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn write(&self, entry: &AuditEntry) -> AuditResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, actor_id, action, resource_type, resource_id, resource_name, metadata, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(entry.action.as_str())
        .bind(&entry.resource_type)
        .bind(entry.resource_id)
        .bind(&entry.resource_name)
        .bind(&entry.metadata)
        .bind(entry.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Writes entries to the log only; used when no database is attached.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn write(&self, entry: &AuditEntry) -> AuditResult<()> {
        info!(
            actor = ?entry.actor_id,
            resource = ?entry.resource_id,
            "audit: {} {}",
            entry.action.as_str(),
            entry.resource_type
        );
        Ok(())
    }
}

/// Fire-and-forget front for an [`AuditSink`]. A failed write is logged and
/// never reaches the caller.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn record(&self, entry: AuditEntryBuilder) {
        let entry = entry.build();
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.write(&entry).await {
                warn!(
                    "Failed to write audit entry {} ({} {}): {}",
                    entry.id,
                    entry.action.as_str(),
                    entry.resource_type,
                    e
                );
            }
        });
    }
}
