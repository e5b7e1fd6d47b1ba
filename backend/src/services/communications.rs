use async_trait::async_trait;
use chrono::Utc;
use crm_automation_shared::Communication;
use sqlx::PgPool;
use uuid::Uuid;

use super::email::EmailService;
use super::sms::SmsGateway;
use crate::workflows::{
    CommunicationService, EmailMessage, ServiceError, ServiceResult, SmsMessage,
};

/// Sends through SMTP or the SMS gateway and records each send in `communications`.
pub struct DeliveryService {
    pool: PgPool,
    email: Option<EmailService>,
    sms: Option<SmsGateway>,
}

impl DeliveryService {
    pub fn new(pool: PgPool, email: Option<EmailService>, sms: Option<SmsGateway>) -> Self {
        Self { pool, email, sms }
    }

    async fn record(
        &self,
        channel: &str,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
        template_id: Option<&str>,
        client_id: Option<&str>,
    ) -> ServiceResult<Communication> {
        // Free-form client references are kept only when they are record ids
        let client_id = client_id.and_then(|raw| Uuid::parse_str(raw).ok());

        let communication = sqlx::query_as::<_, Communication>(
            r#"
            INSERT INTO communications (id, channel, recipient, subject, body, template_id, client_id, status, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'sent', $8)
            RETURNING id, channel, recipient, subject, body, template_id, client_id, status, sent_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(channel)
        .bind(recipient)
        .bind(subject)
        .bind(body)
        .bind(template_id)
        .bind(client_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(communication)
    }
}

#[async_trait]
impl CommunicationService for DeliveryService {
    async fn send_email(&self, message: EmailMessage) -> ServiceResult<Communication> {
        let email = self
            .email
            .as_ref()
            .ok_or_else(|| ServiceError::Delivery("SMTP is not configured".to_string()))?;
        email.send(&message).await?;

        self.record(
            "email",
            &message.to,
            Some(&message.subject),
            &message.body,
            message.template_id.as_deref(),
            message.client_id.as_deref(),
        )
        .await
    }

    async fn send_sms(&self, message: SmsMessage) -> ServiceResult<Communication> {
        let sms = self
            .sms
            .as_ref()
            .ok_or_else(|| ServiceError::Delivery("SMS gateway is not configured".to_string()))?;
        sms.send(&message).await?;

        self.record(
            "sms",
            &message.to,
            None,
            &message.message,
            None,
            message.client_id.as_deref(),
        )
        .await
    }
}
