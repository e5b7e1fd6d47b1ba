use crate::config::SmtpConfig;
use crate::workflows::{EmailMessage, ServiceError, ServiceResult};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> ServiceResult<Self> {
        let creds = Credentials::new(smtp_config.username.clone(), smtp_config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(EmailService {
            transport,
            from: sender_mailbox(smtp_config)?,
        })
    }

    pub async fn send(&self, email: &EmailMessage) -> ServiceResult<()> {
        let message = build_message(&self.from, email)?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent to {}", email.to);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", email.to, e);
                Err(ServiceError::Delivery(e.to_string()))
            }
        }
    }
}

fn sender_mailbox(config: &SmtpConfig) -> ServiceResult<Mailbox> {
    format!("{} <{}>", config.from_name, config.from_email)
        .parse()
        .map_err(|e| ServiceError::Validation(format!("invalid sender address: {}", e)))
}

/// Bodies containing markup go out as HTML, everything else as plain text.
fn build_message(from: &Mailbox, email: &EmailMessage) -> ServiceResult<Message> {
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| ServiceError::Validation(format!("invalid recipient '{}': {}", email.to, e)))?;

    let content_type = if email.body.contains('<') && email.body.contains('>') {
        ContentType::TEXT_HTML
    } else {
        ContentType::TEXT_PLAIN
    };

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject.as_str())
        .header(content_type)
        .body(email.body.clone())
        .map_err(|e| ServiceError::Delivery(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str, body: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Thanks for visiting".to_string(),
            body: body.to_string(),
            template_id: None,
            client_id: None,
        }
    }

    fn from() -> Mailbox {
        "CRM Automation <noreply@example.com>".parse().unwrap()
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let err = build_message(&from(), &message("not an address", "hi")).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_build_message_picks_content_type() {
        let html = build_message(&from(), &message("jane@example.com", "<p>Hi Jane</p>")).unwrap();
        let raw = String::from_utf8(html.formatted()).unwrap();
        assert!(raw.contains("text/html"));

        let plain = build_message(&from(), &message("jane@example.com", "Hi Jane")).unwrap();
        let raw = String::from_utf8(plain.formatted()).unwrap();
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("Subject: Thanks for visiting"));
    }
}
