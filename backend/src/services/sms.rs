use crate::config::SmsConfig;
use crate::workflows::{ServiceError, ServiceResult, SmsMessage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Client for an HTTP SMS gateway.
#[derive(Debug, Clone)]
pub struct SmsGateway {
    client: reqwest::Client,
    config: SmsConfig,
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    from: &'a str,
    to: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct GatewayReceipt {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl SmsGateway {
    pub fn new(config: SmsConfig) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }

    pub async fn send(&self, sms: &SmsMessage) -> ServiceResult<GatewayReceipt> {
        if sms.to.trim().is_empty() {
            return Err(ServiceError::Validation("SMS recipient is empty".to_string()));
        }

        let response = self
            .client
            .post(&self.config.gateway_url)
            .bearer_auth(&self.config.api_key)
            .json(&GatewayRequest {
                from: &self.config.sender,
                to: &sms.to,
                body: &sms.message,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("SMS gateway rejected message to {}: {} {}", sms.to, status, body);
            return Err(ServiceError::Delivery(format!(
                "SMS gateway returned {}: {}",
                status, body
            )));
        }

        let receipt = response
            .json::<GatewayReceipt>()
            .await
            .unwrap_or(GatewayReceipt { id: None, status: None });
        info!("SMS sent to {}", sms.to);
        Ok(receipt)
    }
}
