use std::time::Duration;

use rand::Rng;
use serde_json::json;

use crate::error::{AppError, AppResult};

/// Six-digit numeric code
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// Hands OTP codes to the SMS gateway
#[derive(Clone)]
pub struct OtpSender {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl OtpSender {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, webhook_url }
    }

    pub async fn send(&self, phone_number: &str, code: &str) -> AppResult<()> {
        let Some(url) = &self.webhook_url else {
            tracing::debug!(phone_number, "OTP generated, no delivery webhook configured");
            return Ok(());
        };

        self.client
            .post(url)
            .json(&json!({ "phone_number": phone_number, "code": code }))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AppError::Internal(format!("Failed to deliver OTP: {}", e)))?;

        tracing::info!(phone_number, "OTP delivered");
        Ok(())
    }
}
