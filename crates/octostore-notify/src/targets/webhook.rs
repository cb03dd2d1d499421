use std::collections::HashMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;

use super::{ExternalTarget, event_payload};
use crate::arn::Arn;
use crate::config::{TargetKind, WebhookArgs};
use crate::error::TargetError;
use crate::event::NotificationEvent;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature-256";

/// POSTs each event record to an HTTP endpoint.
pub struct WebhookTarget {
    arn: Arn,
    client: Client,
    endpoint: String,
    secret: Option<String>,
    headers: HashMap<String, String>,
}

impl WebhookTarget {
    /// Any HTTP answer from the endpoint counts as reachable.
    pub async fn connect(arn: Arn, args: &WebhookArgs, client: Client) -> Result<Self, TargetError> {
        client
            .head(&args.endpoint)
            .send()
            .await
            .map_err(|e| TargetError::Connect(format!("{}: {e}", args.endpoint)))?;

        Ok(Self {
            arn,
            client,
            endpoint: args.endpoint.clone(),
            secret: args.secret.clone().filter(|s| !s.is_empty()),
            headers: args.headers.clone(),
        })
    }

    pub(crate) fn sign_payload(payload: &str, secret: &str) -> Result<String, TargetError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| TargetError::InvalidConfig(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl ExternalTarget for WebhookTarget {
    fn arn(&self) -> &Arn {
        &self.arn
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Webhook
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), TargetError> {
        let payload = serde_json::to_string(&event_payload(event))?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        if let Some(secret) = &self.secret {
            let signature = Self::sign_payload(&payload, secret)?;
            request = request.header(SIGNATURE_HEADER, format!("sha256={signature}"));
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| TargetError::Delivery(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(TargetError::Delivery(format!("webhook returned {status}: {body}")))
        }
    }
}
