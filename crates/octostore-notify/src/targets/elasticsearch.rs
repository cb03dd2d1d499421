//! Elasticsearch index target.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use time::format_description::well_known::Rfc3339;

use super::ExternalTarget;
use crate::arn::Arn;
use crate::config::{ElasticsearchArgs, TargetFormat, TargetKind};
use crate::error::TargetError;
use crate::event::NotificationEvent;

pub struct ElasticsearchTarget {
    arn: Arn,
    client: Client,
    base_url: String,
    index: String,
    format: TargetFormat,
}

impl ElasticsearchTarget {
    /// Checks the cluster answers and creates the index if it is missing.
    pub async fn connect(
        arn: Arn,
        args: &ElasticsearchArgs,
        client: Client,
    ) -> Result<Self, TargetError> {
        let base_url = args.url.trim_end_matches('/').to_string();

        let response = client
            .get(&base_url)
            .send()
            .await
            .map_err(|e| TargetError::Connect(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TargetError::Connect(format!(
                "cluster at {base_url} responded with {}",
                response.status()
            )));
        }

        let target = Self {
            arn,
            client,
            base_url,
            index: args.index.clone(),
            format: args.format,
        };
        target.ensure_index().await?;
        Ok(target)
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.base_url, self.index)
    }

    async fn ensure_index(&self) -> Result<(), TargetError> {
        let url = self.index_url();
        let exists = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| TargetError::Connect(e.to_string()))?;
        if exists.status().is_success() {
            return Ok(());
        }

        let created = self
            .client
            .put(&url)
            .send()
            .await
            .map_err(|e| TargetError::Connect(e.to_string()))?;
        if !created.status().is_success() {
            let status = created.status();
            let body = created.text().await.unwrap_or_default();
            return Err(TargetError::Connect(format!(
                "unable to create index {}: {status} {body}",
                self.index
            )));
        }
        tracing::info!(arn = %self.arn, index = %self.index, "Created Elasticsearch index");
        Ok(())
    }
}

#[async_trait]
impl ExternalTarget for ElasticsearchTarget {
    fn arn(&self) -> &Arn {
        &self.arn
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Elasticsearch
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), TargetError> {
        let request = match self.format {
            TargetFormat::Namespace => {
                let id = urlencoding::encode(&format!("{}/{}", event.bucket(), event.object_key()))
                    .into_owned();
                let url = format!("{}/_doc/{id}", self.index_url());
                if event.event_name.is_removal() {
                    self.client.delete(url)
                } else {
                    self.client.put(url).json(&json!({ "Records": [event] }))
                }
            }
            TargetFormat::Access => {
                let event_time = event
                    .event_time
                    .format(&Rfc3339)
                    .map_err(|e| TargetError::Serialization(e.to_string()))?;
                self.client
                    .post(format!("{}/_doc", self.index_url()))
                    .json(&json!({ "EventTime": event_time, "Records": [event] }))
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| TargetError::Delivery(e.to_string()))?;
        let status = response.status();
        // Deleting a document that was never indexed is fine.
        if status.is_success() || (event.event_name.is_removal() && status == StatusCode::NOT_FOUND)
        {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TargetError::Delivery(format!("{status}: {body}")))
    }
}
