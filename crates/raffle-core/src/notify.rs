//! Notification sink for chat passthrough.

use reqwest::Client;
use std::time::Duration;
use tracing::info;

use crate::error::Result;

/// Forwards formatted chat lines to an external webhook. Without a
/// configured URL the lines are only logged.
#[derive(Clone)]
pub struct Notifier {
    client: Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, url }
    }

    pub async fn send(&self, message: &str) -> Result<()> {
        let Some(url) = self.url.as_deref() else {
            info!("{message}");
            return Ok(());
        };

        self.client
            .post(url)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
