// src/cloud.rs
//
// Cloud storage collaborator. Upload failures are never fatal for a run:
// the report simply carries a null URL. Transient failures retry with
// exponential backoff (1s, 2s, 4s...).

use crate::types::CloudConfig;
use anyhow::{bail, Context, Result};
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct CloudStorage {
    http: reqwest::Client,
    base_url: String,
    upload_preset: String,
    max_retries: u32,
}

impl CloudStorage {
    pub fn from_config(config: &CloudConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            upload_preset: config.upload_preset.clone(),
            max_retries: config.max_retries.max(1),
        })
    }

    /// Upload a local file, returning its public URL, or `None` once every
    /// attempt is exhausted. Missing files short-circuit to `None`.
    pub async fn upload(&self, local_path: &Path, public_id: &str, folder: &str) -> Option<String> {
        if !local_path.exists() {
            error!("Upload skipped, file not found: {}", local_path.display());
            return None;
        }

        let full_public_id = format!("{folder}/{public_id}");
        for attempt in 0..self.max_retries {
            info!(
                "Uploading {} (attempt {}/{})",
                local_path.display(),
                attempt + 1,
                self.max_retries
            );
            match self.try_upload(local_path, &full_public_id).await {
                Ok(url) => {
                    info!("Upload successful: {url}");
                    return Some(url);
                }
                Err(e) => {
                    error!("Upload attempt {} failed: {e:#}", attempt + 1);
                    if attempt + 1 < self.max_retries {
                        let wait = Duration::from_secs(1u64 << attempt);
                        info!("Retrying in {}s...", wait.as_secs());
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }
        error!(
            "All upload attempts failed for {}",
            local_path.display()
        );
        None
    }

    async fn try_upload(&self, local_path: &Path, public_id: &str) -> Result<String> {
        let bytes = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("upload_preset", self.upload_preset.clone())
            .text("public_id", public_id.to_string());

        let response = self
            .http
            .post(format!("{}/video/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("Upload request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<no body>".to_string());
            bail!("Upload server returned {status}: {body}");
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("Upload response was not valid JSON")?;
        body.get("secure_url")
            .and_then(|v| v.as_str())
            .map(String::from)
            .context("Upload response missing secure_url")
    }
}
