use super::{JobStatusProvider, ProviderError};
use crate::state::JobPhase;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const STATUS_PATH: &str = "/api/export/status";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ExportStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    result: ExportResult,
}

#[derive(Debug, Default, Deserialize)]
struct ExportResult {
    #[serde(default)]
    archive_path: String,
}

/// Job status from an exporter's HTTP status endpoint
///
/// Queries `GET {base}/api/export/status?id=<job>`. The exporter is not
/// namespaced, so the namespace argument only appears in error messages.
///
/// | `state`     | phase                                            |
/// |-------------|--------------------------------------------------|
/// | `completed` | succeeded, carrying `result.archive_path`        |
/// | `failed`    | failed                                           |
/// | other       | running                                          |
#[derive(Debug, Clone)]
pub struct HttpJobStatusProvider {
    client: Client,
    base_url: Url,
}

impl HttpJobStatusProvider {
    pub fn new(base_url: Url) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Http(format!("failed to build client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn status_url(&self, job: &str) -> Result<Url, ProviderError> {
        let mut url = self
            .base_url
            .join(STATUS_PATH)
            .map_err(|e| ProviderError::Http(format!("invalid status URL: {e}")))?;
        url.query_pairs_mut().append_pair("id", job);
        Ok(url)
    }
}

#[async_trait]
impl JobStatusProvider for HttpJobStatusProvider {
    async fn job_status(&self, namespace: &str, job: &str) -> Result<JobPhase, ProviderError> {
        let url = self.status_url(job)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("export job {job}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http(format!(
                "export job {job} in {namespace}: unexpected status {status}"
            )));
        }

        let body: ExportStatus = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("export job {job} status: {e}")))?;
        debug!(job = %job, state = %body.state, "export job status");

        Ok(match body.state.as_str() {
            "completed" if body.result.archive_path.is_empty() => JobPhase::Failed {
                reason: "completed without an archive path".to_string(),
            },
            "completed" => JobPhase::Succeeded {
                artifact: Some(body.result.archive_path),
            },
            "failed" => JobPhase::Failed {
                reason: format!("export job {job} failed"),
            },
            _ => JobPhase::Running { state: body.state },
        })
    }
}
