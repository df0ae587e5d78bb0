use crate::framing::first_string;
use crate::job::ProcessingJob;
use crate::poller::JobStatusSource;
use crate::types::ApiError;
use crate::utils::{apply_headers, check_response_error, join_url};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_PROGRESS_PATH: &str = "/jobs/{job_id}/progress";
const JOB_ID_PLACEHOLDER: &str = "{job_id}";

/// HTTP client for starting background jobs and reading their progress
#[derive(Clone)]
pub struct JobsClient {
    client: Client,
    base_url: String,
    headers: HashMap<String, String>,
    progress_path: String,
}

impl JobsClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            headers: HashMap::new(),
            progress_path: DEFAULT_PROGRESS_PATH.to_string(),
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Override the status path; `{job_id}` is replaced with the encoded job id
    pub fn with_progress_path(mut self, template: impl Into<String>) -> Self {
        self.progress_path = template.into();
        self
    }

    /// Bound every request so a hung status endpoint cannot stall a poll tick forever
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ApiError> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Unknown(format!("Failed to build HTTP client: {e}")))?;
        Ok(self)
    }

    pub fn progress_url(&self, job_id: &str) -> String {
        let path = self
            .progress_path
            .replace(JOB_ID_PLACEHOLDER, &urlencoding::encode(job_id));
        join_url(&self.base_url, &path)
    }

    /// POST `body` to a trigger endpoint and return the id of the job it started
    pub async fn trigger(&self, path: &str, body: &serde_json::Value) -> Result<String, ApiError> {
        let builder = self.client.post(join_url(&self.base_url, path));
        let response = apply_headers(builder, &self.headers)
            .json(body)
            .send()
            .await?;
        let response = check_response_error(response).await?;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse trigger response: {e}")))?;

        let job_id = first_string(&value, &["job_id", "jobId", "id"]).ok_or_else(|| {
            ApiError::InvalidResponse(format!("Trigger response carries no job id: {value}"))
        })?;

        info!(job_id = %job_id, path = %path, "Started background job");
        Ok(job_id)
    }
}

#[async_trait]
impl JobStatusSource for JobsClient {
    async fn fetch_progress(&self, job_id: &str) -> Result<ProcessingJob, ApiError> {
        let url = self.progress_url(job_id);
        debug!(job_id = %job_id, "GET {url}");

        let builder = self.client.get(url).header("accept", "application/json");
        let response = apply_headers(builder, &self.headers).send().await?;
        let response = check_response_error(response).await?;

        let response_text = response
            .text()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        serde_json::from_str(&response_text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse job progress: {e}"))
        })
    }
}
