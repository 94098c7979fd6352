//! Courier task API client.

use crate::error::{CourierError, CourierResult};
use serde::Deserialize;
use tracing::{debug, error, warn};

/// Response body returned by task create/update calls.
#[derive(Debug, Deserialize)]
pub struct TaskResponse {
    /// The courier's task id.
    pub uid: Option<String>,
}

/// Client for the courier delivery task API.
#[derive(Clone)]
pub struct CourierClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CourierClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - The task endpoint base URL (e.g. `https://api.courier.example.com/v2/tasks`)
    /// * `api_key` - The environment's API key
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http_client: reqwest::Client::new(),
            base_url,
            api_key: api_key.into(),
        }
    }

    /// Create a delivery task. Returns the courier's task uid.
    pub async fn create_task(&self, payload: &str) -> CourierResult<String> {
        debug!("Creating courier task");

        let response = self.post(&self.base_url, payload).await?;
        let body: TaskResponse = self.read_json(response).await?;

        let uid = body.uid.ok_or_else(|| {
            CourierError::InvalidPayload("create response missing task uid".to_string())
        })?;
        debug!(task_id = %uid, "Courier task created");
        Ok(uid)
    }

    /// Update an existing task. Immutable keys (`type`, `date`) are stripped
    /// before sending. Returns the task uid (unchanged unless the courier
    /// reissues it).
    pub async fn update_task(&self, task_id: &str, payload: &str) -> CourierResult<String> {
        let body = crate::payload::strip_immutable_fields(payload)?;
        let url = format!("{}?uid={}", self.base_url, task_id);

        debug!(task_id, "Updating courier task");

        let response = self.put(&url, &body).await?;
        let parsed: TaskResponse = self.read_json(response).await?;

        let uid = parsed.uid.unwrap_or_else(|| task_id.to_string());
        debug!(task_id = %uid, "Courier task updated");
        Ok(uid)
    }

    /// Delete a task by uid.
    pub async fn delete_task(&self, task_id: &str) -> CourierResult<()> {
        let url = format!("{}?uid={}", self.base_url, task_id);

        debug!(task_id, "Deleting courier task");

        let response = self
            .http_client
            .delete(&url)
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .send()
            .await?;

        self.check_response(response).await?;
        debug!(task_id, "Courier task deleted");
        Ok(())
    }

    // =========================================================================
    // HTTP helpers
    // =========================================================================

    async fn post(&self, url: &str, body: &str) -> CourierResult<reqwest::Response> {
        let response = self
            .http_client
            .post(url)
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await?;

        self.check_response(response).await
    }

    async fn put(&self, url: &str, body: &str) -> CourierResult<reqwest::Response> {
        let response = self
            .http_client
            .put(url)
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await?;

        self.check_response(response).await
    }

    /// Classify a non-success response into the error taxonomy.
    async fn check_response(&self, response: reqwest::Response) -> CourierResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            warn!(retry_after, "Courier rate limited");
        } else {
            error!(status = status.as_u16(), body = %body, "Courier request failed");
        }

        Err(classify_status(status.as_u16(), retry_after, body))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> CourierResult<T> {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl std::fmt::Debug for CourierClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Map a non-success status (plus any Retry-After hint) to a CourierError.
fn classify_status(status: u16, retry_after: Option<u64>, body: String) -> CourierError {
    match status {
        429 => CourierError::RateLimited { retry_after },
        400..=499 => CourierError::ClientError {
            status,
            message: body,
        },
        _ => CourierError::ServerError {
            status,
            message: body,
        },
    }
}

/// Parse a Retry-After header as whole seconds (date form unsupported).
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
