//! HTTP client for the grading backend's job endpoints.

use grade_types::{FetchError, HistoryFilter, HistoryPage, Job, StatusFetcher};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ReprocessResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    job_id: String,
}

/// StatusFetcher that talks to the grading backend over HTTP:
/// `GET /jobs/{id}`, `GET /jobs`, `POST /jobs/{id}/reprocess`,
/// `POST /jobs` (multipart upload).
pub struct HttpStatusFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpStatusFetcher {
    /// `timeout` bounds every request; a fetch that never resolves counts as
    /// a failure once it elapses.
    ///
    /// Panics if the TLS backend cannot be initialized, the same condition
    /// under which `reqwest::Client::new` panics.
    pub fn new(base_url: String, api_key: Option<String>, timeout: Option<Duration>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(30)))
            .build()
            .expect("failed to build http client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_env() -> Self {
        let url = std::env::var("GRADE_API_URL")
            .unwrap_or_else(|_| "http://localhost:8000/api".to_string());
        let api_key = std::env::var("GRADE_API_KEY").ok();
        Self::new(url, api_key, None)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// Upload a scanned exam; returns the new job id. The upload form itself
    /// is owned by the surrounding app, which hands the id to the tracker.
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, FetchError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let res = self
            .authed(self.client.post(format!("{}/jobs", self.base_url)))
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;
        let res = check_status(res).await?;
        let parsed: UploadResponse = res.json().await.map_err(network_error)?;
        Ok(parsed.job_id)
    }
}

#[async_trait::async_trait]
impl StatusFetcher for HttpStatusFetcher {
    async fn fetch_status(&self, job_id: &str) -> Result<Job, FetchError> {
        let res = self
            .authed(self.client.get(format!("{}/jobs/{}", self.base_url, job_id)))
            .send()
            .await
            .map_err(network_error)?;
        let res = check_status(res).await?;
        res.json().await.map_err(network_error)
    }

    async fn fetch_history(
        &self,
        filter: &HistoryFilter,
        page: u32,
    ) -> Result<HistoryPage, FetchError> {
        let mut req = self
            .client
            .get(format!("{}/jobs", self.base_url))
            .query(&[("page", page.to_string())]);
        if let Some(state) = filter.state {
            req = req.query(&[("state", state.as_str())]);
        }
        let res = self.authed(req).send().await.map_err(network_error)?;
        let res = check_status(res).await?;
        res.json().await.map_err(network_error)
    }

    async fn reprocess(&self, job_id: &str) -> Result<String, FetchError> {
        let res = self
            .authed(
                self.client
                    .post(format!("{}/jobs/{}/reprocess", self.base_url, job_id)),
            )
            .send()
            .await
            .map_err(network_error)?;
        let res = check_status(res).await?;
        let parsed: ReprocessResponse = res.json().await.map_err(network_error)?;
        Ok(parsed.job_id)
    }
}

fn network_error(e: reqwest::Error) -> FetchError {
    FetchError::Network(e.to_string())
}

/// Map a non-success response to the fetch error taxonomy: 404 and the
/// other 4xx are not retryable, everything else non-success counts as a
/// server error.
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let message = res
        .text()
        .await
        .unwrap_or_else(|_| "failed to read response body".to_string());
    if status == reqwest::StatusCode::NOT_FOUND {
        Err(FetchError::NotFound(message))
    } else if status.is_client_error() {
        Err(FetchError::Rejected {
            status: status.as_u16(),
            message,
        })
    } else {
        Err(FetchError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_keeps_timeout_and_trims_base_url() {
        let fetcher = HttpStatusFetcher::new(
            "http://localhost:8000/api/".to_string(),
            Some("key".to_string()),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(fetcher.base_url, "http://localhost:8000/api");
        assert_eq!(fetcher.api_key.as_deref(), Some("key"));
    }
}
