use std::time::Duration;

use reqwest::StatusCode;
use scoring::collaborators::{AnalysisRequest, AuthorActivity, CollaboratorFailure, GitAnalyzer};
use serde::Deserialize;

use super::{build_client, error_body, normalize_base_url};
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    authors: Vec<AuthorActivity>,
}

/// Client for the git analysis service (`POST {base}/analyze`).
pub struct GitServiceClient {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
    timeout: Duration,
}

impl GitServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            client: build_client(timeout)?,
            token: None,
            timeout,
        })
    }

    /// Bearer token forwarded to the service for private repositories.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn transport_failure(&self, error: reqwest::Error) -> CollaboratorFailure {
        if error.is_timeout() {
            CollaboratorFailure::Timeout("git analysis", self.timeout)
        } else {
            CollaboratorFailure::RepoUnreachable(error.to_string())
        }
    }
}

#[async_trait::async_trait]
impl GitAnalyzer for GitServiceClient {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> std::result::Result<Vec<AuthorActivity>, CollaboratorFailure> {
        tracing::info!(repo_url = %request.repo_url, "Requesting git analysis");

        let mut call = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(request);
        if let Some(token) = &self.token {
            call = call.bearer_auth(token);
        }

        let response = call.send().await.map_err(|e| self.transport_failure(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            tracing::warn!(%status, body = %body, "Git analysis service returned an error");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    CollaboratorFailure::AuthRequired(request.repo_url.clone())
                }
                _ => CollaboratorFailure::RepoUnreachable(format!(
                    "{} ({})",
                    request.repo_url, status
                )),
            });
        }

        let parsed: AnalyzeResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_failure(e)
            } else {
                CollaboratorFailure::RepoUnreachable(format!("invalid analysis response: {}", e))
            }
        })?;

        tracing::debug!(authors = parsed.authors.len(), "Git analysis complete");
        Ok(parsed.authors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            repo_url: "https://example.com/team/capstone.git".to_string(),
            since: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            until: Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_parses_author_activity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "authors": [{
                    "author": "alice@example.com",
                    "commit_count": 12,
                    "lines_added": 340,
                    "lines_removed": 25,
                    "files_touched": 9,
                    "active_days": 4
                }]
            })))
            .mount(&server)
            .await;

        let client = GitServiceClient::new(&server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_token("secret");
        let authors = client.analyze(&request()).await.unwrap();

        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].commit_count, 12);
        assert!(authors[0].commit_timestamps.is_empty());
    }

    #[tokio::test]
    async fn test_auth_errors_map_to_auth_required() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = GitServiceClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.analyze(&request()).await.unwrap_err();
        assert!(matches!(err, CollaboratorFailure::AuthRequired(_)));
    }

    #[tokio::test]
    async fn test_missing_repo_maps_to_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such repository"))
            .mount(&server)
            .await;

        let client = GitServiceClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.analyze(&request()).await.unwrap_err();
        assert!(matches!(err, CollaboratorFailure::RepoUnreachable(_)));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "authors": [] }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = GitServiceClient::new(&server.uri(), Duration::from_millis(200)).unwrap();
        let err = client.analyze(&request()).await.unwrap_err();
        assert!(matches!(err, CollaboratorFailure::Timeout("git analysis", _)));
        assert_eq!(err.to_string(), "git analysis timed out after 200ms");
    }
}
