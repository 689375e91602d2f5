use std::time::Duration;

use reqwest::StatusCode;
use scoring::collaborators::{
    CollaboratorFailure, ExternalReference, LedgerPublisher, PublicationRequest,
};
use serde::Deserialize;

use super::{build_client, error_body, normalize_base_url};
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct PublishResponse {
    reference: String,
}

/// Client for the ledger publication service (`POST {base}/commitments`).
pub struct LedgerClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl LedgerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            client: build_client(timeout)?,
            timeout,
        })
    }

    fn transport_failure(&self, error: reqwest::Error) -> CollaboratorFailure {
        if error.is_timeout() {
            CollaboratorFailure::Timeout("ledger publication", self.timeout)
        } else {
            CollaboratorFailure::ChainUnavailable(error.to_string())
        }
    }
}

#[async_trait::async_trait]
impl LedgerPublisher for LedgerClient {
    async fn publish(
        &self,
        request: &PublicationRequest,
    ) -> std::result::Result<ExternalReference, CollaboratorFailure> {
        tracing::info!(
            project_id = %request.project_id,
            commitment = %request.commitment_hash,
            "Publishing commitment"
        );

        let response = self
            .client
            .post(format!("{}/commitments", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            tracing::warn!(%status, body = %body, "Ledger service returned an error");
            return Err(match status {
                StatusCode::PAYMENT_REQUIRED => CollaboratorFailure::InsufficientFunds(body),
                _ => CollaboratorFailure::ChainUnavailable(format!("ledger returned {}", status)),
            });
        }

        let parsed: PublishResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_failure(e)
            } else {
                CollaboratorFailure::ChainUnavailable(format!("invalid ledger response: {}", e))
            }
        })?;

        let reference = parsed.reference.trim();
        if reference.is_empty() {
            return Err(CollaboratorFailure::ChainUnavailable(
                "ledger returned an empty reference".to_string(),
            ));
        }

        Ok(ExternalReference(reference.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scoring::models::Weights;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> PublicationRequest {
        PublicationRequest {
            project_id: Uuid::new_v4(),
            commitment_hash: "ab".repeat(32),
            weights: Weights::default(),
            contribution_deadline: Utc::now(),
            voting_deadline: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_returns_reference() {
        let server = MockServer::start().await;
        let request = request();
        Mock::given(method("POST"))
            .and(path("/commitments"))
            .and(body_partial_json(serde_json::json!({
                "commitment_hash": request.commitment_hash
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "reference": "APP-731" })),
            )
            .mount(&server)
            .await;

        let client = LedgerClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let reference = client.publish(&request).await.unwrap();
        assert_eq!(reference, ExternalReference("APP-731".to_string()));
    }

    #[tokio::test]
    async fn test_payment_required_is_insufficient_funds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/commitments"))
            .respond_with(ResponseTemplate::new(402).set_body_string("balance too low"))
            .mount(&server)
            .await;

        let client = LedgerClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.publish(&request()).await.unwrap_err();
        assert_eq!(
            err,
            CollaboratorFailure::InsufficientFunds("balance too low".to_string())
        );
    }

    #[tokio::test]
    async fn test_server_errors_are_chain_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/commitments"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = LedgerClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.publish(&request()).await.unwrap_err();
        assert!(matches!(err, CollaboratorFailure::ChainUnavailable(_)));
    }
}
