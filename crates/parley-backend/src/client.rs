// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the backend collaborators.
//!
//! Implements the [`MessageStore`] and [`ConsultationLedger`] traits over
//! the backend's REST API. Transient statuses (429, 500, 503) are retried
//! once after a short delay; HTTP 402 maps to
//! [`ParleyError::InsufficientBalance`] with the amounts carried in the
//! response body.

use std::time::Duration;

use async_trait::async_trait;
use parley_config::model::BackendConfig;
use parley_core::traits::ledger::StartConsultation;
use parley_core::types::{ChatMessage, MessageId, NewMessage, RoomId};
use parley_core::{
    Amount, ConsultationLedger, ConsultationSession, MessageStore, ParleyError, ParticipantId,
    SessionId, Settlement,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Request timeout for backend calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Amount,
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    rate_per_minute: Amount,
}

/// Error body the backend attaches to 4xx responses. On 402 it carries
/// the amounts needed to build a precise balance error.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    required: Option<Amount>,
    #[serde(default)]
    current: Option<Amount>,
}

/// HTTP client for the message-store and ledger collaborators.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl BackendClient {
    /// Builds an authenticated client for the configured backend.
    pub fn new(config: &BackendConfig, token: &str) -> Result<Self, ParleyError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ParleyError::Validation(format!("invalid auth token: {e}")))?;
        headers.insert("authorization", bearer);
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ParleyError::Connection {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Shortens the transient-retry delay (for testing with wiremock).
    #[cfg(test)]
    fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sends one request, retrying once on a transient status, and decodes
    /// the success body.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ParleyError> {
        let url = format!("{}{path}", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, path, "retrying backend request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let mut req = self.http.request(method.clone(), &url);
            if let Some(ref body) = body {
                req = req.json(body);
            }
            let response = req.send().await.map_err(|e| ParleyError::Connection {
                message: format!("backend request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

            let status = response.status();
            debug!(status = %status, path, attempt, "backend response received");

            if status.is_success() {
                let text = response.text().await.map_err(|e| ParleyError::Connection {
                    message: format!("failed to read backend response: {e}"),
                    source: Some(Box::new(e)),
                })?;
                return serde_json::from_str(&text).map_err(|e| ParleyError::Persistence {
                    message: format!("malformed backend response: {e}"),
                    source: Some(Box::new(e)),
                });
            }

            if status == StatusCode::PAYMENT_REQUIRED {
                let body = response.text().await.unwrap_or_default();
                return Err(balance_error(&body));
            }

            if is_transient(status) && attempt < self.max_retries {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "transient backend error, will retry");
                last_error = Some(ParleyError::persistence(format!(
                    "backend returned {status}: {body}"
                )));
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) if !err.message.is_empty() => {
                    format!("backend error ({status}): {}", err.message)
                }
                _ => format!("backend returned {status}: {body}"),
            };
            return Err(ParleyError::persistence(message));
        }

        Err(last_error
            .unwrap_or_else(|| ParleyError::persistence("backend request failed after retries")))
    }

    /// As [`Self::request`], for endpoints with no response body.
    async fn request_empty(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), ParleyError> {
        let _: serde_json::Value = self
            .request::<serde_json::Value>(method.clone(), path, body.clone())
            .await
            .or_else(|err| match err {
                // 204-style empty bodies fail JSON decoding; treat as ok.
                ParleyError::Persistence { ref message, .. }
                    if message.starts_with("malformed backend response") =>
                {
                    Ok(serde_json::Value::Null)
                }
                other => Err(other),
            })?;
        Ok(())
    }
}

fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::SERVICE_UNAVAILABLE
    )
}

/// Build an [`ParleyError::InsufficientBalance`] from a 402 body, falling
/// back to zero amounts when the body is unreadable.
fn balance_error(body: &str) -> ParleyError {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or(ApiErrorBody {
        message: String::new(),
        required: None,
        current: None,
    });
    let required = parsed.required.unwrap_or(0);
    let current = parsed.current.unwrap_or(0);
    ParleyError::InsufficientBalance {
        required,
        current,
        shortfall: (required - current).max(0),
    }
}

#[async_trait]
impl MessageStore for BackendClient {
    async fn history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, ParleyError> {
        self.request(Method::GET, &format!("/rooms/{room_id}/messages"), None)
            .await
    }

    async fn create_message(&self, new: &NewMessage) -> Result<ChatMessage, ParleyError> {
        let body = serde_json::to_value(new)
            .map_err(|e| ParleyError::Internal(format!("message serialization failed: {e}")))?;
        self.request(
            Method::POST,
            &format!("/rooms/{}/messages", new.room_id),
            Some(body),
        )
        .await
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), ParleyError> {
        self.request_empty(Method::DELETE, &format!("/messages/{id}"), None)
            .await
    }

    async fn react(&self, id: &MessageId, emoji: &str) -> Result<ChatMessage, ParleyError> {
        self.request(
            Method::POST,
            &format!("/messages/{id}/reactions"),
            Some(serde_json::json!({ "emoji": emoji })),
        )
        .await
    }
}

#[async_trait]
impl ConsultationLedger for BackendClient {
    async fn balance(&self, participant: &ParticipantId) -> Result<Amount, ParleyError> {
        let response: BalanceResponse = self
            .request(
                Method::GET,
                &format!("/participants/{participant}/balance"),
                None,
            )
            .await?;
        Ok(response.balance)
    }

    async fn provider_rate(&self, provider: &ParticipantId) -> Result<Amount, ParleyError> {
        let response: RateResponse = self
            .request(Method::GET, &format!("/providers/{provider}/rate"), None)
            .await?;
        Ok(response.rate_per_minute)
    }

    async fn start_consultation(
        &self,
        request: &StartConsultation,
    ) -> Result<ConsultationSession, ParleyError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ParleyError::Internal(format!("request serialization failed: {e}")))?;
        self.request(Method::POST, "/consultations/start", Some(body))
            .await
    }

    async fn extend_consultation(
        &self,
        id: &SessionId,
        additional_minutes: u32,
    ) -> Result<ConsultationSession, ParleyError> {
        self.request(
            Method::POST,
            &format!("/consultations/{id}/extend"),
            Some(serde_json::json!({ "additional_minutes": additional_minutes })),
        )
        .await
    }

    async fn end_consultation(
        &self,
        id: &SessionId,
        elapsed_minutes: u32,
    ) -> Result<Settlement, ParleyError> {
        self.request(
            Method::POST,
            &format!("/consultations/{id}/end"),
            Some(serde_json::json!({ "elapsed_minutes": elapsed_minutes })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{ConsultationKind, MessageKind};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> BackendClient {
        BackendClient::new(
            &BackendConfig {
                base_url: server.uri(),
            },
            "tok-1",
        )
        .unwrap()
        .with_retry_delay(Duration::from_millis(1))
    }

    fn message_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "room_id": "u1_u2",
            "sender": "u1",
            "content": "hello",
            "kind": "text",
            "created_at": "2026-03-01T10:00:00.000Z"
        })
    }

    #[tokio::test]
    async fn history_fetches_room_messages_with_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rooms/u1_u2/messages"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([message_json("m-1"), message_json("m-2")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let history = client.history(&RoomId("u1_u2".into())).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id.0, "m-1");
    }

    #[tokio::test]
    async fn create_message_posts_payload_and_returns_stored_copy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rooms/u1_u2/messages"))
            .and(body_partial_json(serde_json::json!({
                "content": "hello",
                "kind": "text"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(message_json("m-1")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let message = client
            .create_message(&NewMessage {
                room_id: RoomId("u1_u2".into()),
                sender: ParticipantId("u1".into()),
                content: "hello".into(),
                kind: MessageKind::Text,
                quoted_message_id: None,
            })
            .await
            .unwrap();

        assert_eq!(message.id.0, "m-1");
    }

    #[tokio::test]
    async fn payment_required_maps_to_insufficient_balance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/consultations/start"))
            .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
                "message": "balance too low",
                "required": 50,
                "current": 40
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client
            .start_consultation(&StartConsultation {
                client_id: ParticipantId("u1".into()),
                provider_id: ParticipantId("p1".into()),
                kind: ConsultationKind::Chat,
                rate_per_minute: 10,
                reserved_minutes: 5,
            })
            .await;

        match result {
            Err(ParleyError::InsufficientBalance {
                required,
                current,
                shortfall,
            }) => {
                assert_eq!((required, current, shortfall), (50, 40, 10));
            }
            other => panic!("expected insufficient balance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_error_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/participants/u1/balance"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/participants/u1/balance"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"balance": 75})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let balance = client.balance(&ParticipantId("u1".into())).await.unwrap();
        assert_eq!(balance, 75);
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/providers/p1/rate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "no such provider"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client.provider_rate(&ParticipantId("p1".into())).await;

        match result {
            Err(ParleyError::Persistence { message, .. }) => {
                assert!(message.contains("no such provider"), "got: {message}");
            }
            other => panic!("expected persistence error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_accepts_empty_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/messages/m-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.delete_message(&MessageId("m-1".into())).await.unwrap();
    }

    #[tokio::test]
    async fn settlement_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/consultations/c-1/end"))
            .and(body_partial_json(serde_json::json!({"elapsed_minutes": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "session": {
                    "id": "c-1",
                    "client_id": "u1",
                    "provider_id": "p1",
                    "kind": "call",
                    "rate_per_minute": 10,
                    "started_at": "2026-03-01T10:00:00.000Z",
                    "status": "ended",
                    "reserved_balance": 0,
                    "elapsed_minutes": 5
                },
                "charged": 30,
                "refunded": 20
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let settlement = client
            .end_consultation(&SessionId("c-1".into()), 3)
            .await
            .unwrap();

        assert_eq!(settlement.charged, 30);
        assert_eq!(settlement.refunded, 20);
    }
}
