//! HTTP client for a help-ai server
//!
//! Implements the conversation store and the chat transport over the
//! server's JSON API, so a `ChatSession` can run against a remote server.

use crate::api::{
    ChatRequest, CreateConversationRequest, ErrorResponse, SuccessResponse, GUEST_MODE_HEADER,
};
use crate::db::{Conversation, ConversationId, ConversationWithMessages};
use crate::runtime::Identity;
use crate::store::{ConversationStore, StoreError};
use crate::transport::{ChatTransport, Exchange, TransportError, TransportErrorKind};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct ApiClient {
    client: Client,
    base_url: String,
    identity: Option<Identity>,
}

impl ApiClient {
    pub fn new(base_url: &str, identity: Option<Identity>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if self.identity.as_ref().is_some_and(Identity::is_guest) {
            builder.header(GUEST_MODE_HEADER, "true")
        } else {
            builder
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::timeout(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                TransportError::network(format!("Connection failed: {e}"))
            } else {
                TransportError::network(format!("Request failed: {e}"))
            }
        })
    }
}

/// Turn a non-success response into a classified error, preferring the
/// server's `{message}` body
async fn error_from_response(response: Response) -> TransportError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map_or_else(|_| format!("HTTP {status}"), |e| e.message);
    TransportError::new(classify_status(status), message)
}

fn classify_status(status: StatusCode) -> TransportErrorKind {
    match status.as_u16() {
        400 | 422 => TransportErrorKind::InvalidRequest,
        404 => TransportErrorKind::NotFound,
        408 | 504 => TransportErrorKind::Timeout,
        502 | 503 => TransportErrorKind::Upstream,
        _ => TransportErrorKind::Unknown,
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, String> {
    response
        .json()
        .await
        .map_err(|e| format!("Malformed response: {e}"))
}

impl From<TransportError> for StoreError {
    fn from(e: TransportError) -> Self {
        StoreError::Http(e.message)
    }
}

// ============================================================================
// Store over HTTP
// ============================================================================

#[async_trait]
impl ConversationStore for ApiClient {
    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<ConversationWithMessages>, StoreError> {
        let path = format!("/api/conversations/{id}");
        let response = self.send(self.request(Method::GET, &path)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(decode(response).await.map_err(StoreError::Decode)?)),
            _ => Err(error_from_response(response).await.into()),
        }
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        let response = self
            .send(self.request(Method::GET, "/api/conversations"))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await.into());
        }
        decode(response).await.map_err(StoreError::Decode)
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        let body = CreateConversationRequest {
            title: Some(title.to_string()),
        };
        let response = self
            .send(self.request(Method::POST, "/api/conversations").json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await.into());
        }
        decode(response).await.map_err(StoreError::Decode)
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<bool, StoreError> {
        let path = format!("/api/conversations/{id}");
        let response = self.send(self.request(Method::DELETE, &path)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => {
                let body: SuccessResponse = decode(response).await.map_err(StoreError::Decode)?;
                Ok(body.success)
            }
            _ => Err(error_from_response(response).await.into()),
        }
    }
}

// ============================================================================
// Transport over HTTP
// ============================================================================

#[async_trait]
impl ChatTransport for ApiClient {
    async fn exchange(
        &self,
        conversation_id: ConversationId,
        content: &str,
    ) -> Result<Exchange, TransportError> {
        let body = ChatRequest {
            message: content.to_string(),
            conversation_id,
        };
        let response = self
            .send(self.request(Method::POST, "/api/chat").json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        decode(response).await.map_err(TransportError::unknown)
    }
}
