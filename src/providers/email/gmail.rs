//! Gmail API mailbox implementation.
//!
//! # API Usage
//!
//! This client uses the Gmail API v1:
//! - `users.messages.list` for the newest message ids
//! - `users.messages.get` (`format=full`) for headers and body parts
//! - `users.messages.modify` for label changes (archive, mark read)
//! - `users.messages.batchDelete` for permanent deletion
//!
//! Every call is authorized with the owner's bearer token. Token refresh
//! happens outside this client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::body::{decode_body, MimePart};
use super::cursor::after_cursor;
use super::{MailboxClient, ProviderError, RawMessage, Result};
use crate::domain::Credential;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Concurrent `messages.get` calls per listing.
const FETCH_CONCURRENCY: usize = 4;

/// Gmail API message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

/// Gmail API message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    snippet: Option<String>,
    payload: Option<GmailPart>,
    internal_date: Option<String>,
}

/// Gmail message part; the top-level payload has the same shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    mime_type: Option<String>,
    #[serde(default)]
    headers: Vec<GmailHeader>,
    body: Option<GmailBody>,
    #[serde(default)]
    parts: Vec<GmailPart>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailBody {
    data: Option<String>,
}

impl From<&GmailPart> for MimePart {
    fn from(part: &GmailPart) -> Self {
        MimePart {
            mime_type: part.mime_type.clone().unwrap_or_default(),
            data: part.body.as_ref().and_then(|b| b.data.clone()),
            parts: part.parts.iter().map(MimePart::from).collect(),
        }
    }
}

/// Request body for label modifications.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest<'a> {
    add_label_ids: &'a [&'a str],
    remove_label_ids: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct BatchDeleteRequest<'a> {
    ids: &'a [String],
}

/// Gmail REST mailbox client.
#[derive(Debug, Clone)]
pub struct GmailMailbox {
    client: reqwest::Client,
    base_url: String,
}

impl Default for GmailMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl GmailMailbox {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    /// Points the client at another API root (e.g. a local mock server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn auth_headers(credential: &Credential) -> Result<HeaderMap> {
        if !credential.is_usable() {
            return Err(ProviderError::Authentication(
                "no access token".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", credential.access_token))
                .map_err(|e| ProviderError::Internal(format!("invalid header: {}", e)))?,
        );
        Ok(headers)
    }

    /// Makes an authenticated GET request to the Gmail API.
    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        credential: &Credential,
        endpoint: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let headers = Self::auth_headers(credential)?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse response: {}", e)))
    }

    /// Makes an authenticated POST request whose response body is ignored.
    async fn post_no_response<B: Serialize>(
        &self,
        credential: &Credential,
        endpoint: &str,
        body: &B,
    ) -> Result<()> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut headers = Self::auth_headers(credential)?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }
        Ok(())
    }

    async fn handle_error(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => ProviderError::Authentication(format!("unauthorized: {}", body)),
            404 => ProviderError::NotFound(body),
            429 => ProviderError::RateLimited { retry_after_secs },
            400 => ProviderError::InvalidRequest(body),
            _ => ProviderError::Provider(format!("API error ({}): {}", status, body)),
        }
    }

    async fn fetch_message(&self, credential: &Credential, id: &str) -> Result<RawMessage> {
        let msg: GmailMessage = self
            .get(credential, &format!("/messages/{}?format=full", id))
            .await?;
        Ok(Self::to_raw_message(msg))
    }

    fn to_raw_message(msg: GmailMessage) -> RawMessage {
        let header = |name: &str| -> Option<String> {
            msg.payload.as_ref().and_then(|p| {
                p.headers
                    .iter()
                    .find(|h| h.name.eq_ignore_ascii_case(name))
                    .map(|h| h.value.clone())
            })
        };

        let from = header("From").unwrap_or_default();
        let subject = header("Subject")
            .or_else(|| msg.snippet.clone())
            .unwrap_or_default();

        let received_at = msg
            .internal_date
            .as_ref()
            .and_then(|d| d.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .or_else(|| {
                header("Date")
                    .and_then(|d| DateTime::parse_from_rfc2822(&d).ok())
                    .map(|d| d.with_timezone(&Utc))
            })
            .unwrap_or_else(Utc::now);

        let decoded = msg
            .payload
            .as_ref()
            .map(|p| decode_body(&MimePart::from(p)))
            .unwrap_or_default();

        if decoded.is_degraded() {
            tracing::warn!(
                provider_id = %msg.id,
                failures = ?decoded.degraded,
                "message body partially undecodable"
            );
        }

        RawMessage {
            provider_id: msg.id,
            from,
            subject,
            body: decoded.html,
            body_degraded: !decoded.degraded.is_empty(),
            received_at,
        }
    }
}

#[async_trait]
impl MailboxClient for GmailMailbox {
    async fn list_and_fetch(
        &self,
        credential: &Credential,
        max_results: u32,
        after_provider_id: Option<&str>,
    ) -> Result<Vec<RawMessage>> {
        let list: MessageListResponse = self
            .get(credential, &format!("/messages?maxResults={}", max_results))
            .await?;

        let listed = list.messages.len();
        let ids = after_cursor(list.messages, after_provider_id, |m| m.id.as_str());
        tracing::debug!(listed, kept = ids.len(), "listed remote messages");

        let fetched: Vec<(String, Result<RawMessage>)> = stream::iter(ids)
            .map(|m| async move {
                let result = self.fetch_message(credential, &m.id).await;
                (m.id, result)
            })
            .buffered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut messages = Vec::with_capacity(fetched.len());
        for (id, result) in fetched {
            match result {
                Ok(msg) => messages.push(msg),
                Err(e @ ProviderError::Authentication(_))
                | Err(e @ ProviderError::RateLimited { .. })
                | Err(e @ ProviderError::Connection(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(provider_id = %id, error = %e, "skipping unfetchable message");
                }
            }
        }
        Ok(messages)
    }

    async fn mutate_state(
        &self,
        credential: &Credential,
        provider_id: &str,
        add_labels: &[&str],
        remove_labels: &[&str],
    ) -> Result<()> {
        let request = ModifyRequest {
            add_label_ids: add_labels,
            remove_label_ids: remove_labels,
        };
        self.post_no_response(
            credential,
            &format!("/messages/{}/modify", provider_id),
            &request,
        )
        .await
    }

    async fn delete(&self, credential: &Credential, provider_ids: &[String]) -> Result<()> {
        if provider_ids.is_empty() {
            return Ok(());
        }
        self.post_no_response(
            credential,
            "/messages/batchDelete",
            &BatchDeleteRequest { ids: provider_ids },
        )
        .await
    }
}
