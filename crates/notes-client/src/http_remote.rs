//! HttpRemote: `RemoteClient` over the note service's REST API.
//!
//! Routes:
//! - `GET    {base}/api/notes`       list
//! - `POST   {base}/api/notes`       create, body `{ "content": ... }`
//! - `PUT    {base}/api/notes/{id}`  update, body `{ "content": ... }`
//! - `DELETE {base}/api/notes/{id}`  delete
//! - `GET    {base}/api/health`      reachability probe
//!
//! Every request carries the provider's token as a bearer credential.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notes_sync::remote::Result;
use notes_sync::{AuthProvider, Identifier, Note, NotePayload, RemoteClient, RemoteError, ServerId};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Server ids arrive as JSON numbers or strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

impl From<WireId> for ServerId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Number(n) => ServerId::from(n),
            WireId::Text(s) => ServerId::new(s),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNote {
    id: WireId,
    content: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<WireNote> for Note {
    fn from(wire: WireNote) -> Self {
        let now = Utc::now();
        let created_at = wire.created_at.unwrap_or(now);
        Note {
            id: Identifier::Permanent(wire.id.into()),
            content: wire.content,
            created_at,
            updated_at: wire.updated_at.unwrap_or(created_at),
        }
    }
}

#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpRemote {
    /// `base` is the server origin, e.g. `https://notes.example.com`.
    pub fn new(base: impl Into<String>, auth: Arc<dyn AuthProvider>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let base = base.into().trim_end_matches('/').to_string();
        Ok(Self { client, base, auth })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// True if the health endpoint answers with a success status.
    pub async fn probe(&self) -> bool {
        match self.client.get(self.url("/api/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health probe failed: {}", e);
                false
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn note_url(&self, id: &ServerId) -> String {
        self.url(&format!("/api/notes/{id}"))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match self.auth.get_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        debug!("Server answered {}: {}", status, message);
        Err(RemoteError::from_status(status.as_u16(), message))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Transient(format!("invalid response body: {e}")))
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transient(err.to_string())
    }
}

#[async_trait]
impl RemoteClient for HttpRemote {
    async fn create(&self, payload: &NotePayload) -> Result<Note> {
        let response = self.send(self.client.post(self.url("/api/notes")).json(payload)).await?;
        Ok(Self::decode::<WireNote>(response).await?.into())
    }

    async fn update(&self, id: &ServerId, payload: &NotePayload) -> Result<Note> {
        let response = self.send(self.client.put(self.note_url(id)).json(payload)).await?;
        Ok(Self::decode::<WireNote>(response).await?.into())
    }

    async fn delete(&self, id: &ServerId) -> Result<()> {
        self.send(self.client.delete(self.note_url(id))).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Note>> {
        let response = self.send(self.client.get(self.url("/api/notes"))).await?;
        let notes = Self::decode::<Vec<WireNote>>(response).await?;
        Ok(notes.into_iter().map(Note::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    #[test]
    fn test_wire_note_with_numeric_id() {
        let wire: WireNote = serde_json::from_str(
            r#"{"id":7,"content":"hi","createdAt":"2024-01-02T03:04:05Z","updatedAt":"2024-01-03T00:00:00Z"}"#,
        )
        .unwrap();
        let note = Note::from(wire);

        assert_eq!(note.id, Identifier::Permanent(ServerId::from(7)));
        assert_eq!(note.content, "hi");
        assert!(note.updated_at > note.created_at);
    }

    #[test]
    fn test_wire_note_with_string_id_and_no_timestamps() {
        let wire: WireNote = serde_json::from_str(r#"{"id":"abc-1","content":""}"#).unwrap();
        let note = Note::from(wire);

        assert_eq!(note.id.to_string(), "abc-1");
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_base_url_is_normalized() {
        let remote = HttpRemote::new(
            "http://localhost:3000/",
            Arc::new(StaticToken::default()),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(remote.base(), "http://localhost:3000");
        assert_eq!(remote.note_url(&ServerId::from(5)), "http://localhost:3000/api/notes/5");
    }
}
