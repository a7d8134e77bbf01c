//! PostgREST-style HTTP remote store.
//!
//! Talks to a hosted Postgres REST gateway (`/rest/v1/<table>`). Ownership is
//! enforced server-side by row-level security; this client only sends the
//! caller's access token.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `NEXUS_STORE_URL`: gateway base URL (required)
//! - `NEXUS_STORE_KEY`: project API key sent as `apikey` (optional)
//! - `NEXUS_ACCESS_TOKEN`: session token sent as bearer (optional; without
//!   it every call fails with `AuthRequired`)
//! - `NEXUS_STORE_TIMEOUT`: request timeout in seconds (default: 30)
//! - `NEXUS_STORE_RETRIES`: retries for transient failures (default: 2)

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use nexus_core::defaults;
use nexus_core::{
    Error, Label, NewLabel, NewNote, NewNoteVersion, NewWorkspace, Note, NotePatch, NoteVersion,
    RemoteStore, Result, Workspace,
};

use crate::rows::{
    note_label_rows, LabelInsertRow, LabelRow, NoteInsertRow, NoteRow, NoteUpdateRow,
    VersionInsertRow, VersionRow, WorkspaceInsertRow, WorkspaceRow,
};

/// Column selection that embeds label ids into note rows.
const NOTE_SELECT: &str = "*,note_labels(label_id)";

/// Configuration for the REST store.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Gateway base URL, without the `/rest/v1` suffix.
    pub base_url: String,
    /// Project API key.
    pub api_key: Option<String>,
    /// Signed-in user's access token.
    pub access_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Retries for transient failures before giving up.
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub retry_base_ms: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            access_token: None,
            timeout_seconds: defaults::STORE_TIMEOUT_SECS,
            max_retries: defaults::STORE_MAX_RETRIES,
            retry_base_ms: defaults::STORE_RETRY_BASE_MS,
        }
    }
}

impl RestConfig {
    /// Read configuration from the environment. Fails with `ConfigMissing`
    /// when `NEXUS_STORE_URL` is unset.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("NEXUS_STORE_URL")
            .map_err(|_| Error::ConfigMissing("NEXUS_STORE_URL".to_string()))?;
        Ok(Self {
            base_url,
            api_key: std::env::var("NEXUS_STORE_KEY").ok(),
            access_token: std::env::var("NEXUS_ACCESS_TOKEN").ok(),
            timeout_seconds: std::env::var("NEXUS_STORE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::STORE_TIMEOUT_SECS),
            max_retries: std::env::var("NEXUS_STORE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::STORE_MAX_RETRIES),
            retry_base_ms: defaults::STORE_RETRY_BASE_MS,
        })
    }
}

/// Error body returned by the gateway.
#[derive(Debug, Deserialize, Default)]
struct GatewayError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Map an HTTP failure to the error taxonomy.
fn classify(status: StatusCode, message: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::AuthRequired,
        404 => Error::NotFound(message.to_string()),
        400 | 409 | 422 => Error::ValidationFailure(message.to_string()),
        429 | 500..=599 => Error::NetworkFailure(format!("{}: {}", status, message)),
        _ => Error::Internal(format!("unexpected status {}: {}", status, message)),
    }
}

/// Whether a failed call may be retried.
///
/// Non-idempotent calls are only retried when the request never reached the
/// server.
fn retryable(err: &reqwest::Error, idempotent: bool) -> bool {
    if idempotent {
        err.is_connect() || err.is_timeout()
    } else {
        err.is_connect()
    }
}

/// The note row is already written when the join-table writes run, so a
/// failure there leaves the store between the old and the new label set.
fn label_phase_failed(note_id: Uuid, err: Error) -> Error {
    warn!(note_id = %note_id, error = %err, "Label rows not written after note write");
    Error::PartiallyApplied(format!("note {} saved but its labels were not: {}", note_id, err))
}

/// HTTP remote store.
pub struct RestStore {
    client: Client,
    config: RestConfig,
}

impl RestStore {
    pub fn new(config: RestConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(Error::ConfigMissing("store base URL".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Initializing REST store: url={}, retries={}",
            config.base_url, config.max_retries
        );
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(RestConfig::from_env()?)
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder> {
        let token = self
            .config
            .access_token
            .as_deref()
            .ok_or(Error::AuthRequired)?;
        let url = format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table
        );
        let mut req = self.client.request(method, url).bearer_auth(token);
        if let Some(ref key) = self.config.api_key {
            req = req.header("apikey", key);
        }
        Ok(req)
    }

    /// Send a request, retrying transient failures with exponential backoff.
    async fn send(
        &self,
        op: &str,
        idempotent: bool,
        build: impl Fn() -> Result<RequestBuilder>,
    ) -> Result<Response> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = build()?.send().await;
            let retry = match &outcome {
                Ok(resp) => {
                    let status = resp.status();
                    (status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS)
                        && idempotent
                }
                Err(e) => retryable(e, idempotent),
            };

            if !retry || attempt >= self.config.max_retries {
                return match outcome {
                    Ok(resp) if resp.status().is_success() => Ok(resp),
                    Ok(resp) => {
                        let status = resp.status();
                        let body: GatewayError = resp.json().await.unwrap_or_default();
                        debug!(op, %status, code = ?body.code, "Store request rejected");
                        Err(classify(status, &body.message))
                    }
                    Err(e) => Err(Error::from(e)),
                };
            }

            let backoff = Duration::from_millis(self.config.retry_base_ms << attempt);
            attempt += 1;
            warn!(op, attempt, backoff_ms = backoff.as_millis() as u64, "Retrying store request");
            tokio::time::sleep(backoff).await;
        }
    }

    async fn rows<T: DeserializeOwned>(resp: Response) -> Result<Vec<T>> {
        resp.json::<Vec<T>>()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
    }

    /// First row of a `return=representation` response.
    async fn single<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
        Self::rows::<T>(resp)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(what.to_string()))
    }

    /// Replace a note's label set through the join table.
    async fn replace_note_labels(
        &self,
        note_id: Uuid,
        labels: &std::collections::BTreeSet<Uuid>,
    ) -> Result<()> {
        let filter = format!("eq.{}", note_id);
        self.send("clear_note_labels", true, || {
            Ok(self
                .request(Method::DELETE, "note_labels")?
                .query(&[("note_id", filter.as_str())]))
        })
        .await?;

        if labels.is_empty() {
            return Ok(());
        }
        let rows = note_label_rows(note_id, labels);
        self.send("insert_note_labels", false, || {
            Ok(self.request(Method::POST, "note_labels")?.json(&rows))
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn list_notes(&self, owner_id: Uuid, workspace_id: Option<Uuid>) -> Result<Vec<Note>> {
        let owner = format!("eq.{}", owner_id);
        let workspace = workspace_id.map(|id| format!("eq.{}", id));
        let resp = self
            .send("list_notes", true, || {
                let mut req = self.request(Method::GET, "notes")?.query(&[
                    ("select", NOTE_SELECT),
                    ("user_id", owner.as_str()),
                    ("order", "position.desc"),
                ]);
                if let Some(ref ws) = workspace {
                    req = req.query(&[("workspace_id", ws.as_str())]);
                }
                Ok(req)
            })
            .await?;
        let notes: Vec<Note> = Self::rows::<NoteRow>(resp)
            .await?
            .into_iter()
            .map(Note::from)
            .collect();
        debug!(result_count = notes.len(), "Listed notes");
        Ok(notes)
    }

    async fn insert_note(&self, record: NewNote) -> Result<Note> {
        let body = NoteInsertRow::from(&record);
        let resp = self
            .send("insert_note", false, || {
                Ok(self
                    .request(Method::POST, "notes")?
                    .query(&[("select", NOTE_SELECT)])
                    .header("Prefer", "return=representation")
                    .json(&body))
            })
            .await?;
        let mut note = Note::from(Self::single::<NoteRow>(resp, "inserted note").await?);

        if !record.labels.is_empty() {
            self.replace_note_labels(note.id, &record.labels)
                .await
                .map_err(|e| label_phase_failed(note.id, e))?;
            note.labels = record.labels;
        }
        Ok(note)
    }

    async fn update_note(&self, id: Uuid, patch: &NotePatch) -> Result<Note> {
        let body = NoteUpdateRow::from_patch(patch, Utc::now());
        let filter = format!("eq.{}", id);
        let resp = self
            .send("update_note", true, || {
                Ok(self
                    .request(Method::PATCH, "notes")?
                    .query(&[("id", filter.as_str()), ("select", NOTE_SELECT)])
                    .header("Prefer", "return=representation")
                    .json(&body))
            })
            .await?;
        let mut note = Note::from(Self::single::<NoteRow>(resp, &format!("note {}", id)).await?);

        if let Some(ref labels) = patch.labels {
            self.replace_note_labels(id, labels)
                .await
                .map_err(|e| label_phase_failed(id, e))?;
            note.labels = labels.clone();
        }
        Ok(note)
    }

    async fn delete_note(&self, id: Uuid) -> Result<()> {
        let filter = format!("eq.{}", id);
        let resp = self
            .send("delete_note", true, || {
                Ok(self
                    .request(Method::DELETE, "notes")?
                    .query(&[("id", filter.as_str())])
                    .header("Prefer", "return=representation"))
            })
            .await?;
        Self::single::<NoteRow>(resp, &format!("note {}", id)).await?;
        Ok(())
    }

    async fn list_labels(&self, owner_id: Uuid) -> Result<Vec<Label>> {
        let owner = format!("eq.{}", owner_id);
        let resp = self
            .send("list_labels", true, || {
                Ok(self
                    .request(Method::GET, "labels")?
                    .query(&[("user_id", owner.as_str()), ("order", "created_at.asc")]))
            })
            .await?;
        Ok(Self::rows::<LabelRow>(resp)
            .await?
            .into_iter()
            .map(Label::from)
            .collect())
    }

    async fn insert_label(&self, record: NewLabel) -> Result<Label> {
        let body = LabelInsertRow::from(&record);
        let resp = self
            .send("insert_label", false, || {
                Ok(self
                    .request(Method::POST, "labels")?
                    .header("Prefer", "return=representation")
                    .json(&body))
            })
            .await?;
        Ok(Label::from(
            Self::single::<LabelRow>(resp, "inserted label").await?,
        ))
    }

    async fn list_workspaces(&self, owner_id: Uuid) -> Result<Vec<Workspace>> {
        let owner = format!("eq.{}", owner_id);
        let resp = self
            .send("list_workspaces", true, || {
                Ok(self.request(Method::GET, "workspaces")?.query(&[
                    ("user_id", owner.as_str()),
                    ("order", "is_default.desc,created_at.asc"),
                ]))
            })
            .await?;
        Ok(Self::rows::<WorkspaceRow>(resp)
            .await?
            .into_iter()
            .map(Workspace::from)
            .collect())
    }

    async fn insert_workspace(&self, record: NewWorkspace) -> Result<Workspace> {
        let body = WorkspaceInsertRow::from(&record);
        let resp = self
            .send("insert_workspace", false, || {
                Ok(self
                    .request(Method::POST, "workspaces")?
                    .header("Prefer", "return=representation")
                    .json(&body))
            })
            .await?;
        Ok(Workspace::from(
            Self::single::<WorkspaceRow>(resp, "inserted workspace").await?,
        ))
    }

    async fn insert_version(&self, record: NewNoteVersion) -> Result<NoteVersion> {
        let body = VersionInsertRow::from(&record);
        let resp = self
            .send("insert_version", false, || {
                Ok(self
                    .request(Method::POST, "note_versions")?
                    .header("Prefer", "return=representation")
                    .json(&body))
            })
            .await?;
        Ok(NoteVersion::from(
            Self::single::<VersionRow>(resp, "inserted version").await?,
        ))
    }

    async fn list_versions(&self, note_id: Uuid) -> Result<Vec<NoteVersion>> {
        let filter = format!("eq.{}", note_id);
        let resp = self
            .send("list_versions", true, || {
                Ok(self
                    .request(Method::GET, "note_versions")?
                    .query(&[("note_id", filter.as_str()), ("order", "version.desc")]))
            })
            .await?;
        Ok(Self::rows::<VersionRow>(resp)
            .await?
            .into_iter()
            .map(NoteVersion::from)
            .collect())
    }
}
