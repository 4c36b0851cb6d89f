use crate::config::RemoteConfig;
use crate::error::{Result, SyncError};
use crate::types::Record;
use crate::utils::{now_unix, preview};
use reqwest::blocking::{Client, Response};
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

/// The remote memory store, seen as add/delete only.
pub trait MemoryRemote {
    /// Every memory the store holds for the configured user.
    fn fetch(&self) -> Result<Vec<Record>>;

    fn create(&self, record: &Record) -> Result<()>;

    fn delete(&self, server_id: &str) -> Result<()>;
}

/// Open WebUI `/api/v1/memories` client.
pub struct OpenWebUiClient {
    client: Client,
    base_url: Url,
    user_id: String,
    token: String,
}

fn check_status(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(SyncError::Transport(format!(
        "{action} failed: {status} {}",
        body.trim()
    )))
}

/// Body of the add endpoint. Only content and timestamps are sent.
#[must_use]
pub fn create_payload(user_id: &str, record: &Record) -> Value {
    json!({
        "user": user_id,
        "content": record.content,
        "created_at": record.created_at,
        "updated_at": record.updated_at,
    })
}

/// Converts the list endpoint's body into records, skipping invalid entries.
pub fn records_from_server_list(body: &Value, now: i64) -> Result<Vec<Record>> {
    let Some(items) = body.as_array() else {
        return Err(SyncError::Transport(
            "memory list response is not a JSON array".to_string(),
        ));
    };

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match Record::from_server_json(item, now) {
            Ok(record) => records.push(record),
            Err(error) => log::warn!("skipping server memory: {error}"),
        }
    }
    Ok(records)
}

impl OpenWebUiClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            user_id: config.user_id.clone(),
            token: config.token.clone(),
        })
    }

    /// `segment` is percent-encoded as a single path segment.
    fn endpoint(&self, segment: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| {
                SyncError::Transport(format!("{} cannot be a base url", self.base_url))
            })?
            .pop_if_empty()
            .extend(["api", "v1", "memories", segment]);
        Ok(url)
    }
}

impl MemoryRemote for OpenWebUiClient {
    fn fetch(&self) -> Result<Vec<Record>> {
        let url = self.endpoint("")?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("user", self.user_id.as_str())])
            .send()?;
        let body: Value = check_status(response, "list memories")?.json()?;
        let records = records_from_server_list(&body, now_unix())?;
        log::info!("fetched {} memories from {}", records.len(), self.base_url);
        Ok(records)
    }

    fn create(&self, record: &Record) -> Result<()> {
        let payload = create_payload(&self.user_id, record);
        let response = self
            .client
            .post(self.endpoint("add")?)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()?;
        check_status(response, "add memory")?;
        log::debug!("uploaded memory {:?}", preview(&record.content));
        Ok(())
    }

    fn delete(&self, server_id: &str) -> Result<()> {
        let id = server_id.trim();
        if id.is_empty() {
            return Err(SyncError::Transport(format!(
                "refusing to delete memory with id {server_id:?}"
            )));
        }
        let response = self
            .client
            .delete(self.endpoint(id)?)
            .bearer_auth(&self.token)
            .send()?;
        check_status(response, "delete memory")?;
        log::debug!("deleted memory {id}");
        Ok(())
    }
}
