//! # rewind-sdk
//!
//! Client for the rewind HTTP API.
//!
//! ## Example
//!
//! ```no_run
//! use rewind_sdk::{RevertOutcome, RewindClient};
//!
//! let client = RewindClient::new("http://localhost:3030").with_token("s3cret");
//!
//! // Newest page of history
//! let page = client.commits(0).unwrap().expect("history is not empty");
//! let newest = &page.commits[0];
//!
//! if newest.can_undo {
//!     match client.undo(&newest.hash).unwrap() {
//!         RevertOutcome::Reverted => println!("undone"),
//!         RevertOutcome::NothingToCommit(message) => println!("{}", message),
//!     }
//! }
//! ```

use anyhow::{anyhow, Result};
use reqwest::blocking::{RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct RewindClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitsPage {
    pub pages: Vec<usize>,
    pub commits: Vec<HistoryCommit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryCommit {
    pub hash: String,
    pub date: String,
    pub message: String,
    pub can_undo: bool,
    pub can_rollback: bool,
    pub is_enabled: bool,
    pub is_initial: bool,
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    #[serde(rename = "type")]
    pub change_type: String,
    pub action: String,
    pub name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Result of a successful undo or rollback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertOutcome {
    /// A compensating commit was recorded.
    Reverted,
    /// The site already was in the requested state.
    NothingToCommit(String),
}

#[derive(Deserialize)]
struct ApiMessage {
    code: String,
    message: String,
}

#[derive(Deserialize)]
struct DiffBody {
    diff: String,
}

impl RewindClient {
    /// Create a new rewind client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the rewind server (e.g., "http://localhost:3030")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Sends `token` as a bearer token with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        Ok(request.send()?)
    }

    /// One page of history, or `None` once the page lies past the end of the log
    pub fn commits(&self, page: usize) -> Result<Option<CommitsPage>> {
        let response = self.send(
            self.client
                .get(self.url("/commits"))
                .query(&[("page", page)]),
        )?;

        if response.status() == StatusCode::FORBIDDEN {
            let body: ApiMessage = response.json()?;
            if body.code == "notice" {
                return Ok(None);
            }
            return Err(anyhow!(body.message));
        }
        read(response).map(Some)
    }

    /// Undo the changes of one commit
    pub fn undo(&self, hash: &str) -> Result<RevertOutcome> {
        self.revert("/undo", hash)
    }

    /// Roll the site back to the state of a commit
    pub fn rollback(&self, hash: &str) -> Result<RevertOutcome> {
        self.revert("/rollback", hash)
    }

    fn revert(&self, path: &str, hash: &str) -> Result<RevertOutcome> {
        let response = self.send(self.client.post(self.url(path)).query(&[("commit", hash)]))?;
        revert_outcome(read(response)?)
    }

    /// Whether the working state allows reverting
    pub fn can_revert(&self) -> Result<bool> {
        read(self.send(self.client.get(self.url("/can-revert")))?)
    }

    /// Unified diff of one commit
    pub fn diff(&self, hash: &str) -> Result<String> {
        let response = self.send(
            self.client
                .get(self.url("/diff"))
                .query(&[("commit", hash)]),
        )?;
        let body: DiffBody = read(response)?;
        Ok(body.diff)
    }

    /// Whether history moved past `latest_commit`
    pub fn should_update(&self, latest_commit: &str) -> Result<bool> {
        read(self.send(
            self.client
                .get(self.url("/should-update"))
                .query(&[("latestCommit", latest_commit)]),
        )?)
    }

    /// Check server health
    pub fn health_check(&self) -> Result<bool> {
        let response = self.send(self.client.get(self.url("/health")))?;
        Ok(response.status().is_success())
    }
}

/// Decodes a success body, or turns an error body into its server message.
fn read<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json()?);
    }

    let text = response.text()?;
    match serde_json::from_str::<ApiMessage>(&text) {
        Ok(body) => Err(anyhow!(body.message)),
        Err(_) => Err(anyhow!("Request failed with {}: {}", status, text)),
    }
}

fn revert_outcome(body: serde_json::Value) -> Result<RevertOutcome> {
    if body == serde_json::Value::Bool(true) {
        return Ok(RevertOutcome::Reverted);
    }

    let message: ApiMessage = serde_json::from_value(body)?;
    match message.code.as_str() {
        "updated" => Ok(RevertOutcome::NothingToCommit(message.message)),
        _ => Err(anyhow!(message.message)),
    }
}
