//! Archive delivery over the Slack Web API.
//!
//! Uploads use the external upload flow: request an upload URL, send the
//! bytes, then complete the upload into the recipient's channel. A follow-up
//! message links the file's permalink.

use std::path::{Path, PathBuf};

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SlackConfig;
use crate::consts::APP_NAME;

#[derive(Debug, Error)]
pub enum DeliveryError {
  #[error("failed to create HTTP client: {0}")]
  Client(#[source] reqwest::Error),

  #[error("file to deliver does not exist: {0}")]
  MissingFile(PathBuf),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("request to {method} failed: {source}")]
  Http {
    method: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("{method} returned HTTP {status}")]
  Status { method: String, status: u16 },

  #[error("{method} failed: {error}")]
  Api { method: String, error: String },

  #[error("unexpected response from {method}: {source}")]
  Decode {
    method: String,
    #[source]
    source: serde_json::Error,
  },
}

/// A file shared with a recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
  pub channel: String,
  pub file_id: String,
  pub permalink: String,
  pub message_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenResponse {
  channel: ChannelRef,
}

#[derive(Debug, Deserialize)]
struct ChannelRef {
  id: String,
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
  upload_url: String,
  file_id: String,
}

#[derive(Debug, Deserialize)]
struct FileInfoResponse {
  file: FileInfo,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
  name: String,
  permalink: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
  ts: Option<String>,
}

fn user_agent() -> String {
  format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION"))
}

pub struct SlackClient {
  http: Client,
  api_url: String,
  token: String,
}

impl SlackClient {
  pub fn new(config: &SlackConfig) -> Result<Self, DeliveryError> {
    let http = Client::builder()
      .user_agent(user_agent())
      .build()
      .map_err(DeliveryError::Client)?;
    Ok(Self {
      http,
      api_url: config.api_url.trim_end_matches('/').to_string(),
      token: config.token.clone(),
    })
  }

  /// Uploads `path` to `recipient` and posts a message linking it.
  pub async fn deliver(&self, recipient: &str, path: &Path, display_name: &str) -> Result<Delivery, DeliveryError> {
    if !path.is_file() {
      return Err(DeliveryError::MissingFile(path.to_path_buf()));
    }
    let bytes = tokio::fs::read(path).await.map_err(|source| DeliveryError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let channel = self.resolve_channel(recipient).await?;
    info!(channel = %channel, file = %display_name, bytes = bytes.len(), "uploading archive to Slack");

    let length = bytes.len().to_string();
    let ticket: UploadUrlResponse = self
      .call(
        "files.getUploadURLExternal",
        self
          .post("files.getUploadURLExternal")
          .form(&[("filename", display_name), ("length", length.as_str())]),
      )
      .await?;

    self.upload(&ticket.upload_url, bytes).await?;

    let _: Value = self
      .call(
        "files.completeUploadExternal",
        self.post("files.completeUploadExternal").json(&json!({
          "files": [{ "id": ticket.file_id, "title": display_name }],
          "channel_id": channel,
        })),
      )
      .await?;

    let info: FileInfoResponse = self
      .call(
        "files.info",
        self
          .http
          .get(self.endpoint("files.info"))
          .query(&[("file", ticket.file_id.as_str())]),
      )
      .await?;

    let posted: PostMessageResponse = self
      .call(
        "chat.postMessage",
        self.post("chat.postMessage").json(&json!({
          "channel": channel,
          "text": format!("New build: {}", display_name),
          "attachments": [{
            "text": format!("Here is the file you requested: <{}|{}>", info.file.permalink, info.file.name),
            "footer": format!("Sent via {}", APP_NAME),
          }],
        })),
      )
      .await?;

    info!(permalink = %info.file.permalink, "archive delivered");

    Ok(Delivery {
      channel,
      file_id: ticket.file_id,
      permalink: info.file.permalink,
      message_ts: posted.ts,
    })
  }

  /// User ids (`U…`/`W…`) are resolved to their direct-message channel.
  async fn resolve_channel(&self, recipient: &str) -> Result<String, DeliveryError> {
    if !(recipient.starts_with('U') || recipient.starts_with('W')) {
      return Ok(recipient.to_string());
    }
    let opened: OpenResponse = self
      .call(
        "conversations.open",
        self.post("conversations.open").json(&json!({ "users": recipient })),
      )
      .await?;
    debug!(user = %recipient, channel = %opened.channel.id, "opened direct message channel");
    Ok(opened.channel.id)
  }

  async fn upload(&self, upload_url: &str, bytes: Vec<u8>) -> Result<(), DeliveryError> {
    let method = "file upload";
    let response = self
      .http
      .post(upload_url)
      .body(bytes)
      .send()
      .await
      .map_err(|source| DeliveryError::Http {
        method: method.to_string(),
        source,
      })?;
    if !response.status().is_success() {
      return Err(DeliveryError::Status {
        method: method.to_string(),
        status: response.status().as_u16(),
      });
    }
    Ok(())
  }

  fn endpoint(&self, method: &str) -> String {
    format!("{}/{}", self.api_url, method)
  }

  fn post(&self, method: &str) -> RequestBuilder {
    self.http.post(self.endpoint(method))
  }

  async fn call<T: DeserializeOwned>(&self, method: &str, request: RequestBuilder) -> Result<T, DeliveryError> {
    let response = request
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(|source| DeliveryError::Http {
        method: method.to_string(),
        source,
      })?;

    let status = response.status();
    if !status.is_success() {
      return Err(DeliveryError::Status {
        method: method.to_string(),
        status: status.as_u16(),
      });
    }

    let body: Value = response.json().await.map_err(|source| DeliveryError::Http {
      method: method.to_string(),
      source,
    })?;

    if body.get("ok").and_then(Value::as_bool) != Some(true) {
      let error = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
      return Err(DeliveryError::Api {
        method: method.to_string(),
        error,
      });
    }

    serde_json::from_value(body).map_err(|source| DeliveryError::Decode {
      method: method.to_string(),
      source,
    })
  }
}
