//! OneBot v11 HTTP client
//!
//! Every action is `POST {base_url}/{action}` with a JSON body and answers
//! with `{ status, retcode, data, message | wording }`.

use super::traits::{FileStore, Notifier, RemoteFile, RemoteFolder};
use crate::config::OneBotConfig;
use crate::error::{Error, RemoteError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ActionResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    retcode: i64,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    wording: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileListing {
    #[serde(default)]
    files: Option<Vec<RemoteFile>>,
    #[serde(default)]
    folders: Option<Vec<RemoteFolder>>,
}

/// Client for a OneBot v11 HTTP endpoint
#[derive(Clone, Debug)]
pub struct OneBotClient {
    http: reqwest::Client,
    upload_http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    timeout: Duration,
    upload_timeout: Duration,
}

impl OneBotClient {
    /// Build a client from configuration
    pub fn new(config: &OneBotConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        let upload_http = reqwest::Client::builder()
            .timeout(config.upload_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            upload_http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
            timeout: config.timeout,
            upload_timeout: config.upload_timeout,
        })
    }

    async fn call(&self, action: &str, params: Value) -> Result<Value> {
        self.call_with(&self.http, self.timeout, action, params).await
    }

    async fn call_with(
        &self,
        client: &reqwest::Client,
        limit: Duration,
        action: &str,
        params: Value,
    ) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, action);
        let mut request = client.post(&url).json(&params);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::from_request(e, action, limit))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::HttpStatus {
                action: action.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let body: ActionResponse = response
            .json()
            .await
            .map_err(|e| Error::from_request(e, action, limit))?;
        if body.status != "ok" {
            let message = body
                .wording
                .filter(|w| !w.is_empty())
                .or(body.message)
                .unwrap_or_default();
            return Err(RemoteError::Rejected {
                action: action.to_string(),
                retcode: body.retcode,
                message,
            }
            .into());
        }

        tracing::debug!(action = %action, "OneBot action succeeded");
        Ok(body.data)
    }

    async fn listing(&self, consumer_id: &str, folder: Option<&str>) -> Result<FileListing> {
        let data = match folder {
            Some(folder_id) => {
                self.call(
                    "get_group_files_by_folder",
                    json!({ "group_id": group_id(consumer_id), "folder_id": folder_id }),
                )
                .await?
            }
            None => {
                self.call(
                    "get_group_root_files",
                    json!({ "group_id": group_id(consumer_id) }),
                )
                .await?
            }
        };
        parse_data(data)
    }
}

/// Numeric group ids go out as JSON numbers, anything else as a string
fn group_id(consumer_id: &str) -> Value {
    match consumer_id.parse::<i64>() {
        Ok(id) => json!(id),
        Err(_) => json!(consumer_id),
    }
}

fn parse_data<T: DeserializeOwned + Default>(data: Value) -> Result<T> {
    if data.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(data)?)
}

#[async_trait]
impl FileStore for OneBotClient {
    async fn list_root_folders(&self, consumer_id: &str) -> Result<Vec<RemoteFolder>> {
        Ok(self.listing(consumer_id, None).await?.folders.unwrap_or_default())
    }

    async fn list_files(&self, consumer_id: &str, folder: Option<&str>) -> Result<Vec<RemoteFile>> {
        Ok(self.listing(consumer_id, folder).await?.files.unwrap_or_default())
    }

    async fn create_folder(&self, consumer_id: &str, name: &str) -> Result<()> {
        // Implementations disagree on the field name; send both.
        self.call(
            "create_group_file_folder",
            json!({
                "group_id": group_id(consumer_id),
                "name": name,
                "folder_name": name,
                "parent_id": "/",
            }),
        )
        .await?;
        tracing::info!(consumer_id = %consumer_id, folder = %name, "Created group folder");
        Ok(())
    }

    async fn upload_file(
        &self,
        consumer_id: &str,
        local: &Path,
        remote_name: &str,
        folder: Option<&str>,
    ) -> Result<()> {
        // The endpoint reads the file itself and needs an absolute path.
        let local = tokio::fs::canonicalize(local)
            .await
            .unwrap_or_else(|_| local.to_path_buf());

        let mut params = json!({
            "group_id": group_id(consumer_id),
            "file": local.to_string_lossy(),
            "name": remote_name,
        });
        if let Some(folder) = folder {
            params["folder"] = json!(folder);
        }

        self.call_with(&self.upload_http, self.upload_timeout, "upload_group_file", params)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for OneBotClient {
    async fn notify(&self, consumer_id: &str, text: &str) -> Result<()> {
        self.call(
            "send_group_msg",
            json!({ "group_id": group_id(consumer_id), "message": text }),
        )
        .await?;
        Ok(())
    }
}
