use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::BridgeConfig;

const MAX_MATRIX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Identifies an upstream attachment so repeated reuploads can be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMeta {
    pub attachment_id: String,
}

impl AttachmentMeta {
    pub fn guild_avatar(guild_id: &str, icon_hash: &str) -> Self {
        Self {
            attachment_id: format!("guild_avatar/{guild_id}/{icon_hash}"),
        }
    }

    pub fn guild_emoji(guild_id: &str, emoji_name: &str) -> Self {
        Self {
            attachment_id: format!("guild_emoji/{guild_id}/{emoji_name}"),
        }
    }
}

/// Copies a Discord-hosted file into the Matrix media repository.
#[async_trait]
pub trait AttachmentReuploader: Send + Sync {
    /// Returns the full `mxc://` URI of the uploaded file.
    async fn reupload(&self, url: &str, is_avatar: bool, meta: &AttachmentMeta) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub data: Vec<u8>,
    pub content_type: String,
    pub filename: String,
    pub size: usize,
}

pub struct MediaReuploader {
    client: Client,
    homeserver_url: String,
    token: SecretString,
    uploaded: Mutex<HashMap<String, String>>,
}

impl MediaReuploader {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            client: Client::new(),
            homeserver_url: config.homeserver_url.clone(),
            token: SecretString::from(config.appservice_token.clone()),
            uploaded: Mutex::new(HashMap::new()),
        }
    }

    pub async fn download_from_url(&self, url: &str) -> Result<MediaInfo> {
        debug!("downloading media from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("failed to download from {}: {}", url, e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "failed to download from {}: status {}",
                url,
                response.status()
            ));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| anyhow!("failed to read response body: {}", e))?
            .to_vec();

        Ok(MediaInfo {
            size: data.len(),
            filename: filename_from_url(url),
            content_type,
            data,
        })
    }

    pub async fn upload_to_matrix(&self, media: &MediaInfo) -> Result<String> {
        if media.size > MAX_MATRIX_FILE_SIZE {
            return Err(anyhow!(
                "file too large for Matrix: {} bytes (max {})",
                media.size,
                MAX_MATRIX_FILE_SIZE
            ));
        }

        let mut upload_url = url::Url::parse(&format!(
            "{}/_matrix/media/v3/upload",
            self.homeserver_url.trim_end_matches('/')
        ))?;
        upload_url
            .query_pairs_mut()
            .append_pair("filename", &media.filename);

        let response = self
            .client
            .post(upload_url)
            .bearer_auth(self.token.expose_secret())
            .header("Content-Type", &media.content_type)
            .body(media.data.clone())
            .send()
            .await
            .map_err(|e| anyhow!("failed to upload to Matrix: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("failed to upload to Matrix: {} - {}", status, body));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse upload response: {}", e))?;

        let content_uri = json
            .get("content_uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("no content_uri in upload response"))?
            .to_string();

        debug!("uploaded {} as {}", media.filename, content_uri);
        Ok(content_uri)
    }
}

#[async_trait]
impl AttachmentReuploader for MediaReuploader {
    async fn reupload(&self, url: &str, is_avatar: bool, meta: &AttachmentMeta) -> Result<String> {
        if let Some(existing) = self.uploaded.lock().get(&meta.attachment_id).cloned() {
            debug!("reusing upload of {} ({})", meta.attachment_id, existing);
            return Ok(existing);
        }

        let mut media = self.download_from_url(url).await?;
        if is_avatar && !media.content_type.starts_with("image/") {
            media.content_type = "image/png".to_string();
        }
        let content_uri = self.upload_to_matrix(&media).await?;

        self.uploaded
            .lock()
            .insert(meta.attachment_id.clone(), content_uri.clone());
        Ok(content_uri)
    }
}

fn filename_from_url(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("attachment")
        .to_string()
}
