use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BridgeConfig;

pub const STATE_ROOM_NAME: &str = "m.room.name";
pub const STATE_ROOM_AVATAR: &str = "m.room.avatar";
pub const STATE_BRIDGE: &str = "m.bridge";
// Pre-MSC2346 name still read by older clients.
pub const STATE_HALF_SHOT_BRIDGE: &str = "uk.half-shot.bridge";
pub const STATE_IMAGE_PACK: &str = "im.ponies.room_emotes";
pub const ROOM_TYPE_SPACE: &str = "m.space";

const ROOM_YEETING_FEATURE: &str = "com.beeper.room_yeeting";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitialStateEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub state_key: String,
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateRoomRequest {
    pub visibility: String,
    pub preset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub initial_state: Vec<InitialStateEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_content: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invite: Vec<String>,
}

/// Error body returned by the homeserver for a failed request.
#[derive(Debug, Clone, Error)]
#[error("matrix request failed with status {status}: {errcode} {message}")]
pub struct MatrixApiError {
    pub status: u16,
    pub errcode: String,
    pub message: String,
}

impl MatrixApiError {
    pub fn is_not_found(&self) -> bool {
        self.status == 404 || self.errcode == "M_NOT_FOUND"
    }
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<MatrixApiError>()
        .is_some_and(MatrixApiError::is_not_found)
}

/// Room operations the guild mirror needs from the Matrix side.
#[async_trait]
pub trait RoomClient: Send + Sync {
    fn bot_user_id(&self) -> String;

    async fn create_room(&self, request: &CreateRoomRequest) -> Result<String>;

    async fn set_room_name(&self, room_id: &str, name: &str) -> Result<()>;

    /// An empty `avatar_url` removes the room avatar.
    async fn set_room_avatar(&self, room_id: &str, avatar_url: &str) -> Result<()>;

    async fn send_state_event(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
        content: &Value,
    ) -> Result<String>;

    async fn invite_user(&self, room_id: &str, user_id: &str) -> Result<()>;

    /// Whether the homeserver can delete a room outright.
    fn supports_room_deletion(&self) -> bool;

    async fn delete_room(&self, room_id: &str) -> Result<()>;

    /// Generic teardown for homeservers without room deletion: kick everyone
    /// else, then leave.
    async fn cleanup_room(&self, room_id: &str) -> Result<()>;
}

pub struct MatrixRoomClient {
    http: Client,
    homeserver_url: Url,
    token: SecretString,
    bot_user_id: String,
    room_deletion: AtomicBool,
}

impl MatrixRoomClient {
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        let homeserver_url = Url::parse(&config.homeserver_url)
            .with_context(|| format!("invalid homeserver url {}", config.homeserver_url))?;
        Ok(Self {
            http: Client::new(),
            homeserver_url,
            token: SecretString::from(config.appservice_token.clone()),
            bot_user_id: config.bot_user_id(),
            room_deletion: AtomicBool::new(false),
        })
    }

    /// Reads `/versions` to find out which unstable features the homeserver
    /// offers.
    pub async fn detect_capabilities(&self) -> Result<()> {
        let url = self.endpoint(&["_matrix", "client", "versions"])?;
        let versions = self.send_json(Method::GET, url, None).await?;
        let supported = versions
            .get("unstable_features")
            .and_then(|features| features.get(ROOM_YEETING_FEATURE))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.room_deletion.store(supported, Ordering::Relaxed);
        info!("homeserver room deletion support: {}", supported);
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.homeserver_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("homeserver url cannot be a base: {}", self.homeserver_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn client_endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut full = vec!["_matrix", "client", "v3"];
        full.extend_from_slice(segments);
        self.endpoint(&full)
    }

    async fn send_json(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value> {
        debug!("matrix request {} {}", method, url.path());
        let mut request = self
            .http
            .request(method, url.clone())
            .bearer_auth(self.token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("failed to send request to {}", url.path()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| anyhow!("failed to read response body: {}", e))?;

        if !status.is_success() {
            let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            return Err(MatrixApiError {
                status: status.as_u16(),
                errcode: body
                    .get("errcode")
                    .and_then(Value::as_str)
                    .unwrap_or("M_UNKNOWN")
                    .to_string(),
                message: body
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }
            .into());
        }

        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| anyhow!("failed to parse response: {}", e))
    }

    async fn joined_members(&self, room_id: &str) -> Result<Vec<String>> {
        let url = self.client_endpoint(&["rooms", room_id, "joined_members"])?;
        let response = self.send_json(Method::GET, url, None).await?;
        Ok(response
            .get("joined")
            .and_then(Value::as_object)
            .map(|joined| joined.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RoomClient for MatrixRoomClient {
    fn bot_user_id(&self) -> String {
        self.bot_user_id.clone()
    }

    async fn create_room(&self, request: &CreateRoomRequest) -> Result<String> {
        let url = self.client_endpoint(&["createRoom"])?;
        let body = serde_json::to_value(request)?;
        let response = self.send_json(Method::POST, url, Some(&body)).await?;
        response
            .get("room_id")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow!("no room_id in createRoom response"))
    }

    async fn set_room_name(&self, room_id: &str, name: &str) -> Result<()> {
        self.send_state_event(room_id, STATE_ROOM_NAME, "", &json!({ "name": name }))
            .await
            .map(|_| ())
    }

    async fn set_room_avatar(&self, room_id: &str, avatar_url: &str) -> Result<()> {
        let content = if avatar_url.is_empty() {
            json!({})
        } else {
            json!({ "url": avatar_url })
        };
        self.send_state_event(room_id, STATE_ROOM_AVATAR, "", &content)
            .await
            .map(|_| ())
    }

    async fn send_state_event(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
        content: &Value,
    ) -> Result<String> {
        let url = self.client_endpoint(&["rooms", room_id, "state", event_type, state_key])?;
        let response = self.send_json(Method::PUT, url, Some(content)).await?;
        Ok(response
            .get("event_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn invite_user(&self, room_id: &str, user_id: &str) -> Result<()> {
        let url = self.client_endpoint(&["rooms", room_id, "invite"])?;
        self.send_json(Method::POST, url, Some(&json!({ "user_id": user_id })))
            .await
            .map(|_| ())
    }

    fn supports_room_deletion(&self) -> bool {
        self.room_deletion.load(Ordering::Relaxed)
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        let url = self.endpoint(&[
            "_matrix",
            "client",
            "unstable",
            "com.beeper.yeet",
            "rooms",
            room_id,
            "delete",
        ])?;
        self.send_json(Method::POST, url, Some(&json!({})))
            .await
            .map(|_| ())
    }

    async fn cleanup_room(&self, room_id: &str) -> Result<()> {
        let members = self.joined_members(room_id).await?;
        for member in members.iter().filter(|member| **member != self.bot_user_id) {
            let url = self.client_endpoint(&["rooms", room_id, "kick"])?;
            let body = json!({ "user_id": member, "reason": "Deleting portal" });
            if let Err(err) = self.send_json(Method::POST, url, Some(&body)).await {
                warn!("failed to kick {} from {}: {}", member, room_id, err);
            }
        }

        let url = self.client_endpoint(&["rooms", room_id, "leave"])?;
        self.send_json(Method::POST, url, Some(&json!({})))
            .await
            .map(|_| ())
    }
}
