use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::guild::Guild;
use super::{GuildError, GuildPortal};
use crate::db::{GuildBridgingMode, GuildRecord};
use crate::discord::GuildSnapshot;
use crate::matrix::{self, CreateRoomRequest, InitialStateEvent, ROOM_TYPE_SPACE, STATE_ROOM_AVATAR};
use crate::metrics::Metrics;

impl GuildPortal {
    /// Creates the guild's space unless it already exists.
    ///
    /// Concurrent calls for one guild serialize on the room-create lock; only
    /// the first reaches the homeserver.
    pub async fn create_mirror_room(
        &self,
        guild: &Arc<Guild>,
        initiator: &str,
        meta: &GuildSnapshot,
    ) -> Result<(), GuildError> {
        let _creating = guild.lock_room_creation().await;
        let mut state = guild.lock_state().await;
        if state.record.room_id().is_some() {
            return Ok(());
        }

        self.sync_locked(&mut state, meta).await?;

        let request = self.create_room_request(&state.record);
        let room_id = match self.room_client.create_room(&request).await {
            Ok(room_id) => room_id,
            Err(err) => {
                Metrics::room_creation_failed();
                warn!("failed to create guild space guild_id={}: {:#}", guild.id(), err);
                return Err(GuildError::RoomCreation(format!("{err:#}")));
            }
        };
        Metrics::room_created();
        info!("created guild space guild_id={} room_id={}", guild.id(), room_id);

        state.record.mxid = Some(room_id.clone());
        state.record.name_set = true;
        state.record.avatar_set = !state.record.avatar_url.is_empty();
        self.registry.index_room(&room_id, guild);

        if !initiator.is_empty() && initiator != self.room_client.bot_user_id() {
            if let Err(err) = self.room_client.invite_user(&room_id, initiator).await {
                warn!(
                    "failed to invite user to guild space guild_id={} user_id={}: {:#}",
                    guild.id(),
                    initiator,
                    err
                );
            }
        }

        if !state.emojis.is_empty() {
            self.publish_image_pack(&mut state).await;
        }

        self.guild_store.update(&state.record).await?;
        Ok(())
    }

    /// Forgets the guild's space without touching the room itself.
    pub async fn unmirror(&self, guild: &Guild) -> Result<(), GuildError> {
        let mut state = guild.lock_state().await;
        let Some(room_id) = state.record.room_id().map(ToOwned::to_owned) else {
            return Ok(());
        };

        let mut record = state.record.clone();
        record.mxid = None;
        record.name_set = false;
        record.avatar_set = false;
        record.bridging_mode = GuildBridgingMode::Nothing;
        self.guild_store.update(&record).await?;

        self.registry.unindex_room(&room_id);
        state.record = record;
        info!("unmirrored guild guild_id={} room_id={}", guild.id(), room_id);
        Ok(())
    }

    /// Removes the guild from the registry and from storage. The space, if
    /// any, is left alone.
    pub async fn delete(&self, guild: &Guild) -> Result<(), GuildError> {
        let state = guild.lock_state().await;
        self.guild_store.delete(guild.id()).await?;
        self.registry.remove(guild.id(), state.record.room_id());
        debug!("deleted guild guild_id={}", guild.id());
        Ok(())
    }

    /// Best-effort teardown of the guild's space. Failures are logged.
    pub async fn cleanup(&self, guild: &Guild) {
        let Some(room_id) = guild.room_id().await else {
            return;
        };

        if self.room_client.supports_room_deletion() {
            match self.room_client.delete_room(&room_id).await {
                Ok(()) => info!("deleted guild space guild_id={} room_id={}", guild.id(), room_id),
                Err(err) if matrix::is_not_found(&err) => {
                    debug!("guild space already gone guild_id={} room_id={}", guild.id(), room_id)
                }
                Err(err) => warn!(
                    "failed to delete guild space guild_id={} room_id={}: {:#}",
                    guild.id(),
                    room_id,
                    err
                ),
            }
            return;
        }

        if let Err(err) = self.room_client.cleanup_room(&room_id).await {
            warn!(
                "failed to clean up guild space guild_id={} room_id={}: {:#}",
                guild.id(),
                room_id,
                err
            );
        }
    }

    pub(crate) fn create_room_request(&self, record: &GuildRecord) -> CreateRoomRequest {
        let mut initial_state = self.bridge_info_state(record);
        if !record.avatar_url.is_empty() {
            initial_state.push(InitialStateEvent {
                event_type: STATE_ROOM_AVATAR.to_string(),
                state_key: String::new(),
                content: json!({ "url": record.avatar_url }),
            });
        }

        let mut creation_content = json!({ "type": ROOM_TYPE_SPACE });
        if !self.settings.federate_rooms {
            creation_content["m.federate"] = Value::Bool(false);
        }

        CreateRoomRequest {
            visibility: "private".to_string(),
            preset: "private_chat".to_string(),
            name: (!record.name.is_empty()).then(|| record.name.clone()),
            initial_state,
            creation_content: Some(creation_content),
            invite: Vec::new(),
        }
    }
}
