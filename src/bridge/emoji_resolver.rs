use std::sync::Arc;

use tracing::debug;

use crate::db::{DatabaseError, DatabaseManager, Emoticon, EmoticonStore, GuildEmojiStore};

/// A Discord custom emoji identified from Matrix content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEmoji {
    pub id: String,
    pub name: String,
}

/// Maps custom emoji used on Matrix back to the Discord emoji they came from.
pub struct EmojiResolver {
    emoticon_store: Arc<dyn EmoticonStore>,
    emoji_store: Arc<dyn GuildEmojiStore>,
}

impl EmojiResolver {
    pub fn new(emoticon_store: Arc<dyn EmoticonStore>, emoji_store: Arc<dyn GuildEmojiStore>) -> Self {
        Self {
            emoticon_store,
            emoji_store,
        }
    }

    pub fn from_database(db: &DatabaseManager) -> Self {
        Self::new(db.emoticon_store(), db.guild_emoji_store())
    }

    /// Looks up the emoji behind `mxc` as sent by `user_id`. The user's own
    /// emoticons win, then anyone's, then the guild emoji the bridge uploaded.
    pub async fn resolve(&self, user_id: &str, mxc: &str) -> Result<Option<ResolvedEmoji>, DatabaseError> {
        if let Some(emoticon) = self.emoticon_store.get_by_mxid_and_mxc(user_id, mxc).await? {
            return Ok(Some(emoticon.into()));
        }
        if let Some(emoticon) = self.emoticon_store.get_by_mxc(mxc).await? {
            return Ok(Some(emoticon.into()));
        }

        let bare = mxc.strip_prefix("mxc://").unwrap_or(mxc);
        // Failed uploads are stored with an empty locator.
        if bare.is_empty() {
            return Ok(None);
        }
        let resolved = self
            .emoji_store
            .get_by_mxc(bare)
            .await?
            .map(|emoji| ResolvedEmoji {
                id: emoji.emoji_id().to_string(),
                name: emoji.display_name().to_string(),
            });
        if resolved.is_none() {
            debug!("no discord emoji for mxc={}", mxc);
        }
        Ok(resolved)
    }

    /// Looks up an emoji by its shortcode, with or without surrounding colons.
    pub async fn resolve_alt(&self, alt: &str) -> Result<Option<ResolvedEmoji>, DatabaseError> {
        let alt = alt.trim_matches(':');
        if alt.is_empty() {
            return Ok(None);
        }
        if let Some(emoticon) = self.emoticon_store.get_by_alt(alt).await? {
            return Ok(Some(emoticon.into()));
        }
        Ok(self
            .emoji_store
            .get_by_alt(alt)
            .await?
            .map(|emoji| ResolvedEmoji {
                id: emoji.emoji_id().to_string(),
                name: emoji.display_name().to_string(),
            }))
    }

    pub async fn remember_emoticon(&self, emoticon: &Emoticon) -> Result<(), DatabaseError> {
        if self
            .emoticon_store
            .get_by_mxid_and_mxc(&emoticon.mxid, &emoticon.mxc)
            .await?
            .is_some()
        {
            return Ok(());
        }
        self.emoticon_store.insert(emoticon).await
    }

    pub async fn forget_emoticon(&self, emoticon: &Emoticon) -> Result<(), DatabaseError> {
        self.emoticon_store.delete(emoticon).await
    }
}

impl From<Emoticon> for ResolvedEmoji {
    fn from(emoticon: Emoticon) -> Self {
        Self {
            id: emoticon.dcid,
            name: emoticon.dcname,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use test_case::test_case;
    use tokio_test::assert_ok;

    use super::{EmojiResolver, ResolvedEmoji};
    use crate::bridge::testing::{MemoryEmoticonStore, MemoryGuildEmojiStore};
    use crate::db::{Emoticon, GuildEmoji};

    fn emoticon(user: &str, mxc: &str, id: &str) -> Emoticon {
        Emoticon {
            mxid: user.to_string(),
            mxc: mxc.to_string(),
            mxalt: "wave".to_string(),
            dcid: id.to_string(),
            dcname: "wave".to_string(),
        }
    }

    fn resolver() -> (EmojiResolver, Arc<MemoryEmoticonStore>) {
        let emoticons = Arc::new(MemoryEmoticonStore::default());
        let emojis = MemoryGuildEmojiStore::with_rows(vec![
            GuildEmoji {
                guild_id: "1".to_string(),
                emoji_name: "party:42".to_string(),
                mxc: "example.org/42".to_string(),
            },
            GuildEmoji {
                guild_id: "1".to_string(),
                emoji_name: "broken:43".to_string(),
                mxc: String::new(),
            },
        ]);
        (EmojiResolver::new(emoticons.clone(), Arc::new(emojis)), emoticons)
    }

    fn resolved(id: &str, name: &str) -> Option<ResolvedEmoji> {
        Some(ResolvedEmoji {
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    #[tokio::test]
    async fn own_emoticon_wins_over_others() {
        let (resolver, _) = resolver();
        resolver
            .remember_emoticon(&emoticon("@bob:example.org", "mxc://example.org/w", "7"))
            .await
            .expect("remember");
        resolver
            .remember_emoticon(&emoticon("@alice:example.org", "mxc://example.org/w", "8"))
            .await
            .expect("remember");

        let found = resolver
            .resolve("@alice:example.org", "mxc://example.org/w")
            .await
            .expect("resolve");
        assert_eq!(found, resolved("8", "wave"));

        let found = resolver
            .resolve("@carol:example.org", "mxc://example.org/w")
            .await
            .expect("resolve");
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn guild_emoji_are_found_by_content_uri() {
        let (resolver, _) = resolver();

        let found = resolver
            .resolve("@alice:example.org", "mxc://example.org/42")
            .await
            .expect("resolve");
        assert_eq!(found, resolved("42", "party"));

        let missing = resolver
            .resolve("@alice:example.org", "mxc://example.org/missing")
            .await
            .expect("resolve");
        assert!(missing.is_none());
    }

    #[test_case("mxc://" ; "scheme only")]
    #[test_case("" ; "empty")]
    #[tokio::test]
    async fn empty_locator_never_matches_failed_uploads(mxc: &str) {
        let (resolver, _) = resolver();
        assert_eq!(resolver.resolve("@alice:example.org", mxc).await.expect("resolve"), None);
    }

    #[test_case(":party:" ; "with colons")]
    #[test_case("party" ; "bare")]
    #[tokio::test]
    async fn shortcodes_resolve_to_guild_emoji(alt: &str) {
        let (resolver, _) = resolver();
        assert_eq!(resolver.resolve_alt(alt).await.expect("resolve"), resolved("42", "party"));
    }

    #[tokio::test]
    async fn remembering_twice_keeps_one_row() {
        let (resolver, store) = resolver();
        let wave = emoticon("@alice:example.org", "mxc://example.org/w", "8");

        assert_ok!(resolver.remember_emoticon(&wave).await);
        assert_ok!(resolver.remember_emoticon(&wave).await);
        assert_eq!(store.len(), 1);

        assert_ok!(resolver.forget_emoticon(&wave).await);
        assert_eq!(store.len(), 0);
    }
}
