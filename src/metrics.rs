//! Guild mirror counters. Without the `metrics` feature every call is a no-op.

pub struct Metrics;

impl Metrics {
    pub fn emoji_uploaded() {
        #[cfg(feature = "metrics")]
        metrics::counter!("guild_mirror_emoji_uploads_total").increment(1);
    }

    pub fn emoji_upload_failed() {
        #[cfg(feature = "metrics")]
        metrics::counter!("guild_mirror_emoji_upload_failures_total").increment(1);
    }

    pub fn image_pack_published() {
        #[cfg(feature = "metrics")]
        metrics::counter!("guild_mirror_image_pack_publications_total").increment(1);
    }

    pub fn room_created() {
        #[cfg(feature = "metrics")]
        metrics::counter!("guild_mirror_rooms_created_total").increment(1);
    }

    pub fn room_creation_failed() {
        #[cfg(feature = "metrics")]
        metrics::counter!("guild_mirror_room_creation_failures_total").increment(1);
    }
}
