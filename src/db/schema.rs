// Column types line up between PostgreSQL and SQLite for these tables, so both
// backends share one set of definitions.

diesel::table! {
    guild (dcid) {
        dcid -> Text,
        mxid -> Nullable<Text>,
        plain_name -> Text,
        name -> Text,
        name_set -> Bool,
        avatar -> Text,
        avatar_url -> Text,
        avatar_set -> Bool,
        bridging_mode -> Integer,
    }
}

diesel::table! {
    guild_emoji (dc_guild_id, dc_emoji_name) {
        dc_guild_id -> Text,
        dc_emoji_name -> Text,
        mxc -> Text,
    }
}

diesel::table! {
    emoticon (mxid, mxc) {
        mxid -> Text,
        mxc -> Text,
        mxalt -> Text,
        dcid -> Text,
        dcname -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(guild, guild_emoji, emoticon);
