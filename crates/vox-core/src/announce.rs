use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::ChannelId;

/// One announcement delivered to a channel's overlay connection.
///
/// Produced by the dispatch boundary after a synthesis call succeeds,
/// consumed exactly once by the target session's outbound pump (or dropped
/// if the session is gone). Immutable once constructed.
///
/// Serializes to the camelCase JSON the browser overlay consumes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    /// Target channel.
    pub channel_id: ChannelId,
    /// Where the overlay fetches the synthesized audio.
    pub audio_url: String,
    /// The text that was spoken.
    pub text: String,
    /// Display name of the triggering viewer, when the lookup succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Avatar URL of the triggering viewer, when the lookup succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_picture: Option<String>,
    /// Channel emote map (`code -> emote id`) for inline rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotes: Option<HashMap<String, String>>,
}

impl Announcement {
    /// Announcement with no display metadata. Lookup failures degrade to
    /// this rather than failing the dispatch.
    pub fn bare(channel_id: ChannelId, audio_url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel_id,
            audio_url: audio_url.into(),
            text: text.into(),
            user_name: None,
            user_picture: None,
            emotes: None,
        }
    }
}
