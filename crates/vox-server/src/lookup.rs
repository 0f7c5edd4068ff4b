//! Viewer profile and channel emote lookups.
//!
//! External collaborators consulted after a synthesis call succeeds, purely
//! to decorate the announcement. Every failure degrades to `None`; a missing
//! avatar never fails a dispatch.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use vox_settings::LookupSettings;

/// Display metadata for the viewer who triggered an announcement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewerProfile {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Best-effort lookups against external profile/emote collaborators.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn viewer_profile(&self, user_id: &str) -> Option<ViewerProfile>;

    /// Channel emote map, `code -> emote id`.
    async fn channel_emotes(&self, channel_id: &str) -> Option<HashMap<String, String>>;
}

/// Lookups disabled; announcements carry no display metadata.
pub struct NoLookup;

#[async_trait]
impl ProfileLookup for NoLookup {
    async fn viewer_profile(&self, _user_id: &str) -> Option<ViewerProfile> {
        None
    }

    async fn channel_emotes(&self, _channel_id: &str) -> Option<HashMap<String, String>> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    display_name: String,
    #[serde(default)]
    profile_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmotesPayload {
    emotes: Vec<EmoteEntry>,
}

#[derive(Debug, Deserialize)]
struct EmoteEntry {
    code: String,
    id: String,
}

/// HTTP-backed lookups. Endpoint templates carry an `{id}` placeholder.
pub struct HttpProfileLookup {
    client: reqwest::Client,
    users_url: String,
    emotes_url: String,
}

impl HttpProfileLookup {
    pub fn new(settings: &LookupSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            users_url: settings.users_url.clone(),
            emotes_url: settings.emotes_url.clone(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Option<T> {
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => match response.json::<T>().await {
                Ok(payload) => Some(payload),
                Err(err) => {
                    debug!(url, error = %err, "lookup payload undecodable");
                    None
                }
            },
            Ok(response) => {
                debug!(url, status = %response.status(), "lookup miss");
                None
            }
            Err(err) => {
                debug!(url, error = %err, "lookup unreachable");
                None
            }
        }
    }
}

#[async_trait]
impl ProfileLookup for HttpProfileLookup {
    async fn viewer_profile(&self, user_id: &str) -> Option<ViewerProfile> {
        let url = self.users_url.replace("{id}", user_id);
        let payload: UserPayload = self.get_json(&url).await?;
        Some(ViewerProfile {
            display_name: payload.display_name,
            avatar_url: payload.profile_image_url,
        })
    }

    async fn channel_emotes(&self, channel_id: &str) -> Option<HashMap<String, String>> {
        let url = self.emotes_url.replace("{id}", channel_id);
        let payload: EmotesPayload = self.get_json(&url).await?;
        Some(
            payload
                .emotes
                .into_iter()
                .map(|entry| (entry.code, entry.id))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lookup_for(server: &MockServer) -> HttpProfileLookup {
        HttpProfileLookup::new(&LookupSettings {
            users_url: format!("{}/users/{{id}}", server.uri()),
            emotes_url: format!("{}/emotes/{{id}}", server.uri()),
        })
    }

    #[tokio::test]
    async fn viewer_profile_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/661856691"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "display_name": "monique",
                "profile_image_url": "https://cdn.example/monique.png"
            })))
            .mount(&server)
            .await;

        let profile = lookup_for(&server).viewer_profile("661856691").await.unwrap();
        assert_eq!(
            profile,
            ViewerProfile {
                display_name: "monique".into(),
                avatar_url: Some("https://cdn.example/monique.png".into()),
            }
        );
    }

    #[tokio::test]
    async fn viewer_profile_miss_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(lookup_for(&server).viewer_profile("nobody").await.is_none());
    }

    #[tokio::test]
    async fn emotes_collect_into_code_map() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/emotes/551257512"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "emotes": [
                    {"code": "Kappa", "id": "e1"},
                    {"code": "PogChamp", "id": "e2"}
                ]
            })))
            .mount(&server)
            .await;

        let emotes = lookup_for(&server).channel_emotes("551257512").await.unwrap();
        assert_eq!(emotes.len(), 2);
        assert_eq!(emotes.get("Kappa").map(String::as_str), Some("e1"));
        assert_eq!(emotes.get("PogChamp").map(String::as_str), Some("e2"));
    }

    #[tokio::test]
    async fn undecodable_payload_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        assert!(lookup_for(&server).viewer_profile("u").await.is_none());
        assert!(lookup_for(&server).channel_emotes("c").await.is_none());
    }

    #[tokio::test]
    async fn no_lookup_returns_nothing() {
        assert!(NoLookup.viewer_profile("u").await.is_none());
        assert!(NoLookup.channel_emotes("c").await.is_none());
    }
}
