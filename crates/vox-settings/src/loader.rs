use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::SettingsError;
use crate::types::{LookupSettings, VoxSettings};

/// Path to the settings file: `VOX_SETTINGS` or `./vox.settings.json`.
pub fn settings_path() -> PathBuf {
    std::env::var("VOX_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("vox.settings.json"))
}

/// Recursively merge `overlay` into `base`. Objects merge key-by-key;
/// any other overlay value replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Load settings from the default path with `VOX_*` env overrides applied.
/// A missing file yields compiled defaults, not an error.
pub fn load_settings() -> Result<VoxSettings, SettingsError> {
    let mut settings = load_settings_from_path(&settings_path())?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

/// Load settings from a specific file path, deep-merged over defaults.
/// Env overrides are NOT applied here; [`load_settings`] layers them on top.
pub fn load_settings_from_path(path: &Path) -> Result<VoxSettings, SettingsError> {
    let defaults = serde_json::to_value(VoxSettings::default())?;
    let merged = if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let file_value: Value = serde_json::from_str(&raw)?;
        deep_merge(defaults, file_value)
    } else {
        tracing::debug!(?path, "no settings file, using defaults");
        defaults
    };
    Ok(serde_json::from_value(merged)?)
}

/// Apply `VOX_*` overrides. `lookup` abstracts `std::env::var` so tests can
/// drive this without mutating process state.
pub fn apply_env_overrides(
    settings: &mut VoxSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(bind) = lookup("VOX_BIND") {
        settings.server.bind = bind;
    }
    if let Some(url) = lookup("VOX_PUBLIC_URL") {
        settings.server.public_url = url;
    }
    if let Some(url) = lookup("VOX_BROKER_URL") {
        settings.broker.url = url;
    }
    if let Some(key) = lookup("VOX_ROUTING_KEY") {
        settings.broker.routing_key = key;
    }
    if let Some(secret) = lookup("VOX_JWT_SECRET") {
        settings.auth.jwt_secret = secret;
    }
    if let Some(url) = lookup("VOX_AUDIO_STORE_URL") {
        settings.audio.store_url = Some(url);
    }
    if let (Some(users), Some(emotes)) = (lookup("VOX_USERS_URL"), lookup("VOX_EMOTES_URL")) {
        settings.lookups = Some(LookupSettings {
            users_url: users,
            emotes_url: emotes,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn deep_merge_objects() {
        let base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
        let overlay = serde_json::json!({"a": {"y": 20}, "c": 4});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["a"]["x"], 1);
        assert_eq!(merged["a"]["y"], 20);
        assert_eq!(merged["b"], 3);
        assert_eq!(merged["c"], 4);
    }

    #[test]
    fn deep_merge_scalar_replaces() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": "two"}));
        assert_eq!(merged["a"], "two");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/vox.json")).unwrap();
        assert_eq!(settings.server.bind, "0.0.0.0:7001");
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vox.settings.json");
        std::fs::write(&path, r#"{"broker": {"routingKey": "speak.requests"}}"#).unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.broker.routing_key, "speak.requests");
        // Untouched defaults preserved by the merge.
        assert_eq!(settings.broker.request_expiration_ms, 60_000);
        assert_eq!(settings.server.bind, "0.0.0.0:7001");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vox.settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn env_overrides_take_priority() {
        let mut env = HashMap::new();
        let _ = env.insert("VOX_BIND".to_string(), "127.0.0.1:9000".to_string());
        let _ = env.insert("VOX_JWT_SECRET".to_string(), "c2VjcmV0".to_string());
        let _ = env.insert("VOX_AUDIO_STORE_URL".to_string(), "http://store:8080".to_string());

        let mut settings = VoxSettings::default();
        apply_env_overrides(&mut settings, |name| env.get(name).cloned());

        assert_eq!(settings.server.bind, "127.0.0.1:9000");
        assert_eq!(settings.auth.jwt_secret, "c2VjcmV0");
        assert_eq!(settings.audio.store_url.as_deref(), Some("http://store:8080"));
    }

    #[test]
    fn lookup_override_requires_both_urls() {
        let mut env = HashMap::new();
        let _ = env.insert("VOX_USERS_URL".to_string(), "http://id/users/{id}".to_string());

        let mut settings = VoxSettings::default();
        apply_env_overrides(&mut settings, |name| env.get(name).cloned());
        assert!(settings.lookups.is_none());

        let _ = env.insert("VOX_EMOTES_URL".to_string(), "http://id/emotes/{id}".to_string());
        apply_env_overrides(&mut settings, |name| env.get(name).cloned());
        assert_eq!(
            settings.lookups,
            Some(LookupSettings {
                users_url: "http://id/users/{id}".into(),
                emotes_url: "http://id/emotes/{id}".into(),
            })
        );
    }
}
