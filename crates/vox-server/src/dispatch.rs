//! The dispatch boundary: turn an external "speak this" trigger into a
//! synthesis call and a hub broadcast.
//!
//! Owns the retry-on-busy policy. The gateway reports overload as the typed
//! [`SynthesisError::Busy`]; nothing here inspects error message text.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, info, warn};

use vox_core::announce::Announcement;
use vox_core::errors::SynthesisError;
use vox_core::ids::ChannelId;
use vox_settings::DispatchSettings;

use crate::auth::bearer_token;
use crate::metrics::DISPATCH_RETRIES_TOTAL;
use crate::server::AppState;
use crate::session::Session;

/// Bounded retry for worker-reported overload.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub attempts: u32,
    /// Fixed backoff between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self {
            attempts: settings.retry_attempts.max(1),
            backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TriggerForm {
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("missing or invalid authorization")]
    Unauthorized,
    #[error("channel {0:?} is offline")]
    ChannelOffline(ChannelId),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ChannelOffline(_) => StatusCode::NOT_FOUND,
            Self::Synthesis(err) => {
                warn!(error = %err, kind = err.error_kind(), "synthesis failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// `POST /tts/{channel}` — authorize, synthesize, announce.
///
/// The token's `channel_id` claim is authoritative for targeting; the path
/// segment exists for caller-side routing symmetry with the upgrade path.
pub async fn trigger_handler(
    State(state): State<AppState>,
    Path(_channel): Path<String>,
    headers: HeaderMap,
    Form(form): Form<TriggerForm>,
) -> Result<StatusCode, DispatchError> {
    let claims = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .and_then(|token| state.auth.decode(token))
        .ok_or(DispatchError::Unauthorized)?;

    let channel_id = ChannelId::from_raw(claims.channel_id);
    let Some(session) = state.hub.lookup(&channel_id).await else {
        debug!(channel = %channel_id, "trigger for offline channel");
        return Err(DispatchError::ChannelOffline(channel_id));
    };

    let audio_url = synthesize_with_retry(&session, &form.text, state.retry).await?;
    info!(channel = %channel_id, user = %claims.user_id, "synthesis complete");

    // Display metadata is decoration; lookup failures never fail the trigger.
    let profile = state.profiles.viewer_profile(&claims.user_id).await;
    let emotes = state.profiles.channel_emotes(channel_id.as_str()).await;

    let (user_name, user_picture) = match profile {
        Some(profile) => (Some(profile.display_name), profile.avatar_url),
        None => (None, None),
    };
    state
        .hub
        .broadcast(Announcement {
            channel_id,
            audio_url,
            text: form.text,
            user_name,
            user_picture,
            emotes,
        })
        .await;

    Ok(StatusCode::OK)
}

/// Synthesize with the bounded retry policy: only the typed `Busy` variant
/// is retried, after a fixed backoff; everything else surfaces immediately.
pub async fn synthesize_with_retry(
    session: &Arc<Session>,
    text: &str,
    policy: RetryPolicy,
) -> Result<String, SynthesisError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match session.synthesize(text).await {
            Ok(audio_url) => return Ok(audio_url),
            Err(err) if err.is_retryable() && attempt < policy.attempts => {
                counter!(DISPATCH_RETRIES_TOTAL).increment(1);
                debug!(attempt, max = policy.attempts, "worker busy, backing off");
                tokio::time::sleep(policy.backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
