use std::time::{Duration, Instant};

use futures::stream::BoxStream;
use futures::StreamExt;
use metrics::{counter, histogram};
use tracing::{debug, warn};
use uuid::Uuid;

use vox_core::errors::{BrokerError, SynthesisError};

use crate::channel::{
    BrokerChannel, Reply, RequestProperties, SynthesisReply, SynthesisRequest, ACTION_TTS,
    REASON_BUSY,
};

/// Parameters for one gateway, fixed at session setup.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Routing destination the worker consumes from.
    pub routing_key: String,
    /// Per-message expiration attached to each request.
    pub request_expiration_ms: u64,
    /// Overall deadline for one request/reply cycle.
    pub call_timeout: Duration,
    /// Base URL audio references are derived under.
    pub playback_base_url: String,
}

/// Performs a synchronous-looking synthesis call over the asynchronous
/// broker: publish with a fresh correlation id, await the correlated reply
/// on a dedicated subscription, enforce the call deadline, and tear the
/// subscription down unconditionally.
///
/// One gateway per session. The gateway itself is not re-entrant-safe by
/// contract; the owning session serializes calls behind its lock.
pub struct SynthesisGateway {
    channel: Box<dyn BrokerChannel>,
    config: GatewayConfig,
}

impl SynthesisGateway {
    pub fn new(channel: Box<dyn BrokerChannel>, config: GatewayConfig) -> Self {
        Self { channel, config }
    }

    /// Turn `text` into an audio URL via the remote synthesis worker.
    pub async fn synthesize(&self, text: &str) -> Result<String, SynthesisError> {
        let started = Instant::now();
        counter!("synthesis_requests_total").increment(1);

        let consumer_tag = format!("vox-reply-{}", Uuid::now_v7());
        let mut replies = self.channel.consume_replies(&consumer_tag).await?;

        let result = self.exchange(&mut replies, text).await;

        // Teardown runs on every exit path; a leaked subscription would let
        // the next call receive this call's late reply.
        if let Err(err) = self.channel.cancel_replies(&consumer_tag).await {
            warn!(error = %err, consumer_tag, "failed to cancel reply subscription");
        }

        histogram!("synthesis_request_duration_seconds").record(started.elapsed().as_secs_f64());
        if let Err(err) = &result {
            counter!("synthesis_errors_total", "error_type" => err.error_kind()).increment(1);
        }
        result
    }

    async fn exchange(
        &self,
        replies: &mut BoxStream<'static, Reply>,
        text: &str,
    ) -> Result<String, SynthesisError> {
        let correlation_id = Uuid::now_v7().to_string();
        let body = serde_json::to_vec(&SynthesisRequest {
            action: ACTION_TTS,
            text,
        })
        .map_err(|e| SynthesisError::PublishFailure(BrokerError::Publish(e.to_string())))?;

        let props = RequestProperties {
            routing_key: self.config.routing_key.clone(),
            correlation_id: correlation_id.clone(),
            reply_to: self.channel.reply_to().to_string(),
            expiration_ms: self.config.request_expiration_ms,
        };
        self.channel.publish(&props, &body).await?;
        debug!(correlation_id, "synthesis request published");

        let reply = match tokio::time::timeout(self.config.call_timeout, replies.next()).await {
            Ok(Some(reply)) => reply,
            // The subscription ended without a delivery: the broker went away.
            Ok(None) => return Err(SynthesisError::PublishFailure(BrokerError::Closed)),
            Err(_) => return Err(SynthesisError::Timeout(self.config.call_timeout)),
        };

        // The subscription is exclusive to this call, but validate anyway:
        // a mismatched id means the reply belongs to some other exchange.
        if reply.correlation_id.as_deref() != Some(correlation_id.as_str()) {
            return Err(SynthesisError::MalformedResponse(format!(
                "correlation id mismatch (expected {correlation_id}, got {:?})",
                reply.correlation_id
            )));
        }

        let decoded: SynthesisReply = serde_json::from_slice(&reply.body)
            .map_err(|e| SynthesisError::MalformedResponse(e.to_string()))?;

        if !decoded.success {
            return match decoded.reason.as_deref() {
                Some(REASON_BUSY) => Err(SynthesisError::Busy),
                reason => Err(SynthesisError::Rejected(
                    reason.unwrap_or("unspecified").to_string(),
                )),
            };
        }
        if decoded.audio_id.is_empty() {
            return Err(SynthesisError::MalformedResponse(
                "success reply without audio_id".into(),
            ));
        }

        Ok(format!(
            "{}/play/{}",
            self.config.playback_base_url.trim_end_matches('/'),
            decoded.audio_id
        ))
    }

    /// Close the underlying broker channel. Called once on session teardown.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.channel.close().await
    }
}
