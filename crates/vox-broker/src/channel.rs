use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use vox_core::errors::BrokerError;

/// One delivery from a reply subscription.
#[derive(Clone, Debug)]
pub struct Reply {
    /// Correlation id echoed by the worker, when present.
    pub correlation_id: Option<String>,
    /// Raw reply body.
    pub body: Vec<u8>,
}

/// Publication metadata for one synthesis request.
#[derive(Clone, Debug)]
pub struct RequestProperties {
    /// Well-known routing destination the worker consumes from.
    pub routing_key: String,
    /// Fresh per-request correlation id.
    pub correlation_id: String,
    /// Where the worker sends exactly one response.
    pub reply_to: String,
    /// Per-message expiration bound.
    pub expiration_ms: u64,
}

/// One broker channel, owned exclusively by one session.
///
/// The reply subscription opened by [`BrokerChannel::consume_replies`] is
/// scoped to a single call and must be cancelled after use; leaking it
/// across calls would let stale replies cross between requests.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// The broker-native reply address requests carry in `reply_to`.
    fn reply_to(&self) -> &str;

    /// Open a short-lived, auto-acknowledging reply subscription.
    async fn consume_replies(
        &self,
        consumer_tag: &str,
    ) -> Result<BoxStream<'static, Reply>, BrokerError>;

    /// Tear down a reply subscription opened by [`Self::consume_replies`].
    async fn cancel_replies(&self, consumer_tag: &str) -> Result<(), BrokerError>;

    /// Publish one request, marked persistent, with the given properties.
    async fn publish(&self, props: &RequestProperties, body: &[u8]) -> Result<(), BrokerError>;

    /// Close the channel and release its broker resources.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Opens one broker channel per accepted session.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError>;
}

/// Action tag the synthesis worker dispatches on.
pub const ACTION_TTS: &str = "tts";

/// Well-known `reason` value for worker-reported transient overload.
pub const REASON_BUSY: &str = "busy";

/// Request payload published to the worker.
#[derive(Debug, Serialize)]
pub struct SynthesisRequest<'a> {
    pub action: &'a str,
    pub text: &'a str,
}

/// Reply payload from the worker.
#[derive(Debug, Deserialize)]
pub struct SynthesisReply {
    pub success: bool,
    #[serde(default)]
    pub audio_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape() {
        let req = SynthesisRequest {
            action: ACTION_TTS,
            text: "hello chat",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"action": "tts", "text": "hello chat"}));
    }

    #[test]
    fn reply_decodes_success() {
        let reply: SynthesisReply =
            serde_json::from_str(r#"{"success": true, "audio_id": "a1b2"}"#).unwrap();
        assert!(reply.success);
        assert_eq!(reply.audio_id, "a1b2");
        assert!(reply.reason.is_none());
    }

    #[test]
    fn reply_decodes_failure_with_reason() {
        let reply: SynthesisReply =
            serde_json::from_str(r#"{"success": false, "reason": "busy"}"#).unwrap();
        assert!(!reply.success);
        assert_eq!(reply.reason.as_deref(), Some(REASON_BUSY));
        assert!(reply.audio_id.is_empty());
    }
}
