use std::time::Duration;

/// Transport-level failures from the message broker binding.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connect(String),
    #[error("reply subscription failed: {0}")]
    Subscribe(String),
    #[error("publish rejected: {0}")]
    Publish(String),
    #[error("broker channel closed")]
    Closed,
}

/// Typed error hierarchy for the synthesis request/reply cycle.
///
/// Only [`SynthesisError::Busy`] is caller-retryable; the dispatch boundary
/// matches on the variant, never on rendered message text.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SynthesisError {
    /// No reply arrived on the dedicated subscription within the call deadline.
    #[error("no synthesis reply within {0:?}")]
    Timeout(Duration),
    /// The request never made it onto the broker.
    #[error("synthesis publish failure: {0}")]
    PublishFailure(#[from] BrokerError),
    /// The reply body could not be decoded, or its correlation id did not
    /// match the request's.
    #[error("malformed synthesis reply: {0}")]
    MalformedResponse(String),
    /// The worker reported transient overload.
    #[error("synthesis worker busy")]
    Busy,
    /// The worker rejected the request for a non-transient reason.
    #[error("synthesis rejected: {0}")]
    Rejected(String),
}

impl SynthesisError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Short classification string for logging/metrics labels.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::PublishFailure(_) => "publish_failure",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Busy => "busy",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Faults that terminate a single session.
///
/// Never surfaced to HTTP callers: both resolve to eviction of the offending
/// connection and leave every other session untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionFault {
    /// The outbound queue saturated because the transport could not keep pace.
    #[error("outbound queue saturated")]
    SlowConsumer,
    /// An inbound application payload arrived on a liveness-only transport.
    #[error("unexpected inbound payload")]
    ProtocolViolation,
}

impl SessionFault {
    /// Short classification string for logging/metrics labels.
    pub fn fault_kind(self) -> &'static str {
        match self {
            Self::SlowConsumer => "slow_consumer",
            Self::ProtocolViolation => "protocol_violation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_busy_is_retryable() {
        assert!(SynthesisError::Busy.is_retryable());
        assert!(!SynthesisError::Timeout(Duration::from_secs(300)).is_retryable());
        assert!(!SynthesisError::PublishFailure(BrokerError::Closed).is_retryable());
        assert!(!SynthesisError::MalformedResponse("bad json".into()).is_retryable());
        assert!(!SynthesisError::Rejected("text too long".into()).is_retryable());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(SynthesisError::Busy.error_kind(), "busy");
        assert_eq!(
            SynthesisError::Timeout(Duration::from_secs(1)).error_kind(),
            "timeout"
        );
        assert_eq!(
            SynthesisError::PublishFailure(BrokerError::Closed).error_kind(),
            "publish_failure"
        );
        assert_eq!(
            SynthesisError::MalformedResponse("x".into()).error_kind(),
            "malformed_response"
        );
        assert_eq!(SynthesisError::Rejected("x".into()).error_kind(), "rejected");
    }

    #[test]
    fn broker_error_converts_to_publish_failure() {
        let err: SynthesisError = BrokerError::Publish("nack".into()).into();
        assert!(matches!(err, SynthesisError::PublishFailure(_)));
    }

    #[test]
    fn fault_kind_strings() {
        assert_eq!(SessionFault::SlowConsumer.fault_kind(), "slow_consumer");
        assert_eq!(
            SessionFault::ProtocolViolation.fault_kind(),
            "protocol_violation"
        );
    }
}
