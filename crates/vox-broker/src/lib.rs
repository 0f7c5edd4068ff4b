//! # vox-broker
//!
//! The message-broker boundary: a [`channel::BrokerChannel`] seam over the
//! AMQP client, the [`gateway::SynthesisGateway`] that performs one
//! synchronous-looking request → correlated-reply → timeout cycle per call,
//! and a [`mock`] broker with scripted replies for tests.
//!
//! Each live session owns exactly one channel ([`amqp::LapinConnector`]
//! opens a dedicated connection + channel per session); serialization of
//! overlapping calls is the session's concern, not this crate's.

#![deny(unsafe_code)]

pub mod amqp;
pub mod channel;
pub mod gateway;
pub mod mock;

pub use amqp::LapinConnector;
pub use channel::{BrokerChannel, BrokerConnector, Reply, RequestProperties};
pub use gateway::{GatewayConfig, SynthesisGateway};
pub use mock::MockBroker;
