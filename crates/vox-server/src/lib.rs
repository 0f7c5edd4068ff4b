//! # vox-server
//!
//! The connection hub and its HTTP/WebSocket surface:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `hub` | Single control-loop registry: register/unregister/lookup/broadcast |
//! | `session` | One live channel session: outbound queue, gateway lock, teardown |
//! | `ws` | WebSocket upgrade, liveness read loop, outbound write pump |
//! | `dispatch` | `POST /tts/{channel}`: auth, synthesis with retry-on-busy, broadcast |
//! | `auth` | HS256 trigger-token validation |
//! | `lookup` | Viewer profile / channel emote collaborators |
//! | `audio` | Audio retrieval boundary (`GET /play/{id}` backends) |
//! | `server` | Router assembly, `start()`, health and metrics endpoints |
//! | `metrics` | Prometheus recorder + metric name constants |
//!
//! ## Data flow
//!
//! trigger → `dispatch` → `hub` lookup → `session` synthesize (vox-broker) →
//! `hub` broadcast → session outbound queue → `ws` write pump → overlay.

#![deny(unsafe_code)]

pub mod audio;
pub mod auth;
pub mod dispatch;
pub mod hub;
pub mod lookup;
pub mod metrics;
pub mod server;
pub mod session;
pub mod ws;

pub use server::{start, AppState, ServerError, ServerHandle};
