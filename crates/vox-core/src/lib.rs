//! # vox-core
//!
//! Foundation types shared by every vox crate:
//!
//! - **Branded IDs**: [`ids::ChannelId`], [`ids::ConnectionId`]
//! - **Announcements**: [`announce::Announcement`], the message delivered to
//!   a channel's overlay connection
//! - **Errors**: [`errors::BrokerError`], [`errors::SynthesisError`],
//!   [`errors::SessionFault`]
//!
//! Foundation crate. Depended on by all other vox crates.

#![deny(unsafe_code)]

pub mod announce;
pub mod errors;
pub mod ids;
