//! # parley-core
//!
//! Shared vocabulary for the parley real-time chat server.
//!
//! - Typed identifiers ([`UserId`], [`RoomId`], [`MessageId`], [`ConnectionId`])
//! - Inbound/outbound wire envelopes and the closed set of message kinds
//! - [`Event`] and its [`Audience`] rule
//! - The error taxonomy shared by the gate, router, handlers and dispatcher
//! - Collaborator traits implemented by persistence ([`AccountService`], [`ChatService`])
//! - `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod services;
pub mod wire;

pub use errors::{AuthError, DeliveryError, HandlerError, ServiceError};
pub use events::{Audience, Event};
pub use ids::{ConnectionId, MessageId, RoomId, UserId};
pub use services::{AccountService, ChatService};
pub use wire::MessageKind;
