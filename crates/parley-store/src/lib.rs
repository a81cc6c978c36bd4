//! # parley-store
//!
//! SQLite persistence behind the [`AccountService`](parley_core::AccountService)
//! and [`ChatService`](parley_core::ChatService) boundaries.

#![deny(unsafe_code)]

pub mod accounts;
pub mod database;
pub mod error;
pub mod friends;
pub mod messages;
pub mod rooms;
pub mod schema;
pub mod store;

pub use accounts::{AccountRepo, UserRow};
pub use database::Database;
pub use error::StoreError;
pub use friends::FriendRepo;
pub use messages::{MessageRepo, MessageRow};
pub use rooms::RoomRepo;
pub use store::ParleyStore;
