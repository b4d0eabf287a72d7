//! # Data Transfer Objects (DTOs)
//!
//! Frames exchanged with browser clients over the chat WebSocket, plus the
//! JSON bodies of the small HTTP surface.

pub mod events;
pub mod users;

pub use events::*;
pub use users::*;
