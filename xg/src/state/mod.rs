//! State management
//!
//! StateManager is an actor that owns the SessionStore and serializes
//! all access to it through a command channel.

mod manager;
mod messages;

pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};
