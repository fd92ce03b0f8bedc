//! HTTP handlers for the message API under `/api/v1`.
//!
//! The web layer is deliberately thin: ownership checks and input validation
//! here, all state transitions delegated to `actions` and all anchoring to
//! the background pipeline.

mod create_message;
mod destroy_message;
mod get_message;
mod list_messages;
mod mark_read;
mod revoke_message;
mod update_message;

pub use create_message::create_message;
pub use destroy_message::destroy_message;
pub use get_message::{get_message, get_message_content};
pub use list_messages::{list_messages, unread_messages};
pub use mark_read::mark_read;
pub use revoke_message::revoke_message;
pub use update_message::update_message;
