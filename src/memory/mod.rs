//! Conversation memory
//!
//! Bounded per-session history with idle expiry, owned by a single task.

pub mod session_store;
pub mod store;

pub use session_store::SessionStore;
pub use store::{ConversationMessage, MessageRole, Session};
