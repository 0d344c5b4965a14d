//! Kiki chat crate - the persistent conversation.
//!
//! [`ConversationSession`] owns everything the chat page shows and publishes
//! each change as a domain event.

pub mod error;
pub mod session;
pub mod status;

pub use error::ChatError;
pub use session::{
    ConversationSession, Exchange, Selector, CLEAR_ALL_PROMPT, CONNECTION_ERROR_TEXT,
};
pub use status::{thinking_messages, upload_messages};
