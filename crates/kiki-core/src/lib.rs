pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod markup;
pub mod notice;
pub mod status;
pub mod types;

pub use config::KikiConfig;
pub use error::{KikiError, Result, ValidationError};
pub use events::{DomainEvent, EventBus};
pub use markup::{render_answer, speakable_text, SanitizePolicy};
pub use notice::show_notice;
pub use status::with_rotating_status;
pub use types::*;
