//! Kiki wizard crate - query, then source, then answer.
//!
//! [`WizardFlow`] is shared by both flows; [`FileSource`] and [`UrlSource`]
//! supply the part that differs.

pub mod flow;
pub mod source;
pub mod state;

pub use flow::{WizardFlow, WizardResult, CONNECTION_FAILURE_TEXT};
pub use source::{FileSource, SourceStrategy, UrlSource};
pub use state::StageMachine;

/// Ask questions about an uploaded document.
pub type FileRagFlow = WizardFlow<FileSource>;

/// Ask questions about a web page.
pub type UrlRagFlow = WizardFlow<UrlSource>;
