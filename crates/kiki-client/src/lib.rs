//! Kiki client crate - the assistant server's HTTP API.
//!
//! [`Backend`] is the seam every state machine talks through.
//! [`HttpBackend`] speaks the real wire format; [`mock::MockBackend`] answers
//! from a script for tests.

pub mod backend;
pub mod error;
pub mod http;
pub mod mock;

pub use backend::{Backend, HealthStatus};
pub use error::ClientError;
pub use http::HttpBackend;
