//! Core types, schemas, and validation for the game event gateway.

pub mod error;
pub mod events;
pub mod limits;
pub mod sanitize;
pub mod schema;

pub use error::{Error, RejectionCode, Result};
pub use events::*;
pub use sanitize::sanitize_event;
pub use schema::{EventValidator, Severity, ValidationConfig, ValidationError, ValidationOutcome};
