//! Shared helpers for Quarry: HTTP execution and response shaping, secret
//! redaction for logs, and the user preferences store.

pub mod http;
pub mod preferences;
pub mod redaction;

pub use http::*;
pub use preferences::{PreferencesError, UserPreferences};
pub use redaction::{redact_secret, redact_sensitive};
