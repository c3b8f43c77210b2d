pub mod config;
pub mod diagnostic;
pub mod redact;
pub mod types;

pub use config::Config;
pub use redact::{PositionalRule, RedactionRules, REDACTED};
pub use types::*;
