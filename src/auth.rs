//! Token-domain models: scope sets, claim metadata, and secret redaction.

pub mod metadata;
pub mod scope;
pub mod secret;

pub use metadata::*;
pub use scope::*;
pub use secret::*;
