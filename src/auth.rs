//! Identity primitives: validated identifiers, redacted secrets, and credential records.

pub mod credential;
pub mod id;
pub mod secret;

pub use credential::*;
pub use id::*;
pub use secret::*;
