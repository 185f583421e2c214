//! Authentication module.
//!
//! The backend trusts Telegram Mini App init data. `CredentialStore` keeps
//! that token in the OS keychain so every invocation can reuse it.

pub mod credentials;

pub use credentials::{CredentialStore, ENV_INIT_DATA};
