//! Secret types for protecting credentials from accidental logging.
//!
//! Re-exports [`secrecy`] so every crate in the workspace wraps the provider
//! client secret and bearer tokens the same way. `SecretString` redacts
//! itself in `Debug`, so structs deriving `Debug` stay safe to log, and the
//! value must be read through [`ExposeSecret::expose_secret`].
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct AccountCredentials {
//!     client_id: String,
//!     client_secret: SecretString,
//! }
//!
//! let creds = AccountCredentials {
//!     client_id: "abc".to_string(),
//!     client_secret: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//! assert_eq!(creds.client_secret.expose_secret(), "s3cr3t");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
