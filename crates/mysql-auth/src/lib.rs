//! # mysql-auth
//!
//! Client-side Kerberos authentication for MySQL connections.
//!
//! This crate implements the `authentication_kerberos_client` plugin,
//! isolated from connection logic: the connection layer hands it the
//! server's authentication packets and writes back whatever it returns.
//!
//! ## Supported Authentication Methods
//!
//! | Method | Feature Flag | Description |
//! |--------|--------------|-------------|
//! | Kerberos (GSSAPI) | `integrated-auth` | MIT/Heimdal Kerberos, credential cache aware |
//! | Kerberos (SSPI) | `sspi-auth` | Negotiate package, logon session or explicit identity |
//! | Clear password | default | `mysql_clear_password` fallback, TLS only |
//!
//! The optional `zeroize` feature wipes passwords from memory on drop.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_auth::{InitialResponse, KerberosAuth, KerberosCredentials};
//!
//! let mut auth = KerberosAuth::native(KerberosCredentials::from_cache());
//!
//! let mut outcome = match auth.begin(Some(&server_packet))? {
//!     InitialResponse::Kerberos(outcome) => outcome,
//!     InitialResponse::PasswordFallback(payload) => return send(payload),
//! };
//! while !outcome.complete {
//!     send_opt(outcome.response)?;
//!     outcome = auth.continue_with(Some(&read_packet()?))?;
//! }
//! send_opt(outcome.response)?;
//! send(auth.close(&read_packet()?)?)?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod clear_password;
pub mod credentials;
pub mod error;
pub mod kerberos;
pub mod provider;

pub use clear_password::ClearPasswordAuth;
pub use credentials::{KerberosCredentials, Password};
pub use error::{AuthError, ErrorClass};
#[cfg(any(feature = "integrated-auth", feature = "sspi-auth"))]
pub use kerberos::Provider;
pub use kerberos::{
    AuthChallenge, CacheEnvironment, HandshakeOutcome, HandshakeState, InitialResponse,
    KerberosAuth, SecurityContext, SecurityProvider,
};
pub use provider::{AuthData, AuthMethod, AuthPlugin};
