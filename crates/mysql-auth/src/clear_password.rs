//! `mysql_clear_password` authentication.
//!
//! Used as the fallback when the server does not announce a Kerberos
//! service principal. The password travels as-is, so the connection layer
//! must only send it over TLS.

use crate::provider::{AuthMethod, AuthPlugin};

/// Client side of the `mysql_clear_password` plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearPasswordAuth;

impl ClearPasswordAuth {
    /// Plugin name announced by the server.
    pub const PLUGIN_NAME: &'static str = "mysql_clear_password";

    /// Create a new clear-password authenticator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the auth response: the UTF-8 password terminated by a NUL byte.
    #[must_use]
    pub fn auth_response(&self, password: &str) -> Vec<u8> {
        let mut payload = Vec::with_capacity(password.len() + 1);
        payload.extend_from_slice(password.as_bytes());
        payload.push(0);

        tracing::debug!(
            payload_len = payload.len(),
            "building clear password auth response"
        );

        payload
    }
}

impl AuthPlugin for ClearPasswordAuth {
    fn plugin_name(&self) -> &'static str {
        Self::PLUGIN_NAME
    }

    fn method(&self) -> AuthMethod {
        AuthMethod::ClearPassword
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_nul_terminated() {
        let payload = ClearPasswordAuth::new().auth_response("secret");
        assert_eq!(payload, b"secret\0");
    }

    #[test]
    fn test_empty_password() {
        assert_eq!(ClearPasswordAuth::new().auth_response(""), vec![0]);
    }

    #[test]
    fn test_requires_tls() {
        let plugin = ClearPasswordAuth::new();
        assert_eq!(plugin.plugin_name(), "mysql_clear_password");
        assert!(plugin.requires_tls());
    }
}
