//! Credential types for authentication.

use std::borrow::Cow;

/// Identity supplied by the caller for Kerberos authentication.
///
/// Both parts are optional: without a username the identity in the
/// credential cache is used as-is, and without a password no fresh
/// credentials can be acquired.
#[derive(Clone, Default)]
pub struct KerberosCredentials {
    username: Option<Cow<'static, str>>,
    password: Option<Password>,
}

/// A password that never shows up in debug output.
///
/// With the `zeroize` feature the backing memory is wiped on drop.
#[derive(Clone)]
#[cfg_attr(feature = "zeroize", derive(zeroize::Zeroize, zeroize::ZeroizeOnDrop))]
pub struct Password(String);

impl Password {
    /// Create a password from a string.
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    /// Expose the password for handing it to the security provider.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl KerberosCredentials {
    /// Use whatever the credential cache holds.
    #[must_use]
    pub fn from_cache() -> Self {
        Self::default()
    }

    /// Authenticate as `username`, acquiring fresh credentials with
    /// `password` when the cache does not match.
    pub fn with_password(
        username: impl Into<Cow<'static, str>>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(Password::new(password)),
        }
    }

    /// Set the requested username.
    #[must_use]
    pub fn username(mut self, username: impl Into<Cow<'static, str>>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password used for credential acquisition.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Password::new(password));
        self
    }

    /// Get the requested username, if any.
    #[must_use]
    pub fn requested_user(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Get the password, if any.
    #[must_use]
    pub fn secret(&self) -> Option<&Password> {
        self.password.as_ref()
    }

    /// Check if a password was supplied.
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

impl std::fmt::Debug for KerberosCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose sensitive data in debug output
        f.debug_struct("KerberosCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let creds = KerberosCredentials::with_password("alice", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("alice"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_from_cache_is_empty() {
        let creds = KerberosCredentials::from_cache();
        assert!(creds.requested_user().is_none());
        assert!(!creds.has_password());
    }

    #[test]
    fn test_builder() {
        let creds = KerberosCredentials::from_cache().username("bob").password("pw");
        assert_eq!(creds.requested_user(), Some("bob"));
        assert_eq!(creds.secret().map(Password::expose), Some("pw"));
    }
}
