//! Authentication plugin traits.
//!
//! A MySQL server names the authentication plugin it expects during the
//! connection phase. This module defines the `AuthPlugin` trait the
//! connection layer uses to pick and describe the client side of a plugin.

/// Authentication method enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Kerberos/SPNEGO via GSSAPI or the Negotiate SSP.
    Kerberos,
    /// Password sent in clear text (only safe over TLS).
    ClearPassword,
}

impl AuthMethod {
    /// Check if this method negotiates a security context.
    #[must_use]
    pub fn is_kerberos(&self) -> bool {
        matches!(self, Self::Kerberos)
    }

    /// Check if this method puts the password on the wire.
    #[must_use]
    pub fn sends_password(&self) -> bool {
        matches!(self, Self::ClearPassword)
    }
}

/// Authentication data produced for the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthData {
    /// A security-context token for the server.
    Token(Vec<u8>),
    /// A clear-text password payload for the `mysql_clear_password` plugin.
    ClearPassword(Vec<u8>),
    /// Nothing to send this round.
    None,
}

impl AuthData {
    /// Get the bytes to write to the wire, if any.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Token(bytes) | Self::ClearPassword(bytes) => Some(bytes),
            Self::None => None,
        }
    }
}

/// Trait for client-side authentication plugins.
pub trait AuthPlugin {
    /// Plugin name as announced by the server.
    fn plugin_name(&self) -> &'static str;

    /// Get the authentication method this plugin uses.
    fn method(&self) -> AuthMethod;

    /// Check if the plugin may only run over an encrypted transport.
    fn requires_tls(&self) -> bool {
        self.method().sends_password()
    }
}
