//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The server's authentication packet could not be parsed.
    #[error("invalid authentication data: {0}")]
    MalformedPacket(String),

    /// Invalid client configuration (e.g. an empty credential cache override).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No usable cached credentials were found.
    #[error("unable to retrieve cached credentials: {0}")]
    CredentialsUnavailable(String),

    /// The cached credentials have expired.
    #[error("credentials have expired: {0}")]
    CredentialsExpired(String),

    /// Acquiring credentials with the supplied password failed.
    #[error("unable to acquire credentials with the given password: {0}")]
    AcquisitionFailure(String),

    /// The security provider failed to negotiate the context.
    #[error("security context error: {0}")]
    SecurityContext(String),

    /// A protected message failed integrity verification.
    #[error("unable to unwrap server message: {0}")]
    IntegrityCheck(String),

    /// An operation was called out of handshake order.
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(String),

    /// Unsupported authentication method or backend.
    #[error("unsupported authentication method: {0}")]
    UnsupportedMethod(String),
}

/// Driver error class an authentication failure is reported as.
///
/// The connection layer raises authentication problems either as interface
/// errors (something went wrong talking to the server) or as programming
/// errors (the client was misconfigured or misused).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Failure in the exchange with the server.
    Interface,
    /// Misconfiguration or misuse on the client side.
    Programming,
}

impl AuthError {
    /// Check if this error can be recovered from by acquiring fresh
    /// credentials with a password.
    #[must_use]
    pub fn is_recoverable_with_password(&self) -> bool {
        matches!(
            self,
            Self::CredentialsUnavailable(_) | Self::CredentialsExpired(_)
        )
    }

    /// Check if this error always aborts the handshake.
    ///
    /// Retrying a failed cryptographic round cannot succeed without starting
    /// over, so everything except missing or expired credentials is fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable_with_password()
    }

    /// Get the driver error class for this error.
    #[must_use]
    pub fn error_class(&self) -> ErrorClass {
        match self {
            Self::Configuration(_)
            | Self::AcquisitionFailure(_)
            | Self::ProtocolMisuse(_)
            | Self::UnsupportedMethod(_) => ErrorClass::Programming,
            Self::MalformedPacket(_)
            | Self::CredentialsUnavailable(_)
            | Self::CredentialsExpired(_)
            | Self::SecurityContext(_)
            | Self::IntegrityCheck(_) => ErrorClass::Interface,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(AuthError::CredentialsUnavailable("none".into()).is_recoverable_with_password());
        assert!(AuthError::CredentialsExpired("old".into()).is_recoverable_with_password());
        assert!(AuthError::MalformedPacket("short".into()).is_fatal());
        assert!(AuthError::IntegrityCheck("bad mic".into()).is_fatal());
        assert!(AuthError::SecurityContext("step".into()).is_fatal());
    }

    #[test]
    fn test_error_class() {
        assert_eq!(
            AuthError::ProtocolMisuse("close".into()).error_class(),
            ErrorClass::Programming
        );
        assert_eq!(
            AuthError::AcquisitionFailure("bad password".into()).error_class(),
            ErrorClass::Programming
        );
        assert_eq!(
            AuthError::IntegrityCheck("bad mic".into()).error_class(),
            ErrorClass::Interface
        );
    }

    #[test]
    fn test_display_carries_diagnostic() {
        let err = AuthError::SecurityContext("KDC unreachable".into());
        assert_eq!(err.to_string(), "security context error: KDC unreachable");
    }
}
