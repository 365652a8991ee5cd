//! Security context provider abstraction.
//!
//! A provider turns a target principal and initiator credentials into a
//! [`SecurityContext`], which is then stepped with the server's tokens until
//! it is established. Only an established context can protect messages.
//!
//! ```text
//! Uninitiated --step--> Negotiating --step--> ... --step--> Established
//! ```

use bitflags::bitflags;

use crate::error::AuthError;
use crate::kerberos::ccache::CacheEnvironment;
use crate::kerberos::resolver::{IdentityRequest, ResolvedCredentials};

bitflags! {
    /// Guarantees requested from the security context.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContextRequirements: u32 {
        /// The server must prove its identity too.
        const MUTUAL_AUTH = 0x01;
        /// Credentials may be delegated to the server.
        const DELEGATE = 0x02;
        /// Report errors to the peer with extended error tokens.
        const EXTENDED_ERROR = 0x04;
    }
}

impl ContextRequirements {
    /// Requirements of the MySQL Kerberos handshake.
    pub const HANDSHAKE: Self = Self::MUTUAL_AUTH
        .union(Self::EXTENDED_ERROR)
        .union(Self::DELEGATE);
}

bitflags! {
    /// Optional behaviour a provider supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProviderCapabilities: u32 {
        /// A username/realm/password triple can be passed straight to
        /// `initiate`, replacing credential resolution.
        const EMBEDDED_IDENTITY = 0x01;
    }
}

/// Negotiation progress of a security context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created but not stepped yet.
    Uninitiated,
    /// At least one token exchanged, more needed.
    Negotiating,
    /// Negotiation finished; messages can be wrapped and unwrapped.
    Established,
}

/// Result of one negotiation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// Token to send to the server, if the step produced one.
    pub token: Option<Vec<u8>>,
    /// Whether the context is now established.
    pub complete: bool,
}

/// Identity passed directly to a provider with
/// [`ProviderCapabilities::EMBEDDED_IDENTITY`].
#[derive(Clone, Copy)]
pub struct EmbeddedIdentity<'a> {
    /// User name without realm.
    pub user: &'a str,
    /// Realm (domain) of the user, if the server named one.
    pub realm: Option<&'a str>,
    /// Password of the user.
    pub password: &'a str,
}

impl std::fmt::Debug for EmbeddedIdentity<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedIdentity")
            .field("user", &self.user)
            .field("realm", &self.realm)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Credentials a context is initiated with.
#[derive(Debug)]
pub enum InitiatorCredential<'a, C> {
    /// Credentials produced by the credential resolver.
    Resolved(C),
    /// An identity the provider acquires credentials for itself.
    Embedded(EmbeddedIdentity<'a>),
    /// The provider's default credentials (e.g. the logon session).
    Default,
}

/// A security context being negotiated or established.
pub trait SecurityContext {
    /// Current negotiation state.
    fn state(&self) -> ContextState;

    /// Check if the context is established.
    fn is_complete(&self) -> bool {
        self.state() == ContextState::Established
    }

    /// Advance negotiation by one round.
    ///
    /// `input` is the server's last token, absent on the first round.
    fn step(&mut self, input: Option<&[u8]>) -> Result<StepOutput, AuthError>;

    /// Protect an outgoing message. Only valid once established.
    fn wrap(&mut self, payload: &[u8], encrypt: bool) -> Result<Vec<u8>, AuthError>;

    /// Verify and strip protection from an incoming message. Only valid once
    /// established; a failed integrity check is
    /// [`AuthError::IntegrityCheck`].
    fn unwrap(&mut self, payload: &[u8]) -> Result<Vec<u8>, AuthError>;
}

/// A backend able to create security contexts.
pub trait SecurityProvider {
    /// Resolved credential handle.
    type Credential;
    /// Context type created by `initiate`.
    type Context: SecurityContext;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Optional behaviour supported by this backend.
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::empty()
    }

    /// Resolve cached or password-acquired credentials.
    fn resolve_credentials(
        &self,
        request: &IdentityRequest<'_>,
        env: &CacheEnvironment,
    ) -> Result<ResolvedCredentials<Self::Credential>, AuthError>;

    /// Create a fresh, uninitiated context targeting `target`.
    fn initiate(
        &self,
        target: &str,
        credential: InitiatorCredential<'_, Self::Credential>,
        requirements: ContextRequirements,
    ) -> Result<Self::Context, AuthError>;
}

/// Fail with [`AuthError::ProtocolMisuse`] unless the context is established.
pub(crate) fn ensure_established(state: ContextState, operation: &str) -> Result<(), AuthError> {
    if state == ContextState::Established {
        Ok(())
    } else {
        Err(AuthError::ProtocolMisuse(format!(
            "cannot {operation} before the security context is established (state: {state:?})"
        )))
    }
}
