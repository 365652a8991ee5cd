//! Kerberos/SPNEGO authentication (`authentication_kerberos_client`).
//!
//! The exchange is split into independent pieces:
//!
//! - [`packet`]: the server's service principal / realm packet
//! - [`ccache`]: where cached credentials live
//! - [`resolver`]: picking cached or freshly acquired credentials
//! - [`context`]: the security provider abstraction
//! - [`handshake`]: the state machine sequencing all of the above
//!
//! Native providers are behind features: `integrated-auth` for GSSAPI and
//! `sspi-auth` for the SSPI Negotiate package.

#[cfg(any(feature = "integrated-auth", feature = "sspi-auth"))]
pub mod backend;
pub mod ccache;
pub mod context;
#[cfg(feature = "integrated-auth")]
pub mod gssapi;
pub mod handshake;
#[cfg(feature = "sspi-auth")]
pub mod negotiate;
pub mod packet;
pub mod resolver;

#[cfg(any(feature = "integrated-auth", feature = "sspi-auth"))]
pub use backend::{Provider, ProviderContext, ProviderCredential};
pub use ccache::{CCACHE_ENV_VAR, CacheEnvironment, CacheLocation};
pub use context::{
    ContextRequirements, ContextState, EmbeddedIdentity, InitiatorCredential,
    ProviderCapabilities, SecurityContext, SecurityProvider, StepOutput,
};
#[cfg(feature = "integrated-auth")]
pub use gssapi::{GssapiContext, GssapiCredentialSource, GssapiProvider};
pub use handshake::{HandshakeOutcome, HandshakeState, InitialResponse, KerberosAuth, PLUGIN_NAME};
#[cfg(feature = "sspi-auth")]
pub use negotiate::{NegotiateContext, NegotiateProvider};
pub use packet::AuthChallenge;
pub use resolver::{
    CachedCredential, CredentialResolver, CredentialSource, IdentityRequest, Principal,
    ResolvedCredentials, default_username,
};
