//! Backend selection.
//!
//! [`Provider`] is a tagged union over the compiled-in security providers,
//! picked once at construction. It implements [`SecurityProvider`] by
//! dispatching to the selected backend, so the handshake controller is
//! written once against the trait.

#[cfg(feature = "integrated-auth")]
use libgssapi::credential::Cred;

use crate::error::AuthError;
use crate::kerberos::ccache::CacheEnvironment;
use crate::kerberos::context::{
    ContextRequirements, ContextState, InitiatorCredential, ProviderCapabilities, SecurityContext,
    SecurityProvider, StepOutput,
};
#[cfg(feature = "integrated-auth")]
use crate::kerberos::gssapi::{GssapiContext, GssapiProvider};
#[cfg(feature = "sspi-auth")]
use crate::kerberos::negotiate::{NegotiateContext, NegotiateProvider};
use crate::kerberos::resolver::{IdentityRequest, ResolvedCredentials};

/// A compiled-in security provider.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub enum Provider {
    /// GSSAPI with the Kerberos 5 mechanism.
    #[cfg(feature = "integrated-auth")]
    Gssapi(GssapiProvider),
    /// The SSPI Negotiate package.
    #[cfg(feature = "sspi-auth")]
    Negotiate(NegotiateProvider),
}

impl Provider {
    /// Get the native provider for this platform.
    ///
    /// Negotiate on Windows, GSSAPI elsewhere. When only one backend is
    /// compiled in, that backend is returned.
    #[must_use]
    #[allow(clippy::needless_return)]
    pub fn platform_default() -> Self {
        #[cfg(all(windows, feature = "sspi-auth"))]
        return Self::Negotiate(NegotiateProvider::new());

        #[cfg(all(not(all(windows, feature = "sspi-auth")), feature = "integrated-auth"))]
        return Self::Gssapi(GssapiProvider::new());

        #[cfg(all(
            not(windows),
            not(feature = "integrated-auth"),
            feature = "sspi-auth"
        ))]
        return Self::Negotiate(NegotiateProvider::new());
    }

    /// Select a backend by name (`"gssapi"` or `"sspi"`).
    pub fn by_name(name: &str) -> Result<Self, AuthError> {
        match name {
            #[cfg(feature = "integrated-auth")]
            "gssapi" => Ok(Self::Gssapi(GssapiProvider::new())),
            #[cfg(feature = "sspi-auth")]
            "sspi" => Ok(Self::Negotiate(NegotiateProvider::new())),
            other => Err(AuthError::UnsupportedMethod(format!(
                "security provider '{other}' is not available in this build"
            ))),
        }
    }
}

/// Credentials resolved by a [`Provider`].
///
/// Only GSSAPI resolves credentials separately; Negotiate acquires its own
/// at initiate time.
#[derive(Debug)]
#[non_exhaustive]
pub enum ProviderCredential {
    /// A GSSAPI credential handle.
    #[cfg(feature = "integrated-auth")]
    Gssapi(Cred),
}

/// A security context created by a [`Provider`].
#[derive(Debug)]
pub enum ProviderContext {
    /// A GSSAPI context.
    #[cfg(feature = "integrated-auth")]
    Gssapi(GssapiContext),
    /// An SSPI Negotiate context.
    #[cfg(feature = "sspi-auth")]
    Negotiate(NegotiateContext),
}

impl SecurityContext for ProviderContext {
    fn state(&self) -> ContextState {
        match self {
            #[cfg(feature = "integrated-auth")]
            Self::Gssapi(ctx) => ctx.state(),
            #[cfg(feature = "sspi-auth")]
            Self::Negotiate(ctx) => ctx.state(),
        }
    }

    fn step(&mut self, input: Option<&[u8]>) -> Result<StepOutput, AuthError> {
        match self {
            #[cfg(feature = "integrated-auth")]
            Self::Gssapi(ctx) => ctx.step(input),
            #[cfg(feature = "sspi-auth")]
            Self::Negotiate(ctx) => ctx.step(input),
        }
    }

    fn wrap(&mut self, payload: &[u8], encrypt: bool) -> Result<Vec<u8>, AuthError> {
        match self {
            #[cfg(feature = "integrated-auth")]
            Self::Gssapi(ctx) => ctx.wrap(payload, encrypt),
            #[cfg(feature = "sspi-auth")]
            Self::Negotiate(ctx) => ctx.wrap(payload, encrypt),
        }
    }

    fn unwrap(&mut self, payload: &[u8]) -> Result<Vec<u8>, AuthError> {
        match self {
            #[cfg(feature = "integrated-auth")]
            Self::Gssapi(ctx) => ctx.unwrap(payload),
            #[cfg(feature = "sspi-auth")]
            Self::Negotiate(ctx) => ctx.unwrap(payload),
        }
    }
}

impl SecurityProvider for Provider {
    type Credential = ProviderCredential;
    type Context = ProviderContext;

    fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "integrated-auth")]
            Self::Gssapi(p) => p.name(),
            #[cfg(feature = "sspi-auth")]
            Self::Negotiate(p) => p.name(),
        }
    }

    fn capabilities(&self) -> ProviderCapabilities {
        match self {
            #[cfg(feature = "integrated-auth")]
            Self::Gssapi(p) => p.capabilities(),
            #[cfg(feature = "sspi-auth")]
            Self::Negotiate(p) => p.capabilities(),
        }
    }

    fn resolve_credentials(
        &self,
        request: &IdentityRequest<'_>,
        env: &CacheEnvironment,
    ) -> Result<ResolvedCredentials<ProviderCredential>, AuthError> {
        match self {
            #[cfg(feature = "integrated-auth")]
            Self::Gssapi(p) => p
                .resolve_credentials(request, env)
                .map(|resolved| resolved.map(ProviderCredential::Gssapi)),
            #[cfg(feature = "sspi-auth")]
            Self::Negotiate(p) => p
                .resolve_credentials(request, env)
                .map(|resolved| resolved.map(|never| match never {})),
        }
    }

    fn initiate(
        &self,
        target: &str,
        credential: InitiatorCredential<'_, ProviderCredential>,
        requirements: ContextRequirements,
    ) -> Result<ProviderContext, AuthError> {
        match self {
            #[cfg(feature = "integrated-auth")]
            Self::Gssapi(p) => {
                let credential = match credential {
                    InitiatorCredential::Resolved(ProviderCredential::Gssapi(cred)) => {
                        InitiatorCredential::Resolved(cred)
                    }
                    InitiatorCredential::Embedded(identity) => {
                        InitiatorCredential::Embedded(identity)
                    }
                    InitiatorCredential::Default => InitiatorCredential::Default,
                };
                p.initiate(target, credential, requirements)
                    .map(ProviderContext::Gssapi)
            }
            #[cfg(feature = "sspi-auth")]
            Self::Negotiate(p) => {
                let credential = match credential {
                    InitiatorCredential::Resolved(_) => {
                        return Err(AuthError::UnsupportedMethod(
                            "the Negotiate provider cannot use credentials resolved by another backend"
                                .into(),
                        ));
                    }
                    InitiatorCredential::Embedded(identity) => {
                        InitiatorCredential::Embedded(identity)
                    }
                    InitiatorCredential::Default => InitiatorCredential::Default,
                };
                p.initiate(target, credential, requirements)
                    .map(ProviderContext::Negotiate)
            }
        }
    }
}
