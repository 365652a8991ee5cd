//! Credential resolution.
//!
//! Decides which credentials the security context is initiated with. The
//! credential cache is consulted first; when it holds a different identity
//! than the one requested, or its tickets have expired, and the caller
//! supplied a password, fresh credentials are acquired and written back to
//! the cache. Without a password, a missing or expired cache is terminal.

use std::fmt;
use std::time::Duration;

use crate::error::AuthError;
use crate::kerberos::ccache::{CacheEnvironment, CacheLocation};

/// A Kerberos principal split into user and realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    user: String,
    realm: Option<String>,
}

impl Principal {
    /// Create a principal from a user and an optional realm.
    pub fn new(user: impl Into<String>, realm: Option<&str>) -> Self {
        Self {
            user: user.into(),
            realm: realm.map(str::to_string),
        }
    }

    /// Parse an identity string, splitting at the first `@`.
    #[must_use]
    pub fn parse(identity: &str) -> Self {
        match identity.split_once('@') {
            Some((user, realm)) => Self::new(user, Some(realm)),
            None => Self::new(identity, None),
        }
    }

    /// Get the user part.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Get the realm part, if any.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.realm {
            Some(realm) => write!(f, "{}@{}", self.user, realm),
            None => f.write_str(&self.user),
        }
    }
}

/// Credentials read from the cache.
#[derive(Debug)]
pub struct CachedCredential<H> {
    /// Provider handle for the cached credentials.
    pub handle: H,
    /// Identity the credentials belong to.
    pub principal: Principal,
    /// Remaining lifetime; zero means expired.
    pub lifetime: Duration,
}

impl<H> CachedCredential<H> {
    /// Check if the cached tickets are no longer valid.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.lifetime.is_zero()
    }
}

/// Access to the local security subsystem's credentials.
///
/// Implementations map their native failures onto [`AuthError`]:
/// `cached` reports a missing or unreadable cache as
/// [`AuthError::CredentialsUnavailable`] and expired tickets as
/// [`AuthError::CredentialsExpired`]; `acquire_with_password` and `store`
/// report [`AuthError::AcquisitionFailure`].
pub trait CredentialSource {
    /// Native credential handle.
    type Handle;

    /// Read the initiator credentials held in the cache.
    fn cached(&self, location: &CacheLocation) -> Result<CachedCredential<Self::Handle>, AuthError>;

    /// Obtain fresh initiator credentials for `principal` using `password`.
    fn acquire_with_password(
        &self,
        principal: &Principal,
        password: &str,
    ) -> Result<Self::Handle, AuthError>;

    /// Store credentials into the cache as its default identity,
    /// overwriting whatever it held.
    fn store(&self, handle: &Self::Handle, location: &CacheLocation) -> Result<(), AuthError>;
}

/// What the caller asked to authenticate as.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRequest<'a> {
    /// Requested user, without realm.
    pub username: Option<&'a str>,
    /// Realm the server expects.
    pub realm: Option<&'a str>,
    /// Password for acquiring fresh credentials.
    pub password: Option<&'a str>,
}

/// Outcome of credential resolution.
#[derive(Debug)]
pub struct ResolvedCredentials<H> {
    /// Credentials to initiate the context with.
    pub handle: H,
    /// Identity the credentials belong to.
    pub principal: Principal,
    /// Whether the credentials were freshly acquired with the password.
    pub reacquired: bool,
}

impl<H> ResolvedCredentials<H> {
    /// Convert the handle, keeping the identity.
    pub fn map<T>(self, f: impl FnOnce(H) -> T) -> ResolvedCredentials<T> {
        ResolvedCredentials {
            handle: f(self.handle),
            principal: self.principal,
            reacquired: self.reacquired,
        }
    }
}

/// Resolves credentials against a [`CredentialSource`].
pub struct CredentialResolver<'a, S: ?Sized> {
    source: &'a S,
    env: &'a CacheEnvironment,
}

impl<'a, S: CredentialSource + ?Sized> CredentialResolver<'a, S> {
    /// Create a resolver over a source and an explicit environment.
    pub fn new(source: &'a S, env: &'a CacheEnvironment) -> Self {
        Self { source, env }
    }

    /// Resolve the credentials for one authentication attempt.
    pub fn resolve(
        &self,
        request: &IdentityRequest<'_>,
    ) -> Result<ResolvedCredentials<S::Handle>, AuthError> {
        let location = CacheLocation::resolve(self.env)?;

        let cached = match self.source.cached(&location) {
            Ok(cached) => cached,
            Err(err) if err.is_recoverable_with_password() => {
                tracing::debug!(error = %err, "no usable cached credentials");
                return match (request.username, request.password) {
                    (Some(user), Some(password)) => {
                        self.reacquire(Principal::new(user, request.realm), password, &location)
                    }
                    _ => Err(err),
                };
            }
            Err(err) => return Err(err),
        };

        tracing::debug!(principal = %cached.principal, "cached credentials found");

        let user_mismatch = request
            .username
            .is_some_and(|user| user != cached.principal.user());
        let realm_mismatch = match (request.realm, cached.principal.realm()) {
            (Some(requested), Some(cached_realm)) => requested != cached_realm,
            _ => false,
        };

        if user_mismatch || realm_mismatch || cached.is_expired() {
            let principal = Principal::new(
                request.username.unwrap_or(cached.principal.user()),
                request.realm.or(cached.principal.realm()),
            );

            if let Some(password) = request.password {
                tracing::debug!(
                    user_mismatch,
                    realm_mismatch,
                    expired = cached.is_expired(),
                    "cached credentials do not satisfy the request"
                );
                return self.reacquire(principal, password, &location);
            }

            if cached.is_expired() {
                return Err(AuthError::CredentialsExpired(format!(
                    "cached credentials for {} have expired",
                    cached.principal
                )));
            }

            tracing::warn!(
                cached = %cached.principal,
                requested = %principal,
                "cached identity differs from the requested one and no password was given; using cache"
            );
        }

        Ok(ResolvedCredentials {
            handle: cached.handle,
            principal: cached.principal,
            reacquired: false,
        })
    }

    fn reacquire(
        &self,
        principal: Principal,
        password: &str,
        location: &CacheLocation,
    ) -> Result<ResolvedCredentials<S::Handle>, AuthError> {
        tracing::debug!(principal = %principal, "acquiring credentials with provided password");

        let handle = self.source.acquire_with_password(&principal, password)?;
        self.source.store(&handle, location)?;

        tracing::debug!(principal = %principal, ccache = %location, "stored fresh credentials");

        Ok(ResolvedCredentials {
            handle,
            principal,
            reacquired: true,
        })
    }
}

/// Get the user to authenticate as when the caller named none.
///
/// This is the user of the cached default identity, or the operating-system
/// login name when the cache is empty or unreadable.
pub fn default_username<S: CredentialSource + ?Sized>(source: &S, env: &CacheEnvironment) -> String {
    CacheLocation::resolve(env)
        .and_then(|location| source.cached(&location))
        .map(|cached| cached.principal.user().to_string())
        .unwrap_or_else(|_| whoami::username())
}
