//! GSSAPI (MIT Kerberos / Heimdal) security provider.
//!
//! Used on Linux and macOS. Credentials come from the Kerberos credential
//! cache; when a password is supplied and the cache does not satisfy the
//! request, a fresh TGT is acquired and written back to the cache.
//!
//! ## Prerequisites
//!
//! - **Kerberos libraries**: libkrb5-dev (Debian/Ubuntu) or krb5-devel (RHEL/Fedora)
//! - **Valid ticket or password**: run `kinit user@REALM`, or pass a password
//! - **Service principal**: the MySQL server's SPN must exist in the KDC

use libgssapi::{
    context::{ClientCtx, CtxFlags, SecurityContext as GssSecurityContext},
    credential::{Cred, CredUsage},
    error::Error as GssError,
    name::Name,
    oid::{GSS_MECH_KRB5, GSS_NT_KRB5_PRINCIPAL, OidSet},
};

use crate::error::AuthError;
use crate::kerberos::ccache::{CCACHE_ENV_VAR, CacheEnvironment, CacheLocation};
use crate::kerberos::context::{
    ContextRequirements, ContextState, InitiatorCredential, SecurityContext, SecurityProvider,
    StepOutput, ensure_established,
};
use crate::kerberos::resolver::{
    CachedCredential, CredentialResolver, CredentialSource, IdentityRequest, Principal,
    ResolvedCredentials,
};

/// Mask selecting the routine error field of a GSSAPI major status.
const ROUTINE_ERROR_MASK: u32 = 0x00FF_0000;
/// `GSS_S_BAD_SIG` (also `GSS_S_BAD_MIC`), RFC 2744.
const GSS_S_BAD_SIG: u32 = 6 << 16;
/// `GSS_S_CREDENTIALS_EXPIRED`, RFC 2744.
const GSS_S_CREDENTIALS_EXPIRED: u32 = 11 << 16;

fn routine_error(err: &GssError) -> u32 {
    err.major.bits() & ROUTINE_ERROR_MASK
}

fn krb5_mechs() -> Result<OidSet, AuthError> {
    let mut mechs = OidSet::new()
        .map_err(|e| AuthError::SecurityContext(format!("failed to create OID set: {e}")))?;
    mechs
        .add(&GSS_MECH_KRB5)
        .map_err(|e| AuthError::SecurityContext(format!("failed to add Kerberos mechanism: {e}")))?;
    Ok(mechs)
}

/// Credential cache access through GSSAPI.
///
/// Reads go through GSSAPI's default ccache, which follows the process's
/// `KRB5CCNAME` and falls back to the per-uid file. A location derived from
/// any other environment cannot be read and is rejected.
#[derive(Debug, Clone)]
pub struct GssapiCredentialSource {
    process_env: CacheEnvironment,
}

impl GssapiCredentialSource {
    /// Create a source for the current process.
    #[must_use]
    pub fn new() -> Self {
        Self::with_process_environment(CacheEnvironment::from_process())
    }

    /// Create a source whose default ccache is derived from `process_env`.
    #[must_use]
    pub fn with_process_environment(process_env: CacheEnvironment) -> Self {
        Self { process_env }
    }

    /// Get the location GSSAPI reads cached credentials from.
    pub fn read_location(&self) -> Result<CacheLocation, AuthError> {
        CacheLocation::resolve(&self.process_env)
    }

    fn ensure_readable(&self, location: &CacheLocation) -> Result<(), AuthError> {
        let default = self.read_location()?;
        if *location == default {
            Ok(())
        } else {
            Err(AuthError::Configuration(format!(
                "credential cache {location} differs from the GSSAPI default {default}; \
                 set {CCACHE_ENV_VAR} in the process environment instead"
            )))
        }
    }
}

impl Default for GssapiCredentialSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialSource for GssapiCredentialSource {
    type Handle = Cred;

    fn cached(&self, location: &CacheLocation) -> Result<CachedCredential<Cred>, AuthError> {
        self.ensure_readable(location)?;
        let mechs = krb5_mechs()?;
        let cred = Cred::acquire(None, None, CredUsage::Initiate, Some(&mechs)).map_err(|e| {
            if routine_error(&e) == GSS_S_CREDENTIALS_EXPIRED {
                AuthError::CredentialsExpired(format!("credentials in {location} expired: {e}"))
            } else {
                AuthError::CredentialsUnavailable(format!("no credentials in {location}: {e}"))
            }
        })?;

        let info = cred.info().map_err(|e| {
            AuthError::CredentialsUnavailable(format!("unable to inspect cached credentials: {e}"))
        })?;

        Ok(CachedCredential {
            principal: Principal::parse(&info.name.to_string()),
            lifetime: info.lifetime,
            handle: cred,
        })
    }

    fn acquire_with_password(&self, principal: &Principal, password: &str) -> Result<Cred, AuthError> {
        let name = Name::new(principal.to_string().as_bytes(), Some(&GSS_NT_KRB5_PRINCIPAL))
            .map_err(|e| {
                AuthError::AcquisitionFailure(format!("invalid principal {principal}: {e}"))
            })?;
        let mechs = krb5_mechs()?;

        Cred::acquire_with_password(Some(&name), password, None, CredUsage::Initiate, Some(&mechs))
            .map_err(|e| {
                AuthError::AcquisitionFailure(format!(
                    "unable to acquire credentials for {principal}: {e}"
                ))
            })
    }

    fn store(&self, handle: &Cred, location: &CacheLocation) -> Result<(), AuthError> {
        self.ensure_readable(location)?;
        handle
            .store_into(
                &location.to_ccache_name(),
                true,
                true,
                CredUsage::Initiate,
                Some(&GSS_MECH_KRB5),
            )
            .map_err(|e| {
                AuthError::AcquisitionFailure(format!(
                    "unable to store credentials into {location}: {e}"
                ))
            })
    }
}

/// GSSAPI security provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct GssapiProvider;

impl GssapiProvider {
    /// Create the provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SecurityProvider for GssapiProvider {
    type Credential = Cred;
    type Context = GssapiContext;

    fn name(&self) -> &'static str {
        "gssapi"
    }

    fn resolve_credentials(
        &self,
        request: &IdentityRequest<'_>,
        env: &CacheEnvironment,
    ) -> Result<ResolvedCredentials<Cred>, AuthError> {
        CredentialResolver::new(&GssapiCredentialSource::new(), env).resolve(request)
    }

    fn initiate(
        &self,
        target: &str,
        credential: InitiatorCredential<'_, Cred>,
        requirements: ContextRequirements,
    ) -> Result<GssapiContext, AuthError> {
        let cred = match credential {
            InitiatorCredential::Resolved(cred) => Some(cred),
            InitiatorCredential::Default => None,
            InitiatorCredential::Embedded(_) => {
                return Err(AuthError::UnsupportedMethod(
                    "the GSSAPI provider does not accept embedded identities".into(),
                ));
            }
        };

        let name = Name::new(target.as_bytes(), Some(&GSS_NT_KRB5_PRINCIPAL)).map_err(|e| {
            AuthError::SecurityContext(format!("invalid service principal {target}: {e}"))
        })?;
        let target_name = name.canonicalize(Some(&GSS_MECH_KRB5)).map_err(|e| {
            AuthError::SecurityContext(format!("unable to canonicalize {target}: {e}"))
        })?;

        tracing::debug!(target = %target, ?requirements, "initiating GSSAPI context");

        Ok(GssapiContext {
            ctx: ClientCtx::new(cred, target_name, ctx_flags(requirements), Some(&GSS_MECH_KRB5)),
            state: ContextState::Uninitiated,
        })
    }
}

// There is no portable GSSAPI flag for extended errors; Kerberos reports
// KRB-ERROR tokens regardless.
fn ctx_flags(requirements: ContextRequirements) -> CtxFlags {
    let mut flags = CtxFlags::empty();
    if requirements.contains(ContextRequirements::MUTUAL_AUTH) {
        flags |= CtxFlags::GSS_C_MUTUAL_FLAG;
    }
    if requirements.contains(ContextRequirements::DELEGATE) {
        flags |= CtxFlags::GSS_C_DELEG_FLAG;
    }
    flags
}

/// A GSSAPI client security context.
pub struct GssapiContext {
    ctx: ClientCtx,
    state: ContextState,
}

impl std::fmt::Debug for GssapiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GssapiContext")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SecurityContext for GssapiContext {
    fn state(&self) -> ContextState {
        self.state
    }

    fn step(&mut self, input: Option<&[u8]>) -> Result<StepOutput, AuthError> {
        let token = self
            .ctx
            .step(input, None)
            .map_err(|e| AuthError::SecurityContext(format!("GSSAPI step failed: {e}")))?;

        let complete = self.ctx.is_complete();
        self.state = if complete {
            ContextState::Established
        } else {
            ContextState::Negotiating
        };

        Ok(StepOutput {
            token: token.map(|buf| buf.to_vec()),
            complete,
        })
    }

    fn wrap(&mut self, payload: &[u8], encrypt: bool) -> Result<Vec<u8>, AuthError> {
        ensure_established(self.state, "wrap")?;
        self.ctx
            .wrap(encrypt, payload)
            .map(|buf| buf.to_vec())
            .map_err(|e| AuthError::SecurityContext(format!("GSSAPI wrap failed: {e}")))
    }

    fn unwrap(&mut self, payload: &[u8]) -> Result<Vec<u8>, AuthError> {
        ensure_established(self.state, "unwrap")?;
        self.ctx.unwrap(payload).map(|buf| buf.to_vec()).map_err(|e| {
            if routine_error(&e) == GSS_S_BAD_SIG {
                AuthError::IntegrityCheck(format!("server message failed verification: {e}"))
            } else {
                AuthError::SecurityContext(format!("GSSAPI unwrap failed: {e}"))
            }
        })
    }
}
