//! SSPI Negotiate security provider.
//!
//! Used on Windows, through sspi-rs. Unlike GSSAPI there is no credential
//! cache to manage: either the logon session's credentials are used, or an
//! explicit user/realm/password triple is handed to the Negotiate package,
//! which obtains tickets itself.

use std::convert::Infallible;

use sspi::{
    AuthIdentity, BufferType, ClientRequestFlags, CredentialUse, Credentials, CredentialsBuffers,
    DataRepresentation, EncryptionFlags, ErrorKind, Negotiate, NegotiateConfig, SecurityBuffer,
    SecurityBufferRef, SecurityStatus, Sspi, SspiImpl, Username, ntlm::NtlmConfig,
};

use crate::error::AuthError;
use crate::kerberos::ccache::CacheEnvironment;
use crate::kerberos::context::{
    ContextRequirements, ContextState, InitiatorCredential, ProviderCapabilities, SecurityContext,
    SecurityProvider, StepOutput, ensure_established,
};
use crate::kerberos::resolver::{IdentityRequest, ResolvedCredentials};

/// Packages the Negotiate client may pick from.
const PACKAGE_LIST: &str = "kerberos,ntlm";

fn negotiate_config() -> NegotiateConfig {
    NegotiateConfig::new(
        Box::new(NtlmConfig::default()),
        Some(PACKAGE_LIST.to_string()),
        whoami::fallible::hostname().unwrap_or_default(),
    )
}

fn request_flags(requirements: ContextRequirements) -> ClientRequestFlags {
    let mut flags = ClientRequestFlags::empty();
    if requirements.contains(ContextRequirements::MUTUAL_AUTH) {
        flags |= ClientRequestFlags::MUTUAL_AUTH;
    }
    if requirements.contains(ContextRequirements::DELEGATE) {
        flags |= ClientRequestFlags::DELEGATE;
    }
    if requirements.contains(ContextRequirements::EXTENDED_ERROR) {
        flags |= ClientRequestFlags::EXTENDED_ERROR;
    }
    flags
}

/// SSPI Negotiate security provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct NegotiateProvider;

impl NegotiateProvider {
    /// Create the provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SecurityProvider for NegotiateProvider {
    type Credential = Infallible;
    type Context = NegotiateContext;

    fn name(&self) -> &'static str {
        "sspi-negotiate"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::EMBEDDED_IDENTITY
    }

    fn resolve_credentials(
        &self,
        _request: &IdentityRequest<'_>,
        _env: &CacheEnvironment,
    ) -> Result<ResolvedCredentials<Infallible>, AuthError> {
        Err(AuthError::UnsupportedMethod(
            "SSPI manages credentials itself; pass an embedded identity or use the logon session"
                .into(),
        ))
    }

    fn initiate(
        &self,
        target: &str,
        credential: InitiatorCredential<'_, Infallible>,
        requirements: ContextRequirements,
    ) -> Result<NegotiateContext, AuthError> {
        let mut negotiate = Negotiate::new_client(negotiate_config()).map_err(|e| {
            AuthError::SecurityContext(format!("failed to create Negotiate context: {e}"))
        })?;

        let identity = match credential {
            InitiatorCredential::Resolved(never) => match never {},
            InitiatorCredential::Default => None,
            InitiatorCredential::Embedded(identity) => {
                let username = Username::new(identity.user, identity.realm).map_err(|e| {
                    AuthError::Configuration(format!("invalid user {}: {e}", identity.user))
                })?;
                Some(Credentials::from(AuthIdentity {
                    username,
                    password: identity.password.to_string().into(),
                }))
            }
        };

        let acquired = {
            let mut builder = negotiate
                .acquire_credentials_handle()
                .with_credential_use(CredentialUse::Outbound);
            if let Some(ref creds) = identity {
                builder = builder.with_auth_data(creds);
            }
            builder.execute(&mut negotiate).map_err(|e| {
                AuthError::AcquisitionFailure(format!("failed to acquire SSPI credentials: {e}"))
            })?
        };

        tracing::debug!(
            target = %target,
            explicit_identity = identity.is_some(),
            ?requirements,
            "initiating SSPI Negotiate context"
        );

        Ok(NegotiateContext {
            negotiate,
            creds_handle: acquired.credentials_handle,
            target: target.to_string(),
            flags: request_flags(requirements),
            state: ContextState::Uninitiated,
            send_seq: 0,
            recv_seq: 0,
        })
    }
}

/// An SSPI Negotiate client security context.
pub struct NegotiateContext {
    negotiate: Negotiate,
    creds_handle: Option<CredentialsBuffers>,
    target: String,
    flags: ClientRequestFlags,
    state: ContextState,
    send_seq: u32,
    recv_seq: u32,
}

impl std::fmt::Debug for NegotiateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiateContext")
            .field("target", &self.target)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SecurityContext for NegotiateContext {
    fn state(&self) -> ContextState {
        self.state
    }

    fn step(&mut self, input: Option<&[u8]>) -> Result<StepOutput, AuthError> {
        let mut input_buffer =
            input.map(|token| vec![SecurityBuffer::new(token.to_vec(), BufferType::Token)]);
        let mut output_buffer = vec![SecurityBuffer::new(Vec::new(), BufferType::Token)];

        // Taken out for the call to avoid overlapping mutable borrows.
        let mut creds = self.creds_handle.take();

        let mut builder = self
            .negotiate
            .initialize_security_context()
            .with_credentials_handle(&mut creds)
            .with_context_requirements(self.flags)
            .with_target_data_representation(DataRepresentation::Network)
            .with_target_name(&self.target)
            .with_output(&mut output_buffer);
        if let Some(input) = input_buffer.as_mut() {
            builder = builder.with_input(input);
        }

        let result = self
            .negotiate
            .initialize_security_context_impl(&mut builder)
            .map_err(|e| AuthError::SecurityContext(format!("SSPI step failed: {e}")))?
            .resolve_to_result()
            .map_err(|e| AuthError::SecurityContext(format!("failed to resolve SSPI step: {e}")))?;

        self.creds_handle = creds;

        self.state = match result.status {
            SecurityStatus::Ok => ContextState::Established,
            SecurityStatus::ContinueNeeded => ContextState::Negotiating,
            status => {
                return Err(AuthError::SecurityContext(format!(
                    "unexpected SSPI status: {status:?}"
                )));
            }
        };

        let token = output_buffer
            .into_iter()
            .find(|b| b.buffer_type.buffer_type == BufferType::Token && !b.buffer.is_empty())
            .map(|b| b.buffer);

        Ok(StepOutput {
            token,
            complete: self.state == ContextState::Established,
        })
    }

    fn wrap(&mut self, payload: &[u8], encrypt: bool) -> Result<Vec<u8>, AuthError> {
        ensure_established(self.state, "wrap")?;

        let sizes = self
            .negotiate
            .query_context_sizes()
            .map_err(|e| AuthError::SecurityContext(format!("failed to query context sizes: {e}")))?;

        let mut token = vec![0u8; sizes.security_trailer as usize];
        let mut data = payload.to_vec();
        let flags = if encrypt {
            EncryptionFlags::empty()
        } else {
            EncryptionFlags::WRAP_NO_ENCRYPT
        };

        let mut message = [
            SecurityBufferRef::token_buf(token.as_mut_slice()),
            SecurityBufferRef::data_buf(data.as_mut_slice()),
        ];
        self.negotiate
            .encrypt_message(flags, &mut message, self.send_seq)
            .map_err(|e| AuthError::SecurityContext(format!("SSPI wrap failed: {e}")))?;
        self.send_seq = self.send_seq.wrapping_add(1);

        let mut wrapped = message[0].data().to_vec();
        wrapped.extend_from_slice(message[1].data());
        Ok(wrapped)
    }

    fn unwrap(&mut self, payload: &[u8]) -> Result<Vec<u8>, AuthError> {
        ensure_established(self.state, "unwrap")?;

        let mut buffer = payload.to_vec();
        let mut message = [
            SecurityBufferRef::stream_buf(&mut buffer),
            SecurityBufferRef::data_buf(&mut []),
        ];
        self.negotiate
            .decrypt_message(&mut message, self.recv_seq)
            .map_err(|e| {
                if e.error_type == ErrorKind::MessageAltered {
                    AuthError::IntegrityCheck(format!("server message failed verification: {e}"))
                } else {
                    AuthError::SecurityContext(format!("SSPI unwrap failed: {e}"))
                }
            })?;
        self.recv_seq = self.recv_seq.wrapping_add(1);

        Ok(message[1].data().to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_flags() {
        let flags = request_flags(ContextRequirements::HANDSHAKE);
        assert!(flags.contains(ClientRequestFlags::MUTUAL_AUTH));
        assert!(flags.contains(ClientRequestFlags::DELEGATE));
        assert!(flags.contains(ClientRequestFlags::EXTENDED_ERROR));
    }

    #[test]
    fn test_embeds_identity() {
        let provider = NegotiateProvider::new();
        assert!(
            provider
                .capabilities()
                .contains(ProviderCapabilities::EMBEDDED_IDENTITY)
        );
    }

    #[test]
    fn test_resolve_credentials_unsupported() {
        let env = CacheEnvironment::for_uid(1000);
        let err = NegotiateProvider::new()
            .resolve_credentials(&IdentityRequest::default(), &env)
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedMethod(_)));
    }
}
