//! Kerberos handshake controller.
//!
//! Drives one `authentication_kerberos_client` exchange. The connection
//! layer calls [`KerberosAuth::begin`] with the server's first
//! authentication-data packet, [`KerberosAuth::continue_with`] for every
//! further server token while negotiation is incomplete, and finally
//! [`KerberosAuth::close`] with the server's protected closing message.
//!
//! ```text
//! Start --begin--> AwaitingChallenge --> Negotiating --continue_with--> ... --> Established
//!   |                                         \________(first step completes)______/ |
//!   | (no service principal)                                                        close
//!   v                                                                                 v
//! password fallback                                                                Closed
//! ```
//!
//! Any error except an out-of-order call moves the controller to `Failed`,
//! from which nothing can be resumed; start a new exchange instead.

use crate::clear_password::ClearPasswordAuth;
use crate::credentials::{KerberosCredentials, Password};
use crate::error::AuthError;
use crate::kerberos::ccache::CacheEnvironment;
use crate::kerberos::context::{
    ContextRequirements, EmbeddedIdentity, InitiatorCredential, ProviderCapabilities,
    SecurityContext, SecurityProvider, StepOutput,
};
use crate::kerberos::packet::AuthChallenge;
use crate::kerberos::resolver::IdentityRequest;
use crate::provider::{AuthData, AuthMethod, AuthPlugin};

/// Plugin name the server announces for Kerberos authentication.
pub const PLUGIN_NAME: &str = "authentication_kerberos_client";

/// Closing message payload: security level 1, no maximum message size.
const CLOSING_MESSAGE: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Position of the controller in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing received yet.
    Start,
    /// The first packet is being processed.
    AwaitingChallenge,
    /// Tokens are being exchanged.
    Negotiating,
    /// The security context is established; only `close` remains.
    Established,
    /// The exchange finished.
    Closed,
    /// The exchange failed and cannot continue.
    Failed,
}

/// Result of one negotiation round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// Bytes to send to the server, if any.
    pub response: Option<Vec<u8>>,
    /// Whether the security context is now established.
    pub complete: bool,
}

impl HandshakeOutcome {
    /// Convert into the data the connection layer writes.
    #[must_use]
    pub fn into_auth_data(self) -> AuthData {
        match self.response {
            Some(token) => AuthData::Token(token),
            None => AuthData::None,
        }
    }
}

/// Response to the server's first packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialResponse {
    /// Kerberos negotiation started.
    Kerberos(HandshakeOutcome),
    /// The server named no service principal; send this
    /// `mysql_clear_password` payload instead. Only safe over TLS.
    PasswordFallback(Vec<u8>),
}

impl InitialResponse {
    /// Check if the exchange fell back to the clear-text password plugin.
    #[must_use]
    pub fn is_password_fallback(&self) -> bool {
        matches!(self, Self::PasswordFallback(_))
    }

    /// Convert into the data the connection layer writes.
    #[must_use]
    pub fn into_auth_data(self) -> AuthData {
        match self {
            Self::Kerberos(outcome) => outcome.into_auth_data(),
            Self::PasswordFallback(payload) => AuthData::ClearPassword(payload),
        }
    }
}

/// Client side of the Kerberos authentication plugin.
///
/// One instance handles one exchange; it is not reusable.
pub struct KerberosAuth<P: SecurityProvider> {
    provider: P,
    credentials: KerberosCredentials,
    env: CacheEnvironment,
    state: HandshakeState,
    challenge: Option<AuthChallenge>,
    context: Option<P::Context>,
}

#[cfg(any(feature = "integrated-auth", feature = "sspi-auth"))]
impl KerberosAuth<crate::kerberos::backend::Provider> {
    /// Create a controller using this platform's native provider.
    #[must_use]
    pub fn native(credentials: KerberosCredentials) -> Self {
        Self::new(crate::kerberos::backend::Provider::platform_default(), credentials)
    }
}

impl<P: SecurityProvider> KerberosAuth<P> {
    /// Create a controller reading the credential cache environment from
    /// the current process.
    pub fn new(provider: P, credentials: KerberosCredentials) -> Self {
        Self::with_environment(provider, credentials, CacheEnvironment::from_process())
    }

    /// Create a controller with an explicit credential cache environment.
    pub fn with_environment(
        provider: P,
        credentials: KerberosCredentials,
        env: CacheEnvironment,
    ) -> Self {
        Self {
            provider,
            credentials,
            env,
            state: HandshakeState::Start,
            challenge: None,
            context: None,
        }
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Get the challenge the server sent, once decoded.
    #[must_use]
    pub fn challenge(&self) -> Option<&AuthChallenge> {
        self.challenge.as_ref()
    }

    /// Get the security provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Handle the server's first authentication-data packet.
    ///
    /// Without a service principal in the packet, the exchange falls back to
    /// the clear-text password plugin if a password is available, and fails
    /// with [`AuthError::CredentialsUnavailable`] otherwise.
    pub fn begin(&mut self, initial: Option<&[u8]>) -> Result<InitialResponse, AuthError> {
        self.expect_state(HandshakeState::Start, "begin")?;
        self.state = HandshakeState::AwaitingChallenge;
        let result = self.start(initial);
        self.settle(result)
    }

    /// Handle a further server token while negotiation is incomplete.
    pub fn continue_with(&mut self, token: Option<&[u8]>) -> Result<HandshakeOutcome, AuthError> {
        self.expect_state(HandshakeState::Negotiating, "continue")?;
        let result = self.advance(token);
        self.settle(result)
    }

    /// Handle the server's protected closing message and produce the
    /// client's, completing the exchange.
    pub fn close(&mut self, server_message: &[u8]) -> Result<Vec<u8>, AuthError> {
        self.expect_state(HandshakeState::Established, "close")?;
        let result = self.finish(server_message);
        self.settle(result)
    }

    fn start(&mut self, initial: Option<&[u8]>) -> Result<InitialResponse, AuthError> {
        let Some(challenge) = AuthChallenge::decode_optional(initial)? else {
            return self.password_fallback();
        };

        tracing::debug!(
            spn = %challenge.service_principal(),
            realm = %challenge.realm(),
            provider = self.provider.name(),
            "received Kerberos challenge"
        );

        let credential = self.initiator_credential(&challenge)?;
        let mut context = self.provider.initiate(
            challenge.service_principal(),
            credential,
            ContextRequirements::HANDSHAKE,
        )?;

        let output = context.step(None)?;
        self.context = Some(context);
        self.challenge = Some(challenge);

        Ok(InitialResponse::Kerberos(self.record(output)))
    }

    fn initiator_credential<'a>(
        &'a self,
        challenge: &'a AuthChallenge,
    ) -> Result<InitiatorCredential<'a, P::Credential>, AuthError> {
        let username = self.credentials.requested_user();
        let password = self.credentials.secret().map(Password::expose);
        let realm = Some(challenge.realm()).filter(|realm| !realm.is_empty());

        if self
            .provider
            .capabilities()
            .contains(ProviderCapabilities::EMBEDDED_IDENTITY)
        {
            let user = username.filter(|user| !user.is_empty());
            let password = password.filter(|password| !password.is_empty());
            return Ok(match (user, password) {
                (Some(user), Some(password)) => {
                    tracing::debug!(user, realm = ?realm, "using explicit identity");
                    InitiatorCredential::Embedded(EmbeddedIdentity {
                        user,
                        realm,
                        password,
                    })
                }
                _ => {
                    tracing::debug!("using logon session credentials");
                    InitiatorCredential::Default
                }
            });
        }

        let request = IdentityRequest {
            username,
            realm,
            password,
        };
        let resolved = self.provider.resolve_credentials(&request, &self.env)?;

        tracing::debug!(
            principal = %resolved.principal,
            reacquired = resolved.reacquired,
            "credentials resolved"
        );

        Ok(InitiatorCredential::Resolved(resolved.handle))
    }

    fn password_fallback(&mut self) -> Result<InitialResponse, AuthError> {
        let Some(password) = self.credentials.secret() else {
            return Err(AuthError::CredentialsUnavailable(
                "server sent no service principal and no password is available for fallback"
                    .into(),
            ));
        };

        let plugin = ClearPasswordAuth::new();
        tracing::warn!(
            plugin = plugin.plugin_name(),
            "no service principal from server; falling back to clear-text password, which requires TLS"
        );

        let payload = plugin.auth_response(password.expose());
        self.state = HandshakeState::Closed;
        Ok(InitialResponse::PasswordFallback(payload))
    }

    fn advance(&mut self, token: Option<&[u8]>) -> Result<HandshakeOutcome, AuthError> {
        let context = self.context_mut()?;
        let output = context.step(token)?;
        Ok(self.record(output))
    }

    fn finish(&mut self, server_message: &[u8]) -> Result<Vec<u8>, AuthError> {
        let context = self.context_mut()?;
        if !context.is_complete() {
            return Err(AuthError::ProtocolMisuse(
                "security context is not established".into(),
            ));
        }

        let unwrapped = context.unwrap(server_message)?;
        tracing::debug!(len = unwrapped.len(), "unwrapped server closing message");
        tracing::trace!(message = ?unwrapped, "server closing message");

        let wrapped = context.wrap(&CLOSING_MESSAGE, false)?;
        tracing::debug!(len = wrapped.len(), "wrapped client closing message");

        self.state = HandshakeState::Closed;
        Ok(wrapped)
    }

    fn record(&mut self, output: StepOutput) -> HandshakeOutcome {
        self.state = if output.complete {
            HandshakeState::Established
        } else {
            HandshakeState::Negotiating
        };

        tracing::debug!(
            token_len = output.token.as_ref().map_or(0, Vec::len),
            complete = output.complete,
            "negotiation step"
        );
        if let Some(token) = &output.token {
            tracing::trace!(token = ?token, "client token");
        }

        HandshakeOutcome {
            response: output.token,
            complete: output.complete,
        }
    }

    fn context_mut(&mut self) -> Result<&mut P::Context, AuthError> {
        self.context
            .as_mut()
            .ok_or_else(|| AuthError::ProtocolMisuse("no security context".into()))
    }

    fn expect_state(&self, expected: HandshakeState, operation: &str) -> Result<(), AuthError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AuthError::ProtocolMisuse(format!(
                "cannot {operation} in state {:?}",
                self.state
            )))
        }
    }

    fn settle<T>(&mut self, result: Result<T, AuthError>) -> Result<T, AuthError> {
        if let Err(err) = &result {
            tracing::debug!(error = %err, state = ?self.state, "Kerberos authentication failed");
            self.state = HandshakeState::Failed;
            self.context = None;
        }
        result
    }
}

impl<P: SecurityProvider> std::fmt::Debug for KerberosAuth<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KerberosAuth")
            .field("provider", &self.provider.name())
            .field("credentials", &self.credentials)
            .field("state", &self.state)
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

impl<P: SecurityProvider> AuthPlugin for KerberosAuth<P> {
    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn method(&self) -> AuthMethod {
        AuthMethod::Kerberos
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::kerberos::context::ContextState;
    use crate::kerberos::resolver::{Principal, ResolvedCredentials};

    /// Context that completes after one step and echoes wrapped payloads.
    #[derive(Debug)]
    struct OneShotContext {
        state: ContextState,
    }

    impl SecurityContext for OneShotContext {
        fn state(&self) -> ContextState {
            self.state
        }

        fn step(&mut self, _input: Option<&[u8]>) -> Result<StepOutput, AuthError> {
            self.state = ContextState::Established;
            Ok(StepOutput {
                token: Some(b"ap-req".to_vec()),
                complete: true,
            })
        }

        fn wrap(&mut self, payload: &[u8], _encrypt: bool) -> Result<Vec<u8>, AuthError> {
            Ok(payload.to_vec())
        }

        fn unwrap(&mut self, payload: &[u8]) -> Result<Vec<u8>, AuthError> {
            Ok(payload.to_vec())
        }
    }

    struct OneShotProvider;

    impl SecurityProvider for OneShotProvider {
        type Credential = ();
        type Context = OneShotContext;

        fn name(&self) -> &'static str {
            "one-shot"
        }

        fn resolve_credentials(
            &self,
            _request: &IdentityRequest<'_>,
            _env: &CacheEnvironment,
        ) -> Result<ResolvedCredentials<()>, AuthError> {
            Ok(ResolvedCredentials {
                handle: (),
                principal: Principal::parse("alice@EXAMPLE.COM"),
                reacquired: false,
            })
        }

        fn initiate(
            &self,
            _target: &str,
            _credential: InitiatorCredential<'_, ()>,
            _requirements: ContextRequirements,
        ) -> Result<OneShotContext, AuthError> {
            Ok(OneShotContext {
                state: ContextState::Uninitiated,
            })
        }
    }

    fn challenge() -> Vec<u8> {
        AuthChallenge::new("mysql/db.example.com", "EXAMPLE.COM")
            .encode()
            .unwrap()
            .to_vec()
    }

    fn controller(credentials: KerberosCredentials) -> KerberosAuth<OneShotProvider> {
        KerberosAuth::with_environment(
            OneShotProvider,
            credentials,
            CacheEnvironment::for_uid(1000),
        )
    }

    #[test]
    fn test_plugin_surface() {
        let auth = controller(KerberosCredentials::from_cache());
        assert_eq!(auth.plugin_name(), "authentication_kerberos_client");
        assert_eq!(auth.method(), AuthMethod::Kerberos);
        assert!(!auth.requires_tls());
    }

    #[test]
    fn test_first_step_may_complete() {
        let mut auth = controller(KerberosCredentials::from_cache());
        let response = auth.begin(Some(&challenge())).unwrap();
        assert_eq!(
            response,
            InitialResponse::Kerberos(HandshakeOutcome {
                response: Some(b"ap-req".to_vec()),
                complete: true,
            })
        );
        assert_eq!(auth.state(), HandshakeState::Established);
        assert_eq!(
            auth.challenge().map(AuthChallenge::realm),
            Some("EXAMPLE.COM")
        );
    }

    #[test]
    fn test_close_sends_security_level() {
        let mut auth = controller(KerberosCredentials::from_cache());
        auth.begin(Some(&challenge())).unwrap();
        let closing = auth.close(b"server").unwrap();
        assert_eq!(closing, CLOSING_MESSAGE.to_vec());
        assert_eq!(auth.state(), HandshakeState::Closed);
    }

    #[test]
    fn test_second_begin_is_misuse() {
        let mut auth = controller(KerberosCredentials::from_cache());
        auth.begin(Some(&challenge())).unwrap();
        let err = auth.begin(Some(&challenge())).unwrap_err();
        assert!(matches!(err, AuthError::ProtocolMisuse(_)));
        assert_eq!(auth.state(), HandshakeState::Established);
    }

    #[test]
    fn test_continue_before_begin_is_misuse() {
        let mut auth = controller(KerberosCredentials::from_cache());
        assert!(matches!(
            auth.continue_with(None),
            Err(AuthError::ProtocolMisuse(_))
        ));
        assert_eq!(auth.state(), HandshakeState::Start);
    }

    #[test]
    fn test_fallback_payload() {
        let mut auth = controller(KerberosCredentials::with_password("alice", "s3cret"));
        let response = auth.begin(None).unwrap();
        assert!(response.is_password_fallback());
        assert_eq!(
            response.into_auth_data(),
            AuthData::ClearPassword(b"s3cret\0".to_vec())
        );
        assert_eq!(auth.state(), HandshakeState::Closed);
    }

    #[test]
    fn test_outcome_into_auth_data() {
        let outcome = HandshakeOutcome {
            response: None,
            complete: true,
        };
        assert_eq!(outcome.into_auth_data(), AuthData::None);
    }

    #[test]
    fn test_debug_hides_password() {
        let auth = controller(KerberosCredentials::with_password("alice", "s3cret"));
        let debug = format!("{:?}", auth);
        assert!(debug.contains("one-shot"));
        assert!(!debug.contains("s3cret"));
    }
}
