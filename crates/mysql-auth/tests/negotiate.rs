//! SSPI Negotiate backend tests.
//!
//! The client side runs through `NegotiateProvider`; the server side is an
//! in-process sspi `Ntlm` acceptor, so no domain controller is needed.

#![cfg(feature = "sspi-auth")]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use mysql_auth::kerberos::{
    ContextRequirements, EmbeddedIdentity, InitiatorCredential, NegotiateContext,
    NegotiateProvider,
};
use mysql_auth::{
    AuthChallenge, AuthError, CacheEnvironment, HandshakeState, InitialResponse, KerberosAuth,
    KerberosCredentials, SecurityContext, SecurityProvider,
};
use sspi::{
    AuthIdentity, AuthIdentityBuffers, BufferType, CredentialUse, DataRepresentation,
    EncryptionFlags, Ntlm, SecurityBuffer, SecurityBufferRef, SecurityStatus, ServerRequestFlags,
    Sspi, SspiImpl, Username,
};

const USER: &str = "test_user";
const DOMAIN: &str = "example.com";
const PASSWORD: &str = "test_password";
const SPN: &str = "HTTP/server.example.com";

/// NTLM signature size, which is also the Negotiate security trailer.
const TRAILER_LEN: usize = 16;

// =============================================================================
// Server side
// =============================================================================

struct NtlmServer {
    ntlm: Ntlm,
    creds: Option<AuthIdentityBuffers>,
    send_seq: u32,
    recv_seq: u32,
}

impl NtlmServer {
    fn new() -> Self {
        let identity = AuthIdentity {
            username: Username::new(USER, Some(DOMAIN)).unwrap(),
            password: PASSWORD.to_string().into(),
        };
        let mut ntlm = Ntlm::new();
        let acquired = ntlm
            .acquire_credentials_handle()
            .with_credential_use(CredentialUse::Inbound)
            .with_auth_data(&identity)
            .execute(&mut ntlm)
            .unwrap();

        Self {
            ntlm,
            creds: acquired.credentials_handle,
            send_seq: 0,
            recv_seq: 0,
        }
    }

    /// Accept one client token, returning the server's reply if any.
    fn accept(&mut self, token: Vec<u8>) -> Option<Vec<u8>> {
        let mut input = vec![SecurityBuffer::new(token, BufferType::Token)];
        let mut output = vec![SecurityBuffer::new(Vec::new(), BufferType::Token)];

        let builder = self
            .ntlm
            .accept_security_context()
            .with_credentials_handle(&mut self.creds)
            .with_context_requirements(ServerRequestFlags::empty())
            .with_target_data_representation(DataRepresentation::Native)
            .with_input(&mut input)
            .with_output(&mut output);
        let result = SspiImpl::accept_security_context_impl(&mut self.ntlm, builder)
            .unwrap()
            .resolve_to_result()
            .unwrap();

        if result.status == SecurityStatus::CompleteNeeded {
            self.ntlm.complete_auth_token(&mut []).unwrap();
        }

        output
            .into_iter()
            .map(|buffer| buffer.buffer)
            .find(|buffer| !buffer.is_empty())
    }

    fn wrap(&mut self, payload: &[u8]) -> Vec<u8> {
        let mut token = vec![0u8; TRAILER_LEN];
        let mut data = payload.to_vec();
        let mut message = [
            SecurityBufferRef::token_buf(token.as_mut_slice()),
            SecurityBufferRef::data_buf(data.as_mut_slice()),
        ];
        self.ntlm
            .encrypt_message(EncryptionFlags::empty(), &mut message, self.send_seq)
            .unwrap();
        self.send_seq += 1;

        let mut wrapped = message[0].data().to_vec();
        wrapped.extend_from_slice(message[1].data());
        wrapped
    }

    fn unwrap(&mut self, payload: &[u8]) -> Vec<u8> {
        let mut buffer = payload.to_vec();
        let mut message = [
            SecurityBufferRef::stream_buf(&mut buffer),
            SecurityBufferRef::data_buf(&mut []),
        ];
        self.ntlm
            .decrypt_message(&mut message, self.recv_seq)
            .unwrap();
        self.recv_seq += 1;
        message[1].data().to_vec()
    }
}

fn embedded_identity() -> InitiatorCredential<'static, std::convert::Infallible> {
    InitiatorCredential::Embedded(EmbeddedIdentity {
        user: USER,
        realm: Some(DOMAIN),
        password: PASSWORD,
    })
}

/// Negotiate a context against a fresh server, returning both ends.
fn established() -> (NegotiateContext, NtlmServer) {
    let mut server = NtlmServer::new();
    let mut context = NegotiateProvider::new()
        .initiate(SPN, embedded_identity(), ContextRequirements::HANDSHAKE)
        .unwrap();

    let mut input: Option<Vec<u8>> = None;
    for _ in 0..3 {
        let output = context.step(input.as_deref()).unwrap();
        let token = output.token.expect("client produced no token");
        let reply = server.accept(token);
        if output.complete {
            assert!(context.is_complete());
            return (context, server);
        }
        input = reply;
    }
    panic!("negotiation did not complete within three rounds");
}

// =============================================================================
// Context
// =============================================================================

#[test]
fn test_negotiation_completes_on_second_round() {
    let mut server = NtlmServer::new();
    let mut context = NegotiateProvider::new()
        .initiate(SPN, embedded_identity(), ContextRequirements::HANDSHAKE)
        .unwrap();

    let first = context.step(None).unwrap();
    assert!(!first.complete);
    assert!(!context.is_complete());
    let challenge = server.accept(first.token.unwrap()).unwrap();

    let second = context.step(Some(&challenge)).unwrap();
    assert!(second.complete);
    assert!(context.is_complete());
    assert!(second.token.is_some_and(|token| !token.is_empty()));
}

#[test]
fn test_wrap_emits_trailer_then_data() {
    let (mut context, mut server) = established();

    let wrapped = context.wrap(&[0x01, 0x00, 0x00, 0x00], false).unwrap();
    assert_eq!(wrapped.len(), TRAILER_LEN + 4);
    assert_eq!(server.unwrap(&wrapped), vec![0x01, 0x00, 0x00, 0x00]);
}

#[test]
fn test_unwrap_server_message() {
    let (mut context, mut server) = established();

    let message = server.wrap(&[0x01, 0x00, 0x00, 0x08]);
    assert_eq!(context.unwrap(&message).unwrap(), vec![0x01, 0x00, 0x00, 0x08]);
}

#[test]
fn test_send_and_receive_sequences_are_independent() {
    let (mut context, mut server) = established();

    let incoming = server.wrap(b"server");
    assert_eq!(context.unwrap(&incoming).unwrap(), b"server");

    // Outgoing numbering starts at zero regardless of messages received.
    let first = context.wrap(b"one", false).unwrap();
    let second = context.wrap(b"two", false).unwrap();
    assert_eq!(server.unwrap(&first), b"one");
    assert_eq!(server.unwrap(&second), b"two");
}

#[test]
fn test_tampered_message_is_integrity_failure() {
    let (mut context, mut server) = established();

    let mut message = server.wrap(&[0x01, 0x00, 0x00, 0x00]);
    message[5] ^= 0xFF;

    let err = context.unwrap(&message).unwrap_err();
    assert!(matches!(err, AuthError::IntegrityCheck(_)), "{err:?}");
    assert!(err.is_fatal());
}

#[test]
fn test_wrap_before_established_is_misuse() {
    let mut context = NegotiateProvider::new()
        .initiate(SPN, embedded_identity(), ContextRequirements::HANDSHAKE)
        .unwrap();

    assert!(matches!(
        context.wrap(b"early", false),
        Err(AuthError::ProtocolMisuse(_))
    ));
    assert!(matches!(
        context.unwrap(b"early"),
        Err(AuthError::ProtocolMisuse(_))
    ));
}

// =============================================================================
// Handshake controller
// =============================================================================

#[test]
fn test_full_exchange_through_controller() {
    let mut server = NtlmServer::new();
    let mut auth = KerberosAuth::with_environment(
        NegotiateProvider::new(),
        KerberosCredentials::with_password(USER, PASSWORD),
        CacheEnvironment::for_uid(1000),
    );

    let packet = AuthChallenge::new(SPN, DOMAIN).encode().unwrap();
    let first = match auth.begin(Some(packet.as_ref())).unwrap() {
        InitialResponse::Kerberos(outcome) => outcome,
        InitialResponse::PasswordFallback(_) => panic!("unexpected password fallback"),
    };
    assert!(!first.complete);
    assert_eq!(auth.state(), HandshakeState::Negotiating);

    let challenge = server.accept(first.response.unwrap()).unwrap();
    let second = auth.continue_with(Some(&challenge)).unwrap();
    assert!(second.complete);
    assert_eq!(auth.state(), HandshakeState::Established);
    server.accept(second.response.unwrap());

    let server_closing = server.wrap(&[0x01, 0x00, 0x00, 0x08]);
    let client_closing = auth.close(&server_closing).unwrap();
    assert_eq!(auth.state(), HandshakeState::Closed);
    assert_eq!(server.unwrap(&client_closing), vec![0x01, 0x00, 0x00, 0x00]);
}

#[test]
fn test_tampered_closing_message_fails_controller() {
    let mut server = NtlmServer::new();
    let mut auth = KerberosAuth::with_environment(
        NegotiateProvider::new(),
        KerberosCredentials::with_password(USER, PASSWORD),
        CacheEnvironment::for_uid(1000),
    );

    let packet = AuthChallenge::new(SPN, DOMAIN).encode().unwrap();
    let InitialResponse::Kerberos(first) = auth.begin(Some(packet.as_ref())).unwrap() else {
        panic!("unexpected password fallback");
    };
    let challenge = server.accept(first.response.unwrap()).unwrap();
    let second = auth.continue_with(Some(&challenge)).unwrap();
    server.accept(second.response.unwrap());

    let mut server_closing = server.wrap(&[0x01, 0x00, 0x00, 0x00]);
    server_closing[5] ^= 0xFF;

    let err = auth.close(&server_closing).unwrap_err();
    assert!(matches!(err, AuthError::IntegrityCheck(_)), "{err:?}");
    assert_eq!(auth.state(), HandshakeState::Failed);
}
