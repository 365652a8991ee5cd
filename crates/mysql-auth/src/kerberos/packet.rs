//! Kerberos authentication-data packet.
//!
//! The server opens the exchange with the service principal it expects the
//! client to authenticate to, and the realm that principal belongs to:
//!
//! ```text
//! +---------+------------------+-----------+--------------------+
//! | spn_len | spn (UTF-8)      | realm_len | realm (UTF-8)      |
//! | u16 LE  | spn_len bytes    | u16 LE    | realm_len bytes    |
//! +---------+------------------+-----------+--------------------+
//! ```
//!
//! The realm field runs to the end of the packet; trailing bytes are an
//! error, as is any length that points past the end of the buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::AuthError;

/// Length prefix size of each field.
const LENGTH_PREFIX: usize = 2;

/// Service principal and realm announced by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    spn: String,
    realm: String,
}

impl AuthChallenge {
    /// Create a challenge from its parts.
    pub fn new(spn: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            spn: spn.into(),
            realm: realm.into(),
        }
    }

    /// Get the service principal name.
    #[must_use]
    pub fn service_principal(&self) -> &str {
        &self.spn
    }

    /// Get the realm.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Decode a challenge packet.
    pub fn decode(mut src: impl Buf) -> Result<Self, AuthError> {
        let spn = read_field(&mut src, "service principal")?;
        let realm = read_field(&mut src, "realm")?;

        if src.has_remaining() {
            return Err(AuthError::MalformedPacket(format!(
                "{} unexpected trailing bytes after realm",
                src.remaining()
            )));
        }

        Ok(Self { spn, realm })
    }

    /// Decode the first server packet, if it carries a service principal.
    ///
    /// Returns `None` when no data was sent, or when the packet names an
    /// empty service principal. Both mean the server is not offering
    /// Kerberos for this account.
    pub fn decode_optional(data: Option<&[u8]>) -> Result<Option<Self>, AuthError> {
        match data {
            None | Some([]) => Ok(None),
            Some(bytes) => {
                let challenge = Self::decode(bytes)?;
                if challenge.spn.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(challenge))
                }
            }
        }
    }

    /// Encode the challenge to its wire form.
    pub fn encode(&self) -> Result<Bytes, AuthError> {
        let mut buf =
            BytesMut::with_capacity(2 * LENGTH_PREFIX + self.spn.len() + self.realm.len());
        write_field(&mut buf, &self.spn, "service principal")?;
        write_field(&mut buf, &self.realm, "realm")?;
        Ok(buf.freeze())
    }
}

fn read_field(src: &mut impl Buf, field: &str) -> Result<String, AuthError> {
    if src.remaining() < LENGTH_PREFIX {
        return Err(AuthError::MalformedPacket(format!(
            "missing {field} length"
        )));
    }

    let len = src.get_u16_le() as usize;
    if src.remaining() < len {
        return Err(AuthError::MalformedPacket(format!(
            "{field} length {len} exceeds remaining {} bytes",
            src.remaining()
        )));
    }

    let raw = src.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| AuthError::MalformedPacket(format!("{field} is not valid UTF-8: {e}")))
}

fn write_field(dst: &mut BytesMut, value: &str, field: &str) -> Result<(), AuthError> {
    let len = u16::try_from(value.len()).map_err(|_| {
        AuthError::MalformedPacket(format!("{field} is {} bytes, max {}", value.len(), u16::MAX))
    })?;
    dst.put_u16_le(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}
