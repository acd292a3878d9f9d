//! Credential verification: the `LOGIN` command and the SASL `PLAIN`
//! mechanism used by `AUTHENTICATE`.
//!
//! Spec §1 treats the identity store as an external collaborator; this
//! module defines the trait boundary plus SASL PLAIN's base64 envelope
//! decoding, which is squarely this crate's concern since it is part of the
//! wire protocol rather than the credential store itself.

use base64::Engine;

use crate::error::{ImapError, ImapResult};

/// Decoded `[authzid] UTF8NUL authcid UTF8NUL passwd` payload (RFC 4616).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainCredentials {
    pub authzid: Option<String>,
    pub authcid: String,
    pub password: String,
}

/// Verifies a username/password pair against the external identity store.
pub trait Authenticator: Send + Sync {
    fn verify(&self, user: &str, password: &str) -> ImapResult<bool>;
}

/// An authenticator backed by a fixed in-memory credential table, useful
/// for tests and for a single-user deployment.
pub struct StaticAuthenticator {
    credentials: std::collections::HashMap<String, String>,
}

impl StaticAuthenticator {
    pub fn new(credentials: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            credentials: credentials.into_iter().collect(),
        }
    }
}

impl Authenticator for StaticAuthenticator {
    fn verify(&self, user: &str, password: &str) -> ImapResult<bool> {
        Ok(self.credentials.get(user).map(String::as_str) == Some(password))
    }
}

/// Decode a base64 SASL PLAIN initial response.
pub fn decode_plain(encoded: &[u8]) -> ImapResult<PlainCredentials> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| ImapError::no_code("Invalid base64", crate::error::ResponseCode::AuthenticationFailed))?;

    let mut parts = raw.split(|&b| b == 0);
    let authzid = parts.next().unwrap_or(&[]);
    let authcid = parts
        .next()
        .ok_or_else(|| ImapError::no_code("Malformed SASL PLAIN response", crate::error::ResponseCode::AuthenticationFailed))?;
    let password = parts
        .next()
        .ok_or_else(|| ImapError::no_code("Malformed SASL PLAIN response", crate::error::ResponseCode::AuthenticationFailed))?;

    Ok(PlainCredentials {
        authzid: if authzid.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(authzid).into_owned())
        },
        authcid: String::from_utf8_lossy(authcid).into_owned(),
        password: String::from_utf8_lossy(password).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_without_authzid() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"\0alice\0secret");
        let creds = decode_plain(encoded.as_bytes()).unwrap();
        assert_eq!(creds.authzid, None);
        assert_eq!(creds.authcid, "alice");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn decodes_plain_with_authzid() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"admin\0alice\0secret");
        let creds = decode_plain(encoded.as_bytes()).unwrap();
        assert_eq!(creds.authzid.as_deref(), Some("admin"));
        assert_eq!(creds.authcid, "alice");
    }

    #[test]
    fn static_authenticator_checks_exact_password() {
        let auth = StaticAuthenticator::new([("alice".to_owned(), "secret".to_owned())]);
        assert!(auth.verify("alice", "secret").unwrap());
        assert!(!auth.verify("alice", "wrong").unwrap());
        assert!(!auth.verify("bob", "secret").unwrap());
    }
}
