//! Webhook signature verification
//!
//! Meta signs every webhook body with the app secret and sends the digest as
//! `<algorithm>=<hex digest>` in the `X-Hub-Signature` (SHA-1) and
//! `X-Hub-Signature-256` (SHA-256) headers. The body must be authenticated
//! before it is parsed.
//!
//! # Example
//! ```rust
//! use messenger_bot_rs::signature::{sign, verify_signature, AppSecret, Algorithm};
//!
//! let secret = AppSecret("a1b2c3d4e5f6".to_owned());
//! let body = br#"{"object":"page","entry":[]}"#;
//!
//! let header = sign(&secret, Algorithm::Sha1, body).unwrap();
//! assert!(verify_signature(&secret, Some(&header), body).is_ok());
//! ```

use hmac::{digest::KeyInit, Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, InvalidSignatureKind};

/// Header carrying the SHA-1 signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Header carrying the SHA-256 signature.
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";

/// A wrapper struct for the **Meta App Secret** string.
///
/// The secret is the HMAC key for webhook signatures.
///
/// # Example
/// ```rust
/// use messenger_bot_rs::signature::AppSecret;
///
/// let app_secret = AppSecret("YOUR_APP_SECRET_STRING_HERE".to_string());
/// ```
#[derive(PartialEq, Eq, Clone)]
pub struct AppSecret(pub String);

impl std::fmt::Debug for AppSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AppSecret(..)")
    }
}

impl From<&str> for AppSecret {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for AppSecret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Digest algorithms Meta signs webhooks with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Sha1,
    Sha256,
}

impl Algorithm {
    /// The algorithm prefix used in the header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    fn digest(&self, secret: &AppSecret, body: &[u8]) -> Result<Vec<u8>, Error> {
        match self {
            Self::Sha1 => hmac_digest::<Hmac<Sha1>>(secret, body),
            Self::Sha256 => hmac_digest::<Hmac<Sha256>>(secret, body),
        }
    }
}

fn hmac_digest<M: Mac + KeyInit>(secret: &AppSecret, body: &[u8]) -> Result<Vec<u8>, Error> {
    let mut mac = <M as Mac>::new_from_slice(secret.0.as_bytes())
        .map_err(|_| Error::Config("invalid app secret".to_owned()))?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Computes the header value Meta would send for `body`.
///
/// # Errors
/// [`Error::Config`] if the secret cannot key the HMAC.
pub fn sign(secret: &AppSecret, algorithm: Algorithm, body: &[u8]) -> Result<String, Error> {
    let digest = algorithm.digest(secret, body)?;
    Ok(format!("{}={}", algorithm.as_str(), hex::encode(digest)))
}

/// Verifies that `body` was signed with `secret`.
///
/// `header` is the raw value of the signature header, `None` when the request
/// did not carry one.
///
/// # Errors
/// - [`Error::MissingSignature`] if the header is absent or has no digest.
/// - [`Error::InvalidSignature`] if the algorithm is unsupported or the digest
///   does not match.
pub fn verify_signature(
    secret: &AppSecret,
    header: Option<&str>,
    body: &[u8],
) -> Result<(), Error> {
    let header = header.ok_or(Error::MissingSignature)?;

    let (algorithm, signature) = match header.split_once('=') {
        Some((algorithm, signature)) if !signature.is_empty() => (algorithm, signature),
        _ => return Err(Error::MissingSignature),
    };

    let algorithm = Algorithm::parse(algorithm)
        .ok_or_else(|| InvalidSignatureKind::UnsupportedAlgorithm(algorithm.to_owned()))?;

    let expected = hex::encode(algorithm.digest(secret, body)?);

    // Meta sends lowercase hex; compare in constant time to prevent timing attacks
    if bool::from(signature.as_bytes().ct_eq(expected.as_bytes())) {
        tracing::debug!(algorithm = algorithm.as_str(), "request signature verified");
        Ok(())
    } else {
        Err(InvalidSignatureKind::Mismatch.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"object":"page","entry":[{"id":"1","time":1,"messaging":[]}]}"#;

    fn secret() -> AppSecret {
        AppSecret("a1b2c3d4e5f6".into())
    }

    #[test]
    fn known_sha1_vector() {
        // RFC 2202 test case 2
        let secret = AppSecret("Jefe".into());
        assert_eq!(
            sign(&secret, Algorithm::Sha1, b"what do ya want for nothing?").unwrap(),
            "sha1=effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
    }

    #[test]
    fn known_sha256_vector() {
        // RFC 4231 test case 2
        let secret = AppSecret("Jefe".into());
        assert_eq!(
            sign(&secret, Algorithm::Sha256, b"what do ya want for nothing?").unwrap(),
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signed_body_verifies() {
        for algorithm in [Algorithm::Sha1, Algorithm::Sha256] {
            let header = sign(&secret(), algorithm, BODY).unwrap();
            verify_signature(&secret(), Some(&header), BODY).unwrap();
        }
    }

    #[test]
    fn any_body_mutation_fails() {
        let header = sign(&secret(), Algorithm::Sha1, BODY).unwrap();
        for i in 0..BODY.len() {
            let mut body = BODY.to_vec();
            body[i] ^= 0x01;
            let err = verify_signature(&secret(), Some(&header), &body).unwrap_err();
            assert!(matches!(
                err,
                Error::InvalidSignature(InvalidSignatureKind::Mismatch)
            ));
        }
    }

    #[test]
    fn any_digest_mutation_fails() {
        let header = sign(&secret(), Algorithm::Sha256, BODY).unwrap();
        let prefix = "sha256=".len();
        for i in prefix..header.len() {
            let mut bytes = header.clone().into_bytes();
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let mutated = String::from_utf8(bytes).unwrap();
            assert!(verify_signature(&secret(), Some(&mutated), BODY).is_err());
        }
    }

    #[test]
    fn wrong_secret_fails() {
        let header = sign(&AppSecret("other".into()), Algorithm::Sha1, BODY).unwrap();
        assert!(verify_signature(&secret(), Some(&header), BODY)
            .unwrap_err()
            .is_signature());
    }

    #[test]
    fn missing_header_or_digest() {
        assert!(matches!(
            verify_signature(&secret(), None, BODY),
            Err(Error::MissingSignature)
        ));
        assert!(matches!(
            verify_signature(&secret(), Some("sha1"), BODY),
            Err(Error::MissingSignature)
        ));
        assert!(matches!(
            verify_signature(&secret(), Some("sha1="), BODY),
            Err(Error::MissingSignature)
        ));
    }

    #[test]
    fn unsupported_algorithm() {
        let err = verify_signature(&secret(), Some("md5=abcdef"), BODY).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSignature(InvalidSignatureKind::UnsupportedAlgorithm(ref name)) if name == "md5"
        ));
    }

    #[test]
    fn secret_is_not_printed() {
        assert_eq!(format!("{:?}", secret()), "AppSecret(..)");
    }
}
