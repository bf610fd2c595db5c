use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature missing")]
    Missing,

    #[error("signature is not valid {0}")]
    Malformed(&'static str),

    #[error("signature mismatch")]
    Mismatch,

    #[error("signing key rejected")]
    InvalidKey,
}

/// HMAC-SHA256 verifier keyed by the app's shared secret.
///
/// Webhooks carry a base64 signature over the raw body; app-proxy requests
/// carry a hex signature over their canonicalized query (see [`crate::proxy`]).
/// Every comparison is constant-time.
#[derive(Clone)]
pub struct WebhookVerifier {
    keyed: HmacSha256,
}

impl WebhookVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SignatureError> {
        let keyed = HmacSha256::new_from_slice(secret.as_ref()).map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self { keyed })
    }

    fn mac(&self) -> HmacSha256 {
        self.keyed.clone()
    }

    /// Base64 signature of `body`, as the platform would send it.
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Verify a webhook body against its base64 signature header.
    ///
    /// Fails closed: a missing, empty or undecodable header is rejected.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        let header = header.map(str::trim).filter(|h| !h.is_empty()).ok_or(SignatureError::Missing)?;
        let expected = STANDARD
            .decode(header)
            .map_err(|_| SignatureError::Malformed("base64"))?;

        let mut mac = self.mac();
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }

    /// Hex signature of an arbitrary message.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(message);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a hex signature over `message`.
    pub fn verify_hex(&self, message: &[u8], signature: &str) -> Result<(), SignatureError> {
        if signature.is_empty() {
            return Err(SignatureError::Missing);
        }
        let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed("hex"))?;

        let mut mac = self.mac();
        mac.update(message);
        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }
}

impl core::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"id":820982911946154508,"financial_status":"paid"}"#;

    #[test]
    fn accepts_own_signature() {
        let verifier = WebhookVerifier::new("hush").unwrap();
        let sig = verifier.sign(BODY);
        assert_eq!(verifier.verify(BODY, Some(&sig)), Ok(()));
    }

    #[test]
    fn known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let verifier = WebhookVerifier::new("key").unwrap();
        assert_eq!(
            verifier.sign_hex(b"The quick brown fox jumps over the lazy dog"),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn rejects_tampered_body_and_other_secret() {
        let verifier = WebhookVerifier::new("hush").unwrap();
        let sig = verifier.sign(BODY);
        assert_eq!(verifier.verify(b"{}", Some(&sig)), Err(SignatureError::Mismatch));

        let other = WebhookVerifier::new("loud").unwrap();
        assert_eq!(other.verify(BODY, Some(&sig)), Err(SignatureError::Mismatch));
    }

    #[test]
    fn fails_closed_on_missing_or_malformed_header() {
        let verifier = WebhookVerifier::new("hush").unwrap();
        assert_eq!(verifier.verify(BODY, None), Err(SignatureError::Missing));
        assert_eq!(verifier.verify(BODY, Some("  ")), Err(SignatureError::Missing));
        assert_eq!(
            verifier.verify(BODY, Some("not base64!!")),
            Err(SignatureError::Malformed("base64"))
        );
        // Valid base64 of the wrong length.
        assert_eq!(verifier.verify(BODY, Some("AAAA")), Err(SignatureError::Mismatch));
    }

    #[test]
    fn hex_signatures_round_trip() {
        let verifier = WebhookVerifier::new("hush").unwrap();
        let sig = verifier.sign_hex(b"a=1b=2");
        assert_eq!(verifier.verify_hex(b"a=1b=2", &sig), Ok(()));
        assert_eq!(verifier.verify_hex(b"a=1b=3", &sig), Err(SignatureError::Mismatch));
        assert_eq!(verifier.verify_hex(b"a=1b=2", "zz"), Err(SignatureError::Malformed("hex")));
    }
}
