//! AP2 Mandates Extension
//!
//! Exchanges purchase authorizations as verifiable credentials: every
//! checkout response carries a `merchant_authorization` (a JWS Detached
//! Content signature over the canonical checkout body, excluding the `ap2`
//! field itself), and completion requests must carry a `checkout_mandate`
//! proving buyer authorization.
//!
//! Signature format: `<base64url(header)>..<base64url(signature)>` - two
//! dots, empty payload segment. The payload is the canonical JSON of the
//! checkout: keys sorted, compact separators, UTF-8.
//!
//! The signing strategy is configuration-selected: [`MockSigner`] (SHA-256
//! digest, for demos and tests) or [`EcdsaSigner`] (ES256 over P-256) behind
//! the one [`Signer`] trait. There is no implicit fallback between them.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::Value;
use sha2::{Digest, Sha256};

use checkout_core::capability::AP2_MANDATE_CAPABILITY;
use checkout_core::error::{CheckoutError, Result};
use checkout_core::model::{Ap2Response, Checkout, CompleteRequest};
use checkout_core::pipeline::CheckoutExtension;

/// Completion attempted without a checkout mandate
pub const MANDATE_REQUIRED: &str = "mandate_required";

/// The supplied mandate failed verification
pub const MANDATE_INVALID_SIGNATURE: &str = "mandate_invalid_signature";

/// A merchant authorization string is malformed or fails verification
pub const MERCHANT_AUTHORIZATION_INVALID: &str = "merchant_authorization_invalid";

fn extension_error(code: &str, message: impl Into<String>) -> CheckoutError {
    CheckoutError::Extension {
        code: code.into(),
        message: message.into(),
    }
}

/// Encode bytes as base64url without padding
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode a base64url string
pub fn base64url_decode(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|e| extension_error(MERCHANT_AUTHORIZATION_INVALID, format!("bad base64url: {e}")))
}

/// Canonical JSON: object keys sorted, compact separators, UTF-8.
///
/// Deterministic byte-for-byte: signing and verification both serialize
/// through here.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let entries: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", entries.join(","))
        }
        other => other.to_string(),
    }
}

/// Serialize a checkout with its `ap2` field removed, for signing
pub fn checkout_signing_body(checkout: &Checkout) -> Result<Value> {
    let mut value = serde_json::to_value(checkout)?;
    if let Value::Object(map) = &mut value {
        map.remove("ap2");
    }
    Ok(value)
}

// ============================================================================
// Signer Strategies
// ============================================================================

/// Detached-signature strategy
pub trait Signer: Send + Sync {
    /// JWS algorithm name placed in the protected header
    fn algorithm(&self) -> &str;

    /// Key id placed in the protected header
    fn key_id(&self) -> &str;

    /// Sign the JWS signing input
    fn sign(&self, signing_input: &[u8]) -> Result<Vec<u8>>;

    /// Verify a signature over the signing input
    fn verify(&self, signing_input: &[u8], signature: &[u8]) -> Result<bool>;
}

/// Demo signer: SHA-256 digest stands in for a signature.
///
/// Selected explicitly by configuration; production profiles use
/// [`EcdsaSigner`].
pub struct MockSigner {
    kid: String,
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new("merchant_key_1")
    }
}

impl MockSigner {
    pub fn new(kid: impl Into<String>) -> Self {
        Self { kid: kid.into() }
    }
}

impl Signer for MockSigner {
    fn algorithm(&self) -> &str {
        "ES256"
    }

    fn key_id(&self) -> &str {
        &self.kid
    }

    fn sign(&self, signing_input: &[u8]) -> Result<Vec<u8>> {
        Ok(Sha256::digest(signing_input).to_vec())
    }

    fn verify(&self, signing_input: &[u8], signature: &[u8]) -> Result<bool> {
        Ok(Sha256::digest(signing_input).as_slice() == signature)
    }
}

/// ES256 signer over NIST P-256
pub struct EcdsaSigner {
    key: p256::ecdsa::SigningKey,
    kid: String,
}

impl EcdsaSigner {
    pub fn new(key: p256::ecdsa::SigningKey, kid: impl Into<String>) -> Self {
        Self {
            key,
            kid: kid.into(),
        }
    }

    /// Build from a 32-byte secret scalar
    pub fn from_secret_bytes(bytes: &[u8], kid: impl Into<String>) -> Result<Self> {
        let key = p256::ecdsa::SigningKey::from_slice(bytes)
            .map_err(|e| CheckoutError::Internal(format!("invalid signing key: {e}")))?;
        Ok(Self::new(key, kid))
    }
}

impl Signer for EcdsaSigner {
    fn algorithm(&self) -> &str {
        "ES256"
    }

    fn key_id(&self) -> &str {
        &self.kid
    }

    fn sign(&self, signing_input: &[u8]) -> Result<Vec<u8>> {
        use p256::ecdsa::signature::Signer as _;
        let signature: p256::ecdsa::Signature = self.key.sign(signing_input);
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, signing_input: &[u8], signature: &[u8]) -> Result<bool> {
        use p256::ecdsa::signature::Verifier as _;
        let signature = match p256::ecdsa::Signature::from_slice(signature) {
            Ok(s) => s,
            Err(_) => return Ok(false),
        };
        let verifying_key = p256::ecdsa::VerifyingKey::from(&self.key);
        Ok(verifying_key.verify(signing_input, &signature).is_ok())
    }
}

// ============================================================================
// Merchant Authorization
// ============================================================================

/// Create a merchant authorization over a checkout body.
///
/// Returns the detached JWS `<header>..<signature>`.
pub fn sign_body(body: &Value, signer: &dyn Signer) -> Result<String> {
    let header = serde_json::json!({
        "alg": signer.algorithm(),
        "kid": signer.key_id(),
    });

    let encoded_header = base64url_encode(canonical_json(&header).as_bytes());
    let encoded_payload = base64url_encode(canonical_json(body).as_bytes());
    let signing_input = format!("{encoded_header}.{encoded_payload}");

    let signature = signer.sign(signing_input.as_bytes())?;
    Ok(format!("{encoded_header}..{}", base64url_encode(&signature)))
}

/// Verify a merchant authorization against a checkout body
pub fn verify_body(authorization: &str, body: &Value, signer: &dyn Signer) -> Result<bool> {
    let (header_b64, signature_b64) = authorization.split_once("..").ok_or_else(|| {
        extension_error(
            MERCHANT_AUTHORIZATION_INVALID,
            "expected <header>..<signature>",
        )
    })?;
    if header_b64.is_empty() || signature_b64.is_empty() || signature_b64.contains('.') {
        return Err(extension_error(
            MERCHANT_AUTHORIZATION_INVALID,
            "expected <header>..<signature>",
        ));
    }

    // The header is verified as transmitted, not re-derived
    let header: Value = serde_json::from_slice(&base64url_decode(header_b64)?)
        .map_err(|e| extension_error(MERCHANT_AUTHORIZATION_INVALID, format!("bad header: {e}")))?;
    if header.get("alg").and_then(Value::as_str) != Some(signer.algorithm()) {
        return Ok(false);
    }

    let encoded_payload = base64url_encode(canonical_json(body).as_bytes());
    let signing_input = format!("{header_b64}.{encoded_payload}");
    let signature = base64url_decode(signature_b64)?;

    signer.verify(signing_input.as_bytes(), &signature)
}

// ============================================================================
// Mandate Verification
// ============================================================================

/// Verifies SD-JWT+kb checkout mandates.
///
/// Checks the credential structure (JWT sections plus `~`-separated
/// disclosures) and the header. Full platform-key verification plugs in
/// behind the same call once real keys are provisioned.
#[derive(Default)]
pub struct MandateVerifier;

impl MandateVerifier {
    pub fn verify(&self, mandate: &str) -> Result<()> {
        let jwt = mandate.split('~').next().unwrap_or_default();
        let sections: Vec<&str> = jwt.split('.').collect();

        if sections.len() != 3 || sections.iter().any(|s| s.is_empty()) {
            return Err(extension_error(
                MANDATE_INVALID_SIGNATURE,
                "mandate is not a valid JWT structure",
            ));
        }

        let header_bytes = base64url_decode(sections[0])
            .map_err(|_| extension_error(MANDATE_INVALID_SIGNATURE, "mandate header is not base64url"))?;
        let header: Value = serde_json::from_slice(&header_bytes)
            .map_err(|_| extension_error(MANDATE_INVALID_SIGNATURE, "mandate header is not JSON"))?;

        let alg = header.get("alg").and_then(Value::as_str).unwrap_or_default();
        if alg.is_empty() {
            return Err(extension_error(
                MANDATE_INVALID_SIGNATURE,
                "mandate header missing alg",
            ));
        }

        tracing::debug!(alg, "Mandate structure verified");
        Ok(())
    }
}

// ============================================================================
// Extension
// ============================================================================

/// AP2 extension: signs every response, gates every completion
pub struct Ap2Extension {
    signer: Arc<dyn Signer>,
    verifier: MandateVerifier,
}

impl Ap2Extension {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self {
            signer,
            verifier: MandateVerifier,
        }
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }
}

impl CheckoutExtension for Ap2Extension {
    fn capability(&self) -> &str {
        AP2_MANDATE_CAPABILITY
    }

    fn after_mutation(&self, checkout: &mut Checkout) -> Result<()> {
        let body = checkout_signing_body(checkout)?;
        let merchant_authorization = sign_body(&body, self.signer.as_ref())?;
        checkout.ap2 = Some(Ap2Response {
            merchant_authorization,
        });
        Ok(())
    }

    fn before_complete(&self, request: &CompleteRequest, _current: &Checkout) -> Result<()> {
        let mandate = request
            .ap2
            .as_ref()
            .map(|a| a.checkout_mandate.as_str())
            .unwrap_or_default();

        if mandate.is_empty() {
            return Err(extension_error(
                MANDATE_REQUIRED,
                "ap2.checkout_mandate is required to complete this checkout",
            ));
        }

        self.verifier.verify(mandate)
    }
}
