//! HTTP Signatures for ActivityPub
//!
//! Implements signing and verification per:
//! https://docs.joinmastodon.org/spec/security/
//!
//! Verification separates "the signature did not verify" (`Ok(false)`)
//! from faults in the key material itself (`Err`), so callers can degrade
//! the former to an anonymous read.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use http::HeaderMap;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use sha2::{Digest, Sha256, Sha512};
use std::time::Duration;

use super::keys::SignatureMaterial;
use super::request::ReadRequest;
use crate::clock::http_date;
use crate::error::AppError;

/// Headers every accepted signature must cover.
pub const REQUIRED_SIGNED_HEADERS: [&str; 3] = ["(request-target)", "host", "date"];

/// Default tolerance between the `Date` header and our clock.
pub const DEFAULT_MAX_SKEW: Duration = Duration::from_secs(300);

/// Signature algorithms we can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSha256,
    RsaSha512,
}

impl SignatureAlgorithm {
    /// Parse a `algorithm=` parameter value.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rsa-sha256" => Some(Self::RsaSha256),
            "rsa-sha512" => Some(Self::RsaSha512),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RsaSha256 => "rsa-sha256",
            Self::RsaSha512 => "rsa-sha512",
        }
    }

    /// Whether a signature claiming `claimed` may be checked with this algorithm.
    ///
    /// `hs2019` defers to the key's own algorithm.
    pub fn admits(self, claimed: &str) -> bool {
        claimed.eq_ignore_ascii_case("hs2019") || Self::from_name(claimed) == Some(self)
    }
}

/// Parsed Signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Algorithm claimed by the sender, if any
    pub algorithm: Option<String>,
    /// Signed header names, lowercased
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
}

/// Parse Signature header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
///
/// `headers` defaults to `date` when absent.
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, AppError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    // Split by comma and parse key=value pairs
    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"');

            match key {
                "keyId" => key_id = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_string()),
                "headers" => {
                    headers = Some(
                        value
                            .split_whitespace()
                            .map(|s| s.to_ascii_lowercase())
                            .collect(),
                    )
                }
                "signature" => signature = Some(value.to_string()),
                _ => {} // Ignore unknown fields
            }
        }
    }

    Ok(ParsedSignature {
        key_id: key_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Validation("Missing keyId".to_string()))?,
        algorithm,
        headers: headers.unwrap_or_else(|| vec!["date".to_string()]),
        signature: signature
            .filter(|sig| !sig.is_empty())
            .ok_or_else(|| AppError::Validation("Missing signature".to_string()))?,
    })
}

/// Find the signature a request carries.
///
/// Looks at `Signature` first, then `Authorization: Signature ...`.
/// Returns `None` when there is no signature or it cannot be parsed; both
/// mean the request is treated as unsigned.
pub fn extract_signature(headers: &HeaderMap) -> Option<ParsedSignature> {
    let raw = headers
        .get("signature")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get(http::header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Signature "))
                .map(str::to_string)
        })?;

    match parse_signature_header(&raw) {
        Ok(parsed) => Some(parsed),
        Err(error) => {
            tracing::debug!(%error, "Ignoring unparseable signature");
            None
        }
    }
}

/// Check a request signature against resolved key material.
#[cfg_attr(test, mockall::automock)]
pub trait RequestVerifier: Send + Sync {
    /// `Ok(true)` if the signature verifies, `Ok(false)` if it does not,
    /// `Err` only when the key material itself is unusable.
    fn verify(
        &self,
        request: &ReadRequest,
        signature: &ParsedSignature,
        material: &SignatureMaterial,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;
}

/// RSA PKCS#1 v1.5 verifier for draft-cavage signatures.
#[derive(Debug, Clone)]
pub struct RsaVerifier {
    max_skew: Duration,
}

impl Default for RsaVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SKEW)
    }
}

impl RsaVerifier {
    pub fn new(max_skew: Duration) -> Self {
        Self { max_skew }
    }
}

impl RequestVerifier for RsaVerifier {
    fn verify(
        &self,
        request: &ReadRequest,
        signature: &ParsedSignature,
        material: &SignatureMaterial,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let key_id = signature.key_id.as_str();

        // 1. Claimed algorithm must agree with the key.
        if let Some(claimed) = signature.algorithm.as_deref() {
            if !material.algorithm.admits(claimed) {
                tracing::debug!(
                    key_id,
                    claimed,
                    key_algorithm = material.algorithm.name(),
                    "Signature algorithm mismatch"
                );
                return Ok(false);
            }
        }

        // 2. Required headers must be covered.
        for required in REQUIRED_SIGNED_HEADERS {
            if !signature.headers.iter().any(|h| h == required) {
                tracing::debug!(key_id, required, "Signature does not cover required header");
                return Ok(false);
            }
        }

        // 3. Date must be recent.
        let Some(date) = header_value(request.headers(), "date") else {
            tracing::debug!(key_id, "Signed request has no Date header");
            return Ok(false);
        };
        let Ok(date) = DateTime::parse_from_rfc2822(&date) else {
            tracing::debug!(key_id, date = %date, "Unparseable Date header");
            return Ok(false);
        };
        let skew = (now.timestamp() - date.timestamp()).unsigned_abs();
        if skew > self.max_skew.as_secs() {
            tracing::debug!(key_id, skew, "Date header too old or in future");
            return Ok(false);
        }

        // 4. Reconstruct signing string.
        let Some(signing_string) = signing_string(request, &signature.headers) else {
            tracing::debug!(key_id, "Signed header missing from request");
            return Ok(false);
        };

        // 5. Decode key and signature.
        let public_key = decode_public_key(&material.public_key_pem)?;
        let Ok(signature_bytes) = BASE64.decode(&signature.signature) else {
            tracing::debug!(key_id, "Invalid signature encoding");
            return Ok(false);
        };
        let Ok(signature_value) = Pkcs1v15Signature::try_from(signature_bytes.as_slice()) else {
            tracing::debug!(key_id, "Invalid signature format");
            return Ok(false);
        };

        // 6. Verify.
        let verified = match material.algorithm {
            SignatureAlgorithm::RsaSha256 => VerifyingKey::<Sha256>::new(public_key)
                .verify(signing_string.as_bytes(), &signature_value)
                .is_ok(),
            SignatureAlgorithm::RsaSha512 => VerifyingKey::<Sha512>::new(public_key)
                .verify(signing_string.as_bytes(), &signature_value)
                .is_ok(),
        };

        if !verified {
            tracing::debug!(key_id, "Signature verification failed");
        }
        Ok(verified)
    }
}

/// Decode an RSA public key from SPKI (`BEGIN PUBLIC KEY`) or PKCS#1 PEM.
pub fn decode_public_key(pem: &str) -> Result<RsaPublicKey, AppError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| AppError::KeyResolution(format!("Invalid public key: {}", e)))
}

/// All values of a header joined per RFC 9110.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let values = headers
        .get_all(name)
        .iter()
        .map(|v| v.to_str().map(str::trim))
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if values.is_empty() {
        return None;
    }
    Some(values.join(", "))
}

fn signing_string(request: &ReadRequest, signed_headers: &[String]) -> Option<String> {
    let mut signing_parts = Vec::with_capacity(signed_headers.len());

    for header_name in signed_headers {
        let value = match header_name.as_str() {
            "(request-target)" => format!(
                "{} {}",
                request.method().as_str().to_lowercase(),
                request.path_and_query()
            ),
            // HTTP/2 carries the host in the URI authority instead.
            "host" => header_value(request.headers(), "host")
                .or_else(|| request.uri().authority().map(|a| a.to_string()))?,
            name if name.starts_with('(') => return None,
            name => header_value(request.headers(), name)?,
        };
        signing_parts.push(format!("{}: {}", header_name, value));
    }

    Some(signing_parts.join("\n"))
}

/// Headers to add for signed request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    /// Signature header value
    pub signature: String,
    /// Date header value (RFC 7231)
    pub date: String,
    /// Digest header value (if body present)
    pub digest: Option<String>,
}

/// Sign an HTTP request
///
/// Creates the HTTP Signature header for an outgoing request.
///
/// # Arguments
/// * `method` - HTTP method (e.g., "GET")
/// * `url` - Full URL being requested
/// * `body` - Request body (for digest)
/// * `private_key_pem` - RSA private key in PKCS#8 or PKCS#1 PEM format
/// * `key_id` - Full URL to the public key (actor#main-key)
/// * `now` - Value for the Date header
pub fn sign_request(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
    private_key_pem: &str,
    key_id: &str,
    now: DateTime<Utc>,
) -> Result<SignatureHeaders, AppError> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{SignatureEncoding, Signer};

    // 1. Parse URL to get host and path
    let parsed_url =
        url::Url::parse(url).map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

    let host = parsed_url
        .host_str()
        .ok_or_else(|| AppError::Validation("Missing host in URL".to_string()))?;
    let host = match parsed_url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path_and_query = match parsed_url.query() {
        Some(q) => format!("{}?{}", parsed_url.path(), q),
        None => parsed_url.path().to_string(),
    };

    // 2. Date and optional Digest
    let date = http_date(now);
    let digest = body.map(generate_digest);

    // 3. Build signing string
    let mut signing_parts = vec![
        format!(
            "(request-target): {} {}",
            method.to_lowercase(),
            path_and_query
        ),
        format!("host: {}", host),
        format!("date: {}", date),
    ];
    let mut headers_list = vec!["(request-target)", "host", "date"];

    if let Some(ref digest_value) = digest {
        signing_parts.push(format!("digest: {}", digest_value));
        headers_list.push("digest");
    }

    let signing_string = signing_parts.join("\n");

    // 4. Sign with RSA-SHA256
    let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .or_else(|_| rsa::RsaPrivateKey::from_pkcs1_pem(private_key_pem))
        .map_err(|e| AppError::Config(format!("Invalid private key: {}", e)))?;

    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(private_key);
    let signature = signing_key.sign(signing_string.as_bytes());
    let signature_b64 = BASE64.encode(signature.to_bytes());

    // 5. Build Signature header
    let signature_header = format!(
        "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        key_id,
        headers_list.join(" "),
        signature_b64
    );

    Ok(SignatureHeaders {
        signature: signature_header,
        date,
        digest,
    })
}

/// Generate SHA-256 digest for body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let hash = hasher.finalize();
    format!("SHA-256={}", BASE64.encode(hash))
}
