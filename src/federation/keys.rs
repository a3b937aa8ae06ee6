//! Signature key resolution
//!
//! Maps a signature `keyId` to the public key, algorithm and owning actor
//! that signed the request.

use std::net::IpAddr;
use std::sync::Arc;

use axum::async_trait;
use url::Url;

use super::signature::{SignatureAlgorithm, sign_request};
use crate::clock::Clock;
use crate::error::AppError;

/// Key material resolved from a key id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMaterial {
    pub key_id: String,
    /// PEM-encoded RSA public key
    pub public_key_pem: String,
    pub algorithm: SignatureAlgorithm,
    /// Actor that owns the key
    pub owner: Url,
}

/// Resolves a key id to [`SignatureMaterial`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, key_id: &str) -> Result<SignatureMaterial, AppError>;
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &str) -> bool {
    let normalized = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if normalized == "localhost" || normalized.ends_with(".localhost") {
        return true;
    }

    normalized
        .parse::<IpAddr>()
        .map(is_disallowed_ip)
        .unwrap_or(false)
}

async fn validate_resolved_host_ips(host: &str, port: u16) -> Result<(), AppError> {
    let normalized = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();

    let mut resolved_any = false;
    let lookup = tokio::net::lookup_host((normalized.as_str(), port))
        .await
        .map_err(|e| AppError::KeyResolution(format!("Failed to resolve actor host: {}", e)))?;

    for addr in lookup {
        resolved_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(AppError::KeyResolution(format!(
                "Actor host {} resolves to a disallowed address",
                normalized
            )));
        }
    }

    if !resolved_any {
        return Err(AppError::KeyResolution(
            "No DNS records for actor host".to_string(),
        ));
    }

    Ok(())
}

/// Validate a key id and return the actor document URL it points into.
///
/// Rejects non-HTTP(S) URLs and local/private hosts.
pub fn actor_url_for_key(key_id: &str) -> Result<Url, AppError> {
    let mut actor_url = Url::parse(key_id)
        .map_err(|e| AppError::KeyResolution(format!("Invalid keyId URL: {}", e)))?;

    match actor_url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::KeyResolution(format!(
                "Unsupported keyId URL scheme: {}",
                scheme
            )));
        }
    }

    let host = actor_url
        .host_str()
        .ok_or_else(|| AppError::KeyResolution("Missing host in keyId URL".to_string()))?;

    if is_disallowed_host(host) {
        return Err(AppError::KeyResolution(format!(
            "Refusing to fetch keys from {}",
            host
        )));
    }

    actor_url.set_fragment(None);
    Ok(actor_url)
}

/// Check that a key id points into the given actor document.
///
/// Both sides are compared without their fragment.
pub fn key_id_matches_actor(key_id: &str, actor_id: &str) -> bool {
    let key_actor = key_id.split('#').next().unwrap_or(key_id);
    let actor = actor_id.split('#').next().unwrap_or(actor_id);
    key_actor == actor
}

/// Pull key material for `key_id` out of a fetched document.
///
/// The document may be the actor (with an embedded `publicKey`, possibly
/// an array of keys) or the key object itself. Either way the advertised
/// key id must equal `key_id`, and the owner must live on the same origin
/// as the key. An actor document must be the actor `key_id` points into
/// and must own the key itself.
pub fn key_material_from_document(
    key_id: &str,
    document: &serde_json::Value,
) -> Result<SignatureMaterial, AppError> {
    let key_url = Url::parse(key_id)
        .map_err(|e| AppError::KeyResolution(format!("Invalid keyId URL: {}", e)))?;

    let (key, actor_id) = if document.get("publicKeyPem").is_some() {
        (document, None)
    } else {
        let actor_id = document
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| AppError::KeyResolution("Missing actor id".to_string()))?;
        if !key_id_matches_actor(key_id, actor_id) {
            return Err(AppError::KeyResolution(
                "Signature keyId actor mismatch".to_string(),
            ));
        }

        let key = match document.get("publicKey") {
            Some(serde_json::Value::Array(keys)) => keys
                .iter()
                .find(|key| key.get("id").and_then(|id| id.as_str()) == Some(key_id))
                .ok_or_else(|| {
                    AppError::KeyResolution(format!("Actor does not advertise key {}", key_id))
                })?,
            Some(key) => key,
            None => {
                return Err(AppError::KeyResolution(
                    "Missing publicKey in actor".to_string(),
                ));
            }
        };
        (key, Some(actor_id))
    };

    let advertised_key_id = key
        .get("id")
        .and_then(|id| id.as_str())
        .ok_or_else(|| AppError::KeyResolution("Missing publicKey.id".to_string()))?;
    if advertised_key_id != key_id {
        return Err(AppError::KeyResolution(
            "Signature keyId does not match advertised public key id".to_string(),
        ));
    }

    let public_key_pem = key
        .get("publicKeyPem")
        .and_then(|pem| pem.as_str())
        .ok_or_else(|| AppError::KeyResolution("Missing publicKeyPem".to_string()))?;

    let owner = key
        .get("owner")
        .or_else(|| key.get("controller"))
        .and_then(|owner| owner.as_str())
        .or(actor_id)
        .ok_or_else(|| AppError::KeyResolution("Missing key owner".to_string()))?;
    if actor_id.is_some_and(|actor_id| owner != actor_id) {
        return Err(AppError::KeyResolution(format!(
            "Key {} is not owned by the actor that advertises it",
            key_id
        )));
    }

    let owner = Url::parse(owner)
        .map_err(|e| AppError::KeyResolution(format!("Invalid key owner: {}", e)))?;
    if owner.origin() != key_url.origin() {
        return Err(AppError::KeyResolution(format!(
            "Key {} claims an owner on another origin: {}",
            key_id, owner
        )));
    }

    Ok(SignatureMaterial {
        key_id: key_id.to_string(),
        public_key_pem: public_key_pem.to_string(),
        algorithm: SignatureAlgorithm::RsaSha256,
        owner,
    })
}

/// Instance key used to sign outbound key fetches.
#[derive(Clone)]
pub struct SigningIdentity {
    pub key_id: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Resolves keys by fetching the owning actor document.
pub struct HttpKeyResolver {
    http_client: Arc<reqwest::Client>,
    clock: Arc<dyn Clock>,
    signing: Option<SigningIdentity>,
}

impl HttpKeyResolver {
    pub fn new(http_client: Arc<reqwest::Client>, clock: Arc<dyn Clock>) -> Self {
        Self {
            http_client,
            clock,
            signing: None,
        }
    }

    /// Sign actor fetches, for peers that only serve keys to signed requests.
    pub fn with_signing_identity(mut self, signing: SigningIdentity) -> Self {
        self.signing = Some(signing);
        self
    }
}

#[async_trait]
impl KeyResolver for HttpKeyResolver {
    async fn resolve(&self, key_id: &str) -> Result<SignatureMaterial, AppError> {
        let actor_url = actor_url_for_key(key_id)?;
        let actor_host = actor_url
            .host_str()
            .ok_or_else(|| AppError::KeyResolution("Missing host in keyId URL".to_string()))?;
        let actor_port = actor_url
            .port_or_known_default()
            .ok_or_else(|| AppError::KeyResolution("Missing port in keyId URL".to_string()))?;

        // Resolve DNS before fetching and reject local/private destinations.
        validate_resolved_host_ips(actor_host, actor_port).await?;

        let mut request = self
            .http_client
            .get(actor_url.as_str())
            .header("Accept", "application/activity+json");

        if let Some(signing) = &self.signing {
            let signed = sign_request(
                "GET",
                actor_url.as_str(),
                None,
                &signing.private_key_pem,
                &signing.key_id,
                self.clock.now(),
            )?;
            request = request
                .header("Date", signed.date)
                .header("Signature", signed.signature);
        }

        tracing::debug!(key_id, actor = %actor_url, "Fetching actor for key");

        let response = request
            .send()
            .await
            .map_err(|e| AppError::KeyResolution(format!("Failed to fetch actor: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::KeyResolution(format!(
                "Failed to fetch actor: HTTP {}",
                response.status()
            )));
        }

        let document: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::KeyResolution(format!("Failed to parse actor: {}", e)))?;

        key_material_from_document(key_id, &document)
    }
}
