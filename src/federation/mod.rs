//! ActivityPub federation module
//!
//! Handles:
//! - Content negotiation for federated reads
//! - HTTP Signatures
//! - Public key resolution and caching
//! - Authorization policy adapters
//! - Response assembly

mod key_cache;
mod keys;
mod negotiation;
mod pipeline;
mod policy;
mod request;
mod response;
mod signature;
mod verdict;

pub use key_cache::{CacheStats, CachingKeyResolver};
pub use keys::{
    HttpKeyResolver, KeyResolver, SignatureMaterial, SigningIdentity, actor_url_for_key,
    key_material_from_document,
};
pub use negotiation::{ACTIVITY_JSON_LD, is_federated_read};
pub use pipeline::{DEFAULT_COLLABORATOR_TIMEOUT, ReadOutcome, ReadPipeline};
pub use policy::{
    AuthorizationPolicy, OpenReadPolicy, PolicyVerdict, ReadPolicyMode, SignedReadPolicy,
};
pub use request::ReadRequest;
pub use response::{ResponseEnvelope, ResponseOptions, assemble};
pub use signature::{
    DEFAULT_MAX_SKEW, ParsedSignature, REQUIRED_SIGNED_HEADERS, RequestVerifier, RsaVerifier,
    SignatureAlgorithm, SignatureHeaders, extract_signature, generate_digest,
    parse_signature_header, sign_request,
};
pub use verdict::{
    AccessDecision, PolicyStage, Rejection, ResolvedIdentity, SignatureOutcome,
    SignatureRequirement, evaluate_policy, settle_signature,
};
