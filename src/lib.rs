//! apgate - serves ActivityPub objects to federated readers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Read gate middleware (federated GETs)                    │
//! │  - Health / metrics                                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Federation Layer                          │
//! │  - Content negotiation, HTTP Signatures, key resolution     │
//! │  - Authorization policy, verdict, response assembly         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - FederatedObject seam, JSON-LD contexts                   │
//! │  - Object store                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP surface
//! - `federation`: the federated read pipeline
//! - `data`: objects and storage
//! - `clock`: time source
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus registry

pub mod api;
pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::data::{MemoryStore, ObjectStore};
use crate::federation::{
    CachingKeyResolver, HttpKeyResolver, KeyResolver, ReadPipeline, ResponseOptions,
    RsaVerifier, SigningIdentity,
};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Scheme and authority used to build target IRIs
    pub base_url: url::Url,

    /// Federated read pipeline
    pub pipeline: Arc<ReadPipeline>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Seed the object store
    /// 2. Build the HTTP client and key resolver
    /// 3. Assemble the read pipeline
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Object store
        let store = match &config.store.seed_path {
            Some(path) => MemoryStore::from_seed_file(path).await?,
            None => {
                tracing::warn!("No store.seed_path configured; serving an empty store");
                MemoryStore::new()
            }
        };

        // 2. Key resolution
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("apgate/", env!("CARGO_PKG_VERSION")))
            .timeout(config.federation.collaborator_timeout())
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut resolver = HttpKeyResolver::new(Arc::new(http_client), clock.clone());
        if let (Some(key_id), Some(path)) = (
            &config.federation.signing_key_id,
            &config.federation.signing_key_path,
        ) {
            let private_key_pem = tokio::fs::read_to_string(path).await?;
            resolver = resolver.with_signing_identity(SigningIdentity {
                key_id: key_id.clone(),
                private_key_pem,
            });
            tracing::info!(key_id = %key_id, "Key fetches will be signed");
        }
        let keys = CachingKeyResolver::new(
            Arc::new(resolver),
            Some(config.federation.key_cache_ttl()),
        );

        Self::with_collaborators(config, Arc::new(store), Arc::new(keys), clock)
    }

    /// Build state around explicit collaborators.
    ///
    /// Policy, verifier and response settings still come from `config`.
    pub fn with_collaborators(
        config: config::AppConfig,
        store: Arc<dyn ObjectStore>,
        keys: Arc<dyn KeyResolver>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, error::AppError> {
        let base_url = config.server.base_url()?;

        // 3. Read pipeline
        let pipeline = ReadPipeline::new(store, keys, clock)
            .with_verifier(Arc::new(RsaVerifier::new(
                config.federation.signature_max_skew(),
            )))
            .with_policy(config.federation.read_policy.build())
            .with_response_options(ResponseOptions {
                public_max_age_seconds: config.federation.public_max_age_seconds,
            })
            .with_collaborator_timeout(config.federation.collaborator_timeout());

        tracing::info!(
            base_url = %base_url,
            read_policy = ?config.federation.read_policy,
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            base_url,
            pipeline: Arc::new(pipeline),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, http::StatusCode, middleware};
    use tower_http::trace::TraceLayer;

    Router::new()
        .merge(api::operational_router())
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::federated_read_gate,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
