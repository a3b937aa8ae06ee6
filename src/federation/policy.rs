//! Authorization policy adapters
//!
//! A policy inspects the raw request before any signature work and returns
//! a [`PolicyVerdict`]. Policies are injected into the pipeline at
//! construction; having none configured means "no opinion".

use axum::async_trait;
use serde::Deserialize;
use url::Url;

use super::request::ReadRequest;
use crate::error::AppError;

/// What a policy concluded about a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicyVerdict {
    /// The policy established who is asking.
    pub authenticated: bool,
    /// The policy permits the read.
    pub authorized: bool,
    /// Identity the policy vouches for. Only honoured when `authenticated`.
    pub verified_user: Option<Url>,
}

impl PolicyVerdict {
    /// Authorized and authenticated, optionally as a known user.
    pub fn allow(verified_user: Option<Url>) -> Self {
        Self {
            authenticated: true,
            authorized: true,
            verified_user,
        }
    }

    /// Authorized, but the caller must still prove who they are.
    pub fn allow_if_signed() -> Self {
        Self {
            authenticated: false,
            authorized: true,
            verified_user: None,
        }
    }

    /// Known caller that may not read this resource.
    pub fn deny() -> Self {
        Self {
            authenticated: true,
            authorized: false,
            verified_user: None,
        }
    }
}

/// Pluggable read authorization.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorizationPolicy: Send + Sync {
    /// `Err` is a hard failure and aborts the request.
    async fn authorize(&self, request: &ReadRequest) -> Result<PolicyVerdict, AppError>;
}

/// Everything is readable; signatures are never checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenReadPolicy;

#[async_trait]
impl AuthorizationPolicy for OpenReadPolicy {
    async fn authorize(&self, _request: &ReadRequest) -> Result<PolicyVerdict, AppError> {
        Ok(PolicyVerdict::allow(None))
    }
}

/// Every read must carry a valid HTTP signature ("authorized fetch").
#[derive(Debug, Clone, Copy, Default)]
pub struct SignedReadPolicy;

#[async_trait]
impl AuthorizationPolicy for SignedReadPolicy {
    async fn authorize(&self, _request: &ReadRequest) -> Result<PolicyVerdict, AppError> {
        Ok(PolicyVerdict::allow_if_signed())
    }
}

/// Policy selected by configuration.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadPolicyMode {
    /// No adapter; signatures are checked when present.
    #[default]
    Optional,
    /// [`OpenReadPolicy`]
    Open,
    /// [`SignedReadPolicy`]
    Signed,
}

impl ReadPolicyMode {
    /// Adapter for this mode, if any.
    pub fn build(self) -> Option<std::sync::Arc<dyn AuthorizationPolicy>> {
        match self {
            ReadPolicyMode::Optional => None,
            ReadPolicyMode::Open => Some(std::sync::Arc::new(OpenReadPolicy)),
            ReadPolicyMode::Signed => Some(std::sync::Arc::new(SignedReadPolicy)),
        }
    }
}
