//! Federated read pipeline
//!
//! Runs one ActivityPub GET through the fixed sequence of stages:
//!
//! ```text
//! negotiation -> ownership -> policy -> signature -> verdict -> fetch -> response
//! ```
//!
//! Each stage either hands off to the next or ends the request. All
//! collaborators are injected at construction; the pipeline holds no
//! per-request state and is shared across tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::keys::KeyResolver;
use super::negotiation::is_federated_read;
use super::policy::AuthorizationPolicy;
use super::request::ReadRequest;
use super::response::{ResponseEnvelope, ResponseOptions, assemble};
use super::signature::{RequestVerifier, RsaVerifier, extract_signature};
use super::verdict::{
    AccessDecision, PolicyStage, Rejection, ResolvedIdentity, SignatureOutcome,
    SignatureRequirement, evaluate_policy, settle_signature,
};
use crate::clock::Clock;
use crate::data::ObjectStore;
use crate::error::AppError;
use crate::metrics::SIGNATURE_CHECKS_TOTAL;

/// Default bound on each collaborator call.
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(10);

/// How the pipeline disposed of a request.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Not a federated read; the host application should serve it.
    NotHandled,
    /// Ended with a bare status.
    Rejected(Rejection),
    /// The object was fetched and a response assembled.
    Served {
        identity: ResolvedIdentity,
        response: ResponseEnvelope,
    },
}

impl ReadOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            ReadOutcome::NotHandled => "not_handled",
            ReadOutcome::Rejected(rejection) => rejection.label(),
            ReadOutcome::Served { response, .. } if response.status.as_u16() == 410 => "gone",
            ReadOutcome::Served {
                identity: ResolvedIdentity::Anonymous,
                ..
            } => "served_anonymous",
            ReadOutcome::Served { .. } => "served_verified",
        }
    }
}

/// Serves ActivityPub GETs for objects this server owns.
pub struct ReadPipeline {
    store: Arc<dyn ObjectStore>,
    keys: Arc<dyn KeyResolver>,
    verifier: Arc<dyn RequestVerifier>,
    policy: Option<Arc<dyn AuthorizationPolicy>>,
    clock: Arc<dyn Clock>,
    options: ResponseOptions,
    collaborator_timeout: Duration,
}

impl ReadPipeline {
    /// Pipeline without a policy adapter, verifying with [`RsaVerifier`].
    pub fn new(
        store: Arc<dyn ObjectStore>,
        keys: Arc<dyn KeyResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            keys,
            verifier: Arc::new(RsaVerifier::default()),
            policy: None,
            clock,
            options: ResponseOptions::default(),
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: Option<Arc<dyn AuthorizationPolicy>>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn RequestVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_response_options(mut self, options: ResponseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    /// Run `request` through the pipeline.
    ///
    /// `Err` is a hard failure: a collaborator failed or timed out, the key
    /// material was unusable, or the response could not be built. No partial
    /// response exists in that case.
    pub async fn handle(&self, request: &ReadRequest) -> Result<ReadOutcome, AppError> {
        if !is_federated_read(request.method(), request.headers()) {
            return Ok(ReadOutcome::NotHandled);
        }

        let target = request.target();
        if !self.bounded("ownership check", self.store.owns(target)).await? {
            tracing::debug!(iri = %target, "Federated read for object we do not own");
            return Ok(ReadOutcome::Rejected(Rejection::NotOwned));
        }

        let decision = match self.consult_policy(request).await? {
            PolicyStage::Reject(rejection) => AccessDecision::Reject(rejection),
            PolicyStage::Settled(identity) => AccessDecision::Grant(identity),
            PolicyStage::CheckSignature(requirement) => {
                let outcome = self.check_signature(request, requirement).await?;
                settle_signature(requirement, outcome)
            }
        };

        let identity = match decision {
            AccessDecision::Reject(rejection) => {
                tracing::debug!(iri = %target, ?rejection, "Federated read rejected");
                return Ok(ReadOutcome::Rejected(rejection));
            }
            AccessDecision::Grant(identity) => identity,
        };

        let object = match identity.user() {
            None => self.bounded("object fetch", self.store.fetch_public(target)).await?,
            Some(user) => {
                self.bounded("object fetch", self.store.fetch_as(target, user))
                    .await?
            }
        };

        let response = assemble(object, &identity, self.clock.now(), &self.options)?;
        Ok(ReadOutcome::Served { identity, response })
    }

    async fn consult_policy(&self, request: &ReadRequest) -> Result<PolicyStage, AppError> {
        let Some(policy) = &self.policy else {
            return Ok(evaluate_policy(None));
        };

        let verdict = self
            .bounded("authorization policy", policy.authorize(request))
            .await?;
        tracing::trace!(
            authenticated = verdict.authenticated,
            authorized = verdict.authorized,
            "Policy verdict"
        );
        Ok(evaluate_policy(Some(&verdict)))
    }

    async fn check_signature(
        &self,
        request: &ReadRequest,
        requirement: SignatureRequirement,
    ) -> Result<SignatureOutcome, AppError> {
        let Some(signature) = extract_signature(request.headers()) else {
            SIGNATURE_CHECKS_TOTAL.with_label_values(&["absent"]).inc();
            return Ok(SignatureOutcome::Absent);
        };

        let material = self
            .bounded("key resolution", self.keys.resolve(&signature.key_id))
            .await
            .inspect_err(|_| {
                SIGNATURE_CHECKS_TOTAL.with_label_values(&["error"]).inc();
            })?;

        let verified = self
            .verifier
            .verify(request, &signature, &material, self.clock.now())
            .inspect_err(|_| {
                SIGNATURE_CHECKS_TOTAL.with_label_values(&["error"]).inc();
            })?;

        if verified {
            SIGNATURE_CHECKS_TOTAL.with_label_values(&["verified"]).inc();
            tracing::debug!(key_id = %signature.key_id, owner = %material.owner, "Signature verified");
            Ok(SignatureOutcome::Verified(material.owner))
        } else {
            SIGNATURE_CHECKS_TOTAL.with_label_values(&["failed"]).inc();
            tracing::debug!(key_id = %signature.key_id, ?requirement, "Signature did not verify");
            Ok(SignatureOutcome::Failed)
        }
    }

    /// Bound a collaborator call by the configured timeout.
    async fn bounded<T, F>(&self, stage: &'static str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        tokio::time::timeout(self.collaborator_timeout, call)
            .await
            .map_err(|_| AppError::Timeout(stage))?
    }
}
