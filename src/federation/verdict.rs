//! Verdict combiner
//!
//! Reconciles the policy verdict and the signature check into exactly one
//! [`AccessDecision`]. The evaluation order is fixed:
//!
//! 1. policy `authenticated && !authorized` -> 403
//! 2. policy `!authenticated && !authorized` -> 400
//! 3. policy `!authenticated && authorized` -> signature mandatory
//! 4. policy `authenticated && authorized` -> granted, signatures skipped
//! 5. no policy -> signature optional
//!
//! Hard failures (policy errors, key resolution errors) never reach this
//! module; the pipeline propagates them before a decision is made.

use http::StatusCode;
use url::Url;

use super::policy::PolicyVerdict;

/// Terminal rejection of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The target is not hosted here (404).
    NotOwned,
    /// The policy contradicts itself, or a required signature is absent (400).
    Malformed,
    /// The policy vetoed a known caller, or a required signature failed (403).
    Forbidden,
}

impl Rejection {
    pub fn status(self) -> StatusCode {
        match self {
            Rejection::NotOwned => StatusCode::NOT_FOUND,
            Rejection::Malformed => StatusCode::BAD_REQUEST,
            Rejection::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    /// Metric label.
    pub fn label(self) -> &'static str {
        match self {
            Rejection::NotOwned => "not_found",
            Rejection::Malformed => "bad_request",
            Rejection::Forbidden => "forbidden",
        }
    }
}

/// Who the object is fetched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIdentity {
    Anonymous,
    Verified(Url),
}

impl ResolvedIdentity {
    pub fn from_user(user: Option<Url>) -> Self {
        user.map_or(ResolvedIdentity::Anonymous, ResolvedIdentity::Verified)
    }

    pub fn user(&self) -> Option<&Url> {
        match self {
            ResolvedIdentity::Anonymous => None,
            ResolvedIdentity::Verified(user) => Some(user),
        }
    }
}

/// Whether a signature has to be present and valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureRequirement {
    /// A missing or failing signature degrades to an anonymous read.
    Optional,
    /// A missing signature is 400, a failing one is 403.
    Mandatory,
}

/// State after the policy has been consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyStage {
    Reject(Rejection),
    /// The policy settled the identity; signatures are not examined.
    Settled(ResolvedIdentity),
    CheckSignature(SignatureRequirement),
}

/// Result of the signature engine, after key resolution succeeded or was
/// never needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureOutcome {
    Absent,
    Failed,
    Verified(Url),
}

/// Final access decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Reject(Rejection),
    Grant(ResolvedIdentity),
}

/// Evaluate the policy verdict. `None` means no policy is configured.
pub fn evaluate_policy(verdict: Option<&PolicyVerdict>) -> PolicyStage {
    let Some(verdict) = verdict else {
        return PolicyStage::CheckSignature(SignatureRequirement::Optional);
    };

    match (verdict.authenticated, verdict.authorized) {
        (true, false) => PolicyStage::Reject(Rejection::Forbidden),
        (false, false) => PolicyStage::Reject(Rejection::Malformed),
        (false, true) => {
            // A policy that did not authenticate cannot vouch for anyone.
            // Its verified_user is dropped here, and the caller has to prove
            // identity with a signature instead.
            PolicyStage::CheckSignature(SignatureRequirement::Mandatory)
        }
        (true, true) => {
            PolicyStage::Settled(ResolvedIdentity::from_user(verdict.verified_user.clone()))
        }
    }
}

/// Settle the signature outcome against the requirement.
pub fn settle_signature(
    requirement: SignatureRequirement,
    outcome: SignatureOutcome,
) -> AccessDecision {
    match (requirement, outcome) {
        (_, SignatureOutcome::Verified(owner)) => {
            AccessDecision::Grant(ResolvedIdentity::Verified(owner))
        }
        (SignatureRequirement::Mandatory, SignatureOutcome::Absent) => {
            AccessDecision::Reject(Rejection::Malformed)
        }
        (SignatureRequirement::Mandatory, SignatureOutcome::Failed) => {
            AccessDecision::Reject(Rejection::Forbidden)
        }
        (SignatureRequirement::Optional, SignatureOutcome::Absent)
        | (SignatureRequirement::Optional, SignatureOutcome::Failed) => {
            AccessDecision::Grant(ResolvedIdentity::Anonymous)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Url {
        Url::parse("https://remote.example/users/alice").unwrap()
    }

    fn mallory() -> Url {
        Url::parse("https://evil.example/users/mallory").unwrap()
    }

    fn verdict(authenticated: bool, authorized: bool, user: Option<Url>) -> PolicyVerdict {
        PolicyVerdict {
            authenticated,
            authorized,
            verified_user: user,
        }
    }

    /// Run both stages the way the pipeline does.
    fn combine(policy: Option<&PolicyVerdict>, signature: SignatureOutcome) -> AccessDecision {
        match evaluate_policy(policy) {
            PolicyStage::Reject(rejection) => AccessDecision::Reject(rejection),
            PolicyStage::Settled(identity) => AccessDecision::Grant(identity),
            PolicyStage::CheckSignature(requirement) => settle_signature(requirement, signature),
        }
    }

    #[test]
    fn every_combination_yields_exactly_one_decision() {
        let policies: Vec<Option<PolicyVerdict>> = vec![
            None,
            Some(verdict(false, false, None)),
            Some(verdict(false, true, Some(mallory()))),
            Some(verdict(true, false, None)),
            Some(verdict(true, true, Some(alice()))),
            Some(verdict(true, true, None)),
        ];
        let signatures = [
            SignatureOutcome::Absent,
            SignatureOutcome::Failed,
            SignatureOutcome::Verified(alice()),
        ];

        for policy in &policies {
            for signature in &signatures {
                let decision = combine(policy.as_ref(), signature.clone());
                let expected = match (policy.as_ref().map(|v| (v.authenticated, v.authorized)), signature) {
                    (Some((true, false)), _) => AccessDecision::Reject(Rejection::Forbidden),
                    (Some((false, false)), _) => AccessDecision::Reject(Rejection::Malformed),
                    (Some((true, true)), _) => AccessDecision::Grant(ResolvedIdentity::from_user(
                        policy.as_ref().and_then(|v| v.verified_user.clone()),
                    )),
                    (Some((false, true)), SignatureOutcome::Absent) => {
                        AccessDecision::Reject(Rejection::Malformed)
                    }
                    (Some((false, true)), SignatureOutcome::Failed) => {
                        AccessDecision::Reject(Rejection::Forbidden)
                    }
                    (None, SignatureOutcome::Absent) | (None, SignatureOutcome::Failed) => {
                        AccessDecision::Grant(ResolvedIdentity::Anonymous)
                    }
                    (_, SignatureOutcome::Verified(owner)) => {
                        AccessDecision::Grant(ResolvedIdentity::Verified(owner.clone()))
                    }
                };
                assert_eq!(decision, expected, "policy={policy:?} signature={signature:?}");
            }
        }
    }

    #[test]
    fn unauthenticated_policy_cannot_vouch_for_a_user() {
        let spoofing = verdict(false, true, Some(mallory()));
        assert_eq!(
            evaluate_policy(Some(&spoofing)),
            PolicyStage::CheckSignature(SignatureRequirement::Mandatory)
        );
        assert_eq!(
            combine(Some(&spoofing), SignatureOutcome::Absent),
            AccessDecision::Reject(Rejection::Malformed)
        );
        assert_eq!(
            combine(Some(&spoofing), SignatureOutcome::Verified(alice())),
            AccessDecision::Grant(ResolvedIdentity::Verified(alice()))
        );
    }

    #[test]
    fn authenticated_policy_settles_without_signature() {
        assert_eq!(
            evaluate_policy(Some(&verdict(true, true, Some(alice())))),
            PolicyStage::Settled(ResolvedIdentity::Verified(alice()))
        );
        assert_eq!(
            evaluate_policy(Some(&verdict(true, true, None))),
            PolicyStage::Settled(ResolvedIdentity::Anonymous)
        );
    }

    #[test]
    fn optional_signature_failures_degrade_to_anonymous() {
        for outcome in [SignatureOutcome::Absent, SignatureOutcome::Failed] {
            assert_eq!(
                settle_signature(SignatureRequirement::Optional, outcome),
                AccessDecision::Grant(ResolvedIdentity::Anonymous)
            );
        }
    }

    #[test]
    fn rejection_statuses() {
        assert_eq!(Rejection::NotOwned.status(), StatusCode::NOT_FOUND);
        assert_eq!(Rejection::Malformed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(Rejection::Forbidden.status(), StatusCode::FORBIDDEN);
    }
}
