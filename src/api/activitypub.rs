//! ActivityPub read gate
//!
//! Middleware that answers federated GETs for objects this server owns.
//! Anything that is not a federated read is passed to the next service
//! untouched.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::error::AppError;
use crate::federation::{ReadOutcome, ReadRequest, is_federated_read};
use crate::metrics::{
    ERRORS_TOTAL, FEDERATED_READS_TOTAL, HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL,
};

const ENDPOINT: &str = "federated_read";

/// Serve federated reads through the [`crate::federation::ReadPipeline`].
///
/// # Usage
/// ```ignore
/// let app = Router::new()
///     .route("/health", get(health_check))
///     .layer(middleware::from_fn_with_state(state, federated_read_gate));
/// ```
pub async fn federated_read_gate(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_federated_read(request.method(), request.headers()) {
        return next.run(request).await;
    }

    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", ENDPOINT])
        .start_timer();

    let (parts, _body) = request.into_parts();
    let read = match ReadRequest::from_parts(&parts, &state.base_url) {
        Ok(read) => read,
        Err(error) => {
            tracing::debug!(%error, uri = %parts.uri, "Unusable federated read target");
            return fail("bad_target", &error);
        }
    };

    let outcome = match state.pipeline.handle(&read).await {
        Ok(outcome) => outcome,
        Err(error) => {
            // Hard failures end the request with a bare status and no body.
            tracing::warn!(iri = %read.target(), %error, "Federated read failed");
            return fail("error", &error);
        }
    };

    let label = outcome.label();
    match outcome {
        ReadOutcome::NotHandled => {
            // Only reachable if the gate above and the pipeline's own
            // negotiation check ever disagree.
            tracing::warn!(uri = %parts.uri, "Pipeline declined a negotiated federated read");
            next.run(Request::from_parts(parts, Body::empty())).await
        }
        ReadOutcome::Rejected(rejection) => finish(label, rejection.status().into_response()),
        ReadOutcome::Served { identity, response } => {
            tracing::info!(
                iri = %read.target(),
                reader = ?identity.user().map(|user| user.as_str()),
                status = response.status.as_u16(),
                "Federated read served"
            );
            finish(label, response.into_response())
        }
    }
}

fn fail(outcome: &'static str, error: &AppError) -> Response {
    ERRORS_TOTAL
        .with_label_values(&[error.kind(), ENDPOINT])
        .inc();
    finish(outcome, error.status_code().into_response())
}

fn finish(outcome: &'static str, response: Response) -> Response {
    FEDERATED_READS_TOTAL.with_label_values(&[outcome]).inc();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", ENDPOINT, response.status().as_str()])
        .inc();
    response
}
