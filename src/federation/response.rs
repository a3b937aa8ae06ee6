//! Response assembly
//!
//! Turns a fetched object into the bytes, headers and status sent back.
//! Sensitive fields are cleared before the object is serialized, so a
//! failure at any later step can never leak them.

use axum::body::Bytes;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::negotiation::ACTIVITY_JSON_LD;
use super::signature::generate_digest;
use super::verdict::ResolvedIdentity;
use crate::clock::http_date;
use crate::data::FederatedObject;
use crate::error::AppError;

/// Settings that shape every response.
#[derive(Debug, Clone, Default)]
pub struct ResponseOptions {
    /// `max-age` for anonymous reads.
    pub public_max_age_seconds: u64,
}

/// An assembled response.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseEnvelope {
    /// Write the payload to `sink` in a single write.
    ///
    /// A write that accepts fewer bytes than the payload holds is reported
    /// as [`AppError::ShortWrite`].
    ///
    /// Only callers that own the sink get this check. The HTTP gate goes
    /// through [`IntoResponse`], which hands the whole body to hyper; a
    /// connection that drops mid-body is then hyper's to report, not ours.
    pub async fn write_body<W>(&self, sink: &mut W) -> Result<usize, AppError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let written = sink.write(&self.body).await?;
        if written != self.body.len() {
            return Err(AppError::ShortWrite {
                written,
                expected: self.body.len(),
            });
        }
        sink.flush().await?;
        Ok(written)
    }
}

/// Hands the body to the server as one frame. No short-write check
/// happens on this path; see [`ResponseEnvelope::write_body`].
impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// Build the response for `object` as fetched for `identity`.
pub fn assemble(
    mut object: Box<dyn FederatedObject>,
    identity: &ResolvedIdentity,
    now: DateTime<Utc>,
    options: &ResponseOptions,
) -> Result<ResponseEnvelope, AppError> {
    // (a) Redact before anything is serialized.
    if let Some(fields) = object.sensitive_fields() {
        fields.clear_sensitive_fields();
    }

    // (b) Serialize.
    let mut map = object.serialize()?;

    // (c) Object's own declarations first, then the ActivityStreams base.
    let context = object.json_ld_context().with_activitystreams();
    map.insert("@context".to_string(), context.to_value());

    // (d) Encode.
    let body = Bytes::from(serde_json::to_vec(&map)?);

    // (e) Headers.
    let headers = response_headers(&body, identity, now, options)?;

    // (f) Status.
    let status = if object.is_tombstone() {
        StatusCode::GONE
    } else {
        StatusCode::OK
    };

    Ok(ResponseEnvelope {
        status,
        headers,
        body,
    })
}

fn response_headers(
    body: &[u8],
    identity: &ResolvedIdentity,
    now: DateTime<Utc>,
    options: &ResponseOptions,
) -> Result<HeaderMap, AppError> {
    let invalid = |e: http::header::InvalidHeaderValue| AppError::Internal(e.into());

    let cache_control = match identity {
        ResolvedIdentity::Anonymous => {
            format!("public, max-age={}", options.public_max_age_seconds)
        }
        // Audience-restricted content must not land in shared caches.
        ResolvedIdentity::Verified(_) => "private, no-store".to_string(),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(ACTIVITY_JSON_LD),
    );
    headers.insert(
        header::DATE,
        HeaderValue::from_str(&http_date(now)).map_err(invalid)?,
    );
    headers.insert(
        "digest",
        HeaderValue::from_str(&generate_digest(body)).map_err(invalid)?,
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_str(&cache_control).map_err(invalid)?,
    );
    headers.insert(
        header::VARY,
        HeaderValue::from_static("Accept, Signature, Authorization"),
    );
    Ok(headers)
}
