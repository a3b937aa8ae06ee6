//! Incoming read request

use http::{HeaderMap, Method, Uri, header};
use url::Url;

use crate::error::AppError;

/// An incoming request for a federated resource.
///
/// Immutable for the lifetime of the pipeline.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    target: Url,
}

impl ReadRequest {
    /// Build a request whose target IRI is already known.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, target: Url) -> Self {
        Self {
            method,
            uri,
            headers,
            target,
        }
    }

    /// Build a request from HTTP parts as seen by the server.
    ///
    /// The target IRI is `base`'s scheme, the request `Host` (or `base`'s host
    /// when the header is missing), and the request path and query.
    pub fn from_parts(parts: &http::request::Parts, base: &Url) -> Result<Self, AppError> {
        let target = target_iri(&parts.uri, &parts.headers, base)?;
        Ok(Self::new(
            parts.method.clone(),
            parts.uri.clone(),
            parts.headers.clone(),
            target,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Absolute IRI of the requested resource.
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Path and query as used in `(request-target)`.
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }
}

fn target_iri(uri: &Uri, headers: &HeaderMap, base: &Url) -> Result<Url, AppError> {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .or_else(|| {
            base.host_str().map(|host| match base.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            })
        })
        .ok_or_else(|| AppError::Validation("Cannot determine request host".to_string()))?;

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Url::parse(&format!("{}://{}{}", base.scheme(), host, path_and_query))
        .map_err(|e| AppError::Validation(format!("Invalid request IRI: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(uri: &str, host: Option<&str>) -> http::request::Parts {
        let mut builder = http::Request::builder().method(Method::GET).uri(uri);
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn target_uses_host_header_and_configured_scheme() {
        let base = Url::parse("https://local.example").unwrap();
        let request =
            ReadRequest::from_parts(&parts("/notes/1?page=2", Some("alias.example")), &base)
                .unwrap();
        assert_eq!(
            request.target().as_str(),
            "https://alias.example/notes/1?page=2"
        );
        assert_eq!(request.path_and_query(), "/notes/1?page=2");
    }

    #[test]
    fn target_falls_back_to_configured_host() {
        let base = Url::parse("http://127.0.0.1:8080").unwrap();
        let request = ReadRequest::from_parts(&parts("/users/admin", None), &base).unwrap();
        assert_eq!(request.target().as_str(), "http://127.0.0.1:8080/users/admin");
    }
}
