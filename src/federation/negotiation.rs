//! Content negotiation
//!
//! Decides whether a request is an ActivityPub read at all. A `false`
//! answer means "not ours", and the request falls through to the router.

use http::{HeaderMap, Method, header};

use crate::data::ACTIVITYSTREAMS_NS;

/// Media type served for federated reads.
pub const ACTIVITY_JSON_LD: &str =
    "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// Whether the request is a federation-protocol GET.
pub fn is_federated_read(method: &Method, headers: &HeaderMap) -> bool {
    if *method != Method::GET {
        return false;
    }

    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(is_activitystreams_media_range)
}

/// Whether one Accept media range names an ActivityStreams representation.
///
/// `application/activity+json` always qualifies; `application/ld+json`
/// only with a `profile` parameter listing the ActivityStreams namespace.
fn is_activitystreams_media_range(range: &str) -> bool {
    let mut params = range.split(';').map(str::trim);
    let essence = params.next().unwrap_or_default().to_ascii_lowercase();

    match essence.as_str() {
        "application/activity+json" => true,
        "application/ld+json" => params.any(|param| {
            let Some((name, value)) = param.split_once('=') else {
                return false;
            };
            name.trim().eq_ignore_ascii_case("profile")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
                    .any(|profile| profile == ACTIVITYSTREAMS_NS)
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn accepts_activity_json_get() {
        assert!(is_federated_read(
            &Method::GET,
            &accept("application/activity+json")
        ));
    }

    #[test]
    fn accepts_ld_json_with_activitystreams_profile() {
        assert!(is_federated_read(&Method::GET, &accept(ACTIVITY_JSON_LD)));
        assert!(is_federated_read(
            &Method::GET,
            &accept("text/html;q=0.9, application/ld+json;profile=\"https://example.org/p https://www.w3.org/ns/activitystreams\"")
        ));
    }

    #[test]
    fn rejects_ld_json_without_profile() {
        assert!(!is_federated_read(
            &Method::GET,
            &accept("application/ld+json")
        ));
    }

    #[test]
    fn rejects_browsers_and_missing_accept() {
        assert!(!is_federated_read(
            &Method::GET,
            &accept("text/html,application/xhtml+xml,*/*;q=0.8")
        ));
        assert!(!is_federated_read(&Method::GET, &HeaderMap::new()));
    }

    #[test]
    fn rejects_non_get_methods() {
        for method in [Method::POST, Method::HEAD, Method::PUT, Method::DELETE] {
            assert!(!is_federated_read(
                &method,
                &accept("application/activity+json")
            ));
        }
    }
}
