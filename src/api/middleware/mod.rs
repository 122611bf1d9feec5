pub mod verify;

use http::request::Parts as ReqParts;
use http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Browser clients sit on a different origin than the API, so CORS is
/// part of the deployment surface. `*` opens everything (local dev);
/// anything else is treated as a required origin suffix.
pub fn cors(allow_origins: &str) -> CorsLayer {
    let allowed = if allow_origins == "*" {
        AllowOrigin::any()
    } else {
        let suffix = allow_origins.to_string();
        AllowOrigin::predicate(move |origin: &HeaderValue, _: &ReqParts| {
            origin.as_bytes().ends_with(suffix.as_bytes())
        })
    };

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_origin(allowed)
}
