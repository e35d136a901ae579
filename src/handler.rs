use std::{net::IpAddr, sync::Arc};

use axum::{
    Router,
    extract::{Request, State},
    http::{
        HeaderMap, HeaderValue, Method, StatusCode, Version,
        header::{ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CONNECTION},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::{config::EchoConfig, error::AddressError, path};

const ALLOWED_METHODS: &str = "GET, OPTIONS, HEAD";

/// Asterisk-form request target, as in `OPTIONS * HTTP/1.1`
const ASTERISK: &str = "*";

/// Builds the application router.
///
/// Every request goes to a single fallback handler which does its own path matching,
/// so asterisk-form targets reach it too. Unless client addresses come from a header,
/// requests need an [`axum::extract::ConnectInfo`] extension, as [`crate::server::serve`]
/// or [`Router::into_make_service_with_connect_info`] provide.
pub fn router(config: EchoConfig) -> Router {
    Router::new()
        .fallback(echo)
        .with_state(Arc::new(config))
        .layer(TraceLayer::new_for_http())
}

fn allowed_methods() -> HeaderValue {
    HeaderValue::from_static(ALLOWED_METHODS)
}

async fn echo(State(config): State<Arc<EchoConfig>>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    respond(&config, &parts)
}

fn respond(config: &EchoConfig, parts: &Parts) -> Response {
    if parts.uri.path() == ASTERISK {
        let mut response = StatusCode::BAD_REQUEST.into_response();
        // Don't let a pipelined request follow a malformed one
        if parts.version >= Version::HTTP_11 {
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
        }
        return response;
    }

    if !matches_route(config, parts.uri.path()) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let mut headers = HeaderMap::new();
    if let Some(origin) = config.origin() {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, allowed_methods());
    }

    match parts.method {
        Method::OPTIONS => {
            headers.insert(ALLOW, allowed_methods());
            (StatusCode::NO_CONTENT, headers).into_response()
        }
        Method::HEAD => (StatusCode::NO_CONTENT, headers).into_response(),
        Method::GET => match client_address(config, parts) {
            Some(ip) => (StatusCode::OK, headers, ip.to_string()).into_response(),
            None => (StatusCode::OK, headers).into_response(),
        },
        _ => {
            headers.insert(ALLOW, allowed_methods());
            (StatusCode::METHOD_NOT_ALLOWED, headers).into_response()
        }
    }
}

/// Compares the percent-decoded, cleaned request path with the route.
///
/// Paths which don't decode to UTF-8 never match.
fn matches_route(config: &EchoConfig, raw_path: &str) -> bool {
    percent_decode_str(raw_path)
        .decode_utf8()
        .is_ok_and(|decoded| path::clean(&decoded) == config.route())
}

/// The address to report, if it could be determined and passes the network filter
fn client_address(config: &EchoConfig, parts: &Parts) -> Option<IpAddr> {
    match config
        .address_source()
        .resolve(&parts.headers, &parts.extensions)
    {
        Ok(ip) if config.allows(&ip) => Some(ip),
        Ok(ip) => {
            debug!(%ip, "client address is outside of the allowed network");
            None
        }
        Err(AddressError::Missing) => {
            debug!("no client address in the request");
            None
        }
        Err(err) => {
            warn!(%err, "can't determine client address");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::router;
    use crate::config::EchoConfig;
    use axum::{
        Router,
        body::Body,
        extract::ConnectInfo,
        http::{
            Method, Request, StatusCode, Version,
            header::{ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CONNECTION},
        },
        response::Response,
    };
    use http_body_util::BodyExt;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn app(origin: &str, network: Option<&str>, header: Option<&str>) -> Router {
        router(EchoConfig::new("/ip", origin, network, header).unwrap())
    }

    fn request(method: Method, uri: &str, remote: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(remote.parse::<SocketAddr>().unwrap()))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(res: Response) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).into()
    }

    #[tokio::test]
    async fn path_mismatch() {
        for method in [Method::GET, Method::OPTIONS, Method::POST] {
            for uri in ["/", "/ipx", "/ip/more", "/other"] {
                let req = request(method.clone(), uri, "192.0.2.10:5555");
                let res = app("*", None, None).oneshot(req).await.unwrap();
                assert_eq!(res.status(), StatusCode::NOT_FOUND, "{method} {uri}");
                assert!(res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
                assert_eq!(body_string(res).await, "");
            }
        }
    }

    #[tokio::test]
    async fn uncleaned_paths_match() {
        for uri in ["/ip/", "//ip", "/a/../ip", "/./ip/."] {
            let req = request(Method::GET, uri, "192.0.2.10:5555");
            let res = app("", None, None).oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK, "{uri}");
            assert_eq!(body_string(res).await, "192.0.2.10");
        }
    }

    #[tokio::test]
    async fn percent_encoded_paths_match() {
        let spaced = router(EchoConfig::new("my ip", "", None, None).unwrap());
        let req = request(Method::GET, "/my%20ip", "192.0.2.10:5555");
        let res = spaced.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_string(res).await, "192.0.2.10");

        for uri in ["/%69p", "/ip%2F", "/a%2F..%2Fip"] {
            let req = request(Method::GET, uri, "192.0.2.10:5555");
            let res = app("", None, None).oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK, "{uri}");
        }

        for uri in ["/%ff", "/i%70x", "/my%20ip"] {
            let req = request(Method::GET, uri, "192.0.2.10:5555");
            let res = app("", None, None).oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn asterisk_target() {
        let req = request(Method::OPTIONS, "*", "192.0.2.10:5555");
        let res = app("*", None, None).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()[CONNECTION], "close");
        assert!(res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

        let mut req = request(Method::OPTIONS, "*", "192.0.2.10:5555");
        *req.version_mut() = Version::HTTP_10;
        let res = app("*", None, None).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.headers().get(CONNECTION).is_none());
    }

    #[tokio::test]
    async fn options() {
        let req = request(Method::OPTIONS, "/ip", "192.0.2.10:5555");
        let res = app("https://example.com", None, None)
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(res.headers()[ALLOW], "GET, OPTIONS, HEAD");
        assert_eq!(
            res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://example.com"
        );
        assert_eq!(
            res.headers()[ACCESS_CONTROL_ALLOW_METHODS],
            "GET, OPTIONS, HEAD"
        );
        assert_eq!(body_string(res).await, "");
    }

    #[tokio::test]
    async fn head() {
        let req = request(Method::HEAD, "/ip", "192.0.2.10:5555");
        let res = app("*", None, None).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(res.headers().get(ALLOW).is_none());
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(body_string(res).await, "");
    }

    #[tokio::test]
    async fn method_not_allowed() {
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
            let req = request(method.clone(), "/ip", "192.0.2.10:5555");
            let res = app("*", None, None).oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert_eq!(res.headers()[ALLOW], "GET, OPTIONS, HEAD");
            assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert_eq!(body_string(res).await, "");
        }
    }

    #[tokio::test]
    async fn cors_disabled() {
        for method in [Method::GET, Method::OPTIONS, Method::HEAD, Method::POST] {
            let req = request(method, "/ip", "192.0.2.10:5555");
            let res = app("", None, None).oneshot(req).await.unwrap();
            assert!(res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
            assert!(res.headers().get(ACCESS_CONTROL_ALLOW_METHODS).is_none());
        }
    }

    #[tokio::test]
    async fn get_remote_address() {
        for (remote, expected) in [
            ("192.0.2.10:5555", "192.0.2.10"),
            ("[2001:db8::1]:443", "2001:db8::1"),
        ] {
            let req = request(Method::GET, "/ip", remote);
            let res = app("*", None, None).oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert_eq!(body_string(res).await, expected);
        }
    }

    #[tokio::test]
    async fn get_without_connect_info() {
        let req = Request::builder().uri("/ip").body(Body::empty()).unwrap();
        let res = app("", None, None).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_string(res).await, "");
    }

    #[tokio::test]
    async fn network_filter() {
        let req = request(Method::GET, "/ip", "10.1.2.3:5555");
        let res = app("", Some("10.0.0.0/8"), None).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_string(res).await, "10.1.2.3");

        let req = request(Method::GET, "/ip", "8.8.8.8:5555");
        let res = app("", Some("10.0.0.0/8"), None).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_string(res).await, "");
    }

    #[tokio::test]
    async fn address_header() {
        let app = app("", None, Some("x-forwarded-for"));

        let mut req = request(Method::GET, "/ip", "127.0.0.1:4000");
        req.headers_mut()
            .insert("X-Forwarded-For", "203.0.113.5, 10.0.0.1".parse().unwrap());
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(body_string(res).await, "203.0.113.5");

        let mut req = request(Method::GET, "/ip", "127.0.0.1:4000");
        req.headers_mut()
            .insert("X-Forwarded-For", "[2001:db8::2]:8080".parse().unwrap());
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(body_string(res).await, "2001:db8::2");

        // No fallback to the transport address
        let req = request(Method::GET, "/ip", "127.0.0.1:4000");
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_string(res).await, "");
    }

    #[tokio::test]
    async fn malformed_address_header() {
        let mut req = request(Method::GET, "/ip", "127.0.0.1:4000");
        req.headers_mut().insert("X-Real-Ip", "foo".parse().unwrap());
        let res = app("*", None, Some("X-Real-Ip")).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(body_string(res).await, "");
    }

    #[tokio::test]
    async fn repeated_requests_agree() {
        let app = app("*", Some("192.0.2.0/24"), None);
        let mut responses = Vec::new();
        for _ in 0..3 {
            let req = request(Method::GET, "/ip", "192.0.2.10:5555");
            let res = app.clone().oneshot(req).await.unwrap();
            responses.push((res.status(), body_string(res).await));
        }
        assert!(responses.iter().all(|r| r == &responses[0]));
        assert_eq!(responses[0], (StatusCode::OK, "192.0.2.10".to_owned()));
    }
}
