use axum::http::header::InvalidHeaderName;
use thiserror::Error;

/// Errors which prevent an [`crate::EchoConfig`] from being built
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The `Access-Control-Allow-Origin` value is neither `*` nor an absolute URL with a host
    #[error("malformed Access-Control-Allow-Origin URL `{origin}`")]
    MalformedOrigin {
        /// The rejected origin
        origin: String,
    },
    /// The network filter isn't an `address/length` prefix
    #[error("invalid network prefix `{network}`: {source}")]
    InvalidNetwork {
        /// The rejected network string
        network: String,
        /// Underlying parse error
        source: ipnet::AddrParseError,
    },
    /// The address header isn't a valid HTTP header name.
    ///
    /// Stricter than plain MIME-style canonicalization, which accepts any string and
    /// then simply never finds such a header: here the name is rejected at startup.
    #[error("invalid address header name `{header}`: {source}")]
    InvalidHeader {
        /// The rejected header name
        header: String,
        /// Underlying parse error
        source: InvalidHeaderName,
    },
}

/// Reasons a client address couldn't be determined for a single request.
///
/// These never reach the client: the response keeps its status and the body is left empty.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The configured header is absent or holds an empty first entry
    #[error("no client address provided")]
    Missing,
    /// The configured header value contains non visible ASCII characters
    #[error("client address header value isn't valid text")]
    NotText,
    /// The value is neither `ip:port` nor a bare `ip`
    #[error("can't parse client address `{value}`")]
    Unparsable {
        /// The offending value
        value: String,
    },
    /// The server didn't provide [`axum::extract::ConnectInfo`]
    #[error("no connection info, serve with `into_make_service_with_connect_info`")]
    NoConnectInfo,
}
