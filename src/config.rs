use std::net::IpAddr;

use axum::http::{HeaderName, HeaderValue};
use ipnet::IpNet;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{error::ConfigError, path::normalize_route, source::AddressSource};

/// Wildcard `Access-Control-Allow-Origin` value
pub(crate) const ANY_ORIGIN: &str = "*";

/// Raw startup parameters, validated into an [`EchoConfig`].
///
/// Empty strings are treated the same as absent values.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize), serde(default))]
pub struct Settings {
    /// Path the service answers on, e.g. `/ip`
    pub route: String,
    /// `Access-Control-Allow-Origin` value, `*` or an absolute URL; empty disables CORS
    pub origin: String,
    /// Only report addresses inside this network, e.g. `10.0.0.0/8`
    pub network: Option<String>,
    /// Read the client address from this header instead of the connection
    pub address_header: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            route: "/".to_owned(),
            origin: String::new(),
            network: None,
            address_header: None,
        }
    }
}

/// Validated, immutable handler configuration
#[derive(Clone, Debug)]
pub struct EchoConfig {
    route: String,
    origin: Option<HeaderValue>,
    network: Option<IpNet>,
    source: AddressSource,
}

impl EchoConfig {
    /// Builds the configuration.
    ///
    /// The route is made absolute and cleaned. A non empty `origin` other than `*` has to
    /// be an absolute URL with a host. A non empty `network` has to be a prefix like
    /// `10.0.0.0/8`. A non empty `address_header` switches the address source from the
    /// connection to that header.
    ///
    /// # Errors
    ///
    /// Fails on a malformed origin, network or header name.
    pub fn new(
        route: &str,
        origin: &str,
        network: Option<&str>,
        address_header: Option<&str>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            route: normalize_route(route),
            origin: validate_origin(origin)?,
            network: network
                .filter(|s| !s.is_empty())
                .map(parse_network)
                .transpose()?,
            source: address_header
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_header)
                .transpose()?
                .map_or(AddressSource::ConnectInfo, AddressSource::Header),
        })
    }

    /// The absolute, cleaned path requests must match
    pub fn route(&self) -> &str {
        &self.route
    }

    /// `Access-Control-Allow-Origin` value, `None` when CORS is disabled
    pub fn origin(&self) -> Option<&HeaderValue> {
        self.origin.as_ref()
    }

    /// The network reported addresses are filtered by, if any
    pub fn network(&self) -> Option<&IpNet> {
        self.network.as_ref()
    }

    /// Where client addresses are read from
    pub fn address_source(&self) -> &AddressSource {
        &self.source
    }

    /// Whether `ip` may be reported to the client
    pub(crate) fn allows(&self, ip: &IpAddr) -> bool {
        self.network.is_none_or(|net| net.contains(ip))
    }
}

impl TryFrom<Settings> for EchoConfig {
    type Error = ConfigError;

    fn try_from(settings: Settings) -> Result<Self, Self::Error> {
        Self::new(
            &settings.route,
            &settings.origin,
            settings.network.as_deref(),
            settings.address_header.as_deref(),
        )
    }
}

fn validate_origin(origin: &str) -> Result<Option<HeaderValue>, ConfigError> {
    if origin.is_empty() {
        return Ok(None);
    }
    let malformed = || ConfigError::MalformedOrigin {
        origin: origin.to_owned(),
    };
    if origin != ANY_ORIGIN {
        let url = Url::parse(origin).map_err(|_| malformed())?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(malformed());
        }
    }
    HeaderValue::from_str(origin)
        .map(Some)
        .map_err(|_| malformed())
}

fn parse_network(network: &str) -> Result<IpNet, ConfigError> {
    network
        .parse::<IpNet>()
        .map_err(|source| ConfigError::InvalidNetwork {
            network: network.to_owned(),
            source,
        })
}

fn parse_header(header: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(header.as_bytes()).map_err(|source| ConfigError::InvalidHeader {
        header: header.to_owned(),
        source,
    })
}
