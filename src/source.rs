use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::ConnectInfo,
    http::{Extensions, HeaderMap, HeaderName},
};

use crate::error::AddressError;

/// Where the client address of a request is taken from
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AddressSource {
    /// The transport peer address from [`axum::extract::ConnectInfo`]
    #[default]
    ConnectInfo,
    /// The first entry of a header set by a trusted proxy, e.g. `X-Forwarded-For`
    Header(HeaderName),
}

impl AddressSource {
    /// Resolves the client IP of a request.
    ///
    /// For [`AddressSource::Header`] only the first value of the header is looked at, and
    /// of a comma separated list only the leftmost entry (the one nearest to the client).
    /// The entry may be either `ip:port` or a bare `ip`.
    ///
    /// # Errors
    ///
    /// Returns an error if there's no address or it can't be parsed.
    pub fn resolve(
        &self,
        headers: &HeaderMap,
        extensions: &Extensions,
    ) -> Result<IpAddr, AddressError> {
        match self {
            Self::Header(name) => leftmost_entry(headers, name).and_then(parse_client_address),
            Self::ConnectInfo => extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
                .ok_or(AddressError::NoConnectInfo),
        }
    }
}

/// Takes the first value of the header and cuts it at the first comma
fn leftmost_entry<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Result<&'a str, AddressError> {
    let value = headers
        .get(name)
        .ok_or(AddressError::Missing)?
        .to_str()
        .map_err(|_| AddressError::NotText)?;
    let entry = value.split(',').next().unwrap_or_default().trim();
    if entry.is_empty() {
        Err(AddressError::Missing)
    } else {
        Ok(entry)
    }
}

/// Parses `ip:port` (`[ipv6]:port` for v6) first, then a bare `ip`
pub(crate) fn parse_client_address(value: &str) -> Result<IpAddr, AddressError> {
    value
        .parse::<SocketAddr>()
        .map(|addr| addr.ip())
        .or_else(|_| value.parse::<IpAddr>())
        .map_err(|_| AddressError::Unparsable {
            value: value.to_owned(),
        })
}
