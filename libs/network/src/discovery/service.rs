//! Advertised service endpoints
//!
//! An Announce carries a `;`-separated list of URIs such as
//! `imc+udp://10.0.10.20:6002/` or `dune://0.0.0.0/uid/431358805411`.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Scheme of the IMC-over-UDP transport endpoint
pub const IMC_UDP_SCHEME: &str = "imc+udp";

/// One advertised network access point for a protocol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    /// Non-empty path segments
    pub path: Vec<String>,
}

/// Parse failure for a single service URI
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid service URI '{uri}': {reason}")]
pub struct ServiceParseError {
    pub uri: String,
    pub reason: &'static str,
}

impl ServiceEndpoint {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            path: Vec::new(),
        }
    }

    /// `imc+udp://<addr>/`
    pub fn imc_udp(addr: SocketAddr) -> Self {
        Self::new(IMC_UDP_SCHEME, addr.ip().to_string(), Some(addr.port()))
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// Socket address, when the host is a literal IP and a port is present
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        Some(SocketAddr::new(self.ip()?, self.port?))
    }
}

impl FromStr for ServiceEndpoint {
    type Err = ServiceParseError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let err = |reason| ServiceParseError {
            uri: uri.to_string(),
            reason,
        };

        let (scheme, rest) = uri.trim().split_once("://").ok_or_else(|| err("missing scheme"))?;
        if scheme.is_empty() {
            return Err(err("empty scheme"));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| err("invalid port"))?;
                (host, Some(port))
            }
            None => (authority, None),
        };

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_string(),
            port,
            path: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "/{}", self.path.join("/"))
    }
}

/// Group a `;`-separated service string by scheme, keeping advertised order
///
/// Entries that fail to parse are skipped and returned separately so the caller
/// can report them.
pub fn parse_services(
    services: &str,
) -> (HashMap<String, Vec<ServiceEndpoint>>, Vec<ServiceParseError>) {
    let mut by_scheme: HashMap<String, Vec<ServiceEndpoint>> = HashMap::new();
    let mut errors = Vec::new();

    for uri in services.split(';').filter(|s| !s.trim().is_empty()) {
        match uri.parse::<ServiceEndpoint>() {
            Ok(endpoint) => by_scheme
                .entry(endpoint.scheme.clone())
                .or_default()
                .push(endpoint),
            Err(e) => errors.push(e),
        }
    }

    (by_scheme, errors)
}

/// Join endpoints into the `;`-separated announce form
pub fn format_services<'a>(endpoints: impl IntoIterator<Item = &'a ServiceEndpoint>) -> String {
    endpoints
        .into_iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUNE_SERVICES: &str = "dune://0.0.0.0/uid/431358805411;dune://0.0.0.0/version/2017.01.0;\
        ftp://192.168.1.3:30021/;http://192.168.1.3:8080/dune;imc+info://0.0.0.0/version/5.4.11;\
        imc+udp://192.168.1.3:6002/";

    #[test]
    fn test_parse_imc_udp() {
        let ep: ServiceEndpoint = "imc+udp://192.168.1.3:6002/".parse().unwrap();
        assert_eq!(ep.scheme, IMC_UDP_SCHEME);
        assert_eq!(ep.host, "192.168.1.3");
        assert_eq!(ep.port, Some(6002));
        assert!(ep.path.is_empty());
        assert_eq!(ep.socket_addr(), Some("192.168.1.3:6002".parse().unwrap()));
        assert_eq!(ep.to_string(), "imc+udp://192.168.1.3:6002/");
    }

    #[test]
    fn test_parse_path_segments() {
        let ep: ServiceEndpoint = "dune://0.0.0.0/version/2017.01.0".parse().unwrap();
        assert_eq!(ep.port, None);
        assert_eq!(ep.path, vec!["version", "2017.01.0"]);
        assert_eq!(ep.socket_addr(), None);
    }

    #[test]
    fn test_parse_service_string() {
        let (services, errors) = parse_services(DUNE_SERVICES);
        assert!(errors.is_empty());
        assert_eq!(services["dune"].len(), 2);
        assert_eq!(services[IMC_UDP_SCHEME][0].port, Some(6002));
        assert_eq!(services["http"][0].path, vec!["dune"]);
    }

    #[test]
    fn test_invalid_entries_reported() {
        let (services, errors) = parse_services("garbage;imc+udp://10.0.0.1:99999/;imc+udp://10.0.0.1:6001/");
        assert_eq!(errors.len(), 2);
        assert_eq!(services[IMC_UDP_SCHEME].len(), 1);
    }
}
