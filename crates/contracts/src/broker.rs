//! MQTT broker addressing and topic filters

use std::fmt;

use crate::ContractError;

pub const DEFAULT_BROKER_ADDRESS: &str = "localhost";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// Where to reach a broker and whether to use TLS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub tls: bool,
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Resolve from the configuration triple
    ///
    /// `url` wins when set; otherwise `address`/`port` with defaults
    /// `localhost`/`1883`.
    pub fn resolve(
        url: Option<&str>,
        address: Option<&str>,
        port: Option<u16>,
    ) -> Result<Self, ContractError> {
        match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => Self::parse(url),
            None => Ok(Self {
                tls: false,
                host: address
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .unwrap_or(DEFAULT_BROKER_ADDRESS)
                    .to_string(),
                port: port.unwrap_or(DEFAULT_BROKER_PORT),
            }),
        }
    }

    /// Parse `scheme://host[:port][/...]`
    ///
    /// Accepted schemes: `tcp`, `mqtt` (plain) and `ssl`, `tls`, `mqtts`
    /// (TLS). A URL without a scheme is treated as plain TCP.
    pub fn parse(url: &str) -> Result<Self, ContractError> {
        let invalid = |message: &str| {
            ContractError::config_validation("broker_url", format!("{message}: {url}"))
        };

        let (scheme, rest) = url.split_once("://").unwrap_or(("tcp", url));
        let tls = match scheme.to_ascii_lowercase().as_str() {
            "tcp" | "mqtt" => false,
            "ssl" | "tls" | "mqtts" => true,
            _ => return Err(invalid("unsupported scheme")),
        };
        let default_port = if tls { DEFAULT_TLS_PORT } else { DEFAULT_BROKER_PORT };

        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            // IPv6 literal
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 address"))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => p.parse().map_err(|_| invalid("invalid port"))?,
                None => default_port,
            };
            (host.to_string(), port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, p)) => (
                    host.to_string(),
                    p.parse().map_err(|_| invalid("invalid port"))?,
                ),
                None => (authority.to_string(), default_port),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if port == 0 {
            return Err(invalid("port must be > 0"));
        }
        Ok(Self { tls, host, port })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "ssl" } else { "tcp" };
        if self.host.contains(':') {
            write!(f, "{scheme}://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{scheme}://{}:{}", self.host, self.port)
        }
    }
}

/// Whether an MQTT topic filter (`+`, `#` wildcards) matches a topic
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tls: bool, host: &str, port: u16) -> BrokerAddress {
        BrokerAddress {
            tls,
            host: host.to_string(),
            port,
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            BrokerAddress::parse("tcp://localhost:1883").unwrap(),
            addr(false, "localhost", 1883)
        );
        assert_eq!(
            BrokerAddress::parse("mqtts://broker").unwrap(),
            addr(true, "broker", 8883)
        );
        assert_eq!(
            BrokerAddress::parse("10.0.0.2:1999").unwrap(),
            addr(false, "10.0.0.2", 1999)
        );
        assert_eq!(
            BrokerAddress::parse("tcp://[::1]:1883").unwrap(),
            addr(false, "::1", 1883)
        );
    }

    #[test]
    fn test_parse_rejects() {
        assert!(BrokerAddress::parse("ws://broker:80").is_err());
        assert!(BrokerAddress::parse("tcp://broker:notaport").is_err());
        assert!(BrokerAddress::parse("tcp://:1883").is_err());
        assert!(BrokerAddress::parse("tcp://broker:0").is_err());
    }

    #[test]
    fn test_resolve_prefers_url() {
        let resolved =
            BrokerAddress::resolve(Some("ssl://secure:8884"), Some("ignored"), Some(1)).unwrap();
        assert_eq!(resolved, addr(true, "secure", 8884));

        let fallback = BrokerAddress::resolve(None, Some("broker.lan"), None).unwrap();
        assert_eq!(fallback, addr(false, "broker.lan", 1883));
        assert_eq!(fallback.to_string(), "tcp://broker.lan:1883");

        let blank = BrokerAddress::resolve(Some(" "), None, None).unwrap();
        assert_eq!(blank.to_string(), "tcp://localhost:1883");
    }

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("ruuvi/#", "ruuvi/aa:bb"));
        assert!(topic_matches("ruuvi/#", "ruuvi"));
        assert!(topic_matches("ruuvi/+", "ruuvi/aa:bb"));
        assert!(!topic_matches("ruuvi/+", "ruuvi/aa/bb"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("ruuvi/in/#", "ruuvi/aa:bb"));
        assert!(topic_matches("a/b", "a/b"));
        assert!(!topic_matches("a/b", "a/b/c"));
    }
}
