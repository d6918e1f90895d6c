// Gateway address parsing
//
// Validates and normalizes the user-supplied gateway address into a
// canonical host + optional port pair. Purely syntactic -- no DNS lookup,
// no network I/O. The accepted grammars, tried in order:
//
//   1. IPv6 literal, bare (`::1`) or bracketed with a port (`[::1]:8080`)
//   2. IPv4 literal, optionally with a port (`192.168.1.1:8080`)
//   3. RFC 1123 hostname, optionally with a port (`gateway.local:8080`)

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use url::Url;

use crate::error::Error;

/// A validated gateway network address: host plus optional port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewayAddress {
    host: String,
    port: Option<u16>,
}

impl GatewayAddress {
    /// Parse and validate a user-supplied gateway address.
    ///
    /// Fails with [`Error::InvalidAddress`] when the input matches none of
    /// the accepted grammars, or when a present port is outside `[1, 65535]`.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidAddress {
            input: input.to_owned(),
            reason: reason.to_owned(),
        };

        if input.is_empty() {
            return Err(invalid("address is empty"));
        }

        // Bracketed IPv6, with or without a port: `[::1]` / `[::1]:8080`
        if let Some(rest) = input.strip_prefix('[') {
            let Some((host, after)) = rest.split_once(']') else {
                return Err(invalid("unterminated '[' in IPv6 literal"));
            };
            if host.parse::<Ipv6Addr>().is_err() {
                return Err(invalid("not a valid IPv6 literal"));
            }
            let port = match after {
                "" => None,
                _ => Some(parse_port(after.strip_prefix(':').ok_or_else(|| {
                    invalid("expected ':port' after bracketed IPv6 literal")
                })?)
                .ok_or_else(|| invalid("port must be an integer in [1, 65535]"))?),
            };
            return Ok(Self { host: host.to_owned(), port });
        }

        // Bare IPv6 literal -- the colons here are not a port separator.
        if input.parse::<Ipv6Addr>().is_ok() {
            return Ok(Self { host: input.to_owned(), port: None });
        }

        // IPv4 or hostname, optionally with a trailing `:port`.
        let (host, port) = match input.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = parse_port(port_str)
                    .ok_or_else(|| invalid("port must be an integer in [1, 65535]"))?;
                (host, Some(port))
            }
            None => (input, None),
        };

        if host.parse::<Ipv4Addr>().is_ok() || is_valid_hostname(host) {
            Ok(Self { host: host.to_owned(), port })
        } else {
            Err(invalid("not an IP literal or RFC 1123 hostname"))
        }
    }

    /// The host part (IP literal or hostname, never bracketed).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, if one was supplied.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The gateway's HTTP base URL. The local protocol is plain HTTP;
    /// an absent port means the firmware default (80).
    pub fn base_url(&self) -> Result<Url, Error> {
        let host = if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let url = match self.port {
            Some(port) => format!("http://{host}:{port}/"),
            None => format!("http://{host}/"),
        };
        Url::parse(&url).map_err(Error::InvalidUrl)
    }
}

impl fmt::Display for GatewayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v6 = self.host.parse::<Ipv6Addr>().is_ok();
        match (self.port, v6) {
            (Some(port), true) => write!(f, "[{}]:{port}", self.host),
            (Some(port), false) => write!(f, "{}:{port}", self.host),
            (None, _) => write!(f, "{}", self.host),
        }
    }
}

/// Port grammar: integer in `[1, 65535]`, no sign, no leading `+`.
fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u16>().ok().filter(|p| *p >= 1)
}

/// RFC 1123 hostname: 1-253 chars total, dot-separated labels of 1-63
/// chars, alphanumeric at both ends, interior hyphens allowed.
fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        let bytes = label.as_bytes();
        !bytes.is_empty()
            && bytes.len() <= 63
            && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
            && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
            && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
    })
}
