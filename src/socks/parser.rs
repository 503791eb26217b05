//! Incremental SOCKS5 message parsers
//!
//! Each parser inspects the unconsumed bytes and either reports
//! [`Parsed::Incomplete`] or the decoded message together with how many bytes
//! it occupied. Nothing is consumed on `Incomplete`.
//!
//! # Method selection request
//!
//! ```text
//! +----+----------+----------+
//! |VER | NMETHODS | METHODS  |
//! +----+----------+----------+
//! | 1  |    1     | 1 to 255 |
//! +----+----------+----------+
//! ```
//!
//! # Request
//!
//! ```text
//! +----+-----+-------+------+----------+----------+
//! |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//! ```

use super::consts::*;
use super::types::TargetAddr;
use crate::error::Socks5Error;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Outcome of a parse attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    /// More bytes are needed
    Incomplete,
    /// A full message was decoded from the first `consumed` bytes
    Complete {
        /// Decoded message
        value: T,
        /// Bytes occupied by the message
        consumed: usize,
    },
}

/// Client method selection message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Offered authentication methods
    pub methods: Vec<u8>,
}

impl Greeting {
    /// Whether "no authentication" is among the offered methods
    pub fn offers_no_auth(&self) -> bool {
        self.methods.contains(&SOCKS5_AUTH_METHOD_NONE)
    }
}

/// Client request message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Raw command byte
    pub command: u8,
    /// Destination
    pub target: TargetAddr,
}

/// Parse the method selection message
pub fn parse_greeting(buf: &[u8]) -> Result<Parsed<Greeting>, Socks5Error> {
    if buf.len() < 2 {
        return Ok(Parsed::Incomplete);
    }
    if buf[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(buf[0]));
    }

    let num_methods = buf[1] as usize;
    let total = 2 + num_methods;
    if buf.len() < total {
        return Ok(Parsed::Incomplete);
    }

    Ok(Parsed::Complete {
        value: Greeting {
            methods: buf[2..total].to_vec(),
        },
        consumed: total,
    })
}

/// Parse a request message
pub fn parse_request(buf: &[u8]) -> Result<Parsed<Request>, Socks5Error> {
    if buf.len() < REQUEST_HEADER_LEN {
        return Ok(Parsed::Incomplete);
    }
    if buf[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(buf[0]));
    }

    let command = buf[1];
    let addr_type = buf[3];
    let body = &buf[REQUEST_HEADER_LEN..];

    let (target, addr_len) = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            if body.len() < 4 + 2 {
                return Ok(Parsed::Incomplete);
            }
            let ip = Ipv4Addr::new(body[0], body[1], body[2], body[3]);
            let port = u16::from_be_bytes([body[4], body[5]]);
            (TargetAddr::ipv4(ip, port), 4 + 2)
        }
        SOCKS5_ADDR_TYPE_DOMAIN => {
            if body.is_empty() {
                return Ok(Parsed::Incomplete);
            }
            let domain_len = body[0] as usize;
            if domain_len == 0 {
                return Err(Socks5Error::InvalidDomain("empty domain".to_string()));
            }
            if body.len() < 1 + domain_len + 2 {
                return Ok(Parsed::Incomplete);
            }
            let domain = std::str::from_utf8(&body[1..1 + domain_len])
                .map_err(|_| Socks5Error::InvalidDomain("domain is not valid UTF-8".to_string()))?
                .to_string();
            let port = u16::from_be_bytes([body[1 + domain_len], body[2 + domain_len]]);
            (TargetAddr::domain(domain, port), 1 + domain_len + 2)
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            if body.len() < 16 + 2 {
                return Ok(Parsed::Incomplete);
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&body[..16]);
            let port = u16::from_be_bytes([body[16], body[17]]);
            (TargetAddr::ipv6(Ipv6Addr::from(octets), port), 16 + 2)
        }
        other => return Err(Socks5Error::AddressTypeNotSupported(other)),
    };

    Ok(Parsed::Complete {
        value: Request { command, target },
        consumed: REQUEST_HEADER_LEN + addr_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete<T>(parsed: Parsed<T>) -> (T, usize) {
        match parsed {
            Parsed::Complete { value, consumed } => (value, consumed),
            Parsed::Incomplete => panic!("Expected a complete message"),
        }
    }

    #[test]
    fn test_greeting_no_auth() {
        let (greeting, consumed) = complete(parse_greeting(&[0x05, 0x01, 0x00]).unwrap());
        assert!(greeting.offers_no_auth());
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_greeting_gssapi_only() {
        let (greeting, _) = complete(parse_greeting(&[0x05, 0x01, 0x01]).unwrap());
        assert!(!greeting.offers_no_auth());
    }

    #[test]
    fn test_greeting_partial() {
        assert_eq!(parse_greeting(&[0x05]).unwrap(), Parsed::Incomplete);
        assert_eq!(parse_greeting(&[0x05, 0x02, 0x02]).unwrap(), Parsed::Incomplete);
    }

    #[test]
    fn test_greeting_leaves_trailing_bytes() {
        let (_, consumed) =
            complete(parse_greeting(&[0x05, 0x02, 0x02, 0x00, 0x05, 0x01]).unwrap());
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_greeting_bad_version() {
        assert_eq!(
            parse_greeting(&[0x04, 0x01, 0x00]),
            Err(Socks5Error::UnsupportedVersion(4))
        );
    }

    #[test]
    fn test_request_ipv4() {
        let bytes = [0x05, 0x01, 0x00, 0x01, 93, 184, 216, 34, 0x00, 0x50];
        let (request, consumed) = complete(parse_request(&bytes).unwrap());
        assert_eq!(request.command, SOCKS5_CMD_TCP_CONNECT);
        assert_eq!(request.target.host(), "93.184.216.34");
        assert_eq!(request.target.port(), 80);
        assert_eq!(consumed, 10);
    }

    #[test]
    fn test_request_domain() {
        let mut bytes = vec![0x05, 0x01, 0x00, 0x03, 11];
        bytes.extend_from_slice(b"example.com");
        bytes.extend_from_slice(&443u16.to_be_bytes());
        let (request, consumed) = complete(parse_request(&bytes).unwrap());
        assert_eq!(request.target, TargetAddr::domain("example.com", 443));
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_request_ipv6() {
        let mut bytes = vec![0x05, 0x01, 0x00, 0x04];
        bytes.extend_from_slice(&"2001:db8::1".parse::<Ipv6Addr>().unwrap().octets());
        bytes.extend_from_slice(&8443u16.to_be_bytes());
        let (request, consumed) = complete(parse_request(&bytes).unwrap());
        assert_eq!(request.target.host(), "2001:db8::1");
        assert_eq!(request.target.port(), 8443);
        assert_eq!(consumed, 22);
    }

    #[test]
    fn test_request_every_prefix_is_incomplete() {
        let mut bytes = vec![0x05, 0x01, 0x00, 0x03, 4];
        bytes.extend_from_slice(b"host");
        bytes.extend_from_slice(&[0x1F, 0x90]);
        for cut in 0..bytes.len() {
            assert_eq!(
                parse_request(&bytes[..cut]).unwrap(),
                Parsed::Incomplete,
                "prefix of {} bytes",
                cut
            );
        }
        assert!(matches!(
            parse_request(&bytes).unwrap(),
            Parsed::Complete { consumed: 11, .. }
        ));
    }

    #[test]
    fn test_request_unsupported_address_type() {
        let bytes = [0x05, 0x01, 0x00, 0x02, 1, 2, 3, 4, 0, 80];
        assert_eq!(
            parse_request(&bytes),
            Err(Socks5Error::AddressTypeNotSupported(0x02))
        );
    }

    #[test]
    fn test_request_empty_domain() {
        let bytes = [0x05, 0x01, 0x00, 0x03, 0, 0, 80];
        assert!(matches!(
            parse_request(&bytes),
            Err(Socks5Error::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_request_keeps_command_byte() {
        let bytes = [0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
        let (request, _) = complete(parse_request(&bytes).unwrap());
        assert_eq!(request.command, SOCKS5_CMD_UDP_ASSOCIATE);
    }
}
