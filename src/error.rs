//! Error types for ssr-local
//!
//! This module defines all custom error types used throughout the proxy core.

use std::io;
use thiserror::Error;

/// Main error type for proxy operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Malformed SOCKS5 bytes, unsupported auth method or address type
    #[error("Protocol error: {0}")]
    Protocol(#[from] Socks5Error),

    /// Upstream connect/read/write failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Key derivation, cipher or authentication failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Missing or invalid server profile / local settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// State mismatch on start/stop, resource already released
    #[error("System error: {0}")]
    System(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Coarse classification of a [`ProxyError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed client bytes
    Protocol,
    /// Upstream or socket failure (includes IO and timeouts)
    Connection,
    /// Cipher failure
    Crypto,
    /// Invalid configuration
    Configuration,
    /// Lifecycle misuse
    System,
}

impl ProxyError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Protocol(_) => ErrorKind::Protocol,
            ProxyError::Connection(_) | ProxyError::Io(_) | ProxyError::Timeout(_) => {
                ErrorKind::Connection
            }
            ProxyError::Crypto(_) => ErrorKind::Crypto,
            ProxyError::Config(_) => ErrorKind::Configuration,
            ProxyError::System(_) => ErrorKind::System,
        }
    }

    /// True when a decrypt failed its integrity check
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, ProxyError::Crypto(CryptoError::AuthenticationFailure))
    }
}

/// Result alias used across the crate
pub type Result<T, E = ProxyError> = std::result::Result<T, E>;

/// SOCKS5 specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// The client did not offer "no authentication"
    #[error("Unsupported authentication method")]
    NoAcceptableMethod,

    /// Command not supported
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Rejected by the rule set
    #[error("Connection not allowed by ruleset")]
    ConnectionNotAllowed,

    /// Host unreachable
    #[error("Host unreachable")]
    HostUnreachable,

    /// General SOCKS server failure
    #[error("General SOCKS server failure")]
    GeneralFailure,
}

impl Socks5Error {
    /// Reply code sent to the client for this failure
    pub fn reply_code(&self) -> Socks5ReplyCode {
        match self {
            Socks5Error::CommandNotSupported(_) => Socks5ReplyCode::CommandNotSupported,
            Socks5Error::AddressTypeNotSupported(_) => Socks5ReplyCode::AddressTypeNotSupported,
            Socks5Error::ConnectionNotAllowed => Socks5ReplyCode::ConnectionNotAllowed,
            Socks5Error::HostUnreachable => Socks5ReplyCode::HostUnreachable,
            _ => Socks5ReplyCode::GeneralFailure,
        }
    }
}

/// Cipher engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Input shorter than the framing requires
    #[error("Invalid input size: expected at least {expected} bytes, got {actual}")]
    InvalidInputSize {
        /// Minimum length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Key derivation or cipher construction failed
    #[error("Initialization failure: {0}")]
    InitializationFailure(String),

    /// Method declared but not backed by an implementation
    #[error("Unimplemented method: {0}")]
    UnimplementedMethod(String),

    /// AEAD tag mismatch
    #[error("Authentication failure")]
    AuthenticationFailure,

    /// Sealing failed
    #[error("Encryption failure")]
    EncryptionFailure,

    /// An IV of the wrong length was supplied for a session
    #[error("Invalid IV: expected {expected} bytes, got {actual}")]
    InvalidIv {
        /// Method IV size
        expected: usize,
        /// Supplied length
        actual: usize,
    },
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for Socks5ReplyCode {
    type Error = Socks5Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Socks5ReplyCode::Succeeded),
            0x01 => Ok(Socks5ReplyCode::GeneralFailure),
            0x02 => Ok(Socks5ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(Socks5ReplyCode::NetworkUnreachable),
            0x04 => Ok(Socks5ReplyCode::HostUnreachable),
            0x05 => Ok(Socks5ReplyCode::ConnectionRefused),
            0x06 => Ok(Socks5ReplyCode::TtlExpired),
            0x07 => Ok(Socks5ReplyCode::CommandNotSupported),
            0x08 => Ok(Socks5ReplyCode::AddressTypeNotSupported),
            _ => Err(Socks5Error::GeneralFailure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks5_reply_code_from_u8() {
        assert_eq!(
            Socks5ReplyCode::try_from(0x00).unwrap(),
            Socks5ReplyCode::Succeeded
        );
        assert_eq!(
            Socks5ReplyCode::try_from(0x04).unwrap(),
            Socks5ReplyCode::HostUnreachable
        );
        assert_eq!(
            Socks5ReplyCode::try_from(0x08).unwrap(),
            Socks5ReplyCode::AddressTypeNotSupported
        );
        assert!(Socks5ReplyCode::try_from(0x09).is_err());
        assert!(Socks5ReplyCode::try_from(0xFF).is_err());
    }

    #[test]
    fn test_socks5_reply_code_to_u8() {
        assert_eq!(u8::from(Socks5ReplyCode::Succeeded), 0x00);
        assert_eq!(u8::from(Socks5ReplyCode::ConnectionNotAllowed), 0x02);
        assert_eq!(u8::from(Socks5ReplyCode::HostUnreachable), 0x04);
        assert_eq!(u8::from(Socks5ReplyCode::CommandNotSupported), 0x07);
    }

    #[test]
    fn test_socks5_error_reply_code() {
        assert_eq!(
            Socks5Error::AddressTypeNotSupported(9).reply_code(),
            Socks5ReplyCode::AddressTypeNotSupported
        );
        assert_eq!(
            Socks5Error::ConnectionNotAllowed.reply_code(),
            Socks5ReplyCode::ConnectionNotAllowed
        );
        assert_eq!(
            Socks5Error::NoAcceptableMethod.reply_code(),
            Socks5ReplyCode::GeneralFailure
        );
    }

    #[test]
    fn test_proxy_error_kind() {
        assert_eq!(
            ProxyError::from(Socks5Error::NoAcceptableMethod).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            ProxyError::Connection("refused".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            ProxyError::from(io::Error::new(io::ErrorKind::Other, "x")).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            ProxyError::from(CryptoError::AuthenticationFailure).kind(),
            ErrorKind::Crypto
        );
        assert_eq!(ProxyError::Config("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(ProxyError::System("x".into()).kind(), ErrorKind::System);
    }

    #[test]
    fn test_authentication_failure_is_distinct() {
        let err: ProxyError = CryptoError::AuthenticationFailure.into();
        assert!(err.is_authentication_failure());

        let err: ProxyError = CryptoError::InvalidInputSize {
            expected: 32,
            actual: 3,
        }
        .into();
        assert!(!err.is_authentication_failure());
    }

    #[test]
    fn test_error_display() {
        let err = ProxyError::System("server already running".to_string());
        assert_eq!(format!("{}", err), "System error: server already running");

        let err = ProxyError::from(Socks5Error::NoAcceptableMethod);
        assert_eq!(
            format!("{}", err),
            "Protocol error: Unsupported authentication method"
        );

        let err = CryptoError::UnimplementedMethod("rc4-md5".to_string());
        assert_eq!(format!("{}", err), "Unimplemented method: rc4-md5");

        let err = CryptoError::InvalidInputSize {
            expected: 28,
            actual: 4,
        };
        assert_eq!(
            format!("{}", err),
            "Invalid input size: expected at least 28 bytes, got 4"
        );
    }
}
