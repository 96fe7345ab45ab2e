//! EIP-4361 message model, canonical serialization and parsing.
//!
//! The canonical text layout:
//!
//! ```text
//! [{scheme}://]{domain} wants you to sign in with your Ethereum account:
//! {address}
//!
//! {statement}
//!
//! URI: {uri}
//! Version: 1
//! Chain ID: {chain_id}
//! Nonce: {nonce}
//! Issued At: {issued_at}
//! Expiration Time: {expiration_time}
//! Not Before: {not_before}
//! Request ID: {request_id}
//! Resources:
//! - {resource}
//! ```
//!
//! Without a statement the statement line and its trailing blank line
//! collapse to a single blank line. Lines after `Issued At` are optional.

use super::address::{Address, AddressError};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const URI_TAG: &str = "URI: ";
const VERSION_TAG: &str = "Version: ";
const CHAIN_TAG: &str = "Chain ID: ";
const NONCE_TAG: &str = "Nonce: ";
const ISSUED_AT_TAG: &str = "Issued At: ";
const EXPIRATION_TAG: &str = "Expiration Time: ";
const NOT_BEFORE_TAG: &str = "Not Before: ";
const REQUEST_ID_TAG: &str = "Request ID: ";
const RESOURCES_TAG: &str = "Resources:";
const RESOURCE_ITEM: &str = "- ";

/// The only message version EIP-4361 defines.
pub const VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("missing sign-in header line")]
    MissingHeader,
    #[error("invalid domain")]
    InvalidDomain,
    #[error("invalid scheme")]
    InvalidScheme,
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),
    #[error("address must be EIP-55 checksummed")]
    AddressNotChecksummed,
    #[error("invalid statement")]
    InvalidStatement,
    #[error("expected line starting with '{0}'")]
    ExpectedLine(&'static str),
    #[error("invalid URI: {0}")]
    InvalidUri(String),
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),
    #[error("invalid chain id")]
    InvalidChainId,
    #[error("nonce must be non-empty and alphanumeric")]
    InvalidNonce,
    #[error("invalid timestamp for '{0}'")]
    InvalidTimestamp(&'static str),
    #[error("unexpected trailing content")]
    TrailingContent,
}

/// RFC 3339 timestamp that keeps the exact text it was parsed from, so a
/// parsed message re-serializes to the bytes the wallet signed.
#[derive(Clone, PartialEq, Eq)]
pub struct Timestamp {
    at: DateTime<Utc>,
    text: String,
}

impl Timestamp {
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.at
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self {
            at,
            text: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let at = DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc);
        Ok(Self {
            at,
            text: s.to_string(),
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.text)
    }
}

/// A Sign-In-With-Ethereum message. Immutable once built; `Display` yields
/// the canonical text that gets signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    scheme: Option<String>,
    domain: String,
    address: Address,
    statement: Option<String>,
    uri: String,
    chain_id: u64,
    nonce: String,
    issued_at: Timestamp,
    expiration_time: Option<Timestamp>,
    not_before: Option<Timestamp>,
    request_id: Option<String>,
    resources: Vec<String>,
}

impl SiweMessage {
    /// Build a message from its required fields, validating each one.
    pub fn new(
        domain: &str,
        address: Address,
        statement: Option<&str>,
        uri: &str,
        chain_id: u64,
        nonce: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, MessageError> {
        validate_domain(domain)?;
        if let Some(s) = statement {
            validate_statement(s)?;
        }
        validate_uri(uri)?;
        validate_nonce(nonce)?;

        Ok(Self {
            scheme: None,
            domain: domain.to_string(),
            address,
            statement: statement.map(str::to_string),
            uri: uri.to_string(),
            chain_id,
            nonce: nonce.to_string(),
            issued_at: issued_at.into(),
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        })
    }

    /// Prefix the header with `{scheme}://`.
    pub fn with_scheme(mut self, scheme: &str) -> Result<Self, MessageError> {
        validate_scheme(scheme)?;
        self.scheme = Some(scheme.to_string());
        Ok(self)
    }

    pub fn with_expiration_time(mut self, at: DateTime<Utc>) -> Self {
        self.expiration_time = Some(at.into());
        self
    }

    pub fn with_not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at.into());
        self
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at.as_datetime()
    }

    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.expiration_time.as_ref().map(Timestamp::as_datetime)
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before.as_ref().map(Timestamp::as_datetime)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
        }
        writeln!(f, "{}{}", self.domain, HEADER_SUFFIX)?;
        writeln!(f, "{}", self.address.to_checksum())?;
        writeln!(f)?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{}", statement)?;
        }
        writeln!(f)?;
        writeln!(f, "{}{}", URI_TAG, self.uri)?;
        writeln!(f, "{}{}", VERSION_TAG, VERSION)?;
        writeln!(f, "{}{}", CHAIN_TAG, self.chain_id)?;
        writeln!(f, "{}{}", NONCE_TAG, self.nonce)?;
        write!(f, "{}{}", ISSUED_AT_TAG, self.issued_at)?;
        if let Some(t) = &self.expiration_time {
            write!(f, "\n{}{}", EXPIRATION_TAG, t)?;
        }
        if let Some(t) = &self.not_before {
            write!(f, "\n{}{}", NOT_BEFORE_TAG, t)?;
        }
        if let Some(id) = &self.request_id {
            write!(f, "\n{}{}", REQUEST_ID_TAG, id)?;
        }
        if !self.resources.is_empty() {
            write!(f, "\n{}", RESOURCES_TAG)?;
            for r in &self.resources {
                write!(f, "\n{}{}", RESOURCE_ITEM, r)?;
            }
        }
        Ok(())
    }
}

/// Cursor over message lines.
struct Lines<'a> {
    inner: std::iter::Peekable<std::str::Split<'a, char>>,
}

impl<'a> Lines<'a> {
    fn next(&mut self, expected: &'static str) -> Result<&'a str, MessageError> {
        self.inner.next().ok_or(MessageError::ExpectedLine(expected))
    }

    fn blank(&mut self) -> Result<(), MessageError> {
        match self.inner.next() {
            Some("") => Ok(()),
            _ => Err(MessageError::ExpectedLine("")),
        }
    }

    fn tagged(&mut self, tag: &'static str) -> Result<&'a str, MessageError> {
        self.next(tag)?
            .strip_prefix(tag)
            .ok_or(MessageError::ExpectedLine(tag))
    }

    fn optional(&mut self, tag: &'static str) -> Option<&'a str> {
        let value = self.inner.peek()?.strip_prefix(tag)?;
        self.inner.next();
        Some(value)
    }
}

fn parse_timestamp(s: &str, tag: &'static str) -> Result<Timestamp, MessageError> {
    s.parse().map_err(|_| MessageError::InvalidTimestamp(tag))
}

impl FromStr for SiweMessage {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = Lines {
            inner: s.split('\n').peekable(),
        };

        let authority = lines
            .next(HEADER_SUFFIX)?
            .strip_suffix(HEADER_SUFFIX)
            .ok_or(MessageError::MissingHeader)?;
        let (scheme, domain) = match authority.split_once("://") {
            Some((scheme, domain)) => {
                validate_scheme(scheme)?;
                (Some(scheme.to_string()), domain)
            }
            None => (None, authority),
        };
        validate_domain(domain)?;

        let address_line = lines.next("address")?;
        let address: Address = address_line.parse()?;
        if address.to_checksum() != address_line {
            return Err(MessageError::AddressNotChecksummed);
        }

        lines.blank()?;
        let statement = match lines.next("statement")? {
            "" => None,
            s => {
                validate_statement(s)?;
                lines.blank()?;
                Some(s.to_string())
            }
        };

        let uri = lines.tagged(URI_TAG)?;
        validate_uri(uri)?;

        let version = lines.tagged(VERSION_TAG)?;
        if version != VERSION {
            return Err(MessageError::UnsupportedVersion(version.to_string()));
        }

        let chain_id = lines
            .tagged(CHAIN_TAG)?
            .parse::<u64>()
            .map_err(|_| MessageError::InvalidChainId)?;

        let nonce = lines.tagged(NONCE_TAG)?;
        validate_nonce(nonce)?;

        let issued_at = parse_timestamp(lines.tagged(ISSUED_AT_TAG)?, ISSUED_AT_TAG)?;

        let expiration_time = lines
            .optional(EXPIRATION_TAG)
            .map(|t| parse_timestamp(t, EXPIRATION_TAG))
            .transpose()?;
        let not_before = lines
            .optional(NOT_BEFORE_TAG)
            .map(|t| parse_timestamp(t, NOT_BEFORE_TAG))
            .transpose()?;
        let request_id = lines.optional(REQUEST_ID_TAG).map(str::to_string);

        let mut resources = Vec::new();
        match lines.optional(RESOURCES_TAG) {
            Some("") => {
                while let Some(r) = lines.optional(RESOURCE_ITEM) {
                    validate_uri(r)?;
                    resources.push(r.to_string());
                }
            }
            Some(_) => return Err(MessageError::ExpectedLine(RESOURCES_TAG)),
            None => {}
        }

        if lines.inner.next().is_some() {
            return Err(MessageError::TrailingContent);
        }

        Ok(Self {
            scheme,
            domain: domain.to_string(),
            address,
            statement,
            uri: uri.to_string(),
            chain_id,
            nonce: nonce.to_string(),
            issued_at,
            expiration_time,
            not_before,
            request_id,
            resources,
        })
    }
}

fn validate_domain(domain: &str) -> Result<(), MessageError> {
    if domain.is_empty() || domain.chars().any(char::is_whitespace) {
        return Err(MessageError::InvalidDomain);
    }
    Ok(())
}

/// RFC 3986: `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`
fn validate_scheme(scheme: &str) -> Result<(), MessageError> {
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return Err(MessageError::InvalidScheme);
    }
    Ok(())
}

fn validate_statement(statement: &str) -> Result<(), MessageError> {
    if statement.is_empty() || statement.contains('\n') {
        return Err(MessageError::InvalidStatement);
    }
    Ok(())
}

fn validate_uri(uri: &str) -> Result<(), MessageError> {
    url::Url::parse(uri).map_err(|e| MessageError::InvalidUri(e.to_string()))?;
    Ok(())
}

fn validate_nonce(nonce: &str) -> Result<(), MessageError> {
    if nonce.is_empty() || !nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(MessageError::InvalidNonce);
    }
    Ok(())
}
