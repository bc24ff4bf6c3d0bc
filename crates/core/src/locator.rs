//! Locator parsing
//!
//! Handles parsing of locator strings in one of two forms:
//! - a bare `https://...` URL
//! - a bracketed descriptor `[method,destination]` or
//!   `[method,destination,authKind,authPayload]`
//!
//! Parsing is pure: no I/O happens here and the destination is only checked
//! by the driver that consumes it.

use std::fmt;

use crate::error::{Error, Result};

/// Transport named by a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Http,
    Https,
    CloudObjectStore,
    RepositoryTree,
}

impl Method {
    /// Every method, in grammar order
    pub const ALL: [Method; 4] = [
        Method::Http,
        Method::Https,
        Method::CloudObjectStore,
        Method::RepositoryTree,
    ];

    /// Name as written in a locator
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Http => "http",
            Method::Https => "https",
            Method::CloudObjectStore => "cloud-object-store",
            Method::RepositoryTree => "repository-tree",
        }
    }

    /// Auth kinds this method accepts
    pub const fn supported_auth(self) -> &'static [AuthKind] {
        match self {
            Method::Http | Method::Https => &[
                AuthKind::Basic,
                AuthKind::Bearer,
                AuthKind::Token,
                AuthKind::ApiKeyHeader,
            ],
            Method::CloudObjectStore => &[AuthKind::ServiceAccount],
            Method::RepositoryTree => &[AuthKind::Token],
        }
    }

    /// Whether the two-field form (no auth) is legal
    pub const fn allows_anonymous(self) -> bool {
        !matches!(self, Method::CloudObjectStore)
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::UnsupportedMethod(s.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication scheme named by a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthKind {
    /// `user:pass`
    Basic,
    Bearer,
    Token,
    /// Opaque key sent in a dedicated header
    ApiKeyHeader,
    /// base64-encoded JSON credentials
    ServiceAccount,
}

impl AuthKind {
    pub const ALL: [AuthKind; 5] = [
        AuthKind::Basic,
        AuthKind::Bearer,
        AuthKind::Token,
        AuthKind::ApiKeyHeader,
        AuthKind::ServiceAccount,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            AuthKind::Basic => "basic",
            AuthKind::Bearer => "bearer",
            AuthKind::Token => "token",
            AuthKind::ApiKeyHeader => "api-key-header",
            AuthKind::ServiceAccount => "service-account",
        }
    }
}

impl std::str::FromStr for AuthKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AuthKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnsupportedAuth(s.to_string()))
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed, validated locator
#[derive(Clone, PartialEq, Eq)]
pub struct Descriptor {
    method: Method,
    destination: String,
    auth: Option<(AuthKind, String)>,
}

impl Descriptor {
    /// Build a descriptor, checking the auth kind against the method
    pub fn new(
        method: Method,
        destination: impl Into<String>,
        auth: Option<(AuthKind, String)>,
    ) -> Result<Self> {
        match &auth {
            Some((kind, _)) if !method.supported_auth().contains(kind) => {
                return Err(Error::UnsupportedAuth(format!(
                    "{kind} is not valid for {method}"
                )));
            }
            None if !method.allows_anonymous() => {
                return Err(Error::UnsupportedAuth(format!(
                    "{method} requires one of: {}",
                    auth_list(method)
                )));
            }
            _ => {}
        }

        Ok(Self {
            method,
            destination: destination.into(),
            auth,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn auth_kind(&self) -> Option<AuthKind> {
        self.auth.as_ref().map(|(kind, _)| *kind)
    }

    /// Raw auth payload, uninterpreted until a driver consumes it
    pub fn auth_payload(&self) -> Option<&str> {
        self.auth.as_ref().map(|(_, payload)| payload.as_str())
    }
}

// Payloads are credentials; keep them out of logs and debug output.
impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("method", &self.method)
            .field("destination", &self.destination)
            .field("auth_kind", &self.auth_kind())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.auth_kind() {
            Some(kind) => write!(f, "[{},{},{},***]", self.method, self.destination, kind),
            None => write!(f, "[{},{}]", self.method, self.destination),
        }
    }
}

impl std::str::FromStr for Descriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_locator(s)
    }
}

/// Parse a locator string into a Descriptor
///
/// A string starting with `https://` is shorthand for `[https,<string>]`.
/// Anything else must be bracketed with exactly 2 or 4 comma-separated
/// fields. Fields are trimmed; method and auth kind are case-folded.
pub fn parse_locator(input: &str) -> Result<Descriptor> {
    if input.starts_with("https://") {
        return Descriptor::new(Method::Https, input, None);
    }

    let inner = input
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| {
            Error::Syntax("locator must start with https:// or be a bracketed [method,destination]".into())
        })?;

    let fields: Vec<&str> = inner.split(',').map(str::trim).collect();

    match fields.as_slice() {
        [method, destination] => {
            let method: Method = method.to_lowercase().parse()?;
            Descriptor::new(method, *destination, None)
        }
        [method, destination, kind, payload] => {
            let method: Method = method.to_lowercase().parse()?;
            let kind: AuthKind = kind.to_lowercase().parse()?;
            Descriptor::new(method, *destination, Some((kind, payload.to_string())))
        }
        _ => Err(Error::Syntax(format!(
            "locator has {} components, expected 2 or 4",
            fields.len()
        ))),
    }
}

fn auth_list(method: Method) -> String {
    method
        .supported_auth()
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
