//! Contact addresses: scheme-qualified URNs such as `tel:+250788123123` or `webchat:c1`.
//!
//! A URN is `scheme:path[?query][#display]`. Routing and equality only look at
//! the scheme and the path; query and display are auxiliary.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

pub const TEL_SCHEME: &str = "tel";
pub const WEBCHAT_SCHEME: &str = "webchat";
pub const WHATSAPP_SCHEME: &str = "whatsapp";
pub const TELEGRAM_SCHEME: &str = "telegram";
pub const EXTERNAL_SCHEME: &str = "ext";
pub const EMAIL_SCHEME: &str = "mailto";

const SCHEMES: &[&str] = &[
    TEL_SCHEME,
    WEBCHAT_SCHEME,
    WHATSAPP_SCHEME,
    TELEGRAM_SCHEME,
    EXTERNAL_SCHEME,
    EMAIL_SCHEME,
];

const MAX_TEL_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct Urn {
    scheme: String,
    path: String,
    query: Option<String>,
    display: Option<String>,
}

impl Urn {
    /// Build a URN from its parts, normalizing and validating the path for the scheme.
    pub fn new(
        scheme: &str,
        path: &str,
        query: Option<&str>,
        display: Option<&str>,
    ) -> Result<Self> {
        let scheme = scheme.trim().to_ascii_lowercase();
        if !SCHEMES.contains(&scheme.as_str()) {
            return Err(Error::invalid_address(format!("unknown URN scheme '{}'", scheme)));
        }
        let path = normalize_path(&scheme, path)?;
        Ok(Self {
            scheme,
            path,
            query: query.map(str::to_string).filter(|q| !q.is_empty()),
            display: display.map(str::to_string).filter(|d| !d.is_empty()),
        })
    }

    /// Shorthand for a URN with no auxiliary parts.
    pub fn from_parts(scheme: &str, path: &str) -> Result<Self> {
        Self::new(scheme, path, None, None)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The identity part, e.g. the phone number for `tel:`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }

    /// `scheme:path` without the auxiliary parts.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.scheme, self.path)
    }
}

fn normalize_path(scheme: &str, path: &str) -> Result<String> {
    let path = path.trim();
    if path.is_empty() {
        return Err(Error::invalid_address(format!("empty path for {} URN", scheme)));
    }
    if path.chars().any(char::is_whitespace) && scheme != TEL_SCHEME {
        return Err(Error::invalid_address(format!(
            "whitespace in {} URN path '{}'",
            scheme, path
        )));
    }
    match scheme {
        TEL_SCHEME => normalize_tel(path),
        TELEGRAM_SCHEME => {
            if path.chars().all(|c| c.is_ascii_digit()) {
                Ok(path.to_string())
            } else {
                Err(Error::invalid_address(format!("telegram id '{}' must be numeric", path)))
            }
        }
        EMAIL_SCHEME => {
            if path.matches('@').count() == 1 && !path.starts_with('@') && !path.ends_with('@') {
                Ok(path.to_lowercase())
            } else {
                Err(Error::invalid_address(format!("'{}' is not an email address", path)))
            }
        }
        _ => Ok(path.to_string()),
    }
}

/// Strip formatting characters and check the result looks like a number or short code.
fn normalize_tel(path: &str) -> Result<String> {
    let cleaned: String = path
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if digits.is_empty()
        || digits.len() > MAX_TEL_LEN
        || !digits.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(Error::invalid_address(format!("'{}' is not a phone number", path)));
    }
    Ok(cleaned)
}

impl PartialEq for Urn {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.path == other.path
    }
}

impl Eq for Urn {}

impl Hash for Urn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.path.hash(state);
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.path)?;
        if let Some(q) = &self.query {
            write!(f, "?{}", q)?;
        }
        if let Some(d) = &self.display {
            write!(f, "#{}", d)?;
        }
        Ok(())
    }
}

impl FromStr for Urn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::invalid_address(format!("'{}' has no scheme", s)))?;
        let (rest, display) = match rest.split_once('#') {
            Some((r, d)) => (r, Some(d)),
            None => (rest, None),
        };
        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };
        Self::new(scheme, path, query, display)
    }
}

impl Serialize for Urn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Urn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
