use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Longest accepted OID, in components.
pub const MAX_OID_LEN: usize = 128;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OidParseError {
    #[error("empty OID")]
    Empty,
    #[error("OID component `{0}` is not an unsigned integer")]
    BadComponent(String),
    #[error("OID has {0} components, maximum is {MAX_OID_LEN}")]
    TooLong(usize),
}

/// An object identifier: an ordered sequence of non-negative integers.
///
/// Ordering is lexicographic over the component sequence, so a subtree is
/// a contiguous range and a walk can tell when it has left one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(Vec<u64>);

impl Oid {
    pub fn from_components(components: Vec<u64>) -> Result<Self, OidParseError> {
        if components.is_empty() {
            return Err(OidParseError::Empty);
        }
        if components.len() > MAX_OID_LEN {
            return Err(OidParseError::TooLong(components.len()));
        }
        Ok(Oid(components))
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `prefix` is an ancestor of (or equal to) this OID.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Components strictly below `prefix`, used as a table row key.
    /// Returns `None` when this OID is not under `prefix` or equals it.
    pub fn suffix_after(&self, prefix: &Oid) -> Option<Oid> {
        if self.len() > prefix.len() && self.starts_with(prefix) {
            Some(Oid(self.0[prefix.len()..].to_vec()))
        } else {
            None
        }
    }
}

impl FromStr for Oid {
    type Err = OidParseError;

    /// Parses dotted decimal, with or without a leading dot.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Err(OidParseError::Empty);
        }
        let mut components = Vec::new();
        for part in trimmed.split('.') {
            let n = part
                .parse::<u64>()
                .map_err(|_| OidParseError::BadComponent(part.to_string()))?;
            components.push(n);
        }
        Oid::from_components(components)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{c}")?;
            first = false;
        }
        Ok(())
    }
}
