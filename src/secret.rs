use std::fmt;

use zeroize::Zeroize;

/// SNMP community string held so it cannot leak into logs.
/// - Debug and Display show "[REDACTED]" instead of the credential
/// - The buffer is zeroized on drop using volatile writes
#[derive(Clone)]
pub struct Community(String);

impl Community {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw credential. Hand this to the transport layer only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First two characters plus a marker, safe for diagnostics.
    pub fn preview(&self) -> String {
        if self.0.chars().count() <= 2 {
            "***".to_string()
        } else {
            let head: String = self.0.chars().take(2).collect();
            format!("{head}***")
        }
    }
}

impl fmt::Debug for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Drop for Community {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
