//! Social platform identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A social network the suite knows about.
///
/// Only LinkedIn has a working integration; the others parse so requests can
/// be rejected with a precise "unsupported platform" error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Platform {
    LinkedIn,
    Facebook,
    Instagram,
}

impl Platform {
    /// Canonical display name, also stored in `daily_account_metrics.platform`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LinkedIn => "LinkedIn",
            Self::Facebook => "Facebook",
            Self::Instagram => "Instagram",
        }
    }

    /// Lowercase slug used in OAuth routes and session rows.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::LinkedIn => "linkedin",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
        }
    }

    /// Returns an error unless the platform has a live integration.
    pub fn ensure_supported(self) -> Result<Self, AppError> {
        match self {
            Self::LinkedIn => Ok(self),
            other => Err(AppError::UnsupportedPlatform(other.as_str().to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Self::LinkedIn),
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            other => Err(AppError::UnsupportedPlatform(other.to_string())),
        }
    }
}

impl TryFrom<String> for Platform {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.as_str().to_string()
    }
}
