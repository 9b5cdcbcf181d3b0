use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::IndexError;

pub type ModId = String;
pub type ModVersionString = String;

/// Platforms a mod version can be published for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Win,
    Android32,
    Android64,
    Ios,
    Mac,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Win,
        Platform::Android32,
        Platform::Android64,
        Platform::Ios,
        Platform::Mac,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Win => "win",
            Platform::Android32 => "android32",
            Platform::Android64 => "android64",
            Platform::Ios => "ios",
            Platform::Mac => "mac",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| IndexError::InvalidValue {
                kind: "platform",
                value: s.to_string(),
            })
    }
}

/// Review status of a mod version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModStatus {
    Accepted,
    Pending,
    Rejected,
    Unlisted,
}

impl ModStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModStatus::Accepted => "accepted",
            ModStatus::Pending => "pending",
            ModStatus::Rejected => "rejected",
            ModStatus::Unlisted => "unlisted",
        }
    }
}

impl fmt::Display for ModStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModStatus {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(ModStatus::Accepted),
            "pending" => Ok(ModStatus::Pending),
            "rejected" => Ok(ModStatus::Rejected),
            "unlisted" => Ok(ModStatus::Unlisted),
            other => Err(IndexError::InvalidValue {
                kind: "mod status",
                value: other.to_string(),
            }),
        }
    }
}

/// Whether an entity was built from a summary payload or a full record.
///
/// Transitions only go from `Partial` to `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    Partial,
    Complete,
}

impl Hydration {
    /// Combine with newly received data without ever going back to `Partial`.
    pub fn merge(self, incoming: Hydration) -> Hydration {
        match (self, incoming) {
            (Hydration::Complete, _) | (_, Hydration::Complete) => Hydration::Complete,
            _ => Hydration::Partial,
        }
    }
}

/// Login challenge issued by `POST /v1/login/github`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BeginLoginInfo {
    pub uuid: Uuid,
    /// Seconds the client should wait between polls.
    pub interval: u64,
    pub uri: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub count: u64,
}
