//! Sync unit model identifying one independently synchronized stream

use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known resource types served by the activity API
pub mod resources {
    pub const PULL_REQUESTS: &str = "pull_requests";
    pub const REVIEWS: &str = "reviews";
    pub const COMMENTS: &str = "comments";
    pub const COMMITS: &str = "commits";
}

/// Kind of activity record a stream carries (e.g. "pull_requests")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(pub String);

impl ResourceType {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether list records of this kind are abbreviated and need a
    /// per-item detail call before they are useful for reporting
    ///
    /// Unknown kinds are treated as abbreviated.
    pub fn requires_detail(&self) -> bool {
        !matches!(self.as_str(), resources::REVIEWS | resources::COMMENTS)
    }
}

impl From<&str> for ResourceType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `(resource_type, organization, repository)` identifying one stream
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyncUnit {
    pub resource_type: ResourceType,
    pub organization: String,
    pub repository: String,
}

impl SyncUnit {
    pub fn new(
        resource_type: impl Into<ResourceType>,
        organization: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            organization: organization.into(),
            repository: repository.into(),
        }
    }
}

impl fmt::Display for SyncUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.resource_type, self.organization, self.repository
        )
    }
}
