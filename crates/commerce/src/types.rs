//! Wire-level types shared by every `CommerceApi` implementation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Response header carrying `used/capacity` of the call-limit bucket
pub const CALL_LIMIT_HEADER: &str = "X-Shopify-Shop-Api-Call-Limit";

/// Last known state of the remote rate-limit bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub used: u32,
    pub capacity: u32,
}

impl RateLimitSnapshot {
    /// Parse a `used/capacity` header value such as `32/40`
    pub fn parse_header(value: &str) -> Option<Self> {
        let (used, capacity) = value.trim().split_once('/')?;
        let used = used.trim().parse().ok()?;
        let capacity: u32 = capacity.trim().parse().ok()?;
        if capacity == 0 {
            return None;
        }
        Some(Self { used, capacity })
    }

    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.used)
    }
}

/// Lifecycle of an asynchronous bulk job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkJobState {
    Created,
    Running,
    Completed,
    Failed,
    Canceling,
    Canceled,
    Expired,
}

impl BulkJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BulkJobState::Completed | BulkJobState::Failed | BulkJobState::Canceled | BulkJobState::Expired
        )
    }
}

impl fmt::Display for BulkJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BulkJobState::Created => "CREATED",
            BulkJobState::Running => "RUNNING",
            BulkJobState::Completed => "COMPLETED",
            BulkJobState::Failed => "FAILED",
            BulkJobState::Canceling => "CANCELING",
            BulkJobState::Canceled => "CANCELED",
            BulkJobState::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// Status document returned by bulk job polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkJobStatus {
    pub id: String,
    pub status: BulkJobState,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default, deserialize_with = "de_count")]
    pub object_count: u64,
}

// GraphQL serialises UnsignedInt64 as a string
fn de_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
        Null,
    }
    match Count::deserialize(deserializer)? {
        Count::Number(n) => Ok(n),
        Count::Text(s) => s.parse().map_err(serde::de::Error::custom),
        Count::Null => Ok(0),
    }
}
