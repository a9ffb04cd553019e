//! Remote Songbook API Abstraction
//!
//! The sync queue drains queued mutations against this trait. The concrete
//! transport (HTTP verbs, base URL, auth header) lives in the host bridge;
//! the core only distinguishes success from failure and keeps the failure
//! message for the operation record.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Remote resource kinds the API exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Song,
    Setlist,
    Arrangement,
}

impl ResourceKind {
    /// URL path segment for this resource
    pub fn as_path(&self) -> &'static str {
        match self {
            ResourceKind::Song => "songs",
            ResourceKind::Setlist => "setlists",
            ResourceKind::Arrangement => "arrangements",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Song => "song",
            ResourceKind::Setlist => "setlist",
            ResourceKind::Arrangement => "arrangement",
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "song" => Ok(ResourceKind::Song),
            "setlist" => Ok(ResourceKind::Setlist),
            "arrangement" => Ok(ResourceKind::Arrangement),
            _ => Err(BridgeError::OperationFailed(format!(
                "Unknown resource kind: {}",
                s
            ))),
        }
    }
}

/// Response from a successful remote mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteResponse {
    /// Server-assigned identifier for the resource (echoed back on updates)
    pub server_id: Option<String>,
    /// Server-side version after the mutation
    pub server_version: Option<i64>,
}

/// Remote songbook API client
///
/// Any non-2xx response surfaces as [`BridgeError::Remote`]; transport-level
/// failures (DNS, refused connection, timeout) surface as
/// [`BridgeError::Unreachable`]. The sync queue treats both identically for
/// retry purposes and records the message on the operation.
#[async_trait::async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create a resource (POST). `payload` is the snapshot taken at enqueue.
    async fn create(&self, resource: ResourceKind, payload: &serde_json::Value)
        -> Result<RemoteResponse>;

    /// Update a resource by id (PUT).
    async fn update(
        &self,
        resource: ResourceKind,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<RemoteResponse>;

    /// Delete a resource by id (DELETE).
    async fn delete(&self, resource: ResourceKind, id: &str) -> Result<()>;

    /// Lightweight reachability probe (a HEAD/GET against a health endpoint).
    ///
    /// Used by the connectivity monitor to distinguish a genuinely usable
    /// connection from a captive portal or a down API.
    async fn probe(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_resource_kind_paths() {
        assert_eq!(ResourceKind::Song.as_path(), "songs");
        assert_eq!(ResourceKind::Setlist.as_path(), "setlists");
        assert_eq!(ResourceKind::Arrangement.as_path(), "arrangements");
    }

    #[test]
    fn test_resource_kind_round_trip() {
        for kind in [
            ResourceKind::Song,
            ResourceKind::Setlist,
            ResourceKind::Arrangement,
        ] {
            assert_eq!(ResourceKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(ResourceKind::from_str("album").is_err());
    }
}
