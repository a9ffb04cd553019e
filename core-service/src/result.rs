//! Result objects crossing the consumer boundary
//!
//! UI-facing operations never raise; they return a discriminated
//! `{success, data?, error?}` object. "Not found" is a successful lookup
//! with no data, not an error.

use core_offline::StorageError;
use core_sync::SyncError;
use serde::Serialize;

/// Machine-readable error categories surfaced to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpErrorKind {
    Validation,
    QuotaExceeded,
    InvalidFormat,
    Storage,
    Sync,
    Offline,
}

/// Structured error payload for the UI layer
#[derive(Debug, Clone, Serialize)]
pub struct OpError {
    pub kind: OpErrorKind,
    pub message: String,
}

/// Discriminated operation result
#[derive(Debug, Clone, Serialize)]
pub struct OpResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OpError>,
}

impl<T> OpResult<T> {
    /// Successful operation carrying data
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Successful operation with nothing to return (e.g. lookup miss)
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// Failed operation
    pub fn err(kind: OpErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(OpError {
                kind,
                message: message.into(),
            }),
        }
    }
}

impl From<&StorageError> for OpError {
    fn from(err: &StorageError) -> Self {
        let kind = match err {
            StorageError::Validation { .. } => OpErrorKind::Validation,
            StorageError::QuotaExceeded { .. } => OpErrorKind::QuotaExceeded,
            StorageError::InvalidFormat(_) => OpErrorKind::InvalidFormat,
            StorageError::Store(_) | StorageError::Encoding(_) => OpErrorKind::Storage,
            StorageError::Bridge(_) => OpErrorKind::Sync,
        };
        OpError {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<&SyncError> for OpError {
    fn from(err: &SyncError) -> Self {
        let kind = match err {
            SyncError::Offline => OpErrorKind::Offline,
            SyncError::Database(_) => OpErrorKind::Storage,
            _ => OpErrorKind::Sync,
        };
        OpError {
            kind,
            message: err.to_string(),
        }
    }
}

pub(crate) fn from_storage<T>(result: core_offline::Result<T>) -> OpResult<T> {
    match result {
        Ok(data) => OpResult::ok(data),
        Err(e) => OpResult {
            success: false,
            data: None,
            error: Some(OpError::from(&e)),
        },
    }
}

pub(crate) fn from_sync<T>(result: core_sync::Result<T>) -> OpResult<T> {
    match result {
        Ok(data) => OpResult::ok(data),
        Err(e) => OpResult {
            success: false,
            data: None,
            error: Some(OpError::from(&e)),
        },
    }
}

pub(crate) fn from_storage_optional<T>(result: core_offline::Result<Option<T>>) -> OpResult<T> {
    match result {
        Ok(Some(data)) => OpResult::ok(data),
        Ok(None) => OpResult::ok_empty(),
        Err(e) => OpResult {
            success: false,
            data: None,
            error: Some(OpError::from(&e)),
        },
    }
}
