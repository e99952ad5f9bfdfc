// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the dbdesk engine
//!
//! Driver-specific failures are mapped onto these kinds so the caller can
//! tell a bad profile from an unreachable server from a broken query. Every
//! variant carries the backend diagnostic verbatim where one exists.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all engine operations
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq)]
pub enum EngineError {
    #[error("Unsupported database type: {kind}")]
    UnsupportedBackend { kind: String },

    #[error("Connection failed: {message}")]
    DialFailed { message: String },

    #[error("Connection check failed: {message}")]
    ProbeFailed { message: String },

    #[error("Query execution error: {message}")]
    ExecutionError { message: String },

    #[error("Failed to read result columns: {message}")]
    MetadataError { message: String },

    #[error("Failed to read row: {message}")]
    ScanError { message: String },

    #[error("Result iteration failed: {message}")]
    IterationError { message: String },

    #[error("Connection not found: {id}")]
    NotFound { id: String },

    #[error("{phase} timed out after {timeout_ms}ms")]
    Timeout { phase: String, timeout_ms: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn unsupported_backend(kind: impl Into<String>) -> Self {
        Self::UnsupportedBackend { kind: kind.into() }
    }

    pub fn dial_failed(msg: impl Into<String>) -> Self {
        Self::DialFailed { message: msg.into() }
    }

    pub fn probe_failed(msg: impl Into<String>) -> Self {
        Self::ProbeFailed { message: msg.into() }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn metadata_error(msg: impl Into<String>) -> Self {
        Self::MetadataError { message: msg.into() }
    }

    pub fn scan_error(msg: impl Into<String>) -> Self {
        Self::ScanError { message: msg.into() }
    }

    pub fn iteration_error(msg: impl Into<String>) -> Self {
        Self::IterationError { message: msg.into() }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// True for failures of the connection phase (dial or probe, including
    /// a probe that ran out of time).
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::DialFailed { .. } | Self::ProbeFailed { .. } | Self::Timeout { .. }
        )
    }

    /// The caller stopped waiting, by cancelling or through a timeout.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout { .. })
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
