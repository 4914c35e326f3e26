// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for instance API calls and reconciliation.
//!
//! This module provides specialized error types for:
//! - Instance API operations ([`ClientError`]), returned by every
//!   [`InstanceClient`](crate::client::InstanceClient) call
//! - Per-entity reconciliation failures ([`EntityError`]), captured into
//!   results instead of being propagated
//! - Run-level input errors ([`ReconcileError`]), the only errors that abort
//!   a whole reconciliation
//! - Desired-state conflicts ([`ConfigConflict`]), reported as warnings
//! - Fleet configuration problems ([`ConfigError`]), raised before any
//!   instance is contacted

use serde::Serialize;
use thiserror::Error;

use crate::entity::Kind;
use crate::reconcilers::differ::Operation;
use crate::status_reasons::{
    REASON_ACTION_SKIPPED, REASON_APPLY_FAILED, REASON_AUTHENTICATION_FAILED,
    REASON_CONFIG_CONFLICT, REASON_FETCH_FAILED, REASON_HTTP_CONNECTION_FAILED,
    REASON_HTTP_REQUEST_TIMEOUT, REASON_INVALID_RESPONSE, REASON_NOT_FOUND,
    REASON_PARTIALLY_APPLIED, REASON_REQUEST_REJECTED, REASON_RESOLVE_FAILED,
    REASON_SERVER_ERROR, REASON_UNEXPECTED_HTTP_RESPONSE, REASON_UNRESOLVED_REFERENCE,
};

/// Errors that can occur while talking to one instance.
///
/// These errors represent failures of a single API call. They carry the
/// endpoint so that a message is attributable without further context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// HTTP connection failed (network unreachable, connection refused, TLS failure)
    #[error("HTTP connection to {endpoint} failed: {reason}")]
    HttpConnectionFailed {
        /// The instance endpoint that couldn't be reached
        endpoint: String,
        /// Reason for the connection failure
        reason: String,
    },

    /// HTTP request timeout
    #[error("HTTP request to {endpoint} timed out after {timeout_ms}ms")]
    HttpRequestTimeout {
        /// The instance endpoint that timed out
        endpoint: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Login refused, or the session id was rejected (HTTP 401/403)
    #[error("Authentication against {endpoint} failed: {reason}")]
    AuthenticationFailed {
        /// The instance endpoint
        endpoint: String,
        /// Message returned by the instance
        reason: String,
    },

    /// Addressed entity does not exist (HTTP 404)
    #[error("{resource} not found on {endpoint} (HTTP 404)")]
    NotFound {
        /// The instance endpoint
        endpoint: String,
        /// Path or entity that was not found
        resource: String,
    },

    /// The instance refused the payload (HTTP 400, or per-item errors in a 2xx body)
    #[error("Request to {endpoint} rejected: {reason}")]
    Rejected {
        /// The instance endpoint
        endpoint: String,
        /// Message returned by the instance
        reason: String,
    },

    /// Server-side failure (HTTP 5xx)
    #[error("Instance {endpoint} failed to process request (HTTP {status_code}): {reason}")]
    ServerError {
        /// The instance endpoint
        endpoint: String,
        /// HTTP status code
        status_code: u16,
        /// Response body or error message
        reason: String,
    },

    /// Unexpected HTTP status that maps to no other variant
    #[error("Unexpected HTTP response from {endpoint}: {status_code} {reason}")]
    UnexpectedHttpResponse {
        /// The instance endpoint
        endpoint: String,
        /// HTTP status code
        status_code: u16,
        /// Response body or error message
        reason: String,
    },

    /// Response body could not be decoded
    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse {
        /// The instance endpoint
        endpoint: String,
        /// Decoding error
        reason: String,
    },

    /// A later step of a multi-step change failed after an earlier step had
    /// already modified the instance (e.g. a DNS entry was removed but its
    /// replacement could not be added)
    #[error("{cause} ({completed})")]
    PartiallyApplied {
        /// What had already been done before the failure
        completed: String,
        /// The failure of the step that did not complete
        cause: Box<ClientError>,
    },
}

impl ClientError {
    /// Returns true if retrying the same call later could succeed.
    ///
    /// Nothing in this crate retries; the classification is surfaced so that
    /// callers can decide whether to schedule another pass.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpConnectionFailed { .. }
            | Self::HttpRequestTimeout { .. }
            | Self::ServerError { .. } => true,
            Self::PartiallyApplied { cause, .. } => cause.is_transient(),
            _ => false,
        }
    }

    /// Stable reason code for reports and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::HttpConnectionFailed { .. } => REASON_HTTP_CONNECTION_FAILED,
            Self::HttpRequestTimeout { .. } => REASON_HTTP_REQUEST_TIMEOUT,
            Self::AuthenticationFailed { .. } => REASON_AUTHENTICATION_FAILED,
            Self::NotFound { .. } => REASON_NOT_FOUND,
            Self::Rejected { .. } => REASON_REQUEST_REJECTED,
            Self::ServerError { .. } => REASON_SERVER_ERROR,
            Self::UnexpectedHttpResponse { .. } => REASON_UNEXPECTED_HTTP_RESPONSE,
            Self::InvalidResponse { .. } => REASON_INVALID_RESPONSE,
            Self::PartiallyApplied { .. } => REASON_PARTIALLY_APPLIED,
        }
    }
}

/// Why one (instance, kind, key) could not be converged.
///
/// Captured into [`Outcome::Failed`](crate::reconcilers::Outcome::Failed);
/// never propagated past the reconciler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// A group name is unknown on the instance
    #[error("group '{reference}' referenced by {kind} '{key}' does not exist on {instance}")]
    UnresolvedReference {
        instance: String,
        kind: Kind,
        key: String,
        reference: String,
    },

    /// Listing groups failed, so no reference on this instance could be resolved
    #[error("failed to resolve group names on {instance}: {cause}")]
    ResolveFailed { instance: String, cause: ClientError },

    /// Reading current state failed; the whole kind was skipped on this instance
    #[error("failed to fetch {kind} state from {instance}: {cause}")]
    FetchFailed {
        instance: String,
        kind: Kind,
        cause: ClientError,
    },

    /// One create/update/delete call failed
    #[error("failed to {operation} {kind} '{key}' on {instance}: {cause}")]
    ApplyFailed {
        instance: String,
        kind: Kind,
        key: String,
        operation: Operation,
        cause: ClientError,
    },

    /// Not attempted: an earlier change to the same shared DNS entry failed
    /// after modifying it, so the entry this action was computed against no
    /// longer exists as read
    #[error("skipped {kind} '{key}' on {instance}: shared entry {entry:?} was left incomplete by an earlier failure")]
    Skipped {
        instance: String,
        kind: Kind,
        key: String,
        entry: String,
    },
}

impl EntityError {
    /// Stable reason code for reports and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnresolvedReference { .. } => REASON_UNRESOLVED_REFERENCE,
            Self::ResolveFailed { .. } => REASON_RESOLVE_FAILED,
            Self::FetchFailed { .. } => REASON_FETCH_FAILED,
            Self::ApplyFailed { .. } => REASON_APPLY_FAILED,
            Self::Skipped { .. } => REASON_ACTION_SKIPPED,
        }
    }

    /// The underlying API error, if the failure came from the instance.
    #[must_use]
    pub fn cause(&self) -> Option<&ClientError> {
        match self {
            Self::UnresolvedReference { .. } | Self::Skipped { .. } => None,
            Self::ResolveFailed { cause, .. }
            | Self::FetchFailed { cause, .. }
            | Self::ApplyFailed { cause, .. } => Some(cause),
        }
    }

    /// Returns true if a later pass could succeed without an input change.
    ///
    /// An unresolved reference only heals when the operator declares the group.
    /// A skipped action is recomputed from fresh state by the next pass.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Skipped { .. } => true,
            _ => self.cause().is_some_and(ClientError::is_transient),
        }
    }
}

/// Errors that abort a whole reconciliation run.
///
/// Raised only for input the engine cannot interpret at all; everything else
/// becomes a per-entity result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("no instances supplied")]
    NoInstances,

    #[error("instance name '{0}' supplied more than once")]
    DuplicateInstance(String),
}

/// Two or more desired records share a key but disagree.
///
/// The last record in input order is used.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{occurrences} conflicting definitions of {kind} '{key}'; the last one wins")]
pub struct ConfigConflict {
    pub kind: Kind,
    pub key: String,
    pub occurrences: usize,
}

impl ConfigConflict {
    #[must_use]
    pub fn reason(&self) -> &'static str {
        REASON_CONFIG_CONFLICT
    }
}

/// Errors loading or validating a fleet configuration.
///
/// All of these are operator mistakes; nothing here is transient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("no instances configured")]
    NoInstances,

    #[error("instance name '{0}' is configured more than once")]
    DuplicateInstance(String),

    #[error("instance #{0} has an empty name")]
    EmptyInstanceName(usize),

    #[error("instance '{name}' has an invalid URL '{url}': {reason}")]
    InvalidUrl {
        name: String,
        url: String,
        reason: String,
    },

    #[error("instance '{name}' reads its password from ${variable}, which is not set")]
    MissingPassword { name: String, variable: String },

    #[error("{kind} #{index} has an empty key")]
    EmptyKey { kind: Kind, index: usize },

    #[error("{kind} '{key}' is invalid: {reason}")]
    InvalidRecord {
        kind: Kind,
        key: String,
        reason: String,
    },

    #[error("instance '{0}' is not configured")]
    UnknownInstance(String),

    #[error("failed to set up instance '{name}': {cause}")]
    Client { name: String, cause: ClientError },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
