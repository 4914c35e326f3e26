// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Stable reason codes attached to failed reconciliation results.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why an
//! entity could not be converged. They appear in JSON reports, in the
//! `errors_total` metric, and in log lines, so they must never change once
//! released.
//!
//! # Example Report Entry
//!
//! ```json
//! {
//!   "instance": "pihole-b",
//!   "kind": "client",
//!   "key": "192.168.2.0/24",
//!   "outcome": "failed",
//!   "reason": "UnresolvedReference",
//!   "message": "group 'IOT' referenced by client '192.168.2.0/24' does not exist on pihole-b"
//! }
//! ```

// ============================================================================
// Engine Reasons
// ============================================================================

/// A desired record names a group that does not exist on the instance.
pub const REASON_UNRESOLVED_REFERENCE: &str = "UnresolvedReference";

/// Listing groups for name resolution failed; dependent kinds were skipped.
pub const REASON_RESOLVE_FAILED: &str = "ResolveFailed";

/// Reading current state for a kind failed; the whole kind was skipped.
pub const REASON_FETCH_FAILED: &str = "FetchFailed";

/// A single create, update or delete call failed.
pub const REASON_APPLY_FAILED: &str = "ApplyFailed";

/// Not attempted because an earlier change to the same shared DNS entry
/// failed halfway.
pub const REASON_ACTION_SKIPPED: &str = "ActionSkipped";

/// Two desired records share a key but disagree; the last one was used.
pub const REASON_CONFIG_CONFLICT: &str = "ConfigConflict";

// ============================================================================
// Instance API Reasons
// ============================================================================

/// The instance could not be reached (connection refused, DNS failure, TLS error).
pub const REASON_HTTP_CONNECTION_FAILED: &str = "HttpConnectionFailed";

/// The request did not complete within the configured timeout.
pub const REASON_HTTP_REQUEST_TIMEOUT: &str = "HttpRequestTimeout";

/// Login was refused or the session was rejected (HTTP 401/403).
pub const REASON_AUTHENTICATION_FAILED: &str = "AuthenticationFailed";

/// The addressed entity does not exist (HTTP 404).
pub const REASON_NOT_FOUND: &str = "NotFound";

/// The instance refused the request payload (HTTP 400 or per-item errors).
pub const REASON_REQUEST_REJECTED: &str = "RequestRejected";

/// The instance reported a server-side failure (HTTP 5xx).
pub const REASON_SERVER_ERROR: &str = "ServerError";

/// The instance answered with a status code that maps to nothing above.
pub const REASON_UNEXPECTED_HTTP_RESPONSE: &str = "UnexpectedHttpResponse";

/// A multi-step change failed after its first step had modified the instance.
pub const REASON_PARTIALLY_APPLIED: &str = "PartiallyApplied";

/// The response body could not be decoded.
pub const REASON_INVALID_RESPONSE: &str = "InvalidResponse";
