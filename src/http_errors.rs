// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP error mapping for the Pi-hole API.
//!
//! This module converts HTTP status codes and transport failures into
//! [`ClientError`] variants, so that every adapter call reports failures with
//! the same reason codes.
//!
//! # Usage
//!
//! ```rust
//! use pihole_reconciler::http_errors::map_http_error;
//!
//! let err = map_http_error("https://pihole.lan", 404, "api/groups/IOT", "Not found".into());
//! assert_eq!(err.reason(), "NotFound");
//!
//! let err = map_http_error("https://pihole.lan", 503, "api/groups", "busy".into());
//! assert!(err.is_transient());
//! ```

use std::time::Duration;

use crate::errors::ClientError;

/// Map an HTTP error status to a [`ClientError`].
///
/// # HTTP Code Mapping
///
/// | HTTP Code | Variant | Meaning |
/// |-----------|---------|---------|
/// | 400 | `Rejected` | Invalid payload |
/// | 401 | `AuthenticationFailed` | Missing or expired session |
/// | 403 | `AuthenticationFailed` | Insufficient permissions |
/// | 404 | `NotFound` | Entity or endpoint not found |
/// | 5xx | `ServerError` | FTL failed to process the request |
/// | Other | `UnexpectedHttpResponse` | Anything else |
#[must_use]
pub fn map_http_error(endpoint: &str, status_code: u16, resource: &str, reason: String) -> ClientError {
    let endpoint = endpoint.to_string();
    match status_code {
        400 => ClientError::Rejected { endpoint, reason },
        401 | 403 => ClientError::AuthenticationFailed { endpoint, reason },
        404 => ClientError::NotFound {
            endpoint,
            resource: resource.to_string(),
        },
        500..=599 => ClientError::ServerError {
            endpoint,
            status_code,
            reason,
        },
        _ => ClientError::UnexpectedHttpResponse {
            endpoint,
            status_code,
            reason,
        },
    }
}

/// Map a transport-level failure (no HTTP status received) to a [`ClientError`].
///
/// Timeouts are reported with the configured timeout so that the message says
/// how long the call was allowed to take.
#[must_use]
pub fn map_transport_error(endpoint: &str, err: &reqwest::Error, timeout: Duration) -> ClientError {
    if err.is_timeout() {
        ClientError::HttpRequestTimeout {
            endpoint: endpoint.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else if err.is_decode() {
        ClientError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    } else {
        ClientError::HttpConnectionFailed {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }
}
