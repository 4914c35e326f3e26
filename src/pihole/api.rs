// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Request plumbing shared by the per-kind Pi-hole operations.
//!
//! Every call goes through [`request`], which obtains (or reuses) the session,
//! sends one HTTP request and maps any failure to a [`ClientError`]. There is
//! no retry loop; a failed call is reported to the reconciler as-is.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};
use url::Url;

use super::types::{AuthRequest, AuthResponse, ErrorResponse, Processed};
use super::{PiholeClient, Session};
use crate::constants::{API_AUTH_PATH, SESSION_HEADER};
use crate::errors::ClientError;
use crate::http_errors::{map_http_error, map_transport_error};

/// Build `<base>/<path>[/<item>][?type=<list_type>]`.
///
/// `path` is a fixed endpoint such as `api/groups`; `item` is pushed as a
/// single percent-encoded segment, so names containing `/`, spaces or commas
/// (CIDR clients, list URLs, DNS entries) address the right resource.
///
/// # Errors
///
/// Returns [`ClientError::HttpConnectionFailed`] if the base URL cannot carry
/// a path.
pub fn build_url(
    client: &PiholeClient,
    path: &str,
    item: Option<&str>,
    list_type: Option<&str>,
) -> Result<Url, ClientError> {
    let mut url = client.base_url.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| ClientError::HttpConnectionFailed {
                endpoint: client.endpoint.clone(),
                reason: "URL cannot be used as an API base".to_string(),
            })?;
        segments.pop_if_empty().extend(path.split('/'));
        if let Some(item) = item {
            segments.push(item);
        }
    }
    url.set_query(None);
    if let Some(list_type) = list_type {
        url.query_pairs_mut().append_pair("type", list_type);
    }
    Ok(url)
}

/// Send an authenticated request and return the response body.
///
/// # Errors
///
/// Returns the mapped [`ClientError`] for login failures, transport failures
/// and non-2xx responses.
pub async fn request<T: Serialize + ?Sized>(
    client: &PiholeClient,
    method: Method,
    url: Url,
    body: Option<&T>,
) -> Result<String, ClientError> {
    let sid = session_id(client).await?;
    execute(client, method, url, body, sid.as_deref()).await
}

/// Decode a JSON response body.
///
/// # Errors
///
/// Returns [`ClientError::InvalidResponse`] if the body does not match `T`.
pub fn decode<T: DeserializeOwned>(client: &PiholeClient, body: &str) -> Result<T, ClientError> {
    serde_json::from_str(body).map_err(|e| ClientError::InvalidResponse {
        endpoint: client.endpoint.clone(),
        reason: e.to_string(),
    })
}

/// Turn per-item errors reported inside a 2xx body into a rejection.
///
/// # Errors
///
/// Returns [`ClientError::Rejected`] naming every refused item.
pub fn check_processed(
    client: &PiholeClient,
    processed: Option<&Processed>,
) -> Result<(), ClientError> {
    let Some(processed) = processed else {
        return Ok(());
    };
    if processed.errors.is_empty() {
        return Ok(());
    }
    let reason = processed
        .errors
        .iter()
        .map(|e| format!("{}: {}", e.item, e.error))
        .collect::<Vec<_>>()
        .join("; ");
    Err(ClientError::Rejected {
        endpoint: client.endpoint.clone(),
        reason,
    })
}

/// Session id for this run, logging in on first use.
///
/// The lock is held across the login so that concurrent first calls share a
/// single session.
async fn session_id(client: &PiholeClient) -> Result<Option<String>, ClientError> {
    let Some(password) = client.password.as_deref() else {
        return Ok(None);
    };

    let mut session = client.session.lock().await;
    if let Some(existing) = session.as_ref() {
        return Ok(existing.sid.clone());
    }

    let sid = login(client, password).await?;
    *session = Some(Session { sid: sid.clone() });
    Ok(sid)
}

async fn login(client: &PiholeClient, password: &str) -> Result<Option<String>, ClientError> {
    let url = build_url(client, API_AUTH_PATH, None, None)?;
    let body = execute(
        client,
        Method::POST,
        url,
        Some(&AuthRequest { password }),
        None,
    )
    .await?;
    let response: AuthResponse = decode(client, &body)?;

    if !response.session.valid {
        return Err(ClientError::AuthenticationFailed {
            endpoint: client.endpoint.clone(),
            reason: response
                .session
                .message
                .unwrap_or_else(|| "password rejected".to_string()),
        });
    }

    debug!(instance = %client.name, "Logged in to Pi-hole API");
    Ok(response.session.sid)
}

/// End the session, if one was opened. Failures are logged, not returned.
pub async fn logout(client: &PiholeClient) {
    let Some(session) = client.session.lock().await.take() else {
        return;
    };
    let Some(sid) = session.sid else {
        return;
    };

    let result = match build_url(client, API_AUTH_PATH, None, None) {
        Ok(url) => execute::<()>(client, Method::DELETE, url, None, Some(&sid)).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(_) => debug!(instance = %client.name, "Logged out of Pi-hole API"),
        Err(e) => warn!(instance = %client.name, error = %e, "Failed to end Pi-hole session"),
    }
}

async fn execute<T: Serialize + ?Sized>(
    client: &PiholeClient,
    method: Method,
    url: Url,
    body: Option<&T>,
    sid: Option<&str>,
) -> Result<String, ClientError> {
    debug!(
        instance = %client.name,
        method = %method,
        path = %url.path(),
        auth_enabled = sid.is_some(),
        "HTTP API request to Pi-hole"
    );

    let mut request = client.http.request(method.clone(), url.clone());
    if let Some(sid) = sid {
        request = request.header(SESSION_HEADER, sid);
    }
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(&client.endpoint, &e, client.timeout))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| map_transport_error(&client.endpoint, &e, client.timeout))?;

    if !status.is_success() {
        let reason = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.error.describe())
            .unwrap_or_else(|_| {
                if text.is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    text.clone()
                }
            });
        error!(
            instance = %client.name,
            method = %method,
            path = %url.path(),
            status = %status,
            error = %reason,
            "HTTP API request failed"
        );
        return Err(map_http_error(
            &client.endpoint,
            status.as_u16(),
            url.path(),
            reason,
        ));
    }

    debug!(
        instance = %client.name,
        method = %method,
        path = %url.path(),
        status = %status,
        response_len = text.len(),
        "HTTP API request successful"
    );
    Ok(text)
}
