// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Group operations (`/api/groups`).

use reqwest::Method;
use tracing::info;

use super::api::{build_url, check_processed, decode, request};
use super::types::{GroupRequest, GroupsResponse};
use super::PiholeClient;
use crate::client::RemoteRecord;
use crate::constants::API_GROUPS_PATH;
use crate::entity::{Group, RemoteId};
use crate::errors::ClientError;

/// List every group.
///
/// # Errors
///
/// Returns an error if the request fails or the response cannot be decoded.
pub async fn list(client: &PiholeClient) -> Result<Vec<RemoteRecord>, ClientError> {
    Ok(fetch(client)
        .await?
        .groups
        .into_iter()
        .map(RemoteRecord::Group)
        .collect())
}

/// `(id, name)` of every group.
///
/// # Errors
///
/// Returns an error if the request fails or the response cannot be decoded.
pub async fn list_ids(client: &PiholeClient) -> Result<Vec<(u32, String)>, ClientError> {
    Ok(fetch(client)
        .await?
        .groups
        .into_iter()
        .map(|row| (row.id, row.name))
        .collect())
}

async fn fetch(client: &PiholeClient) -> Result<GroupsResponse, ClientError> {
    let url = build_url(client, API_GROUPS_PATH, None, None)?;
    let body = request::<()>(client, Method::GET, url, None).await?;
    decode(client, &body)
}

/// Create a group and return its row id.
///
/// # Errors
///
/// Returns [`ClientError::Rejected`] if the instance refuses the group (for
/// example a duplicate name), or [`ClientError::InvalidResponse`] if the
/// response does not contain the new row.
pub async fn create(client: &PiholeClient, group: &Group) -> Result<RemoteId, ClientError> {
    let url = build_url(client, API_GROUPS_PATH, None, None)?;
    let payload = GroupRequest {
        name: &group.name,
        comment: group.comment.as_deref(),
        enabled: group.enabled,
    };
    let body = request(client, Method::POST, url, Some(&payload)).await?;
    let response: GroupsResponse = decode(client, &body)?;
    check_processed(client, response.processed.as_ref())?;

    let row = response
        .groups
        .into_iter()
        .find(|row| row.name == group.name)
        .ok_or_else(|| ClientError::InvalidResponse {
            endpoint: client.endpoint.clone(),
            reason: format!("created group '{}' missing from response", group.name),
        })?;

    info!(instance = %client.name, group = %group.name, id = row.id, "Created group");
    Ok(RemoteId::Row(row.id))
}

/// Replace the attributes of the group currently named `current_name`.
///
/// # Errors
///
/// Returns an error if the request fails or the instance refuses the change.
pub async fn update(
    client: &PiholeClient,
    current_name: &str,
    group: &Group,
) -> Result<(), ClientError> {
    let url = build_url(client, API_GROUPS_PATH, Some(current_name), None)?;
    let payload = GroupRequest {
        name: &group.name,
        comment: group.comment.as_deref(),
        enabled: group.enabled,
    };
    let body = request(client, Method::PUT, url, Some(&payload)).await?;
    let response: GroupsResponse = decode(client, &body)?;
    check_processed(client, response.processed.as_ref())?;

    info!(instance = %client.name, group = %group.name, "Updated group");
    Ok(())
}

/// Delete a group by name.
///
/// # Errors
///
/// Returns an error if the request fails; a missing group is
/// [`ClientError::NotFound`].
pub async fn delete(client: &PiholeClient, name: &str) -> Result<(), ClientError> {
    let url = build_url(client, API_GROUPS_PATH, Some(name), None)?;
    request::<()>(client, Method::DELETE, url, None).await?;
    info!(instance = %client.name, group = %name, "Deleted group");
    Ok(())
}

#[cfg(test)]
#[path = "groups_tests.rs"]
mod groups_tests;
