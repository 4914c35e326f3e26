// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Allow/block list operations (`/api/lists`).
//!
//! Lists are addressed by `(address, type)`: the same URL may be subscribed
//! once as an allow list and once as a block list, so every call carries the
//! `type` query parameter.

use reqwest::Method;
use tracing::info;

use super::api::{build_url, check_processed, decode, request};
use super::types::{ListRequest, ListsResponse};
use super::PiholeClient;
use crate::client::RemoteRecord;
use crate::constants::API_LISTS_PATH;
use crate::entity::{List, RemoteId};
use crate::errors::ClientError;

/// List every subscription of both types.
///
/// # Errors
///
/// Returns an error if the request fails or the response cannot be decoded.
pub async fn list(client: &PiholeClient) -> Result<Vec<RemoteRecord>, ClientError> {
    let url = build_url(client, API_LISTS_PATH, None, None)?;
    let body = request::<()>(client, Method::GET, url, None).await?;
    let response: ListsResponse = decode(client, &body)?;
    Ok(response.lists.into_iter().map(RemoteRecord::List).collect())
}

/// Subscribe to a list and return its row id.
///
/// # Errors
///
/// Returns [`ClientError::Rejected`] if the instance refuses the list, or
/// [`ClientError::InvalidResponse`] if the response does not contain the new row.
pub async fn create(
    client: &PiholeClient,
    list: &List,
    groups: Option<Vec<u32>>,
) -> Result<RemoteId, ClientError> {
    let list_type = list.list_type.as_str();
    let url = build_url(client, API_LISTS_PATH, None, Some(list_type))?;
    let payload = ListRequest {
        address: Some(&list.address),
        list_type: None,
        comment: list.comment.as_deref(),
        groups,
        enabled: list.enabled,
    };
    let body = request(client, Method::POST, url, Some(&payload)).await?;
    let response: ListsResponse = decode(client, &body)?;
    check_processed(client, response.processed.as_ref())?;

    let row = response
        .lists
        .into_iter()
        .find(|row| row.address == list.address && row.list_type == list_type)
        .ok_or_else(|| ClientError::InvalidResponse {
            endpoint: client.endpoint.clone(),
            reason: format!("created list '{}' missing from response", list.address),
        })?;

    info!(
        instance = %client.name,
        address = %list.address,
        list_type = list_type,
        id = row.id,
        "Created list"
    );
    Ok(RemoteId::Row(row.id))
}

/// Replace the attributes of `current`; a type change moves the list.
///
/// # Errors
///
/// Returns an error if the request fails or the instance refuses the change.
pub async fn update(
    client: &PiholeClient,
    current: &List,
    list: &List,
    groups: Option<Vec<u32>>,
) -> Result<(), ClientError> {
    let url = build_url(
        client,
        API_LISTS_PATH,
        Some(&current.address),
        Some(current.list_type.as_str()),
    )?;
    let payload = ListRequest {
        address: None,
        list_type: Some(list.list_type.as_str()),
        comment: list.comment.as_deref(),
        groups,
        enabled: list.enabled,
    };
    let body = request(client, Method::PUT, url, Some(&payload)).await?;
    let response: ListsResponse = decode(client, &body)?;
    check_processed(client, response.processed.as_ref())?;

    info!(
        instance = %client.name,
        address = %list.address,
        list_type = list.list_type.as_str(),
        "Updated list"
    );
    Ok(())
}

/// Remove a subscription.
///
/// # Errors
///
/// Returns an error if the request fails.
pub async fn delete(client: &PiholeClient, list: &List) -> Result<(), ClientError> {
    let url = build_url(
        client,
        API_LISTS_PATH,
        Some(&list.address),
        Some(list.list_type.as_str()),
    )?;
    request::<()>(client, Method::DELETE, url, None).await?;
    info!(instance = %client.name, address = %list.address, "Deleted list");
    Ok(())
}

#[cfg(test)]
#[path = "lists_tests.rs"]
mod lists_tests;
