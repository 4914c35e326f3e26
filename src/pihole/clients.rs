// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Client operations (`/api/clients`).

use reqwest::Method;
use tracing::info;

use super::api::{build_url, check_processed, decode, request};
use super::types::{ClientRequest, ClientsResponse};
use super::PiholeClient;
use crate::client::RemoteRecord;
use crate::constants::API_CLIENTS_PATH;
use crate::entity::{Client, RemoteId};
use crate::errors::ClientError;

/// List every client.
///
/// # Errors
///
/// Returns an error if the request fails or the response cannot be decoded.
pub async fn list(client: &PiholeClient) -> Result<Vec<RemoteRecord>, ClientError> {
    let url = build_url(client, API_CLIENTS_PATH, None, None)?;
    let body = request::<()>(client, Method::GET, url, None).await?;
    let response: ClientsResponse = decode(client, &body)?;
    Ok(response
        .clients
        .into_iter()
        .map(RemoteRecord::Client)
        .collect())
}

/// Create a client and return its row id.
///
/// `groups` of `None` lets the instance apply its default assignment.
///
/// # Errors
///
/// Returns [`ClientError::Rejected`] if the instance refuses the client, or
/// [`ClientError::InvalidResponse`] if the response does not contain the new row.
pub async fn create(
    client: &PiholeClient,
    entity: &Client,
    groups: Option<Vec<u32>>,
) -> Result<RemoteId, ClientError> {
    let url = build_url(client, API_CLIENTS_PATH, None, None)?;
    let payload = ClientRequest {
        client: Some(&entity.client),
        comment: entity.comment.as_deref(),
        groups,
    };
    let body = request(client, Method::POST, url, Some(&payload)).await?;
    let response: ClientsResponse = decode(client, &body)?;
    check_processed(client, response.processed.as_ref())?;

    let row = response
        .clients
        .into_iter()
        .find(|row| row.client.eq_ignore_ascii_case(&entity.client))
        .ok_or_else(|| ClientError::InvalidResponse {
            endpoint: client.endpoint.clone(),
            reason: format!("created client '{}' missing from response", entity.client),
        })?;

    info!(instance = %client.name, client = %entity.client, id = row.id, "Created client");
    Ok(RemoteId::Row(row.id))
}

/// Replace the comment and group membership of the client `address`.
///
/// # Errors
///
/// Returns an error if the request fails or the instance refuses the change.
pub async fn update(
    client: &PiholeClient,
    address: &str,
    entity: &Client,
    groups: Option<Vec<u32>>,
) -> Result<(), ClientError> {
    let url = build_url(client, API_CLIENTS_PATH, Some(address), None)?;
    let payload = ClientRequest {
        client: None,
        comment: entity.comment.as_deref(),
        groups,
    };
    let body = request(client, Method::PUT, url, Some(&payload)).await?;
    let response: ClientsResponse = decode(client, &body)?;
    check_processed(client, response.processed.as_ref())?;

    info!(instance = %client.name, client = %entity.client, "Updated client");
    Ok(())
}

/// Delete a client by address.
///
/// # Errors
///
/// Returns an error if the request fails.
pub async fn delete(client: &PiholeClient, address: &str) -> Result<(), ClientError> {
    let url = build_url(client, API_CLIENTS_PATH, Some(address), None)?;
    request::<()>(client, Method::DELETE, url, None).await?;
    info!(instance = %client.name, client = %address, "Deleted client");
    Ok(())
}

#[cfg(test)]
#[path = "clients_tests.rs"]
mod clients_tests;
