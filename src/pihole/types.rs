// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Wire types for the Pi-hole v6 REST API.

use serde::{Deserialize, Serialize};

use crate::client::{ClientRow, GroupRow, ListRow};

/// Body of `POST /api/auth`.
#[derive(Serialize)]
pub struct AuthRequest<'a> {
    pub password: &'a str,
}

/// Response of `POST /api/auth`.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub session: SessionInfo,
}

#[derive(Debug, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub valid: bool,
    /// `None` when the instance has no password set.
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error envelope returned with non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub key: Option<String>,
    pub message: String,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ApiError {
    /// `message (hint)` or just `message`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.hint.as_deref().filter(|h| !h.is_empty()) {
            Some(hint) => format!("{} ({hint})", self.message),
            None => self.message.clone(),
        }
    }
}

/// Per-item outcome of a batch endpoint.
///
/// Pi-hole answers 2xx for `POST`/`PUT` on groups, clients and lists even when
/// the item was refused; the refusal is only visible in `errors`.
#[derive(Debug, Default, Deserialize)]
pub struct Processed {
    #[serde(default)]
    pub success: Vec<ProcessedItem>,
    #[serde(default)]
    pub errors: Vec<ProcessedError>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessedItem {
    pub item: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessedError {
    pub item: String,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupsResponse {
    #[serde(default)]
    pub groups: Vec<GroupRow>,
    #[serde(default)]
    pub processed: Option<Processed>,
}

#[derive(Debug, Deserialize)]
pub struct ClientsResponse {
    #[serde(default)]
    pub clients: Vec<ClientRow>,
    #[serde(default)]
    pub processed: Option<Processed>,
}

#[derive(Debug, Deserialize)]
pub struct ListsResponse {
    #[serde(default)]
    pub lists: Vec<ListRow>,
    #[serde(default)]
    pub processed: Option<Processed>,
}

/// Body of `POST /api/groups` and `PUT /api/groups/{name}`.
#[derive(Debug, Serialize)]
pub struct GroupRequest<'a> {
    pub name: &'a str,
    pub comment: Option<&'a str>,
    pub enabled: bool,
}

/// Body of `POST /api/clients` and `PUT /api/clients/{client}`.
#[derive(Debug, Serialize)]
pub struct ClientRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<&'a str>,
    pub comment: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<u32>>,
}

/// Body of `POST /api/lists` and `PUT /api/lists/{address}`.
#[derive(Debug, Serialize)]
pub struct ListRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<&'a str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub list_type: Option<&'a str>,
    pub comment: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<u32>>,
    pub enabled: bool,
}

/// Response of `GET /api/config/dns/{hosts|cnameRecords}`.
#[derive(Debug, Deserialize)]
pub struct DnsConfigResponse {
    pub config: DnsConfigRoot,
}

#[derive(Debug, Deserialize)]
pub struct DnsConfigRoot {
    pub dns: DnsConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct DnsConfig {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default, rename = "cnameRecords")]
    pub cname_records: Vec<String>,
}
