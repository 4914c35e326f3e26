// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Instance client adapter contract.
//!
//! The reconciler never talks HTTP itself. It drives one [`InstanceClient`]
//! per target instance, which owns that instance's endpoint, credentials and
//! session. [`PiholeClient`](crate::pihole::PiholeClient) is the production
//! implementation; tests substitute in-memory fakes.
//!
//! `list` returns entities in the appliance's own representation
//! ([`RemoteRecord`]); turning them into comparable
//! [`CurrentRecord`]s is the fetcher's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entity::{CurrentRecord, Field, Kind, RemoteId, ResolvedRecord};
use crate::errors::ClientError;

/// A group row as stored by the appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// A list (subscription) row as stored by the appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: u32,
    pub address: String,
    /// `allow` or `block`; anything else is skipped by the fetcher.
    #[serde(rename = "type")]
    pub list_type: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub groups: Vec<u32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// A client row as stored by the appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRow {
    pub id: u32,
    pub client: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub groups: Vec<u32>,
}

/// One entity in the appliance's representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRecord {
    Group(GroupRow),
    List(ListRow),
    Client(ClientRow),
    /// Local A/AAAA entry, `"<ip> <host> [<host>...]"`.
    HostEntry(String),
    /// Local CNAME entry, `"<host>,<target>[,<ttl>]"`.
    CnameEntry(String),
}

/// Uniform CRUD access to one instance.
///
/// Every method is a single logical API call against that instance only.
/// Implementations must be safe to call concurrently; the reconciler issues
/// independent apply calls for one kind in parallel.
#[async_trait]
pub trait InstanceClient: Send + Sync {
    /// Operator-facing instance name, unique within a run.
    fn name(&self) -> &str;

    /// Endpoint used in error messages.
    fn endpoint(&self) -> &str;

    /// Read every entity of `kind`. Must not mutate instance state.
    async fn list(&self, kind: Kind) -> Result<Vec<RemoteRecord>, ClientError>;

    /// `(id, name)` of every group, for name resolution.
    async fn list_groups(&self) -> Result<Vec<(u32, String)>, ClientError>;

    /// Create `record` and return the identifier the appliance assigned.
    async fn create(&self, record: &ResolvedRecord) -> Result<RemoteId, ClientError>;

    /// Bring `target` in line with `record`.
    ///
    /// `record` is the desired state merged onto `target`, so adapters without
    /// partial-update semantics can send it whole; `changed` names the fields
    /// that actually differ.
    async fn update(
        &self,
        target: &CurrentRecord,
        record: &ResolvedRecord,
        changed: &[Field],
    ) -> Result<(), ClientError>;

    /// Remove `target`.
    async fn delete(&self, target: &CurrentRecord) -> Result<(), ClientError>;

    /// Release any session held against the instance.
    async fn close(&self) {}
}
