// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pi-hole v6 management via its REST API.
//!
//! This module provides the production [`InstanceClient`] implementation. It
//! handles:
//!
//! - Logging in with the instance password and attaching the session id to
//!   every request (`X-FTL-SID`)
//! - Listing, creating, updating and deleting groups, clients and lists
//! - Adding and removing local A/AAAA and CNAME entries
//! - Logging out when the run is finished
//!
//! # Architecture
//!
//! One [`PiholeClient`] exists per target instance. It owns a shared
//! `reqwest` client, the instance's base URL and its session. The login
//! happens lazily on the first request and is shared by every concurrent
//! call; a missing password means the instance has authentication disabled.
//! Calls are never retried.
//!
//! # Example
//!
//! ```rust,no_run
//! use pihole_reconciler::client::InstanceClient;
//! use pihole_reconciler::entity::Kind;
//! use pihole_reconciler::pihole::{ConnectionSettings, PiholeClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = PiholeClient::new(
//!     "pihole-a",
//!     "https://pihole-a.lan".parse()?,
//!     Some("secret".to_string()),
//!     &ConnectionSettings::default(),
//! )?;
//!
//! let groups = client.list(Kind::Group).await?;
//! println!("{} groups", groups.len());
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod clients;
pub mod dns;
pub mod groups;
pub mod lists;
pub mod types;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::client::{InstanceClient, RemoteRecord};
use crate::constants::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::entity::{CurrentRecord, Entity, Field, Kind, RemoteId, ResolvedRecord};
use crate::errors::ClientError;

/// Transport settings shared by every instance in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Timeout applied to each request.
    pub timeout: Duration,
    /// Accept self-signed certificates (the Pi-hole default install uses one).
    pub accept_invalid_certs: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            accept_invalid_certs: false,
        }
    }
}

/// Login state. `sid` is `None` when the instance accepted an empty login.
#[derive(Debug, Clone)]
struct Session {
    sid: Option<String>,
}

/// Client for one Pi-hole v6 instance.
pub struct PiholeClient {
    name: String,
    endpoint: String,
    base_url: Url,
    http: Arc<HttpClient>,
    password: Option<String>,
    timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl fmt::Debug for PiholeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiholeClient")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("auth_enabled", &self.password.is_some())
            .finish_non_exhaustive()
    }
}

impl PiholeClient {
    /// Create a client for the instance at `base_url`.
    ///
    /// No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HttpConnectionFailed`] if `base_url` cannot carry
    /// a path or the HTTP client cannot be initialised.
    pub fn new(
        name: &str,
        base_url: Url,
        password: Option<String>,
        settings: &ConnectionSettings,
    ) -> Result<Self, ClientError> {
        let endpoint = base_url.as_str().trim_end_matches('/').to_string();
        if base_url.cannot_be_a_base() {
            return Err(ClientError::HttpConnectionFailed {
                endpoint,
                reason: "URL cannot be used as an API base".to_string(),
            });
        }

        let http = HttpClient::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| ClientError::HttpConnectionFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            endpoint,
            base_url,
            http: Arc::new(http),
            password: password.filter(|p| !p.is_empty()),
            timeout: settings.timeout,
            session: Mutex::new(None),
        })
    }
}

#[async_trait]
impl InstanceClient for PiholeClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list(&self, kind: Kind) -> Result<Vec<RemoteRecord>, ClientError> {
        match kind {
            Kind::Group => groups::list(self).await,
            Kind::DnsRecord => dns::list(self).await,
            Kind::List => lists::list(self).await,
            Kind::Client => clients::list(self).await,
        }
    }

    async fn list_groups(&self) -> Result<Vec<(u32, String)>, ClientError> {
        groups::list_ids(self).await
    }

    async fn create(&self, record: &ResolvedRecord) -> Result<RemoteId, ClientError> {
        let group_ids = group_id_vec(record);
        match &record.entity {
            Entity::Group(group) => groups::create(self, group).await,
            Entity::DnsRecord(dns_record) => dns::create(self, dns_record).await,
            Entity::List(list) => lists::create(self, list, group_ids).await,
            Entity::Client(client) => clients::create(self, client, group_ids).await,
        }
    }

    async fn update(
        &self,
        target: &CurrentRecord,
        record: &ResolvedRecord,
        changed: &[Field],
    ) -> Result<(), ClientError> {
        debug!(
            instance = %self.name,
            key = %target.key(),
            changed = ?changed,
            "Sending full record for update"
        );
        let group_ids = group_id_vec(record);
        match (&target.entity, &record.entity) {
            (Entity::Group(current), Entity::Group(group)) => {
                groups::update(self, &current.name, group).await
            }
            (Entity::DnsRecord(_), Entity::DnsRecord(dns_record)) => {
                dns::update(self, target, dns_record).await
            }
            (Entity::List(current), Entity::List(list)) => {
                lists::update(self, current, list, group_ids).await
            }
            (Entity::Client(current), Entity::Client(client)) => {
                clients::update(self, &current.client, client, group_ids).await
            }
            (current, desired) => Err(ClientError::Rejected {
                endpoint: self.endpoint.clone(),
                reason: format!(
                    "cannot update {} '{}' with a {} record",
                    current.kind(),
                    current.key(),
                    desired.kind()
                ),
            }),
        }
    }

    async fn delete(&self, target: &CurrentRecord) -> Result<(), ClientError> {
        match &target.entity {
            Entity::Group(group) => groups::delete(self, &group.name).await,
            Entity::DnsRecord(_) => dns::delete(self, target).await,
            Entity::List(list) => lists::delete(self, list).await,
            Entity::Client(client) => clients::delete(self, &client.client).await,
        }
    }

    async fn close(&self) {
        api::logout(self).await;
    }
}

fn group_id_vec(record: &ResolvedRecord) -> Option<Vec<u32>> {
    record
        .group_ids
        .as_ref()
        .map(|ids| ids.iter().copied().collect())
}
