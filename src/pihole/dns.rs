// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Local DNS operations (`/api/config/dns/hosts` and `/api/config/dns/cnameRecords`).
//!
//! Pi-hole keeps local records as plain configuration entries rather than
//! rows: `"<ip> <host> [<host>...]"` for A/AAAA and `"<host>,<target>[,<ttl>]"`
//! for CNAME. An entry is added with `PUT` and removed with `DELETE`, both
//! addressed by the full entry text, so there is no in-place edit. An update
//! removes the old entry and adds the new one.

use reqwest::Method;
use tracing::info;

use super::api::{build_url, decode, request};
use super::types::{DnsConfig, DnsConfigResponse};
use super::PiholeClient;
use crate::client::RemoteRecord;
use crate::constants::{API_DNS_CNAME_PATH, API_DNS_HOSTS_PATH};
use crate::entity::{CurrentRecord, DnsRecord, Entity, RecordType, RemoteId};
use crate::errors::ClientError;
pub use crate::reconcilers::fetcher::remaining_host_entry;

/// List every host and CNAME entry.
///
/// # Errors
///
/// Returns an error if either request fails or a response cannot be decoded.
pub async fn list(client: &PiholeClient) -> Result<Vec<RemoteRecord>, ClientError> {
    let hosts = fetch(client, API_DNS_HOSTS_PATH).await?.hosts;
    let cnames = fetch(client, API_DNS_CNAME_PATH).await?.cname_records;
    Ok(hosts
        .into_iter()
        .map(RemoteRecord::HostEntry)
        .chain(cnames.into_iter().map(RemoteRecord::CnameEntry))
        .collect())
}

async fn fetch(client: &PiholeClient, path: &str) -> Result<DnsConfig, ClientError> {
    let url = build_url(client, path, None, None)?;
    let body = request::<()>(client, Method::GET, url, None).await?;
    let response: DnsConfigResponse = decode(client, &body)?;
    Ok(response.config.dns)
}

/// Configuration endpoint holding entries of `record_type`.
#[must_use]
pub const fn config_path(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::A | RecordType::Aaaa => API_DNS_HOSTS_PATH,
        RecordType::Cname => API_DNS_CNAME_PATH,
    }
}

/// Configuration entry text for `record`.
///
/// ```rust
/// use pihole_reconciler::entity::{DnsRecord, RecordType};
/// use pihole_reconciler::pihole::dns::entry_for;
///
/// let record = DnsRecord {
///     name: "www.lan".to_string(),
///     record_type: RecordType::Cname,
///     data: "web.lan".to_string(),
///     ttl: Some(300),
/// };
/// assert_eq!(entry_for(&record), "www.lan,web.lan,300");
/// ```
#[must_use]
pub fn entry_for(record: &DnsRecord) -> String {
    match (record.record_type, record.ttl) {
        (RecordType::A | RecordType::Aaaa, _) => format!("{} {}", record.data, record.name),
        (RecordType::Cname, Some(ttl)) => format!("{},{},{ttl}", record.name, record.data),
        (RecordType::Cname, None) => format!("{},{}", record.name, record.data),
    }
}

/// Add the entry for `record`.
///
/// # Errors
///
/// Returns an error if the request fails or the instance refuses the entry.
pub async fn create(client: &PiholeClient, record: &DnsRecord) -> Result<RemoteId, ClientError> {
    let entry = entry_for(record);
    put_entry(client, config_path(record.record_type), &entry).await?;
    info!(
        instance = %client.name,
        name = %record.name,
        record_type = %record.record_type,
        entry = %entry,
        "Added local DNS entry"
    );
    Ok(RemoteId::Entry(entry))
}

/// Replace the entry behind `target` with the entry for `record`.
///
/// # Errors
///
/// Returns an error if removing the old entry or adding the new one fails.
/// A failure after the removal is a [`ClientError::PartiallyApplied`] naming
/// the removed entry: the record stays absent until the next pass recreates
/// it.
pub async fn update(
    client: &PiholeClient,
    target: &CurrentRecord,
    record: &DnsRecord,
) -> Result<(), ClientError> {
    delete(client, target).await?;
    let entry = entry_for(record);
    put_entry(client, config_path(record.record_type), &entry)
        .await
        .map_err(|cause| after_removal(&target.id, cause))?;
    info!(
        instance = %client.name,
        name = %record.name,
        record_type = %record.record_type,
        entry = %entry,
        "Replaced local DNS entry"
    );
    Ok(())
}

/// Remove the record behind `target`.
///
/// A host entry naming several hosts is removed and re-added without this
/// record's host, so sibling names on the same line are kept.
///
/// # Errors
///
/// Returns [`ClientError::Rejected`] if `target` is not a local DNS record,
/// [`ClientError::PartiallyApplied`] if the entry was removed but the sibling
/// hosts could not be re-added, or the request error otherwise.
pub async fn delete(client: &PiholeClient, target: &CurrentRecord) -> Result<(), ClientError> {
    let (Entity::DnsRecord(current), RemoteId::Entry(entry)) = (&target.entity, &target.id) else {
        return Err(ClientError::Rejected {
            endpoint: client.endpoint.clone(),
            reason: format!("'{}' is not a local DNS entry", target.key()),
        });
    };

    let path = config_path(current.record_type);
    delete_entry(client, path, entry).await?;

    if current.record_type != RecordType::Cname {
        if let Some(remaining) = remaining_host_entry(entry, &current.name) {
            put_entry(client, path, &remaining)
                .await
                .map_err(|cause| after_removal(&target.id, cause))?;
        }
    }

    info!(
        instance = %client.name,
        name = %current.name,
        record_type = %current.record_type,
        entry = %entry,
        "Removed local DNS entry"
    );
    Ok(())
}

fn after_removal(removed: &RemoteId, cause: ClientError) -> ClientError {
    ClientError::PartiallyApplied {
        completed: format!("old entry removed: {removed}"),
        cause: Box::new(cause),
    }
}

async fn put_entry(client: &PiholeClient, path: &str, entry: &str) -> Result<(), ClientError> {
    let url = build_url(client, path, Some(entry), None)?;
    request::<()>(client, Method::PUT, url, None).await?;
    Ok(())
}

async fn delete_entry(client: &PiholeClient, path: &str, entry: &str) -> Result<(), ClientError> {
    let url = build_url(client, path, Some(entry), None)?;
    request::<()>(client, Method::DELETE, url, None).await?;
    Ok(())
}

#[cfg(test)]
#[path = "dns_tests.rs"]
mod dns_tests;
