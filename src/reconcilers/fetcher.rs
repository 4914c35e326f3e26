// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Current-state retrieval and normalization.
//!
//! The fetcher reads every entity of one kind from one instance and turns the
//! appliance's representation into [`CurrentRecord`]s shaped exactly like
//! desired records, so the differ compares like with like:
//!
//! - `null` and empty comments become `None`
//! - a missing `enabled` flag means enabled
//! - group id lists become sets
//! - a host entry `"<ip> <host> [<host>...]"` becomes one A or AAAA record per
//!   host (AAAA when the address is IPv6)
//! - a CNAME entry `"<host>,<target>[,<ttl>]"` becomes one CNAME record
//! - DNS names are lower-cased without the trailing dot
//!
//! Entries that cannot be parsed are skipped with a warning. A second entity
//! with an already-seen key is skipped too; the first one wins.

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use tracing::{debug, warn};

use crate::client::{ClientRow, GroupRow, InstanceClient, ListRow, RemoteRecord};
use crate::entity::{
    normalize_dns_name, Client, CurrentRecord, DnsRecord, Entity, Group, Kind, List, ListType,
    RecordType, RemoteId,
};
use crate::errors::EntityError;

/// Read and normalize the current state of `kind` on `client`.
///
/// # Errors
///
/// Returns [`EntityError::FetchFailed`] if the instance cannot be listed.
pub async fn fetch(
    client: &dyn InstanceClient,
    kind: Kind,
) -> Result<Vec<CurrentRecord>, EntityError> {
    let raw = client
        .list(kind)
        .await
        .map_err(|cause| EntityError::FetchFailed {
            instance: client.name().to_string(),
            kind,
            cause,
        })?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(raw.len());
    for record in normalize(client.name(), kind, raw) {
        let key = record.key();
        if seen.insert(key.clone()) {
            records.push(record);
        } else {
            warn!(
                instance = %client.name(),
                kind = %kind,
                key = %key,
                "Duplicate entity on instance, keeping the first"
            );
        }
    }

    debug!(
        instance = %client.name(),
        kind = %kind,
        count = records.len(),
        "Fetched current state"
    );
    Ok(records)
}

/// Normalize raw entities of `kind`, dropping anything of another kind or
/// anything malformed.
#[must_use]
pub fn normalize(instance: &str, kind: Kind, raw: Vec<RemoteRecord>) -> Vec<CurrentRecord> {
    let mut records = Vec::with_capacity(raw.len());
    for item in raw {
        let normalized = match item {
            RemoteRecord::Group(row) if kind == Kind::Group => vec![group_record(row)],
            RemoteRecord::List(row) if kind == Kind::List => list_record(instance, row)
                .into_iter()
                .collect(),
            RemoteRecord::Client(row) if kind == Kind::Client => vec![client_record(row)],
            RemoteRecord::HostEntry(entry) if kind == Kind::DnsRecord => {
                host_records(instance, &entry)
            }
            RemoteRecord::CnameEntry(entry) if kind == Kind::DnsRecord => {
                cname_record(instance, &entry).into_iter().collect()
            }
            other => {
                warn!(
                    instance = %instance,
                    kind = %kind,
                    entity = ?other,
                    "Instance returned an entity of another kind, skipping"
                );
                Vec::new()
            }
        };
        records.extend(normalized);
    }
    records
}

fn clean_comment(comment: Option<String>) -> Option<String> {
    comment.filter(|c| !c.is_empty())
}

fn group_record(row: GroupRow) -> CurrentRecord {
    CurrentRecord {
        id: RemoteId::Row(row.id),
        entity: Entity::Group(Group {
            name: row.name,
            comment: clean_comment(row.comment),
            enabled: row.enabled.unwrap_or(true),
        }),
        group_ids: None,
    }
}

fn list_record(instance: &str, row: ListRow) -> Option<CurrentRecord> {
    let list_type = match row.list_type.as_str() {
        "allow" => ListType::Allow,
        "block" => ListType::Block,
        other => {
            warn!(
                instance = %instance,
                address = %row.address,
                list_type = %other,
                "Skipping list with unknown type"
            );
            return None;
        }
    };
    Some(CurrentRecord {
        id: RemoteId::Row(row.id),
        entity: Entity::List(List {
            address: row.address,
            list_type,
            comment: clean_comment(row.comment),
            enabled: row.enabled.unwrap_or(true),
        }),
        group_ids: Some(row.groups.into_iter().collect::<BTreeSet<_>>()),
    })
}

fn client_record(row: ClientRow) -> CurrentRecord {
    CurrentRecord {
        id: RemoteId::Row(row.id),
        entity: Entity::Client(Client {
            client: row.client,
            comment: clean_comment(row.comment),
        }),
        group_ids: Some(row.groups.into_iter().collect::<BTreeSet<_>>()),
    }
}

fn host_records(instance: &str, entry: &str) -> Vec<CurrentRecord> {
    let Some((ip, hosts)) = parse_host_entry(entry) else {
        warn!(instance = %instance, entry = %entry, "Skipping malformed host entry");
        return Vec::new();
    };
    let record_type = if ip.contains(':') {
        RecordType::Aaaa
    } else {
        RecordType::A
    };
    hosts
        .into_iter()
        .map(|host| CurrentRecord {
            id: RemoteId::Entry(entry.to_string()),
            entity: Entity::DnsRecord(DnsRecord {
                name: normalize_dns_name(host),
                record_type,
                data: ip.to_string(),
                ttl: None,
            }),
            group_ids: None,
        })
        .collect()
}

fn cname_record(instance: &str, entry: &str) -> Option<CurrentRecord> {
    let Some(record) = parse_cname_entry(entry) else {
        warn!(instance = %instance, entry = %entry, "Skipping malformed CNAME entry");
        return None;
    };
    Some(CurrentRecord {
        id: RemoteId::Entry(entry.to_string()),
        entity: Entity::DnsRecord(record),
        group_ids: None,
    })
}

/// Split a host entry into its address and host names.
///
/// Returns `None` unless the first token is an IP address followed by at
/// least one name.
///
/// ```rust
/// use pihole_reconciler::reconcilers::fetcher::parse_host_entry;
///
/// assert_eq!(
///     parse_host_entry("192.168.1.10 nas.lan files.lan"),
///     Some(("192.168.1.10", vec!["nas.lan", "files.lan"]))
/// );
/// assert_eq!(parse_host_entry("nas.lan"), None);
/// ```
#[must_use]
pub fn parse_host_entry(entry: &str) -> Option<(&str, Vec<&str>)> {
    let mut tokens = entry.split_whitespace();
    let ip = tokens.next()?;
    ip.parse::<IpAddr>().ok()?;
    let hosts: Vec<&str> = tokens.collect();
    if hosts.is_empty() {
        None
    } else {
        Some((ip, hosts))
    }
}

/// The host entry left after removing `name` from `entry`, if any host remains.
///
/// ```rust
/// use pihole_reconciler::reconcilers::fetcher::remaining_host_entry;
///
/// assert_eq!(
///     remaining_host_entry("10.0.0.5 nas.lan files.lan", "nas.lan"),
///     Some("10.0.0.5 files.lan".to_string())
/// );
/// assert_eq!(remaining_host_entry("10.0.0.5 nas.lan", "nas.lan"), None);
/// ```
#[must_use]
pub fn remaining_host_entry(entry: &str, name: &str) -> Option<String> {
    let (ip, hosts) = parse_host_entry(entry)?;
    let remaining: Vec<&str> = hosts
        .into_iter()
        .filter(|host| normalize_dns_name(host) != name)
        .collect();
    if remaining.is_empty() {
        None
    } else {
        Some(format!("{ip} {}", remaining.join(" ")))
    }
}

/// Parse a CNAME entry into a normalized record.
///
/// ```rust
/// use pihole_reconciler::reconcilers::fetcher::parse_cname_entry;
///
/// let record = parse_cname_entry("WWW.lan,web.lan.,300").unwrap();
/// assert_eq!(record.name, "www.lan");
/// assert_eq!(record.data, "web.lan");
/// assert_eq!(record.ttl, Some(300));
/// ```
#[must_use]
pub fn parse_cname_entry(entry: &str) -> Option<DnsRecord> {
    let parts: Vec<&str> = entry.split(',').map(str::trim).collect();
    let (name, target, ttl) = match parts.as_slice() {
        [name, target] => (*name, *target, None),
        [name, target, ttl] => (*name, *target, Some(ttl.parse::<u32>().ok()?)),
        _ => return None,
    };
    if name.is_empty() || target.is_empty() {
        return None;
    }
    Some(DnsRecord {
        name: normalize_dns_name(name),
        record_type: RecordType::Cname,
        data: normalize_dns_name(target),
        ttl,
    })
}
