// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Entity model for desired and current Pi-hole state.
//!
//! Every managed kind has its own attribute struct, and [`Entity`] is the tagged
//! union over them. Desired records (operator input), resolved records (group
//! references dereferenced for one instance) and current records (read from a
//! live instance) all carry an [`Entity`], which keeps the comparison done by
//! the differ symmetric.
//!
//! # Kinds
//!
//! | Kind | Key | Group references |
//! |------|-----|------------------|
//! | [`Kind::Group`] | group name | no |
//! | [`Kind::DnsRecord`] | `<name>/<TYPE>` | no |
//! | [`Kind::List`] | list address | yes |
//! | [`Kind::Client`] | client address | yes |
//!
//! # Example
//!
//! ```rust
//! use pihole_reconciler::entity::{Client, DesiredRecord, Entity, GroupRef, Kind};
//!
//! let record = DesiredRecord::present(Entity::Client(Client {
//!     client: "192.168.2.0/24".to_string(),
//!     comment: Some("IOT VLAN".to_string()),
//! }))
//! .with_groups(vec![GroupRef::Name("IOT".to_string())]);
//!
//! assert_eq!(record.kind(), Kind::Client);
//! assert_eq!(record.key(), "192.168.2.0/24");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::constants::{KIND_CLIENT, KIND_DNS_RECORD, KIND_GROUP, KIND_LIST};

// ============================================================================
// Kinds
// ============================================================================

/// Managed entity kinds.
///
/// The declaration order is the processing order; `Ord` follows it, so a
/// `BTreeMap<Kind, _>` iterates groups first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Group,
    DnsRecord,
    List,
    Client,
}

impl Kind {
    /// Order in which kinds are reconciled on one instance.
    ///
    /// Groups come first because lists and clients reference them by name.
    pub const PROCESSING_ORDER: [Kind; 4] = [Kind::Group, Kind::DnsRecord, Kind::List, Kind::Client];

    /// Stable lowercase name used in logs, metrics and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Group => KIND_GROUP,
            Self::DnsRecord => KIND_DNS_RECORD,
            Self::List => KIND_LIST,
            Self::Client => KIND_CLIENT,
        }
    }

    /// Kinds that must be fully applied before this kind can be resolved.
    #[must_use]
    pub const fn depends_on(self) -> &'static [Kind] {
        match self {
            Self::Group | Self::DnsRecord => &[],
            Self::List | Self::Client => &[Kind::Group],
        }
    }

    /// Whether records of this kind carry group references.
    #[must_use]
    pub const fn references_groups(self) -> bool {
        !self.depends_on().is_empty()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a desired record should exist on the instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

/// A reference to a group, either by name or by numeric id.
///
/// Numeric ids are passed through unvalidated; the appliance is the final
/// authority on whether they exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupRef {
    Id(u32),
    Name(String),
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

// ============================================================================
// Per-kind attribute structs
// ============================================================================

/// Allow or block list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    #[default]
    Allow,
    Block,
}

impl ListType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
        }
    }
}

/// Local DNS record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
}

impl RecordType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn default_enabled() -> bool {
    true
}

/// A Pi-hole group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group name (natural key).
    pub name: String,

    /// Free-form comment. `None` leaves the current comment untouched.
    #[serde(default)]
    pub comment: Option<String>,

    /// Whether the group is enabled. Defaults to `true`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A local DNS record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Host name, e.g. `nas.lan`.
    pub name: String,

    #[serde(rename = "type")]
    pub record_type: RecordType,

    /// IP address for A/AAAA, target host for CNAME.
    pub data: String,

    /// TTL in seconds. Only CNAME entries carry a TTL on the appliance.
    #[serde(default)]
    pub ttl: Option<u32>,
}

/// An allow or block list subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    /// List URL (natural key).
    pub address: String,

    #[serde(rename = "type", default)]
    pub list_type: ListType,

    #[serde(default)]
    pub comment: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A Pi-hole client (IP, CIDR range, MAC address or hostname).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Client address (natural key).
    pub client: String,

    #[serde(default)]
    pub comment: Option<String>,
}

/// Attribute fields that can differ between desired and current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Comment,
    Enabled,
    ListType,
    Groups,
    Data,
    Ttl,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Comment => "comment",
            Self::Enabled => "enabled",
            Self::ListType => "type",
            Self::Groups => "groups",
            Self::Data => "data",
            Self::Ttl => "ttl",
        })
    }
}

// ============================================================================
// Entity
// ============================================================================

/// One managed entity of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Group(Group),
    DnsRecord(DnsRecord),
    List(List),
    Client(Client),
}

impl Entity {
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Group(_) => Kind::Group,
            Self::DnsRecord(_) => Kind::DnsRecord,
            Self::List(_) => Kind::List,
            Self::Client(_) => Kind::Client,
        }
    }

    /// Natural key of the entity, unique per (kind, instance).
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Group(g) => g.name.clone(),
            Self::DnsRecord(r) => format!("{}/{}", r.name, r.record_type),
            Self::List(l) => l.address.clone(),
            Self::Client(c) => c.client.clone(),
        }
    }

    /// Canonical form: DNS names lower-cased without trailing dot, empty
    /// comments on current state collapsed by the fetcher, not here.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::DnsRecord(mut r) => {
                r.name = normalize_dns_name(&r.name);
                if r.record_type == RecordType::Cname {
                    r.data = normalize_dns_name(&r.data);
                } else {
                    r.data = r.data.trim().to_string();
                }
                Self::DnsRecord(r)
            }
            Self::Group(mut g) => {
                g.name = g.name.trim().to_string();
                Self::Group(g)
            }
            Self::List(mut l) => {
                l.address = l.address.trim().to_string();
                Self::List(l)
            }
            Self::Client(mut c) => {
                c.client = c.client.trim().to_string();
                Self::Client(c)
            }
        }
    }

    /// Attribute fields where `self` (desired) differs from `current`.
    ///
    /// Optional desired attributes (`comment`, `ttl`) are only compared when
    /// set. Comments treat `null` and `""` as equal.
    #[must_use]
    pub fn diff_fields(&self, current: &Entity) -> Vec<Field> {
        let mut fields = Vec::new();
        match (self, current) {
            (Self::Group(d), Self::Group(c)) => {
                if comment_differs(d.comment.as_deref(), c.comment.as_deref()) {
                    fields.push(Field::Comment);
                }
                if d.enabled != c.enabled {
                    fields.push(Field::Enabled);
                }
            }
            (Self::DnsRecord(d), Self::DnsRecord(c)) => {
                if d.data != c.data {
                    fields.push(Field::Data);
                }
                if d.ttl.is_some() && d.ttl != c.ttl {
                    fields.push(Field::Ttl);
                }
            }
            (Self::List(d), Self::List(c)) => {
                if d.list_type != c.list_type {
                    fields.push(Field::ListType);
                }
                if comment_differs(d.comment.as_deref(), c.comment.as_deref()) {
                    fields.push(Field::Comment);
                }
                if d.enabled != c.enabled {
                    fields.push(Field::Enabled);
                }
            }
            (Self::Client(d), Self::Client(c)) => {
                if comment_differs(d.comment.as_deref(), c.comment.as_deref()) {
                    fields.push(Field::Comment);
                }
            }
            // Different kinds never share an index; treat as a full replacement.
            _ => fields.extend(self.managed_fields()),
        }
        fields
    }

    /// Desired attributes overlaid on `current`, for APIs that need the full
    /// record on update. Unmanaged (unset) desired attributes keep the current value.
    #[must_use]
    pub fn merged_onto(&self, current: &Entity) -> Entity {
        match (self, current) {
            (Self::Group(d), Self::Group(c)) => Self::Group(Group {
                name: d.name.clone(),
                comment: d.comment.clone().or_else(|| c.comment.clone()),
                enabled: d.enabled,
            }),
            (Self::DnsRecord(d), Self::DnsRecord(c)) => Self::DnsRecord(DnsRecord {
                name: d.name.clone(),
                record_type: d.record_type,
                data: d.data.clone(),
                ttl: d.ttl.or(c.ttl),
            }),
            (Self::List(d), Self::List(c)) => Self::List(List {
                address: d.address.clone(),
                list_type: d.list_type,
                comment: d.comment.clone().or_else(|| c.comment.clone()),
                enabled: d.enabled,
            }),
            (Self::Client(d), Self::Client(c)) => Self::Client(Client {
                client: d.client.clone(),
                comment: d.comment.clone().or_else(|| c.comment.clone()),
            }),
            _ => self.clone(),
        }
    }

    fn managed_fields(&self) -> Vec<Field> {
        match self {
            Self::Group(_) => vec![Field::Comment, Field::Enabled],
            Self::DnsRecord(_) => vec![Field::Data, Field::Ttl],
            Self::List(_) => vec![Field::ListType, Field::Comment, Field::Enabled],
            Self::Client(_) => vec![Field::Comment],
        }
    }
}

fn comment_differs(desired: Option<&str>, current: Option<&str>) -> bool {
    desired.is_some_and(|d| d != current.unwrap_or(""))
}

/// Lower-case a DNS name and strip surrounding whitespace and the trailing dot.
#[must_use]
pub fn normalize_dns_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

// ============================================================================
// Records
// ============================================================================

/// One operator-declared entity plus its desired presence.
///
/// Immutable once constructed; the reconciler only borrows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRecord {
    pub entity: Entity,

    /// Groups this entity should belong to. `None` leaves membership unmanaged.
    /// Ignored for kinds that do not reference groups.
    pub group_refs: Option<Vec<GroupRef>>,

    pub state: Presence,
}

impl DesiredRecord {
    /// A record that should exist.
    #[must_use]
    pub fn present(entity: Entity) -> Self {
        Self {
            entity: entity.normalized(),
            group_refs: None,
            state: Presence::Present,
        }
    }

    /// A record that should not exist.
    #[must_use]
    pub fn absent(entity: Entity) -> Self {
        Self {
            entity: entity.normalized(),
            group_refs: None,
            state: Presence::Absent,
        }
    }

    /// A record with the given presence.
    #[must_use]
    pub fn new(entity: Entity, state: Presence) -> Self {
        match state {
            Presence::Present => Self::present(entity),
            Presence::Absent => Self::absent(entity),
        }
    }

    /// Set the desired group membership.
    #[must_use]
    pub fn with_groups(mut self, refs: Vec<GroupRef>) -> Self {
        self.group_refs = Some(refs);
        self
    }

    #[must_use]
    pub const fn kind(&self) -> Kind {
        self.entity.kind()
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.entity.key()
    }

    /// Whether two records for the same key disagree on anything.
    ///
    /// Group references are compared as sets.
    #[must_use]
    pub fn conflicts_with(&self, other: &DesiredRecord) -> bool {
        let refs = |r: &DesiredRecord| {
            r.group_refs
                .as_ref()
                .map(|v| v.iter().cloned().collect::<BTreeSet<_>>())
        };
        self.entity != other.entity || self.state != other.state || refs(self) != refs(other)
    }
}

/// Identifier the appliance uses for an existing entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteId {
    /// Database row id (groups, clients, lists).
    Row(u32),
    /// Raw configuration entry for local DNS records, e.g. `"192.168.1.10 nas.lan"`.
    Entry(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row(id) => write!(f, "{id}"),
            Self::Entry(entry) => write!(f, "{entry:?}"),
        }
    }
}

/// An entity as it currently exists on one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentRecord {
    pub id: RemoteId,
    pub entity: Entity,
    /// Group membership; `None` for kinds without groups.
    pub group_ids: Option<BTreeSet<u32>>,
}

impl CurrentRecord {
    #[must_use]
    pub fn key(&self) -> String {
        self.entity.key()
    }
}

/// A desired record with its group references dereferenced for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecord {
    pub entity: Entity,
    /// Desired group ids; `None` when membership is unmanaged.
    pub group_ids: Option<BTreeSet<u32>>,
    pub state: Presence,
}

impl ResolvedRecord {
    #[must_use]
    pub fn key(&self) -> String {
        self.entity.key()
    }

    /// Fields (attributes and group membership) that differ from `current`.
    #[must_use]
    pub fn changed_fields(&self, current: &CurrentRecord) -> Vec<Field> {
        let mut fields = self.entity.diff_fields(&current.entity);
        if let Some(desired) = &self.group_ids {
            let empty = BTreeSet::new();
            if desired != current.group_ids.as_ref().unwrap_or(&empty) {
                fields.push(Field::Groups);
            }
        }
        fields.sort();
        fields
    }

    /// Desired state merged onto `current`, keeping unmanaged values.
    #[must_use]
    pub fn merged_onto(&self, current: &CurrentRecord) -> ResolvedRecord {
        ResolvedRecord {
            entity: self.entity.merged_onto(&current.entity),
            group_ids: self
                .group_ids
                .clone()
                .or_else(|| current.group_ids.clone()),
            state: self.state,
        }
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod entity_tests;
