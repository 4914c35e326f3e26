// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Group name to id resolution.
//!
//! Lists and clients reference groups by name or id, but the appliance only
//! stores ids. A [`NameIdMap`] is built from one group listing per instance
//! per pass and is never shared between instances, because every instance
//! has its own id space.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::client::InstanceClient;
use crate::entity::{DesiredRecord, GroupRef, Presence, ResolvedRecord};
use crate::errors::EntityError;

/// Group name to id lookup for one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameIdMap {
    exact: BTreeMap<String, u32>,
    folded: BTreeMap<String, u32>,
    planned: u32,
}

impl NameIdMap {
    /// Build the map from `(id, name)` pairs.
    ///
    /// When two names differ only by case, the case-insensitive fallback
    /// keeps the lowest id.
    #[must_use]
    pub fn from_groups<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (u32, String)>,
    {
        let mut map = Self::default();
        for (id, name) in groups {
            map.folded
                .entry(name.to_lowercase())
                .and_modify(|existing| *existing = (*existing).min(id))
                .or_insert(id);
            map.exact.insert(name, id);
        }
        map
    }

    /// Id of the group called `name`: exact match first, then ignoring case.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.exact
            .get(name)
            .or_else(|| self.folded.get(&name.to_lowercase()))
            .copied()
    }

    /// Give a group that a dry run would create a placeholder id, so that
    /// references to it resolve. Placeholders count down from `u32::MAX` and
    /// are never sent to an instance.
    pub fn insert_planned(&mut self, name: &str) {
        if self.exact.contains_key(name) {
            return;
        }
        let id = u32::MAX - self.planned;
        self.planned += 1;
        self.exact.insert(name.to_string(), id);
        self.folded.entry(name.to_lowercase()).or_insert(id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

/// List the groups on `client` and build its [`NameIdMap`].
///
/// # Errors
///
/// Returns [`EntityError::ResolveFailed`] if the groups cannot be listed.
pub async fn resolve(client: &dyn InstanceClient) -> Result<NameIdMap, EntityError> {
    let groups = client
        .list_groups()
        .await
        .map_err(|cause| EntityError::ResolveFailed {
            instance: client.name().to_string(),
            cause,
        })?;
    let map = NameIdMap::from_groups(groups);
    debug!(instance = %client.name(), groups = map.len(), "Built group name map");
    Ok(map)
}

/// Turn a reference into a group id.
///
/// Ids pass through unvalidated. A name that is not a known group but is
/// made of digits only (`"5"` quoted in YAML) is taken as an id.
///
/// ```rust
/// use pihole_reconciler::entity::GroupRef;
/// use pihole_reconciler::reconcilers::resolver::{dereference, NameIdMap};
///
/// let map = NameIdMap::from_groups([(0, "Default".to_string()), (3, "IOT".to_string())]);
/// assert_eq!(dereference(&GroupRef::Name("iot".to_string()), &map), Some(3));
/// assert_eq!(dereference(&GroupRef::Id(9), &map), Some(9));
/// assert_eq!(dereference(&GroupRef::Name("Kids".to_string()), &map), None);
/// ```
#[must_use]
pub fn dereference(reference: &GroupRef, map: &NameIdMap) -> Option<u32> {
    match reference {
        GroupRef::Id(id) => Some(*id),
        GroupRef::Name(name) => map.lookup(name).or_else(|| {
            if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
                name.parse().ok()
            } else {
                None
            }
        }),
    }
}

/// Dereference every group reference of `record` for one instance.
///
/// Absent records and records without group references resolve without a
/// lookup. A record whose references cannot all be resolved is rejected as a
/// whole; it is never applied with a partial group set.
///
/// # Errors
///
/// Returns [`EntityError::UnresolvedReference`] naming the first unknown group.
pub fn resolve_record(
    instance: &str,
    record: &DesiredRecord,
    map: Option<&NameIdMap>,
) -> Result<ResolvedRecord, EntityError> {
    let group_ids = match (&record.group_refs, record.state) {
        (Some(refs), Presence::Present) if record.kind().references_groups() => {
            let empty = NameIdMap::default();
            let map = map.unwrap_or(&empty);
            let mut ids = BTreeSet::new();
            for reference in refs {
                let id = dereference(reference, map).ok_or_else(|| {
                    EntityError::UnresolvedReference {
                        instance: instance.to_string(),
                        kind: record.kind(),
                        key: record.key(),
                        reference: reference.to_string(),
                    }
                })?;
                ids.insert(id);
            }
            Some(ids)
        }
        _ => None,
    };

    Ok(ResolvedRecord {
        entity: record.entity.clone(),
        group_ids,
        state: record.state,
    })
}

/// Whether any record of this batch needs a group lookup.
#[must_use]
pub fn needs_lookup(records: &[DesiredRecord]) -> bool {
    records.iter().any(|r| {
        r.state == Presence::Present
            && r.kind().references_groups()
            && r.group_refs
                .as_ref()
                .is_some_and(|refs| refs.iter().any(|g| matches!(g, GroupRef::Name(_))))
    })
}
