// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired vs. current comparison for one kind on one instance.
//!
//! [`diff`] is pure: it never calls the instance. For each desired record it
//! yields exactly one [`Action`], in input order:
//!
//! | Desired | Current | Action |
//! |---------|---------|--------|
//! | present | missing | [`Action::Create`] |
//! | present | equal | [`Action::NoOp`] |
//! | present | differs | [`Action::Update`] with only the changed fields |
//! | absent | exists | [`Action::Delete`] (unless the policy is `retain`) |
//! | absent | missing | [`Action::NoOp`] |
//!
//! Current entities the desired list does not mention are left alone unless
//! the kind's [`DeletionPolicy`] is `prune`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::constants::DEFAULT_GROUP_ID;
use crate::entity::{CurrentRecord, DesiredRecord, Entity, Field, Presence, RemoteId, ResolvedRecord};
use crate::errors::ConfigConflict;

/// API operation an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Which current entities a kind may delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    /// Delete only records declared `absent`.
    #[default]
    Explicit,
    /// Never delete; `absent` records are no-ops. For desired state generated
    /// from an inventory that cannot express removals.
    Retain,
    /// Also delete every current entity the desired list does not mention.
    /// The default group is never pruned.
    Prune,
}

/// One step towards convergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create(ResolvedRecord),
    Update {
        target: CurrentRecord,
        /// Desired state merged onto `target`, for full-record APIs.
        merged: ResolvedRecord,
        changed: Vec<Field>,
    },
    Delete(CurrentRecord),
    NoOp(String),
}

impl Action {
    /// Key of the entity this action concerns.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Create(record) => record.key(),
            Self::Update { target, .. } | Self::Delete(target) => target.key(),
            Self::NoOp(key) => key.clone(),
        }
    }

    /// The API operation, or `None` for a no-op.
    #[must_use]
    pub const fn operation(&self) -> Option<Operation> {
        match self {
            Self::Create(_) => Some(Operation::Create),
            Self::Update { .. } => Some(Operation::Update),
            Self::Delete(_) => Some(Operation::Delete),
            Self::NoOp(_) => None,
        }
    }
}

/// Compute the actions for one kind on one instance.
///
/// `desired` must already be free of duplicate keys (see [`dedupe`]). The
/// first `desired.len()` actions correspond one-to-one to `desired`; pruned
/// deletions follow, sorted by key.
#[must_use]
pub fn diff(
    desired: &[ResolvedRecord],
    current: &[CurrentRecord],
    policy: DeletionPolicy,
) -> Vec<Action> {
    let by_key: HashMap<String, &CurrentRecord> =
        current.iter().map(|record| (record.key(), record)).collect();

    let mut actions: Vec<Action> = desired
        .iter()
        .map(|record| {
            let key = record.key();
            match (record.state, by_key.get(&key)) {
                (Presence::Present, None) => Action::Create(record.clone()),
                (Presence::Present, Some(existing)) => {
                    let changed = record.changed_fields(existing);
                    if changed.is_empty() {
                        Action::NoOp(key)
                    } else {
                        Action::Update {
                            target: (*existing).clone(),
                            merged: record.merged_onto(existing),
                            changed,
                        }
                    }
                }
                (Presence::Absent, Some(existing)) if policy != DeletionPolicy::Retain => {
                    Action::Delete((*existing).clone())
                }
                (Presence::Absent, _) => Action::NoOp(key),
            }
        })
        .collect();

    if policy == DeletionPolicy::Prune {
        let mentioned: HashSet<String> = desired.iter().map(ResolvedRecord::key).collect();
        let mut pruned: Vec<&CurrentRecord> = current
            .iter()
            .filter(|record| !mentioned.contains(&record.key()) && !is_default_group(record))
            .collect();
        pruned.sort_by_key(|record| record.key());
        actions.extend(pruned.into_iter().cloned().map(Action::Delete));
    }

    actions
}

fn is_default_group(record: &CurrentRecord) -> bool {
    matches!(record.entity, Entity::Group(_)) && record.id == RemoteId::Row(DEFAULT_GROUP_ID)
}

/// Collapse records sharing a key; the last one wins.
///
/// The surviving record takes the position of the key's first occurrence.
/// A [`ConfigConflict`] is reported for every key whose occurrences disagree;
/// exact repeats are silently collapsed.
#[must_use]
pub fn dedupe(records: &[DesiredRecord]) -> (Vec<DesiredRecord>, Vec<ConfigConflict>) {
    let mut unique: Vec<DesiredRecord> = Vec::with_capacity(records.len());
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut occurrences: HashMap<String, (usize, bool)> = HashMap::new();

    for record in records {
        let key = record.key();
        match position.get(&key) {
            Some(&index) => {
                let entry = occurrences.entry(key).or_insert((1, false));
                entry.0 += 1;
                entry.1 |= unique[index].conflicts_with(record);
                unique[index] = record.clone();
            }
            None => {
                position.insert(key, unique.len());
                unique.push(record.clone());
            }
        }
    }

    let mut conflicts: Vec<ConfigConflict> = occurrences
        .into_iter()
        .filter(|(_, (_, conflicting))| *conflicting)
        .map(|(key, (count, _))| ConfigConflict {
            kind: unique[position[&key]].kind(),
            key,
            occurrences: count,
        })
        .collect();
    conflicts.sort_by(|a, b| a.key.cmp(&b.key));

    (unique, conflicts)
}
