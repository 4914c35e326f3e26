// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation orchestrator.
//!
//! The [`Reconciler`] drives every instance through the kinds in
//! [`Kind::PROCESSING_ORDER`]. For each (instance, kind) it walks
//!
//! ```text
//! Pending -> Resolving -> Fetching -> Diffing -> Applying -> Done
//!                |            |                      |
//!                +-> Failed <-+          per-action Failed
//! ```
//!
//! A resolve or fetch failure fails the whole kind on that instance; an apply
//! failure fails only that entity. Instances never affect each other: each
//! has its own client, its own group map and its own results.
//!
//! Instances run concurrently up to `max_concurrent_instances`. Kinds on one
//! instance run in order. The actions of one kind run concurrently up to
//! `max_concurrent_actions` and are all awaited before the next kind starts,
//! so groups created in a pass are visible when lists and clients resolve.
//!
//! Several A/AAAA records can live on one host entry
//! (`"10.0.0.5 nas.lan files.lan"`), and every change to one of them rewrites
//! the whole entry. Actions on the same entry therefore share a lane: they
//! run one after another, each against the entry as the previous one left it.
//!
//! With [`ReconcileOptions::dry_run`] set, everything up to the diff runs as
//! usual but no action is sent; each result is the outcome the action would
//! have had.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::differ::{self, Action, DeletionPolicy, Operation};
use super::fetcher::{self, remaining_host_entry};
use super::report::{Outcome, ReconciliationResult, RunReport};
use super::resolver::{self, NameIdMap};
use crate::client::InstanceClient;
use crate::constants::{DEFAULT_MAX_CONCURRENT_ACTIONS, DEFAULT_MAX_CONCURRENT_INSTANCES};
use crate::entity::{DesiredRecord, Entity, Kind, RecordType, RemoteId};
use crate::errors::{ClientError, ConfigConflict, EntityError, ReconcileError};
use crate::metrics;

/// Desired records per kind, in operator order.
pub type DesiredState = BTreeMap<Kind, Vec<DesiredRecord>>;

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub max_concurrent_instances: usize,
    pub max_concurrent_actions: usize,
    /// Per-kind deletion policy; kinds not listed use [`DeletionPolicy::Explicit`].
    pub deletion: BTreeMap<Kind, DeletionPolicy>,
    /// Read and diff only; report would-be outcomes without changing anything.
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            max_concurrent_instances: DEFAULT_MAX_CONCURRENT_INSTANCES,
            max_concurrent_actions: DEFAULT_MAX_CONCURRENT_ACTIONS,
            deletion: BTreeMap::new(),
            dry_run: false,
        }
    }
}

impl ReconcileOptions {
    #[must_use]
    pub fn deletion_policy(&self, kind: Kind) -> DeletionPolicy {
        self.deletion.get(&kind).copied().unwrap_or_default()
    }
}

/// Work for one kind, shared by every instance.
#[derive(Debug)]
struct KindPlan {
    kind: Kind,
    records: Vec<DesiredRecord>,
    policy: DeletionPolicy,
    needs_lookup: bool,
}

/// Cached outcome of the single group listing done per instance.
type NameCache = Option<Result<Arc<NameIdMap>, EntityError>>;

/// Actions that run one after another, in input order.
type Lane = Vec<(usize, Action)>;

/// Converges a fleet of instances to one desired state.
///
/// Holds no state between runs.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    options: ReconcileOptions,
}

impl Reconciler {
    #[must_use]
    pub fn new(options: ReconcileOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Run one reconciliation pass.
    ///
    /// Returns one result per (instance, kind, key): every desired key of every
    /// processed kind on every instance, plus any pruned deletions.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] only for input that cannot be processed at
    /// all (no instances, duplicate instance names). Every other failure is a
    /// result.
    pub async fn reconcile(
        &self,
        instances: &[Arc<dyn InstanceClient>],
        desired: &DesiredState,
    ) -> Result<RunReport, ReconcileError> {
        check_instances(instances)?;

        let started_at = Utc::now();
        let (plans, warnings) = self.plan(desired);
        info!(
            instances = instances.len(),
            kinds = plans.len(),
            dry_run = self.options.dry_run,
            "Starting reconciliation pass"
        );

        let plans = &plans;
        let mut per_instance: Vec<(usize, Vec<ReconciliationResult>)> =
            stream::iter(instances.iter().enumerate())
                .map(|(index, client)| async move {
                    (index, self.reconcile_instance(client.as_ref(), plans).await)
                })
                .buffer_unordered(self.options.max_concurrent_instances.max(1))
                .collect()
                .await;
        per_instance.sort_by_key(|(index, _)| *index);

        let results = per_instance
            .into_iter()
            .flat_map(|(_, results)| results)
            .collect();
        let mut report = RunReport::new(started_at, Utc::now(), results, warnings);
        report.dry_run = self.options.dry_run;

        info!(
            unchanged = report.summary.unchanged,
            created = report.summary.created,
            updated = report.summary.updated,
            deleted = report.summary.deleted,
            failed = report.summary.failed,
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    /// Deduplicate desired records per kind and drop kinds with nothing to do.
    fn plan(&self, desired: &DesiredState) -> (Vec<KindPlan>, Vec<ConfigConflict>) {
        let mut plans = Vec::new();
        let mut warnings = Vec::new();

        for kind in Kind::PROCESSING_ORDER {
            let policy = self.options.deletion_policy(kind);
            let records: Vec<DesiredRecord> = desired
                .get(&kind)
                .into_iter()
                .flatten()
                .filter(|record| {
                    let matches = record.kind() == kind;
                    if !matches {
                        warn!(
                            kind = %kind,
                            key = %record.key(),
                            record_kind = %record.kind(),
                            "Ignoring desired record filed under another kind"
                        );
                    }
                    matches
                })
                .cloned()
                .collect();

            if records.is_empty() && policy != DeletionPolicy::Prune {
                continue;
            }

            let (records, conflicts) = differ::dedupe(&records);
            for conflict in &conflicts {
                warn!(
                    kind = %conflict.kind,
                    key = %conflict.key,
                    occurrences = conflict.occurrences,
                    "Conflicting desired records, the last one wins"
                );
            }
            warnings.extend(conflicts);

            let needs_lookup = resolver::needs_lookup(&records);
            plans.push(KindPlan {
                kind,
                records,
                policy,
                needs_lookup,
            });
        }

        (plans, warnings)
    }

    async fn reconcile_instance(
        &self,
        client: &dyn InstanceClient,
        plans: &[KindPlan],
    ) -> Vec<ReconciliationResult> {
        let started = Instant::now();
        let instance = client.name();
        info!(instance = %instance, endpoint = %client.endpoint(), "Reconciling instance");

        let mut names: NameCache = None;
        let mut planned_groups: Vec<String> = Vec::new();
        let mut results = Vec::new();
        for plan in plans {
            let kind_results = self
                .reconcile_kind(client, plan, &mut names, &planned_groups)
                .await;
            if self.options.dry_run && plan.kind == Kind::Group {
                planned_groups.extend(
                    kind_results
                        .iter()
                        .filter(|r| r.outcome == Outcome::Created)
                        .map(|r| r.key.clone()),
                );
            }
            results.extend(kind_results);
        }
        client.close().await;

        for result in &results {
            if !self.options.dry_run {
                metrics::record_action(result.kind.as_str(), result.outcome.as_str());
            }
            if let Some(err) = result.error() {
                metrics::record_error(result.kind.as_str(), err.reason());
            }
        }

        let failed = results.iter().filter(|r| r.outcome.is_failed()).count();
        metrics::record_instance_reconciled(instance, failed == 0, started.elapsed());
        if failed == 0 {
            info!(
                instance = %instance,
                results = results.len(),
                elapsed = ?started.elapsed(),
                "Instance reconciled"
            );
        } else {
            warn!(
                instance = %instance,
                results = results.len(),
                failed = failed,
                elapsed = ?started.elapsed(),
                "Instance reconciled with failures"
            );
        }
        results
    }

    /// `planned_groups` are groups a dry run reported as created; they
    /// resolve to placeholder ids so that references to them do not fail.
    async fn reconcile_kind(
        &self,
        client: &dyn InstanceClient,
        plan: &KindPlan,
        names: &mut NameCache,
        planned_groups: &[String],
    ) -> Vec<ReconciliationResult> {
        let instance = client.name();
        let kind = plan.kind;

        debug!(instance = %instance, kind = %kind, state = "resolving", "Kind state transition");
        let map = if plan.needs_lookup {
            let lookup = match names {
                Some(cached) => cached.clone(),
                None => {
                    let fresh = resolver::resolve(client).await.map(|mut map| {
                        for name in planned_groups {
                            map.insert_planned(name);
                        }
                        Arc::new(map)
                    });
                    *names = Some(fresh.clone());
                    fresh
                }
            };
            match lookup {
                Ok(map) => Some(map),
                Err(err) => {
                    error!(instance = %instance, kind = %kind, error = %err, "Group resolution failed");
                    return fail_all(instance, plan, &err);
                }
            }
        } else {
            None
        };

        let mut slots: Vec<Option<ReconciliationResult>> = vec![None; plan.records.len()];
        let mut resolved = Vec::with_capacity(plan.records.len());
        let mut positions = Vec::with_capacity(plan.records.len());
        for (index, record) in plan.records.iter().enumerate() {
            match resolver::resolve_record(instance, record, map.as_deref()) {
                Ok(record) => {
                    resolved.push(record);
                    positions.push(index);
                }
                Err(err) => {
                    warn!(
                        instance = %instance,
                        kind = %kind,
                        key = %record.key(),
                        error = %err,
                        "Desired record not resolvable"
                    );
                    slots[index] = Some(failed(instance, kind, record.key(), err));
                }
            }
        }

        debug!(instance = %instance, kind = %kind, state = "fetching", "Kind state transition");
        let current = match fetcher::fetch(client, kind).await {
            Ok(current) => current,
            Err(err) => {
                error!(instance = %instance, kind = %kind, error = %err, "Fetching current state failed");
                for (slot, record) in slots.iter_mut().zip(&plan.records) {
                    if slot.is_none() {
                        *slot = Some(failed(instance, kind, record.key(), err.clone()));
                    }
                }
                return slots.into_iter().flatten().collect();
            }
        };

        debug!(instance = %instance, kind = %kind, state = "diffing", "Kind state transition");
        let actions = differ::diff(&resolved, &current, plan.policy);

        debug!(
            instance = %instance,
            kind = %kind,
            state = "applying",
            actions = actions.len(),
            "Kind state transition"
        );
        let dry_run = self.options.dry_run;
        let applied: Vec<Vec<(usize, ReconciliationResult)>> = stream::iter(lanes(actions))
            .map(|lane| apply_lane(client, kind, lane, dry_run))
            .buffer_unordered(self.options.max_concurrent_actions.max(1))
            .collect()
            .await;

        let mut pruned = Vec::new();
        for (index, result) in applied.into_iter().flatten() {
            match positions.get(index) {
                Some(&slot) => slots[slot] = Some(result),
                None => pruned.push((index, result)),
            }
        }
        pruned.sort_by_key(|(index, _)| *index);

        debug!(instance = %instance, kind = %kind, state = "done", "Kind state transition");
        slots
            .into_iter()
            .flatten()
            .chain(pruned.into_iter().map(|(_, result)| result))
            .collect()
    }
}

/// Split actions into lanes that may run concurrently.
///
/// Updates and deletes of A/AAAA records read from the same host entry share
/// one lane; every other action gets a lane of its own.
fn lanes(actions: Vec<Action>) -> Vec<Lane> {
    let mut lanes: Vec<Lane> = Vec::with_capacity(actions.len());
    let mut by_entry: HashMap<String, usize> = HashMap::new();
    for (index, action) in actions.into_iter().enumerate() {
        let entry = shared_entry(&action).map(|(entry, _)| entry.to_string());
        match entry {
            Some(entry) => match by_entry.get(&entry) {
                Some(&lane) => lanes[lane].push((index, action)),
                None => {
                    by_entry.insert(entry, lanes.len());
                    lanes.push(vec![(index, action)]);
                }
            },
            None => lanes.push(vec![(index, action)]),
        }
    }
    lanes
}

/// The host entry an action rewrites, with the host it concerns.
fn shared_entry(action: &Action) -> Option<(&str, &str)> {
    let (Action::Update { target, .. } | Action::Delete(target)) = action else {
        return None;
    };
    match (&target.entity, &target.id) {
        (Entity::DnsRecord(record), RemoteId::Entry(entry))
            if record.record_type != RecordType::Cname =>
        {
            Some((entry.as_str(), record.name.as_str()))
        }
        _ => None,
    }
}

/// Point an update or delete at the entry as it now reads.
fn retarget(action: &mut Action, entry: &str) {
    if let Action::Update { target, .. } | Action::Delete(target) = action {
        target.id = RemoteId::Entry(entry.to_string());
    }
}

/// Apply the actions of one lane in order.
///
/// After each successful change to a shared host entry the next action is
/// retargeted to the entry without the changed host. When a change fails
/// after it already modified the entry, the entry's text is unknown and the
/// rest of the lane is skipped; the next pass starts from fresh state.
async fn apply_lane(
    client: &dyn InstanceClient,
    kind: Kind,
    lane: Lane,
    dry_run: bool,
) -> Vec<(usize, ReconciliationResult)> {
    let instance = client.name();
    let mut results = Vec::with_capacity(lane.len());
    let mut rewritten: Option<String> = None;
    let mut lost: Option<String> = None;

    for (index, mut action) in lane {
        if let Some(entry) = &lost {
            let key = action.key();
            warn!(
                instance = %instance,
                kind = %kind,
                key = %key,
                entry = %entry,
                "Skipping action on an entry left incomplete by an earlier failure"
            );
            let err = EntityError::Skipped {
                instance: instance.to_string(),
                kind,
                key: key.clone(),
                entry: entry.clone(),
            };
            results.push((index, failed(instance, kind, key, err)));
            continue;
        }
        if let Some(entry) = &rewritten {
            retarget(&mut action, entry);
        }

        let touched =
            shared_entry(&action).map(|(entry, host)| (entry.to_string(), host.to_string()));
        let result = if dry_run {
            planned(instance, kind, action)
        } else {
            apply(client, kind, action).await
        };

        if let Some((entry, host)) = touched {
            match &result.outcome {
                Outcome::Failed(err) if modified_instance(err) => lost = Some(entry),
                Outcome::Failed(_) => {}
                _ => match remaining_host_entry(&entry, &host) {
                    Some(remaining) => rewritten = Some(remaining),
                    None => lost = Some(entry),
                },
            }
        }
        results.push((index, result));
    }
    results
}

fn modified_instance(err: &EntityError) -> bool {
    matches!(
        err,
        EntityError::ApplyFailed {
            cause: ClientError::PartiallyApplied { .. },
            ..
        }
    )
}

/// The outcome `action` would have, without calling the instance.
fn planned(instance: &str, kind: Kind, action: Action) -> ReconciliationResult {
    let key = action.key();
    let outcome = match action {
        Action::NoOp(_) => Outcome::Unchanged,
        Action::Create(_) => Outcome::Created,
        Action::Update { changed, .. } => Outcome::Updated(changed),
        Action::Delete(_) => Outcome::Deleted,
    };
    if outcome.is_change() {
        info!(
            instance = %instance,
            kind = %kind,
            key = %key,
            outcome = outcome.as_str(),
            "Would apply (dry run)"
        );
    }
    ReconciliationResult::new(instance, kind, key, outcome)
}

/// Perform one action with one adapter call.
async fn apply(client: &dyn InstanceClient, kind: Kind, action: Action) -> ReconciliationResult {
    let instance = client.name();
    let key = action.key();

    let result: Result<Outcome, (Operation, ClientError)> = match action {
        Action::NoOp(_) => {
            debug!(instance = %instance, kind = %kind, key = %key, "Already converged");
            Ok(Outcome::Unchanged)
        }
        Action::Create(record) => match client.create(&record).await {
            Ok(id) => {
                info!(instance = %instance, kind = %kind, key = %key, id = %id, "Created");
                Ok(Outcome::Created)
            }
            Err(e) => Err((Operation::Create, e)),
        },
        Action::Update {
            target,
            merged,
            changed,
        } => match client.update(&target, &merged, &changed).await {
            Ok(()) => {
                info!(instance = %instance, kind = %kind, key = %key, changed = ?changed, "Updated");
                Ok(Outcome::Updated(changed))
            }
            Err(e) => Err((Operation::Update, e)),
        },
        Action::Delete(target) => match client.delete(&target).await {
            Ok(()) => {
                info!(instance = %instance, kind = %kind, key = %key, id = %target.id, "Deleted");
                Ok(Outcome::Deleted)
            }
            Err(e) => Err((Operation::Delete, e)),
        },
    };

    let outcome = result.unwrap_or_else(|(operation, cause)| {
        let err = EntityError::ApplyFailed {
            instance: instance.to_string(),
            kind,
            key: key.clone(),
            operation,
            cause,
        };
        error!(instance = %instance, kind = %kind, key = %key, error = %err, "Action failed");
        Outcome::Failed(err)
    });
    ReconciliationResult::new(instance, kind, key, outcome)
}

fn failed(instance: &str, kind: Kind, key: String, err: EntityError) -> ReconciliationResult {
    ReconciliationResult::new(instance, kind, key, Outcome::Failed(err))
}

fn fail_all(instance: &str, plan: &KindPlan, err: &EntityError) -> Vec<ReconciliationResult> {
    plan.records
        .iter()
        .map(|record| failed(instance, plan.kind, record.key(), err.clone()))
        .collect()
}

fn check_instances(instances: &[Arc<dyn InstanceClient>]) -> Result<(), ReconcileError> {
    if instances.is_empty() {
        return Err(ReconcileError::NoInstances);
    }
    let mut seen = HashSet::new();
    for client in instances {
        if !seen.insert(client.name()) {
            return Err(ReconcileError::DuplicateInstance(client.name().to_string()));
        }
    }
    Ok(())
}
