// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-entity results and the run report.
//!
//! The engine decides nothing about overall success; it returns every
//! outcome and lets the caller judge. [`RunReport::has_failures`] is the
//! usual test.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::entity::{Field, Kind};
use crate::errors::{ConfigConflict, EntityError};

/// What happened to one (instance, kind, key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Created,
    Updated(Vec<Field>),
    Deleted,
    Failed(EntityError),
}

impl Outcome {
    /// Lowercase name used in reports, logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Created => "created",
            Self::Updated(_) => "updated",
            Self::Deleted => "deleted",
            Self::Failed(_) => "failed",
        }
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// True for created, updated and deleted.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated(_) | Self::Deleted)
    }
}

/// Outcome for one entity on one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub instance: String,
    pub kind: Kind,
    pub key: String,
    pub outcome: Outcome,
}

impl ReconciliationResult {
    #[must_use]
    pub fn new(instance: &str, kind: Kind, key: String, outcome: Outcome) -> Self {
        Self {
            instance: instance.to_string(),
            kind,
            key,
            outcome,
        }
    }

    /// The failure, if this result failed.
    #[must_use]
    pub const fn error(&self) -> Option<&EntityError> {
        match &self.outcome {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ResultEntry<'a> {
    instance: &'a str,
    kind: Kind,
    key: &'a str,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed: Option<&'a [Field]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transient: Option<bool>,
}

impl Serialize for ReconciliationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let error = self.error();
        ResultEntry {
            instance: &self.instance,
            kind: self.kind,
            key: &self.key,
            outcome: self.outcome.as_str(),
            changed: match &self.outcome {
                Outcome::Updated(fields) => Some(fields.as_slice()),
                _ => None,
            },
            reason: error.map(EntityError::reason),
            message: error.map(ToString::to_string),
            transient: error.map(EntityError::is_transient),
        }
        .serialize(serializer)
    }
}

impl fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<9} {} {} {}",
            self.outcome.as_str(),
            self.instance,
            self.kind,
            self.key
        )?;
        match &self.outcome {
            Outcome::Updated(fields) => {
                let names: Vec<String> = fields.iter().map(ToString::to_string).collect();
                write!(f, " ({})", names.join(", "))
            }
            Outcome::Failed(err) => write!(f, ": {err}"),
            _ => Ok(()),
        }
    }
}

/// Outcome counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub unchanged: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl Summary {
    fn add(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Created => self.created += 1,
            Outcome::Updated(_) => self.updated += 1,
            Outcome::Deleted => self.deleted += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Everything one reconciliation pass produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// True when nothing was sent to any instance; outcomes are would-be outcomes.
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: Summary,
    pub results: Vec<ReconciliationResult>,
    pub warnings: Vec<ConfigConflict>,
}

impl RunReport {
    #[must_use]
    pub fn new(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        results: Vec<ReconciliationResult>,
        warnings: Vec<ConfigConflict>,
    ) -> Self {
        let mut summary = Summary::default();
        for result in &results {
            summary.add(&result.outcome);
        }
        Self {
            dry_run: false,
            started_at,
            finished_at,
            summary,
            results,
            warnings,
        }
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReconciliationResult> {
        self.results.iter().filter(|r| r.outcome.is_failed())
    }

    pub fn for_instance<'a>(
        &'a self,
        instance: &'a str,
    ) -> impl Iterator<Item = &'a ReconciliationResult> + 'a {
        self.results.iter().filter(move |r| r.instance == instance)
    }

    /// Result for one entity, if the run produced one.
    #[must_use]
    pub fn find(&self, instance: &str, kind: Kind, key: &str) -> Option<&ReconciliationResult> {
        self.results
            .iter()
            .find(|r| r.instance == instance && r.kind == kind && r.key == key)
    }
}

impl fmt::Display for RunReport {
    /// Changes, failures and warnings, one per line, then the summary.
    /// Unchanged entities are left out.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for warning in &self.warnings {
            writeln!(f, "warning   {warning}")?;
        }
        for result in self.results.iter().filter(|r| r.outcome != Outcome::Unchanged) {
            writeln!(f, "{result}")?;
        }
        let s = &self.summary;
        if self.dry_run {
            write!(f, "dry run, nothing applied: ")?;
        }
        write!(
            f,
            "{} unchanged, {} created, {} updated, {} deleted, {} failed",
            s.unchanged, s.created, s.updated, s.deleted, s.failed
        )
    }
}
