// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation engine for Pi-hole fleets.
//!
//! This module contains the logic that converges each instance's live state to
//! the operator's desired state.
//!
//! # Reconciliation Architecture
//!
//! 1. **Resolve** - Build the instance's group name to id map ([`resolver`])
//! 2. **Fetch** - Read and normalize current state ([`fetcher`])
//! 3. **Diff** - Compute create/update/delete actions, suppressing no-ops ([`differ`])
//! 4. **Apply** - Issue one adapter call per action and record the outcome ([`engine`])
//!
//! Results for every (instance, kind, key) are collected into a
//! [`RunReport`].
//!
//! # Example
//!
//! ```rust,no_run
//! use pihole_reconciler::client::InstanceClient;
//! use pihole_reconciler::entity::{DesiredRecord, Entity, Group, Kind};
//! use pihole_reconciler::reconcilers::{DesiredState, Reconciler};
//! use std::sync::Arc;
//!
//! async fn converge(instances: Vec<Arc<dyn InstanceClient>>) -> anyhow::Result<()> {
//!     let mut desired = DesiredState::new();
//!     desired.insert(
//!         Kind::Group,
//!         vec![DesiredRecord::present(Entity::Group(Group {
//!             name: "IOT".to_string(),
//!             comment: Some("IOT VLAN".to_string()),
//!             enabled: true,
//!         }))],
//!     );
//!
//!     let report = Reconciler::default().reconcile(&instances, &desired).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod differ;
pub mod engine;
pub mod fetcher;
pub mod report;
pub mod resolver;

pub use differ::{Action, DeletionPolicy, Operation};
pub use engine::{DesiredState, ReconcileOptions, Reconciler};
pub use report::{Outcome, ReconciliationResult, RunReport, Summary};
pub use resolver::NameIdMap;
