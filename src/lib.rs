// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # pihole-reconciler - Declarative Pi-hole fleet management
//!
//! pihole-reconciler converges the groups, clients, allow/block lists and
//! local DNS records of any number of Pi-hole v6 instances to one declared
//! desired state, issuing only the create/update/delete calls that are
//! actually needed.
//!
//! ## Overview
//!
//! A reconciliation pass takes desired records per kind plus one
//! [`InstanceClient`](client::InstanceClient) per target instance, and for
//! each instance:
//!
//! - applies kinds in dependency order (groups first, so lists and clients can
//!   reference groups created in the same pass)
//! - resolves group names to the instance's own ids
//! - reads current state, computes the minimal set of actions and applies them
//! - records one result per (instance, kind, key)
//!
//! Failures are isolated: an unreachable instance fails only its own results,
//! and a refused call fails only its own entity.
//!
//! ## Modules
//!
//! - [`entity`] - Desired, resolved and current record types
//! - [`client`] - The instance adapter contract
//! - [`pihole`] - Pi-hole v6 REST adapter
//! - [`reconcilers`] - Resolver, fetcher, differ and the orchestrating engine
//! - [`config`] - YAML fleet configuration
//! - [`errors`] - Error types with stable reason codes
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pihole_reconciler::client::InstanceClient;
//! use pihole_reconciler::entity::{Client, DesiredRecord, Entity, Group, GroupRef, Kind};
//! use pihole_reconciler::pihole::{ConnectionSettings, PiholeClient};
//! use pihole_reconciler::reconcilers::{DesiredState, Reconciler};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let instance: Arc<dyn InstanceClient> = Arc::new(PiholeClient::new(
//!     "pihole-a",
//!     "https://pihole-a.lan".parse()?,
//!     std::env::var("PIHOLE_PASSWORD").ok(),
//!     &ConnectionSettings::default(),
//! )?);
//!
//! let desired = DesiredState::from([
//!     (
//!         Kind::Group,
//!         vec![DesiredRecord::present(Entity::Group(Group {
//!             name: "IOT".to_string(),
//!             comment: Some("IOT VLAN".to_string()),
//!             enabled: true,
//!         }))],
//!     ),
//!     (
//!         Kind::Client,
//!         vec![DesiredRecord::present(Entity::Client(Client {
//!             client: "192.168.2.0/24".to_string(),
//!             comment: None,
//!         }))
//!         .with_groups(vec![GroupRef::Name("IOT".to_string())])],
//!     ),
//! ]);
//!
//! let report = Reconciler::default().reconcile(&[instance], &desired).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod entity;
pub mod errors;
pub mod http_errors;
pub mod metrics;
pub mod pihole;
pub mod reconcilers;
pub mod status_reasons;
