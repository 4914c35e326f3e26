// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Fleet configuration file.
//!
//! A configuration file names the instances to manage, tunes the engine and
//! declares desired state for each kind:
//!
//! ```yaml
//! instances:
//!   - name: pihole-a
//!     url: https://pihole-a.lan
//!     password_env: PIHOLE_A_PASSWORD
//! options:
//!   max_concurrent_instances: 4
//!   deletion: { dns_record: retain }
//! groups:
//!   - { name: IOT, comment: IOT VLAN }
//! clients:
//!   - { client: 192.168.2.0/24, groups: [IOT] }
//! lists:
//!   - { address: https://example.com/block.txt, type: block, groups: [IOT, 0] }
//! dns_records:
//!   - { name: nas.lan, type: A, data: 192.168.1.10 }
//! ```
//!
//! Further desired-state documents (the kind sections only) can be layered
//! on top with [`FleetConfig::layer`]. Records are concatenated in file
//! order, so a later file wins when it repeats a key.
//!
//! Passwords never appear in the file; each instance names the environment
//! variable that holds its password.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::client::InstanceClient;
use crate::constants::{
    DEFAULT_MAX_CONCURRENT_ACTIONS, DEFAULT_MAX_CONCURRENT_INSTANCES, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::entity::{
    Client, DesiredRecord, DnsRecord, Entity, Group, GroupRef, Kind, List, Presence, RecordType,
};
use crate::errors::ConfigError;
use crate::pihole::{ConnectionSettings, PiholeClient};
use crate::reconcilers::{DeletionPolicy, DesiredState, ReconcileOptions};

// ============================================================================
// Document types
// ============================================================================

/// One managed instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Unique name used in logs and reports.
    pub name: String,

    /// Base URL of the web interface, e.g. `https://pihole-a.lan`.
    pub url: String,

    /// Environment variable holding the password. Omit for instances without
    /// a password.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Accept self-signed TLS certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

const fn default_max_concurrent_instances() -> usize {
    DEFAULT_MAX_CONCURRENT_INSTANCES
}

const fn default_max_concurrent_actions() -> usize {
    DEFAULT_MAX_CONCURRENT_ACTIONS
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Engine and transport options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionsConfig {
    #[serde(default = "default_max_concurrent_instances")]
    pub max_concurrent_instances: usize,

    #[serde(default = "default_max_concurrent_actions")]
    pub max_concurrent_actions: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Per-kind deletion policy, e.g. `{ dns_record: retain }`.
    #[serde(default)]
    pub deletion: BTreeMap<Kind, DeletionPolicy>,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_instances: DEFAULT_MAX_CONCURRENT_INSTANCES,
            max_concurrent_actions: DEFAULT_MAX_CONCURRENT_ACTIONS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            deletion: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    #[serde(flatten)]
    pub group: Group,
    #[serde(default)]
    pub state: Presence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    #[serde(flatten)]
    pub client: Client,
    /// Group names or ids. Omit to leave membership unmanaged.
    #[serde(default)]
    pub groups: Option<Vec<GroupRef>>,
    #[serde(default)]
    pub state: Presence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    #[serde(flatten)]
    pub list: List,
    #[serde(default)]
    pub groups: Option<Vec<GroupRef>>,
    #[serde(default)]
    pub state: Presence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordEntry {
    #[serde(flatten)]
    pub record: DnsRecord,
    #[serde(default)]
    pub state: Presence,
}

/// Desired state, one section per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredDocument {
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
    #[serde(default)]
    pub clients: Vec<ClientEntry>,
    #[serde(default)]
    pub lists: Vec<ListEntry>,
    #[serde(default)]
    pub dns_records: Vec<DnsRecordEntry>,
}

impl DesiredDocument {
    /// Append every section of `other` after this document's records.
    pub fn extend(&mut self, other: DesiredDocument) {
        self.groups.extend(other.groups);
        self.clients.extend(other.clients);
        self.lists.extend(other.lists);
        self.dns_records.extend(other.dns_records);
    }

    /// Desired records keyed by kind, in document order.
    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        let mut state = DesiredState::new();

        let groups = self
            .groups
            .iter()
            .map(|e| DesiredRecord::new(Entity::Group(e.group.clone()), e.state))
            .collect::<Vec<_>>();
        let dns_records = self
            .dns_records
            .iter()
            .map(|e| DesiredRecord::new(Entity::DnsRecord(e.record.clone()), e.state))
            .collect::<Vec<_>>();
        let lists = self
            .lists
            .iter()
            .map(|e| with_refs(Entity::List(e.list.clone()), e.state, e.groups.as_ref()))
            .collect::<Vec<_>>();
        let clients = self
            .clients
            .iter()
            .map(|e| with_refs(Entity::Client(e.client.clone()), e.state, e.groups.as_ref()))
            .collect::<Vec<_>>();

        for (kind, records) in [
            (Kind::Group, groups),
            (Kind::DnsRecord, dns_records),
            (Kind::List, lists),
            (Kind::Client, clients),
        ] {
            if !records.is_empty() {
                state.insert(kind, records);
            }
        }
        state
    }

    /// Check every record for problems the instances would reject anyway.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::EmptyKey`] or
    /// [`ConfigError::InvalidRecord`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, entry) in self.groups.iter().enumerate() {
            require_key(Kind::Group, index, &entry.group.name)?;
        }
        for (index, entry) in self.clients.iter().enumerate() {
            require_key(Kind::Client, index, &entry.client.client)?;
        }
        for (index, entry) in self.lists.iter().enumerate() {
            require_key(Kind::List, index, &entry.list.address)?;
        }
        for (index, entry) in self.dns_records.iter().enumerate() {
            require_key(Kind::DnsRecord, index, &entry.record.name)?;
            validate_dns_record(&entry.record)?;
        }
        Ok(())
    }
}

fn with_refs(entity: Entity, state: Presence, refs: Option<&Vec<GroupRef>>) -> DesiredRecord {
    let record = DesiredRecord::new(entity, state);
    match refs {
        Some(refs) => record.with_groups(refs.clone()),
        None => record,
    }
}

fn require_key(kind: Kind, index: usize, key: &str) -> Result<(), ConfigError> {
    if key.trim().is_empty() {
        return Err(ConfigError::EmptyKey { kind, index });
    }
    Ok(())
}

fn validate_dns_record(record: &DnsRecord) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidRecord {
        kind: Kind::DnsRecord,
        key: format!("{}/{}", record.name, record.record_type),
        reason,
    };

    let data = record.data.trim();
    match record.record_type {
        RecordType::A if data.parse::<Ipv4Addr>().is_err() => {
            Err(invalid(format!("'{data}' is not an IPv4 address")))
        }
        RecordType::Aaaa if data.parse::<Ipv6Addr>().is_err() => {
            Err(invalid(format!("'{data}' is not an IPv6 address")))
        }
        RecordType::A | RecordType::Aaaa if record.ttl.is_some() => {
            Err(invalid("only CNAME records carry a TTL".to_string()))
        }
        RecordType::Cname if data.is_empty() => Err(invalid("CNAME target is empty".to_string())),
        _ => Ok(()),
    }
}

// ============================================================================
// Fleet configuration
// ============================================================================

/// Instances, options and desired state, as loaded from a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,

    #[serde(default)]
    pub options: OptionsConfig,

    #[serde(flatten)]
    pub desired: DesiredDocument,
}

impl FleetConfig {
    /// Parse a fleet configuration from YAML text.
    ///
    /// `origin` names the source in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid document.
    pub fn from_yaml(origin: &str, text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Read and parse a fleet configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read(path)?;
        let config = Self::from_yaml(&path.display().to_string(), &text)?;
        debug!(
            path = %path.display(),
            instances = config.instances.len(),
            "Loaded fleet configuration"
        );
        Ok(config)
    }

    /// Append the desired state of an additional document.
    pub fn layer(&mut self, extra: DesiredDocument) {
        self.desired.extend(extra);
    }

    /// Validate instances and records, reading passwords from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with(|variable| std::env::var(variable).ok())
    }

    /// Validate instances and records, looking up password variables with `env`.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate_with<F>(&self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.instances.is_empty() {
            return Err(ConfigError::NoInstances);
        }

        let mut seen = HashSet::new();
        for (index, instance) in self.instances.iter().enumerate() {
            if instance.name.trim().is_empty() {
                return Err(ConfigError::EmptyInstanceName(index));
            }
            if !seen.insert(instance.name.as_str()) {
                return Err(ConfigError::DuplicateInstance(instance.name.clone()));
            }
            parse_url(instance)?;
            password(instance, &env)?;
        }

        self.desired.validate()
    }

    /// Engine options from the `options` section.
    #[must_use]
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            max_concurrent_instances: self.options.max_concurrent_instances,
            max_concurrent_actions: self.options.max_concurrent_actions,
            deletion: self.options.deletion.clone(),
            dry_run: false,
        }
    }

    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        self.desired.desired_state()
    }

    /// Transport settings for one instance.
    #[must_use]
    pub fn connection_settings(&self, instance: &InstanceConfig) -> ConnectionSettings {
        ConnectionSettings {
            timeout: Duration::from_secs(self.options.request_timeout_secs),
            accept_invalid_certs: instance.accept_invalid_certs,
        }
    }

    /// Create a client for each selected instance, in configuration order.
    ///
    /// An empty `only` selects every instance.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownInstance`] for a selection that is not
    /// configured, or the instance's URL, password or client error.
    pub fn build_clients(&self, only: &[String]) -> Result<Vec<Arc<dyn InstanceClient>>, ConfigError> {
        self.build_clients_with(only, |variable| std::env::var(variable).ok())
    }

    /// [`build_clients`](Self::build_clients) with an explicit password lookup.
    ///
    /// # Errors
    ///
    /// See [`build_clients`](Self::build_clients).
    pub fn build_clients_with<F>(
        &self,
        only: &[String],
        env: F,
    ) -> Result<Vec<Arc<dyn InstanceClient>>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for name in only {
            if !self.instances.iter().any(|i| &i.name == name) {
                return Err(ConfigError::UnknownInstance(name.clone()));
            }
        }

        self.instances
            .iter()
            .filter(|instance| only.is_empty() || only.contains(&instance.name))
            .map(|instance| {
                let url = parse_url(instance)?;
                let password = password(instance, &env)?;
                let client = PiholeClient::new(
                    &instance.name,
                    url,
                    password,
                    &self.connection_settings(instance),
                )
                .map_err(|cause| ConfigError::Client {
                    name: instance.name.clone(),
                    cause,
                })?;
                Ok(Arc::new(client) as Arc<dyn InstanceClient>)
            })
            .collect()
    }
}

/// Read and parse an additional desired-state document.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
pub fn load_desired(path: &Path) -> Result<DesiredDocument, ConfigError> {
    let text = read(path)?;
    serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn parse_url(instance: &InstanceConfig) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        name: instance.name.clone(),
        url: instance.url.clone(),
        reason,
    };

    let url = Url::parse(&instance.url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn password<F>(instance: &InstanceConfig, env: &F) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(variable) = instance.password_env.as_deref() else {
        return Ok(None);
    };
    env(variable)
        .map(Some)
        .ok_or_else(|| ConfigError::MissingPassword {
            name: instance.name.clone(),
            variable: variable.to_string(),
        })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
