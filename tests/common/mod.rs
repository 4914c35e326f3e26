// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory Pi-hole instance shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use pihole_reconciler::client::{ClientRow, GroupRow, InstanceClient, ListRow, RemoteRecord};
use pihole_reconciler::entity::{
    Client, CurrentRecord, DesiredRecord, DnsRecord, Entity, Field, Group, GroupRef, Kind, List,
    ListType, RecordType, RemoteId, ResolvedRecord,
};
use pihole_reconciler::errors::ClientError;
use pihole_reconciler::pihole::dns::{entry_for, remaining_host_entry};

/// Mutable state of a fake instance.
#[derive(Debug, Default)]
pub struct FakeState {
    pub groups: Vec<GroupRow>,
    pub clients: Vec<ClientRow>,
    pub lists: Vec<ListRow>,
    pub hosts: Vec<String>,
    pub cnames: Vec<String>,
    next_id: u32,
}

/// A fake instance that behaves like a Pi-hole for the calls the engine makes.
///
/// Every call is appended to `calls` as `"<verb> <kind> <key>"`.
pub struct FakeInstance {
    name: String,
    endpoint: String,
    pub state: Mutex<FakeState>,
    pub calls: Mutex<Vec<String>>,
    unreachable: bool,
    failing_creates: HashSet<String>,
    failing_entries: HashSet<String>,
}

impl FakeInstance {
    /// An empty instance holding only the built-in `Default` group.
    pub fn new(name: &str) -> Self {
        let state = FakeState {
            groups: vec![GroupRow {
                id: 0,
                name: "Default".to_string(),
                comment: Some("The default group".to_string()),
                enabled: Some(true),
            }],
            next_id: 1,
            ..FakeState::default()
        };
        Self {
            name: name.to_string(),
            endpoint: format!("http://{name}.test"),
            state: Mutex::new(state),
            calls: Mutex::new(Vec::new()),
            unreachable: false,
            failing_creates: HashSet::new(),
            failing_entries: HashSet::new(),
        }
    }

    /// An instance whose every call fails with a connection error.
    pub fn unreachable(name: &str) -> Self {
        Self {
            unreachable: true,
            ..Self::new(name)
        }
    }

    /// Refuse creates of the entity with this key.
    pub fn failing_create(mut self, key: &str) -> Self {
        self.failing_creates.insert(key.to_string());
        self
    }

    /// Refuse to add this local DNS entry, including when it is the remainder
    /// of a shared host entry being re-added.
    pub fn failing_entry(mut self, entry: &str) -> Self {
        self.failing_entries.insert(entry.to_string());
        self
    }

    pub fn with_group(self, id: u32, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.groups.push(GroupRow {
                id,
                name: name.to_string(),
                comment: None,
                enabled: Some(true),
            });
            state.next_id = state.next_id.max(id + 1);
        }
        self
    }

    pub fn with_client(self, id: u32, address: &str, groups: &[u32]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.clients.push(ClientRow {
                id,
                client: address.to_string(),
                comment: None,
                groups: groups.to_vec(),
            });
            state.next_id = state.next_id.max(id + 1);
        }
        self
    }

    pub fn with_host_entry(self, entry: &str) -> Self {
        self.state.lock().unwrap().hosts.push(entry.to_string());
        self
    }

    pub fn with_cname_entry(self, entry: &str) -> Self {
        self.state.lock().unwrap().cnames.push(entry.to_string());
        self
    }

    pub fn into_arc(self) -> Arc<FakeInstance> {
        Arc::new(self)
    }

    /// Calls that changed state (everything except reads and close).
    pub fn mutations(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| {
                ["create ", "update ", "delete "]
                    .iter()
                    .any(|verb| call.starts_with(verb))
            })
            .cloned()
            .collect()
    }

    pub fn group_id(&self, name: &str) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state.groups.iter().find(|g| g.name == name).map(|g| g.id)
    }

    pub fn group_comment(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .groups
            .iter()
            .find(|g| g.name == name)
            .and_then(|g| g.comment.clone())
    }

    pub fn client_groups(&self, address: &str) -> Option<Vec<u32>> {
        let state = self.state.lock().unwrap();
        state
            .clients
            .iter()
            .find(|c| c.client == address)
            .map(|c| c.groups.clone())
    }

    pub fn client_addresses(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.clients.iter().map(|c| c.client.clone()).collect()
    }

    pub fn host_entries(&self) -> Vec<String> {
        self.state.lock().unwrap().hosts.clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn reachable(&self) -> Result<(), ClientError> {
        if self.unreachable {
            return Err(ClientError::HttpConnectionFailed {
                endpoint: self.endpoint.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn rejected(&self, reason: String) -> ClientError {
        ClientError::Rejected {
            endpoint: self.endpoint.clone(),
            reason,
        }
    }
}

fn ids(record: &ResolvedRecord) -> Option<Vec<u32>> {
    record
        .group_ids
        .as_ref()
        .map(|set| set.iter().copied().collect())
}

fn row_id(target: &CurrentRecord) -> Option<u32> {
    match target.id {
        RemoteId::Row(id) => Some(id),
        RemoteId::Entry(_) => None,
    }
}

#[async_trait]
impl InstanceClient for FakeInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list(&self, kind: Kind) -> Result<Vec<RemoteRecord>, ClientError> {
        self.record(format!("list {kind}"));
        self.reachable()?;
        let state = self.state.lock().unwrap();
        Ok(match kind {
            Kind::Group => state.groups.iter().cloned().map(RemoteRecord::Group).collect(),
            Kind::Client => state.clients.iter().cloned().map(RemoteRecord::Client).collect(),
            Kind::List => state.lists.iter().cloned().map(RemoteRecord::List).collect(),
            Kind::DnsRecord => state
                .hosts
                .iter()
                .cloned()
                .map(RemoteRecord::HostEntry)
                .chain(state.cnames.iter().cloned().map(RemoteRecord::CnameEntry))
                .collect(),
        })
    }

    async fn list_groups(&self) -> Result<Vec<(u32, String)>, ClientError> {
        self.record("list_groups".to_string());
        self.reachable()?;
        let state = self.state.lock().unwrap();
        Ok(state.groups.iter().map(|g| (g.id, g.name.clone())).collect())
    }

    async fn create(&self, record: &ResolvedRecord) -> Result<RemoteId, ClientError> {
        let key = record.key();
        self.record(format!("create {} {key}", record.entity.kind()));
        self.reachable()?;
        if self.failing_creates.contains(&key) {
            return Err(self.rejected(format!("{key}: refused")));
        }

        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        match &record.entity {
            Entity::Group(g) => {
                if state.groups.iter().any(|row| row.name == g.name) {
                    return Err(self.rejected(format!("{}: UNIQUE constraint failed", g.name)));
                }
                state.groups.push(GroupRow {
                    id,
                    name: g.name.clone(),
                    comment: g.comment.clone(),
                    enabled: Some(g.enabled),
                });
            }
            Entity::Client(c) => state.clients.push(ClientRow {
                id,
                client: c.client.clone(),
                comment: c.comment.clone(),
                groups: ids(record).unwrap_or_else(|| vec![0]),
            }),
            Entity::List(l) => state.lists.push(ListRow {
                id,
                address: l.address.clone(),
                list_type: l.list_type.as_str().to_string(),
                comment: l.comment.clone(),
                groups: ids(record).unwrap_or_else(|| vec![0]),
                enabled: Some(l.enabled),
            }),
            Entity::DnsRecord(r) => {
                let entry = entry_for(r);
                match r.record_type {
                    RecordType::Cname => state.cnames.push(entry.clone()),
                    RecordType::A | RecordType::Aaaa => state.hosts.push(entry.clone()),
                }
                return Ok(RemoteId::Entry(entry));
            }
        }
        state.next_id += 1;
        Ok(RemoteId::Row(id))
    }

    async fn update(
        &self,
        target: &CurrentRecord,
        record: &ResolvedRecord,
        _changed: &[Field],
    ) -> Result<(), ClientError> {
        self.record(format!("update {} {}", record.entity.kind(), target.key()));
        self.reachable()?;

        if let (Entity::DnsRecord(_), Entity::DnsRecord(r)) = (&target.entity, &record.entity) {
            self.remove_dns(target)?;
            let entry = entry_for(r);
            if self.failing_entries.contains(&entry) {
                return Err(self.partially_applied(&target.id, &entry));
            }
            let mut state = self.state.lock().unwrap();
            match r.record_type {
                RecordType::Cname => state.cnames.push(entry),
                RecordType::A | RecordType::Aaaa => state.hosts.push(entry),
            }
            return Ok(());
        }

        let id = row_id(target).ok_or_else(|| self.rejected("not a row".to_string()))?;
        let mut state = self.state.lock().unwrap();
        match &record.entity {
            Entity::Group(g) => {
                if let Some(row) = state.groups.iter_mut().find(|row| row.id == id) {
                    row.comment = g.comment.clone();
                    row.enabled = Some(g.enabled);
                }
            }
            Entity::Client(c) => {
                if let Some(row) = state.clients.iter_mut().find(|row| row.id == id) {
                    row.comment = c.comment.clone();
                    if let Some(groups) = ids(record) {
                        row.groups = groups;
                    }
                }
            }
            Entity::List(l) => {
                if let Some(row) = state.lists.iter_mut().find(|row| row.id == id) {
                    row.list_type = l.list_type.as_str().to_string();
                    row.comment = l.comment.clone();
                    row.enabled = Some(l.enabled);
                    if let Some(groups) = ids(record) {
                        row.groups = groups;
                    }
                }
            }
            Entity::DnsRecord(_) => return Err(self.rejected("kind mismatch".to_string())),
        }
        Ok(())
    }

    async fn delete(&self, target: &CurrentRecord) -> Result<(), ClientError> {
        self.record(format!("delete {} {}", target.entity.kind(), target.key()));
        self.reachable()?;

        if let Entity::DnsRecord(_) = target.entity {
            return self.remove_dns(target);
        }

        let id = row_id(target).ok_or_else(|| self.rejected("not a row".to_string()))?;
        let mut state = self.state.lock().unwrap();
        state.groups.retain(|row| row.id != id);
        state.clients.retain(|row| row.id != id);
        state.lists.retain(|row| row.id != id);
        Ok(())
    }

    async fn close(&self) {
        self.record("close".to_string());
    }
}

impl FakeInstance {
    /// Remove the entry behind `target` the way Pi-hole does: the entry must
    /// exist verbatim, and sibling hosts are re-added as a new entry.
    fn remove_dns(&self, target: &CurrentRecord) -> Result<(), ClientError> {
        let (Entity::DnsRecord(current), RemoteId::Entry(entry)) = (&target.entity, &target.id)
        else {
            return Err(self.rejected("not a local DNS entry".to_string()));
        };
        let mut state = self.state.lock().unwrap();
        let entries = match current.record_type {
            RecordType::Cname => &mut state.cnames,
            RecordType::A | RecordType::Aaaa => &mut state.hosts,
        };
        let Some(position) = entries.iter().position(|e| e == entry) else {
            return Err(ClientError::NotFound {
                endpoint: self.endpoint.clone(),
                resource: entry.clone(),
            });
        };
        entries.remove(position);

        if current.record_type != RecordType::Cname {
            if let Some(remaining) = remaining_host_entry(entry, &current.name) {
                if self.failing_entries.contains(&remaining) {
                    return Err(self.partially_applied(&target.id, &remaining));
                }
                entries.push(remaining);
            }
        }
        Ok(())
    }

    fn partially_applied(&self, removed: &RemoteId, refused: &str) -> ClientError {
        ClientError::PartiallyApplied {
            completed: format!("old entry removed: {removed}"),
            cause: Box::new(self.rejected(format!("{refused}: refused"))),
        }
    }
}

// ============================================================================
// Desired record builders
// ============================================================================

pub fn group(name: &str, comment: Option<&str>) -> DesiredRecord {
    DesiredRecord::present(Entity::Group(Group {
        name: name.to_string(),
        comment: comment.map(str::to_string),
        enabled: true,
    }))
}

pub fn absent_group(name: &str) -> DesiredRecord {
    DesiredRecord::absent(Entity::Group(Group {
        name: name.to_string(),
        comment: None,
        enabled: true,
    }))
}

pub fn client(address: &str, groups: &[&str]) -> DesiredRecord {
    DesiredRecord::present(Entity::Client(Client {
        client: address.to_string(),
        comment: None,
    }))
    .with_groups(names(groups))
}

pub fn absent_client(address: &str) -> DesiredRecord {
    DesiredRecord::absent(Entity::Client(Client {
        client: address.to_string(),
        comment: None,
    }))
}

pub fn block_list(address: &str, groups: &[&str]) -> DesiredRecord {
    DesiredRecord::present(Entity::List(List {
        address: address.to_string(),
        list_type: ListType::Block,
        comment: None,
        enabled: true,
    }))
    .with_groups(names(groups))
}

pub fn a_record(name: &str, ip: &str) -> DesiredRecord {
    DesiredRecord::present(Entity::DnsRecord(DnsRecord {
        name: name.to_string(),
        record_type: RecordType::A,
        data: ip.to_string(),
        ttl: None,
    }))
}

pub fn absent_a_record(name: &str, ip: &str) -> DesiredRecord {
    DesiredRecord::absent(Entity::DnsRecord(DnsRecord {
        name: name.to_string(),
        record_type: RecordType::A,
        data: ip.to_string(),
        ttl: None,
    }))
}

fn names(groups: &[&str]) -> Vec<GroupRef> {
    groups
        .iter()
        .map(|g| GroupRef::Name((*g).to_string()))
        .collect()
}

/// Erase fakes into the handles the engine takes.
pub fn handles(instances: &[Arc<FakeInstance>]) -> Vec<Arc<dyn InstanceClient>> {
    instances
        .iter()
        .map(|i| Arc::clone(i) as Arc<dyn InstanceClient>)
        .collect()
}
