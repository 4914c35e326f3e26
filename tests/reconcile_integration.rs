// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end reconciliation tests against in-memory instances.
//!
//! Run with: cargo test --test reconcile_integration

mod common;

use common::{
    a_record, absent_a_record, absent_client, absent_group, block_list, client, group, handles,
    FakeInstance,
};
use pihole_reconciler::config::FleetConfig;
use pihole_reconciler::entity::{Field, GroupRef, Kind};
use pihole_reconciler::errors::{ClientError, EntityError};
use pihole_reconciler::reconcilers::{
    DeletionPolicy, DesiredState, Outcome, ReconcileOptions, Reconciler,
};

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_iot_scenario_on_empty_instance() {
    let x = FakeInstance::new("pihole-x").into_arc();
    let desired = DesiredState::from([
        (Kind::Group, vec![group("IOT", Some("IOT VLAN"))]),
        (Kind::Client, vec![client("192.168.2.0/24", &["IOT"])]),
    ]);

    let report = Reconciler::default()
        .reconcile(&handles(&[x.clone()]), &desired)
        .await
        .unwrap();

    let outcomes: Vec<(Kind, &str, &Outcome)> = report
        .results
        .iter()
        .map(|r| (r.kind, r.key.as_str(), &r.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (Kind::Group, "IOT", &Outcome::Created),
            (Kind::Client, "192.168.2.0/24", &Outcome::Created),
        ]
    );

    let iot = x.group_id("IOT").expect("group IOT should exist");
    assert_ne!(iot, 0);
    assert_eq!(x.client_groups("192.168.2.0/24"), Some(vec![iot]));
    assert_eq!(
        x.mutations(),
        vec!["create group IOT", "create client 192.168.2.0/24"]
    );
}

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let a = FakeInstance::new("pihole-a").into_arc();
    let desired = DesiredState::from([
        (Kind::Group, vec![group("IOT", Some("IOT VLAN")), group("Kids", None)]),
        (Kind::DnsRecord, vec![a_record("nas.lan", "192.168.1.10")]),
        (
            Kind::List,
            vec![block_list("https://example.com/block.txt", &["Kids", "Default"])],
        ),
        (Kind::Client, vec![client("192.168.2.0/24", &["IOT"])]),
    ]);
    let reconciler = Reconciler::default();

    let first = reconciler.reconcile(&handles(&[a.clone()]), &desired).await.unwrap();
    assert_eq!(first.summary.created, 5);
    let mutations_after_first = a.mutations().len();

    let second = reconciler.reconcile(&handles(&[a.clone()]), &desired).await.unwrap();
    assert_eq!(second.results.len(), 5);
    assert!(second
        .results
        .iter()
        .all(|r| r.outcome == Outcome::Unchanged));
    assert_eq!(a.mutations().len(), mutations_after_first);
}

#[tokio::test]
async fn test_unreachable_instance_is_isolated() {
    let a = FakeInstance::new("pihole-a").into_arc();
    let b = FakeInstance::unreachable("pihole-b").into_arc();
    let desired = DesiredState::from([
        (Kind::Group, vec![group("IOT", None)]),
        (Kind::Client, vec![client("10.0.0.5", &["IOT"])]),
    ]);

    let report = Reconciler::default()
        .reconcile(&handles(&[a.clone(), b.clone()]), &desired)
        .await
        .unwrap();

    assert!(report
        .for_instance("pihole-a")
        .all(|r| r.outcome == Outcome::Created));

    let b_results: Vec<_> = report.for_instance("pihole-b").collect();
    assert_eq!(b_results.len(), 2);
    assert!(matches!(
        b_results[0].outcome,
        Outcome::Failed(EntityError::FetchFailed { .. })
    ));
    assert!(matches!(
        b_results[1].outcome,
        Outcome::Failed(EntityError::ResolveFailed { .. })
    ));
    assert!(b_results.iter().all(|r| r.error().unwrap().is_transient()));
    assert!(b.mutations().is_empty());
    assert_eq!(report.summary.failed, 2);
}

#[tokio::test]
async fn test_duplicate_keys_last_one_wins() {
    let a = FakeInstance::new("pihole-a").into_arc();
    let desired = DesiredState::from([(
        Kind::Group,
        vec![
            group("IOT", Some("first")),
            group("Kids", None),
            group("IOT", Some("second")),
        ],
    )]);

    let report = Reconciler::default()
        .reconcile(&handles(&[a.clone()]), &desired)
        .await
        .unwrap();

    assert_eq!(a.group_comment("IOT").as_deref(), Some("second"));
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].key, "IOT");
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].key, "IOT");
}

#[tokio::test]
async fn test_one_failed_create_leaves_others_created() {
    let a = FakeInstance::new("pihole-a")
        .failing_create("10.0.0.6")
        .into_arc();
    let desired = DesiredState::from([(
        Kind::Client,
        vec![
            client("10.0.0.5", &[]),
            client("10.0.0.6", &[]),
            client("10.0.0.7", &[]),
        ],
    )]);

    let report = Reconciler::default()
        .reconcile(&handles(&[a.clone()]), &desired)
        .await
        .unwrap();

    assert_eq!(report.summary.created, 2);
    assert_eq!(report.summary.failed, 1);
    let failed = report.find("pihole-a", Kind::Client, "10.0.0.6").unwrap();
    assert!(matches!(
        &failed.outcome,
        Outcome::Failed(EntityError::ApplyFailed { operation, .. })
            if operation.to_string() == "create"
    ));
    let mut addresses = a.client_addresses();
    addresses.sort();
    assert_eq!(addresses, vec!["10.0.0.5", "10.0.0.7"]);
}

#[tokio::test]
async fn test_unmentioned_entities_are_untouched() {
    let a = FakeInstance::new("pihole-a")
        .with_group(4, "Guests")
        .with_group(5, "Legacy")
        .with_client(10, "10.0.0.50", &[0])
        .into_arc();
    let desired = DesiredState::from([
        (Kind::Group, vec![group("IOT", None), absent_group("Guests")]),
        (Kind::Client, vec![client("10.0.0.5", &["IOT"])]),
    ]);

    let report = Reconciler::default()
        .reconcile(&handles(&[a.clone()]), &desired)
        .await
        .unwrap();

    assert_eq!(report.find("pihole-a", Kind::Group, "Guests").unwrap().outcome, Outcome::Deleted);
    assert_eq!(a.group_id("Guests"), None);
    assert_eq!(a.group_id("Legacy"), Some(5));
    assert_eq!(a.client_groups("10.0.0.50"), Some(vec![0]));
    assert!(!a.mutations().iter().any(|m| m.contains("Legacy") || m.contains("10.0.0.50")));
}

#[tokio::test]
async fn test_absent_record_with_unknown_group_is_deleted() {
    let a = FakeInstance::new("pihole-a")
        .with_client(10, "10.0.0.50", &[0])
        .into_arc();
    let desired = DesiredState::from([(
        Kind::Client,
        vec![absent_client("10.0.0.50").with_groups(vec![GroupRef::Name("Missing".to_string())])],
    )]);

    let report = Reconciler::default()
        .reconcile(&handles(&[a.clone()]), &desired)
        .await
        .unwrap();

    assert_eq!(report.results[0].outcome, Outcome::Deleted);
    assert!(a.client_addresses().is_empty());
}

#[tokio::test]
async fn test_membership_drift_is_updated() {
    let a = FakeInstance::new("pihole-a")
        .with_group(3, "IOT")
        .with_client(10, "192.168.2.0/24", &[0])
        .into_arc();
    let desired = DesiredState::from([(Kind::Client, vec![client("192.168.2.0/24", &["IOT"])])]);

    let report = Reconciler::default()
        .reconcile(&handles(&[a.clone()]), &desired)
        .await
        .unwrap();

    assert_eq!(report.results[0].outcome, Outcome::Updated(vec![Field::Groups]));
    assert_eq!(a.client_groups("192.168.2.0/24"), Some(vec![3]));
}

// ============================================================================
// Local DNS
// ============================================================================

#[tokio::test]
async fn test_dns_change_keeps_sibling_host() {
    let a = FakeInstance::new("pihole-a")
        .with_host_entry("192.168.1.10 nas.lan files.lan")
        .into_arc();
    let desired = DesiredState::from([(Kind::DnsRecord, vec![a_record("nas.lan", "192.168.1.11")])]);

    let report = Reconciler::default()
        .reconcile(&handles(&[a.clone()]), &desired)
        .await
        .unwrap();

    assert_eq!(report.results[0].outcome, Outcome::Updated(vec![Field::Data]));
    let mut hosts = a.host_entries();
    hosts.sort();
    assert_eq!(hosts, vec!["192.168.1.10 files.lan", "192.168.1.11 nas.lan"]);
}

/// Both host orders, once sequential and once with room for concurrency.
fn shared_entry_runs() -> Vec<([&'static str; 2], usize)> {
    let orders = [["nas.lan", "files.lan"], ["files.lan", "nas.lan"]];
    orders
        .into_iter()
        .flat_map(|order| [1, 8].map(|max| (order, max)))
        .collect()
}

fn with_max_actions(max_concurrent_actions: usize) -> Reconciler {
    Reconciler::new(ReconcileOptions {
        max_concurrent_actions,
        ..ReconcileOptions::default()
    })
}

#[tokio::test]
async fn test_removing_every_host_of_a_shared_entry() {
    for (order, max) in shared_entry_runs() {
        let a = FakeInstance::new("pihole-a")
            .with_host_entry("10.0.0.5 nas.lan files.lan")
            .into_arc();
        let desired = DesiredState::from([(
            Kind::DnsRecord,
            order.iter().map(|name| absent_a_record(name, "10.0.0.5")).collect(),
        )]);

        let report = with_max_actions(max)
            .reconcile(&handles(&[a.clone()]), &desired)
            .await
            .unwrap();

        for result in &report.results {
            assert_eq!(result.outcome, Outcome::Deleted, "{order:?} with {max}: {}", result.key);
        }
        assert!(a.host_entries().is_empty(), "{order:?} with {max}: {:?}", a.host_entries());
    }
}

#[tokio::test]
async fn test_removing_two_hosts_keeps_the_third() {
    for (order, max) in shared_entry_runs() {
        let a = FakeInstance::new("pihole-a")
            .with_host_entry("10.0.0.5 nas.lan files.lan media.lan")
            .into_arc();
        let desired = DesiredState::from([(
            Kind::DnsRecord,
            order.iter().map(|name| absent_a_record(name, "10.0.0.5")).collect(),
        )]);

        let report = with_max_actions(max)
            .reconcile(&handles(&[a.clone()]), &desired)
            .await
            .unwrap();

        assert!(!report.has_failures(), "{order:?} with {max}: {report}");
        assert_eq!(a.host_entries(), vec!["10.0.0.5 media.lan"], "{order:?} with {max}");
    }
}

#[tokio::test]
async fn test_changing_two_hosts_of_a_shared_entry() {
    for (order, max) in shared_entry_runs() {
        let a = FakeInstance::new("pihole-a")
            .with_host_entry("10.0.0.5 nas.lan files.lan")
            .into_arc();
        let desired = DesiredState::from([(
            Kind::DnsRecord,
            order.iter().map(|name| a_record(name, "10.0.0.6")).collect(),
        )]);

        let report = with_max_actions(max)
            .reconcile(&handles(&[a.clone()]), &desired)
            .await
            .unwrap();

        for result in &report.results {
            assert_eq!(
                result.outcome,
                Outcome::Updated(vec![Field::Data]),
                "{order:?} with {max}: {}",
                result.key
            );
        }
        let mut hosts = a.host_entries();
        hosts.sort();
        assert_eq!(hosts, vec!["10.0.0.6 files.lan", "10.0.0.6 nas.lan"], "{order:?} with {max}");

        let second = with_max_actions(max)
            .reconcile(&handles(&[a.clone()]), &desired)
            .await
            .unwrap();
        assert_eq!(second.summary.unchanged, 2, "{order:?} with {max}");
    }
}

#[tokio::test]
async fn test_changing_one_host_and_removing_another() {
    for max in [1, 8] {
        let a = FakeInstance::new("pihole-a")
            .with_host_entry("10.0.0.5 nas.lan files.lan media.lan")
            .into_arc();
        let desired = DesiredState::from([(
            Kind::DnsRecord,
            vec![
                absent_a_record("files.lan", "10.0.0.5"),
                a_record("nas.lan", "10.0.0.6"),
            ],
        )]);

        let report = with_max_actions(max)
            .reconcile(&handles(&[a.clone()]), &desired)
            .await
            .unwrap();

        assert!(!report.has_failures(), "with {max}: {report}");
        let mut hosts = a.host_entries();
        hosts.sort();
        assert_eq!(hosts, vec!["10.0.0.5 media.lan", "10.0.0.6 nas.lan"], "with {max}");
    }
}

#[tokio::test]
async fn test_failed_readd_skips_rest_of_shared_entry() {
    let a = FakeInstance::new("pihole-a")
        .with_host_entry("10.0.0.5 nas.lan files.lan media.lan")
        .failing_entry("10.0.0.5 files.lan media.lan")
        .into_arc();
    let desired = DesiredState::from([(
        Kind::DnsRecord,
        vec![
            absent_a_record("nas.lan", "10.0.0.5"),
            absent_a_record("files.lan", "10.0.0.5"),
        ],
    )]);

    let report = with_max_actions(8)
        .reconcile(&handles(&[a.clone()]), &desired)
        .await
        .unwrap();

    let Outcome::Failed(first) = &report.results[0].outcome else {
        panic!("expected a failure, got {:?}", report.results[0].outcome);
    };
    assert!(matches!(
        first,
        EntityError::ApplyFailed {
            cause: ClientError::PartiallyApplied { .. },
            ..
        }
    ));
    assert!(first.to_string().contains("old entry removed"), "{first}");

    let Outcome::Failed(second) = &report.results[1].outcome else {
        panic!("expected a skip, got {:?}", report.results[1].outcome);
    };
    assert!(matches!(second, EntityError::Skipped { .. }), "{second}");
    assert!(second.is_transient());

    // Only the first delete reached the instance.
    assert_eq!(a.mutations().len(), 1, "{:?}", a.mutations());
}

#[tokio::test]
async fn test_retain_policy_keeps_absent_dns_record() {
    let a = FakeInstance::new("pihole-a")
        .with_host_entry("192.168.1.10 nas.lan")
        .into_arc();
    let desired = DesiredState::from([(
        Kind::DnsRecord,
        vec![absent_a_record("nas.lan", "192.168.1.10")],
    )]);
    let mut options = ReconcileOptions::default();
    options.deletion.insert(Kind::DnsRecord, DeletionPolicy::Retain);

    let report = Reconciler::new(options)
        .reconcile(&handles(&[a.clone()]), &desired)
        .await
        .unwrap();

    assert_eq!(report.results[0].outcome, Outcome::Unchanged);
    assert_eq!(a.host_entries(), vec!["192.168.1.10 nas.lan"]);
}

#[tokio::test]
async fn test_prune_policy_removes_unmentioned_clients() {
    let a = FakeInstance::new("pihole-a")
        .with_client(10, "10.0.0.50", &[0])
        .with_client(11, "10.0.0.5", &[0])
        .into_arc();
    let desired = DesiredState::from([(Kind::Client, vec![client("10.0.0.5", &["Default"])])]);
    let mut options = ReconcileOptions::default();
    options.deletion.insert(Kind::Client, DeletionPolicy::Prune);

    let report = Reconciler::new(options)
        .reconcile(&handles(&[a.clone()]), &desired)
        .await
        .unwrap();

    let outcomes: Vec<(&str, &Outcome)> = report
        .results
        .iter()
        .map(|r| (r.key.as_str(), &r.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![("10.0.0.5", &Outcome::Unchanged), ("10.0.0.50", &Outcome::Deleted)]
    );
    assert_eq!(a.client_addresses(), vec!["10.0.0.5"]);
}

// ============================================================================
// Dry run
// ============================================================================

#[tokio::test]
async fn test_dry_run_reports_without_changing_anything() {
    let a = FakeInstance::new("pihole-a")
        .with_group(3, "Legacy")
        .with_client(10, "10.0.0.50", &[3])
        .with_host_entry("10.0.0.5 nas.lan files.lan")
        .into_arc();
    let desired = DesiredState::from([
        (Kind::Group, vec![group("IOT", None), absent_group("Legacy")]),
        (
            Kind::DnsRecord,
            vec![
                a_record("nas.lan", "10.0.0.6"),
                absent_a_record("files.lan", "10.0.0.5"),
            ],
        ),
        (
            Kind::Client,
            vec![client("192.168.2.0/24", &["IOT"]), absent_client("10.0.0.50")],
        ),
    ]);
    let options = ReconcileOptions {
        dry_run: true,
        ..ReconcileOptions::default()
    };

    let report = Reconciler::new(options)
        .reconcile(&handles(&[a.clone()]), &desired)
        .await
        .unwrap();

    assert!(report.dry_run);
    assert!(!report.has_failures(), "{report}");
    let outcomes: Vec<(&str, &Outcome)> = report
        .results
        .iter()
        .map(|r| (r.key.as_str(), &r.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("IOT", &Outcome::Created),
            ("Legacy", &Outcome::Deleted),
            ("nas.lan/A", &Outcome::Updated(vec![Field::Data])),
            ("files.lan/A", &Outcome::Deleted),
            ("192.168.2.0/24", &Outcome::Created),
            ("10.0.0.50", &Outcome::Deleted),
        ]
    );
    assert!(a.mutations().is_empty(), "{:?}", a.mutations());
    assert_eq!(a.group_id("IOT"), None);
    assert_eq!(a.host_entries(), vec!["10.0.0.5 nas.lan files.lan"]);
}

// ============================================================================
// Configuration to engine
// ============================================================================

#[tokio::test]
async fn test_configuration_drives_a_pass() {
    let config = FleetConfig::from_yaml(
        "fleet.yaml",
        r"
instances:
  - name: pihole-a
    url: http://pihole-a.lan
options:
  max_concurrent_actions: 1
  deletion: { group: retain }
groups:
  - { name: IOT, comment: IOT VLAN }
  - { name: Legacy, state: absent }
clients:
  - { client: 192.168.2.0/24, groups: [IOT] }
",
    )
    .unwrap();
    config.validate_with(|_| None).unwrap();

    let a = FakeInstance::new("pihole-a").with_group(9, "Legacy").into_arc();
    let report = Reconciler::new(config.reconcile_options())
        .reconcile(&handles(&[a.clone()]), &config.desired_state())
        .await
        .unwrap();

    assert!(!report.has_failures(), "{report}");
    assert_eq!(a.group_id("Legacy"), Some(9));
    let iot = a.group_id("IOT").unwrap();
    assert_eq!(a.client_groups("192.168.2.0/24"), Some(vec![iot]));
}
