// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use crate::entity::Kind;
    use crate::errors::{ClientError, ConfigConflict, EntityError, ReconcileError};
    use crate::reconcilers::differ::Operation;

    fn connection_error() -> ClientError {
        ClientError::HttpConnectionFailed {
            endpoint: "https://pihole-b.lan".to_string(),
            reason: "connection refused".to_string(),
        }
    }

    // =====================================================
    // ClientError
    // =====================================================

    #[test]
    fn test_client_error_transient_classification() {
        assert!(connection_error().is_transient());
        assert!(ClientError::HttpRequestTimeout {
            endpoint: "https://pihole-b.lan".to_string(),
            timeout_ms: 30_000,
        }
        .is_transient());
        assert!(!ClientError::AuthenticationFailed {
            endpoint: "https://pihole-b.lan".to_string(),
            reason: "password incorrect".to_string(),
        }
        .is_transient());
        assert!(!ClientError::Rejected {
            endpoint: "https://pihole-b.lan".to_string(),
            reason: "UNIQUE constraint failed".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_client_error_timeout_message() {
        let err = ClientError::HttpRequestTimeout {
            endpoint: "https://pihole-b.lan".to_string(),
            timeout_ms: 1500,
        };
        assert_eq!(
            err.to_string(),
            "HTTP request to https://pihole-b.lan timed out after 1500ms"
        );
        assert_eq!(err.reason(), "HttpRequestTimeout");
    }

    // =====================================================
    // EntityError
    // =====================================================

    #[test]
    fn test_unresolved_reference_message_and_reason() {
        let err = EntityError::UnresolvedReference {
            instance: "pihole-a".to_string(),
            kind: Kind::Client,
            key: "192.168.2.0/24".to_string(),
            reference: "IOT".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "group 'IOT' referenced by client '192.168.2.0/24' does not exist on pihole-a"
        );
        assert_eq!(err.reason(), "UnresolvedReference");
        assert!(err.cause().is_none());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_fetch_failed_inherits_transience_from_cause() {
        let err = EntityError::FetchFailed {
            instance: "pihole-b".to_string(),
            kind: Kind::Group,
            cause: connection_error(),
        };
        assert_eq!(err.reason(), "FetchFailed");
        assert!(err.is_transient());
        assert!(err.to_string().contains("failed to fetch group state from pihole-b"));
    }

    #[test]
    fn test_apply_failed_message_names_operation() {
        let err = EntityError::ApplyFailed {
            instance: "pihole-a".to_string(),
            kind: Kind::List,
            key: "https://example.com/list.txt".to_string(),
            operation: Operation::Update,
            cause: ClientError::Rejected {
                endpoint: "https://pihole-a.lan".to_string(),
                reason: "invalid type".to_string(),
            },
        };
        let message = err.to_string();
        assert!(message.starts_with("failed to update list 'https://example.com/list.txt'"));
        assert_eq!(err.reason(), "ApplyFailed");
        assert_eq!(err.cause().map(ClientError::reason), Some("RequestRejected"));
    }

    #[test]
    fn test_partially_applied_keeps_cause() {
        let err = ClientError::PartiallyApplied {
            completed: "old entry removed: \"10.0.0.5 nas.lan files.lan\"".to_string(),
            cause: Box::new(connection_error()),
        };
        assert_eq!(err.reason(), "PartiallyApplied");
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "HTTP connection to https://pihole-b.lan failed: connection refused \
             (old entry removed: \"10.0.0.5 nas.lan files.lan\")"
        );

        let rejected = ClientError::PartiallyApplied {
            completed: "old entry removed: \"10.0.0.5 nas.lan\"".to_string(),
            cause: Box::new(ClientError::Rejected {
                endpoint: "https://pihole-a.lan".to_string(),
                reason: "Invalid IP address".to_string(),
            }),
        };
        assert!(!rejected.is_transient());
    }

    #[test]
    fn test_skipped_action_is_retried_next_pass() {
        let err = EntityError::Skipped {
            instance: "pihole-a".to_string(),
            kind: Kind::DnsRecord,
            key: "files.lan/A".to_string(),
            entry: "10.0.0.5 nas.lan files.lan".to_string(),
        };
        assert_eq!(err.reason(), "ActionSkipped");
        assert!(err.is_transient());
        assert!(err.cause().is_none());
        assert!(err.to_string().contains("'files.lan/A' on pihole-a"));
        assert!(err.to_string().contains("\"10.0.0.5 nas.lan files.lan\""));
    }

    // =====================================================
    // Run-level errors and warnings
    // =====================================================

    #[test]
    fn test_reconcile_error_messages() {
        assert_eq!(ReconcileError::NoInstances.to_string(), "no instances supplied");
        assert_eq!(
            ReconcileError::DuplicateInstance("pihole-a".to_string()).to_string(),
            "instance name 'pihole-a' supplied more than once"
        );
    }

    #[test]
    fn test_config_conflict_message() {
        let conflict = ConfigConflict {
            kind: Kind::Group,
            key: "IOT".to_string(),
            occurrences: 2,
        };
        assert_eq!(
            conflict.to_string(),
            "2 conflicting definitions of group 'IOT'; the last one wins"
        );
        assert_eq!(conflict.reason(), "ConfigConflict");
    }
}
