// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Pi-hole reconciler.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Kind Names
// ============================================================================

/// Kind name for Pi-hole groups
pub const KIND_GROUP: &str = "group";

/// Kind name for local DNS records (A, AAAA, CNAME)
pub const KIND_DNS_RECORD: &str = "dns_record";

/// Kind name for allow/block lists (subscriptions)
pub const KIND_LIST: &str = "list";

/// Kind name for Pi-hole clients
pub const KIND_CLIENT: &str = "client";

// ============================================================================
// Pi-hole API Constants
// ============================================================================

/// Header carrying the session id on authenticated requests
pub const SESSION_HEADER: &str = "X-FTL-SID";

/// Authentication endpoint (POST to log in, DELETE to log out)
pub const API_AUTH_PATH: &str = "api/auth";

/// Group management endpoint
pub const API_GROUPS_PATH: &str = "api/groups";

/// Client management endpoint
pub const API_CLIENTS_PATH: &str = "api/clients";

/// List (subscription) management endpoint
pub const API_LISTS_PATH: &str = "api/lists";

/// Local A/AAAA host entries (`"ip host"`)
pub const API_DNS_HOSTS_PATH: &str = "api/config/dns/hosts";

/// Local CNAME entries (`"host,target[,ttl]"`)
pub const API_DNS_CNAME_PATH: &str = "api/config/dns/cnameRecords";

/// Id of the built-in default group every Pi-hole ships with
pub const DEFAULT_GROUP_ID: u32 = 0;

// ============================================================================
// Engine Defaults
// ============================================================================

/// Maximum number of instances reconciled concurrently
pub const DEFAULT_MAX_CONCURRENT_INSTANCES: usize = 4;

/// Maximum number of apply calls issued concurrently for one kind on one instance
pub const DEFAULT_MAX_CONCURRENT_ACTIONS: usize = 8;

/// Per-request HTTP timeout (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Metrics
// ============================================================================

/// Namespace prefix for all metrics (prometheus-safe)
pub const METRICS_NAMESPACE: &str = "pihole_reconciler";
