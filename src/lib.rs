//! Procura - replicated contract-approval ledger node
//!
//! Each government entity runs one node. A node keeps a hash-chained ledger of
//! contract lifecycle events, drives every contract through a fixed sequence
//! of role approvals, and replicates its blocks to the other nodes it knows.
//!
//! Key principles:
//! - Every workflow transition becomes a ledger block
//! - Longest valid chain wins; there is no other consensus
//! - No lock is held across a network call
//! - All outbound calls are bounded by a timeout

pub mod api;
pub mod config;
pub mod ledger;
pub mod network;
pub mod node;
pub mod workflow;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in unix seconds.
///
/// A clock set before the epoch reads as 0 rather than failing.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
