//! Append-only, hash-chained ledger of contract lifecycle events.
//!
//! - `block`: content-addressed block, typed payloads, wire envelope
//! - `chain`: ordered chain, validation, replacement, contract projection

pub mod block;
pub mod chain;

#[cfg(test)]
mod proptests;

pub use block::{Block, BlockKind, Payload};
pub use chain::{Ledger, LedgerError, LedgerHealth, ReceiveOutcome};
