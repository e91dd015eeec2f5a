//! Property-based tests for the ledger
//!
//! Tests for:
//! - Hashing: recompute matches, any field mutation breaks the seal
//! - Chains: append-built chains validate, interior corruption is detected
//! - Replacement: never adopts an equal-or-shorter or invalid chain

use super::block::{AuditObservationData, Block, ContractCreationData, Payload};
use super::chain::{Ledger, LedgerError};
use crate::workflow::model::AdminRole;
use proptest::prelude::*;

fn creation_payload() -> impl Strategy<Value = Payload> {
    (
        "[a-z0-9-]{1,16}",
        "[A-Z]{2,4}-[0-9]{3}",
        "[A-Za-z ]{1,32}",
        1.0f64..1e9,
        any::<u32>(),
    )
        .prop_map(|(id, code, name, amount, created_at)| {
            Payload::ContractCreation(ContractCreationData {
                contract_id: id,
                entity_code: code,
                entity_name: name.clone(),
                contract_type: "SERVICES".to_string(),
                description: name,
                amount,
                created_by: "dev".to_string(),
                created_at: created_at as u64,
            })
        })
}

fn observation_payload() -> impl Strategy<Value = Payload> {
    ("[a-z0-9-]{1,16}", "[ -~]{0,64}").prop_map(|(id, text)| {
        Payload::AuditObservation(AuditObservationData {
            contract_id: id,
            auditor_id: "auditor".to_string(),
            role: AdminRole::Citizen,
            observation: text,
            timestamp: 0,
        })
    })
}

fn any_payload() -> impl Strategy<Value = Payload> {
    prop_oneof![creation_payload(), observation_payload()]
}

fn build_ledger(payloads: Vec<Payload>) -> Ledger {
    let mut ledger = Ledger::new();
    for payload in payloads {
        ledger.append(payload).unwrap();
    }
    ledger
}

// ============================================================================
// HASHING PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: A freshly built block carries its own recomputed hash
    #[test]
    fn sealed_block_recomputes_to_stored_hash(
        index in 1u64..10_000,
        timestamp in any::<u32>(),
        payload in any_payload(),
        prev in "[0-9a-f]{64}",
    ) {
        let block = Block::new(index, timestamp as u64, payload, prev);
        prop_assert_eq!(block.compute_hash(), block.hash.clone());
        prop_assert!(block.is_sealed());
    }

    /// Property: Mutating any hashed field breaks the seal
    #[test]
    fn field_mutation_breaks_seal(
        payload in creation_payload(),
        field in 0usize..5,
    ) {
        let mut block = Block::new(1, 1_000, payload, "ab".repeat(32));
        match field {
            0 => block.index += 1,
            1 => block.timestamp += 1,
            2 => block.previous_hash.push('0'),
            3 => block.nonce += 1,
            _ => {
                if let Payload::ContractCreation(ref mut data) = block.payload {
                    data.amount += 1.0;
                }
            }
        }
        prop_assert!(!block.is_sealed(), "mutated field {} still sealed", field);
    }
}

// ============================================================================
// CHAIN PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: Chains produced by appends are valid
    #[test]
    fn appended_chain_is_valid(payloads in prop::collection::vec(any_payload(), 0..20)) {
        let ledger = build_ledger(payloads.clone());
        prop_assert_eq!(ledger.height(), payloads.len() + 1);
        prop_assert!(ledger.is_chain_valid());
    }

    /// Property: Corrupting an interior previous_hash breaks validity
    #[test]
    fn corrupt_interior_link_detected(
        payloads in prop::collection::vec(any_payload(), 2..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let ledger = build_ledger(payloads);
        let mut chain = ledger.chain();
        let i = 1 + pick.index(chain.len() - 1);
        chain[i].previous_hash = "f".repeat(64);
        prop_assert!(!Ledger::validate_chain(&chain));
    }

    /// Property: A chain that is not strictly longer is never adopted
    #[test]
    fn replace_chain_never_accepts_shorter_or_equal(
        local in prop::collection::vec(any_payload(), 0..10),
        remote_len in 0usize..10,
    ) {
        let remote_len = remote_len.min(local.len());
        let mut ledger = build_ledger(local);
        let remote = build_ledger(
            (0..remote_len)
                .map(|i| Payload::AuditObservation(AuditObservationData {
                    contract_id: format!("r-{}", i),
                    auditor_id: "a".to_string(),
                    role: AdminRole::Prosecutor,
                    observation: String::new(),
                    timestamp: 0,
                }))
                .collect(),
        );

        let before = ledger.chain();
        let result = ledger.replace_chain(remote.chain());
        let is_too_short = matches!(result, Err(LedgerError::ChainTooShort { .. }));
        prop_assert!(is_too_short);
        prop_assert_eq!(ledger.chain(), before);
    }

    /// Property: A longer but tampered chain is rejected and local state is kept
    #[test]
    fn replace_chain_rejects_tampered_longer_chain(
        remote in prop::collection::vec(any_payload(), 2..12),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut ledger = Ledger::new();
        let mut candidate = build_ledger(remote).chain();
        let i = 1 + pick.index(candidate.len() - 1);
        candidate[i].timestamp += 1;

        prop_assert_eq!(ledger.replace_chain(candidate), Err(LedgerError::ChainInvalid));
        prop_assert_eq!(ledger.height(), 1);
    }
}
