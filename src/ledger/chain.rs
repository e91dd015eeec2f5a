//! The ordered, hash-linked chain and the contract projection derived from it.
//!
//! `Ledger` is a plain owned structure with `&mut self` writers. Sharing
//! across tasks is the caller's job (the node wraps it in
//! `Arc<tokio::sync::RwLock<_>>`), which keeps the validate-then-append
//! sequence atomic under a single write guard.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info};

use super::block::{Block, Payload};
use crate::unix_now;
use crate::workflow::model::{default_pipeline, Contract, PipelineStep};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Candidate chain of length {candidate} is not longer than local chain of length {current}")]
    ChainTooShort { candidate: usize, current: usize },

    #[error("Candidate chain failed validation")]
    ChainInvalid,
}

/// Result of offering an inbound block to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveOutcome {
    /// Block already present; nothing changed.
    Duplicate,
    /// Block extended the local chain.
    Appended,
}

/// Ledger summary for health reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerHealth {
    pub height: usize,
    pub last_block_hash: String,
    pub genesis_block_hash: String,
    pub chain_valid: bool,
    pub is_synced: bool,
    pub total_contracts: usize,
    pub contract_status_counts: BTreeMap<String, usize>,
}

/// Ordered blocks plus the contract projection.
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    contracts: HashMap<String, Contract>,
    pipeline: Vec<PipelineStep>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// New ledger holding only the genesis block.
    pub fn new() -> Self {
        Self::with_pipeline(default_pipeline())
    }

    /// New ledger whose rebuilt contracts use `pipeline`.
    pub fn with_pipeline(pipeline: Vec<PipelineStep>) -> Self {
        Self {
            chain: vec![Block::genesis()],
            contracts: HashMap::new(),
            pipeline,
        }
    }

    pub fn height(&self) -> usize {
        self.chain.len()
    }

    pub fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block.
        &self.chain[self.chain.len() - 1]
    }

    pub fn last_hash(&self) -> &str {
        &self.last_block().hash
    }

    pub fn genesis_hash(&self) -> &str {
        &self.chain[0].hash
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Owned copy of the chain, safe to ship to a peer.
    pub fn chain(&self) -> Vec<Block> {
        self.chain.clone()
    }

    pub fn has_block(&self, hash: &str) -> bool {
        self.chain.iter().any(|b| b.hash == hash)
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.chain.iter().find(|b| b.hash == hash)
    }

    /// Build, seal, validate and append a block for `payload`.
    ///
    /// All-or-nothing: on error the chain is unchanged.
    pub fn append(&mut self, payload: Payload) -> Result<Block, LedgerError> {
        self.append_at(payload, unix_now())
    }

    pub(crate) fn append_at(
        &mut self,
        payload: Payload,
        timestamp: u64,
    ) -> Result<Block, LedgerError> {
        if matches!(payload, Payload::Genesis(_)) {
            return Err(LedgerError::InvalidBlock(
                "genesis payload cannot be appended".to_string(),
            ));
        }

        let block = Block::new(
            self.chain.len() as u64,
            timestamp,
            payload,
            self.last_hash().to_string(),
        );

        if !self.validate(&block) {
            return Err(LedgerError::InvalidBlock(format!(
                "block {} failed validation",
                block.index
            )));
        }

        info!(index = block.index, kind = %block.kind(), hash = %block.hash, "block appended");
        self.chain.push(block.clone());
        Ok(block)
    }

    /// Check a single block against the current tip.
    ///
    /// The hash must be non-empty and match the recomputed value; unless the
    /// block is a genesis block it must link to the current last hash.
    pub fn validate(&self, block: &Block) -> bool {
        if !block.is_sealed() {
            return false;
        }
        if block.index == 0 {
            return true;
        }
        self.last_hash() == block.previous_hash
    }

    /// Whole-chain validation used for adoption.
    ///
    /// Non-empty; genesis has an empty `previous_hash`; every block sits at
    /// its own index, carries a recomputable hash, and links to its
    /// predecessor.
    pub fn validate_chain(blocks: &[Block]) -> bool {
        let Some(genesis) = blocks.first() else {
            return false;
        };
        if !genesis.previous_hash.is_empty() {
            return false;
        }

        blocks.iter().enumerate().all(|(i, block)| {
            block.index == i as u64
                && block.is_sealed()
                && (i == 0 || block.previous_hash == blocks[i - 1].hash)
        })
    }

    pub fn is_chain_valid(&self) -> bool {
        Self::validate_chain(&self.chain)
    }

    /// Adopt `candidate` iff it is strictly longer and valid.
    ///
    /// On adoption the contract projection is rebuilt from the candidate's
    /// `CONTRACT_CREATION` blocks only. Validation and audit history held in
    /// the previous projection is discarded.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<(), LedgerError> {
        if candidate.len() <= self.chain.len() {
            return Err(LedgerError::ChainTooShort {
                candidate: candidate.len(),
                current: self.chain.len(),
            });
        }
        if !Self::validate_chain(&candidate) {
            return Err(LedgerError::ChainInvalid);
        }

        let previous = self.chain.len();
        self.chain = candidate;
        self.rebuild_contracts();
        info!(
            previous,
            height = self.chain.len(),
            contracts = self.contracts.len(),
            "chain replaced by longer valid chain"
        );
        Ok(())
    }

    /// Inbound path for a block pushed by a peer.
    ///
    /// Idempotent: a block whose hash is already present is a no-op.
    pub fn receive(&mut self, block: Block) -> Result<ReceiveOutcome, LedgerError> {
        if self.has_block(&block.hash) {
            debug!(hash = %block.hash, "duplicate block ignored");
            return Ok(ReceiveOutcome::Duplicate);
        }
        if !self.validate(&block) {
            return Err(LedgerError::InvalidBlock(format!(
                "block {} does not extend local tip",
                block.index
            )));
        }
        if block.index != self.chain.len() as u64 {
            return Err(LedgerError::InvalidBlock(format!(
                "expected index {}, got {}",
                self.chain.len(),
                block.index
            )));
        }

        if let Payload::ContractCreation(data) = &block.payload {
            self.contracts
                .entry(data.contract_id.clone())
                .or_insert_with(|| Contract::from_creation(data, &self.pipeline));
        }

        info!(index = block.index, kind = %block.kind(), "received block appended");
        self.chain.push(block);
        Ok(ReceiveOutcome::Appended)
    }

    fn rebuild_contracts(&mut self) {
        let pipeline = &self.pipeline;
        self.contracts = self
            .chain
            .iter()
            .filter_map(|block| match &block.payload {
                Payload::ContractCreation(data) => Some((
                    data.contract_id.clone(),
                    Contract::from_creation(data, pipeline),
                )),
                _ => None,
            })
            .collect();
    }

    pub fn contract(&self, id: &str) -> Option<&Contract> {
        self.contracts.get(id)
    }

    pub fn contains_contract(&self, id: &str) -> bool {
        self.contracts.contains_key(id)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &Contract> {
        self.contracts.values()
    }

    /// Insert or overwrite a contract in the projection.
    pub(crate) fn put_contract(&mut self, contract: Contract) {
        self.contracts.insert(contract.id.clone(), contract);
    }

    pub fn health(&self) -> LedgerHealth {
        let chain_valid = self.is_chain_valid();
        let mut contract_status_counts = BTreeMap::new();
        for contract in self.contracts.values() {
            *contract_status_counts
                .entry(contract.status.to_string())
                .or_insert(0) += 1;
        }

        LedgerHealth {
            height: self.height(),
            last_block_hash: self.last_hash().to_string(),
            genesis_block_hash: self.genesis_hash().to_string(),
            chain_valid,
            is_synced: !self.chain.is_empty() && chain_valid,
            total_contracts: self.contracts.len(),
            contract_status_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::block::{AuditObservationData, ContractCreationData};
    use crate::workflow::model::{AdminRole, ContractStatus};

    fn creation(id: &str) -> Payload {
        Payload::ContractCreation(ContractCreationData {
            contract_id: id.to_string(),
            entity_code: "MUN-05001".to_string(),
            entity_name: "Alcaldia de Medellin".to_string(),
            contract_type: "WORKS".to_string(),
            description: "School roof".to_string(),
            amount: 250_000.0,
            created_by: "dev-1".to_string(),
            created_at: 1_700_000_000,
        })
    }

    fn observation(id: &str) -> Payload {
        Payload::AuditObservation(AuditObservationData {
            contract_id: id.to_string(),
            auditor_id: "aud-1".to_string(),
            role: AdminRole::Comptroller,
            observation: "Check invoices".to_string(),
            timestamp: 1_700_000_100,
        })
    }

    #[test]
    fn test_new_ledger_has_genesis() {
        let ledger = Ledger::new();
        assert_eq!(ledger.height(), 1);
        assert_eq!(ledger.genesis_hash(), Block::genesis().hash);
        assert!(ledger.is_chain_valid());
    }

    #[test]
    fn test_append_links_blocks() {
        let mut ledger = Ledger::new();
        let genesis_hash = ledger.last_hash().to_string();

        let block = ledger.append(creation("c-1")).unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, genesis_hash);
        assert_eq!(ledger.last_hash(), block.hash);
        assert!(ledger.has_block(&block.hash));
        assert!(ledger.is_chain_valid());
    }

    #[test]
    fn test_append_genesis_payload_rejected() {
        let mut ledger = Ledger::new();
        let genesis = Block::genesis().payload;
        assert!(matches!(
            ledger.append(genesis),
            Err(LedgerError::InvalidBlock(_))
        ));
        assert_eq!(ledger.height(), 1);
    }

    #[test]
    fn test_validate_rejects_wrong_link() {
        let ledger = Ledger::new();
        let block = Block::new(1, 10, creation("c-1"), "not-the-tip".to_string());
        assert!(!ledger.validate(&block));
    }

    #[test]
    fn test_validate_chain_rejects_empty() {
        assert!(!Ledger::validate_chain(&[]));
    }

    #[test]
    fn test_validate_chain_rejects_index_gap() {
        let mut ledger = Ledger::new();
        ledger.append(creation("c-1")).unwrap();
        let mut chain = ledger.chain();
        chain[1] = Block::new(5, chain[1].timestamp, creation("c-1"), chain[0].hash.clone());
        assert!(!Ledger::validate_chain(&chain));
    }

    #[test]
    fn test_replace_chain_rejects_equal_length() {
        let mut a = Ledger::new();
        let mut b = Ledger::new();
        a.append(creation("a")).unwrap();
        b.append(creation("b")).unwrap();

        let result = a.replace_chain(b.chain());
        assert_eq!(
            result,
            Err(LedgerError::ChainTooShort {
                candidate: 2,
                current: 2
            })
        );
        assert!(a.contract("a").is_none());
        assert_eq!(a.blocks()[1].payload.contract_id(), Some("a"));
    }

    #[test]
    fn test_replace_chain_rejects_invalid_longer_chain() {
        let mut a = Ledger::new();
        let mut b = Ledger::new();
        b.append(creation("b1")).unwrap();
        b.append(creation("b2")).unwrap();

        let mut candidate = b.chain();
        candidate[1].timestamp += 1;

        let before = a.chain();
        assert_eq!(a.replace_chain(candidate), Err(LedgerError::ChainInvalid));
        assert_eq!(a.chain(), before);
    }

    #[test]
    fn test_replace_chain_rebuilds_projection() {
        let mut a = Ledger::new();
        a.put_contract(Contract::from_creation(
            match &creation("local") {
                Payload::ContractCreation(d) => d,
                _ => unreachable!(),
            },
            &default_pipeline(),
        ));

        let mut b = Ledger::new();
        b.append(creation("remote-1")).unwrap();
        b.append(observation("remote-1")).unwrap();
        b.append(creation("remote-2")).unwrap();

        a.replace_chain(b.chain()).unwrap();

        assert_eq!(a.chain(), b.chain());
        assert!(a.contract("local").is_none());
        let rebuilt = a.contract("remote-1").unwrap();
        assert_eq!(rebuilt.status, ContractStatus::Draft);
        assert_eq!(rebuilt.current_step, 1);
        assert!(a.contract("remote-2").is_some());
    }

    #[test]
    fn test_receive_is_idempotent() {
        let mut origin = Ledger::new();
        let block = origin.append(creation("c-1")).unwrap();

        let mut replica = Ledger::new();
        assert_eq!(replica.receive(block.clone()), Ok(ReceiveOutcome::Appended));
        assert_eq!(replica.receive(block.clone()), Ok(ReceiveOutcome::Duplicate));
        assert_eq!(replica.height(), 2);
        assert!(replica.contract("c-1").is_some());
    }

    #[test]
    fn test_receive_rejects_detached_block() {
        let mut origin = Ledger::new();
        origin.append(creation("c-1")).unwrap();
        let second = origin.append(creation("c-2")).unwrap();

        let mut replica = Ledger::new();
        assert!(matches!(
            replica.receive(second),
            Err(LedgerError::InvalidBlock(_))
        ));
        assert_eq!(replica.height(), 1);
    }

    #[test]
    fn test_receive_rejects_tampered_block() {
        let mut origin = Ledger::new();
        let mut block = origin.append(creation("c-1")).unwrap();
        block.payload = creation("c-evil");

        let mut replica = Ledger::new();
        assert!(replica.receive(block).is_err());
    }

    #[test]
    fn test_health_counts_statuses() {
        let mut ledger = Ledger::new();
        let block = ledger.append(creation("c-1")).unwrap();
        if let Payload::ContractCreation(data) = &block.payload {
            ledger.put_contract(Contract::from_creation(data, &default_pipeline()));
        }

        let health = ledger.health();
        assert_eq!(health.height, 2);
        assert_eq!(health.total_contracts, 1);
        assert_eq!(health.contract_status_counts.get("DRAFT"), Some(&1));
        assert!(health.chain_valid);
        assert!(health.is_synced);
        assert_eq!(health.last_block_hash, block.hash);
    }
}
