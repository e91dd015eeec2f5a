//! Blocks: the content-addressed unit of the ledger.
//!
//! ## Wire envelope
//!
//! Every block travels between nodes as
//! `{index, timestamp, data, previous_hash, hash, nonce, type}` where `data` is
//! a plain JSON object. Inside the crate the payload is a typed [`Payload`]
//! keyed by `type`; conversion happens at the serde boundary through
//! [`WireBlock`].
//!
//! ## Hashing
//!
//! `hash = hex(SHA-256(canonical JSON of the envelope minus the hash))`.
//! `serde_json::Value` objects are backed by a `BTreeMap`, so keys come out
//! sorted at every depth and every node computes the same bytes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::workflow::model::AdminRole;

/// Message carried by the genesis block.
pub const GENESIS_MESSAGE: &str = "SECOP Blockchain Genesis Block";

/// Block type tag, serialized as the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockKind {
    Genesis,
    ContractCreation,
    Validation,
    AuditObservation,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Genesis => "GENESIS",
            BlockKind::ContractCreation => "CONTRACT_CREATION",
            BlockKind::Validation => "VALIDATION",
            BlockKind::AuditObservation => "AUDIT_OBSERVATION",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "GENESIS" => Some(BlockKind::Genesis),
            "CONTRACT_CREATION" => Some(BlockKind::ContractCreation),
            "VALIDATION" => Some(BlockKind::Validation),
            "AUDIT_OBSERVATION" => Some(BlockKind::AuditObservation),
            _ => None,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisData {
    pub message: String,
}

/// Minimal creation record. Reconciliation rebuilds contracts from this alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCreationData {
    pub contract_id: String,
    pub entity_code: String,
    pub entity_name: String,
    #[serde(default)]
    pub contract_type: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub created_by: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationData {
    pub contract_id: String,
    pub step: u32,
    pub validator_id: String,
    #[serde(default)]
    pub validator_name: String,
    pub role: AdminRole,
    pub approved: bool,
    #[serde(default)]
    pub comments: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditObservationData {
    pub contract_id: String,
    pub auditor_id: String,
    pub role: AdminRole,
    pub observation: String,
    pub timestamp: u64,
}

/// Typed block payload, one variant per block kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Genesis(GenesisData),
    ContractCreation(ContractCreationData),
    Validation(ValidationData),
    AuditObservation(AuditObservationData),
}

impl Payload {
    pub fn kind(&self) -> BlockKind {
        match self {
            Payload::Genesis(_) => BlockKind::Genesis,
            Payload::ContractCreation(_) => BlockKind::ContractCreation,
            Payload::Validation(_) => BlockKind::Validation,
            Payload::AuditObservation(_) => BlockKind::AuditObservation,
        }
    }

    /// Contract this payload refers to, if any.
    pub fn contract_id(&self) -> Option<&str> {
        match self {
            Payload::Genesis(_) => None,
            Payload::ContractCreation(d) => Some(&d.contract_id),
            Payload::Validation(d) => Some(&d.contract_id),
            Payload::AuditObservation(d) => Some(&d.contract_id),
        }
    }

    /// Generic JSON object for the wire and for hashing.
    pub fn to_value(&self) -> Value {
        let value = match self {
            Payload::Genesis(d) => serde_json::to_value(d),
            Payload::ContractCreation(d) => serde_json::to_value(d),
            Payload::Validation(d) => serde_json::to_value(d),
            Payload::AuditObservation(d) => serde_json::to_value(d),
        };
        // Plain structs of strings and numbers always serialize.
        value.unwrap_or(Value::Null)
    }

    /// Decode the generic `data` object using the schema named by `kind`.
    pub fn from_value(kind: BlockKind, data: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            BlockKind::Genesis => Payload::Genesis(serde_json::from_value(data)?),
            BlockKind::ContractCreation => {
                Payload::ContractCreation(serde_json::from_value(data)?)
            }
            BlockKind::Validation => Payload::Validation(serde_json::from_value(data)?),
            BlockKind::AuditObservation => {
                Payload::AuditObservation(serde_json::from_value(data)?)
            }
        })
    }
}

/// One ledger block.
///
/// Serializes to and from the generic wire envelope; see the module docs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireBlock", into = "WireBlock")]
pub struct Block {
    pub index: u64,
    /// Unix seconds.
    pub timestamp: u64,
    pub payload: Payload,
    pub previous_hash: String,
    pub hash: String,
    /// Always 0: there is no proof-of-work.
    pub nonce: u64,
}

impl Block {
    /// Build a block and seal it with its computed hash.
    pub fn new(index: u64, timestamp: u64, payload: Payload, previous_hash: String) -> Self {
        let mut block = Self {
            index,
            timestamp,
            payload,
            previous_hash,
            hash: String::new(),
            nonce: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// The deterministic genesis block shared by every node.
    pub fn genesis() -> Self {
        Self::new(
            0,
            0,
            Payload::Genesis(GenesisData {
                message: GENESIS_MESSAGE.to_string(),
            }),
            String::new(),
        )
    }

    pub fn kind(&self) -> BlockKind {
        self.payload.kind()
    }

    /// Canonical bytes covered by the hash.
    pub fn hash_material(&self) -> Vec<u8> {
        let record = json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "data": self.payload.to_value(),
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
            "type": self.kind().as_str(),
        });
        record.to_string().into_bytes()
    }

    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.hash_material());
        hex::encode(hasher.finalize())
    }

    /// Stored hash is present and matches the recomputed one.
    pub fn is_sealed(&self) -> bool {
        !self.hash.is_empty() && self.hash == self.compute_hash()
    }
}

/// Generic wire envelope exchanged between nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBlock {
    pub index: u64,
    pub timestamp: u64,
    pub data: Value,
    pub previous_hash: String,
    pub hash: String,
    #[serde(default)]
    pub nonce: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TryFrom<WireBlock> for Block {
    type Error = String;

    fn try_from(wire: WireBlock) -> Result<Self, Self::Error> {
        let kind = BlockKind::parse(&wire.kind)
            .ok_or_else(|| format!("unknown block type '{}'", wire.kind))?;
        let payload = Payload::from_value(kind, wire.data)
            .map_err(|e| format!("invalid {} payload: {}", kind, e))?;
        Ok(Block {
            index: wire.index,
            timestamp: wire.timestamp,
            payload,
            previous_hash: wire.previous_hash,
            hash: wire.hash,
            nonce: wire.nonce,
        })
    }
}

impl From<Block> for WireBlock {
    fn from(block: Block) -> Self {
        WireBlock {
            index: block.index,
            timestamp: block.timestamp,
            data: block.payload.to_value(),
            kind: block.kind().as_str().to_string(),
            previous_hash: block.previous_hash,
            hash: block.hash,
            nonce: block.nonce,
        }
    }
}
