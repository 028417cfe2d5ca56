use crate::blockchain::core::mempool::Mempool;
use crate::blockchain::core::validation::validate_chain;
use crate::record::MedicalRecord;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{info, warn};

/// `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Seconds since the Unix epoch, with sub-second precision.
pub fn current_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Recursively rebuilds every object so its keys are in lexicographic order.
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k, sorted(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Deterministic JSON rendering: sorted keys, compact separators.
pub fn canonical_json(value: &Value) -> String {
    sorted(value.clone()).to_string()
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub index: u64,
    pub transactions: Vec<MedicalRecord>,
    pub timestamp: f64,
    pub previous_hash: String,
    #[serde(default)]
    pub nonce: u64,
}

impl Block {
    pub fn new(index: u64, transactions: Vec<MedicalRecord>, previous_hash: String) -> Self {
        Block {
            index,
            transactions,
            timestamp: current_timestamp(),
            previous_hash,
            nonce: 0,
        }
    }

    pub fn genesis() -> Self {
        Block::new(0, Vec::new(), GENESIS_PREVIOUS_HASH.to_string())
    }

    /// The block as a JSON value, shaped exactly like its serde wire form.
    pub fn to_json_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("index".to_string(), Value::from(self.index));
        map.insert(
            "transactions".to_string(),
            Value::Array(self.transactions.iter().map(MedicalRecord::to_json_value).collect()),
        );
        map.insert("timestamp".to_string(), Value::from(self.timestamp));
        map.insert("previous_hash".to_string(), Value::from(self.previous_hash.as_str()));
        map.insert("nonce".to_string(), Value::from(self.nonce));
        Value::Object(map)
    }

    /// Lowercase hex SHA-256 of the block's canonical JSON form.
    ///
    /// Never cached: the hash always reflects the current field values.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonical_json(&self.to_json_value()).as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// The `/chain` wire shape, shared by the API and the peer client.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub length: usize,
}

/// The node's ledger: blocks, pending records and known peers.
///
/// Callers share it behind a single `tokio::sync::RwLock`, which makes every
/// `&mut self` method below atomic with respect to the others.
#[derive(Debug, Clone)]
pub struct Blockchain {
    chain: Vec<Block>,
    mempool: Mempool,
    nodes: HashSet<String>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Create a ledger holding only the genesis block.
    pub fn new() -> Self {
        Blockchain {
            chain: vec![Block::genesis()],
            mempool: Mempool::new(),
            nodes: HashSet::new(),
        }
    }

    pub fn last_block(&self) -> &Block {
        // Never empty: starts at genesis and is only replaced by longer chains.
        &self.chain[self.chain.len() - 1]
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain: self.chain.clone(),
            length: self.chain.len(),
        }
    }

    pub fn pending_records(&self) -> &[MedicalRecord] {
        self.mempool.records()
    }

    /// Queue a record for the next block. Returns the index that block will receive.
    pub fn submit_record(&mut self, record: MedicalRecord) -> u64 {
        self.mempool.add_record(record);
        self.chain.len() as u64
    }

    /// Package every pending record into a new block and append it.
    ///
    /// Returns `None` when the pool is empty or the tip index cannot be
    /// incremented; the chain is left untouched.
    pub fn mine_block(&mut self) -> Option<Block> {
        if self.mempool.is_empty() {
            return None;
        }

        let last_block = self.last_block();
        let Some(index) = last_block.index.checked_add(1) else {
            warn!(
                tip_index = last_block.index,
                pending = self.mempool.len(),
                "chain tip has no successor index; records stay pending"
            );
            return None;
        };
        let previous_hash = last_block.compute_hash();
        let block = Block::new(index, self.mempool.drain(), previous_hash);

        info!(
            index = block.index,
            records = block.transactions.len(),
            "mined new block"
        );
        self.chain.push(block.clone());
        Some(block)
    }

    /// Add a peer address. Returns `false` if it was already known.
    pub fn register_node(&mut self, address: impl Into<String>) -> bool {
        self.nodes.insert(address.into())
    }

    /// Known peers in a stable (sorted) order.
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.nodes.iter().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Swap in `candidate` as the whole chain if it is strictly longer than the
    /// current one. Pending records are kept. Returns whether the swap happened.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain.len() {
            return false;
        }
        info!(
            old_length = self.chain.len(),
            new_length = candidate.len(),
            "replacing local chain"
        );
        self.chain = candidate;
        true
    }

    /// Runs the chain validator over the local chain.
    pub fn validate(&self) -> bool {
        validate_chain(&self.chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(patient: &str) -> MedicalRecord {
        MedicalRecord::new(patient, "D-1", "diagnosis", json!({"condition": "flu"}))
    }

    #[test]
    fn test_genesis_block() {
        let chain = Blockchain::new();
        assert_eq!(chain.len(), 1);
        let genesis = chain.last_block();
        assert_eq!(genesis.index, 0);
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.nonce, 0);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let block = Block::new(3, vec![record("P-1")], "ab".repeat(32));
        let copy = block.clone();

        let hash = block.compute_hash();
        assert_eq!(hash, copy.compute_hash());
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_changes_with_any_field() {
        let block = Block::new(3, vec![record("P-1")], "ab".repeat(32));
        let original = block.compute_hash();

        let mut changed = block.clone();
        changed.index = 4;
        assert_ne!(changed.compute_hash(), original);

        let mut changed = block.clone();
        changed.timestamp += 1.0;
        assert_ne!(changed.compute_hash(), original);

        let mut changed = block.clone();
        changed.previous_hash = "cd".repeat(32);
        assert_ne!(changed.compute_hash(), original);

        let mut changed = block.clone();
        changed.nonce = 1;
        assert_ne!(changed.compute_hash(), original);

        let mut changed = block.clone();
        changed.transactions[0].patient_id = "P-2".to_string();
        assert_ne!(changed.compute_hash(), original);
    }

    #[test]
    fn test_json_value_matches_wire_form() {
        let mut signed = record("P-1").with_signature("3045");
        signed.extra.insert("ward".to_string(), json!("B2"));
        let block = Block::new(7, vec![signed, record("P-2")], "ab".repeat(32));

        assert_eq!(block.to_json_value(), serde_json::to_value(&block).unwrap());
    }

    #[test]
    fn test_mine_on_maximal_tip_index_leaves_records_pending() {
        let genesis = Block::genesis();
        let tip = Block::new(u64::MAX, Vec::new(), genesis.compute_hash());
        let mut chain = Blockchain::new();
        chain.chain = vec![genesis, tip];
        chain.submit_record(record("P-1"));

        assert!(chain.mine_block().is_none());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.pending_records().len(), 1);
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": true, "m": [ {"y": 1, "x": 2} ]}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"m":[{"x":2,"y":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_hash_survives_wire_round_trip() {
        let mut chain = Blockchain::new();
        chain.submit_record(record("P-1").with_signature("3044"));
        let block = chain.mine_block().unwrap();

        let wire = serde_json::to_string(&block).unwrap();
        let decoded: Block = serde_json::from_str(&wire).unwrap();
        assert_eq!(decoded.compute_hash(), block.compute_hash());
    }

    #[test]
    fn test_submit_returns_next_index() {
        let mut chain = Blockchain::new();
        assert_eq!(chain.submit_record(record("P-1")), 1);
        assert_eq!(chain.submit_record(record("P-2")), 1);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.pending_records().len(), 2);
    }

    #[test]
    fn test_mine_empty_pool_is_noop() {
        let mut chain = Blockchain::new();
        let genesis_hash = chain.last_block().compute_hash();

        assert!(chain.mine_block().is_none());
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.last_block().compute_hash(), genesis_hash);
    }

    #[test]
    fn test_mine_packages_pool_in_order() {
        let mut chain = Blockchain::new();
        let genesis_hash = chain.last_block().compute_hash();
        let a = record("A");
        let b = record("B");
        chain.submit_record(a.clone());
        chain.submit_record(b.clone());

        let block = chain.mine_block().unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(block.index, 1);
        assert_eq!(block.transactions, vec![a, b]);
        assert_eq!(block.previous_hash, genesis_hash);
        assert_eq!(chain.chain()[1], block);
        assert!(chain.pending_records().is_empty());
    }

    #[test]
    fn test_mined_chains_validate() {
        let mut chain = Blockchain::new();
        for i in 0..5 {
            for j in 0..=i {
                chain.submit_record(record(&format!("P-{}-{}", i, j)));
            }
            chain.mine_block();
            assert!(chain.validate());
        }
        assert_eq!(chain.len(), 6);
        for (i, block) in chain.chain().iter().enumerate() {
            assert_eq!(block.index, i as u64);
        }
    }

    #[test]
    fn test_register_node_deduplicates() {
        let mut chain = Blockchain::new();
        assert!(chain.register_node("http://b:5000"));
        assert!(chain.register_node("http://a:5000"));
        assert!(!chain.register_node("http://b:5000"));
        assert_eq!(chain.nodes(), vec!["http://a:5000", "http://b:5000"]);
    }

    #[test]
    fn test_replace_chain_requires_strictly_longer() {
        let mut local = Blockchain::new();
        local.submit_record(record("L"));
        local.mine_block();

        let mut remote = Blockchain::new();
        remote.submit_record(record("R"));
        remote.mine_block();

        assert!(!local.replace_chain(remote.chain().to_vec()));

        remote.submit_record(record("R2"));
        remote.mine_block();
        local.submit_record(record("still pending"));

        assert!(local.replace_chain(remote.chain().to_vec()));
        assert_eq!(local.chain(), remote.chain());
        assert_eq!(local.pending_records().len(), 1);
    }
}
