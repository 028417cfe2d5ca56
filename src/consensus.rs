//! Longest-valid-chain consensus for CareChain
//!
//! A resolution pass polls every known peer for its chain and adopts the
//! longest one that is strictly longer than the local chain and passes
//! [`validate_chain`]. Equal lengths never win: the local chain keeps ties.
//! A peer that fails in any way simply contributes no candidate.

use crate::blockchain::{check_chain, Block, Blockchain, ChainSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default per-peer fetch timeout.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a single peer contributed nothing to a resolution pass.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("request to peer failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("peer answered with status {0}")]
    Status(u16),
    #[error("peer did not answer within {0:?}")]
    Timeout(Duration),
    #[error("malformed chain payload: {0}")]
    Malformed(String),
}

/// Source of remote chains.
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, PeerError>;
}

/// Builds the `/chain` URL for a registered peer address. Addresses without a
/// scheme are assumed to be plain HTTP.
pub fn chain_url(peer: &str) -> String {
    let base = peer.trim().trim_end_matches('/');
    if base.contains("://") {
        format!("{}/chain", base)
    } else {
        format!("http://{}/chain", base)
    }
}

/// Fetches peer chains over HTTP with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    http: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, PeerError> {
        let response = self.http.get(chain_url(peer)).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PeerError::Status(status.as_u16()));
        }
        response
            .json::<ChainSnapshot>()
            .await
            .map_err(|e| PeerError::Malformed(e.to_string()))
    }
}

/// Outcome of one resolution pass, carrying the chain as it stands afterwards.
#[derive(Debug, Clone)]
pub enum Resolution {
    Replaced { chain: Vec<Block> },
    NotReplaced { chain: Vec<Block> },
}

impl Resolution {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Resolution::Replaced { .. })
    }

    pub fn chain(&self) -> &[Block] {
        match self {
            Resolution::Replaced { chain } | Resolution::NotReplaced { chain } => chain,
        }
    }

    pub fn into_chain(self) -> Vec<Block> {
        match self {
            Resolution::Replaced { chain } | Resolution::NotReplaced { chain } => chain,
        }
    }
}

pub struct ConsensusResolver {
    client: Arc<dyn PeerClient>,
    peer_timeout: Duration,
}

impl ConsensusResolver {
    pub fn new(client: Arc<dyn PeerClient>, peer_timeout: Duration) -> Self {
        Self {
            client,
            peer_timeout,
        }
    }

    /// Resolver backed by [`HttpPeerClient`].
    pub fn http(peer_timeout: Duration) -> Result<Self, PeerError> {
        let client = HttpPeerClient::new(peer_timeout)?;
        Ok(Self::new(Arc::new(client), peer_timeout))
    }

    async fn fetch(&self, peer: &str) -> Result<Vec<Block>, PeerError> {
        let snapshot = tokio::time::timeout(self.peer_timeout, self.client.fetch_chain(peer))
            .await
            .map_err(|_| PeerError::Timeout(self.peer_timeout))??;
        // The advertised `length` is informational only.
        if snapshot.length != snapshot.chain.len() {
            debug!(
                peer,
                advertised = snapshot.length,
                actual = snapshot.chain.len(),
                "peer length field disagrees with its chain"
            );
        }
        Ok(snapshot.chain)
    }

    /// Pick the first strictly-longest valid chain among `peers`, beating
    /// `local_len`. Does not touch the ledger.
    pub async fn best_candidate(&self, peers: &[String], local_len: usize) -> Option<Vec<Block>> {
        let mut max_length = local_len;
        let mut best = None;

        for peer in peers {
            let chain = match self.fetch(peer).await {
                Ok(chain) => chain,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "skipping peer");
                    continue;
                }
            };

            if chain.len() <= max_length {
                debug!(peer = %peer, length = chain.len(), max_length, "peer chain not longer");
                continue;
            }

            if let Err(e) = check_chain(&chain) {
                warn!(peer = %peer, error = %e, "discarding invalid peer chain");
                continue;
            }

            max_length = chain.len();
            best = Some(chain);
        }

        best
    }

    /// One full resolution pass against the shared ledger.
    ///
    /// No lock is held while peers are contacted. The swap itself re-checks the
    /// strictly-longer rule so a block mined meanwhile is never discarded for a
    /// candidate that is no longer longer.
    pub async fn resolve(&self, ledger: &RwLock<Blockchain>) -> Resolution {
        let (peers, local_len) = {
            let chain = ledger.read().await;
            (chain.nodes(), chain.len())
        };

        let candidate = self.best_candidate(&peers, local_len).await;

        let mut chain = ledger.write().await;
        let replaced = match candidate {
            Some(candidate) => chain.replace_chain(candidate),
            None => false,
        };

        let current = chain.chain().to_vec();
        if replaced {
            info!(length = current.len(), "chain was replaced by a peer chain");
            Resolution::Replaced { chain: current }
        } else {
            Resolution::NotReplaced { chain: current }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MedicalRecord;
    use serde_json::json;
    use std::collections::HashMap;

    enum Reply {
        Chain(Vec<Block>),
        Lying(Vec<Block>, usize),
        Fail,
        Hang,
    }

    struct ScriptedPeers {
        replies: HashMap<String, Reply>,
    }

    #[async_trait]
    impl PeerClient for ScriptedPeers {
        async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, PeerError> {
            match self.replies.get(peer) {
                Some(Reply::Chain(chain)) => Ok(ChainSnapshot {
                    length: chain.len(),
                    chain: chain.clone(),
                }),
                Some(Reply::Lying(chain, length)) => Ok(ChainSnapshot {
                    length: *length,
                    chain: chain.clone(),
                }),
                Some(Reply::Fail) | None => Err(PeerError::Status(500)),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(PeerError::Status(504))
                }
            }
        }
    }

    fn chain_of(len: usize, tag: &str) -> Vec<Block> {
        let mut chain = Blockchain::new();
        for i in 1..len {
            chain.submit_record(MedicalRecord::new(
                format!("{}-{}", tag, i),
                "D-1",
                "diagnosis",
                json!({"n": i}),
            ));
            chain.mine_block();
        }
        chain.chain().to_vec()
    }

    fn resolver(replies: Vec<(&str, Reply)>) -> ConsensusResolver {
        let replies = replies
            .into_iter()
            .map(|(peer, reply)| (peer.to_string(), reply))
            .collect();
        ConsensusResolver::new(
            Arc::new(ScriptedPeers { replies }),
            Duration::from_millis(200),
        )
    }

    fn ledger_with_peers(peers: &[&str]) -> RwLock<Blockchain> {
        let mut chain = Blockchain::new();
        for peer in peers {
            chain.register_node(*peer);
        }
        RwLock::new(chain)
    }

    #[test]
    fn test_chain_url() {
        assert_eq!(chain_url("http://X"), "http://X/chain");
        assert_eq!(chain_url("http://10.0.0.2:5000/"), "http://10.0.0.2:5000/chain");
        assert_eq!(chain_url("10.0.0.2:5001"), "http://10.0.0.2:5001/chain");
    }

    #[tokio::test]
    async fn test_longer_valid_chain_replaces() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let remote = chain_of(3, "X");
            let resolver = resolver(vec![("http://X", Reply::Chain(remote.clone()))]);
            let ledger = ledger_with_peers(&["http://X"]);
            ledger.write().await.submit_record(MedicalRecord::new("P", "D", "diagnosis", json!({})));

            let resolution = resolver.resolve(&ledger).await;

            assert!(resolution.is_replaced());
            assert_eq!(resolution.chain(), remote.as_slice());
            let chain = ledger.read().await;
            assert_eq!(chain.chain(), remote.as_slice());
            assert_eq!(chain.pending_records().len(), 1);
        })
        .await
        .expect("test_longer_valid_chain_replaces timed out");
    }

    #[tokio::test]
    async fn test_tampered_longer_chain_rejected() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let mut remote = chain_of(2, "X");
            remote[1].previous_hash = "f".repeat(64);
            let resolver = resolver(vec![("http://X", Reply::Chain(remote))]);
            let ledger = ledger_with_peers(&["http://X"]);
            let before = ledger.read().await.chain().to_vec();

            let resolution = resolver.resolve(&ledger).await;

            assert!(!resolution.is_replaced());
            assert_eq!(ledger.read().await.chain(), before.as_slice());
        })
        .await
        .expect("test_tampered_longer_chain_rejected timed out");
    }

    #[tokio::test]
    async fn test_equal_length_keeps_local() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let resolver = resolver(vec![("http://X", Reply::Chain(chain_of(1, "X")))]);
            let ledger = ledger_with_peers(&["http://X"]);
            let before = ledger.read().await.chain().to_vec();

            let resolution = resolver.resolve(&ledger).await;

            assert!(!resolution.is_replaced());
            assert_eq!(resolution.chain(), before.as_slice());
        })
        .await
        .expect("test_equal_length_keeps_local timed out");
    }

    #[tokio::test]
    async fn test_timeout_and_failures_are_skipped() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let resolver = resolver(vec![
                ("http://slow", Reply::Hang),
                ("http://broken", Reply::Fail),
            ]);
            let ledger = ledger_with_peers(&["http://slow", "http://broken", "http://unknown"]);

            let resolution = resolver.resolve(&ledger).await;

            assert!(!resolution.is_replaced());
            assert_eq!(ledger.read().await.len(), 1);
        })
        .await
        .expect("test_timeout_and_failures_are_skipped timed out");
    }

    #[tokio::test]
    async fn test_bad_peer_does_not_hide_good_peer() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let good = chain_of(4, "G");
            let resolver = resolver(vec![
                ("http://a-slow", Reply::Hang),
                ("http://b-good", Reply::Chain(good.clone())),
                ("http://c-broken", Reply::Fail),
            ]);
            let ledger = ledger_with_peers(&["http://a-slow", "http://b-good", "http://c-broken"]);

            let resolution = resolver.resolve(&ledger).await;

            assert!(resolution.is_replaced());
            assert_eq!(resolution.into_chain(), good);
        })
        .await
        .expect("test_bad_peer_does_not_hide_good_peer timed out");
    }

    #[tokio::test]
    async fn test_longest_valid_wins_and_ties_keep_first() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let mut tampered = chain_of(6, "T");
            tampered[3].previous_hash = "0".to_string();
            let first = chain_of(4, "F");
            let second = chain_of(4, "S");
            let resolver = resolver(vec![
                ("http://1", Reply::Chain(chain_of(3, "A"))),
                ("http://2", Reply::Chain(first.clone())),
                ("http://3", Reply::Chain(tampered)),
                ("http://4", Reply::Chain(second)),
            ]);

            let peers: Vec<String> = (1..=4).map(|i| format!("http://{}", i)).collect();
            let best = resolver.best_candidate(&peers, 1).await;

            assert_eq!(best, Some(first));
        })
        .await
        .expect("test_longest_valid_wins_and_ties_keep_first timed out");
    }

    #[tokio::test]
    async fn test_advertised_length_is_not_trusted() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let resolver = resolver(vec![("http://X", Reply::Lying(chain_of(1, "X"), 50))]);
            let ledger = ledger_with_peers(&["http://X"]);

            assert!(!resolver.resolve(&ledger).await.is_replaced());
        })
        .await
        .expect("test_advertised_length_is_not_trusted timed out");
    }

    #[tokio::test]
    async fn test_exhausted_index_chain_rejected_and_mining_continues() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let genesis = Block::genesis();
            let tip = Block::new(u64::MAX, Vec::new(), genesis.compute_hash());
            let resolver = resolver(vec![("http://X", Reply::Chain(vec![genesis, tip]))]);
            let ledger = ledger_with_peers(&["http://X"]);

            assert!(!resolver.resolve(&ledger).await.is_replaced());

            let mut chain = ledger.write().await;
            chain.submit_record(MedicalRecord::new("P", "D", "diagnosis", json!({})));
            let block = chain.mine_block().expect("local chain should still mine");
            assert_eq!(block.index, 1);
        })
        .await
        .expect("test_exhausted_index_chain_rejected_and_mining_continues timed out");
    }

    #[tokio::test]
    async fn test_no_peers_not_replaced() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let resolver = resolver(vec![]);
            let ledger = RwLock::new(Blockchain::new());
            assert!(!resolver.resolve(&ledger).await.is_replaced());
        })
        .await
        .expect("test_no_peers_not_replaced timed out");
    }
}
