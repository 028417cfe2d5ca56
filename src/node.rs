use crate::api::{self, AppState};
use crate::blockchain::Blockchain;
use crate::config::Config;
use crate::consensus::ConsensusResolver;
use crate::error::ChainError;
use crate::miner::spawn_miner;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("carechain=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// One running ledger node: the shared chain plus the services built around it.
pub struct Node {
    pub config: Config,
    pub blockchain: Arc<RwLock<Blockchain>>,
    pub resolver: Arc<ConsensusResolver>,
}

impl Node {
    pub fn new(config: Config) -> Result<Self, ChainError> {
        config.validate()?;

        let mut blockchain = Blockchain::new();
        for peer in &config.network.bootstrap_peers {
            blockchain.register_node(peer.clone());
        }

        let resolver = ConsensusResolver::http(config.peer_timeout())
            .map_err(|e| ChainError::NetworkError(format!("Failed to build peer client: {}", e)))?;

        Ok(Self {
            config,
            blockchain: Arc::new(RwLock::new(blockchain)),
            resolver: Arc::new(resolver),
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.blockchain.clone(), self.resolver.clone())
    }

    /// Bind the configured address and serve until `shutdown` resolves. The
    /// background miner, when enabled, runs for the lifetime of the server.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ChainError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind = self.config.bind_address();
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|e| ChainError::NetworkError(format!("Cannot bind {}: {}", bind, e)))?;

        info!(
            address = %bind,
            peers = self.config.network.bootstrap_peers.len(),
            "starting CareChain node"
        );

        let miner = if self.config.miner.enabled {
            Some(spawn_miner(self.blockchain.clone(), self.config.mine_interval()))
        } else {
            warn!("background miner disabled; blocks are only mined via /mine");
            None
        };

        let result = api::serve(self.app_state(), listener, shutdown).await;

        if let Some(miner) = miner {
            miner.abort();
        }
        info!("node stopped");
        result
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
