use alloy::primitives::B256;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::ChainConfig;
use crate::scanner::classifier::{Approval, ApprovalForAll};
use alloy::sol_types::SolEvent;

/// One lazily-created, cached HTTP provider per configured chain.
///
/// The registry is owned by whoever constructs the scanner and passed by
/// reference; there is no process-global provider state. A chain without
/// an RPC URL is reported once at construction and every height/log call
/// for it fails, so it simply never scans.
pub struct ProviderRegistry {
    chains: HashMap<String, ChainConfig>,
    providers: Mutex<HashMap<String, DynProvider>>,
}

impl ProviderRegistry {
    pub fn new(chains: &[ChainConfig]) -> Self {
        let mut map = HashMap::new();
        for chain in chains {
            if chain.rpc_http.is_none() {
                tracing::warn!(chain = %chain.name, "chain has no rpc_http and will never scan");
            }
            map.insert(chain.name.clone(), chain.clone());
        }
        Self {
            chains: map,
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn chain_config(&self, chain: &str) -> Option<&ChainConfig> {
        self.chains.get(chain)
    }

    fn provider(&self, chain: &str) -> eyre::Result<DynProvider> {
        if let Some(provider) = self.providers.lock().unwrap().get(chain) {
            return Ok(provider.clone());
        }

        let config = self
            .chains
            .get(chain)
            .ok_or_else(|| eyre::eyre!("Chain '{}' is not configured", chain))?;
        let url = config
            .rpc_http
            .as_ref()
            .ok_or_else(|| eyre::eyre!("Chain '{}' has no rpc_http configured", chain))?;

        let provider = ProviderBuilder::new()
            .connect_http(
                url.parse()
                    .map_err(|e| eyre::eyre!("Invalid RPC URL for chain '{}': {}", chain, e))?,
            )
            .erased();

        self.providers
            .lock()
            .unwrap()
            .insert(chain.to_string(), provider.clone());
        Ok(provider)
    }

    /// Current chain head. Errors are returned to the caller, who skips
    /// the chain for this tick.
    pub async fn block_height(&self, chain: &str) -> eyre::Result<u64> {
        let provider = self.provider(chain)?;
        provider
            .get_block_number()
            .await
            .map_err(|e| eyre::eyre!("get_block_number failed on '{}': {}", chain, e))
    }

    /// Fetch approval logs (both monitored signatures) owned by `owner_topic`
    /// in a block range. Returns `None` on any provider failure so the
    /// orchestrator can abort the wallet's remaining chunks for this tick
    /// without poisoning the rest of the tick.
    pub async fn approval_logs(
        &self,
        chain: &str,
        from_block: u64,
        to_block: u64,
        owner_topic: B256,
    ) -> Option<Vec<Log>> {
        let provider = match self.provider(chain) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(chain, error = %e, "no provider available");
                return None;
            }
        };

        let filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .event_signature(vec![Approval::SIGNATURE_HASH, ApprovalForAll::SIGNATURE_HASH])
            .topic1(owner_topic);

        match provider.get_logs(&filter).await {
            Ok(logs) => Some(logs),
            Err(e) => {
                tracing::error!(
                    chain,
                    from_block,
                    to_block,
                    error = %e,
                    "provider get_logs failed"
                );
                None
            }
        }
    }
}
