use crate::config::WorkerAlgorithmConfig;
use crate::error::ConfigError;
use crate::registry::{Algorithm, Miner, Registry};
use std::sync::Arc;
use tracing::{debug, warn};

/// 工作机上的一个矿工程序及其额定算力 (H/s)
#[derive(Debug, Clone)]
pub struct WorkerMiner {
    pub miner: Arc<Miner>,
    pub rate: f64,
}

/// 工作机允许使用的算法
///
/// 矿工程序按额定算力降序排列，第一个就是最佳矿工程序。
#[derive(Debug, Clone)]
pub struct WorkerAlgorithm {
    pub algorithm: Arc<Algorithm>,
    miners: Vec<WorkerMiner>,
    whitelist: Option<Vec<String>>,
    blacklist: Option<Vec<String>>,
}

impl WorkerAlgorithm {
    pub fn new(algorithm: Arc<Algorithm>, mut miners: Vec<WorkerMiner>) -> Self {
        // 稳定排序, 算力相同时保持配置顺序
        miners.sort_by(|a, b| b.rate.total_cmp(&a.rate));
        Self { algorithm, miners, whitelist: None, blacklist: None }
    }

    pub fn with_whitelist(mut self, coins: &[&str]) -> Self {
        self.whitelist = Some(coins.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_blacklist(mut self, coins: &[&str]) -> Self {
        self.blacklist = Some(coins.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn from_config(
        worker_id: &str,
        algo_id: &str,
        config: &WorkerAlgorithmConfig,
        registry: &Registry,
    ) -> Result<Self, ConfigError> {
        let algorithm = registry.algorithm(algo_id).ok_or_else(|| ConfigError::UnknownReference {
            kind: "algorithm",
            id: algo_id.to_string(),
        })?;

        let mut miners = Vec::with_capacity(config.miners.len());
        for (miner_id, miner) in &config.miners {
            let Some(found) = registry.miner(miner_id) else {
                warn!(worker = %worker_id, "Unknown miner '{}' for algorithm '{}'", miner_id, algo_id);
                continue;
            };
            match miner.rate.hashes_per_second() {
                Some(rate) => miners.push(WorkerMiner { miner: found.clone(), rate }),
                None => warn!(
                    worker = %worker_id,
                    "Invalid rate {:?} for miner '{}', ignoring it",
                    miner.rate,
                    miner_id
                ),
            }
        }

        let mut algorithm = Self::new(algorithm.clone(), miners);
        algorithm.whitelist = config.whitelist_coins.clone();
        algorithm.blacklist = config.blacklist_coins.clone();
        Ok(algorithm)
    }

    pub fn id(&self) -> &str {
        &self.algorithm.id
    }

    pub fn miners(&self) -> &[WorkerMiner] {
        &self.miners
    }

    pub fn best_miner(&self) -> Option<&WorkerMiner> {
        self.miners.first()
    }

    /// 币种是否可以在此算法上挖: 白名单 (如果有) 必须包含它，黑名单不能包含它
    pub fn supports_coin(&self, coin_id: &str) -> bool {
        if let Some(whitelist) = &self.whitelist {
            if !whitelist.iter().any(|c| c == coin_id) {
                debug!("Coin '{}' not in whitelist of '{}'", coin_id, self.algorithm.id);
                return false;
            }
        }
        if let Some(blacklist) = &self.blacklist {
            if blacklist.iter().any(|c| c == coin_id) {
                debug!("Coin '{}' blacklisted for '{}'", coin_id, self.algorithm.id);
                return false;
            }
        }
        true
    }
}
