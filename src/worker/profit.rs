//! 收益决策引擎
//!
//! 每个周期用最新的统计快照为工作机挑选最赚钱的 (币种, 矿工程序, 矿池)，
//! 只有当收益提升超过阈值时才切换，避免在收益相近的选项之间来回重启。

use crate::event::Signal;
use crate::feed::StatCoin;
use crate::registry::Coin;
use crate::utils::format_hashrate;
use crate::vars;
use crate::worker::{Host, JobKey, Worker, WorkerJob};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 一次切换检查的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchOutcome {
    /// 没有可用的币种, 保留原任务
    NoCandidates,
    /// 最佳候选的收益提升不足
    BelowThreshold { current: String, candidate: String },
    /// 最佳候选就是当前任务
    Unchanged,
    /// 当前任务的进程已退出, 原地重启
    Restarted,
    Switched { from: Option<String>, to: String },
}

/// 按收益排好序的候选币种
#[derive(Debug, Clone)]
pub struct RankedCoin<'a> {
    pub stat: &'a StatCoin,
    pub coin: Arc<Coin>,
    pub profit: f64,
}

impl Worker {
    /// 本工作机挖此币种的收益: 收益率 × (最佳矿工程序算力 ÷ 矿池算力)
    ///
    /// 币种未登记、收益字段缺失或矿池算力无效时返回 `None`；
    /// 算法下没有矿工程序时返回 -1。
    pub fn calc_profit(&self, stat: &StatCoin) -> Option<f64> {
        let Some(coin) = self.context.registry.coin(&stat.coin_name) else {
            warn!(worker = %self.id, "Coin '{}' is not registered", stat.coin_name);
            return None;
        };
        let Some(algorithm) = self.worker_algorithm(&coin.algorithm) else {
            warn!(worker = %self.id, "Filter did not exclude coin '{}'", stat.coin_name);
            return None;
        };
        let Some(best) = algorithm.best_miner() else {
            error!(worker = %self.id, "No miners for coin {}", stat.coin_name);
            return Some(-1.0);
        };

        let Some(rate) = stat.profit_rate(self.profit_field) else {
            debug!(worker = %self.id, "No {:?} value for {}", self.profit_field, stat.coin_name);
            return None;
        };
        let pool_rate = match stat.pool_hashrate() {
            Some(pool) if pool > 0.0 => pool,
            _ => {
                warn!(
                    worker = %self.id,
                    "Invalid pool hashrate '{}' for {}, skipping it",
                    stat.pool_hash,
                    stat.coin_name
                );
                return None;
            }
        };

        let profit = rate * (best.rate / pool_rate);
        if !profit.is_finite() {
            return None;
        }
        debug!(
            worker = %self.id,
            "Calculated profit for {} on {}: {:.8}",
            stat.coin_name,
            best.miner.id,
            profit
        );
        Some(profit)
    }

    /// 过滤并按收益降序排列; 收益相同时保持统计数据中的顺序
    pub fn rank_coins<'a>(&self, stats: &'a [StatCoin]) -> Vec<RankedCoin<'a>> {
        let mut ranked: Vec<RankedCoin<'a>> = stats
            .iter()
            .filter(|stat| self.supports_coin(&stat.coin_name))
            .filter_map(|stat| {
                let coin = self.context.registry.coin(&stat.coin_name)?.clone();
                let profit = self.calc_profit(stat)?;
                Some(RankedCoin { stat, coin, profit })
            })
            .collect();
        ranked.sort_by(|a, b| b.profit.total_cmp(&a.profit));
        ranked
    }

    /// 根据统计快照切换任务
    pub async fn switch_algo(&mut self, stats: &[StatCoin]) -> SwitchOutcome {
        let ranked = self.rank_coins(stats);
        let Some(best) = ranked.first() else {
            error!(worker = %self.id, "No valid coins for worker {}, not switching!", self.name);
            return SwitchOutcome::NoCandidates;
        };

        let Some(algorithm) = self.worker_algorithm(&best.coin.algorithm) else {
            return SwitchOutcome::NoCandidates;
        };
        let Some(best_miner) = algorithm.best_miner() else {
            error!(worker = %self.id, "No miners for algorithm {}", algorithm.id());
            return SwitchOutcome::NoCandidates;
        };
        let algorithm = algorithm.algorithm.clone();
        let miner = best_miner.miner.clone();
        let miner_rate = best_miner.rate;

        let host = Host::new(&best.stat.direct_mining_host, best.stat.port);
        let key = JobKey {
            algorithm: algorithm.id.clone(),
            coin: best.coin.id.clone(),
            miner: miner.id.clone(),
            host: host.clone(),
        };

        if let Some(job) = self.current_job.as_mut() {
            if job.is_same(&key) {
                if !job.alive() && !self.paused {
                    warn!(worker = %self.id, "Miner for {} is not running, restarting it", key.coin);
                    let env = job.environment(&self.id, &self.context.settings);
                    if let Err(e) = job.start(&env).await {
                        error!(worker = %self.id, "Unable to restart {}: {}", key.coin, e);
                    }
                    return SwitchOutcome::Restarted;
                }
                debug!(worker = %self.id, "Not changing coins");
                return SwitchOutcome::Unchanged;
            }
        }

        // 任务身份变化 (包括同币种换主机) 都要先过阈值
        if let Some(job) = self.current_job.as_ref() {
            if let Some(current) = ranked.iter().find(|r| r.coin.id == job.coin().id) {
                if best.profit < current.profit * self.percent_profit_threshold {
                    debug!(
                        worker = %self.id,
                        "Not switching from {} to {} (not enough increase)",
                        current.coin.id,
                        best.coin.id
                    );
                    return SwitchOutcome::BelowThreshold {
                        current: current.coin.id.clone(),
                        candidate: best.coin.id.clone(),
                    };
                }
            }
        }

        let last_coin = match self.current_job.take() {
            Some(mut job) => {
                job.stop().await;
                Some(job.coin().clone())
            }
            None => None,
        };

        let coin = best.coin.clone();
        let profit = best.profit;
        let executor = self.context.supervisor.executor(miner.app.clone());
        let mut job = WorkerJob::new(algorithm, coin.clone(), miner, host, miner_rate, profit, executor);

        info!(
            worker = %self.id,
            "Switching to {} ({}) on {} at {}, profit {:.8}",
            coin.id,
            coin.algorithm,
            job.miner().id,
            format_hashrate(miner_rate),
            profit
        );
        if self.paused {
            debug!(worker = %self.id, "Worker is paused, job will start on resume");
        } else {
            let env = job.environment(&self.id, &self.context.settings);
            if let Err(e) = job.start(&env).await {
                error!(worker = %self.id, "Unable to start mining {}: {}", coin.id, e);
            }
        }
        self.current_job = Some(job);

        let last_id = last_coin.as_ref().map(|c| c.id.clone());
        let last_algo = last_coin.as_ref().map(|c| c.algorithm.clone());

        self.fire_event(
            Signal::SwitchCoin,
            vars! { "TASK.LAST_COIN.ID" => last_id.clone(), "TASK.LAST_COIN.ALGO" => last_algo.clone() },
        )
        .await;

        if last_algo.as_deref() != Some(coin.algorithm.as_str()) {
            self.fire_event(Signal::SwitchAlgorithm, vars! { "TASK.LAST_COIN.ALGO" => last_algo })
                .await;
        }

        if last_coin.is_none() {
            self.fire_event(Signal::StartMining, vars! {}).await;
        }

        SwitchOutcome::Switched { from: last_id, to: coin.id.clone() }
    }
}
