use crate::config::AlgorithmConfig;

/// 挖矿算法
#[derive(Debug, Clone, PartialEq)]
pub struct Algorithm {
    pub id: String,
    pub name: String,
    coins: Vec<String>,
}

/// 币种, 属于且仅属于一个算法
#[derive(Debug, Clone, PartialEq)]
pub struct Coin {
    pub id: String,
    pub name: String,
    pub algorithm: String,
}

impl Algorithm {
    pub fn new(id: &str, name: &str) -> Self {
        Self { id: id.to_string(), name: name.to_string(), coins: Vec::new() }
    }

    /// 从配置构造算法及其币种
    pub fn from_config(config: &AlgorithmConfig) -> (Self, Vec<Coin>) {
        let name = config.name.clone().unwrap_or_else(|| config.id.clone());
        let mut algorithm = Self::new(&config.id, &name);
        let coins = config
            .coins
            .iter()
            .map(|c| {
                algorithm.coins.push(c.id.clone());
                Coin {
                    id: c.id.clone(),
                    name: c.name.clone().unwrap_or_else(|| c.id.clone()),
                    algorithm: config.id.clone(),
                }
            })
            .collect();
        (algorithm, coins)
    }

    pub fn coin_ids(&self) -> &[String] {
        &self.coins
    }

    pub fn has_coin(&self, coin_id: &str) -> bool {
        self.coins.iter().any(|c| c == coin_id)
    }
}

impl Coin {
    pub fn new(id: &str, algorithm: &str) -> Self {
        Self { id: id.to_string(), name: id.to_string(), algorithm: algorithm.to_string() }
    }
}
