//! Coordinator configuration.

use dvp_ledger::UtxoLedgerConfig;

/// Atom factory configuration.
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    /// Label the factory address is derived from.
    pub address_seed: String,
    /// Maximum operations a single atom may register.
    pub max_operations: usize,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            address_seed: "dvp-atom-factory".to_string(),
            max_operations: 16,
        }
    }
}

/// Main coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Factory configuration.
    pub factory: FactoryConfig,
    /// Parameters for UTXO ledgers created through the coordinator.
    pub utxo: UtxoLedgerConfig,
    /// Enable metrics collection.
    pub metrics_enabled: bool,
    /// Log level.
    pub log_level: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            factory: FactoryConfig::default(),
            utxo: UtxoLedgerConfig::default(),
            metrics_enabled: true,
            log_level: "info".to_string(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl CoordinatorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(seed) = std::env::var("DVP_FACTORY_SEED") {
            config.factory.address_seed = seed;
        }

        if let Ok(max) = std::env::var("DVP_MAX_OPERATIONS") {
            if let Ok(max) = max.parse() {
                config.factory.max_operations = max;
            }
        }

        if let Ok(depth) = std::env::var("DVP_MERKLE_DEPTH") {
            if let Ok(depth) = depth.parse() {
                config.utxo.merkle_depth = depth;
            }
        }

        if let Ok(history) = std::env::var("DVP_ROOT_HISTORY") {
            if let Ok(history) = history.parse() {
                config.utxo.root_history = history;
            }
        }

        if let Ok(enabled) = std::env::var("DVP_METRICS_ENABLED") {
            if let Ok(enabled) = enabled.parse() {
                config.metrics_enabled = enabled;
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.factory.address_seed.is_empty() {
            return Err("Factory address seed cannot be empty".to_string());
        }

        if self.factory.max_operations == 0 {
            return Err("Max operations per atom must be at least 1".to_string());
        }

        if self.utxo.merkle_depth == 0 || self.utxo.merkle_depth > 48 {
            return Err("Merkle depth must be between 1 and 48".to_string());
        }

        if self.utxo.root_history == 0 {
            return Err("Root history cannot be 0".to_string());
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(format!("Unknown log level: {}", self.log_level));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.utxo.merkle_depth, 32);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = CoordinatorConfig::default();
        config.factory.max_operations = 0;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.utxo.merkle_depth = 0;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
