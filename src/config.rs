//! Configuration for the simulation.
//!
//! Loaded from YAML; every section falls back to its defaults when omitted.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Problems found while loading or checking a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("grid must be at least 2x2, got {width}x{height}")]
    GridTooSmall { width: usize, height: usize },
    #[error("max_instr must be a non-zero multiple of 16, got {0}")]
    GenomeLength(usize),
    #[error("batch_size must be > 0")]
    ZeroBatch,
    #[error("inflow frequency must be > 0")]
    ZeroInflowFrequency,
    #[error("failed_kill_penalty must be > 0")]
    ZeroKillPenalty,
    #[error("config i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("cannot start {threads} worker threads: {source}")]
    ThreadPool {
        threads: usize,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub genome: GenomeConfig,
    #[serde(default)]
    pub evolution: EvolutionConfig,
    #[serde(default)]
    pub inflow: InflowConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Grid dimensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenomeConfig {
    /// Genome length in 4-bit units
    pub max_instr: usize,
}

/// Mutation and predation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Per-instruction mutation probability, as a numerator over 2^32
    pub mutation_rate: u32,
    /// Divisor of the energy lost on a failed KILL against a viable cell
    pub failed_kill_penalty: u64,
}

/// Periodic energy and random-genome injection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InflowConfig {
    /// Ticks between inflows
    pub frequency: u64,
    /// Energy always added
    pub base: u64,
    /// Upper bound (exclusive) of the random extra energy; 0 disables it
    pub variation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cells picked per batch
    pub batch_size: usize,
    /// Worker threads (0 = one per core)
    pub threads: usize,
    /// Stream `i` is seeded with `seed + i`, wrapping at 32 bits
    pub seed: u32,
    /// Draws discarded from the global stream before the first batch
    pub rng_warmup: usize,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Ticks between update rows (0 disables)
    pub update_interval: u64,
    /// Ticks between report files (0 disables)
    pub report_interval: u64,
    /// Directory for report files
    pub report_dir: String,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Keep update rows in memory
    pub history: bool,
    /// Most recent update rows kept in memory (0 = no limit)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    10_000
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

impl Default for GenomeConfig {
    fn default() -> Self {
        Self { max_instr: 512 }
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            mutation_rate: 21475,
            failed_kill_penalty: 2,
        }
    }
}

impl Default for InflowConfig {
    fn default() -> Self {
        Self {
            frequency: 100,
            base: 4000,
            variation: 8000,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            threads: 0,
            seed: 1234567890,
            rng_warmup: 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            update_interval: 100_000,
            report_interval: 10_000_000,
            report_dir: ".".to_string(),
            log_level: "info".to_string(),
            history: true,
            history_limit: default_history_limit(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let GridConfig { width, height } = self.grid;
        if width < 2 || height < 2 {
            return Err(ConfigError::GridTooSmall { width, height });
        }
        let len = self.genome.max_instr;
        if len == 0 || len % 16 != 0 {
            return Err(ConfigError::GenomeLength(len));
        }
        if self.scheduler.batch_size == 0 {
            return Err(ConfigError::ZeroBatch);
        }
        if self.inflow.frequency == 0 {
            return Err(ConfigError::ZeroInflowFrequency);
        }
        if self.evolution.failed_kill_penalty == 0 {
            return Err(ConfigError::ZeroKillPenalty);
        }
        Ok(())
    }

    /// Small grid for tests and benchmarks.
    pub fn small(width: usize, height: usize) -> Self {
        let mut config = Config::default();
        config.grid = GridConfig { width, height };
        config.genome.max_instr = 64;
        config.inflow.frequency = 10;
        config.inflow.base = 500;
        config.inflow.variation = 500;
        config.scheduler.batch_size = 16;
        config.scheduler.rng_warmup = 0;
        config.logging.update_interval = 1000;
        config.logging.report_interval = 0;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(Config::small(4, 4).validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nanopond.yaml");

        let mut config = Config::default();
        config.grid.width = 32;
        config.scheduler.seed = 99;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.grid.width, 32);
        assert_eq!(loaded.scheduler.seed, 99);
        assert_eq!(loaded.genome.max_instr, config.genome.max_instr);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "grid:\n  width: 10\n  height: 12\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.grid.height, 12);
        assert_eq!(config.inflow.base, 4000);
        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.logging.history_limit, 10_000);
    }

    #[test]
    fn test_seed_must_fit_32_bits() {
        let yaml = "scheduler:\n  batch_size: 100\n  threads: 0\n  seed: 4294967295\n  rng_warmup: 0\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.scheduler.seed, u32::MAX);

        let yaml = yaml.replace("4294967295", "4294967297");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn test_rejects_bad_genome_length() {
        let mut config = Config::default();
        config.genome.max_instr = 100;
        assert!(matches!(config.validate(), Err(ConfigError::GenomeLength(100))));
        config.genome.max_instr = 0;
        assert!(matches!(config.validate(), Err(ConfigError::GenomeLength(0))));
    }

    #[test]
    fn test_rejects_degenerate_values() {
        let mut config = Config::default();
        config.grid.width = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::GridTooSmall { width: 1, .. })
        ));

        let mut config = Config::default();
        config.scheduler.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBatch)));

        let mut config = Config::default();
        config.inflow.frequency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInflowFrequency)));

        let mut config = Config::default();
        config.evolution.failed_kill_penalty = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroKillPenalty)));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/nanopond.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
