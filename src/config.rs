use conductor::capability::{CommandCapability, CommandConfig};
use conductor::pipeline::{DEFAULT_DEADLINE_MS, PipelineConfig};
use conductor::supervisor::Budget;
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub concurrency: ConcurrencyConfig,
    pub budget: BudgetConfig,
    pub pipeline: PipelineSection,
    pub events: EventsConfig,
    pub capabilities: CapabilitiesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub max_jobs_per_round: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_jobs_per_round: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_rounds: u32,
    pub max_tool_calls: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            max_tool_calls: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub deadline_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_DEADLINE_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of the live-update channel shown in verbose mode
    pub forward_capacity: usize,
    /// Write every event envelope to the log
    pub audit: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            forward_capacity: 256,
            audit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub command: String,
    pub timeout_ms: u64,
    pub env: BTreeMap<String, String>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            timeout_ms: 120000,
            env: BTreeMap::new(),
        }
    }
}

impl CapabilityConfig {
    pub fn is_configured(&self) -> bool {
        !self.command.trim().is_empty()
    }

    /// Build the process-backed capability, failing if no command is set
    pub fn build(&self, name: &str) -> Result<CommandCapability> {
        if !self.is_configured() {
            return Err(eyre!("No command configured for capabilities.{}", name));
        }
        let config = self
            .env
            .iter()
            .fold(CommandConfig::new(&self.command).timeout_ms(self.timeout_ms), |config, (k, v)| {
                config.env(k, v)
            });
        Ok(CommandCapability::new(name, config))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    pub producer: CapabilityConfig,
    pub summarizer: CapabilityConfig,
    pub reviewer: CapabilityConfig,
    pub planner: CapabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            concurrency: ConcurrencyConfig::default(),
            budget: BudgetConfig::default(),
            pipeline: PipelineSection::default(),
            events: EventsConfig::default(),
            capabilities: CapabilitiesConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn budget(&self) -> Budget {
        Budget::default()
            .with_max_rounds(self.budget.max_rounds)
            .with_max_tool_calls(self.budget.max_tool_calls)
            .with_max_jobs_per_round(self.concurrency.max_jobs_per_round)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            deadline_ms: self.pipeline.deadline_ms,
        }
    }
}
