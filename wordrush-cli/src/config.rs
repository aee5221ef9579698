use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use wordrush_core::{ClientConfig, Network};

pub const DB_FILE: &str = "wordrush.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub client: ClientConfig,
    /// Address used when `--player` is not given.
    pub player: String,
    /// Word list loaded into the simulated contract.
    pub words: Vec<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new(Network::Simnet),
            player: "ST1SJ3DTE5DN7X54YDH5D64R3BCB6A2AG2ZQ8YPD5".to_string(),
            words: ["apple", "crane", "slate", "pious", "rusty", "chain", "world", "tweet"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
        }
    }
}

impl CliConfig {
    /// Load from a JSON file, or fall back to defaults.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config: Self = match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.client.validate()?;
        if config.words.is_empty() {
            anyhow::bail!("Word list cannot be empty");
        }
        Ok(config)
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wordrush")
}
