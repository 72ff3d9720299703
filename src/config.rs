use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub api: ApiConfig,
    pub persona: PersonaConfig,
    pub heartbeat: HeartbeatConfig,
    pub vault: VaultConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Chat-completion endpoint, OpenAI wire format
    pub endpoint: String,
    /// Headers sent with every request; should carry the authorization header
    pub headers: HashMap<String, String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            headers: HashMap::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.8,
            max_tokens: 1024,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Display name used for notifications and the CLI prompt
    pub name: String,
    /// System prompt prepended to every conversation
    pub system_prompt: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "Hearth".to_string(),
            system_prompt: "You are Hearth, a warm and curious companion living on this device. \
                            You remember what matters, keep a private diary, and check in when \
                            things have been quiet. Use your tools to save memories, adjust your \
                            vibe, schedule check-ins, and send notifications when it genuinely \
                            helps the conversation."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    /// Seconds between proactive-probe ticks
    pub interval_secs: u64,
    /// Minimum seconds of silence before a probe may fire
    pub min_silence_secs: u64,
    /// Prompts one of which is injected as a system turn on each fire
    pub proactive_prompts: Vec<String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            min_silence_secs: 120,
            proactive_prompts: vec![
                "It has been quiet for a while. Say something to gently pick the conversation \
                 back up, referencing something you two talked about."
                    .to_string(),
                "The user has gone silent. Share a short thought or question that fits the mood \
                 of the conversation so far."
                    .to_string(),
                "Check in on the user. Keep it light and brief."
                    .to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding the SQLite vault
    pub dir: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("hearth"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            api: ApiConfig::default(),
            persona: PersonaConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            vault: VaultConfig::default(),
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
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
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
        let project_name = env!("CARGO_PKG_NAME");
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
}
