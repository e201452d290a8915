use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub store: Store,
    pub assistant: Assistant,
    #[serde(default)]
    pub workflow: Workflow,
    #[serde(default)]
    pub documents: Documents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    #[serde(rename = "type")]
    pub kind: String,
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub mode: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the bearer token, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "default_income_threshold")]
    pub income_threshold: u64,
    #[serde(default = "seva_kernel::default_escalation_phrases")]
    pub escalation_phrases: Vec<String>,
    #[serde(default = "default_escalation_delay_ms")]
    pub escalation_delay_ms: u64,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            income_threshold: default_income_threshold(),
            escalation_phrases: seva_kernel::default_escalation_phrases(),
            escalation_delay_ms: default_escalation_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Documents {
    #[serde(default = "default_enrichment_timeout_ms")]
    pub enrichment_timeout_ms: u64,
}

impl Default for Documents {
    fn default() -> Self {
        Self {
            enrichment_timeout_ms: default_enrichment_timeout_ms(),
        }
    }
}

fn default_income_threshold() -> u64 {
    seva_kernel::DEFAULT_INCOME_THRESHOLD
}

fn default_escalation_delay_ms() -> u64 {
    1_200
}

fn default_enrichment_timeout_ms() -> u64 {
    15_000
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    parse_and_validate(&config_text)
}

pub fn parse_and_validate(config_text: &str) -> Result<Config, ConfigError> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.store.kind != "memory" && cfg.store.kind != "sqlite" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "store.type={} is not implemented; supported: memory, sqlite",
            cfg.store.kind
        )));
    }
    if cfg.store.kind == "memory" && cfg.store.sqlite_path.is_some() {
        return Err(ConfigError::UnsupportedConfig(
            "store.sqlite_path is not supported when store.type=memory".to_string(),
        ));
    }
    if cfg.store.kind == "sqlite" && is_blank(cfg.store.sqlite_path.as_deref()) {
        return Err(ConfigError::UnsupportedConfig(
            "store.sqlite_path is required when store.type=sqlite".to_string(),
        ));
    }
    match cfg.assistant.mode.as_str() {
        "builtin" => {}
        "http" => {
            if is_blank(cfg.assistant.endpoint.as_deref()) {
                return Err(ConfigError::UnsupportedConfig(
                    "assistant.endpoint is required when assistant.mode=http".to_string(),
                ));
            }
        }
        other => {
            return Err(ConfigError::UnsupportedConfig(format!(
                "assistant.mode={other} is not implemented; supported: builtin, http"
            )));
        }
    }
    if cfg.workflow.income_threshold == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "workflow.income_threshold must be >= 1".to_string(),
        ));
    }
    if cfg
        .workflow
        .escalation_phrases
        .iter()
        .any(|p| p.trim().is_empty())
    {
        return Err(ConfigError::UnsupportedConfig(
            "workflow.escalation_phrases must not contain blank phrases".to_string(),
        ));
    }
    if cfg.documents.enrichment_timeout_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "documents.enrichment_timeout_ms must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}
