/// Shared Azure AI configuration for the launcher and its tools.
///
/// This module provides functionality for managing the global configuration,
/// including:
/// - Hardcoded defaults for every key, so no accessor ever sees a missing value
/// - Deep-merging the persisted `config/azure_ai.json` over those defaults
/// - Overriding credentials from the environment when `prefer_env_vars` is set
/// - Writing the configuration back atomically (temp file, then rename)
///
/// Keys the launcher does not know about are carried through load and save
/// untouched, so newer tools can store their own settings in the same file.
///
/// # Example
///
/// ```rust,no_run
/// use pdf_toolbox::config::{ConfigStore, ProcessEnv};
/// use std::path::Path;
///
/// let store = ConfigStore::new(Path::new("."));
/// let mut config = store.load(&ProcessEnv);
///
/// config.azure_openai.deployment_name = "gpt-4o".to_string();
/// store.save(&config).expect("Failed to save config");
/// ```
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LauncherError, Result};

/// Location of the config file relative to the toolbox root
pub const CONFIG_FILE: &str = "config/azure_ai.json";

pub const DEFAULT_API_VERSION: &str = "2024-02-15-preview";
pub const DEFAULT_DEPLOYMENT: &str = "gpt-4";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AzureOpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub deployment_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AzureOpenAiConfig {
    fn default() -> Self {
        AzureOpenAiConfig {
            endpoint: String::new(),
            api_key: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            deployment_name: DEFAULT_DEPLOYMENT.to_string(),
            extra: Map::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct DocumentIntelligenceConfig {
    pub endpoint: String,
    pub api_key: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ConfigSettings {
    /// Let credential environment variables override the file
    pub prefer_env_vars: bool,
    /// Request timeout for Azure calls, in seconds
    pub timeout: u64,
    pub max_retries: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ConfigSettings {
    fn default() -> Self {
        ConfigSettings {
            prefer_env_vars: true,
            timeout: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            extra: Map::new(),
        }
    }
}

/// Global configuration shared by the launcher and every tool
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct GlobalConfig {
    pub azure_openai: AzureOpenAiConfig,
    pub azure_document_intelligence: DocumentIntelligenceConfig,
    pub settings: ConfigSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Credential-shaped fields that can come from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvField {
    OpenAiEndpoint,
    OpenAiApiKey,
    OpenAiDeployment,
    OpenAiApiVersion,
    DocIntelEndpoint,
    DocIntelApiKey,
}

impl EnvField {
    pub const ALL: [EnvField; 6] = [
        EnvField::OpenAiEndpoint,
        EnvField::OpenAiApiKey,
        EnvField::OpenAiDeployment,
        EnvField::OpenAiApiVersion,
        EnvField::DocIntelEndpoint,
        EnvField::DocIntelApiKey,
    ];

    pub fn env_key(&self) -> &'static str {
        match self {
            EnvField::OpenAiEndpoint => "AZURE_OPENAI_ENDPOINT",
            EnvField::OpenAiApiKey => "AZURE_OPENAI_API_KEY",
            EnvField::OpenAiDeployment => "AZURE_OPENAI_DEPLOYMENT",
            EnvField::OpenAiApiVersion => "AZURE_OPENAI_API_VERSION",
            EnvField::DocIntelEndpoint => "AZURE_DOC_INTEL_ENDPOINT",
            EnvField::DocIntelApiKey => "AZURE_DOC_INTEL_API_KEY",
        }
    }
}

/// Source of environment variables, injectable for tests
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl GlobalConfig {
    fn field_mut(&mut self, field: EnvField) -> &mut String {
        match field {
            EnvField::OpenAiEndpoint => &mut self.azure_openai.endpoint,
            EnvField::OpenAiApiKey => &mut self.azure_openai.api_key,
            EnvField::OpenAiDeployment => &mut self.azure_openai.deployment_name,
            EnvField::OpenAiApiVersion => &mut self.azure_openai.api_version,
            EnvField::DocIntelEndpoint => &mut self.azure_document_intelligence.endpoint,
            EnvField::DocIntelApiKey => &mut self.azure_document_intelligence.api_key,
        }
    }

    /// Copy non-empty credential variables over the current values.
    /// Does nothing unless `settings.prefer_env_vars` is set.
    pub fn apply_env_overrides(&mut self, env: &impl EnvSource) {
        if !self.settings.prefer_env_vars {
            return;
        }

        for field in EnvField::ALL {
            if let Some(value) = env.var(field.env_key()).filter(|v| !v.is_empty()) {
                tracing::debug!("Using {} from environment", field.env_key());
                *self.field_mut(field) = value;
            }
        }
    }

    pub fn is_openai_configured(&self) -> bool {
        !self.azure_openai.endpoint.is_empty() && !self.azure_openai.api_key.is_empty()
    }

    pub fn is_doc_intel_configured(&self) -> bool {
        !self.azure_document_intelligence.endpoint.is_empty()
            && !self.azure_document_intelligence.api_key.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout)
    }

    pub fn max_retries(&self) -> u32 {
        self.settings.max_retries
    }

    /// Human-readable summary of which services are usable
    pub fn status_text(&self) -> String {
        let openai = service_status(
            "Azure OpenAI",
            &self.azure_openai.endpoint,
            &self.azure_openai.api_key,
        );
        let doc_intel = service_status(
            "Document Intelligence",
            &self.azure_document_intelligence.endpoint,
            &self.azure_document_intelligence.api_key,
        );
        format!("{}\n{}", openai, doc_intel)
    }

    /// The form written to disk. API keys are never persisted.
    pub fn to_persisted(&self) -> GlobalConfig {
        let mut persisted = self.clone();
        persisted.azure_openai.api_key.clear();
        persisted.azure_document_intelligence.api_key.clear();
        persisted
    }
}

fn service_status(label: &str, endpoint: &str, api_key: &str) -> String {
    if !endpoint.is_empty() && !api_key.is_empty() {
        return format!("✓ {}: Configured ({})", label, endpoint);
    }

    let mut missing = Vec::new();
    if endpoint.is_empty() {
        missing.push("endpoint");
    }
    if api_key.is_empty() {
        missing.push("API key");
    }
    format!("✗ {}: Not configured (missing: {})", label, missing.join(", "))
}

/// Recursively merge `overlay` into `base`. Objects merge key by key,
/// anything else replaces. `null` in the overlay keeps the base value.
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value);
                    }
                    Some(_) if value.is_null() => {}
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Reads and writes the persisted configuration file
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store for `<root>/config/azure_ai.json`
    pub fn new(root: &Path) -> Self {
        ConfigStore {
            path: root.join(CONFIG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the config file
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Load without env overrides, reporting a malformed or unreadable file
    pub fn read_file(&self) -> Result<GlobalConfig> {
        if !self.path.exists() {
            return Ok(GlobalConfig::default());
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| {
            LauncherError::ConfigRead {
                path: self.path.clone(),
                source,
            }
        })?;

        let malformed = |reason: String| LauncherError::ConfigMalformed {
            path: self.path.clone(),
            reason,
        };

        let file_value: Value =
            serde_json::from_str(&contents).map_err(|e| malformed(e.to_string()))?;
        if !(file_value.is_object() || file_value.is_null()) {
            return Err(malformed("top level is not an object".to_string()));
        }

        let mut merged = serde_json::to_value(GlobalConfig::default())?;
        merge_json(&mut merged, file_value);

        serde_json::from_value(merged).map_err(|e| malformed(e.to_string()))
    }

    /// Load the file and apply env overrides, reporting file problems
    pub fn try_load(&self, env: &impl EnvSource) -> Result<GlobalConfig> {
        let mut config = self.read_file()?;
        config.apply_env_overrides(env);
        Ok(config)
    }

    /// Load the configuration. A missing or broken file yields defaults.
    pub fn load(&self, env: &impl EnvSource) -> GlobalConfig {
        match self.try_load(env) {
            Ok(config) => {
                tracing::info!("Loaded Azure AI config from {}", self.path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Could not load Azure AI config file, using defaults: {}", e);
                let mut config = GlobalConfig::default();
                config.apply_env_overrides(env);
                config
            }
        }
    }

    /// Write `config` to disk atomically. API keys are left out.
    pub fn save(&self, config: &GlobalConfig) -> Result<()> {
        let save_error = |source| LauncherError::ConfigSave {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(self.directory()).map_err(save_error)?;

        let mut json = serde_json::to_string_pretty(&config.to_persisted())?;
        json.push('\n');

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(save_error)?;

        // Atomic rename
        if let Err(source) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(save_error(source));
        }

        tracing::info!("Saved Azure AI config to {}", self.path.display());
        Ok(())
    }
}
