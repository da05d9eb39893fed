use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SynthError, SynthResult};

pub const ENV_API_KEY: &str = "AZURE_OPENAI_API_KEY";
pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
pub const ENV_DATA_DEPLOYMENT: &str = "AZURE_OPENAI_GPT4O_MINI_DEPLOYMENT";
pub const ENV_VISION_DEPLOYMENT: &str = "AZURE_OPENAI_GPT4O_MODEL_DEPLOYMENT";

const DEFAULT_API_VERSION: &str = "2024-02-01";
const DEFAULT_DATA_DEPLOYMENT: &str = "gpt-4o-mini";
const DEFAULT_VISION_DEPLOYMENT: &str = "gpt-4o";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub ai: AiConfig,
    pub generation: GenerationConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Per-request timeout for the completion endpoint
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub labels_temperature: f32,
    pub labels_max_tokens: u32,
    pub data_temperature: f32,
    pub data_max_tokens: u32,
    pub avm_temperature: f32,
    pub avm_max_tokens: u32,

    /// Forms with more typed fields than this are generated in chunks
    pub chunk_threshold: usize,
    pub chunk_size: usize,

    /// Warn when completion tokens come this close to the limit
    pub truncation_margin: u32,

    /// Carry identity values across documents for the same variant index
    pub persona_consistency: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Use whatever the host has installed
    Auto,
    Html,
    Pdf,
    Images,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: RenderMode,
    pub html_to_pdf_tool: String,
    pub rasterizer_tool: String,
    pub form_page_dpi: u32,
    pub field_name_page_dpi: u32,
    pub report_page_dpi: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: PathBuf,
    pub enable_file_logging: bool,
    /// Sub-directory and file prefix of the per-run log
    pub prefix: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 300,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            labels_temperature: 0.1,
            labels_max_tokens: 12_000,
            data_temperature: 1.0,
            data_max_tokens: 16_000,
            avm_temperature: 0.9,
            avm_max_tokens: 4_000,
            chunk_threshold: 200,
            chunk_size: 150,
            truncation_margin: 100,
            persona_consistency: true,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::Auto,
            html_to_pdf_tool: "wkhtmltopdf".to_string(),
            rasterizer_tool: "pdftoppm".to_string(),
            form_page_dpi: 300,
            field_name_page_dpi: 200,
            report_page_dpi: 150,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            enable_file_logging: true,
            prefix: "SyntheticData".to_string(),
        }
    }
}

impl SynthConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> SynthResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SynthError::configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            SynthError::configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Defaults with environment overrides applied
    pub fn load_from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(mode) = lookup("FORMSYNTH_RENDER_MODE") {
            match mode.to_lowercase().as_str() {
                "auto" => self.render.mode = RenderMode::Auto,
                "html" => self.render.mode = RenderMode::Html,
                "pdf" => self.render.mode = RenderMode::Pdf,
                "images" => self.render.mode = RenderMode::Images,
                _ => {}
            }
        }

        if let Some(timeout) = lookup("FORMSYNTH_REQUEST_TIMEOUT_SECS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.ai.request_timeout_secs = value;
            }
        }

        if let Some(persona) = lookup("FORMSYNTH_PERSONA_CONSISTENCY") {
            self.generation.persona_consistency = persona.to_lowercase() == "true";
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> SynthResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| SynthError::configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| SynthError::write(path.display().to_string(), e))
    }
}

/// Credentials and deployments for the completion service
#[derive(Clone)]
pub struct AiCredentials {
    pub api_key: String,
    pub endpoint: String,
    pub api_version: String,
    /// Deployment used for synthetic values
    pub data_deployment: String,
    /// Deployment used for reading form images into labels
    pub vision_deployment: String,
}

impl std::fmt::Debug for AiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiCredentials")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("data_deployment", &self.data_deployment)
            .field("vision_deployment", &self.vision_deployment)
            .finish()
    }
}

impl AiCredentials {
    pub fn from_env() -> SynthResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SynthResult<Self> {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = [ENV_API_KEY, ENV_ENDPOINT]
            .into_iter()
            .filter(|key| present(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(SynthError::configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            api_key: present(ENV_API_KEY).unwrap_or_default(),
            endpoint: present(ENV_ENDPOINT).unwrap_or_default(),
            api_version: present(ENV_API_VERSION).unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            data_deployment: present(ENV_DATA_DEPLOYMENT)
                .unwrap_or_else(|| DEFAULT_DATA_DEPLOYMENT.to_string()),
            vision_deployment: present(ENV_VISION_DEPLOYMENT)
                .unwrap_or_else(|| DEFAULT_VISION_DEPLOYMENT.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SynthConfig::default();
        assert_eq!(config.generation.chunk_threshold, 200);
        assert_eq!(config.generation.chunk_size, 150);
        assert_eq!(config.render.mode, RenderMode::Auto);
        assert!(config.generation.persona_consistency);
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("formsynth.toml");
        std::fs::write(&config_path, "[render]\nmode = \"html\"\n").unwrap();

        let loaded = SynthConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.render.mode, RenderMode::Html);
        assert_eq!(loaded.render.rasterizer_tool, "pdftoppm");
        assert_eq!(loaded.ai.request_timeout_secs, 300);
        assert_eq!(loaded.generation.chunk_size, 150);
        assert_eq!(loaded.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let mut config = SynthConfig::default();
        config.render.mode = RenderMode::Html;
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("formsynth.toml");

        config.save_to_file(&config_path).unwrap();

        let loaded = SynthConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.render.mode, RenderMode::Html);
        assert_eq!(loaded.generation.data_max_tokens, 16_000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SynthConfig::default();
        config.apply_overrides(lookup_from(&[
            ("FORMSYNTH_RENDER_MODE", "PDF"),
            ("FORMSYNTH_REQUEST_TIMEOUT_SECS", "42"),
            ("FORMSYNTH_PERSONA_CONSISTENCY", "false"),
        ]));
        assert_eq!(config.render.mode, RenderMode::Pdf);
        assert_eq!(config.ai.request_timeout_secs, 42);
        assert!(!config.generation.persona_consistency);
    }

    #[test]
    fn missing_credentials_are_a_configuration_error() {
        let err = AiCredentials::from_lookup(lookup_from(&[(ENV_ENDPOINT, "https://x")])).unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains(ENV_API_KEY));
    }

    #[test]
    fn credentials_fall_back_to_default_deployments() {
        let creds = AiCredentials::from_lookup(lookup_from(&[
            (ENV_API_KEY, "secret"),
            (ENV_ENDPOINT, "https://example.openai.azure.com/"),
        ]))
        .unwrap();
        assert_eq!(creds.api_version, "2024-02-01");
        assert_eq!(creds.data_deployment, "gpt-4o-mini");
        assert_eq!(creds.vision_deployment, "gpt-4o");
        assert!(!format!("{:?}", creds).contains("secret"));
    }
}
