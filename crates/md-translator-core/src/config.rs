use serde::{Deserialize, Serialize};

use crate::stream::Framing;

/// LLM provider selection.
///
/// Each provider carries a default endpoint and payload shape; `Custom`
/// expects an explicit `api_base` and speaks the OpenAI-compatible dialect
/// (llama.cpp server, vLLM, DeepSeek, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Ollama,
    Custom,
}

impl Provider {
    /// Default API base URL for the provider.
    pub const fn default_api_base(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Ollama => "http://localhost:11434",
            Self::Custom => "http://localhost:8080/v1",
        }
    }

    /// Whether the provider rejects unauthenticated requests.
    /// Local servers (ollama, custom) treat the key as optional.
    pub const fn requires_api_key(self) -> bool {
        matches!(self, Self::OpenAi | Self::Anthropic)
    }

    /// Wire framing used for streamed responses.
    ///
    /// Anthropic's event framing is not supported; its requests are always
    /// issued non-streaming regardless of the `stream` setting.
    pub const fn framing(self) -> Option<Framing> {
        match self {
            Self::OpenAi | Self::Custom => Some(Framing::EventStream),
            Self::Ollama => Some(Framing::JsonLines),
            Self::Anthropic => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// HTTP job client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_provider")]
    pub provider: Provider,

    /// Explicit endpoint override; takes precedence over the provider default.
    #[serde(default)]
    pub api_base: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,

    /// Request streamed responses where the provider supports them.
    #[serde(default = "default_true")]
    pub stream: bool,
}

impl ClientConfig {
    pub fn new(provider: Provider, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            provider,
            api_base: None,
            api_key,
            model: model.into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            stream: true,
        }
    }

    /// Resolve the effective API base URL (override wins over provider default).
    pub fn effective_api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_base())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_base: None,
            api_key: None,
            model: "default_model".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            stream: true,
        }
    }
}

const fn default_provider() -> Provider {
    Provider::Custom
}

const fn default_max_tokens() -> u32 {
    2000
}

// Lower temperature for more consistent translations
const fn default_temperature() -> Option<f32> {
    Some(0.3)
}

const fn default_true() -> bool {
    true
}

/// Workbench configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    /// HTTP job client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Translate prompt template; must contain `{{text}}` exactly once
    #[serde(default = "default_translate_prompt")]
    pub translate_prompt: String,

    /// Proofread prompt template; must contain `{{text}}` and `{{translation}}`
    /// exactly once each
    #[serde(default = "default_proofread_prompt")]
    pub proofread_prompt: String,

    /// Number of neighboring paragraphs passed as context on each side
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Delay between units during a batch run, to respect upstream rate limits
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_translate_prompt() -> String {
    "Translate the following Markdown text into Simplified Chinese. \
     Preserve the original formatting and structure. \
     Output only the translation, no explanations.\n\n{{text}}"
        .to_string()
}

fn default_proofread_prompt() -> String {
    "Proofread the translation below against the original Markdown text. \
     Fix mistranslations and awkward phrasing while preserving formatting. \
     Output only the corrected translation.\n\nOriginal:\n{{text}}\n\nTranslation:\n{{translation}}"
        .to_string()
}

const fn default_context_window() -> usize {
    1
}

const fn default_batch_delay_ms() -> u64 {
    1000
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            translate_prompt: default_translate_prompt(),
            proofread_prompt: default_proofread_prompt(),
            context_window: default_context_window(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl WorkbenchConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::error::Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::error::Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| crate::error::Error::ConfigLoad(format!("Failed to parse config: {e}")))
    }

    /// Load from default locations (~/.config/md-translator/config.toml, ./config.toml)
    pub fn load() -> Self {
        // Try user config
        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("md-translator").join("config.toml");
            if user_config.exists() {
                match Self::from_file(&user_config) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {}", user_config.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // Try local config
        let local_config = std::path::PathBuf::from("config.toml");
        if local_config.exists() {
            match Self::from_file(&local_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from ./config.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load ./config.toml: {}", e);
                }
            }
        }

        // Return defaults
        tracing::debug!("No config file found, using defaults");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_api_base_prefers_override() {
        let mut config = ClientConfig::default();
        assert_eq!(config.effective_api_base(), "http://localhost:8080/v1");

        config.provider = Provider::OpenAi;
        assert_eq!(config.effective_api_base(), "https://api.openai.com/v1");

        config.api_base = Some("http://10.0.0.2:8000/v1".to_string());
        assert_eq!(config.effective_api_base(), "http://10.0.0.2:8000/v1");
    }

    #[test]
    fn test_provider_key_requirements() {
        assert!(Provider::OpenAi.requires_api_key());
        assert!(Provider::Anthropic.requires_api_key());
        assert!(!Provider::Ollama.requires_api_key());
        assert!(!Provider::Custom.requires_api_key());
    }

    #[test]
    fn test_from_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            batch_delay_ms = 250

            [client]
            provider = "openai"
            model = "gpt-4o-mini"
            api_key = "sk-test"
            "#,
        )
        .expect("write config");

        let config = WorkbenchConfig::from_file(&path).expect("config should load");
        assert_eq!(config.client.provider, Provider::OpenAi);
        assert_eq!(config.client.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.batch_delay_ms, 250);

        assert!(matches!(
            WorkbenchConfig::from_file(dir.path().join("missing.toml")),
            Err(crate::error::Error::ConfigLoad(_))
        ));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: WorkbenchConfig = toml::from_str(
            r#"
            [client]
            provider = "ollama"
            model = "qwen2.5"
            "#,
        )
        .expect("minimal config should parse");

        assert_eq!(config.client.provider, Provider::Ollama);
        assert_eq!(config.client.model, "qwen2.5");
        assert_eq!(config.batch_delay_ms, 1000);
        assert!(config.translate_prompt.contains("{{text}}"));
    }
}
