//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg`, an optional YAML
//! configuration file, and the resolved [`ChatConfig`] that drives a session.
//! Values given on the command line override values from the file.

use std::path::Path;
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::Deserialize;

use super::commands::parse_f32_in_range;
use crate::client::DEFAULT_TIMEOUT;
use crate::dispatcher::RequestSettings;
use crate::error::{Error, Result};
use crate::reveal::DEFAULT_REVEAL_INTERVAL;
use crate::types::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE, GenerationConfig, Model};

/// Highest sampling temperature the API accepts.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Command-line arguments for the genchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct GenchatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gemini-1.5-flash-latest)", "MODEL")]
    pub model: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max output tokens per response (default: 4096)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature, kept as text so the args stay `Eq`.
    #[arrrg(optional, "Sampling temperature 0.0-2.0 (default: 0.9)", "TEMP")]
    pub temperature: Option<String>,

    /// Override for the API base URL.
    #[arrrg(optional, "API base URL", "URL")]
    pub base_url: Option<String>,

    /// Delay between revealed characters.
    #[arrrg(optional, "Milliseconds per revealed character (default: 100)", "MS")]
    pub reveal_interval_ms: Option<u64>,

    /// HTTP request timeout.
    #[arrrg(optional, "Request timeout in seconds (default: 60)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// YAML configuration file.
    #[arrrg(optional, "Read settings from a YAML file", "PATH")]
    pub config: Option<String>,

    /// Enable the web search tool.
    #[arrrg(flag, "Enable web search")]
    pub web_search: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Settings read from a YAML file. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    base_url: Option<String>,
    reveal_interval_ms: Option<u64>,
    timeout_secs: Option<u64>,
    web_search: Option<bool>,
    color: Option<bool>,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// the configuration file and command-line arguments with appropriate
/// defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: Model,

    /// Maximum tokens per response.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Whether requests carry the web search tool.
    pub web_search: bool,

    /// Delay between revealed characters.
    pub reveal_interval: Duration,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Override for the API base URL.
    pub base_url: Option<String>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: gemini-1.5-flash-latest
    /// - Max tokens: 4096
    /// - Temperature: 0.9
    /// - Reveal interval: 100 ms
    /// - Timeout: 60 s
    /// - Color: enabled
    /// - Web search: disabled
    pub fn new() -> Self {
        Self {
            model: Model::default(),
            max_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            web_search: false,
            reveal_interval: DEFAULT_REVEAL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            base_url: None,
            use_color: true,
        }
    }

    /// Loads settings from a YAML file on top of the defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&text)
            .map_err(|err| Error::config(format!("{}: {err}", path.display())))
    }

    /// Parses YAML settings on top of the defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = if text.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(text)?
        };
        let mut config = Self::new();
        if let Some(model) = file.model {
            config.model = parse_model(&model)?;
        }
        if let Some(max_tokens) = file.max_tokens {
            config = config.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = file.temperature {
            config = config.with_temperature(temperature);
        }
        if let Some(base_url) = file.base_url {
            config.base_url = Some(base_url);
        }
        if let Some(ms) = file.reveal_interval_ms {
            config = config.with_reveal_interval(Duration::from_millis(ms));
        }
        if let Some(secs) = file.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(web_search) = file.web_search {
            config.web_search = web_search;
        }
        if let Some(color) = file.color {
            config.use_color = color;
        }
        config.validate()?;
        Ok(config)
    }

    /// Resolves the configuration from the command line, reading the
    /// configuration file first when one is named.
    pub fn from_args(args: GenchatArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::new(),
        };
        if let Some(model) = args.model {
            config.model = parse_model(&model)?;
        }
        if let Some(max_tokens) = args.max_tokens {
            config = config.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = args.temperature {
            let temperature = parse_f32_in_range(&temperature, 0.0, MAX_TEMPERATURE)
                .map_err(|err| {
                    Error::validation(
                        format!("--temperature {err}"),
                        Some("temperature".to_string()),
                    )
                })?;
            config = config.with_temperature(temperature);
        }
        if let Some(base_url) = args.base_url {
            config.base_url = Some(base_url);
        }
        if let Some(ms) = args.reveal_interval_ms {
            config = config.with_reveal_interval(Duration::from_millis(ms));
        }
        if let Some(secs) = args.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if args.web_search {
            config.web_search = true;
        }
        if args.no_color {
            config.use_color = false;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges that the builders accept unchecked.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(Error::validation(
                format!(
                    "temperature must be between 0 and {MAX_TEMPERATURE}, got {}",
                    self.temperature
                ),
                Some("temperature".to_string()),
            ));
        }
        if self.max_tokens == 0 {
            return Err(Error::validation(
                "max_tokens must be positive",
                Some("max_tokens".to_string()),
            ));
        }
        if self.reveal_interval.is_zero() {
            return Err(Error::validation(
                "reveal interval must be positive",
                Some("reveal_interval".to_string()),
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::validation(
                "timeout must be positive",
                Some("timeout".to_string()),
            ));
        }
        Ok(())
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Enables or disables web search.
    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    /// Sets the delay between revealed characters.
    pub fn with_reveal_interval(mut self, interval: Duration) -> Self {
        self.reveal_interval = interval;
        self
    }

    /// Sets the HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Points the client at a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sampling parameters for the next request.
    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            max_output_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Everything the dispatcher needs for the next request.
    pub fn request_settings(&self) -> RequestSettings {
        RequestSettings {
            model: self.model.clone(),
            generation: self.generation(),
            web_search: self.web_search,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<GenchatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: GenchatArgs) -> Result<Self> {
        Self::from_args(args)
    }
}

fn parse_model(name: &str) -> Result<Model> {
    name.parse::<Model>()
        .map_err(|err| Error::validation(err, Some("model".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnownModel;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.model, Model::Known(KnownModel::Gemini15FlashLatest));
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.temperature, 0.9);
        assert_eq!(config.reveal_interval, Duration::from_millis(100));
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.use_color);
        assert!(!config.web_search);
        assert!(config.base_url.is_none());
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::try_from(GenchatArgs::default()).unwrap();
        assert_eq!(config, ChatConfig::new());
    }

    #[test]
    fn config_from_args_custom() {
        let args = GenchatArgs {
            model: Some("gemini-1.5-pro".to_string()),
            max_tokens: Some(8192),
            temperature: Some("0.2".to_string()),
            base_url: Some("http://localhost:8080".to_string()),
            reveal_interval_ms: Some(10),
            timeout_secs: Some(5),
            config: None,
            web_search: true,
            no_color: true,
        };
        let config = ChatConfig::from_args(args).unwrap();
        assert_eq!(config.model, Model::Known(KnownModel::Gemini15Pro));
        assert_eq!(config.max_tokens, 8192);
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.reveal_interval, Duration::from_millis(10));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.web_search);
        assert!(!config.use_color);
    }

    #[test]
    fn unknown_model_is_custom() {
        let args = GenchatArgs {
            model: Some("gemini-exp-1206".to_string()),
            ..GenchatArgs::default()
        };
        let config = ChatConfig::from_args(args).unwrap();
        assert_eq!(config.model, Model::Custom("gemini-exp-1206".to_string()));
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let args = GenchatArgs {
            temperature: Some("3".to_string()),
            ..GenchatArgs::default()
        };
        assert!(ChatConfig::from_args(args).unwrap_err().is_validation());

        let args = GenchatArgs {
            temperature: Some("warm".to_string()),
            ..GenchatArgs::default()
        };
        assert!(ChatConfig::from_args(args).is_err());
    }

    #[test]
    fn yaml_settings() {
        let config = ChatConfig::from_yaml_str(
            "model: gemini-2.0-flash\nmax_tokens: 256\ntemperature: 1.5\nweb_search: true\ncolor: false\nreveal_interval_ms: 20\n",
        )
        .unwrap();
        assert_eq!(config.model, Model::Known(KnownModel::Gemini20Flash));
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.temperature, 1.5);
        assert!(config.web_search);
        assert!(!config.use_color);
        assert_eq!(config.reveal_interval, Duration::from_millis(20));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn empty_yaml_is_defaults() {
        assert_eq!(ChatConfig::from_yaml_str("").unwrap(), ChatConfig::new());
    }

    #[test]
    fn yaml_rejects_unknown_keys_and_bad_ranges() {
        assert!(ChatConfig::from_yaml_str("system: hi\n").is_err());
        assert!(
            ChatConfig::from_yaml_str("temperature: 4.0\n")
                .unwrap_err()
                .is_validation()
        );
        assert!(ChatConfig::from_yaml_str("max_tokens: 0\n").is_err());
    }

    #[test]
    fn command_line_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model: gemini-pro\nmax_tokens: 100\nweb_search: true").unwrap();
        let args = GenchatArgs {
            config: Some(file.path().display().to_string()),
            max_tokens: Some(200),
            ..GenchatArgs::default()
        };
        let config = ChatConfig::from_args(args).unwrap();
        assert_eq!(config.model, Model::Known(KnownModel::GeminiPro));
        assert_eq!(config.max_tokens, 200);
        assert!(config.web_search);
    }

    #[test]
    fn zero_durations_are_rejected() {
        let err = ChatConfig::new()
            .with_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.is_validation());
        assert!(
            ChatConfig::new()
                .with_reveal_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(ChatConfig::from_yaml_str("timeout_secs: 0\n").is_err());

        let args = GenchatArgs {
            timeout_secs: Some(0),
            ..GenchatArgs::default()
        };
        assert!(ChatConfig::from_args(args).unwrap_err().is_validation());
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ChatConfig::from_yaml_file("/nonexistent/genchat.yaml").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn builder_and_settings() {
        let config = ChatConfig::new()
            .with_model(Model::Known(KnownModel::Gemini15Flash))
            .with_max_tokens(2048)
            .with_temperature(0.4)
            .with_web_search(true)
            .with_reveal_interval(Duration::from_millis(5))
            .with_timeout(Duration::from_secs(3))
            .with_base_url("http://127.0.0.1:1")
            .without_color();
        let settings = config.request_settings();
        assert_eq!(settings.model, Model::Known(KnownModel::Gemini15Flash));
        assert_eq!(settings.generation.max_output_tokens, 2048);
        assert_eq!(settings.generation.temperature, 0.4);
        assert!(settings.web_search);
        assert!(!config.use_color);
        assert!(config.validate().is_ok());
    }
}
