use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Represents a generative-language model identifier.
///
/// This can be a predefined model or a custom string value for models that
/// are not listed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model versions
    Known(KnownModel),

    /// Custom model identifier
    Custom(String),
}

/// Known model versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// Gemini 1.5 Flash (latest version)
    #[serde(rename = "gemini-1.5-flash-latest")]
    Gemini15FlashLatest,

    /// Gemini 1.5 Flash
    #[serde(rename = "gemini-1.5-flash")]
    Gemini15Flash,

    /// Gemini 1.5 Pro
    #[serde(rename = "gemini-1.5-pro")]
    Gemini15Pro,

    /// Gemini 2.0 Flash
    #[serde(rename = "gemini-2.0-flash")]
    Gemini20Flash,

    /// Gemini Pro
    #[serde(rename = "gemini-pro")]
    GeminiPro,
}

impl KnownModel {
    /// Every known model, in the order they are offered to the user.
    pub const ALL: [KnownModel; 5] = [
        KnownModel::Gemini15FlashLatest,
        KnownModel::Gemini15Flash,
        KnownModel::Gemini15Pro,
        KnownModel::Gemini20Flash,
        KnownModel::GeminiPro,
    ];

    /// The identifier used in request paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::Gemini15FlashLatest => "gemini-1.5-flash-latest",
            KnownModel::Gemini15Flash => "gemini-1.5-flash",
            KnownModel::Gemini15Pro => "gemini-1.5-pro",
            KnownModel::Gemini20Flash => "gemini-2.0-flash",
            KnownModel::GeminiPro => "gemini-pro",
        }
    }

    /// A short human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            KnownModel::Gemini15FlashLatest => "Gemini 1.5 Flash (latest)",
            KnownModel::Gemini15Flash => "Gemini 1.5 Flash",
            KnownModel::Gemini15Pro => "Gemini 1.5 Pro",
            KnownModel::Gemini20Flash => "Gemini 2.0 Flash",
            KnownModel::GeminiPro => "Gemini Pro",
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::Gemini15FlashLatest)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{}", known_model),
            Model::Custom(custom) => write!(f, "{}", custom),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = String;

    /// Parses a model name, mapping recognized names to [`KnownModel`].
    ///
    /// Leading `models/` prefixes are accepted. Empty names are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let name = name.strip_prefix("models/").unwrap_or(name);
        if name.is_empty() {
            return Err("model name must not be empty".to_string());
        }
        Ok(KnownModel::ALL
            .iter()
            .find(|known| known.as_str() == name)
            .map(|known| Model::Known(*known))
            .unwrap_or_else(|| Model::Custom(name.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}
