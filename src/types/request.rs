use serde::{Deserialize, Serialize};

use crate::types::ImageAttachment;

/// MIME type attached to every inline image part.
pub const INLINE_IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Default cap on generated tokens.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.9;

/// Body of a `generateContent` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateContentRequest {
    /// The conversation turns to send; genchat always sends exactly one.
    pub contents: Vec<Content>,

    /// Sampling parameters.
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,

    /// Optional server-side tools, such as web search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

impl GenerateContentRequest {
    /// Builds a single-turn request carrying `prompt` and, optionally, one image.
    pub fn new(
        prompt: &str,
        image: Option<&ImageAttachment>,
        generation_config: GenerationConfig,
    ) -> Self {
        let mut parts = vec![Part::text(prompt)];
        if let Some(image) = image {
            parts.push(Part::inline_image(image));
        }
        Self {
            contents: vec![Content { parts }],
            generation_config,
            tools: None,
        }
    }

    /// Enables the web search tool for this request.
    pub fn with_web_search(mut self) -> Self {
        self.tools
            .get_or_insert_with(Vec::new)
            .push(Tool::google_search());
        self
    }
}

/// One turn's worth of parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub parts: Vec<Part>,
}

/// A request part: text or inline binary data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },

    /// Base64 data with a MIME type.
    InlineData {
        /// The payload.
        inline_data: InlineData,
    },
}

impl Part {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Creates an inline image part tagged with [`INLINE_IMAGE_MIME_TYPE`].
    pub fn inline_image(image: &ImageAttachment) -> Self {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: INLINE_IMAGE_MIME_TYPE.to_string(),
                data: image.data.clone(),
            },
        }
    }
}

/// Inline binary payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineData {
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// A server-side tool declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<GoogleSearch>,
}

impl Tool {
    /// The grounding-with-search tool.
    pub fn google_search() -> Self {
        Self {
            google_search: Some(GoogleSearch {}),
        }
    }
}

/// Marker for the search tool; serializes as `{}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleSearch {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageMediaType;
    use serde_json::{json, to_value};

    #[test]
    fn text_only_request() {
        let request = GenerateContentRequest::new("Hello", None, GenerationConfig::default());
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "contents": [{ "parts": [{ "text": "Hello" }] }],
                "generationConfig": { "maxOutputTokens": 4096, "temperature": 0.9f32 }
            })
        );
    }

    #[test]
    fn image_is_tagged_with_fixed_mime_type() {
        let image =
            ImageAttachment::from_bytes("shot.png", ImageMediaType::Png, b"Hello World").unwrap();
        let request =
            GenerateContentRequest::new("What is this?", Some(&image), GenerationConfig::default());
        assert_eq!(
            to_value(&request.contents).unwrap(),
            json!([{
                "parts": [
                    { "text": "What is this?" },
                    { "inline_data": { "mime_type": "image/jpeg", "data": "SGVsbG8gV29ybGQ=" } }
                ]
            }])
        );
    }

    #[test]
    fn web_search_adds_tool() {
        let request = GenerateContentRequest::new("news?", None, GenerationConfig::default())
            .with_web_search();
        assert_eq!(
            to_value(&request).unwrap()["tools"],
            json!([{ "google_search": {} }])
        );
    }
}
