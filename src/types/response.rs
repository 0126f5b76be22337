use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Body returned by a successful `generateContent` call.
///
/// Every field is optional so that unexpected shapes deserialize and are
/// then reported by [`GenerateContentResponse::reply_text`] as a
/// [`Error::MalformedResponse`] instead of a serialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Candidate>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

/// One generated alternative.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<CandidateContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Content of a candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// A response part; only text is consumed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponsePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Why a prompt was refused, when it was.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

/// Token accounting reported by the API.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,

    #[serde(default)]
    pub candidates_token_count: u64,

    #[serde(default)]
    pub total_token_count: u64,
}

impl GenerateContentResponse {
    /// Returns `candidates[0].content.parts[0].text`.
    pub fn reply_text(&self) -> Result<&str> {
        let Some(candidate) = self.candidates.as_ref().and_then(|c| c.first()) else {
            let reason = self
                .prompt_feedback
                .as_ref()
                .and_then(|feedback| feedback.block_reason.as_deref());
            return Err(match reason {
                Some(reason) => {
                    Error::malformed_response(format!("prompt blocked ({reason}), no candidates"))
                }
                None => Error::malformed_response("response has no candidates"),
            });
        };
        let content = candidate
            .content
            .as_ref()
            .ok_or_else(|| Error::malformed_response("first candidate has no content"))?;
        let part = content
            .parts
            .first()
            .ok_or_else(|| Error::malformed_response("first candidate has no parts"))?;
        part.text
            .as_deref()
            .ok_or_else(|| Error::malformed_response("first part has no text"))
    }
}
