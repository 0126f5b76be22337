// Public modules
pub mod attachment;
pub mod message;
pub mod model;
pub mod request;
pub mod response;

// Re-exports
pub use attachment::{ImageAttachment, ImageMediaType, MAX_IMAGE_BYTES};
pub use message::{Message, MessageId, MessagePatch, Role};
pub use model::{KnownModel, Model};
pub use request::{
    Content, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE, GenerateContentRequest,
    GenerationConfig, GoogleSearch, INLINE_IMAGE_MIME_TYPE, InlineData, Part, Tool,
};
pub use response::{
    Candidate, CandidateContent, GenerateContentResponse, PromptFeedback, ResponsePart,
    UsageMetadata,
};
