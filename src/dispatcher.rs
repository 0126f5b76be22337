//! One request per user turn, with at most one in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::client::Gemini;
use crate::error::{Error, Result};
use crate::observability::DISPATCH_BUSY;
use crate::types::{
    GenerateContentRequest, GenerationConfig, ImageAttachment, Model, UsageMetadata,
};

/// Per-request knobs, taken from the session configuration at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSettings {
    pub model: Model,
    pub generation: GenerationConfig,
    pub web_search: bool,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            model: Model::default(),
            generation: GenerationConfig::default(),
            web_search: false,
        }
    }
}

/// A successful reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Text of the first candidate's first part.
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageMetadata>,
}

/// Sends turns to the API, refusing to overlap them.
///
/// Clones share the in-flight flag, so the single-request invariant holds
/// across every handle to the same dispatcher.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Gemini,
    in_flight: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(client: Gemini) -> Self {
        Self {
            client,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while a request is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claims the single in-flight slot ahead of a dispatch.
    ///
    /// Fails with [`Error::Busy`] if a request is already outstanding. The
    /// slot is released when the returned guard is dropped or consumed by
    /// [`Dispatcher::dispatch_reserved`].
    pub fn begin(&self) -> Result<InFlight> {
        InFlight::acquire(&self.in_flight)
    }

    /// Sends `prompt` (and `image`, if any) and extracts the reply.
    ///
    /// Fails with [`Error::Busy`] without touching the network if another
    /// dispatch has not yet completed.
    pub async fn dispatch(
        &self,
        prompt: &str,
        image: Option<&ImageAttachment>,
        settings: &RequestSettings,
    ) -> Result<Reply> {
        check_prompt(prompt, image)?;
        let guard = self.begin()?;
        self.dispatch_reserved(guard, prompt, image, settings).await
    }

    /// Like [`Dispatcher::dispatch`], using a slot already claimed with
    /// [`Dispatcher::begin`].
    pub async fn dispatch_reserved(
        &self,
        guard: InFlight,
        prompt: &str,
        image: Option<&ImageAttachment>,
        settings: &RequestSettings,
    ) -> Result<Reply> {
        if !Arc::ptr_eq(&guard.flag, &self.in_flight) {
            return Err(Error::validation(
                "in-flight guard belongs to another dispatcher",
                None,
            ));
        }
        check_prompt(prompt, image)?;
        let _guard = guard;

        let mut request = GenerateContentRequest::new(prompt, image, settings.generation);
        if settings.web_search {
            request = request.with_web_search();
        }
        tracing::info!(
            model = %settings.model,
            prompt_chars = prompt.chars().count(),
            image = image.is_some(),
            web_search = settings.web_search,
            "dispatching turn"
        );

        let response = self.client.generate(&settings.model, &request).await?;
        let text = response.reply_text().inspect_err(|_| {
            crate::observability::CLIENT_MALFORMED_RESPONSES.click();
        })?;
        let reply = Reply {
            text: text.to_string(),
            finish_reason: response
                .candidates
                .as_ref()
                .and_then(|c| c.first())
                .and_then(|c| c.finish_reason.clone()),
            usage: response.usage_metadata,
        };
        tracing::info!(reply_chars = reply.text.chars().count(), "turn complete");
        Ok(reply)
    }
}

fn check_prompt(prompt: &str, image: Option<&ImageAttachment>) -> Result<()> {
    if prompt.trim().is_empty() && image.is_none() {
        return Err(Error::validation(
            "nothing to send",
            Some("prompt".to_string()),
        ));
    }
    Ok(())
}

/// Holds a dispatcher's in-flight slot; dropping it frees the slot.
#[derive(Debug)]
pub struct InFlight {
    flag: Arc<AtomicBool>,
}

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            DISPATCH_BUSY.click();
            tracing::warn!("refusing dispatch while another request is in flight");
            return Err(Error::busy("a request is already in flight"));
        }
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::types::{ImageMediaType, KnownModel};

    async fn dispatcher_for(server: &MockServer) -> Dispatcher {
        let client =
            Gemini::with_options(Some("k".to_string()), Some(server.uri()), None).unwrap();
        Dispatcher::new(client)
    }

    fn hi_there() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hi there" }] }, "finishReason": "STOP" }],
            "usageMetadata": { "promptTokenCount": 2, "candidatesTokenCount": 2, "totalTokenCount": 4 }
        }))
    }

    #[tokio::test]
    async fn well_formed_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(hi_there())
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = dispatcher_for(&server).await;
        let reply = dispatcher
            .dispatch("Hello", None, &RequestSettings::default())
            .await
            .unwrap();
        assert_eq!(reply.text, "Hi there");
        assert_eq!(reply.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(reply.usage.unwrap().total_token_count, 4);
        assert!(!dispatcher.is_in_flight());
    }

    #[tokio::test]
    async fn sends_image_and_settings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "contents": [{ "parts": [
                    { "text": "describe" },
                    { "inline_data": { "mime_type": "image/jpeg", "data": "AQID" } }
                ] }],
                "generationConfig": { "maxOutputTokens": 128 },
                "tools": [{ "google_search": {} }]
            })))
            .respond_with(hi_there())
            .expect(1)
            .mount(&server)
            .await;

        let image = ImageAttachment::from_bytes("a.png", ImageMediaType::Png, &[1, 2, 3]).unwrap();
        let settings = RequestSettings {
            model: Model::Known(KnownModel::Gemini15Pro),
            generation: GenerationConfig {
                max_output_tokens: 128,
                temperature: 0.5,
            },
            web_search: true,
        };
        let dispatcher = dispatcher_for(&server).await;
        dispatcher
            .dispatch("describe", Some(&image), &settings)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn http_500_is_a_typed_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dispatcher = dispatcher_for(&server).await;
        let err = dispatcher
            .dispatch("Hello", None, &RequestSettings::default())
            .await
            .unwrap_err();
        assert!(err.is_server_error());
        assert!(!err.to_string().is_empty());
        assert!(!dispatcher.is_in_flight());
    }

    #[tokio::test]
    async fn wrong_shape_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let dispatcher = dispatcher_for(&server).await;
        let err = dispatcher
            .dispatch("Hello", None, &RequestSettings::default())
            .await
            .unwrap_err();
        assert!(err.is_malformed_response());
    }

    #[tokio::test]
    async fn second_dispatch_while_in_flight_is_busy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(hi_there().set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = dispatcher_for(&server).await;
        let settings = RequestSettings::default();
        let first = dispatcher.dispatch("one", None, &settings);
        let second = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            dispatcher.clone().dispatch("two", None, &settings).await
        };
        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.unwrap().text, "Hi there");
        assert!(second.unwrap_err().is_busy());

        // the guard is released once the first completes
        assert!(!dispatcher.is_in_flight());
    }

    #[tokio::test]
    async fn begin_holds_the_slot_until_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(hi_there())
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = dispatcher_for(&server).await;
        let guard = dispatcher.begin().unwrap();
        assert!(dispatcher.is_in_flight());
        assert!(dispatcher.begin().unwrap_err().is_busy());
        let err = dispatcher
            .dispatch("Hello", None, &RequestSettings::default())
            .await
            .unwrap_err();
        assert!(err.is_busy());

        let reply = dispatcher
            .dispatch_reserved(guard, "Hello", None, &RequestSettings::default())
            .await
            .unwrap();
        assert_eq!(reply.text, "Hi there");
        assert!(!dispatcher.is_in_flight());
    }

    #[tokio::test]
    async fn foreign_guard_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(hi_there())
            .expect(0)
            .mount(&server)
            .await;

        let ours = dispatcher_for(&server).await;
        let theirs = dispatcher_for(&server).await;
        let guard = theirs.begin().unwrap();
        let err = ours
            .dispatch_reserved(guard, "Hello", None, &RequestSettings::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(!theirs.is_in_flight());
        assert!(!ours.is_in_flight());
    }

    #[tokio::test]
    async fn empty_prompt_without_image_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(hi_there())
            .expect(0)
            .mount(&server)
            .await;

        let dispatcher = dispatcher_for(&server).await;
        let err = dispatcher
            .dispatch("   ", None, &RequestSettings::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
