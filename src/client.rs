use std::env;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_MALFORMED_RESPONSES, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS,
};
use crate::types::{GenerateContentRequest, GenerateContentResponse, Model};

pub(crate) const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variables consulted, in order, for the API key.
pub const API_KEY_VARS: [&str; 2] = ["GENCHAT_API_KEY", "GEMINI_API_KEY"];

/// Client for the Generative Language API.
#[derive(Debug, Clone)]
pub struct Gemini {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl Gemini {
    /// Create a new client.
    ///
    /// The API key can be provided directly or read from the GENCHAT_API_KEY
    /// (or GEMINI_API_KEY) environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => API_KEY_VARS
                .iter()
                .find_map(|var| env::var(var).ok().filter(|key| !key.is_empty()))
                .ok_or_else(|| {
                    Error::authentication(
                        "API key not provided and neither GENCHAT_API_KEY nor GEMINI_API_KEY is set",
                    )
                })?,
        };

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
        })
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    fn endpoint(&self, model: &Model) -> Result<Url> {
        Ok(self
            .base_url
            .join(&format!("models/{model}:generateContent"))?)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            message: Option<String>,
            status: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let e = e.without_url();
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_status = detail.as_ref().and_then(|d| d.status.clone());
        let error_message = detail
            .and_then(|d| d.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if error_body.trim().is_empty() {
                    format!("HTTP {status_code}")
                } else {
                    error_body.clone()
                }
            });

        match status_code {
            400 => Error::bad_request(error_message),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_status, error_message),
        }
    }

    /// Sends one `generateContent` request and parses the body.
    ///
    /// The body is only checked to be JSON here; pulling out the reply text is
    /// left to [`GenerateContentResponse::reply_text`].
    pub async fn generate(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = self.generate_inner(model, request).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            CLIENT_REQUEST_ERRORS.click();
            tracing::debug!(%model, error = %err, "generateContent failed");
        }
        result
    }

    async fn generate_inner(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = self.endpoint(model)?;

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .headers(self.default_headers())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                // the URL carries the API key
                let e = e.without_url();
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {}", e),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let body = response.text().await.map_err(|e| {
            let e = e.without_url();
            Error::http_client(format!("Failed to read response: {}", e), Some(Box::new(e)))
        })?;
        serde_json::from_str::<GenerateContentResponse>(&body).map_err(|e| {
            CLIENT_MALFORMED_RESPONSES.click();
            Error::malformed_response(format!("response is not valid JSON: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerationConfig, KnownModel};
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest::new(prompt, None, GenerationConfig::default())
    }

    #[test]
    fn test_client_creation() {
        let client = Gemini::new(Some("test-key".to_string())).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url.as_str(), DEFAULT_API_URL);
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);

        let client = Gemini::with_options(
            Some("test-key".to_string()),
            Some("https://custom-api.example.com/v1".to_string()),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(client.base_url.as_str(), "https://custom-api.example.com/v1/");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn endpoint_includes_model() {
        let client = Gemini::new(Some("k".to_string())).unwrap();
        let url = client
            .endpoint(&Model::Known(KnownModel::Gemini15FlashLatest))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent"
        );
    }

    #[tokio::test]
    async fn posts_request_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash-latest:generateContent"))
            .and(query_param("key", "secret"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "parts": [{ "text": "ping" }] }],
                "generationConfig": { "maxOutputTokens": 4096 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "pong" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = Gemini::with_options(Some("secret".to_string()), Some(server.uri()), None)
            .unwrap();
        let response = client
            .generate(&Model::default(), &request("ping"))
            .await
            .unwrap();
        assert_eq!(response.reply_text().unwrap(), "pong");
    }

    #[tokio::test]
    async fn maps_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-pro:generateContent"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": { "code": 500, "message": "backend exploded", "status": "INTERNAL" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/nope:generateContent"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client =
            Gemini::with_options(Some("k".to_string()), Some(server.uri()), None).unwrap();

        let err = client
            .generate(&Model::Known(KnownModel::GeminiPro), &request("x"))
            .await
            .unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(err.to_string(), "Internal server error: backend exploded");

        let err = client
            .generate(&Model::Custom("nope".to_string()), &request("x"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(err.to_string(), "Resource not found: HTTP 404");
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client =
            Gemini::with_options(Some("k".to_string()), Some(server.uri()), None).unwrap();
        let err = client
            .generate(&Model::default(), &request("x"))
            .await
            .unwrap_err();
        assert!(err.is_malformed_response());
    }

    #[tokio::test]
    async fn connection_refused_is_connection_error() {
        let client = Gemini::with_options(
            Some("k".to_string()),
            Some("http://127.0.0.1:9/".to_string()),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        let err = client
            .generate(&Model::default(), &request("x"))
            .await
            .unwrap_err();
        assert!(
            err.is_connection() || err.is_timeout() || matches!(err, Error::HttpClient { .. }),
            "{err}"
        );
    }
}
