use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ModelError, SessionError, TextModel};

pub const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const ERROR_BODY_EXCERPT: usize = 200;

/// Blocking client for the Gemini `generateContent` endpoint.
///
/// One HTTP request per `generate` call, no retries. The API key travels in
/// a request header and is never logged or included in error text.
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SessionError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| SessionError::Client(err.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE_URL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl TextModel for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        log::debug!(
            "requesting generateContent from {} ({} prompt chars)",
            self.model,
            prompt.chars().count()
        );
        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request_body(prompt))
            .send()
            .map_err(|err| ModelError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| ModelError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }
        extract_text(&body)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    message: Option<String>,
    status: Option<String>,
}

fn request_body(prompt: &str) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: vec![RequestContent {
            parts: vec![RequestPart { text: prompt }],
        }],
    }
}

/// Pulls the text of the first candidate, concatenating its parts.
fn extract_text(body: &str) -> Result<String, ModelError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|err| ModelError::MalformedResponse(err.to_string()))?;
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ModelError::MalformedResponse(
            "response contained no candidates".to_string(),
        ));
    };
    let parts = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default();
    let mut text = String::new();
    for part in parts {
        if let Some(piece) = part.text {
            text.push_str(&piece);
        }
    }
    if text.is_empty() {
        return Err(ModelError::MalformedResponse(
            "candidate contained no text parts".to_string(),
        ));
    }
    Ok(text)
}

/// Maps a non-success HTTP status to the matching error variant.
///
/// Gemini reports bad keys as 400 with an `API_KEY_INVALID` detail as well
/// as plain 401/403, so all three count as credential failures.
fn classify_failure(status: u16, body: &str) -> ModelError {
    let detail = error_detail(body);
    match status {
        401 | 403 => ModelError::Credential(detail),
        400 if detail.contains("API_KEY_INVALID") || detail.contains("API key") => {
            ModelError::Credential(detail)
        }
        _ => ModelError::Service {
            status,
            message: detail,
        },
    }
}

/// Pulls `error.message` out of the standard error envelope, falling back
/// to a bounded excerpt of the raw body.
fn error_detail(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(error) = envelope.error
    {
        let message = error.message.unwrap_or_default();
        if !message.is_empty() {
            return match error.status {
                Some(status) if !status.is_empty() => format!("{status}: {message}"),
                _ => message,
            };
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no error detail provided".to_string();
    }
    trimmed.chars().take(ERROR_BODY_EXCERPT).collect()
}
