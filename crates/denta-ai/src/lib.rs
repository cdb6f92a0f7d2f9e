mod gemini;

pub use gemini::{DEFAULT_MODEL, GeminiClient};

use std::fmt;

use denta_mesh::MeshSummary;

/// Fixed role line placed at the top of every composed prompt.
pub const PROMPT_PREAMBLE: &str = "You are an expert dental CAD designer. Your task is to \
     provide the design parameters for a dental restoration based on the user's request \
     and scan data.";

/// Fixed closing that asks for design steps rather than a 3D model.
pub const PROMPT_CLOSING: &str = "Based on all this information, provide a structured list \
     of design steps and parameters for the restoration. Do not generate the 3D model \
     itself, but provide the instructions for a CAD program to follow.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    EmptyInstruction,
    NoScans,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::EmptyInstruction => write!(f, "the design instruction is empty"),
            RequestError::NoScans => write!(f, "no scan summaries are loaded"),
        }
    }
}

impl std::error::Error for RequestError {}

/// A validated design request: the dentist's instruction plus the summaries
/// of every loaded scan.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignRequest {
    instruction: String,
    summaries: Vec<MeshSummary>,
}

impl DesignRequest {
    /// Validates the inputs up front so callers can report missing data
    /// before any external service is contacted.
    pub fn new(
        instruction: impl Into<String>,
        summaries: Vec<MeshSummary>,
    ) -> Result<Self, RequestError> {
        let instruction = instruction.into();
        if instruction.trim().is_empty() {
            return Err(RequestError::EmptyInstruction);
        }
        if summaries.is_empty() {
            return Err(RequestError::NoScans);
        }
        Ok(Self {
            instruction,
            summaries,
        })
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn summaries(&self) -> &[MeshSummary] {
        &self.summaries
    }

    /// Composes the full prompt: preamble, the instruction verbatim, one
    /// summary line per scan, then the fixed closing. Pure text assembly,
    /// deterministic for the same request.
    pub fn prompt(&self) -> String {
        let scan_block = self
            .summaries
            .iter()
            .map(MeshSummary::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{PROMPT_PREAMBLE}\n\nUser Request: {instruction}\n\nScan Data:\n{scan_block}\n\n{PROMPT_CLOSING}",
            instruction = self.instruction
        )
    }
}

/// Failure of a single generation call, split by what the caller can do
/// about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The service rejected the API key.
    Credential(String),
    /// The request never completed: DNS, connect, TLS or timeout.
    Transport(String),
    /// The service answered with a non-success status.
    Service { status: u16, message: String },
    /// The service answered 2xx but the body held no usable text.
    MalformedResponse(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Credential(detail) => write!(f, "API key rejected: {detail}"),
            ModelError::Transport(detail) => write!(f, "network error: {detail}"),
            ModelError::Service { status, message } => {
                write!(f, "service error (HTTP {status}): {message}")
            }
            ModelError::MalformedResponse(detail) => {
                write!(f, "unreadable response: {detail}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

/// Text-in, text-out interface to a hosted generative model.
///
/// Implementations make exactly one attempt per call. There is no retry or
/// backoff layer anywhere in this crate; a failed call returns its error and
/// the next attempt happens only when the user triggers the action again.
pub trait TextModel: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    MissingKey,
    Client(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::MissingKey => write!(f, "API key is empty"),
            SessionError::Client(detail) => {
                write!(f, "failed to build the HTTP client: {detail}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Connection state as shown to the user. The key itself never appears here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiStatus {
    NotSet,
    Connected,
    Error(String),
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiStatus::NotSet => write!(f, "Not Set"),
            ApiStatus::Connected => write!(f, "Connected"),
            ApiStatus::Error(detail) => write!(f, "API Error: {detail}"),
        }
    }
}

/// A configured connection to a text model.
///
/// Holding a `Session` means a client was built for a non-empty key; it says
/// nothing about whether the service will accept that key, which only the
/// first generation call reveals.
pub struct Session {
    model: Box<dyn TextModel>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Builds a Gemini-backed session for the default model.
    pub fn connect(api_key: &str) -> Result<Self, SessionError> {
        Self::connect_with_model(api_key, DEFAULT_MODEL)
    }

    /// Builds a Gemini-backed session for a specific model name.
    pub fn connect_with_model(api_key: &str, model: &str) -> Result<Self, SessionError> {
        let key = api_key.trim();
        if key.is_empty() {
            return Err(SessionError::MissingKey);
        }
        let client = GeminiClient::new(key)?.with_model(model);
        log::info!("Gemini session established (model {model})");
        Ok(Self::with_model(Box::new(client)))
    }

    /// Wraps an arbitrary model, used by hosts that inject their own backend.
    pub fn with_model(model: Box<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Sends the composed prompt in a single blocking call.
    ///
    /// One attempt only: errors are returned to the caller, never retried,
    /// and a failed call leaves no state behind for the next one.
    pub fn generate_plan(&self, request: &DesignRequest) -> Result<String, ModelError> {
        self.model.generate(&request.prompt())
    }
}
