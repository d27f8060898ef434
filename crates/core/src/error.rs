use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Pipeline(#[from] QaError),
}

#[derive(Debug, Error)]
pub enum QaError {
    #[error("cannot reach {backend}: {details}")]
    Connection { backend: String, details: String },

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("could not parse model output: {0}")]
    Parse(String),

    #[error("{provider} returned {status}: {details}")]
    Provider {
        provider: String,
        status: u16,
        details: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QaError {
    pub fn provider(provider: &str, status: u16, details: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            status,
            details: details.into(),
        }
    }

    /// Failures that may clear up on their own: unreachable backends,
    /// rate limiting and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            Self::Http(error) => error.is_timeout(),
            _ => false,
        }
    }

    /// Classifies a transport error against the backend it was sent to.
    pub fn from_transport(backend: &str, error: reqwest::Error) -> Self {
        if error.is_connect() {
            Self::Connection {
                backend: backend.to_string(),
                details: error.to_string(),
            }
        } else {
            Self::Http(error)
        }
    }
}
