use std::fmt;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for formsynth
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid document {path}: {message}")]
    DocumentFormat {
        path: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Generation failed ({reason}): {message}")]
    Generation {
        reason: GenerationFailure,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Failed to write {path}: {message}")]
    Write {
        path: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("File I/O error: {path}")]
    FileIO {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Template error: {message}")]
    Template { message: String },

    #[error("Renderer unavailable: {renderer}")]
    RendererUnavailable { renderer: String, message: String },
}

/// Why a call to the completion service did not yield a usable record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationFailure {
    Transport,
    Status,
    EmptyResponse,
    MalformedJson,
    MissingKeys,
    Schema,
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationFailure::Transport => "transport",
            GenerationFailure::Status => "http status",
            GenerationFailure::EmptyResponse => "empty response",
            GenerationFailure::MalformedJson => "malformed json",
            GenerationFailure::MissingKeys => "missing keys",
            GenerationFailure::Schema => "schema mismatch",
        };
        f.write_str(name)
    }
}

impl SynthError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a document format error without an underlying cause
    pub fn document_format(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DocumentFormat {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a document format error with source
    pub fn document_format_with_source(
        path: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DocumentFormat {
            path: path.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a generation error
    pub fn generation(reason: GenerationFailure, message: impl Into<String>) -> Self {
        Self::Generation {
            reason,
            message: message.into(),
            source: None,
        }
    }

    /// Create a generation error with source
    pub fn generation_with_source(
        reason: GenerationFailure,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Generation {
            reason,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a write error
    pub fn write(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let source: BoxedSource = Box::new(source);
        Self::Write {
            path: path.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a file I/O error
    pub fn file_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileIO {
            path: path.into(),
            source,
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    pub fn renderer_unavailable(renderer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RendererUnavailable {
            renderer: renderer.into(),
            message: message.into(),
        }
    }

    /// The generation failure reason, if this is a generation error
    pub fn generation_reason(&self) -> Option<GenerationFailure> {
        match self {
            SynthError::Generation { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Check if error is recoverable (the batch can continue with the next item)
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SynthError::Configuration { .. })
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            SynthError::Configuration { message } => {
                format!("🔧 Configuration problem: {}. Check your environment and flags.", message)
            }
            SynthError::DocumentFormat { path, .. } => {
                format!("📄 {} has no readable fillable form fields.", path)
            }
            SynthError::Generation { reason, .. } => {
                format!("🤖 The AI service did not return usable data ({}).", reason)
            }
            SynthError::Write { path, .. } => {
                format!("📁 Could not write {}. Check permissions and disk space.", path)
            }
            SynthError::FileIO { path, .. } => {
                format!("📁 Could not read {}.", path)
            }
            SynthError::RendererUnavailable { renderer, .. } => {
                format!("🖨️  {} is not installed; continuing with fewer output formats.", renderer)
            }
            SynthError::Template { .. } => "🧩 A template could not be filled. Check the logs for details.".to_string(),
        }
    }
}

/// Result type alias for convenience
pub type SynthResult<T> = Result<T, SynthError>;
