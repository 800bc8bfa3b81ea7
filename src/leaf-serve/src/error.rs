use std::path::PathBuf;

/// Result type of the classification pipeline
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The uploaded bytes are not a decodable image. The message is meant
    /// to be shown to the user as-is.
    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model download failed: {0}")]
    Download(String),

    #[error("HTTP error while fetching model: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to load model '{path}': {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("unsupported model format '{0}', expected .pb or .onnx")]
    UnsupportedModelFormat(PathBuf),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model produced no comparable scores")]
    EmptyScores,

    #[error("label catalog has {labels} entries but model outputs {outputs} classes")]
    CatalogMismatch { labels: usize, outputs: usize },

    #[error("predicted index {index} is outside the label catalog ({len} entries)")]
    LabelOutOfRange { index: usize, len: usize },

    #[error("reference table '{path}' has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },

    #[error("reference table error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error was caused by the client's input rather than by
    /// the service.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Error::UnsupportedFormat(_))
    }
}
