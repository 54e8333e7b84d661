use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown basin '{0}' (expected one of: brb, kaweah, lakes, merced, sanjoaquin, tuolumne)")]
    UnknownBasin(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedType(String),

    #[error("Mask does not match dataset: {0}")]
    ShapeMismatch(String),

    #[error("{file} is missing required variable(s): {}", variables.join(", "))]
    MissingVariable { file: String, variables: Vec<String> },

    #[error("Shapefile {path} is missing companion file(s): {}", missing.join(", "))]
    IncompleteShapefile { path: String, missing: Vec<String> },

    #[error("Remote resource not found: {0}")]
    RemoteNotFound(String),

    #[error("Remote transfer failed: {0}")]
    RemoteTransfer(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dataset error: {0}")]
    Dataset(String),
}

impl AppError {
    /// Errors detected from local input alone, before anything is sent to the server.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::UnknownBasin(_)
                | AppError::UnsupportedType(_)
                | AppError::ShapeMismatch(_)
                | AppError::MissingVariable { .. }
                | AppError::IncompleteShapefile { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
