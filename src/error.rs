use std::path::PathBuf;

use thiserror::Error;

use crate::io::{ProductName, UserId};

#[derive(Debug, Error)]
pub enum RecoError {
    #[error("schema error in {file}: {reason}")]
    Schema { file: String, reason: String },

    #[error("no observations left after filtering")]
    EmptyDataset,

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductName),

    #[error("artifact file is missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("inconsistent artifact: {0}")]
    InconsistentArtifact(String),

    #[error("internal computation error: {0}")]
    InternalComputation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Serialization(#[from] bincode::Error),
}

impl RecoError {
    /// Lookups that failed because the caller asked for something the model does not know.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RecoError::UserNotFound(_) | RecoError::ProductNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, RecoError>;
