use std::io;

use brief_core::api::ApiError;
use brief_core::auth::AuthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] brief_core::Error),
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Record not found for id/prefix: {0}")]
    RecordNotFound(String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0} is not configured. Run `brief config init` or set it in the environment.")]
    NotConfigured(&'static str),
    #[error("Not signed in. Run `brief auth login --email <email> --password <password>`.")]
    NotSignedIn,
}
