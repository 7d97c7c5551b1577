use taskpay_engine::traits::EscrowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize the server. {0}")]
    InitializeError(String),
    #[error("Engine error: {0}")]
    BackendError(#[from] EscrowError),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}
