use thiserror::Error;

/// Failure while checking whether the target answers.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },
    #[error("resolving {0} did not finish in time")]
    ResolveTimeout(String),
    #[error("no address found for {0}")]
    NoAddress(String),
}

/// Failure while handing a message to the chat platform.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("chat api request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chat api rejected the message: {0}")]
    Rejected(String),
}
