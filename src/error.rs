// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    /// Transport failure or non-2xx answer from the bond API.
    #[error("bond API unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Every issued bond is expected to carry an interest profile.
    #[error("savings bond with issue code {issue_code} has no interest profile")]
    NotFound { issue_code: String },

    #[error("chart rendering failed: {0}")]
    RenderError(String),

    #[error("delivery failed: {0}")]
    DeliveryFailure(String),

    #[error("subscription store error: {0}")]
    StoreFailure(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BotError>;
