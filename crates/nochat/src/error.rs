use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Setup defect in the account configuration. Raised to the caller
    /// of the operation that discovered it; never retried internally.
    #[error("invalid nochat config: {message}")]
    Config { message: String },

    /// Transport-level failure talking to the NoChat server.
    #[error("nochat api {context}: {source}")]
    Api {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// The NoChat server answered with a non-success status.
    #[error("nochat server returned {status} for {context}")]
    Status { context: String, status: u16 },

    #[error(transparent)]
    Channel(#[from] coda_channels::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn api(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Api {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
