use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while planning or applying the tag migration.
#[derive(Debug, Error)]
pub enum Error {
    /// An EC2 API call failed. The runner never retries these.
    ///
    /// `message` holds the whole SDK error chain, so no source is kept.
    #[error("{operation} failed: {message}")]
    Provider {
        operation: &'static str,
        message: String,
    },

    /// A resource matched the query filter but lacks a tag the migration reads.
    #[error("resource {resource} has no {key} tag")]
    MissingTag { resource: String, key: String },

    #[error("failed to write plan: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to encode plan: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    pub fn provider<E>(operation: &'static str, err: E) -> Self
    where
        E: std::error::Error,
    {
        Error::Provider {
            operation,
            message: aws_sdk_ec2::error::DisplayErrorContext(&err).to_string(),
        }
    }

    pub fn missing_tag(resource: &str, key: &str) -> Self {
        Error::MissingTag {
            resource: resource.to_string(),
            key: key.to_string(),
        }
    }
}
