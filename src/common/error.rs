use std::fmt::{Debug, Display};
use thiserror::Error;

/// Marker for failures that reprocessing cannot fix.
///
/// The marker wraps the underlying cause and can sit anywhere in an
/// `anyhow` chain: adding `.context(..)` on top keeps it detectable.
#[derive(Debug, Error)]
#[error("non-retryable: {0:#}")]
pub struct NonRetryable(#[source] anyhow::Error);

impl NonRetryable {
    pub fn cause(&self) -> &anyhow::Error {
        &self.0
    }
}

/// Wrap an error with the non-retryable marker.
pub fn non_retryable(err: impl Into<anyhow::Error>) -> anyhow::Error {
    anyhow::Error::new(NonRetryable(err.into()))
}

/// Build a non-retryable error straight from a message.
pub fn non_retryable_msg(msg: impl Display + Debug + Send + Sync + 'static) -> anyhow::Error {
    non_retryable(anyhow::Error::msg(msg))
}

pub fn is_non_retryable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<NonRetryable>())
}

pub trait NonRetryableExt<T> {
    fn non_retryable(self) -> anyhow::Result<T>;
}

impl<T, E> NonRetryableExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn non_retryable(self) -> anyhow::Result<T> {
        self.map_err(non_retryable)
    }
}
