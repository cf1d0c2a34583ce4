/// Convenience result type used across the engine.
pub type PosterResult<T> = Result<T, PosterError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Most degraded conditions (ambiguous extraction, missing assets, text
/// overflow) are absorbed into data: empty extraction results, `Missing`
/// resolution statuses, truncated text. Only conditions that end a poster
/// kind or a whole run become error values.
#[derive(thiserror::Error, Debug)]
pub enum PosterError {
    /// Invalid user-provided or request data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors while solving tile or text geometry.
    #[error("layout error: {0}")]
    Layout(String),

    /// Errors while compositing a poster surface.
    #[error("render error: {0}")]
    Render(String),

    /// The asset repository could not be reached or answered malformed data.
    #[error("asset repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// The summarization collaborator failed.
    #[error("summarizer error: {0}")]
    Summarizer(String),

    /// The caller exceeded its request allowance.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The run exceeded its wall-clock deadline.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PosterError {
    /// Build a [`PosterError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`PosterError::Layout`] value.
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::Layout(msg.into())
    }

    /// Build a [`PosterError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`PosterError::RepositoryUnavailable`] value.
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::RepositoryUnavailable(msg.into())
    }

    /// Build a [`PosterError::Summarizer`] value.
    pub fn summarizer(msg: impl Into<String>) -> Self {
        Self::Summarizer(msg.into())
    }

    /// Build a [`PosterError::RateLimited`] value.
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category_prefix() {
        let err = PosterError::validation("no poster kinds requested");
        assert_eq!(
            err.to_string(),
            "validation error: no poster kinds requested"
        );

        let err = PosterError::repository("connection refused");
        assert_eq!(
            err.to_string(),
            "asset repository unavailable: connection refused"
        );
    }

    #[test]
    fn deadline_display_includes_the_duration() {
        let err = PosterError::DeadlineExceeded(std::time::Duration::from_secs(25));
        assert_eq!(err.to_string(), "deadline exceeded after 25s");
    }

    #[test]
    fn anyhow_errors_pass_through_transparently() {
        let inner = anyhow::anyhow!("png encode failed");
        let err = PosterError::from(inner);
        assert_eq!(err.to_string(), "png encode failed");
    }
}
