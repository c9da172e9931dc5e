use thiserror::Error;

/// User-facing failure taxonomy. Every failure is terminal for the single
/// action that produced it; there are no retries.
#[derive(Debug, Error)]
pub enum StudyError {
    #[error("no user is logged in")]
    NotLoggedIn,

    /// A required input was absent; detected before any network call is made.
    #[error("{0}")]
    MissingPrecondition(String),

    /// The generative service call failed (network error or a response that
    /// did not validate against the flow's output schema).
    #[error("content generation failed: {0}")]
    Generation(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl StudyError {
    pub fn missing_summary() -> Self {
        StudyError::MissingPrecondition(
            "generate a summary first to enable this feature".to_string(),
        )
    }

    pub fn generation(err: anyhow::Error) -> Self {
        StudyError::Generation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_user_presentable() {
        assert_eq!(
            StudyError::missing_summary().to_string(),
            "generate a summary first to enable this feature"
        );
        assert_eq!(
            StudyError::NotLoggedIn.to_string(),
            "no user is logged in"
        );
        let err = StudyError::generation(anyhow::anyhow!("model returned no candidates"));
        assert_eq!(
            err.to_string(),
            "content generation failed: model returned no candidates"
        );
    }

    #[test]
    fn storage_errors_wrap_their_source() {
        let err: StudyError = anyhow::anyhow!("disk unavailable").into();
        assert!(matches!(err, StudyError::Storage(_)));
        assert!(err.to_string().contains("disk unavailable"));
    }
}
