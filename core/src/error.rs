use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CouncilError {
    #[error("Agent platform error: {0}")]
    Platform(String),

    #[error("Run '{run_id}' did not finish within {waited:?}")]
    Timeout { run_id: String, waited: Duration },
}

impl From<async_openai::error::OpenAIError> for CouncilError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        CouncilError::Platform(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CouncilError>;
