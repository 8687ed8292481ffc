#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Invalid build result: {0}")]
    InvalidBuildResult(String),

    #[error("Invalid notification level: {0}")]
    InvalidNotifyLevel(String),
}
